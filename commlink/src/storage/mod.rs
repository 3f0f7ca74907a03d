//! Persistence collaborator.
//!
//! The registry is saved as one opaque blob under a namespace and a key. Anything able to keep
//! such blobs across resets can back it: [`MemoryStore`] keeps them in RAM, [`NoStorage`]
//! discards them and `FlashStore` (feature `storage`) writes them to a NOR flash range.

#[cfg(feature = "storage")]
mod nor_flash;

use heapless::{String, Vec};
#[cfg(feature = "storage")]
pub use nor_flash::{FLASH_BUFFER_SIZE, FlashStore};

use crate::error::StorageError;

/// Key/value storage of byte blobs, scoped by a namespace.
pub trait KeyValueStore {
    /// Save `bytes` under `namespace`/`key`, replacing the previous value.
    fn save(&mut self, namespace: &str, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Copy the value of `namespace`/`key` into `buffer`.
    ///
    /// Returns the number of bytes copied, 0 when nothing is stored.
    fn load(&mut self, namespace: &str, key: &str, buffer: &mut [u8]) -> Result<usize, StorageError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for &mut S {
    fn save(&mut self, namespace: &str, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        (**self).save(namespace, key, bytes)
    }

    fn load(&mut self, namespace: &str, key: &str, buffer: &mut [u8]) -> Result<usize, StorageError> {
        (**self).load(namespace, key, buffer)
    }
}

/// A store that keeps nothing, used when persistence is not available.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoStorage;

impl KeyValueStore for NoStorage {
    fn save(&mut self, _namespace: &str, _key: &str, _bytes: &[u8]) -> Result<(), StorageError> {
        Ok(())
    }

    fn load(&mut self, _namespace: &str, _key: &str, _buffer: &mut [u8]) -> Result<usize, StorageError> {
        Ok(0)
    }
}

const NAME_MAX_LEN: usize = 16;

#[derive(Debug, Clone)]
struct Record<const CAP: usize> {
    namespace: String<NAME_MAX_LEN>,
    key: String<NAME_MAX_LEN>,
    data: Vec<u8, CAP>,
}

/// RAM backed store holding up to `SLOTS` blobs of at most `CAP` bytes each.
///
/// Values survive as long as the store does, which makes it a stand-in for flash in tests and on
/// boards without a storage partition.
#[derive(Debug, Clone)]
pub struct MemoryStore<const SLOTS: usize = 4, const CAP: usize = 512> {
    records: Vec<Record<CAP>, SLOTS>,
}

impl<const SLOTS: usize, const CAP: usize> Default for MemoryStore<SLOTS, CAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const SLOTS: usize, const CAP: usize> MemoryStore<SLOTS, CAP> {
    pub const fn new() -> Self {
        Self { records: Vec::new() }
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Stored bytes of `namespace`/`key`, if any.
    pub fn get(&self, namespace: &str, key: &str) -> Option<&[u8]> {
        self.position(namespace, key).map(|i| self.records[i].data.as_slice())
    }

    /// Drop every stored blob.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    fn position(&self, namespace: &str, key: &str) -> Option<usize> {
        self.records
            .iter()
            .position(|r| r.namespace.as_str() == namespace && r.key.as_str() == key)
    }
}

impl<const SLOTS: usize, const CAP: usize> KeyValueStore for MemoryStore<SLOTS, CAP> {
    fn save(&mut self, namespace: &str, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let data = Vec::from_slice(bytes).map_err(|_| StorageError::BufferTooSmall)?;
        if let Some(i) = self.position(namespace, key) {
            self.records[i].data = data;
            return Ok(());
        }

        let mut record = Record {
            namespace: String::new(),
            key: String::new(),
            data,
        };
        record
            .namespace
            .push_str(namespace)
            .map_err(|_| StorageError::BufferTooSmall)?;
        record.key.push_str(key).map_err(|_| StorageError::BufferTooSmall)?;
        self.records.push(record).map_err(|_| StorageError::BufferTooSmall)
    }

    fn load(&mut self, namespace: &str, key: &str, buffer: &mut [u8]) -> Result<usize, StorageError> {
        let Some(data) = self.get(namespace, key) else {
            return Ok(0);
        };
        let target = buffer.get_mut(..data.len()).ok_or(StorageError::BufferTooSmall)?;
        target.copy_from_slice(data);
        Ok(data.len())
    }
}
