//! [`KeyValueStore`] over a range of NOR flash, backed by a `sequential-storage` map.
//!
//! Each namespace/key pair maps to one `u32` item key. Saving appends a new version of the
//! item, the map takes care of wear leveling and garbage collection.

use core::ops::Range;

use embassy_embedded_hal::adapter::BlockingAsync;
use embassy_futures::block_on;
use embedded_storage::nor_flash::NorFlash;
use embedded_storage_async::nor_flash::NorFlash as AsyncNorFlash;
use sequential_storage::Error as SSError;
use sequential_storage::cache::NoCache;
use sequential_storage::map::{fetch_item, store_item};

use super::KeyValueStore;
use crate::error::StorageError;

/// Size of the item buffer, item key included.
pub const FLASH_BUFFER_SIZE: usize = 512;

// Serialized size of the `u32` item key
const ITEM_KEY_SIZE: usize = 4;

/// Blob store keeping its items in `range`.
pub struct FlashStore<F: NorFlash> {
    flash: BlockingAsync<F>,
    range: Range<u32>,
    buffer: [u8; FLASH_BUFFER_SIZE],
}

impl<F: NorFlash> FlashStore<F> {
    /// Use `range` of `flash` as storage.
    ///
    /// Both ends of `range` must be on a sector boundary and the range must span at least two
    /// sectors.
    pub fn new(flash: F, range: Range<u32>) -> Self {
        assert!(
            range.start as usize % F::ERASE_SIZE == 0,
            "Storage's start addr MUST BE a multiplier of sector size"
        );
        assert!(
            range.end as usize % F::ERASE_SIZE == 0,
            "Storage's end addr MUST BE a multiplier of sector size"
        );
        assert!(
            (range.end.saturating_sub(range.start) as usize) >= F::ERASE_SIZE * 2,
            "Storage range must span at least two sectors"
        );
        info!(
            "Flash capacity {} KB, using 0x{:X}..0x{:X} as key/value storage",
            flash.capacity() / 1024,
            range.start,
            range.end
        );
        Self {
            flash: async_flash_wrapper(flash),
            range,
            buffer: [0; FLASH_BUFFER_SIZE],
        }
    }

    /// Erase the whole range, dropping every stored item.
    pub fn erase_all(&mut self) -> Result<(), StorageError> {
        block_on(sequential_storage::erase_all(&mut self.flash, self.range.clone()))
            .map_err(print_storage_error::<BlockingAsync<F>>)
    }
}

impl<F: NorFlash> KeyValueStore for FlashStore<F> {
    fn save(&mut self, namespace: &str, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        if bytes.len() + ITEM_KEY_SIZE > FLASH_BUFFER_SIZE {
            return Err(StorageError::BufferTooSmall);
        }
        let item_key = item_key(namespace, key);
        block_on(store_item::<u32, &[u8], _>(
            &mut self.flash,
            self.range.clone(),
            &mut NoCache::new(),
            &mut self.buffer,
            &item_key,
            &bytes,
        ))
        .map_err(print_storage_error::<BlockingAsync<F>>)?;
        debug!("Saved {} bytes of {}/{} to flash", bytes.len(), namespace, key);
        Ok(())
    }

    fn load(&mut self, namespace: &str, key: &str, buffer: &mut [u8]) -> Result<usize, StorageError> {
        let item_key = item_key(namespace, key);
        let item = block_on(fetch_item::<u32, &[u8], _>(
            &mut self.flash,
            self.range.clone(),
            &mut NoCache::new(),
            &mut self.buffer,
            &item_key,
        ))
        .map_err(print_storage_error::<BlockingAsync<F>>)?;

        match item {
            Some(value) => {
                let target = buffer.get_mut(..value.len()).ok_or(StorageError::BufferTooSmall)?;
                target.copy_from_slice(value);
                Ok(value.len())
            }
            None => {
                debug!("Nothing stored for {}/{}", namespace, key);
                Ok(0)
            }
        }
    }
}

/// Wrap a blocking flash so it can back the map.
pub(crate) fn async_flash_wrapper<F: NorFlash>(flash: F) -> BlockingAsync<F> {
    embassy_embedded_hal::adapter::BlockingAsync::new(flash)
}

// FNV-1a over `namespace`, a separator and `key`
fn item_key(namespace: &str, key: &str) -> u32 {
    let mut hash: u32 = 0x811C_9DC5;
    for byte in namespace.bytes().chain(core::iter::once(0)).chain(key.bytes()) {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

fn print_storage_error<F: AsyncNorFlash>(e: SSError<F::Error>) -> StorageError {
    match e {
        #[cfg(feature = "defmt")]
        SSError::Storage { value: e } => {
            error!("Flash error: {:?}", defmt::Debug2Format(&e));
            StorageError::Backend
        }
        #[cfg(not(feature = "defmt"))]
        SSError::Storage { value: e } => {
            error!("Flash error: {:?}", e);
            StorageError::Backend
        }
        SSError::FullStorage => {
            error!("Storage is full");
            StorageError::BufferTooSmall
        }
        SSError::Corrupted {} => {
            error!("Storage is corrupted");
            StorageError::Corrupted
        }
        SSError::BufferTooBig => {
            error!("Buffer too big");
            StorageError::BufferTooSmall
        }
        SSError::BufferTooSmall(x) => {
            error!("Buffer too small, needs {} bytes", x);
            StorageError::BufferTooSmall
        }
        SSError::SerializationError(e) => {
            error!("Map value error: {:?}", e);
            StorageError::Corrupted
        }
        _ => {
            error!("Unknown storage error");
            StorageError::Backend
        }
    }
}
