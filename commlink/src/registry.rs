//! Device registry: the fixed table mapping device ids to hardware addresses.
//!
//! Slot `i` belongs to device id `i`. A slot only carries a usable address while its `active`
//! flag is set, whatever bytes are stored in it otherwise. The table is never written to storage
//! implicitly, callers decide when to [`save_to_flash`](DeviceRegistry::save_to_flash).

use heapless::Vec;
use postcard::experimental::max_size::MaxSize;
use serde::{Deserialize, Serialize};

use crate::MAX_DEVICES;
use crate::address::MacAddress;
use crate::config::{REGISTRY_KEY, REGISTRY_NAMESPACE};
use crate::error::{RegistryError, StorageError};
use crate::storage::KeyValueStore;

/// Largest blob produced by [`DeviceRegistry::save_to_flash`].
pub const REGISTRY_BLOB_MAX_SIZE: usize = 1 + MAX_DEVICES * RegistryEntry::POSTCARD_MAX_SIZE;

/// One slot of the registry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, MaxSize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegistryEntry {
    pub address: MacAddress,
    pub active: bool,
}

impl RegistryEntry {
    pub const EMPTY: Self = Self {
        address: MacAddress::UNSET,
        active: false,
    };
}

impl Default for RegistryEntry {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Table of `N` device slots, indexed by the raw device id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceRegistry<const N: usize> {
    table: [RegistryEntry; N],
}

impl<const N: usize> Default for DeviceRegistry<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> DeviceRegistry<N> {
    /// Create a registry with every slot inactive.
    pub const fn new() -> Self {
        const { assert!(N <= MAX_DEVICES, "registry capacity exceeds MAX_DEVICES") };
        Self {
            table: [RegistryEntry::EMPTY; N],
        }
    }

    /// Create a registry and hydrate it from `store`.
    ///
    /// Missing or unreadable data leaves the registry empty, the failure is only logged.
    pub fn load<S: KeyValueStore>(store: &mut S) -> Self {
        let mut registry = Self::new();
        if let Err(e) = registry.load_from_flash(store) {
            error!("Failed to load device registry: {:?}", e);
        }
        registry
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Address of device `id`.
    pub fn get_address(&self, id: u8) -> Result<MacAddress, RegistryError> {
        match self.table.get(id as usize) {
            Some(entry) if entry.active => Ok(entry.address),
            _ => Err(RegistryError::NotFound),
        }
    }

    /// Store `address` for device `id` and mark the slot active, replacing what was there.
    ///
    /// Any other slot holding the same address is deactivated, so an address always resolves to
    /// a single id.
    pub fn set_address(&mut self, id: u8, address: MacAddress) -> Result<(), RegistryError> {
        let idx = id as usize;
        if idx >= N {
            return Err(RegistryError::InvalidId);
        }
        for (other, entry) in self.table.iter_mut().enumerate() {
            if other != idx && entry.active && entry.address == address {
                warn!("Address {:?} moved from device {} to device {}", address, other, id);
                *entry = RegistryEntry::EMPTY;
            }
        }
        self.table[idx] = RegistryEntry { address, active: true };
        Ok(())
    }

    /// Like [`set_address`](Self::set_address), but refuses to overwrite an active slot.
    pub fn add_device(&mut self, id: u8, address: MacAddress) -> Result<(), RegistryError> {
        match self.table.get(id as usize) {
            None => Err(RegistryError::InvalidId),
            Some(entry) if entry.active => Err(RegistryError::AlreadyPaired),
            Some(_) => self.set_address(id, address),
        }
    }

    /// Forget the address of device `id`.
    pub fn remove_device(&mut self, id: u8) -> Result<(), RegistryError> {
        let entry = self.table.get_mut(id as usize).ok_or(RegistryError::InvalidId)?;
        if !entry.active {
            return Err(RegistryError::NotFound);
        }
        *entry = RegistryEntry::EMPTY;
        Ok(())
    }

    /// Id of the first active slot holding `address`.
    pub fn find_id_by_address(&self, address: &MacAddress) -> Result<u8, RegistryError> {
        self.table
            .iter()
            .position(|entry| entry.active && entry.address == *address)
            .map(|idx| idx as u8)
            .ok_or(RegistryError::NotFound)
    }

    pub fn clear(&mut self) {
        self.table = [RegistryEntry::EMPTY; N];
    }

    /// All `(id, address)` pairs of active slots, in id order.
    pub fn iter_active(&self) -> impl Iterator<Item = (u8, MacAddress)> + '_ {
        self.table
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.active)
            .map(|(idx, entry)| (idx as u8, entry.address))
    }

    pub fn active_count(&self) -> usize {
        self.table.iter().filter(|entry| entry.active).count()
    }

    /// Write the whole table as one blob to `store`.
    pub fn save_to_flash<S: KeyValueStore>(&self, store: &mut S) -> Result<(), StorageError> {
        let mut buffer = [0u8; REGISTRY_BLOB_MAX_SIZE];
        let blob = postcard::to_slice(&self.table[..], &mut buffer).map_err(|_| StorageError::BufferTooSmall)?;
        store.save(REGISTRY_NAMESPACE, REGISTRY_KEY, blob)?;
        debug!("Saved device registry, {} active slots", self.active_count());
        Ok(())
    }

    /// Replace the table with the blob stored in `store`.
    ///
    /// Nothing stored is not an error: the table is left as it is. A blob with fewer entries than
    /// slots fills the leading slots and clears the rest. On error the table is unchanged.
    pub fn load_from_flash<S: KeyValueStore>(&mut self, store: &mut S) -> Result<(), StorageError> {
        let mut buffer = [0u8; REGISTRY_BLOB_MAX_SIZE];
        let len = store.load(REGISTRY_NAMESPACE, REGISTRY_KEY, &mut buffer)?;
        if len == 0 {
            debug!("No device registry stored, using empty table");
            return Ok(());
        }
        let entries: Vec<RegistryEntry, N> =
            postcard::from_bytes(&buffer[..len]).map_err(|_| StorageError::Corrupted)?;

        self.clear();
        for (slot, entry) in self.table.iter_mut().zip(entries.iter()) {
            *slot = *entry;
        }
        info!("Loaded device registry, {} active slots", self.active_count());
        Ok(())
    }
}
