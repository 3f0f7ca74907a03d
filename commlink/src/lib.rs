#![doc = include_str!("../README.md")]
//! ## Feature flags
#![doc = document_features::document_features!()]
#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod address;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod id;
pub mod packet;
pub mod pairing;
pub mod registry;
pub mod storage;
pub mod transport;

pub use address::MacAddress;
pub use config::CommsConfig;
pub use dispatch::{Delivered, PacketCallback, RawCallback, TypedCallback};
pub use error::{CommsError, DropReason, RegistryError, StorageError};
pub use handler::CommsHandler;
pub use id::{DeviceId, PacketKind};
pub use packet::{InternalPacket, PacketType};
pub use pairing::PairingState;
pub use registry::DeviceRegistry;
pub use storage::KeyValueStore;
pub use transport::Transport;

/// Raw mutex used by every lock in this crate.
///
/// The receive hook of most radio drivers runs in an interrupt or a dedicated radio task,
/// so locks are taken inside a critical section.
pub type RawMutex = embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

/// Maximum number of device slots a registry can hold.
pub const MAX_DEVICES: usize = 64;

/// Maximum size of a frame handed to the transport, header included.
pub const MAX_FRAME_SIZE: usize = 250;
