//! Error taxonomy.
//!
//! Synchronous misuse is returned to the caller. Problems with received frames never leave the
//! receive path: they are turned into a [`DropReason`], logged and the frame is discarded.

use core::fmt;

/// Errors of [`DeviceRegistry`](crate::registry::DeviceRegistry) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistryError {
    /// The id is outside the configured range.
    InvalidId,
    /// No active slot matches the request.
    NotFound,
    /// The slot already holds an address.
    AlreadyPaired,
}

/// Errors of the persistence layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// The blob does not fit into the buffer of the store or of the caller.
    BufferTooSmall,
    /// Stored bytes could not be decoded.
    Corrupted,
    /// The backend (flash driver, ...) reported a failure.
    Backend,
}

/// Errors returned by the [`CommsHandler`](crate::handler::CommsHandler) facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommsError {
    InvalidId,
    /// The target has no known address and pairing was not requested.
    NotFound,
    /// Sending to our own id is not allowed.
    SelfSend,
    /// Header and payload do not fit into one radio frame.
    PayloadTooLarge,
    /// No discovery reply arrived within the retry budget.
    PairingTimeout,
    /// The transport rejected a peer registration or a send.
    Transport,
    Storage(StorageError),
}

/// Why a received frame was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DropReason {
    /// Shorter than a packet header.
    MalformedFrame,
    /// The header announces more payload than was received.
    Truncated,
    /// Type tag outside the registered application range and not a protocol tag.
    UnknownType,
    /// No callback registered for the type.
    NoCallback,
    /// Payload length does not match the size the callback expects.
    LengthMismatch,
    /// Discovery checksum does not match its fields.
    ChecksumMismatch,
    /// Discovery packet targets another device.
    NotAddressedToUs,
    /// Sender id outside the configured range.
    InvalidSender,
}

impl From<RegistryError> for CommsError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::InvalidId => CommsError::InvalidId,
            RegistryError::NotFound | RegistryError::AlreadyPaired => CommsError::NotFound,
        }
    }
}

impl From<StorageError> for CommsError {
    fn from(e: StorageError) -> Self {
        CommsError::Storage(e)
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::InvalidId => f.write_str("device id out of range"),
            RegistryError::NotFound => f.write_str("device not found"),
            RegistryError::AlreadyPaired => f.write_str("device slot already in use"),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::BufferTooSmall => f.write_str("storage buffer too small"),
            StorageError::Corrupted => f.write_str("stored data is corrupted"),
            StorageError::Backend => f.write_str("storage backend error"),
        }
    }
}

impl fmt::Display for CommsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommsError::InvalidId => f.write_str("device id out of range"),
            CommsError::NotFound => f.write_str("no address known for device"),
            CommsError::SelfSend => f.write_str("cannot send to own device id"),
            CommsError::PayloadTooLarge => f.write_str("payload does not fit into a frame"),
            CommsError::PairingTimeout => f.write_str("pairing timed out"),
            CommsError::Transport => f.write_str("transport error"),
            CommsError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DropReason::MalformedFrame => "frame shorter than header",
            DropReason::Truncated => "payload shorter than announced",
            DropReason::UnknownType => "unknown packet type",
            DropReason::NoCallback => "no callback registered",
            DropReason::LengthMismatch => "payload length mismatch",
            DropReason::ChecksumMismatch => "discovery checksum mismatch",
            DropReason::NotAddressedToUs => "discovery for another device",
            DropReason::InvalidSender => "sender id out of range",
        };
        f.write_str(s)
    }
}
