//! Packet framing.
//!
//! Every frame starts with a [`PacketHeader`]:
//!
//! ```text
//! [ type: u8 ][ sender: u8 ][ len: u32 LE ][ payload: len bytes ]
//! ```
//!
//! Type tags below [`INTERNAL_TAG_BASE`] are the ordinals of application packet kinds, tags from
//! [`INTERNAL_TAG_BASE`] upwards are protocol packets ([`InternalPacket`]).

use heapless::Vec;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::MAX_FRAME_SIZE;
use crate::error::{CommsError, DropReason};
use crate::id::PacketKind;
use crate::pairing::PairingState;

/// First type tag of protocol packets.
pub const INTERNAL_TAG_BASE: u8 = 128;

/// Size of the serialized [`PacketHeader`].
pub const HEADER_SIZE: usize = size_of::<PacketHeader>();

/// Largest payload that fits into a single frame.
pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_SIZE - HEADER_SIZE;

/// Size of the serialized [`DiscoveryPacket`].
pub const DISCOVERY_SIZE: usize = size_of::<DiscoveryPacket>();

/// A complete frame, ready to be handed to the transport.
pub type Frame = Vec<u8, MAX_FRAME_SIZE>;

/// Protocol packets, carried with tag `INTERNAL_TAG_BASE + ordinal`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum InternalPacket {
    /// Pairing handshake, payload is a [`DiscoveryPacket`].
    Discovery = 0,
}

impl InternalPacket {
    pub const fn ordinal(self) -> u8 {
        self as u8
    }

    pub const fn from_ordinal(ordinal: u8) -> Option<Self> {
        match ordinal {
            0 => Some(InternalPacket::Discovery),
            _ => None,
        }
    }
}

/// Type of a packet: either an application kind or a protocol packet.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PacketType<P> {
    User(P),
    Internal(InternalPacket),
}

impl<P: PacketKind> PacketType<P> {
    pub const DISCOVERY: Self = PacketType::Internal(InternalPacket::Discovery);

    /// Wire tag of this type.
    pub fn encoded(self) -> u8 {
        match self {
            PacketType::User(kind) => kind.to_raw(),
            PacketType::Internal(internal) => INTERNAL_TAG_BASE + internal.ordinal(),
        }
    }

    /// Type of a wire tag, `None` for tags no type maps to.
    pub fn decode(tag: u8) -> Option<Self> {
        if tag >= INTERNAL_TAG_BASE {
            InternalPacket::from_ordinal(tag - INTERNAL_TAG_BASE).map(PacketType::Internal)
        } else {
            P::from_raw(tag).map(PacketType::User)
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, PacketType::Internal(_))
    }
}

impl<P: PacketKind> From<P> for PacketType<P> {
    fn from(kind: P) -> Self {
        PacketType::User(kind)
    }
}

/// Header prefixed to every frame.
///
/// Multi-byte fields are stored as byte arrays so the struct has no padding and every bit pattern
/// is valid.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct PacketHeader {
    pub packet_type: u8,
    pub sender: u8,
    len: [u8; 4],
}

impl PacketHeader {
    pub fn new(packet_type: u8, sender: u8, len: u32) -> Self {
        Self {
            packet_type,
            sender,
            len: len.to_le_bytes(),
        }
    }

    /// Announced payload length.
    pub fn len(&self) -> u32 {
        u32::from_le_bytes(self.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Payload of an [`InternalPacket::Discovery`] frame.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct DiscoveryPacket {
    pub sender_id: u8,
    pub target_id: u8,
    pub state: u8,
    pub checksum: u8,
}

impl DiscoveryPacket {
    pub fn new(sender_id: u8, target_id: u8, state: PairingState) -> Self {
        let state = state as u8;
        Self {
            sender_id,
            target_id,
            state,
            checksum: calc_checksum(&[sender_id, target_id, state]),
        }
    }

    /// Whether `checksum` matches the other fields.
    pub fn verify(&self) -> bool {
        calc_checksum(&[self.sender_id, self.target_id, self.state]) == self.checksum
    }

    pub fn pairing_state(&self) -> Option<PairingState> {
        PairingState::from_u8(self.state)
    }
}

/// Running XOR over `bytes`.
pub fn calc_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Build a frame carrying `payload`.
pub fn encode_frame(packet_type: u8, sender: u8, payload: &[u8]) -> Result<Frame, CommsError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(CommsError::PayloadTooLarge);
    }
    let header = PacketHeader::new(packet_type, sender, payload.len() as u32);
    let mut frame = Frame::new();
    frame
        .extend_from_slice(header.as_bytes())
        .map_err(|_| CommsError::PayloadTooLarge)?;
    frame.extend_from_slice(payload).map_err(|_| CommsError::PayloadTooLarge)?;
    Ok(frame)
}

/// Split a received buffer into its header and the announced payload.
///
/// Bytes after the announced payload are ignored.
pub fn decode_frame(buffer: &[u8]) -> Result<(PacketHeader, &[u8]), DropReason> {
    let (header, rest) = PacketHeader::read_from_prefix(buffer).map_err(|_| DropReason::MalformedFrame)?;
    let payload = usize::try_from(header.len())
        .ok()
        .and_then(|len| rest.get(..len))
        .ok_or(DropReason::Truncated)?;
    Ok((header, payload))
}
