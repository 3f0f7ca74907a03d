//! Receive path: decode inbound frames and route them.
//!
//! Discovery frames drive pairing, application frames go to the callback registered for their
//! kind. Nothing in here fails loudly: a frame that can't be handled is dropped with a
//! [`DropReason`] and the next frame is served as usual.

use zerocopy::{FromBytes, IntoBytes};

use crate::address::MacAddress;
use crate::error::DropReason;
use crate::handler::CommsHandler;
use crate::id::{DeviceId, PacketKind};
use crate::packet::{DiscoveryPacket, InternalPacket, PacketType, decode_frame};
use crate::pairing::PairingState;
use crate::storage::KeyValueStore;
use crate::transport::Transport;

/// Handler of one application packet kind.
pub trait PacketCallback<D>: Sync {
    /// Exact payload length this callback accepts, `None` accepts any length.
    fn expected_len(&self) -> Option<usize> {
        None
    }

    fn on_packet(&self, payload: &[u8], sender: D);
}

/// Callback receiving the raw payload.
pub struct RawCallback<D>(pub fn(&[u8], D));

impl<D> PacketCallback<D> for RawCallback<D> {
    fn on_packet(&self, payload: &[u8], sender: D) {
        (self.0)(payload, sender)
    }
}

/// Callback receiving the payload as a fixed-layout `T`.
///
/// Frames whose payload is not exactly `size_of::<T>()` bytes long never reach it.
pub struct TypedCallback<T, D>(pub fn(T, D));

impl<T: FromBytes, D> PacketCallback<D> for TypedCallback<T, D> {
    fn expected_len(&self) -> Option<usize> {
        Some(size_of::<T>())
    }

    fn on_packet(&self, payload: &[u8], sender: D) {
        match T::read_from_bytes(payload) {
            Ok(value) => (self.0)(value, sender),
            Err(_) => warn!("Payload of {} bytes doesn't fit typed callback", payload.len()),
        }
    }
}

/// Callback slots, indexed by packet kind ordinal.
pub(crate) type CallbackTable<D, const K: usize> = [Option<&'static dyn PacketCallback<D>>; K];

/// Where a received frame ended up.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Delivered<P> {
    /// Handed to the callback of this kind.
    Callback(P),
    /// Discovery for us. `acknowledged` tells whether a reply was sent.
    Discovery { acknowledged: bool },
}

impl<T, S, D, P, const N: usize, const K: usize> CommsHandler<T, S, D, P, N, K>
where
    T: Transport,
    S: KeyValueStore,
    D: DeviceId,
    P: PacketKind,
{
    /// Receive hook of the transport.
    ///
    /// Runs [`dispatch`](Self::dispatch) and logs dropped frames. Never blocks on the pairing loop.
    pub fn on_receive(&self, sender: &MacAddress, data: &[u8]) {
        match self.dispatch(sender, data) {
            Ok(_) => {}
            Err(reason @ (DropReason::NotAddressedToUs | DropReason::NoCallback)) => {
                debug!("Dropped frame from {:?}: {:?}", sender, reason)
            }
            Err(reason) => warn!("Dropped frame of {} bytes from {:?}: {:?}", data.len(), sender, reason),
        }
    }

    /// Route one received frame.
    pub fn dispatch(&self, sender: &MacAddress, data: &[u8]) -> Result<Delivered<P>, DropReason> {
        let (header, payload) = decode_frame(data)?;
        let kind = match PacketType::<P>::decode(header.packet_type) {
            Some(PacketType::Internal(InternalPacket::Discovery)) => return self.handle_discovery(sender, payload),
            Some(PacketType::User(kind)) => kind,
            None => return Err(DropReason::UnknownType),
        };

        let callback = self
            .callbacks
            .lock(|callbacks| callbacks.borrow().get(kind.to_raw() as usize).copied().flatten())
            .ok_or(DropReason::NoCallback)?;
        let sender_id = D::from_raw(header.sender).ok_or(DropReason::InvalidSender)?;
        if callback.expected_len().is_some_and(|len| len != payload.len()) {
            return Err(DropReason::LengthMismatch);
        }

        callback.on_packet(payload, sender_id);
        Ok(Delivered::Callback(kind))
    }

    fn handle_discovery(&self, sender: &MacAddress, payload: &[u8]) -> Result<Delivered<P>, DropReason> {
        let (packet, _) = DiscoveryPacket::read_from_prefix(payload).map_err(|_| DropReason::MalformedFrame)?;
        if !packet.verify() {
            return Err(DropReason::ChecksumMismatch);
        }
        if packet.target_id != self.self_id.to_raw() {
            return Err(DropReason::NotAddressedToUs);
        }
        let incoming = packet.pairing_state().ok_or(DropReason::MalformedFrame)?;
        let peer = D::from_raw(packet.sender_id)
            .filter(|id| *id != self.self_id)
            .ok_or(DropReason::InvalidSender)?;

        self.with_registry(|registry| registry.set_address(packet.sender_id, *sender))
            .map_err(|_| DropReason::InvalidSender)?;
        if self.config.persist_on_pair {
            if let Err(e) = self.save_registry() {
                error!("Failed to persist device registry: {:?}", e);
            }
        }
        self.pairing.set_state(PairingState::Paired);
        info!("Device {} discovered at {:?}", packet.sender_id, sender);

        // Only a first request is answered, answers themselves are never echoed.
        let acknowledged = incoming == PairingState::Waiting && {
            let ack = DiscoveryPacket::new(self.self_id.to_raw(), packet.sender_id, PairingState::Paired);
            match self.send_packet(peer, PacketType::DISCOVERY, ack.as_bytes()) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Failed to acknowledge discovery of device {}: {:?}", packet.sender_id, e);
                    false
                }
            }
        };
        Ok(Delivered::Discovery { acknowledged })
    }
}
