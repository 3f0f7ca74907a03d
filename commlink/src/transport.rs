//! Radio transport the handler sends through.
//!
//! The transport only moves frames. Inbound frames are fed back by the firmware: the receive hook
//! of the radio driver calls [`CommsHandler::on_receive`](crate::handler::CommsHandler::on_receive)
//! with the sender address and the raw buffer, and the send-done hook calls
//! [`CommsHandler::on_send_complete`](crate::handler::CommsHandler::on_send_complete).

use core::fmt::Debug;

use crate::address::MacAddress;
use crate::error::CommsError;

/// Peer-to-peer radio driver, e.g. ESP-NOW.
pub trait Transport {
    type Error: Debug;

    /// Bring up the radio.
    fn init(&mut self) -> Result<(), Self::Error>;

    /// Allow sending to `address`. Registering a known peer again updates it.
    fn register_peer(&mut self, address: &MacAddress, channel: u8, encrypt: bool) -> Result<(), Self::Error>;

    /// Queue `data` for `address`. Delivery status is reported later through the send-done hook.
    fn send(&mut self, address: &MacAddress, data: &[u8]) -> Result<(), Self::Error>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    type Error = T::Error;

    fn init(&mut self) -> Result<(), Self::Error> {
        (**self).init()
    }

    fn register_peer(&mut self, address: &MacAddress, channel: u8, encrypt: bool) -> Result<(), Self::Error> {
        (**self).register_peer(address, channel, encrypt)
    }

    fn send(&mut self, address: &MacAddress, data: &[u8]) -> Result<(), Self::Error> {
        (**self).send(address, data)
    }
}

pub(crate) fn print_transport_error<E: Debug>(e: E) -> CommsError {
    #[cfg(feature = "defmt")]
    error!("Transport error: {:?}", defmt::Debug2Format(&e));
    #[cfg(not(feature = "defmt"))]
    error!("Transport error: {:?}", e);
    CommsError::Transport
}
