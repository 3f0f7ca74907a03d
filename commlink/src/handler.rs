//! The comms handler: one object tying registry, pairing, framing and dispatch to a transport.
//!
//! A firmware creates a single handler, usually in a `static` or a `StaticCell`, and wires the
//! receive hook of its radio driver to [`CommsHandler::on_receive`]. Every method takes `&self`,
//! so the application task and the radio context can share it.

use core::cell::RefCell;
use core::marker::PhantomData;

use embassy_sync::blocking_mutex::Mutex;
use embedded_hal_async::delay::DelayNs;
use zerocopy::{Immutable, IntoBytes};

use crate::RawMutex;
use crate::address::MacAddress;
use crate::config::CommsConfig;
use crate::dispatch::{CallbackTable, PacketCallback};
use crate::error::CommsError;
use crate::id::{DeviceId, PacketKind};
use crate::packet::{PacketType, encode_frame};
use crate::pairing::{Pairing, PairingState};
use crate::registry::DeviceRegistry;
use crate::storage::KeyValueStore;
use crate::transport::{Transport, print_transport_error};

/// Comms handler of device `D`, exchanging packets of kind `P` over transport `T`.
///
/// `N` must equal `D::COUNT` and `K` must equal `P::COUNT`, both are checked at compile time.
///
/// Callbacks run inside the receive path. They may send packets, but must not call back into
/// [`on_receive`](Self::on_receive).
pub struct CommsHandler<T, S, D, P, const N: usize, const K: usize>
where
    T: Transport,
    S: KeyValueStore,
    D: DeviceId,
    P: PacketKind,
{
    pub(crate) self_id: D,
    pub(crate) config: CommsConfig,
    pub(crate) transport: Mutex<RawMutex, RefCell<T>>,
    pub(crate) storage: Mutex<RawMutex, RefCell<S>>,
    pub(crate) registry: Mutex<RawMutex, RefCell<DeviceRegistry<N>>>,
    pub(crate) callbacks: Mutex<RawMutex, RefCell<CallbackTable<D, K>>>,
    pub(crate) pairing: Pairing,
    _kind: PhantomData<P>,
}

impl<T, S, D, P, const N: usize, const K: usize> CommsHandler<T, S, D, P, N, K>
where
    T: Transport,
    S: KeyValueStore,
    D: DeviceId,
    P: PacketKind,
{
    /// Create the handler of device `self_id`, loading the registry from `storage`.
    pub fn new(self_id: D, transport: T, mut storage: S, config: CommsConfig) -> Self {
        const {
            assert!(D::COUNT as usize == N, "N must equal the number of device ids");
            assert!(P::COUNT as usize == K, "K must equal the number of packet kinds");
        };
        let registry = DeviceRegistry::load(&mut storage);
        Self {
            self_id,
            config,
            transport: Mutex::new(RefCell::new(transport)),
            storage: Mutex::new(RefCell::new(storage)),
            registry: Mutex::new(RefCell::new(registry)),
            callbacks: Mutex::new(RefCell::new([None; K])),
            pairing: Pairing::new(),
            _kind: PhantomData,
        }
    }

    pub fn self_id(&self) -> D {
        self.self_id
    }

    pub fn config(&self) -> &CommsConfig {
        &self.config
    }

    /// Initialize the transport.
    pub fn begin(&self) -> Result<(), CommsError> {
        self.with_transport(|t| t.init())?;
        info!(
            "Comms started as device {}, {} paired devices",
            self.self_id.to_raw(),
            self.with_registry(|r| r.active_count())
        );
        Ok(())
    }

    /// Make `target` reachable.
    ///
    /// A known target is registered as transport peer right away. An unknown target fails with
    /// [`CommsError::NotFound`], unless `pairing_mode` is set: then the broadcast address is
    /// registered without encryption and the target is [`pair`](Self::pair)ed first.
    pub async fn register_comms<Dl: DelayNs>(
        &self,
        target: D,
        pairing_mode: bool,
        encrypt: bool,
        delay: &mut Dl,
    ) -> Result<(), CommsError> {
        if target == self.self_id {
            return Err(CommsError::SelfSend);
        }
        let address = match self.get_address(target) {
            Ok(address) => address,
            Err(CommsError::NotFound) if pairing_mode => {
                self.with_transport(|t| t.register_peer(&MacAddress::BROADCAST, self.config.channel, false))?;
                self.pair(target, delay).await?
            }
            Err(e) => return Err(e),
        };
        self.with_transport(|t| t.register_peer(&address, self.config.channel, encrypt))?;
        debug!("Registered device {} at {:?}", target.to_raw(), address);
        Ok(())
    }

    /// Run the discovery handshake with `target` and return its address.
    ///
    /// Blocks for up to [`CommsConfig::pairing_budget`]. Expects the broadcast address to be a
    /// registered peer already.
    pub async fn pair<Dl: DelayNs>(&self, target: D, delay: &mut Dl) -> Result<MacAddress, CommsError> {
        if target == self.self_id {
            return Err(CommsError::SelfSend);
        }
        let target_id = target.to_raw();
        self.pairing
            .run(
                self.self_id.to_raw(),
                target_id,
                &self.config,
                delay,
                |packet| self.send_packet(target, PacketType::DISCOVERY, packet.as_bytes()),
                || self.with_registry(|r| r.get_address(target_id).is_ok()),
            )
            .await?;
        self.get_address(target)
    }

    /// Make an ongoing [`pair`](Self::pair) give up after its current round.
    pub fn cancel_pairing(&self) {
        self.pairing.cancel();
    }

    pub fn pairing_state(&self) -> PairingState {
        self.pairing.state()
    }

    /// Route packets of `kind` to `callback`, replacing any previous callback.
    pub fn register_callback(&self, kind: P, callback: &'static dyn PacketCallback<D>) {
        self.callbacks.lock(|callbacks| {
            if let Some(slot) = callbacks.borrow_mut().get_mut(kind.to_raw() as usize) {
                *slot = Some(callback);
            }
        });
    }

    /// Stop routing packets of `kind`. Returns whether a callback was registered.
    pub fn unregister_callback(&self, kind: P) -> bool {
        self.callbacks.lock(|callbacks| {
            callbacks
                .borrow_mut()
                .get_mut(kind.to_raw() as usize)
                .and_then(|slot| slot.take())
                .is_some()
        })
    }

    /// Send `payload` as a packet of `packet_type` to `target`.
    ///
    /// Discovery packets go to the broadcast address, everything else to the registered address of
    /// `target`.
    pub fn send_packet(&self, target: D, packet_type: PacketType<P>, payload: &[u8]) -> Result<(), CommsError> {
        if target == self.self_id {
            warn!("Refusing to send packet to own device id {}", target.to_raw());
            return Err(CommsError::SelfSend);
        }
        let address = if packet_type.is_internal() {
            MacAddress::BROADCAST
        } else {
            self.get_address(target)?
        };
        let frame = encode_frame(packet_type.encoded(), self.self_id.to_raw(), payload)?;
        trace!("Sending {} bytes to {:?}", frame.len(), address);
        self.with_transport(|t| t.send(&address, &frame))
    }

    /// Send a fixed-layout value as a packet of `kind`.
    pub fn send_typed<V: IntoBytes + Immutable>(&self, target: D, kind: P, value: &V) -> Result<(), CommsError> {
        self.send_packet(target, PacketType::User(kind), value.as_bytes())
    }

    /// Send-done hook of the transport.
    pub fn on_send_complete(&self, address: &MacAddress, success: bool) {
        if success {
            trace!("Delivered to {:?}", address);
        } else {
            warn!("Delivery to {:?} failed", address);
        }
    }

    /// Registered address of `target`.
    pub fn get_address(&self, target: D) -> Result<MacAddress, CommsError> {
        self.with_registry(|r| r.get_address(target.to_raw()))
            .map_err(CommsError::from)
    }

    /// Write the registry to storage.
    pub fn save_registry(&self) -> Result<(), CommsError> {
        self.registry.lock(|registry| {
            self.storage
                .lock(|storage| registry.borrow().save_to_flash(&mut *storage.borrow_mut()))
        })?;
        Ok(())
    }

    /// Run `f` on the registry.
    pub fn with_registry<R>(&self, f: impl FnOnce(&mut DeviceRegistry<N>) -> R) -> R {
        self.registry.lock(|registry| f(&mut *registry.borrow_mut()))
    }

    /// Run `f` on the storage backend.
    pub fn with_storage<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        self.storage.lock(|storage| f(&mut *storage.borrow_mut()))
    }

    fn with_transport<R>(&self, f: impl FnOnce(&mut T) -> Result<R, T::Error>) -> Result<R, CommsError> {
        self.transport
            .lock(|transport| f(&mut *transport.borrow_mut()))
            .map_err(print_transport_error)
    }
}
