#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use commlink::packet::{DiscoveryPacket, INTERNAL_TAG_BASE, encode_frame};
use commlink::storage::MemoryStore;
use commlink::{CommsConfig, CommsHandler, DeviceId, MacAddress, PairingState, Transport};
use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

// Init logger for tests
#[ctor::ctor]
pub fn init_log() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

commlink::device_ids! {
    pub enum Node { Gateway, Relay, Sensor, Display, Lamp, Thermostat, Door }
}

commlink::packet_kinds! {
    pub enum Kind { Reading, Command }
}

pub const NODE_COUNT: usize = 7;
pub const KIND_COUNT: usize = 2;

pub type TestHandler = CommsHandler<MockTransport, MemoryStore, Node, Kind, NODE_COUNT, KIND_COUNT>;

pub const GATEWAY_ADDR: MacAddress = MacAddress([0x24, 0x6F, 0x28, 0x00, 0x00, 0x01]);
pub const SENSOR_ADDR: MacAddress = MacAddress([0x24, 0x6F, 0x28, 0x00, 0x00, 0x02]);
pub const THERMOSTAT_ADDR: MacAddress = MacAddress([0x24, 0x6F, 0x28, 0x00, 0x00, 0x05]);

/// Fixed-layout payload of `Kind::Reading`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct Reading {
    pub centi_celsius: [u8; 2],
    pub humidity: u8,
    pub battery: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    pub to: MacAddress,
    pub data: Vec<u8>,
}

/// What the mock transport was asked to do.
#[derive(Debug, Default)]
pub struct TransportLog {
    pub initialized: bool,
    pub peers: Vec<(MacAddress, u8, bool)>,
    pub sent: Vec<SentFrame>,
    pub fail_init: bool,
    pub fail_sends: bool,
}

/// Frames in flight: `(from, to, data)`.
pub type Air = Rc<RefCell<VecDeque<(MacAddress, MacAddress, Vec<u8>)>>>;

#[derive(Debug)]
pub struct MockError;

pub struct MockTransport {
    pub address: MacAddress,
    pub log: Rc<RefCell<TransportLog>>,
    pub air: Option<Air>,
}

impl Transport for MockTransport {
    type Error = MockError;

    fn init(&mut self) -> Result<(), Self::Error> {
        let mut log = self.log.borrow_mut();
        if log.fail_init {
            return Err(MockError);
        }
        log.initialized = true;
        Ok(())
    }

    fn register_peer(&mut self, address: &MacAddress, channel: u8, encrypt: bool) -> Result<(), Self::Error> {
        self.log.borrow_mut().peers.push((*address, channel, encrypt));
        Ok(())
    }

    fn send(&mut self, address: &MacAddress, data: &[u8]) -> Result<(), Self::Error> {
        let mut log = self.log.borrow_mut();
        if log.fail_sends {
            return Err(MockError);
        }
        log.sent.push(SentFrame {
            to: *address,
            data: data.to_vec(),
        });
        if let Some(air) = &self.air {
            air.borrow_mut().push_back((self.address, *address, data.to_vec()));
        }
        Ok(())
    }
}

pub fn test_config(max_retries: u8) -> CommsConfig {
    CommsConfig {
        max_retries,
        retry_interval: Duration::from_millis(1),
        ..CommsConfig::default()
    }
}

pub fn new_handler(self_id: Node, address: MacAddress) -> (TestHandler, Rc<RefCell<TransportLog>>) {
    new_handler_with(self_id, address, MemoryStore::new(), None, test_config(30))
}

pub fn new_handler_with(
    self_id: Node,
    address: MacAddress,
    storage: MemoryStore,
    air: Option<Air>,
    config: CommsConfig,
) -> (TestHandler, Rc<RefCell<TransportLog>>) {
    let log = Rc::new(RefCell::new(TransportLog::default()));
    let transport = MockTransport {
        address,
        log: log.clone(),
        air,
    };
    (CommsHandler::new(self_id, transport, storage, config), log)
}

/// Frame with an arbitrary header.
pub fn frame(packet_type: u8, sender: u8, payload: &[u8]) -> Vec<u8> {
    encode_frame(packet_type, sender, payload).unwrap().to_vec()
}

pub fn discovery_frame(sender: Node, target: Node, state: PairingState) -> Vec<u8> {
    let packet = DiscoveryPacket::new(sender.to_raw(), target.to_raw(), state);
    frame(INTERNAL_TAG_BASE, sender.to_raw(), packet.as_bytes())
}

/// Delay running `hook` with the round number on every `delay_ms`.
pub struct HookDelay<F> {
    pub rounds: u32,
    hook: F,
}

impl<F: FnMut(u32)> HookDelay<F> {
    pub fn new(hook: F) -> Self {
        Self { rounds: 0, hook }
    }
}

impl<F: FnMut(u32)> DelayNs for HookDelay<F> {
    async fn delay_ns(&mut self, _ns: u32) {}

    async fn delay_ms(&mut self, _ms: u32) {
        self.rounds += 1;
        (self.hook)(self.rounds)
    }
}

/// Deliver every frame in the air to the handler it's meant for, until the air is empty.
pub fn relay(air: &Air, a: (&TestHandler, MacAddress), b: (&TestHandler, MacAddress)) {
    loop {
        let next = air.borrow_mut().pop_front();
        let Some((from, to, data)) = next else {
            break;
        };
        let (receiver, receiver_addr) = if from == a.1 { b } else { a };
        if to.is_broadcast() || to == receiver_addr {
            receiver.on_receive(&from, &data);
        }
    }
}
