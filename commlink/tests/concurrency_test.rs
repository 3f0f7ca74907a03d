mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration as StdDuration, Instant};

use commlink::storage::MemoryStore;
use commlink::{CommsConfig, CommsHandler, DeviceId, MacAddress, PacketKind, PairingState, RawCallback, Transport};
use embassy_futures::block_on;
use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;
use zerocopy::IntoBytes;

use crate::common::*;

/// Transport whose log can be shared with other threads.
struct SharedTransport {
    sent: Arc<Mutex<Vec<SentFrame>>>,
}

impl Transport for SharedTransport {
    type Error = MockError;

    fn init(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn register_peer(&mut self, _address: &MacAddress, _channel: u8, _encrypt: bool) -> Result<(), Self::Error> {
        Ok(())
    }

    fn send(&mut self, address: &MacAddress, data: &[u8]) -> Result<(), Self::Error> {
        self.sent.lock().unwrap().push(SentFrame {
            to: *address,
            data: data.to_vec(),
        });
        Ok(())
    }
}

type SharedHandler = CommsHandler<SharedTransport, MemoryStore, Node, Kind, NODE_COUNT, KIND_COUNT>;

/// Delay sleeping the calling thread.
struct SleepDelay;

impl DelayNs for SleepDelay {
    async fn delay_ns(&mut self, ns: u32) {
        thread::sleep(StdDuration::from_nanos(ns as u64));
    }

    async fn delay_ms(&mut self, ms: u32) {
        thread::sleep(StdDuration::from_millis(ms as u64));
    }
}

fn shared_handler(max_retries: u8) -> (SharedHandler, Arc<Mutex<Vec<SentFrame>>>) {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let config = CommsConfig {
        max_retries,
        retry_interval: Duration::from_millis(5),
        ..CommsConfig::default()
    };
    let transport = SharedTransport { sent: sent.clone() };
    (CommsHandler::new(Node::Sensor, transport, MemoryStore::new(), config), sent)
}

fn wait_for(deadline: StdDuration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while !done() {
        if start.elapsed() > deadline {
            return false;
        }
        thread::sleep(StdDuration::from_millis(1));
    }
    true
}

#[test]
fn reply_from_the_receive_thread_completes_pairing() {
    let (handler, sent) = shared_handler(200);
    let reply = discovery_frame(Node::Thermostat, Node::Sensor, PairingState::Paired);

    let result = thread::scope(|s| {
        let receiver = s.spawn(|| {
            // The reply only makes sense once discovery is on air
            let on_air = wait_for(StdDuration::from_secs(5), || !sent.lock().unwrap().is_empty());
            handler.on_receive(&THERMOSTAT_ADDR, &reply);
            on_air
        });
        let result = block_on(handler.register_comms(Node::Thermostat, true, false, &mut SleepDelay));
        assert!(receiver.join().unwrap());
        result
    });

    assert_eq!(result, Ok(()));
    assert_eq!(handler.pairing_state(), PairingState::Paired);
    assert_eq!(handler.get_address(Node::Thermostat), Ok(THERMOSTAT_ADDR));
    let sent = sent.lock().unwrap();
    assert!(sent.len() < 200);
    assert!(sent.iter().all(|frame| frame.to == MacAddress::BROADCAST));
}

#[test]
fn cancel_from_another_thread_ends_pairing() {
    let (handler, sent) = shared_handler(200);

    let result = thread::scope(|s| {
        s.spawn(|| {
            wait_for(StdDuration::from_secs(5), || sent.lock().unwrap().len() >= 2);
            handler.cancel_pairing();
        });
        block_on(handler.pair(Node::Thermostat, &mut SleepDelay))
    });

    assert_eq!(result, Err(commlink::CommsError::PairingTimeout));
    assert_eq!(handler.pairing_state(), PairingState::Timeout);
    assert!(sent.lock().unwrap().len() < 200);
}

static READINGS: AtomicUsize = AtomicUsize::new(0);

static COUNT_READING: RawCallback<Node> = RawCallback(|_, _| {
    READINGS.fetch_add(1, Ordering::Relaxed);
});

#[test]
fn receiving_and_sending_from_several_threads() {
    const PER_THREAD: usize = 100;

    let (handler, sent) = shared_handler(30);
    handler.with_registry(|r| r.set_address(Node::Thermostat.to_raw(), THERMOSTAT_ADDR).unwrap());
    handler.register_callback(Kind::Reading, &COUNT_READING);

    let reading = Reading {
        centi_celsius: 1999u16.to_le_bytes(),
        humidity: 55,
        battery: 80,
    };
    let inbound = frame(Kind::Reading.to_raw(), Node::Thermostat.to_raw(), reading.as_bytes());

    thread::scope(|s| {
        for _ in 0..2 {
            s.spawn(|| {
                for _ in 0..PER_THREAD {
                    handler.on_receive(&THERMOSTAT_ADDR, &inbound);
                }
            });
        }
        for _ in 0..2 {
            s.spawn(|| {
                for _ in 0..PER_THREAD {
                    handler.send_typed(Node::Thermostat, Kind::Reading, &reading).unwrap();
                }
            });
        }
    });

    assert_eq!(READINGS.load(Ordering::Relaxed), 2 * PER_THREAD);
    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 2 * PER_THREAD);
    assert!(sent.iter().all(|frame| frame.to == THERMOSTAT_ADDR));
}
