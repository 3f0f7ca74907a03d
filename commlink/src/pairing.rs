//! Pairing: resolve the address of a device id through broadcast discovery.
//!
//! [`Pairing::run`] broadcasts discovery packets until the receive path flips the shared state to
//! [`PairingState::Paired`] or the retry budget runs out. The state is the only thing shared with
//! the receive path, so it lives in an atomic and never behind a lock.

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use embedded_hal_async::delay::DelayNs;

use crate::config::CommsConfig;
use crate::error::CommsError;
use crate::packet::DiscoveryPacket;

/// Outcome of the latest pairing attempt. Also the `state` byte of a [`DiscoveryPacket`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PairingState {
    Waiting = 0,
    Paired = 1,
    Timeout = 2,
}

impl PairingState {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PairingState::Waiting),
            1 => Some(PairingState::Paired),
            2 => Some(PairingState::Timeout),
            _ => None,
        }
    }
}

/// Pairing state shared between the retry loop and the receive path.
pub struct Pairing {
    state: AtomicU8,
    cancelled: AtomicBool,
}

impl Default for Pairing {
    fn default() -> Self {
        Self::new()
    }
}

impl Pairing {
    /// Nothing attempted yet reads as [`PairingState::Timeout`].
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(PairingState::Timeout as u8),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> PairingState {
        PairingState::from_u8(self.state.load(Ordering::Acquire)).unwrap_or(PairingState::Timeout)
    }

    pub fn set_state(&self, state: PairingState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Make a running [`run`](Self::run) give up at its next check.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Broadcast discovery for `target_id` until it is paired.
    ///
    /// Every round hands one [`DiscoveryPacket`] to `broadcast` and waits
    /// `config.retry_interval` on `delay`. A failed broadcast still uses up a round. `is_resolved`
    /// decides whether [`PairingState::Paired`] was reached through `target_id`. If the state was
    /// flipped by another device, pairing resets to [`PairingState::Waiting`] and goes on, unless
    /// the reply of `target_id` landed in the meantime.
    pub async fn run<Dl, B, R>(
        &self,
        self_id: u8,
        target_id: u8,
        config: &CommsConfig,
        delay: &mut Dl,
        mut broadcast: B,
        is_resolved: R,
    ) -> Result<(), CommsError>
    where
        Dl: DelayNs,
        B: FnMut(&DiscoveryPacket) -> Result<(), CommsError>,
        R: Fn() -> bool,
    {
        self.cancelled.store(false, Ordering::Release);
        self.set_state(PairingState::Waiting);
        info!("Pairing with device {}, up to {} attempts", target_id, config.max_retries);

        let interval_ms = u32::try_from(config.retry_interval.as_millis()).unwrap_or(u32::MAX);
        for attempt in 1..=config.max_retries {
            let packet = DiscoveryPacket::new(self_id, target_id, self.state());
            if let Err(e) = broadcast(&packet) {
                warn!("Discovery broadcast {} failed: {:?}", attempt, e);
            } else {
                debug!("Discovery broadcast {}/{} sent", attempt, config.max_retries);
            }

            delay.delay_ms(interval_ms).await;

            if self.cancelled.load(Ordering::Acquire) {
                info!("Pairing with device {} cancelled", target_id);
                break;
            }
            if self.state() == PairingState::Paired {
                if is_resolved() {
                    info!("Paired with device {} after {} attempts", target_id, attempt);
                    return Ok(());
                }
                debug!("Paired by another device, still waiting for {}", target_id);
                // The target may have answered since the first check, so look again after the reset
                let _ = self.state.compare_exchange(
                    PairingState::Paired as u8,
                    PairingState::Waiting as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                if is_resolved() {
                    self.set_state(PairingState::Paired);
                    info!("Paired with device {} after {} attempts", target_id, attempt);
                    return Ok(());
                }
            }
        }

        self.set_state(PairingState::Timeout);
        info!("Pairing with device {} timed out", target_id);
        Err(CommsError::PairingTimeout)
    }
}
