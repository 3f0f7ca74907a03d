use embassy_time::Duration;

/// Storage namespace of the device registry.
pub const REGISTRY_NAMESPACE: &str = "dReg";
/// Storage key of the device registry.
pub const REGISTRY_KEY: &str = "val";

/// Tunable configurations of the comms handler.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommsConfig {
    /// Number of discovery broadcasts before pairing gives up.
    pub max_retries: u8,
    /// Wait between two discovery broadcasts.
    pub retry_interval: Duration,
    /// Radio channel used when registering peers, 0 means the current channel.
    pub channel: u8,
    /// Save the registry to storage whenever discovery learns an address.
    pub persist_on_pair: bool,
}

impl Default for CommsConfig {
    fn default() -> Self {
        Self {
            max_retries: 30,
            retry_interval: Duration::from_secs(2),
            channel: 0,
            persist_on_pair: true,
        }
    }
}

impl CommsConfig {
    /// Longest time [`pair`](crate::handler::CommsHandler::pair) can block.
    pub fn pairing_budget(&self) -> Duration {
        self.retry_interval * self.max_retries as u32
    }
}
