use std::time::Duration;

use smt_types::DEFAULT_REPLAY_LIMIT;

use crate::registry::DEFAULT_OUTBOUND_QUEUE;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Upper bound for a single socket write before the connection is dropped.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Messages of the global scope pushed to a connection on admission.
    pub replay_limit: u32,
    /// Bound of each connection's outbound queue.
    pub outbound_queue: usize,
    pub write_timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            replay_limit: DEFAULT_REPLAY_LIMIT,
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
            write_timeout: WRITE_TIMEOUT,
            heartbeat_interval: HEARTBEAT_INTERVAL,
        }
    }
}
