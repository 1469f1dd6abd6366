use std::time::Duration;

use relay_protocol::MAX_FRAME_LEN;

// host and port are fixed, there is no env or flag driven configuration
pub const SERVER: &str = "127.0.0.1:43210";

pub const OUTBOUND_CAPACITY: usize = 64;
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
pub const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
pub const MAX_USERNAME_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    /// Messages a single recipient may have queued before deliveries to it are dropped.
    pub outbound_capacity: usize,
    pub handshake_timeout: Duration,
    /// How long a closed connection's writer may keep flushing before it is cut off.
    pub writer_drain_timeout: Duration,
    pub max_frame_len: usize,
    pub max_username_len: usize,
}

impl ServerConfig {
    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_writer_drain_timeout(mut self, timeout: Duration) -> Self {
        self.writer_drain_timeout = timeout;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            addr: SERVER.to_owned(),
            outbound_capacity: OUTBOUND_CAPACITY,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            writer_drain_timeout: WRITER_DRAIN_TIMEOUT,
            max_frame_len: MAX_FRAME_LEN,
            max_username_len: MAX_USERNAME_LEN,
        }
    }
}
