// Runtime configuration shared by the GM event loop, the player controller
// and the transports.
//
// The protocol itself defines no timeouts. The values here are the policy
// this implementation picks:
// - `connect_timeout`: bound on one connection attempt (dialling the GM,
//   TCP handshake). Memory transports resolve immediately.
// - `command_timeout`: how long a host command (`accept`, `start`, ...) waits
//   for the GM event loop to answer before giving up.
// - `poll_interval`: sleep between non-blocking polls in interactive loops.
//
// Pending moves have no timeout: a player waits for the GM's `move-result`
// until the connection itself drops.

use std::time::Duration;

/// Default bound on a single connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default wait for a reply from the GM event loop.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Default sleep between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Timeout policy for one session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Zero intervals are clamped to one millisecond.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_override_defaults() {
        let config = SessionConfig::default()
            .with_connect_timeout(Duration::from_millis(250))
            .with_poll_interval(Duration::ZERO);
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
        assert_eq!(config.command_timeout, DEFAULT_COMMAND_TIMEOUT);
        assert_eq!(config.poll_interval, Duration::from_millis(1));
    }
}
