//! Server configuration

use shared::{DEFAULT_PORT, HOME_ROOM};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub host: String,
    /// Port to listen on; 0 picks an ephemeral port
    pub port: u16,
    /// Period of the room clock, `None` disables it
    pub clock_interval: Option<Duration>,
    /// Channel the room clock writes to
    pub room_channel: String,
}

impl ServerConfig {
    /// `host:port` string for binding
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Builds the clock interval from a millisecond count, 0 meaning off
    pub fn clock_from_millis(millis: u64) -> Option<Duration> {
        (millis > 0).then(|| Duration::from_millis(millis))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            clock_interval: Some(Duration::from_secs(1)),
            room_channel: HOME_ROOM.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.address(), "127.0.0.1:3000");
        assert_eq!(config.clock_interval, Some(Duration::from_secs(1)));
        assert_eq!(config.room_channel, "Room:HomeRoom");
    }

    #[test]
    fn test_clock_from_millis() {
        assert_eq!(ServerConfig::clock_from_millis(0), None);
        assert_eq!(
            ServerConfig::clock_from_millis(250),
            Some(Duration::from_millis(250))
        );
    }
}
