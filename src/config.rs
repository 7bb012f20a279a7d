//! Configuration loaded from environment variables

use std::time::Duration;

use tracing::warn;

use crate::radio::ChannelFaults;

/// Which radio driver to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// In-memory radio with synthetic traffic
    Simulated,
    /// Real wireless interface via iw/tcpdump
    Monitor,
}

impl Backend {
    fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "monitor" | "iw" | "linux" => Self::Monitor,
            _ => Self::Simulated,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Radio driver backend
    pub backend: Backend,

    /// Wireless interface put into monitor mode
    pub interface: String,

    /// Path to the tcpdump executable
    pub tcpdump_path: String,

    /// HTTP API port
    pub http_port: u16,

    /// Frames returned per packets request
    pub drain_batch: usize,

    /// Channel hop dwell time in milliseconds
    pub hop_interval_ms: u64,

    /// Synthetic frame interval for the simulated backend
    pub sim_traffic_interval_ms: u64,

    /// Scripted channel-set failures for the simulated backend
    pub sim_channel_faults: ChannelFaults,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            backend: std::env::var("RADIO_BACKEND")
                .map(|s| Backend::from_name(&s))
                .unwrap_or(Backend::Simulated),

            interface: std::env::var("WIFI_INTERFACE").unwrap_or_else(|_| "wlan0".to_string()),

            tcpdump_path: std::env::var("TCPDUMP_PATH").unwrap_or_else(|_| "tcpdump".to_string()),

            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8080),

            drain_batch: std::env::var("DRAIN_BATCH")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(10),

            hop_interval_ms: std::env::var("CHANNEL_HOP_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(200),

            sim_traffic_interval_ms: std::env::var("SIM_TRAFFIC_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(50),

            sim_channel_faults: std::env::var("SIM_CHANNEL_FAULTS")
                .ok()
                .and_then(|s| {
                    let faults = ChannelFaults::parse(&s);
                    if faults.is_none() {
                        warn!("Ignoring unparsable SIM_CHANNEL_FAULTS {:?}", s);
                    }
                    faults
                })
                .unwrap_or_default(),
        }
    }

    pub fn hop_interval(&self) -> Duration {
        Duration::from_millis(self.hop_interval_ms)
    }

    pub fn sim_traffic_interval(&self) -> Duration {
        Duration::from_millis(self.sim_traffic_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_names() {
        assert_eq!(Backend::from_name("monitor"), Backend::Monitor);
        assert_eq!(Backend::from_name(" Monitor "), Backend::Monitor);
        assert_eq!(Backend::from_name("sim"), Backend::Simulated);
        assert_eq!(Backend::from_name("anything"), Backend::Simulated);
    }
}
