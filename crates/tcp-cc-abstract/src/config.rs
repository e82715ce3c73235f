use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::frame::Seq;

pub const DEFAULT_PORT: u16 = 12346;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("loss_rate must be within [0, 1], got {0}")]
    LossRate(f64),
    #[error("max_packets must be at least 1")]
    NoPackets,
    #[error("min_cwnd must be at least 1, got {0}")]
    MinCwnd(f64),
    #[error("{name} ({value}) must not be below min_cwnd ({min_cwnd})")]
    BelowMinCwnd {
        name: &'static str,
        value: f64,
        min_cwnd: f64,
    },
    #[error("cubic_c must be positive, got {0}")]
    CubicC(f64),
    #[error("{name} must be within (0, 1], got {value}")]
    Gain { name: &'static str, value: f64 },
    #[error("{name} must be a positive number of seconds, got {value}")]
    Duration { name: &'static str, value: f64 },
    #[error("read_buffer must be at least 1 byte")]
    ReadBuffer,
    #[error("unknown congestion-avoidance variant {0:?}, expected 'reno' or 'cubic'")]
    Variant(String),
}

/// Congestion-avoidance growth law selected for a client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    #[default]
    Reno,
    Cubic,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Reno => f.write_str("reno"),
            Variant::Cubic => f.write_str("cubic"),
        }
    }
}

impl FromStr for Variant {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reno" => Ok(Variant::Reno),
            "cubic" => Ok(Variant::Cubic),
            _ => Err(ConfigError::Variant(s.to_string())),
        }
    }
}

/// Receiver (server) side parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub port: u16,
    /// Probability that an inbound packet is discarded.
    pub loss_rate: f64,
    /// Seed for the per-connection loss RNG. Connection `i` uses `seed + i`.
    pub seed: Option<u64>,
    /// The first arrival of each listed sequence number is always dropped.
    pub drop_sequences: Vec<Seq>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            loss_rate: 0.1,
            seed: None,
            drop_sequences: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.loss_rate) {
            return Err(ConfigError::LossRate(self.loss_rate));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.listen_addr, self.port)
    }
}

/// Smoothing gains and starting values for the RTT estimator, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RttConfig {
    pub alpha: f64,
    pub beta: f64,
    pub initial_estimated_rtt: f64,
    pub initial_dev_rtt: f64,
    pub initial_timeout: f64,
}

impl Default for RttConfig {
    fn default() -> Self {
        Self {
            alpha: 0.125,
            beta: 0.25,
            initial_estimated_rtt: 1.0,
            initial_dev_rtt: 0.5,
            initial_timeout: 100.0,
        }
    }
}

impl RttConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("alpha", self.alpha), ("beta", self.beta)] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::Gain { name, value });
            }
        }
        if !(self.initial_timeout > 0.0 && self.initial_timeout.is_finite()) {
            return Err(ConfigError::Duration {
                name: "initial_timeout",
                value: self.initial_timeout,
            });
        }
        if !(self.initial_estimated_rtt >= 0.0 && self.initial_dev_rtt >= 0.0) {
            return Err(ConfigError::Duration {
                name: "initial_estimated_rtt",
                value: self.initial_estimated_rtt.min(self.initial_dev_rtt),
            });
        }
        Ok(())
    }
}

/// Sender (client) side parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_addr: String,
    pub port: u16,
    pub max_packets: u64,
    pub initial_cwnd: f64,
    pub initial_ssthresh: f64,
    pub min_cwnd: f64,
    pub variant: Variant,
    /// Cubic scaling constant `C`.
    pub cubic_c: f64,
    /// `w_max` before the first congestion event.
    pub initial_w_max: f64,
    /// Size of a single transport read.
    pub read_buffer: usize,
    pub rtt: RttConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            max_packets: 100,
            initial_cwnd: 1.0,
            initial_ssthresh: 64.0,
            min_cwnd: 1.0,
            variant: Variant::Reno,
            cubic_c: 0.4,
            initial_w_max: 10.0,
            read_buffer: 1024,
            rtt: RttConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_packets == 0 {
            return Err(ConfigError::NoPackets);
        }
        if !(self.min_cwnd >= 1.0) {
            return Err(ConfigError::MinCwnd(self.min_cwnd));
        }
        for (name, value) in [
            ("initial_cwnd", self.initial_cwnd),
            ("initial_ssthresh", self.initial_ssthresh),
        ] {
            if !(value >= self.min_cwnd) {
                return Err(ConfigError::BelowMinCwnd {
                    name,
                    value,
                    min_cwnd: self.min_cwnd,
                });
            }
        }
        if !(self.cubic_c > 0.0) {
            return Err(ConfigError::CubicC(self.cubic_c));
        }
        if self.read_buffer == 0 {
            return Err(ConfigError::ReadBuffer);
        }
        self.rtt.validate()
    }

    pub fn server_endpoint(&self) -> String {
        format!("{}:{}", self.server_addr, self.port)
    }
}
