use crate::config::{ClientConfig, ServerConfig, Variant};
use crate::frame::Seq;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub server: ServerConfigOverride,
    #[serde(default)]
    pub client: ClientConfigOverride,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ServerConfigOverride {
    pub loss_rate: Option<f64>,
    pub seed: Option<u64>,
    pub drop_sequences: Option<Vec<Seq>>,
}

impl ServerConfigOverride {
    pub fn apply_to(&self, config: &mut ServerConfig) {
        if let Some(v) = self.loss_rate {
            config.loss_rate = v;
        }
        if let Some(v) = self.seed {
            config.seed = Some(v);
        }
        if let Some(v) = &self.drop_sequences {
            config.drop_sequences = v.clone();
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ClientConfigOverride {
    pub max_packets: Option<u64>,
    pub initial_cwnd: Option<f64>,
    pub initial_ssthresh: Option<f64>,
    pub min_cwnd: Option<f64>,
    pub variant: Option<Variant>,
    pub cubic_c: Option<f64>,
    pub initial_w_max: Option<f64>,
    pub initial_timeout: Option<f64>,
}

impl ClientConfigOverride {
    pub fn apply_to(&self, config: &mut ClientConfig) {
        if let Some(v) = self.max_packets {
            config.max_packets = v;
        }
        if let Some(v) = self.initial_cwnd {
            config.initial_cwnd = v;
        }
        if let Some(v) = self.initial_ssthresh {
            config.initial_ssthresh = v;
        }
        if let Some(v) = self.min_cwnd {
            config.min_cwnd = v;
        }
        if let Some(v) = self.variant {
            config.variant = v;
        }
        if let Some(v) = self.cubic_c {
            config.cubic_c = v;
        }
        if let Some(v) = self.initial_w_max {
            config.initial_w_max = v;
        }
        if let Some(v) = self.initial_timeout {
            config.rtt.initial_timeout = v;
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Assertion {
    /// Every packet was cumulatively acknowledged.
    Completed,
    /// Total transmissions (first sends plus retransmissions) is within range
    PacketsSent { min: u64, max: Option<u64> },
    Retransmissions { min: u64, max: Option<u64> },
    FastRecoveries { min: u64, max: Option<u64> },
    Timeouts { min: u64, max: Option<u64> },
    /// The largest per-round cwnd is within range
    WindowMax { min: f64, max: Option<f64> },
    /// cwnd reaches at least `from_at_least` and later falls to at most `to_at_most`
    WindowDrop { from_at_least: f64, to_at_most: f64 },
    /// Session finishes within the given wall-clock budget
    MaxDuration { ms: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scenario() {
        let scenario: Scenario = toml::from_str(
            r#"
            name = "drop-three"
            description = "packet 3 is lost once"

            [server]
            loss_rate = 0.0
            drop_sequences = [3]

            [client]
            max_packets = 10
            variant = "reno"

            [[assertions]]
            type = "completed"

            [[assertions]]
            type = "fast_recoveries"
            min = 1
            "#,
        )
        .unwrap();

        assert_eq!(scenario.name, "drop-three");
        assert_eq!(scenario.server.drop_sequences, Some(vec![3]));
        assert_eq!(scenario.client.variant, Some(Variant::Reno));
        assert_eq!(
            scenario.assertions,
            vec![
                Assertion::Completed,
                Assertion::FastRecoveries { min: 1, max: None }
            ]
        );
    }

    #[test]
    fn test_override_only_touches_given_fields() {
        let mut config = ClientConfig::default();
        let overrides = ClientConfigOverride {
            max_packets: Some(20),
            initial_timeout: Some(0.5),
            ..Default::default()
        };
        overrides.apply_to(&mut config);
        assert_eq!(config.max_packets, 20);
        assert_eq!(config.rtt.initial_timeout, 0.5);
        assert_eq!(config.initial_ssthresh, 64.0);
        assert_eq!(config.variant, Variant::Reno);
    }
}
