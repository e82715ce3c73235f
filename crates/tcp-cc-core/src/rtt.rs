//! Round-trip time smoothing and the adaptive retransmission timeout.
//!
//! ```text
//! estimated_rtt = (1 - α)·estimated_rtt + α·sample
//! dev_rtt       = (1 - β)·dev_rtt + β·|sample - estimated_rtt|
//! timeout       = estimated_rtt + 4·dev_rtt
//! ```
//!
//! All values are seconds. The timeout keeps its configured initial value
//! until the first sample arrives.

use std::time::Duration;
use tcp_cc_abstract::RttConfig;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct RttEstimator {
    alpha: f64,
    beta: f64,
    estimated_rtt: f64,
    dev_rtt: f64,
    timeout: f64,
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new(&RttConfig::default())
    }
}

impl RttEstimator {
    pub fn new(config: &RttConfig) -> Self {
        Self {
            alpha: config.alpha,
            beta: config.beta,
            estimated_rtt: config.initial_estimated_rtt,
            dev_rtt: config.initial_dev_rtt,
            timeout: config.initial_timeout,
        }
    }

    /// Fold a fresh sample in and return the new timeout.
    pub fn sample(&mut self, sample_rtt: f64) -> f64 {
        self.estimated_rtt = (1.0 - self.alpha) * self.estimated_rtt + self.alpha * sample_rtt;
        self.dev_rtt = (1.0 - self.beta) * self.dev_rtt
            + self.beta * (sample_rtt - self.estimated_rtt).abs();
        self.timeout = self.estimated_rtt + 4.0 * self.dev_rtt;
        debug!(
            sample_rtt,
            estimated_rtt = self.estimated_rtt,
            dev_rtt = self.dev_rtt,
            timeout = self.timeout,
            "rtt sample"
        );
        self.timeout
    }

    pub fn estimated_rtt(&self) -> f64 {
        self.estimated_rtt
    }

    pub fn dev_rtt(&self) -> f64 {
        self.dev_rtt
    }

    pub fn timeout(&self) -> f64 {
        self.timeout
    }

    /// The timeout as a [`Duration`] for bounding a blocking receive.
    pub fn timeout_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout).unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_values() {
        let rtt = RttEstimator::default();
        assert_eq!(rtt.estimated_rtt(), 1.0);
        assert_eq!(rtt.dev_rtt(), 0.5);
        assert_eq!(rtt.timeout(), 100.0);
        assert_eq!(rtt.timeout_duration(), Duration::from_secs(100));
    }

    #[test]
    fn test_single_sample() {
        let mut rtt = RttEstimator::default();
        let timeout = rtt.sample(2.0);
        assert_eq!(rtt.estimated_rtt(), 1.125);
        assert_eq!(rtt.dev_rtt(), 0.59375);
        assert_eq!(timeout, 3.5);
    }

    #[test]
    fn test_converges_towards_steady_samples() {
        let mut rtt = RttEstimator::default();
        for _ in 0..200 {
            rtt.sample(0.01);
        }
        assert!((rtt.estimated_rtt() - 0.01).abs() < 1e-6);
        assert!(rtt.dev_rtt() < 1e-6);
        assert!(rtt.timeout() < 0.011);
    }

    #[test]
    fn test_custom_gains() {
        let mut rtt = RttEstimator::new(&RttConfig {
            alpha: 1.0,
            beta: 1.0,
            initial_estimated_rtt: 5.0,
            initial_dev_rtt: 5.0,
            initial_timeout: 10.0,
        });
        rtt.sample(2.0);
        assert_eq!(rtt.estimated_rtt(), 2.0);
        assert_eq!(rtt.dev_rtt(), 0.0);
        assert_eq!(rtt.timeout(), 2.0);
    }
}
