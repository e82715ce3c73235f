//! Sender-side congestion window state machine.
//!
//! ```text
//!              new ACK, cwnd < ssthresh
//!                  ┌──────┐
//!                  ▼      │
//!            ┌───────────────┐  cwnd >= ssthresh  ┌──────────────────────┐
//!  start ──▶ │   SlowStart   │ ─────────────────▶ │ CongestionAvoidance  │
//!            └───────────────┘                    └──────────────────────┘
//!                  ▲   timeout (Reno)                 │  3rd dup ACK ▲
//!                  └──────────────────────────────────┤              │ new ACK
//!                                                     ▼              │
//!                                               ┌──────────────────────┐
//!                                               │     FastRecovery     │
//!                                               └──────────────────────┘
//! ```
//!
//! An accepted ACK that finds `cwnd < ssthresh` doubles the window from any
//! phase, so a Cubic step that lands below ssthresh drops back into slow start.
//!
//! Every operation leaves `cwnd >= min_cwnd` and `ssthresh >= min_cwnd`.

use std::collections::BTreeSet;
use std::fmt;
use tcp_cc_abstract::{ClientConfig, Seq, Variant};
use tracing::{debug, warn};

use crate::growth::{GrowthContext, GrowthLaw, growth_law};

/// Duplicate ACKs that trigger fast retransmit.
pub const DUP_ACK_THRESHOLD: u32 = 3;

/// Fast recovery inflates the halved window by one segment per duplicate ACK seen.
const RECOVERY_INFLATION: f64 = DUP_ACK_THRESHOLD as f64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    SlowStart,
    CongestionAvoidance,
    FastRecovery,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::SlowStart => f.write_str("slow-start"),
            Phase::CongestionAvoidance => f.write_str("congestion-avoidance"),
            Phase::FastRecovery => f.write_str("fast-recovery"),
        }
    }
}

/// Window values after an operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowUpdate {
    pub cwnd: f64,
    pub ssthresh: f64,
    pub phase: Phase,
}

/// Result of a loss signal: the new window plus the packets to send again.
#[derive(Debug, Clone, PartialEq)]
pub struct Reaction {
    pub window: WindowUpdate,
    pub retransmit: Vec<Seq>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerParams {
    pub initial_cwnd: f64,
    pub initial_ssthresh: f64,
    pub min_cwnd: f64,
    pub initial_w_max: f64,
}

impl Default for ControllerParams {
    fn default() -> Self {
        Self {
            initial_cwnd: 1.0,
            initial_ssthresh: 64.0,
            min_cwnd: 1.0,
            initial_w_max: 10.0,
        }
    }
}

impl From<&ClientConfig> for ControllerParams {
    fn from(config: &ClientConfig) -> Self {
        Self {
            initial_cwnd: config.initial_cwnd,
            initial_ssthresh: config.initial_ssthresh,
            min_cwnd: config.min_cwnd,
            initial_w_max: config.initial_w_max,
        }
    }
}

#[derive(Debug)]
pub struct CongestionController {
    law: Box<dyn GrowthLaw>,
    phase: Phase,
    cwnd: f64,
    ssthresh: f64,
    min_cwnd: f64,
    w_max: f64,
    /// Accepted ACKs in congestion avoidance since the last congestion event.
    epoch: u64,
    duplicate_acks: u32,
}

impl CongestionController {
    pub fn new(law: Box<dyn GrowthLaw>, params: ControllerParams) -> Self {
        let min_cwnd = params.min_cwnd.max(1.0);
        let mut controller = Self {
            law,
            phase: Phase::SlowStart,
            cwnd: params.initial_cwnd,
            ssthresh: params.initial_ssthresh,
            min_cwnd,
            w_max: params.initial_w_max,
            epoch: 0,
            duplicate_acks: 0,
        };
        controller.clamp();
        if controller.cwnd >= controller.ssthresh {
            controller.phase = Phase::CongestionAvoidance;
        }
        controller
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            growth_law(config.variant, config.cubic_c),
            ControllerParams::from(config),
        )
    }

    pub fn variant(&self) -> Variant {
        self.law.variant()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn cwnd(&self) -> f64 {
        self.cwnd
    }

    pub fn ssthresh(&self) -> f64 {
        self.ssthresh
    }

    pub fn min_cwnd(&self) -> f64 {
        self.min_cwnd
    }

    pub fn w_max(&self) -> f64 {
        self.w_max
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn duplicate_acks(&self) -> u32 {
        self.duplicate_acks
    }

    /// Whole packets the current window admits.
    pub fn send_window(&self) -> u64 {
        self.cwnd.floor() as u64
    }

    pub fn window(&self) -> WindowUpdate {
        WindowUpdate {
            cwnd: self.cwnd,
            ssthresh: self.ssthresh,
            phase: self.phase,
        }
    }

    /// A new (non-duplicate) cumulative ACK was accepted.
    pub fn on_ack(&mut self) -> WindowUpdate {
        self.duplicate_acks = 0;
        if self.phase == Phase::FastRecovery {
            debug!("new ACK ends fast recovery");
            self.phase = Phase::CongestionAvoidance;
        }

        // Any window below ssthresh doubles, including one a Cubic step left there.
        if self.cwnd < self.ssthresh {
            self.phase = Phase::SlowStart;
            self.cwnd = (self.cwnd * 2.0).min(self.ssthresh);
            if self.cwnd >= self.ssthresh {
                debug!(
                    cwnd = self.cwnd,
                    ssthresh = self.ssthresh,
                    "slow start reached ssthresh"
                );
                self.phase = Phase::CongestionAvoidance;
            }
        } else {
            self.phase = Phase::CongestionAvoidance;
            self.epoch += 1;
            self.cwnd = self.law.on_avoidance_ack(&GrowthContext {
                cwnd: self.cwnd,
                min_cwnd: self.min_cwnd,
                w_max: self.w_max,
                epoch: self.epoch,
            });
        }

        self.clamp();
        self.window()
    }

    /// The same cumulative ACK arrived again.
    ///
    /// On the third duplicate the controller enters fast recovery and asks for
    /// every outstanding packet below `next_seq` to be retransmitted. Any other
    /// duplicate only bumps the counter.
    pub fn on_duplicate_ack(&mut self, unacked: &BTreeSet<Seq>, next_seq: Seq) -> Reaction {
        self.duplicate_acks += 1;
        if self.duplicate_acks != DUP_ACK_THRESHOLD {
            return Reaction {
                window: self.window(),
                retransmit: Vec::new(),
            };
        }

        let before = self.cwnd;
        self.congestion_event();
        self.cwnd = self.ssthresh + RECOVERY_INFLATION;
        self.phase = Phase::FastRecovery;
        self.clamp();

        let retransmit: Vec<Seq> = unacked.range(..next_seq).copied().collect();
        warn!(
            before,
            cwnd = self.cwnd,
            ssthresh = self.ssthresh,
            retransmit = retransmit.len(),
            "triple duplicate ACK, entering fast recovery"
        );
        Reaction {
            window: self.window(),
            retransmit,
        }
    }

    /// No ACK arrived within the retransmission timeout while packets were outstanding.
    pub fn on_timeout(&mut self, unacked: &BTreeSet<Seq>) -> Reaction {
        let before = self.cwnd;
        self.congestion_event();
        self.cwnd = self.law.window_after_timeout(before, self.min_cwnd);
        self.phase = self.law.phase_after_timeout();
        self.duplicate_acks = 0;
        self.clamp();

        warn!(
            before,
            cwnd = self.cwnd,
            ssthresh = self.ssthresh,
            phase = %self.phase,
            "retransmission timeout"
        );
        Reaction {
            window: self.window(),
            retransmit: unacked.first().copied().into_iter().collect(),
        }
    }

    fn congestion_event(&mut self) {
        self.w_max = self.cwnd;
        self.ssthresh = (self.cwnd / 2.0).floor().max(self.min_cwnd);
        self.epoch = 0;
    }

    fn clamp(&mut self) {
        self.cwnd = self.cwnd.max(self.min_cwnd);
        self.ssthresh = self.ssthresh.max(self.min_cwnd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::growth::{Cubic, Reno};

    fn reno(cwnd: f64, ssthresh: f64) -> CongestionController {
        CongestionController::new(
            Box::new(Reno),
            ControllerParams {
                initial_cwnd: cwnd,
                initial_ssthresh: ssthresh,
                ..Default::default()
            },
        )
    }

    fn cubic(cwnd: f64, ssthresh: f64) -> CongestionController {
        CongestionController::new(
            Box::new(Cubic::default()),
            ControllerParams {
                initial_cwnd: cwnd,
                initial_ssthresh: ssthresh,
                ..Default::default()
            },
        )
    }

    fn assert_floor(cc: &CongestionController) {
        assert!(cc.cwnd() >= cc.min_cwnd());
        assert!(cc.ssthresh() >= cc.min_cwnd());
    }

    #[test]
    fn test_slow_start_doubles_up_to_ssthresh() {
        let mut cc = reno(1.0, 64.0);
        for k in 1..=6 {
            let update = cc.on_ack();
            assert_eq!(update.cwnd, 64f64.min(2f64.powi(k)));
        }
        assert_eq!(cc.phase(), Phase::CongestionAvoidance);
        assert_eq!(cc.on_ack().cwnd, 65.0);
    }

    #[test]
    fn test_slow_start_caps_at_ssthresh() {
        let mut cc = reno(8.0, 10.0);
        assert_eq!(cc.on_ack().cwnd, 10.0);
        assert_eq!(cc.phase(), Phase::CongestionAvoidance);
    }

    #[test]
    fn test_triple_duplicate_enters_fast_recovery() {
        let mut cc = reno(20.0, 64.0);
        let unacked: BTreeSet<Seq> = [5, 6, 7].into_iter().collect();

        assert!(cc.on_duplicate_ack(&unacked, 8).retransmit.is_empty());
        assert!(cc.on_duplicate_ack(&unacked, 8).retransmit.is_empty());
        let reaction = cc.on_duplicate_ack(&unacked, 8);

        assert_eq!(reaction.window.ssthresh, 10.0);
        assert_eq!(reaction.window.cwnd, 13.0);
        assert_eq!(reaction.window.phase, Phase::FastRecovery);
        assert_eq!(reaction.retransmit, vec![5, 6, 7]);
        assert_eq!(cc.w_max(), 20.0);
        assert_eq!(cc.epoch(), 0);
    }

    #[test]
    fn test_further_duplicates_do_not_retrigger() {
        let mut cc = reno(20.0, 64.0);
        let unacked: BTreeSet<Seq> = [1].into_iter().collect();
        for _ in 0..3 {
            cc.on_duplicate_ack(&unacked, 2);
        }
        let fourth = cc.on_duplicate_ack(&unacked, 2);
        assert!(fourth.retransmit.is_empty());
        assert_eq!(fourth.window.cwnd, 13.0);
        assert_eq!(cc.duplicate_acks(), 4);
    }

    #[test]
    fn test_new_ack_leaves_fast_recovery() {
        let mut cc = reno(20.0, 64.0);
        let unacked = BTreeSet::new();
        for _ in 0..3 {
            cc.on_duplicate_ack(&unacked, 0);
        }
        let update = cc.on_ack();
        assert_eq!(update.phase, Phase::CongestionAvoidance);
        assert_eq!(update.cwnd, 14.0);
        assert_eq!(cc.duplicate_acks(), 0);
    }

    #[test]
    fn test_reno_timeout() {
        let mut cc = reno(32.0, 64.0);
        let unacked: BTreeSet<Seq> = [9, 4, 12].into_iter().collect();
        let reaction = cc.on_timeout(&unacked);
        assert_eq!(reaction.window.ssthresh, 16.0);
        assert_eq!(reaction.window.cwnd, 1.0);
        assert_eq!(reaction.window.phase, Phase::SlowStart);
        assert_eq!(reaction.retransmit, vec![4]);
    }

    #[test]
    fn test_cubic_timeout_halves_and_stays_in_avoidance() {
        let mut cc = cubic(32.0, 64.0);
        let reaction = cc.on_timeout(&BTreeSet::new());
        assert_eq!(reaction.window.ssthresh, 16.0);
        assert_eq!(reaction.window.cwnd, 16.0);
        assert_eq!(reaction.window.phase, Phase::CongestionAvoidance);
        assert!(reaction.retransmit.is_empty());
        assert_eq!(cc.w_max(), 32.0);

        // t = 1 since the timeout: 0.4 + 32
        assert_eq!(cc.on_ack().cwnd, 32.0);
        // t = 2: 3.2 + 32
        assert_eq!(cc.on_ack().cwnd, 35.0);
    }

    #[test]
    fn test_cubic_growth_from_w_max() {
        let mut cc = CongestionController::new(
            Box::new(Cubic::default()),
            ControllerParams {
                initial_cwnd: 10.0,
                initial_ssthresh: 10.0,
                min_cwnd: 1.0,
                initial_w_max: 10.0,
            },
        );
        assert_eq!(cc.phase(), Phase::CongestionAvoidance);
        assert_eq!(cc.on_ack().cwnd, 10.0);
        assert_eq!(cc.on_ack().cwnd, 13.0);
    }

    #[test]
    fn test_cubic_step_below_ssthresh_doubles_again() {
        let mut cc = cubic(1.0, 64.0);
        let trace: Vec<f64> = (0..11).map(|_| cc.on_ack().cwnd).collect();
        // 6 doublings reach 64, then t = 1 gives floor(0.4 + 10) = 10
        assert_eq!(trace[5], 64.0);
        assert_eq!(trace[6], 10.0);
        assert_eq!(trace[7], 20.0);
        assert_eq!(trace[8], 40.0);
        assert_eq!(trace[9], 64.0);
        // Doubling ACKs do not advance the cubic epoch: t = 2 gives 13
        assert_eq!(trace[10], 13.0);
        assert_eq!(cc.epoch(), 2);
    }

    #[test]
    fn test_doubling_below_ssthresh_reports_slow_start() {
        let mut cc = cubic(1.0, 64.0);
        for _ in 0..7 {
            cc.on_ack();
        }
        assert_eq!(cc.cwnd(), 10.0);
        assert_eq!(cc.phase(), Phase::CongestionAvoidance);
        let update = cc.on_ack();
        assert_eq!(update.cwnd, 20.0);
        assert_eq!(update.phase, Phase::SlowStart);
    }

    #[test]
    fn test_windows_never_drop_below_min() {
        let mut cc = CongestionController::new(
            Box::new(Reno),
            ControllerParams {
                initial_cwnd: 2.0,
                initial_ssthresh: 2.0,
                min_cwnd: 2.0,
                initial_w_max: 2.0,
            },
        );
        let unacked: BTreeSet<Seq> = [0].into_iter().collect();
        for _ in 0..5 {
            cc.on_timeout(&unacked);
            assert_floor(&cc);
            for _ in 0..3 {
                cc.on_duplicate_ack(&unacked, 1);
                assert_floor(&cc);
            }
            cc.on_ack();
            assert_floor(&cc);
        }
    }
}
