//! Congestion-avoidance growth laws.
//!
//! Slow start, fast recovery and duplicate-ACK detection are shared by every
//! variant and live in [`crate::congestion`]. What differs between Reno and
//! Cubic is captured here: how the window grows per accepted ACK once
//! `cwnd >= ssthresh`, and how hard a retransmission timeout cuts it.

use std::fmt;
use tcp_cc_abstract::Variant;

use crate::congestion::Phase;

/// Inputs available to a growth law when an ACK is accepted in congestion avoidance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowthContext {
    pub cwnd: f64,
    pub min_cwnd: f64,
    /// Window recorded at the last congestion event.
    pub w_max: f64,
    /// Accepted ACKs in congestion avoidance since the last congestion event.
    pub epoch: u64,
}

pub trait GrowthLaw: fmt::Debug + Send {
    fn variant(&self) -> Variant;

    /// Window after one accepted ACK while in congestion avoidance.
    fn on_avoidance_ack(&self, ctx: &GrowthContext) -> f64;

    /// Window right after a retransmission timeout.
    fn window_after_timeout(&self, cwnd: f64, min_cwnd: f64) -> f64;

    /// Phase the controller resumes in after a retransmission timeout.
    fn phase_after_timeout(&self) -> Phase;
}

/// Linear growth, collapse to `min_cwnd` on timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reno;

impl GrowthLaw for Reno {
    fn variant(&self) -> Variant {
        Variant::Reno
    }

    fn on_avoidance_ack(&self, ctx: &GrowthContext) -> f64 {
        ctx.cwnd + 1.0
    }

    fn window_after_timeout(&self, _cwnd: f64, min_cwnd: f64) -> f64 {
        min_cwnd
    }

    fn phase_after_timeout(&self) -> Phase {
        Phase::SlowStart
    }
}

/// `W(t) = C·t³ + W_max`, counted in accepted ACKs since the last congestion event.
#[derive(Debug, Clone, Copy)]
pub struct Cubic {
    c: f64,
}

impl Cubic {
    pub const DEFAULT_C: f64 = 0.4;

    pub fn new(c: f64) -> Self {
        Self { c }
    }
}

impl Default for Cubic {
    fn default() -> Self {
        Self::new(Self::DEFAULT_C)
    }
}

impl GrowthLaw for Cubic {
    fn variant(&self) -> Variant {
        Variant::Cubic
    }

    fn on_avoidance_ack(&self, ctx: &GrowthContext) -> f64 {
        let t = ctx.epoch as f64;
        (self.c * t.powi(3) + ctx.w_max).floor().max(ctx.min_cwnd)
    }

    fn window_after_timeout(&self, cwnd: f64, min_cwnd: f64) -> f64 {
        (cwnd / 2.0).floor().max(min_cwnd)
    }

    fn phase_after_timeout(&self) -> Phase {
        Phase::CongestionAvoidance
    }
}

pub fn growth_law(variant: Variant, cubic_c: f64) -> Box<dyn GrowthLaw> {
    match variant {
        Variant::Reno => Box::new(Reno),
        Variant::Cubic => Box::new(Cubic::new(cubic_c)),
    }
}
