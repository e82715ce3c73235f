//! Per-session sender bookkeeping: what is in flight, which ACKs are new,
//! and where RTT samples come from.
//!
//! [`SenderState`] owns the congestion controller and RTT estimator and is
//! driven by the session loop; it performs no I/O itself.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Instant;
use tcp_cc_abstract::{ClientConfig, Seq};
use tracing::{debug, trace};

use crate::congestion::{CongestionController, Reaction, WindowUpdate};
use crate::rtt::RttEstimator;

/// Running totals for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderStats {
    /// First transmissions plus retransmissions.
    pub transmissions: u64,
    pub retransmissions: u64,
    pub new_acks: u64,
    pub duplicate_acks: u64,
    pub ignored_acks: u64,
    pub fast_recoveries: u64,
    pub timeouts: u64,
}

/// How an inbound ACK was classified.
#[derive(Debug, Clone, PartialEq)]
pub enum AckEvent {
    /// The ACK advanced the cumulative point.
    New {
        newly_acked: u64,
        rtt_sample: Option<f64>,
        window: WindowUpdate,
    },
    /// The ACK repeated the last cumulative point.
    Duplicate { count: u32, reaction: Reaction },
    /// Older than the last cumulative point, or covering packets never sent.
    Ignored,
}

#[derive(Debug)]
pub struct SenderState {
    controller: CongestionController,
    rtt: RttEstimator,
    max_packets: u64,
    next_seq: Seq,
    unacked: BTreeSet<Seq>,
    send_times: HashMap<Seq, Instant>,
    /// Sequences sent more than once never yield an RTT sample.
    retransmitted: HashSet<Seq>,
    last_ack: Option<Seq>,
    stats: SenderStats,
}

impl SenderState {
    pub fn new(controller: CongestionController, rtt: RttEstimator, max_packets: u64) -> Self {
        Self {
            controller,
            rtt,
            max_packets,
            next_seq: 0,
            unacked: BTreeSet::new(),
            send_times: HashMap::new(),
            retransmitted: HashSet::new(),
            last_ack: None,
            stats: SenderStats::default(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            CongestionController::from_config(config),
            RttEstimator::new(&config.rtt),
            config.max_packets,
        )
    }

    pub fn controller(&self) -> &CongestionController {
        &self.controller
    }

    pub fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }

    pub fn stats(&self) -> SenderStats {
        self.stats
    }

    pub fn unacked(&self) -> &BTreeSet<Seq> {
        &self.unacked
    }

    pub fn next_seq(&self) -> Seq {
        self.next_seq
    }

    pub fn last_ack(&self) -> Option<Seq> {
        self.last_ack
    }

    pub fn max_packets(&self) -> u64 {
        self.max_packets
    }

    /// New packets allowed this round: `min(cwnd, max_packets - next_seq)`.
    pub fn round_window(&self) -> u64 {
        self.controller
            .send_window()
            .min(self.max_packets - self.next_seq)
    }

    /// Every packet has been sent and cumulatively acknowledged.
    pub fn is_complete(&self) -> bool {
        self.next_seq == self.max_packets && self.unacked.is_empty()
    }

    /// Assign the next sequence number to a packet sent at `now`.
    pub fn record_send(&mut self, now: Instant) -> Seq {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.unacked.insert(seq);
        self.send_times.insert(seq, now);
        self.stats.transmissions += 1;
        seq
    }

    /// Note that `seq` went out again at `now`.
    pub fn record_retransmit(&mut self, seq: Seq, now: Instant) {
        self.retransmitted.insert(seq);
        self.send_times.insert(seq, now);
        self.stats.transmissions += 1;
        self.stats.retransmissions += 1;
    }

    /// Classify a cumulative ACK and feed the controller and RTT estimator.
    pub fn on_ack(&mut self, ack: Option<Seq>, now: Instant) -> AckEvent {
        if ack == self.last_ack {
            self.stats.duplicate_acks += 1;
            let reaction = self
                .controller
                .on_duplicate_ack(&self.unacked, self.next_seq);
            if !reaction.retransmit.is_empty() {
                self.stats.fast_recoveries += 1;
            }
            trace!(?ack, count = self.controller.duplicate_acks(), "duplicate ACK");
            return AckEvent::Duplicate {
                count: self.controller.duplicate_acks(),
                reaction,
            };
        }

        let Some(acked) = ack else {
            self.stats.ignored_acks += 1;
            return AckEvent::Ignored;
        };
        if ack < self.last_ack || acked >= self.next_seq {
            debug!(acked, last_ack = ?self.last_ack, next_seq = self.next_seq, "ignoring ACK");
            self.stats.ignored_acks += 1;
            return AckEvent::Ignored;
        }

        let rtt_sample = self.take_sample(acked, now);
        let remaining = self.unacked.split_off(&(acked + 1));
        let newly_acked = self.unacked.len() as u64;
        self.unacked = remaining;
        self.send_times.retain(|seq, _| *seq > acked);

        self.last_ack = ack;
        self.stats.new_acks += 1;
        let window = self.controller.on_ack();
        debug!(
            acked,
            newly_acked,
            cwnd = window.cwnd,
            ssthresh = window.ssthresh,
            phase = %window.phase,
            "ACK accepted"
        );
        AckEvent::New {
            newly_acked,
            rtt_sample,
            window,
        }
    }

    /// The receive wait expired with packets outstanding.
    pub fn on_timeout(&mut self) -> Reaction {
        self.stats.timeouts += 1;
        self.controller.on_timeout(&self.unacked)
    }

    fn take_sample(&mut self, acked: Seq, now: Instant) -> Option<f64> {
        if !self.unacked.contains(&acked) || self.retransmitted.contains(&acked) {
            return None;
        }
        let sent = self.send_times.get(&acked)?;
        let sample = now.saturating_duration_since(*sent).as_secs_f64();
        self.rtt.sample(sample);
        Some(sample)
    }
}
