//! Receive-side cumulative ACK generation.
//!
//! [`AckEngine`] tracks which sequence numbers have arrived and how far the
//! contiguous run from 0 extends:
//!
//! - After every arriving packet (dropped or not) where the next expected
//!   sequence is still missing, the current cumulative ACK is sent again.
//!   These repeats are the duplicate ACKs the sender reacts to.
//! - Whenever the run can be extended, one ACK is emitted per step, so a
//!   retransmission that fills a hole releases the whole buffered run at once.
//!
//! [`Receiver`] pairs the engine with a [`LossModel`]; neither does any I/O.

use std::collections::BTreeSet;
use tcp_cc_abstract::{Frame, Seq};
use tracing::{debug, info};

use crate::loss::LossModel;

#[derive(Debug, Default, Clone)]
pub struct AckEngine {
    highest_consecutive: Option<Seq>,
    /// Admitted sequences above the contiguous run.
    received: BTreeSet<Seq>,
}

impl AckEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn highest_consecutive(&self) -> Option<Seq> {
        self.highest_consecutive
    }

    pub fn next_expected(&self) -> Seq {
        self.highest_consecutive.map_or(0, |h| h + 1)
    }

    /// Whether `seq` has been admitted, either inside the run or buffered above it.
    pub fn has_received(&self, seq: Seq) -> bool {
        seq < self.next_expected() || self.received.contains(&seq)
    }

    /// Out-of-order sequences waiting for the hole below them to fill.
    pub fn buffered(&self) -> usize {
        self.received.len()
    }

    /// Process one arriving packet and return the cumulative ACKs to send, in order.
    pub fn on_packet(&mut self, seq: Seq, admitted: bool) -> Vec<Option<Seq>> {
        if admitted && seq >= self.next_expected() {
            self.received.insert(seq);
        }

        let mut acks = Vec::new();
        if !self.received.contains(&self.next_expected()) {
            acks.push(self.highest_consecutive);
        }
        while self.received.remove(&self.next_expected()) {
            let next = self.next_expected();
            self.highest_consecutive = Some(next);
            acks.push(self.highest_consecutive);
        }
        acks
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    pub packets_received: u64,
    pub packets_dropped: u64,
    pub malformed_frames: u64,
    pub acks_sent: u64,
    pub duplicate_acks_sent: u64,
}

/// One connection's receive side: loss simulation in front of the ACK engine.
#[derive(Debug)]
pub struct Receiver {
    engine: AckEngine,
    loss: Box<dyn LossModel>,
    last_ack_sent: Option<Option<Seq>>,
    stats: ReceiverStats,
}

impl Receiver {
    pub fn new(loss: Box<dyn LossModel>) -> Self {
        Self {
            engine: AckEngine::new(),
            loss,
            last_ack_sent: None,
            stats: ReceiverStats::default(),
        }
    }

    pub fn engine(&self) -> &AckEngine {
        &self.engine
    }

    pub fn stats(&self) -> ReceiverStats {
        self.stats
    }

    pub fn note_malformed(&mut self) {
        self.stats.malformed_frames += 1;
    }

    /// Admit or drop packet `seq` and return the ACK frames to send back.
    pub fn on_packet(&mut self, seq: Seq) -> Vec<Frame> {
        self.stats.packets_received += 1;
        let admitted = !self.loss.should_drop(seq);
        if admitted {
            debug!(seq, "admitted packet");
        } else {
            self.stats.packets_dropped += 1;
            info!(seq, "dropping packet");
        }

        let acks = self.engine.on_packet(seq, admitted);
        for ack in &acks {
            if self.last_ack_sent == Some(*ack) {
                self.stats.duplicate_acks_sent += 1;
            }
            self.last_ack_sent = Some(*ack);
        }
        self.stats.acks_sent += acks.len() as u64;
        acks.into_iter().map(Frame::Ack).collect()
    }
}
