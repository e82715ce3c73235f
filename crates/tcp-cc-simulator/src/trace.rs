use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tcp_cc_abstract::{Seq, Variant};

/// Window state at the start of one send round.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowSample {
    pub round: u64,
    pub cwnd: f64,
    pub ssthresh: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub variant: Variant,
    pub max_packets: u64,
    pub completed: bool,
    /// Distinct sequence numbers sent.
    pub packets_sent: u64,
    pub transmissions: u64,
    pub retransmissions: u64,
    pub new_acks: u64,
    pub duplicate_acks: u64,
    pub ignored_acks: u64,
    pub malformed_frames: u64,
    pub fast_recoveries: u64,
    pub timeouts: u64,
    pub rounds: u64,
    pub elapsed_secs: f64,
    pub final_cwnd: f64,
    pub final_ssthresh: f64,
    pub final_timeout: f64,
    pub window_trace: Vec<WindowSample>,
    pub rtt_samples: Vec<f64>,
}

impl SessionReport {
    pub fn max_cwnd(&self) -> f64 {
        self.window_trace
            .iter()
            .map(|s| s.cwnd)
            .fold(self.final_cwnd, f64::max)
    }

    /// One `"<cwnd> <ssthresh>"` line per round.
    pub fn write_window_log(&self, path: &Path) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        for sample in &self.window_trace {
            writeln!(out, "{} {}", sample.cwnd, sample.ssthresh)?;
        }
        out.flush()
    }

    /// One measured RTT (seconds) per line.
    pub fn write_rtt_log(&self, path: &Path) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        for rtt in &self.rtt_samples {
            writeln!(out, "{rtt}")?;
        }
        out.flush()
    }

    pub fn write_json(&self, path: &Path) -> io::Result<()> {
        let data = serde_json::to_vec_pretty(self).map_err(io::Error::other)?;
        std::fs::write(path, data)
    }
}

/// What the receiver saw on one connection.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSummary {
    pub peer: String,
    pub packets_received: u64,
    pub packets_dropped: u64,
    pub malformed_frames: u64,
    pub acks_sent: u64,
    pub duplicate_acks_sent: u64,
    pub highest_consecutive: Option<Seq>,
}
