use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

use tcp_cc_abstract::{ClientConfig, Seq, ServerConfig, Variant};
use tcp_cc_simulator::{Server, SessionReport, run_client, scenario_runner};

#[derive(Parser, Debug)]
#[command(author, version, about = "TCP congestion-control simulator over loopback TCP")]
struct Args {
    /// Write logs to this file instead of stderr.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the lossy cumulative-ACK receiver.
    Server {
        /// TOML file with a full server configuration; flags override it.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        loss_rate: Option<f64>,
        #[arg(long)]
        seed: Option<u64>,
        /// Always drop the first arrival of these sequence numbers.
        #[arg(long, value_delimiter = ',')]
        drop: Vec<Seq>,
    },
    /// Run one sending session against a receiver.
    Client {
        /// TOML file with a full client configuration; flags override it.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        max_packets: Option<u64>,
        /// `reno` or `cubic`.
        #[arg(long)]
        variant: Option<Variant>,
        #[arg(long)]
        cwnd: Option<f64>,
        #[arg(long)]
        ssthresh: Option<f64>,
        #[arg(long)]
        min_cwnd: Option<f64>,
        #[arg(long)]
        cubic_c: Option<f64>,
        /// Seconds to wait before the first retransmission timeout.
        #[arg(long)]
        initial_timeout: Option<f64>,
        /// Write one "<cwnd> <ssthresh>" line per round.
        #[arg(long)]
        window_log: Option<PathBuf>,
        /// Write one RTT sample (seconds) per line.
        #[arg(long)]
        rtt_log: Option<PathBuf>,
        /// Write the full session report as JSON.
        #[arg(long)]
        trace_out: Option<PathBuf>,
    },
    /// Run a TOML scenario against an in-process receiver and check its assertions.
    Scenario {
        path: PathBuf,
        #[arg(long)]
        trace_out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_file.as_deref())?;
    info!("tcp-cc starting…");

    match args.command {
        Command::Server {
            config,
            host,
            port,
            loss_rate,
            seed,
            drop,
        } => {
            let mut server_config: ServerConfig = load_or_default(config.as_deref())?;
            if let Some(v) = host {
                server_config.listen_addr = v;
            }
            if let Some(v) = port {
                server_config.port = v;
            }
            if let Some(v) = loss_rate {
                server_config.loss_rate = v;
            }
            if seed.is_some() {
                server_config.seed = seed;
            }
            if !drop.is_empty() {
                server_config.drop_sequences = drop;
            }
            Server::bind(server_config).await?.run().await?;
        }
        Command::Client {
            config,
            host,
            port,
            max_packets,
            variant,
            cwnd,
            ssthresh,
            min_cwnd,
            cubic_c,
            initial_timeout,
            window_log,
            rtt_log,
            trace_out,
        } => {
            let mut client_config: ClientConfig = load_or_default(config.as_deref())?;
            if let Some(v) = host {
                client_config.server_addr = v;
            }
            if let Some(v) = port {
                client_config.port = v;
            }
            if let Some(v) = max_packets {
                client_config.max_packets = v;
            }
            if let Some(v) = variant {
                client_config.variant = v;
            }
            if let Some(v) = cwnd {
                client_config.initial_cwnd = v;
            }
            if let Some(v) = ssthresh {
                client_config.initial_ssthresh = v;
            }
            if let Some(v) = min_cwnd {
                client_config.min_cwnd = v;
            }
            if let Some(v) = cubic_c {
                client_config.cubic_c = v;
            }
            if let Some(v) = initial_timeout {
                client_config.rtt.initial_timeout = v;
            }

            let report = run_client(client_config).await?;
            print_summary(&report);
            if let Some(path) = &window_log {
                report
                    .write_window_log(path)
                    .with_context(|| format!("Failed to write window log {}", path.display()))?;
            }
            if let Some(path) = &rtt_log {
                report
                    .write_rtt_log(path)
                    .with_context(|| format!("Failed to write RTT log {}", path.display()))?;
            }
            if let Some(path) = &trace_out {
                write_trace(path, &report)?;
            }
        }
        Command::Scenario { path, trace_out } => {
            let report = scenario_runner::run_scenario(&path).await?;
            print_summary(&report);
            if let Some(trace_path) = &trace_out {
                write_trace(trace_path, &report)?;
            }
        }
    }

    Ok(())
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => tracing_subscriber::fmt::init(),
    }
    Ok(())
}

fn load_or_default<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    let Some(path) = path else {
        return Ok(T::default());
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

fn print_summary(report: &SessionReport) {
    println!(
        "{} packets acknowledged with {} ({} rounds, {:.3}s)",
        report.max_packets, report.variant, report.rounds, report.elapsed_secs
    );
    println!(
        "transmissions={} retransmissions={} fast_recoveries={} timeouts={}",
        report.transmissions, report.retransmissions, report.fast_recoveries, report.timeouts
    );
    println!(
        "final cwnd={} ssthresh={} timeout={:.3}s",
        report.final_cwnd, report.final_ssthresh, report.final_timeout
    );
}

fn write_trace(path: &Path, report: &SessionReport) -> Result<()> {
    report
        .write_json(path)
        .with_context(|| format!("Failed to write trace file {}", path.display()))
}
