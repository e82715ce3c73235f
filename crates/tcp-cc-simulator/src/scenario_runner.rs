use anyhow::{Context, anyhow};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tcp_cc_abstract::{Assertion, ClientConfig, Scenario, ServerConfig};
use tracing::info;

use crate::server::Server;
use crate::session::run_client;
use crate::trace::SessionReport;

const DEFAULT_BUDGET_MS: u64 = 30_000;

pub fn load_scenario(path: &Path) -> anyhow::Result<Scenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    toml::from_str(&content).context("Failed to parse scenario")
}

pub async fn run_scenario(path: &Path) -> anyhow::Result<SessionReport> {
    let scenario = load_scenario(path)?;
    run_scenario_def(&scenario).await
}

/// Run one client session against an in-process receiver on a loopback port,
/// then check every assertion against the resulting report.
pub async fn run_scenario_def(scenario: &Scenario) -> anyhow::Result<SessionReport> {
    info!("Running Scenario: {}", scenario.name);
    if !scenario.description.is_empty() {
        info!("Description: {}", scenario.description);
    }

    let mut server_config = ServerConfig {
        listen_addr: "127.0.0.1".to_string(),
        port: 0,
        loss_rate: 0.0,
        ..Default::default()
    };
    scenario.server.apply_to(&mut server_config);
    let mut server = Server::bind(server_config).await?;
    let addr = server.local_addr()?;

    let mut client_config = ClientConfig {
        server_addr: addr.ip().to_string(),
        port: addr.port(),
        ..Default::default()
    };
    scenario.client.apply_to(&mut client_config);

    let budget_ms = scenario
        .assertions
        .iter()
        .find_map(|a| {
            if let Assertion::MaxDuration { ms } = a {
                Some(*ms)
            } else {
                None
            }
        })
        .unwrap_or(DEFAULT_BUDGET_MS);

    let acceptor = tokio::spawn(async move { server.accept().await });
    let started = Instant::now();
    let outcome = tokio::time::timeout(
        Duration::from_millis(budget_ms),
        run_client(client_config),
    )
    .await;
    acceptor.abort();

    let report = match outcome {
        Ok(result) => result?,
        Err(_) => return Err(anyhow!("Test timed out after {} ms", budget_ms)),
    };
    check_assertions(&report, &scenario.assertions, started.elapsed())?;

    info!("Test Scenario Passed!");
    Ok(report)
}

pub fn check_assertions(
    report: &SessionReport,
    assertions: &[Assertion],
    elapsed: Duration,
) -> anyhow::Result<()> {
    for assertion in assertions {
        match assertion {
            Assertion::Completed => {
                if !report.completed {
                    return Err(anyhow!(
                        "Assertion Failed: session did not acknowledge all {} packets",
                        report.max_packets
                    ));
                }
            }
            Assertion::PacketsSent { min, max } => {
                check_range("packets sent", report.transmissions, *min, *max)?
            }
            Assertion::Retransmissions { min, max } => {
                check_range("retransmissions", report.retransmissions, *min, *max)?
            }
            Assertion::FastRecoveries { min, max } => {
                check_range("fast recoveries", report.fast_recoveries, *min, *max)?
            }
            Assertion::Timeouts { min, max } => {
                check_range("timeouts", report.timeouts, *min, *max)?
            }
            Assertion::WindowMax { min, max } => {
                let max_win = report.max_cwnd();
                if max_win < *min {
                    return Err(anyhow!(
                        "Assertion Failed: window max {} < expected min {}",
                        max_win,
                        min
                    ));
                }
                if let Some(m) = max
                    && max_win > *m
                {
                    return Err(anyhow!(
                        "Assertion Failed: window max {} > expected max {}",
                        max_win,
                        m
                    ));
                }
            }
            Assertion::WindowDrop {
                from_at_least,
                to_at_most,
            } => {
                let mut seen_high = false;
                let mut seen_drop = false;
                let windows = report
                    .window_trace
                    .iter()
                    .map(|s| s.cwnd)
                    .chain(std::iter::once(report.final_cwnd));
                for w in windows {
                    if !seen_high && w >= *from_at_least {
                        seen_high = true;
                    } else if seen_high && w <= *to_at_most {
                        seen_drop = true;
                        break;
                    }
                }
                if !seen_high || !seen_drop {
                    return Err(anyhow!(
                        "Assertion Failed: window did not drop from >= {} down to <= {}",
                        from_at_least,
                        to_at_most
                    ));
                }
            }
            Assertion::MaxDuration { ms } => {
                if elapsed > Duration::from_millis(*ms) {
                    return Err(anyhow!(
                        "Assertion Failed: session took {} ms, expected at most {}",
                        elapsed.as_millis(),
                        ms
                    ));
                }
            }
        }
    }
    Ok(())
}

fn check_range(what: &str, value: u64, min: u64, max: Option<u64>) -> anyhow::Result<()> {
    if value < min {
        return Err(anyhow!(
            "Assertion Failed: {} was {}, expected min {}",
            what,
            value,
            min
        ));
    }
    if let Some(max) = max
        && value > max
    {
        return Err(anyhow!(
            "Assertion Failed: {} was {}, expected max {}",
            what,
            value,
            max
        ));
    }
    Ok(())
}
