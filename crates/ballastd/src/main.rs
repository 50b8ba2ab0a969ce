//! ballastd — the ballast binary.
//!
//! Keeps a load balancer's listener forwarding weights proportional to the
//! healthy vCPU capacity of each target group.
//!
//! # Usage
//!
//! ```text
//! ballastd once --load-balancer <arn> --listener <arn> [--dry-run]
//! ballastd daemon --config ballast.toml
//! ballastd show --config ballast.toml
//! ```
//!
//! Configuration layers, later winning: `ballast.toml`, the
//! `BALLAST_LOAD_BALANCER` / `BALLAST_LISTENERS` environment variables,
//! then the flags above. The exit status reflects the pass outcome, so
//! `once` composes with cron or a scheduler: degenerate skips are
//! success, a pass where every listener failed is not.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use ballast_aws::AwsPlane;
use ballast_core::{BallastConfig, ControlPlane};
use ballast_rebalance::{ListenerAction, RebalanceOutcome, RebalanceReport, Rebalancer};

#[derive(Parser)]
#[command(
    name = "ballastd",
    about = "Capacity-weighted rebalancer for load balancer target groups",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Flags shared by every subcommand, layered over the config file.
#[derive(Args)]
struct TargetArgs {
    /// Path to ballast.toml (default: ./ballast.toml if present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Load balancer to rebalance; overrides the config file.
    #[arg(long)]
    load_balancer: Option<String>,

    /// Listener to reconcile; repeat for several, overrides the config file.
    #[arg(long = "listener")]
    listeners: Vec<String>,

    /// Region override for the control plane clients.
    #[arg(long)]
    region: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Run one rebalance pass and exit.
    Once {
        #[command(flatten)]
        target: TargetArgs,

        /// Compute and report the update without writing it.
        #[arg(long)]
        dry_run: bool,

        /// Output format: text or json.
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Rebalance on an interval until interrupted.
    Daemon {
        #[command(flatten)]
        target: TargetArgs,

        /// Time between passes (e.g. "60s", "2m"); overrides [rebalance].interval.
        #[arg(long)]
        interval: Option<String>,
    },
    /// Show each configured listener's current forwarding entries. Reads only.
    Show {
        #[command(flatten)]
        target: TargetArgs,

        /// Output format: text or json.
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ballast=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Once {
            target,
            dry_run,
            format,
        } => run_once(target, dry_run, &format).await,
        Command::Daemon { target, interval } => run_daemon(target, interval).await,
        Command::Show { target, format } => show(target, &format).await,
    }
}

fn load_config(target: &TargetArgs) -> anyhow::Result<BallastConfig> {
    let mut config = BallastConfig::load(target.config.as_deref())?;
    if let Some(lb) = &target.load_balancer {
        config.target.load_balancer = lb.clone();
    }
    if !target.listeners.is_empty() {
        // Each --listener may itself carry a comma-separated list.
        config.target.listeners = target
            .listeners
            .iter()
            .flat_map(|l| ballast_core::config::split_listeners(l))
            .collect();
    }
    if let Some(region) = &target.region {
        config.plane.region = Some(region.clone());
    }
    config.normalize();
    Ok(config)
}

async fn run_once(target: TargetArgs, dry_run: bool, format: &str) -> anyhow::Result<()> {
    let mut config = load_config(&target)?;
    if dry_run {
        config.rebalance.dry_run = Some(true);
    }
    config.validate()?;

    let plane: Arc<dyn ControlPlane> = Arc::new(AwsPlane::connect(&config).await);
    let rebalancer = Rebalancer::new(plane, config);
    let report = rebalancer.run_once().await?;

    println!("{}", render(&report, format)?);

    if !report.succeeded() {
        anyhow::bail!("every listener failed to reconcile");
    }
    Ok(())
}

async fn run_daemon(target: TargetArgs, interval: Option<String>) -> anyhow::Result<()> {
    let mut config = load_config(&target)?;
    if let Some(interval) = interval {
        config.rebalance.interval = Some(interval);
    }
    config.validate()?;
    let interval = config.interval();

    let plane: Arc<dyn ControlPlane> = Arc::new(AwsPlane::connect(&config).await);
    let rebalancer = Rebalancer::new(plane, config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("interrupt received, shutting down");
        let _ = shutdown_tx.send(true);
    });

    rebalancer.run(interval, shutdown_rx).await;
    Ok(())
}

async fn show(target: TargetArgs, format: &str) -> anyhow::Result<()> {
    let config = load_config(&target)?;
    config.validate()?;

    let plane: Arc<dyn ControlPlane> = Arc::new(AwsPlane::connect(&config).await);
    let configs = plane.forwarding(&config.target.listeners).await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&configs)?),
        "text" => {
            for fwd in &configs {
                println!(
                    "listener {} (total weight {})",
                    fwd.listener,
                    fwd.total_weight()
                );
                for entry in &fwd.entries {
                    println!("  {:<48} {:>6}", entry.target_group, entry.weight);
                }
            }
        }
        other => anyhow::bail!("unknown format {other:?} (expected text or json)"),
    }
    Ok(())
}

fn render(report: &RebalanceReport, format: &str) -> anyhow::Result<String> {
    match format {
        "json" => Ok(serde_json::to_string_pretty(report)?),
        "text" => Ok(render_text(report)),
        other => anyhow::bail!("unknown format {other:?} (expected text or json)"),
    }
}

fn render_text(report: &RebalanceReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("Load balancer: {}\n", report.load_balancer));
    out.push_str(&format!("Outcome:       {}\n", outcome_label(report.outcome)));

    if !report.capacities.is_empty() {
        out.push('\n');
        push_tally_table(&mut out, &report.capacities, &report.weights);
    }

    if !report.listeners.is_empty() {
        out.push('\n');
        for listener in &report.listeners {
            out.push_str(&format!(
                "listener {}: {}\n",
                listener.listener,
                action_label(&listener.action)
            ));
        }
    }
    out
}

fn push_tally_table(
    out: &mut String,
    capacities: &ballast_core::CapacityTally,
    weights: &ballast_core::WeightTally,
) {
    out.push_str(&format!(
        "{:<48} {:>8}  {:>6}\n",
        "TARGET GROUP", "VCPUS", "WEIGHT"
    ));
    for (tg, capacity) in capacities {
        let weight = weights
            .get(tg)
            .map(|w| w.to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!("{tg:<48} {capacity:>8}  {weight:>6}\n"));
    }
}

fn outcome_label(outcome: RebalanceOutcome) -> &'static str {
    match outcome {
        RebalanceOutcome::Applied => "applied",
        RebalanceOutcome::DryRun => "dry run (no writes)",
        RebalanceOutcome::SkippedNoCapacity => "skipped (no healthy capacity)",
    }
}

fn action_label(action: &ListenerAction) -> String {
    match action {
        ListenerAction::Updated { entries } => format!("updated ({} entries)", entries.len()),
        ListenerAction::SkippedZeroWeight => "skipped, merged weights sum to zero".to_string(),
        ListenerAction::Failed { error } => format!("failed: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballast_core::WeightedTargetGroup;
    use ballast_rebalance::ListenerReport;

    fn sample_report() -> RebalanceReport {
        RebalanceReport {
            load_balancer: "lb-1".to_string(),
            outcome: RebalanceOutcome::Applied,
            capacities: [("tg-a".to_string(), 4), ("tg-b".to_string(), 12)]
                .into_iter()
                .collect(),
            weights: [("tg-a".to_string(), 249), ("tg-b".to_string(), 749)]
                .into_iter()
                .collect(),
            listeners: vec![
                ListenerReport {
                    listener: "lsn-1".to_string(),
                    action: ListenerAction::Updated {
                        entries: vec![
                            WeightedTargetGroup {
                                target_group: "tg-a".to_string(),
                                weight: 249,
                            },
                            WeightedTargetGroup {
                                target_group: "tg-b".to_string(),
                                weight: 749,
                            },
                        ],
                    },
                },
                ListenerReport {
                    listener: "lsn-2".to_string(),
                    action: ListenerAction::SkippedZeroWeight,
                },
            ],
        }
    }

    #[test]
    fn text_report_lists_tallies_and_listeners() {
        let text = render_text(&sample_report());
        assert!(text.contains("Load balancer: lb-1"));
        assert!(text.contains("Outcome:       applied"));
        assert!(text.contains("tg-a"));
        assert!(text.contains("249"));
        assert!(text.contains("listener lsn-1: updated (2 entries)"));
        assert!(text.contains("listener lsn-2: skipped, merged weights sum to zero"));
    }

    #[test]
    fn json_report_round_trips_through_serde() {
        let json = render(&sample_report(), "json").unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["load_balancer"], "lb-1");
        assert_eq!(value["outcome"], "applied");
        assert_eq!(value["weights"]["tg-b"], 749);
        assert_eq!(value["listeners"][1]["action"], "skipped_zero_weight");
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(render(&sample_report(), "yaml").is_err());
    }

    #[test]
    fn flags_override_config_values() {
        let target = TargetArgs {
            config: None,
            load_balancer: Some("lb-flag".to_string()),
            listeners: vec![" lsn-1 , lsn-2 ".to_string(), "lsn-3".to_string()],
            region: Some("eu-west-1".to_string()),
        };
        let config = load_config(&target).unwrap();
        assert_eq!(config.target.load_balancer, "lb-flag");
        assert_eq!(config.target.listeners, vec!["lsn-1", "lsn-2", "lsn-3"]);
        assert_eq!(config.plane.region.as_deref(), Some("eu-west-1"));
    }
}
