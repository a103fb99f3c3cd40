//! CLI entry point for the netscan discovery workers.

use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use ipnet::Ipv4Net;
use tracing_subscriber::{fmt, EnvFilter};

use netscan_core::{InventoryStore, MemoryStore, RangePatch};
use netscan_inventory::GraphClient;

use netscan_discover::config::{load_settings, DiscoverConfig};
use netscan_discover::coordinator::{self, Coordinator, SystemProcesses};
use netscan_discover::fingerprint::legacy::LegacyTransport;
use netscan_discover::fingerprint::transport::RestTransport;
use netscan_discover::fingerprint::FingerprintProber;
use netscan_discover::refresher::Refresher;
use netscan_discover::scanner::NmapScanner;
use netscan_discover::scheduler::{self, RangeScheduler};

#[derive(Parser)]
#[command(name = "netscan")]
#[command(about = "Private address-space discovery and inventory")]
struct Cli {
    /// Config file prefix (default: netscan).
    #[arg(short, long, default_value = "netscan", global = true)]
    config: String,

    /// Use an in-process store instead of Neo4j (dry runs).
    #[arg(long, global = true)]
    memory: bool,

    /// Human-readable logs instead of JSON.
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run discovery workers until one of them stops.
    Run(RunArgs),
    /// Run the liveness refresher.
    Refresh {
        /// Run a single pass and exit.
        #[arg(long)]
        once: bool,
    },
    /// Run the fingerprint prober.
    Fingerprint {
        /// Run a single cycle and exit.
        #[arg(long)]
        once: bool,
    },
    /// Manage address ranges.
    #[command(subcommand)]
    Range(RangeCommand),
}

#[derive(Args)]
struct RunArgs {
    /// Run the range scan scheduler.
    #[arg(long)]
    scheduler: bool,
    /// Run the liveness refresher.
    #[arg(long)]
    refresher: bool,
    /// Run the fingerprint prober.
    #[arg(long)]
    fingerprint: bool,
}

impl RunArgs {
    /// No selection means every worker.
    fn all_if_none(self) -> Self {
        if self.scheduler || self.refresher || self.fingerprint {
            self
        } else {
            Self {
                scheduler: true,
                refresher: true,
                fingerprint: true,
            }
        }
    }
}

#[derive(Subcommand)]
enum RangeCommand {
    /// Add an address range; it is scanned before all known ranges.
    Add {
        network: Ipv4Net,
        #[arg(long)]
        owner: Option<String>,
    },
    /// List ranges eligible for scanning, oldest scan first.
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.pretty {
        fmt().with_env_filter(filter).init();
    } else {
        fmt().with_env_filter(filter).json().init();
    }

    let settings = load_settings(&cli.config)?;

    if cli.memory {
        tracing::warn!("Using in-memory store; nothing is persisted");
        execute(cli.command, settings.discover, MemoryStore::new()).await
    } else {
        let graph = GraphClient::connect(&settings.neo4j).await?;
        tracing::info!(uri = %settings.neo4j.uri, "Connected to Neo4j");
        execute(cli.command, settings.discover, graph).await
    }
}

async fn execute<S>(command: Command, config: DiscoverConfig, store: S) -> anyhow::Result<()>
where
    S: InventoryStore + Clone + 'static,
{
    match command {
        Command::Run(args) => run_workers(args.all_if_none(), config, store).await,
        Command::Refresh { once: true } => {
            let refresher = Refresher::new(config.clone(), store, Arc::new(scanner(&config).await?));
            let summary = refresher.run_pass().await?;
            println!("{}", serde_json::to_string_pretty(&summary_json(summary))?);
            Ok(())
        }
        Command::Refresh { once: false } => {
            let args = RunArgs {
                scheduler: false,
                refresher: true,
                fingerprint: false,
            };
            run_workers(args, config, store).await
        }
        Command::Fingerprint { once: true } => {
            let prober = fingerprint_prober(config, store)?;
            let summary = prober.run_cycle().await?;
            println!(
                "{}",
                serde_json::json!({
                    "candidates": summary.candidates,
                    "classified": summary.classified,
                    "confirmed": summary.confirmed,
                    "failed": summary.failed,
                })
            );
            Ok(())
        }
        Command::Fingerprint { once: false } => {
            let args = RunArgs {
                scheduler: false,
                refresher: false,
                fingerprint: true,
            };
            run_workers(args, config, store).await
        }
        Command::Range(RangeCommand::Add { network, owner }) => {
            let network = network.trunc();
            if !scheduler::is_private(&network) {
                tracing::warn!(range = %network, "Range is not private; it will be marked invalid");
            }
            let patch = RangePatch {
                owner,
                ..RangePatch::new(network)
            };
            store.upsert_range(&patch).await?;
            tracing::info!(range = %network, "Range added");
            Ok(())
        }
        Command::Range(RangeCommand::List) => {
            let ranges = store.schedulable_ranges().await?;
            println!("{}", serde_json::to_string_pretty(&ranges)?);
            Ok(())
        }
    }
}

/// Start the selected workers and wait; returns only when one stops.
async fn run_workers<S>(args: RunArgs, config: DiscoverConfig, store: S) -> anyhow::Result<()>
where
    S: InventoryStore + Clone + 'static,
{
    let mut coordinator = Coordinator::new(store.clone(), SystemProcesses::new());

    if args.scheduler || args.refresher {
        let engine = Arc::new(scanner(&config).await?);

        if args.scheduler {
            let worker = RangeScheduler::new(config.clone(), store.clone(), Arc::clone(&engine));
            coordinator
                .spawn(coordinator::SCHEDULER, async move { worker.run().await })
                .await?;
        }
        if args.refresher {
            let worker = Refresher::new(config.clone(), store.clone(), Arc::clone(&engine));
            coordinator
                .spawn(coordinator::REFRESHER, async move { worker.run().await })
                .await?;
        }
    }

    if args.fingerprint {
        let worker = fingerprint_prober(config, store)?;
        coordinator
            .spawn(coordinator::FINGERPRINT, async move { worker.run().await })
            .await?;
    }

    coordinator.wait().await?;
    Ok(())
}

async fn scanner(config: &DiscoverConfig) -> anyhow::Result<NmapScanner> {
    let ports: Vec<String> = config.check_ports.iter().map(|c| c.nmap_spec()).collect();
    let scanner = NmapScanner::new(&config.nmap_path, &ports, &config.exclude_networks);
    let version = scanner.verify_installation().await?;
    tracing::info!(nmap_version = %version.lines().next().unwrap_or_default(), "Nmap verified");
    Ok(scanner)
}

fn fingerprint_prober<S: InventoryStore>(
    config: DiscoverConfig,
    store: S,
) -> anyhow::Result<FingerprintProber<S, RestTransport, LegacyTransport>> {
    let rest = RestTransport::new(&config.fingerprint)?;
    let legacy = LegacyTransport::new(&config.fingerprint)?;
    Ok(FingerprintProber::new(
        config,
        store,
        Arc::new(rest),
        Arc::new(legacy),
    ))
}

fn summary_json(summary: netscan_discover::refresher::RefreshSummary) -> serde_json::Value {
    serde_json::json!({
        "targets": summary.targets,
        "alive": summary.alive,
        "dead": summary.dead,
        "deleted": summary.deleted,
    })
}
