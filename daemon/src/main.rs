//! Masternode daemon: entry point for running the masternode service.

mod detached;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use mx_node::{init_logging, Collaborators, MasternodeNode, NodeConfig, StaticSporks};
use mx_types::{NetworkId, SystemClock, Timestamp};

use crate::detached::{DetachedChain, DetachedPeers};

#[derive(Parser)]
#[command(name = "mx-daemon", about = "Masternode registry, payment consensus and sync service")]
struct Cli {
    /// Network to join: "main", "test" or "regtest".
    /// When a config file is provided, defaults to the file's network value.
    #[arg(long, env = "MX_NETWORK")]
    network: Option<NetworkId>,

    /// Directory holding the registry and payment caches.
    #[arg(long, env = "MX_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// P2P port (defaults to the network default).
    #[arg(long, env = "MX_P2P_PORT")]
    port: Option<u16>,

    /// Run a local masternode.
    #[arg(long, env = "MX_MASTERNODE")]
    masternode: bool,

    /// Hex seed of the masternode operational key.
    #[arg(long, env = "MX_MASTERNODE_KEY", hide_env_values = true)]
    masternode_key: Option<String>,

    /// Public `ip:port` announced by the local masternode.
    #[arg(long, env = "MX_MASTERNODE_ADDR")]
    masternode_addr: Option<String>,

    /// Enable Prometheus metrics.
    #[arg(long, env = "MX_ENABLE_METRICS")]
    metrics: bool,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "MX_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "MX_LOG_FORMAT")]
    log_format: Option<String>,

    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the service until SIGINT/SIGTERM.
    Run,
    /// Load the caches from the data directory and print a status report.
    Inspect,
    /// Print the effective configuration as TOML.
    Config,
}

impl Cli {
    /// File settings overridden by flags and environment.
    fn node_config(&self) -> anyhow::Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::from_toml_file(&path.to_string_lossy())?,
            None => NodeConfig::default(),
        };
        if let Some(network) = self.network {
            config.network = network;
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.masternode {
            config.masternode = true;
        }
        if let Some(key) = &self.masternode_key {
            config.masternode_key = Some(key.clone());
        }
        if let Some(addr) = &self.masternode_addr {
            config.masternode_addr = Some(addr.clone());
        }
        if self.metrics {
            config.enable_metrics = true;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.log_format = format.clone();
        }
        Ok(config)
    }
}

fn detached(config: &NodeConfig) -> Collaborators {
    Collaborators {
        chain: Arc::new(DetachedChain),
        sporks: Arc::new(StaticSporks::new(config.sporks.clone())),
        clock: Arc::new(SystemClock),
        peers: Arc::new(DetachedPeers),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match cli.node_config() {
        Ok(config) => config,
        Err(e) => {
            mx_utils::init_tracing();
            tracing::error!(error = %e, "invalid configuration");
            return Err(e);
        }
    };
    if !init_logging(config.log_format()?, &config.log_level) {
        mx_utils::init_tracing();
    }

    match cli.command {
        Command::Config => {
            println!("{}", config.to_toml_string()?);
        }
        Command::Inspect => {
            let node = MasternodeNode::new(config.clone(), detached(&config))?;
            node.load_caches();
            println!("{}", node.status_json()?);
            println!("{}", node.registry.summary());
            println!("{}", node.payments.summary());
            let now = Timestamp::now().as_secs();
            for entry in node.registry.entries() {
                println!(
                    "{} {} {} protocol {} last ping {}",
                    entry.outpoint,
                    entry.addr,
                    entry.state,
                    entry.protocol_version,
                    mx_utils::format_age(entry.last_ping.sig_time.as_secs(), now),
                );
            }
        }
        Command::Run => {
            tracing::info!(
                network = %config.network,
                port = config.p2p_port(),
                metrics = config.enable_metrics,
                "starting masternode daemon without a chain backend"
            );
            let node = Arc::new(MasternodeNode::new(config.clone(), detached(&config))?);
            node.load_caches();
            let handle = node.start();

            let reason = node.shutdown.wait_for_signal().await;
            tracing::info!(%reason, "shutdown signal received, stopping service");
            node.stop(handle).await;

            if config.enable_metrics {
                tracing::info!(metrics = %node.metrics.encode()?, "final metrics");
            }
            tracing::info!("masternode daemon exited cleanly");
        }
    }

    Ok(())
}
