use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use split_tree::{FileStore, SplitNode, format, sum_of_best};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use splitd::config::{self, FileConfig, SplitdConfig};
use splitd::{Server, SnapshotReceiver};

#[derive(Parser)]
#[command(name = "splitd")]
#[command(about = "Split timer session server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Directory containing config.toml
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Socket path (overrides config and SPLITD_SOCK_PATH)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Root directory for split data
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Print each foreground snapshot change as a JSON line on stdout
    #[arg(long, global = true)]
    print_snapshots: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server (default)
    Serve,
    /// Parse a split-definition file and print its tree
    Check {
        /// Split-definition file
        file: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.debug {
        "splitd=debug,split_tree=debug,info"
    } else {
        "splitd=info,split_tree=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    match cli.command {
        Some(Commands::Check { ref file }) => check(file),
        Some(Commands::Serve) | None => serve(&cli).await,
    }
}

async fn serve(cli: &Cli) -> Result<()> {
    let config_dir = cli
        .config_dir
        .clone()
        .unwrap_or_else(config::default_config_dir);
    let file_config: FileConfig =
        config::load_config(&config_dir, cli.socket.as_deref(), cli.data_dir.as_deref())
            .extract()
            .context("Failed to load configuration")?;
    let config = SplitdConfig::from_file(&file_config);
    info!(data_dir = %config.data_dir.display(), "starting splitd");

    let store = Arc::new(FileStore::new(config.data_dir.clone()));
    let server = Server::bind(config.server, store)?;

    if cli.print_snapshots {
        tokio::spawn(print_snapshots(server.subscribe()));
    }

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupt received, shutting down"),
            Err(error) => warn!(%error, "failed to listen for interrupt"),
        }
        signal.cancel();
    });

    server.run(shutdown).await
}

async fn print_snapshots(mut rx: SnapshotReceiver) {
    while rx.changed().await.is_ok() {
        let line = match rx.borrow_and_update().as_ref() {
            Some(snapshot) => serde_json::to_string(snapshot),
            None => Ok("null".to_string()),
        };
        match line {
            Ok(line) => println!("{line}"),
            Err(error) => warn!(%error, "failed to serialize snapshot"),
        }
    }
}

fn check(path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let tree = format::parse(&text).with_context(|| format!("Failed to parse {}", path.display()))?;

    println!("{:>4}  {:<32} {:>12} {:>12}", "id", "name", "best", "pb");
    print_nodes(tree.nodes(), 0);
    println!();
    println!("{} splits, sum of best {}", tree.len(), sum_of_best(&tree).format(true));
    Ok(())
}

fn print_nodes(nodes: &[SplitNode], depth: usize) {
    for node in nodes {
        let name = format!("{}{}", "  ".repeat(depth), node.name());
        match node {
            SplitNode::Leaf(leaf) => println!(
                "{:>4}  {:<32} {:>12} {:>12}",
                leaf.id(),
                name,
                leaf.times.best_segment.format(true),
                leaf.times.personal_best.format(true),
            ),
            SplitNode::Group(group) => {
                println!("{:>4}  {:<32}", "", name);
                print_nodes(group.children(), depth + 1);
            }
        }
    }
}
