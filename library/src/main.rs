use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rover_library::{
    ChangeNotifier, CollapsingProjector, DirectoryTreeNode, JsonWatchStore, LibraryConfig,
    LibraryPanel,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Manage the directories a reference library watches.
#[derive(Debug, Parser)]
#[command(name = "rover-library", version)]
struct Cli {
    /// Config file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Watch store file, overriding the config.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List watched directories.
    List,

    /// Print the directory trees.
    Tree {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Watch new directories.
    Add {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Stop watching a directory.
    Remove { path: String },

    /// Print the search prefixes for a selection of tree nodes.
    Select {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Follow filesystem changes until interrupted.
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => LibraryConfig::load(path)
            .await
            .with_context(|| format!("loading config {}", path.display()))?,
        None => LibraryConfig::default(),
    };
    if let Some(store) = cli.store {
        config.store_path = store;
    }

    let store = Arc::new(JsonWatchStore::open(&config.store_path).await?);
    let projector = Arc::new(CollapsingProjector::new(config.policy()));
    let panel = LibraryPanel::builder()
        .with_config(config)
        .with_watch_service(store)
        .with_projector(projector)
        .build()
        .await?;

    match cli.command {
        Command::List => {
            for root in panel.watched_roots().await {
                println!("{root}");
            }
        }
        Command::Tree { json } => {
            let trees = panel.trees().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&trees)?);
            } else {
                for tree in &trees {
                    print_tree(tree, 0);
                }
            }
        }
        Command::Add { paths } => {
            let admission = panel.add_directories(&paths).await;
            for path in &admission.admitted {
                println!("added {path}");
            }
            for rejection in &admission.rejected {
                println!("rejected {}: {}", rejection.path, rejection.reason);
            }
            for diagnostic in &admission.diagnostics {
                println!("warning: {diagnostic}");
            }
            report_pending(&panel).await;
        }
        Command::Remove { path } => {
            if panel.remove_directory(&path).await {
                println!("removed {path}");
            } else {
                println!("not watched: {path}");
            }
            report_pending(&panel).await;
        }
        Command::Select { ids } => {
            let accepted = panel.select(&ids).await;
            for id in ids.iter().filter(|id| !accepted.contains(*id)) {
                println!("unknown: {id}");
            }
            for prefix in panel.search_prefixes().await {
                println!("{prefix}");
            }
        }
        Command::Watch => watch(Arc::new(panel)).await?,
    }

    Ok(())
}

async fn watch(panel: Arc<LibraryPanel>) -> anyhow::Result<()> {
    let (mut notifier, changes) = ChangeNotifier::new(256)?;
    for root in panel.watched_roots().await {
        if let Err(e) = notifier.watch(&root) {
            warn!("Not following {root}: {e}");
        }
    }

    let listener = panel.spawn_change_listener(changes);
    let retry = panel.spawn_retry_loop();

    println!(
        "following {} directories, press Ctrl-C to stop",
        notifier.watched().len()
    );
    tokio::signal::ctrl_c().await?;

    listener.abort();
    if let Some(retry) = retry {
        retry.abort();
    }
    Ok(())
}

async fn report_pending(panel: &LibraryPanel) {
    for path in panel.soft_pending().await {
        println!("pending sync: {path}");
    }
}

fn print_tree(node: &DirectoryTreeNode, depth: usize) {
    if depth == 0 {
        println!("{}", node.id);
    } else {
        println!("{}{}", "  ".repeat(depth), node.label);
    }
    for child in &node.children {
        print_tree(child, depth + 1);
    }
}
