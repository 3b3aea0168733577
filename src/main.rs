use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use file_browser_store::fs::local::LocalFs;
use file_browser_store::{
    FileBrowserStore, NodeId, NodeKind, StoreError, StoreEvent, StoreSettings,
};

/// Inspect a directory tree through the file-browser store.
#[derive(Parser, Debug)]
#[command(name = "fbs", version, about)]
struct Cli {
    /// Root path to browse (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Directory to display as the top of the tree (defaults to the root)
    #[arg(long)]
    virtual_root: Option<PathBuf>,

    /// Show hidden files
    #[arg(long)]
    show_hidden: bool,

    /// Only show files matching this glob (directories always pass)
    #[arg(long)]
    pattern: Option<String>,

    /// Keep running, printing change events as the tree updates
    #[arg(long)]
    watch: bool,
}

fn print_tree(store: &FileBrowserStore, id: NodeId, depth: usize) {
    for child in store.visible_children(id) {
        let Some(summary) = store.summary(child) else {
            continue;
        };
        let marker = match summary.kind {
            NodeKind::Directory => "/",
            NodeKind::File => "",
        };
        println!("{}{}{}", "  ".repeat(depth), summary.name, marker);
        if summary.kind == NodeKind::Directory {
            print_tree(store, child, depth + 1);
        }
    }
}

#[tokio::main]
async fn main() -> file_browser_store::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let root = cli.path.canonicalize().map_err(|_| {
        StoreError::InvalidTarget(format!("{} does not exist", cli.path.display()))
    })?;
    let virtual_root = match &cli.virtual_root {
        Some(path) => path.canonicalize().map_err(|_| {
            StoreError::InvalidTarget(format!("{} does not exist", path.display()))
        })?,
        None => root.clone(),
    };

    let mut settings = StoreSettings::default();
    settings.filter.hide_hidden = !cli.show_hidden;
    settings.filter.pattern = cli.pattern.clone();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut store = FileBrowserStore::new(Arc::new(LocalFs::new()), settings, tx);
    store.set_root_and_virtual_root(&root, &virtual_root);
    store.settle().await;

    // Report load problems, drop the row churn of the initial fill.
    while let Ok(event) = rx.try_recv() {
        if let StoreEvent::Error(error) = event {
            eprintln!("warning: {}", error);
        }
    }

    let Some(vr) = store.virtual_root() else {
        return Ok(());
    };
    println!("{}", virtual_root.display());
    print_tree(&store, vr, 1);

    if cli.watch {
        loop {
            tokio::time::sleep(Duration::from_millis(250)).await;
            store.pump();
            while let Ok(event) = rx.try_recv() {
                match event {
                    StoreEvent::Error(error) => eprintln!("warning: {}", error),
                    other => println!("{:?}", other),
                }
            }
        }
    }
    Ok(())
}
