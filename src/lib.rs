//! ZenView - distraction-free viewing toggle
//!
//! A per-page visual mode kept consistent across three kinds of context:
//! one page agent per loaded page, a process-wide coordinator, and transient
//! UI surfaces (popup and settings page). The binary hosts all of them on an
//! in-process [`bus::ExtensionBus`] driven by an interactive shell.

use anyhow::Context;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

pub mod bus;
pub mod config;
pub mod coordinator;
pub mod host;
pub mod indicator;
pub mod logging;
pub mod page_agent;
pub mod protocol;
pub mod shell;
pub mod shortcut;
pub mod site;
pub mod storage;
pub mod ui;

use bus::ExtensionBus;
use shell::{Shell, ShellOutcome};
use storage::FileStore;

/// Start the host and run the shell on stdin until `quit` or end of input
pub async fn run() -> anyhow::Result<()> {
    logging::init();
    tracing::info!("ZenView starting");

    let cfg = config::get_config();
    let store_path = cfg.storage.resolved_path();
    if let Some(parent) = store_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tracing::info!("Settings store at {}", store_path.display());

    let bus = ExtensionBus::new(cfg, Arc::new(FileStore::new(store_path)));
    let mut shell = Shell::new(bus);

    println!("ZenView shell. Type 'help' for commands.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .context("Failed to read from stdin")?
    {
        match shell.run_line(&line).await {
            Ok(ShellOutcome::Lines(output)) => {
                for l in output {
                    println!("{}", l);
                }
            }
            Ok(ShellOutcome::Quit) => break,
            Err(e) => println!("Error: {}", e),
        }
    }

    tracing::info!("ZenView stopped");
    Ok(())
}
