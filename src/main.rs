//! Kubeblog - a blog server fed by BlogPost/BlogPage custom resources.

mod check;
mod cli;
mod config;
mod content;
mod feed;
mod logger;
mod serve;
mod sync;

use anyhow::{Context, Result, anyhow};
use check::check_manifests;
use clap::Parser;
use cli::{Cli, Commands};
use config::{SiteConfig, cfg, init_config};
use content::ContentStore;
use serve::{Site, serve_site};
use std::{
    sync::{Arc, mpsc},
    thread,
    time::Duration,
};
use sync::{Controller, ManifestSource, Shutdown};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = SiteConfig::load(&cli)?;
    if config.config_path.is_file() {
        log!("config"; "using {}", config.config_path.display());
    } else {
        log!("config"; "{} not found, using defaults", config.config_path.display());
    }
    init_config(config);

    match &cli.command {
        Commands::Serve { .. } => run_server(),
        Commands::Check { .. } => check_manifests(&cfg()),
    }
}

/// Start the controller in the background and serve until Ctrl+C or a
/// fatal sync error.
fn run_server() -> Result<()> {
    let c = cfg();
    let store = Arc::new(ContentStore::new());
    let source = Arc::new(ManifestSource::new(&c.source.manifests));
    let controller = Arc::new(Controller::new(
        source,
        Arc::clone(&store),
        c.source.namespace.clone(),
        Duration::from_secs(c.source.sync_timeout_secs),
    ));

    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            log!("serve"; "shutting down...");
            shutdown.cancel();
        })
        .context("Failed to set Ctrl+C handler")?;
    }

    let (done_tx, done_rx) = mpsc::channel();
    {
        let controller = Arc::clone(&controller);
        let shutdown = shutdown.clone();
        thread::Builder::new()
            .name("controller".into())
            .spawn(move || {
                let result = controller.start(&shutdown);
                if let Err(err) = &result {
                    log!("error"; "controller stopped: {err}");
                    shutdown.cancel();
                }
                done_tx.send(result).ok();
            })
            .context("Failed to spawn controller thread")?;
    }

    let site = Site {
        store,
        state: controller.state(),
    };
    let served = serve_site(site, &shutdown);
    shutdown.cancel();

    let grace = Duration::from_secs(c.serve.shutdown_grace_secs);
    let synced = match done_rx.recv_timeout(grace) {
        Ok(result) => result.context("resource sync failed"),
        Err(_) => Err(anyhow!(
            "controller did not stop within {}s",
            grace.as_secs()
        )),
    };

    served?;
    synced
}
