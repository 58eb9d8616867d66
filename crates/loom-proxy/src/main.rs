use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use loom_runtime::{ComponentRegistry, Manifest, ModuleHost};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(
    name = "loom",
    version,
    about = "loom component host: loads components and serves them in-process"
)]
struct Cli {
    /// Module manifest (default: ./etc/modules.toml, then ~/.config/loom/modules.toml)
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Forward every call over the network, overriding the manifest
    #[arg(long)]
    remote: bool,

    /// Load the eager components, print the registry and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the --check summary
    fmt()
        .with_env_filter(EnvFilter::from_env("LOOM_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut manifest =
        Manifest::load(cli.manifest.as_deref()).context("failed to read module manifest")?;
    if cli.remote {
        manifest.remote = true;
    }

    tracing::info!(
        modules = manifest.modules.len(),
        remote = manifest.remote,
        "Starting loom host"
    );

    let registry = Arc::new(ComponentRegistry::new());
    let host = ModuleHost::new(Arc::clone(&registry), manifest);
    host.init().await.context("eager startup failed")?;

    for component in registry.list().await {
        tracing::info!(
            component = %component.name(),
            service_key = %component.service_key(),
            kind = %component.kind(),
            listen_address = component.listen_address().unwrap_or("-"),
            "Component ready"
        );
        if cli.check {
            println!(
                "{}\t{}\t{}\t{}",
                component.name(),
                component.service_key(),
                component.kind(),
                component.listen_address().unwrap_or("-")
            );
        }
    }

    if cli.check {
        return Ok(());
    }

    let lazy = host.manifest().modules.iter().filter(|m| m.lazy).count();
    tracing::info!(
        loaded = registry.len().await,
        lazy,
        service_loops = host.service_loops().len(),
        "Loom host running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;

    tracing::info!("Loom host shutting down");
    Ok(())
}
