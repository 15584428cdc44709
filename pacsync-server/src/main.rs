//! # pacsync server
//!
//! Reconciles the local object store against a remote archive's inventory
//! for a time window, retrieves what is missing, and runs the receive
//! listener the retrievals land on.
//!
//! ## Flow
//!
//! - `init-config` writes a commented starter configuration;
//! - `run` starts the listener, scans the store, streams the study-level
//!   directory query through the reconciliation engine, localizes partial
//!   studies to series gaps, dispatches retrieval, and prints the summary.

use anyhow::{Context, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use pacsync_config::{PacsEndpoints, TransportConfig};
use pacsync_core::{ReceiveListener, ReceiveService, ReconciliationPass};
use pacsync_dimse::loopback::{ArchiveFixture, LoopbackAcceptor, LoopbackArchive, association_channel};
use pacsync_dimse::{ArchiveSession, StudyQuery};
use pacsync_model::{AeTitle, TimeWindow};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pacsync-server", version, about = "PACS inventory reconciliation and refetch")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one reconciliation pass with the receive listener up.
    Run(RunArgs),
    /// Write a commented starter configuration file.
    InitConfig {
        /// Destination path for the template.
        #[arg(long, default_value = "pacs.yaml")]
        path: PathBuf,
    },
}

#[derive(ClapArgs)]
struct RunArgs {
    /// Patient ID to do a single-patient fetch.
    #[arg(short = 'i', long)]
    patient: Option<String>,

    /// Date/time range to search for, `yyyyMMddHH` or `yyyyMMdd` bounds,
    /// '-' separated; 1s subtracted from the upper limit for convenience.
    #[arg(short = 'r', long)]
    range: String,

    /// YAML config file name.
    #[arg(short = 'y', long = "config", default_value = "pacs.yaml")]
    config: PathBuf,

    /// Set output to verbose messages.
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "pacsync=debug,info" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match Cli::parse().command {
        Command::InitConfig { path } => {
            init_tracing(false);
            init_config(&path)
        }
        Command::Run(args) => run(args).await,
    }
}

fn init_config(path: &PathBuf) -> anyhow::Result<()> {
    if path.exists() {
        bail!("refusing to overwrite existing {}", path.display());
    }
    std::fs::write(path, PacsEndpoints::template())
        .with_context(|| format!("writing {}", path.display()))?;
    println!("wrote starter configuration to {}", path.display());
    Ok(())
}

/// Build the outbound session and the inbound acceptor from the configured
/// transport provider. A standard upper-layer binding plugs in here; the
/// in-tree provider is the loopback stack.
fn build_transport(
    endpoints: &PacsEndpoints,
    destination: &AeTitle,
) -> anyhow::Result<(Box<dyn ArchiveSession>, LoopbackAcceptor)> {
    match &endpoints.transport {
        Some(TransportConfig::Loopback { fixture }) => {
            let fixture = match fixture {
                Some(path) => ArchiveFixture::load(path)
                    .with_context(|| format!("loading fixture {}", path.display()))?,
                None => ArchiveFixture::new(endpoints.remote_name.clone()),
            };
            let (connector, acceptor) = association_channel(16);
            let mut archive = LoopbackArchive::new(fixture)?;
            archive.add_destination(destination.clone(), connector);
            info!(
                hostname = %endpoints.hostname,
                remote = %endpoints.remote_name,
                "using loopback transport provider"
            );
            Ok((Box::new(archive), acceptor))
        }
        None => bail!(
            "no transport provider configured for '{}'; set `transport.kind` \
             in the config (the in-tree provider is `loopback`)",
            endpoints.hostname
        ),
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    init_tracing(args.verbose);

    let endpoints = PacsEndpoints::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let window = TimeWindow::parse(&args.range).context("parsing --range")?;
    let query = StudyQuery {
        patient: args.patient,
        window,
    };

    let local_ae = endpoints.local_ae()?;
    let remote_ae = endpoints.remote_ae()?;
    std::fs::create_dir_all(&endpoints.storage_dir).with_context(|| {
        format!("creating storage directory {}", endpoints.storage_dir.display())
    })?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling the in-flight pass");
                cancel.cancel();
            }
        }
    });

    let (session, acceptor) = build_transport(&endpoints, &local_ae)?;

    // The listener must be accepting before any retrieval is dispatched:
    // a push-style retrieval routes the data back at it.
    let service = Arc::new(ReceiveService::new(
        local_ae.clone(),
        remote_ae,
        endpoints.storage_dir.clone(),
    ));
    let listener_shutdown = CancellationToken::new();
    let listener = ReceiveListener::new(acceptor, service.clone(), listener_shutdown.clone()).spawn();

    let pass = ReconciliationPass::new(query, local_ae, endpoints.storage_dir.clone());
    let outcome = pass.run(session.as_ref(), &cancel).await;

    // The listener outlives the pass only until explicit shutdown.
    listener_shutdown.cancel();
    if let Err(e) = listener.await {
        warn!(error = %e, "listener task ended abnormally");
    }

    let summary = outcome?;
    println!("{summary}");
    println!(
        "received objects persisted this run: {}",
        service.received_count().await
    );
    Ok(())
}
