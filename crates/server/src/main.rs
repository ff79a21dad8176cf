use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use darunner_core::{
    load_config, validate_config, Config, MergeRequest, ProgressEvent, ReferenceRequest,
    WorkItemOrchestrator,
};
use darunner_server::api::{create_router, WsBroadcaster};
use darunner_server::state::AppState;

/// Runs plot-and-merge jobs on Design Automation
#[derive(Parser)]
#[command(name = "darunner")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(long, env = "DARUNNER_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Plot every drawing and merge the results into one PDF
    Run {
        /// Drawings to plot, in merge order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Object key of the merged document
        #[arg(long, default_value = "final.pdf")]
        output: String,

        /// Delete every bucket the application owns before running
        #[arg(long)]
        clean: bool,
    },

    /// Fetch a document with its references into a zip
    Fetch {
        /// URL of the document to fetch
        item_url: String,

        /// Bearer token authorizing the fetch
        #[arg(long, env = "DARUNNER_USER_TOKEN")]
        token: String,
    },

    /// Serve the HTTP API (default)
    Serve,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    info!("Loading configuration from {:?}", cli.config);
    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Bucket: {} ({})", config.storage.bucket_key, config.storage.region);
    info!("Output directory: {:?}", config.output.dir);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Run {
            files,
            output,
            clean,
        } => run_merge(&config, files, output, clean).await,
        Command::Fetch { item_url, token } => fetch_references(&config, item_url, token).await,
        Command::Serve => serve(config).await,
    }
}

/// Orchestrator that reports progress through the log.
fn console_orchestrator(config: &Config) -> Result<WorkItemOrchestrator> {
    let orchestrator = WorkItemOrchestrator::from_config(config)
        .context("Failed to create orchestrator")?
        .with_progress(Arc::new(|event: &ProgressEvent| match event {
            ProgressEvent::Failed { .. } => warn!("{}", event),
            _ => info!("{}", event),
        }));
    Ok(orchestrator)
}

async fn run_merge(config: &Config, files: Vec<PathBuf>, output: String, clean: bool) -> Result<()> {
    let orchestrator = console_orchestrator(config)?;

    if clean {
        let deleted = orchestrator
            .purge_buckets()
            .await
            .context("Failed to delete buckets")?;
        info!("Deleted {} buckets", deleted.len());
    }

    let mut request = MergeRequest::from_sources(files);
    request.output_key = output;

    let result = orchestrator.run_merge(&request).await?;
    for part in result.failed_parts() {
        warn!("Part {} ended {}", part.id, part.status);
    }
    if !result.succeeded {
        bail!(
            "combinator {} ended {}",
            result.combinator.id,
            result.combinator.status
        );
    }

    for download in &result.downloads {
        match &download.local_path {
            Some(path) => info!("{} saved to {:?}", download.object_key, path),
            None => info!("{}: {}", download.object_key, download.url),
        }
    }
    Ok(())
}

async fn fetch_references(config: &Config, item_url: String, token: String) -> Result<()> {
    let orchestrator = console_orchestrator(config)?;
    let result = orchestrator
        .run_reference(&ReferenceRequest::new(item_url, token))
        .await?;

    if !result.succeeded {
        bail!(
            "work item {} ended {}",
            result.work_item.id,
            result.work_item.status
        );
    }
    if let Some(download) = &result.download {
        info!("{}: {}", download.object_key, download.url);
    }
    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    let ws_broadcaster = WsBroadcaster::default();
    info!("WebSocket broadcaster initialized");

    let broadcaster_for_callback = ws_broadcaster.clone();
    let orchestrator = WorkItemOrchestrator::from_config(&config)
        .context("Failed to create orchestrator")?
        .with_progress(Arc::new(move |event: &ProgressEvent| {
            broadcaster_for_callback.progress(event);
        }));

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, Arc::new(orchestrator), ws_broadcaster));
    let app = create_router(state);

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
