//! `run` command implementation.

use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{DestinationConfig, DestinationKind, SpreaderConfig};
use spreader::{SpreaderError, StreamSpreader};
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::stats::RunStats;

type Input = Box<dyn AsyncRead + Unpin + Send>;

/// Execute the `run` command
pub async fn run_spread(args: &RunArgs) -> Result<()> {
    let config = build_config(args)?;
    if config.destinations.is_empty() {
        return Err(CliError::NoDestinations.into());
    }

    info!(
        asynchronous = config.asynchronous,
        keep_cached = config.keep_cached,
        chunk_size = config.chunk_size,
        destinations = config.destinations.len(),
        "Configuration loaded"
    );

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
        info!("Metrics endpoint available on port {}", args.metrics_port);
    }

    let cancel = CancellationToken::new();
    let signal_task = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            warn!("Received shutdown signal, cancelling run...");
            cancel.cancel();
        }
    });

    let spreader = spreader::create_spreader(config, cancel.clone())
        .context("Failed to create destinations")?;
    let mut input = open_input(args.input.as_deref()).await?;

    let started = Instant::now();
    let mut stats = RunStats::new();

    let spread = pump(&spreader, &mut input, &mut stats, &cancel);
    let pumped = if args.timeout > 0 {
        tokio::time::timeout(Duration::from_secs(args.timeout), spread)
            .await
            .unwrap_or(Err(CliError::Timeout { secs: args.timeout }))
    } else {
        spread.await
    };
    if pumped.is_err() {
        // Let the chains skip whatever is still queued
        cancel.cancel();
    }

    stats.destinations = spreader.metrics();
    let closed = spreader.close().await;
    signal_task.abort();
    stats.duration = started.elapsed();

    match &pumped {
        Ok(()) => info!(
            bytes = stats.spread_metrics.total_bytes,
            chunks = stats.spread_metrics.total_chunks,
            duration_secs = stats.duration.as_secs_f64(),
            "Run completed successfully"
        ),
        Err(e) => warn!(error = %e, "Run did not complete"),
    }
    stats.print_summary();

    pumped.context("Spreading failed")?;
    closed.context("Failed to close destinations")?;
    Ok(())
}

/// Load the configuration file (if any) and apply CLI overrides
fn build_config(args: &RunArgs) -> Result<SpreaderConfig> {
    let mut config = match &args.config {
        Some(path) => {
            if !path.exists() {
                return Err(CliError::config_not_found(path.display().to_string()).into());
            }
            config_loader::ConfigLoader::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => SpreaderConfig::default(),
    };

    if args.asynchronous {
        config.asynchronous = true;
    }
    if args.keep_cached {
        config.keep_cached = true;
    }
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }
    for path in &args.outputs {
        let path = path.display().to_string();
        info!(path = %path, "Adding file destination from CLI");
        config.destinations.push(DestinationConfig {
            name: path.clone(),
            kind: DestinationKind::File,
            params: HashMap::from([("path".to_string(), path)]),
        });
    }

    config_loader::ConfigLoader::validate(&config)
        .context("Invalid configuration after applying CLI overrides")?;
    Ok(config)
}

async fn open_input(path: Option<&Path>) -> Result<Input, CliError> {
    match path {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .map_err(|e| CliError::input(path, e))?;
            debug!(path = %path.display(), "Reading from file");
            Ok(Box::new(file))
        }
        None => {
            debug!("Reading from stdin");
            Ok(Box::new(tokio::io::stdin()))
        }
    }
}

/// Copy the source into the spreader, then finish and flush
async fn pump(
    spreader: &StreamSpreader,
    input: &mut Input,
    stats: &mut RunStats,
    cancel: &CancellationToken,
) -> Result<(), CliError> {
    let copied = spreader
        .copy_from_with(input, cancel, |len| stats.spread_metrics.record_chunk(len))
        .await
        .map_err(|e| match e {
            SpreaderError::Cancelled => CliError::Interrupted,
            e => e.into(),
        })?;
    debug!(bytes = copied, "Input exhausted");

    spreader.finish_writing();

    let flush_started = Instant::now();
    let flushed = spreader.flush().await;
    stats
        .spread_metrics
        .record_flush(flush_started.elapsed().as_secs_f64() * 1000.0);
    if let Err(ref e) = flushed {
        for failure in e.failures() {
            warn!(sink = %failure.name, error = %failure.kind, "Destination failed");
            stats.spread_metrics.record_failure(&failure.name);
        }
    }
    flushed?;
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
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
