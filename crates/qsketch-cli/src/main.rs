#![doc = include_str!("../README.md")]

mod config;
mod data;
mod telemetry;

use clap::Parser;
use config::{CliArgs, SketchConfig};
use data::GaussianMixture;
use qsketch::{DataSource, LinearProjections, Sketcher, StreamMessage};
use std::sync::Arc;
use telemetry::init_telemetry;
use tokio::signal;
use tokio_stream::StreamExt;

// Using mimalloc for better performance with many worker threads
// allocating projection outputs concurrently.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = SketchConfig::try_from(args)?;

    init_telemetry()?;
    log_startup_info(&config);

    let dataset = GaussianMixture::generate(config.dataset_size, config.input_dim, config.seed);
    let mut sketcher = Sketcher::new(
        Some(DataSource::dataset(Arc::new(dataset))),
        config.percentiles.clone(),
        config.num_examples,
    );
    let modules = Arc::new(LinearProjections::new(
        config.input_dim,
        config.num_projections,
    ));
    let mut messages = sketcher.stream(modules, config.stream.clone())?.into_stream();

    let mut summary = Summary::default();
    let consume = async {
        while let Some(message) = messages.next().await {
            summary.record(&message, config.json)?;
            if config.max_messages.is_some_and(|max| summary.messages >= max) {
                break;
            }
        }
        anyhow::Ok(())
    };

    tokio::select! {
        result = consume => result?,
        () = shutdown_signal() => {},
    }

    // Waiting for the workers blocks for at most the shutdown timeout.
    tokio::task::block_in_place(|| sketcher.stop())?;

    #[cfg(feature = "tracing")]
    tracing::info!(
        "Stream finished: {} sketches, {} failures, {} epochs",
        summary.sketches,
        summary.failures,
        summary.epochs
    );
    Ok(())
}

#[derive(Default)]
struct Summary {
    messages: usize,
    sketches: usize,
    failures: usize,
    epochs: usize,
}

impl Summary {
    fn record(&mut self, message: &StreamMessage, json: bool) -> anyhow::Result<()> {
        self.messages += 1;
        match message {
            StreamMessage::Sketch { id, sketch } => {
                self.sketches += 1;
                if json {
                    let line = serde_json::json!({
                        "epoch": self.epochs,
                        "id": id,
                        "sketch": sketch,
                    });
                    println!("{}", serde_json::to_string(&line)?);
                } else {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        "Sketch of projection {id}: {} quantiles over {} samples",
                        sketch.len(),
                        sketch.num_samples()
                    );
                }
            }
            StreamMessage::Failed { id: _id, error: _error } => {
                self.failures += 1;
                #[cfg(feature = "tracing")]
                tracing::warn!("Projection {_id} failed: {_error}");
            }
            StreamMessage::EndOfEpoch { epoch: _epoch } => {
                self.epochs += 1;
                #[cfg(feature = "tracing")]
                tracing::info!("Epoch {_epoch} done, {} sketches so far", self.sketches);
            }
        }
        Ok(())
    }
}

fn log_startup_info(_config: &SketchConfig) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!("Starting sketch stream with full config: {:#?}", _config);
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting sketch stream of {}-dimensional projections over {} samples",
            _config.num_projections,
            _config.dataset_size
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::error!("Failed to install SIGTERM handler: {_e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(_e) = signal::ctrl_c().await {
            #[cfg(feature = "tracing")]
            tracing::error!("Failed to install Ctrl+C handler: {_e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received SIGTERM signal");
        },
    }
}
