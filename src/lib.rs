//! netpoet — live packet capture turned into poetry.
//!
//! A producer loop extracts metadata from captured packets into a shared
//! buffer; a consumer task drains the buffer in batches and hands each
//! batch to a text-generation service, archiving the results. See
//! `pipeline` for the orchestration, `capture` for the live source.

pub mod archive;
pub mod buffer;
pub mod capture;
pub mod config;
pub mod extract;
pub mod generate;
pub mod pipeline;
pub mod prompt;

use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::archive::PoetryArchive;
use crate::capture::DumpcapSource;
use crate::generate::HttpPoetryGenerator;
use crate::pipeline::{PipelineSettings, PoetryPipeline};

/// Startup failures. Anything past startup is handled locally and never
/// propagates here.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Capture(#[from] capture::CaptureError),

    #[error(transparent)]
    Generation(#[from] generate::GenerationError),
}

/// Initialize tracing, start capture on the configured interface, and
/// run the pipeline until Ctrl-C. A failing capture source is the one
/// fatal error; everything downstream degrades gracefully.
pub async fn run() -> Result<(), StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("netpoet starting v{}", config::APP_VERSION);

    let interface = config::interface();
    let style = config::style();
    let generator = HttpPoetryGenerator::from_env()?;
    let source = DumpcapSource::new(&interface)?;

    let archive = Arc::new(PoetryArchive::new(config::archive_path()));
    let pipeline = PoetryPipeline::new(
        Arc::clone(&archive),
        generator,
        style,
        PipelineSettings::default(),
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Stop signal received, shutting down");
            let _ = stop_tx.send(true);
        }
    });

    pipeline.run(source, stop_rx).await;
    Ok(())
}
