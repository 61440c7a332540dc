use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use clap::Parser;
use tracing::info;

use neuroscan::cli::{self, Cli, Commands};
use neuroscan::config::Settings;
use neuroscan::server::ApiServer;
use neuroscan::vision::engine::{EngineOptions, InferenceEngine};
use neuroscan::vision::registry::ModelRegistry;

/// Main entry point for the neuroscan application
///
/// Parses command line arguments and dispatches to one of three modes:
/// - Serve: starts the HTTP inference server
/// - Classify: runs one scan through the pipeline from the terminal
/// - Models: lists the classifiers loaded into the registry
///
/// # Errors
/// Returns an error if configuration or model loading fails, or if the
/// server cannot bind its listener
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let args = Cli::parse();

    // Load settings first
    let settings = Settings::new()?;

    // Initialize the subscriber first, before any file operations
    let file_appender = tracing_appender::rolling::RollingFileAppender::new(
        tracing_appender::rolling::Rotation::DAILY,
        // Use log file path from settings, or default to "logs"
        settings.logging.file.as_deref().unwrap_or_else(|| Path::new("logs")),
        "neuroscan",
    );

    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let max_level = settings
        .logging
        .level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);

    tracing_subscriber::fmt()
        // Write to both console and file
        .with_writer(non_blocking)
        // Disable ANSI colors for cleaner log files
        .with_ansi(false)
        .with_line_number(true)
        .with_file(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_target(false)
        .with_max_level(max_level)
        .init();

    info!("neuroscan starting up...");

    // Models directory location
    let models_path = std::fs::canonicalize(&settings.models.directory)?;
    info!("Models directory: {}", models_path.display());

    // Build the registry once; it is read-only for the process lifetime
    let registry = Arc::new(ModelRegistry::from_config(&settings.models)?);
    info!("Model registry initialized with {} model(s)", registry.len());

    let engine = InferenceEngine::new(Arc::clone(&registry), EngineOptions::from(&settings));

    match args.command {
        Commands::Serve => {
            let server = ApiServer::new(engine, settings.server.host.clone(), settings.server.port);
            server.start().await?;
        }
        Commands::Classify { image, model, output } => {
            let raw = std::fs::read(&image)?;
            let result = engine.classify(&raw, &model)?;
            std::fs::write(&output, &result.overlay_png)?;
            cli::display_classification(&result, &output);
        }
        Commands::Models => {
            cli::display_models_table(registry.entries());
        }
    }

    Ok(())
}
