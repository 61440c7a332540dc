// Required external crates for configuration management and serialization
use serde::Deserialize;
use std::path::PathBuf;
use config::{Config, ConfigError, Environment, File};

/// A single registered model: a recognized identifier mapped to the
/// weight-container file that backs it.
#[derive(Debug, Deserialize, Clone)]
pub struct ModelEntryConfig {
    /// Recognized model identifier ("xception" or "custom-cnn")
    pub id: String,
    /// Weight-container filename, relative to the models directory
    pub file: String,
}

/// Configuration for model loading and management
#[derive(Debug, Deserialize, Clone)]
pub struct ModelsConfig {
    /// Directory where weight-container files are stored
    pub directory: PathBuf,
    /// Models to load into the registry at startup
    #[serde(default)]
    pub entry: Vec<ModelEntryConfig>,
}

/// Configuration for saliency-map post-processing
#[derive(Debug, Deserialize, Clone)]
pub struct SaliencyConfig {
    /// Blend weight of the heat-map over the scan (0.0-1.0]
    pub alpha: f32,
    /// Percentile below which saliency values are zeroed (0-100)
    pub threshold_percentile: f32,
    /// Radius of the Gaussian smoothing kernel in pixels
    pub blur_radius: usize,
    /// Margin subtracted from the circular brain-mask radius, in pixels
    pub mask_margin: u32,
    /// Whether to restrict the map to the circular brain area
    pub apply_mask: bool,
}

/// Configuration for the HTTP server
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

/// Configuration for application logging
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Optional log file path
    pub file: Option<PathBuf>,
}

/// Main settings struct that contains all configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Model-related settings
    pub models: ModelsConfig,
    /// Saliency-related settings
    pub saliency: SaliencyConfig,
    /// Server-related settings
    pub server: ServerConfig,
    /// Logging-related settings
    pub logging: LoggingConfig,
}

/// Implementation for loading and parsing configuration
impl Settings {
    /// Creates a new Settings instance by loading config from multiple sources
    /// in the following order of precedence (highest to lowest):
    /// 1. Environment variables prefixed with NEUROSCAN_
    /// 2. Local config file (local.toml) if present
    /// 3. Default config file (default.toml)
    pub fn new() -> Result<Self, ConfigError> {
        // Check if current directory exists
        let config_dir = std::env::current_dir()
            .map_err(|e| ConfigError::Message(
                format!("Failed to get current directory: {}", e)
            ))?
            .join("config");

        // Check if config directory exists
        if !config_dir.exists() {
            return Err(ConfigError::Message(
                format!("Config directory not found at: {}", config_dir.display())
            ));
        }

        // Check if default.toml exists
        let default_config = config_dir.join("default.toml");
        if !default_config.exists() {
            return Err(ConfigError::Message(
                format!("Default configuration file not found at: {}", default_config.display())
            ));
        }

        // Create the local config path
        let local_config = config_dir.join("local.toml");

        // Convert paths to strings and keep them alive
        let default_config_path = default_config.to_string_lossy();
        let local_config_path = local_config.to_string_lossy();

        // Load and validate configuration
        let settings = Config::builder()
            .add_source(File::with_name(&default_config_path))
            .add_source(File::with_name(&local_config_path).required(false))
            .add_source(Environment::with_prefix("NEUROSCAN").separator("_"))
            .build()?
            .try_deserialize::<Settings>()?;

        // Validate settings after loading
        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<(), ConfigError> {
        // The models directory must exist; weight files are provisioned, not created
        if !self.models.directory.exists() {
            return Err(ConfigError::Message(format!(
                "Models directory not found at: {}",
                self.models.directory.display()
            )));
        }

        // At least one model must be registered
        if self.models.entry.is_empty() {
            return Err(ConfigError::Message(
                "No models registered: at least one [[models.entry]] is required".to_string()
            ));
        }

        // Validate alpha range
        if !(self.saliency.alpha > 0.0 && self.saliency.alpha <= 1.0) {
            return Err(ConfigError::Message(
                format!("Saliency alpha must be in (0.0, 1.0], got: {}", self.saliency.alpha)
            ));
        }

        // Validate threshold percentile
        if !(0.0..100.0).contains(&self.saliency.threshold_percentile) {
            return Err(ConfigError::Message(format!(
                "Saliency threshold percentile must be in [0, 100), got: {}",
                self.saliency.threshold_percentile
            )));
        }

        // Validate server port range
        if self.server.port == 0 {
            return Err(ConfigError::Message(
                "Port must be between 1 and 65535, got: 0".to_string()
            ));
        }

        // Validate logging level
        match self.logging.level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => Ok(()),
            _ => Err(ConfigError::Message(
                format!("Invalid logging level: {}. Must be one of: error, warn, info, debug, trace",
                    self.logging.level)
            )),
        }?;

        // Create log file directory if configured and doesn't exist
        if let Some(log_file) = &self.logging.file {
            if let Some(parent) = log_file.parent() {
                if !parent.exists() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        ConfigError::Message(format!(
                            "Failed to create log directory at {}: {}",
                            parent.display(), e
                        ))
                    })?;
                }
            }
        }

        Ok(())
    }
}
