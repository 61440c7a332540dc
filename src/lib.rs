// Declare top-level modules
pub mod cli;
pub mod config;
pub mod server;
pub mod vision;
pub mod weights;

// Re-export the types most callers need
pub use config::Settings;
pub use vision::engine::InferenceEngine;
pub use vision::registry::ModelRegistry;
