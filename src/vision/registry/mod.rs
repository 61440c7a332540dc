mod registry;
mod types;

pub use registry::ModelRegistry;
pub use types::ModelEntry;
