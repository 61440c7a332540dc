mod engine;

pub use engine::{EngineOptions, InferenceEngine};
