mod routes;
mod server;
mod types;

pub use server::ApiServer;
pub use types::{ApiResponse, ClassifyRequest, ClassifyResponse};
