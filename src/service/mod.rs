pub mod embedding;
pub mod gate;
pub mod reasoning;

pub use embedding::*;
pub use gate::*;
pub use reasoning::*;

use thiserror::Error;

/// Failures at the external-service boundary. Every variant is recoverable
/// at per-request granularity: the dispatcher captures it in place and
/// sibling requests keep running.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Reasoning endpoint unreachable at {0}")]
    Connection(String),

    #[error("Service returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Malformed structured response: {0}")]
    ResponseParsing(String),

    #[error("API key not configured")]
    MissingCredentials,
}
