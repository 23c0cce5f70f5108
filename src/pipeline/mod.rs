pub mod aggregate;
pub mod chunker;
pub mod dispatcher;
pub mod extract;
pub mod orchestrator;
pub mod parser;
pub mod prompt;

pub use aggregate::*;
pub use chunker::*;
pub use dispatcher::*;
pub use extract::*;
pub use orchestrator::*;
pub use parser::*;

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::service::ServiceError;
use crate::text::ReadError;

/// Stage-level pipeline failures. Per-item failures never reach this type;
/// they are absorbed at the dispatcher boundary. Anything that does become
/// a `PipelineError` halts the run with a single terminal message.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Project directory does not exist: {0}")]
    ProjectDirMissing(PathBuf),

    #[error("No transcript files found in project directory")]
    NoTranscripts,

    #[error("No verbatims extracted from transcripts")]
    NoVerbatims,

    #[error("Emergent topic analysis produced no valid batch result")]
    EmergentAnalysisFailed,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Document read error: {0}")]
    Read(#[from] ReadError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
