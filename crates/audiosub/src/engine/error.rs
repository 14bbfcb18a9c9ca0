use std::path::PathBuf;
use thiserror::Error;

/// Failures reported by a speech engine.
///
/// Cloneable so a single load failure can be handed to every caller that
/// waited on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("Model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("Failed to load model: {0}")]
    Load(String),

    #[error("Engine ran out of memory: {0}")]
    OutOfMemory(String),

    #[error("Engine execution failed: {0}")]
    Execution(String),

    #[error("I/O error on '{}': {message}", .path.display())]
    Io { path: PathBuf, message: String },
}

impl EngineError {
    pub fn io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, EngineError::OutOfMemory(_))
    }
}
