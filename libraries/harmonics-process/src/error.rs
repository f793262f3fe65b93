/// Error types for decoder processes and source resolution
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    /// The executable is missing or the OS refused to launch it
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Source resolution failed: {0}")]
    SourceResolution(String),

    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProcessError>;
