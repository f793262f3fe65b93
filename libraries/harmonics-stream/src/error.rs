/// Error types for streams and sessions
use harmonics_core::CoreError;
use harmonics_dsp::EffectError;
use harmonics_process::ProcessError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    /// No audio arrived within the bound
    #[error("No audio within {0:?}")]
    Timeout(Duration),

    /// The decoder pipe failed or closed mid-stream
    #[error("Decoder output failed: {0}")]
    DecodeIo(#[from] std::io::Error),

    #[error("Effect processing failed: {0}")]
    EffectProcessing(#[from] EffectError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Config(#[from] CoreError),

    #[error("Stream is closed")]
    Closed,

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, StreamError>;
