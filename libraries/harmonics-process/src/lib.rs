//! Harmonics Process
//!
//! External process plumbing for the streaming pipeline:
//!
//! - [`LifecycleRegistry`]: the single owner of every live decoder process and
//!   stream task, with idempotent `destroy` and a fault-tolerant `shutdown_all`
//! - [`SubprocessManager`]: spawns decoders with piped stdio, drains stderr into
//!   the log and terminates gracefully before force-killing
//! - [`DecoderCommand`]: the ffmpeg argument vector for raw mono s16le output
//! - [`UrlResolver`]: yt-dlp resolution of page URLs, with a TTL cache
//!
//! # Example
//!
//! ```rust,no_run
//! use harmonics_process::{DecoderCommand, LifecycleRegistry, SubprocessManager};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let registry = Arc::new(LifecycleRegistry::new());
//! let manager = SubprocessManager::new(Arc::clone(&registry), Duration::from_millis(500));
//!
//! let command = DecoderCommand::new("ffmpeg", "track.flac", 48_000);
//! let process = manager.spawn(command.program(), &command.args())?;
//! let readiness = process
//!     .output
//!     .wait_until_readable(Duration::from_secs(5), Duration::from_millis(100));
//! assert!(readiness.is_ready());
//!
//! registry.shutdown_all();
//! # Ok::<(), harmonics_process::ProcessError>(())
//! ```

pub mod decoder;
mod error;
pub mod registry;
pub mod resolver;
pub mod subprocess;

pub use decoder::{seek_string, DecoderCommand};
pub use error::{ProcessError, Result};
pub use registry::{Closeable, LifecycleRegistry, Resource, ResourceId, ShutdownReport};
pub use resolver::{CachedResolver, ResolvedSource, UrlResolver, YtDlpResolver};
pub use subprocess::{DecoderOutput, ProcessHandle, Readiness, SpawnedProcess, SubprocessManager};
