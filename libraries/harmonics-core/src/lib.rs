//! Harmonics Core
//!
//! Shared building blocks for the harmonics streaming pipeline:
//!
//! - [`Sample`] and little-endian PCM byte conversions
//! - [`PipelineConfig`], the numeric bounds every stage reads
//! - [`Clock`], the "now" collaborator used for wall-clock smoothing and cache expiry
//!
//! # Example
//!
//! ```rust
//! use harmonics_core::{pcm, PipelineConfig};
//!
//! let config = PipelineConfig::default();
//! assert_eq!(config.sample_rate, 48_000);
//!
//! let bytes = pcm::samples_to_bytes(&[1, -2]);
//! assert_eq!(pcm::bytes_to_samples(&bytes), vec![1, -2]);
//! ```

pub mod clock;
pub mod config;
mod error;
pub mod pcm;

pub use clock::{system_clock, Clock, ManualClock, SharedClock, SystemClock};
pub use config::PipelineConfig;
pub use error::{CoreError, Result};
pub use pcm::{Sample, BYTES_PER_SAMPLE};
