/// Pipeline configuration
use crate::error::{CoreError, Result};
use crate::pcm::samples_for_millis;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound on one consumer chunk, whatever the pitch range
pub const MAX_CHUNK_MS: f64 = 250.0;
/// Lower bound on one consumer chunk
pub const MIN_CHUNK_MS: f64 = 5.0;

/// Numeric bounds and external binaries shared by every pipeline stage
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_min_pitch")]
    pub min_pitch: f32,

    #[serde(default = "default_max_pitch")]
    pub max_pitch: f32,

    /// Queue ceiling in seconds of source audio (scaled by `max_pitch`)
    #[serde(default = "default_buffer_seconds")]
    pub buffer_seconds: f64,

    #[serde(default = "default_process_chunk_ms")]
    pub process_chunk_ms: u64,

    #[serde(default = "default_min_buffer_ms")]
    pub min_buffer_ms: u64,

    #[serde(default = "default_prebuffer_timeout_secs")]
    pub prebuffer_timeout_secs: u64,

    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,

    #[serde(default = "default_ready_poll_ms")]
    pub ready_poll_ms: u64,

    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,

    #[serde(default = "default_resolve_cache_ttl_secs")]
    pub resolve_cache_ttl_secs: u64,

    #[serde(default = "default_resolve_cache_capacity")]
    pub resolve_cache_capacity: usize,

    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: PathBuf,
}

impl PipelineConfig {
    /// Load configuration from an optional TOML file and the environment.
    ///
    /// Environment variables use the `HARMONICS_` prefix, e.g.
    /// `HARMONICS_SAMPLE_RATE=44100` or `HARMONICS_FFMPEG_PATH=/opt/bin/ffmpeg`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(CoreError::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            settings = settings.add_source(config::File::from(path.to_path_buf()));
        }

        // Field names contain underscores, so nesting uses a double separator
        settings = settings.add_source(
            config::Environment::with_prefix("HARMONICS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = settings.build()?.try_deserialize()?;
        config.validate()?;

        tracing::debug!(
            sample_rate = config.sample_rate,
            min_pitch = config.min_pitch,
            max_pitch = config.max_pitch,
            "Loaded pipeline configuration"
        );

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(CoreError::InvalidConfig(
                "sample_rate must be positive".to_string(),
            ));
        }

        if !(self.min_pitch > 0.0 && self.min_pitch.is_finite()) {
            return Err(CoreError::InvalidConfig(format!(
                "min_pitch must be positive, got {}",
                self.min_pitch
            )));
        }

        if !self.max_pitch.is_finite() || self.min_pitch > self.max_pitch {
            return Err(CoreError::InvalidConfig(format!(
                "min_pitch ({}) must not exceed max_pitch ({})",
                self.min_pitch, self.max_pitch
            )));
        }

        if !(self.buffer_seconds > 0.0 && self.buffer_seconds.is_finite()) {
            return Err(CoreError::InvalidConfig(
                "buffer_seconds must be positive".to_string(),
            ));
        }

        let zero_fields = [
            ("process_chunk_ms", self.process_chunk_ms),
            ("min_buffer_ms", self.min_buffer_ms),
            ("prebuffer_timeout_secs", self.prebuffer_timeout_secs),
            ("ready_timeout_secs", self.ready_timeout_secs),
            ("ready_poll_ms", self.ready_poll_ms),
            ("resolve_cache_ttl_secs", self.resolve_cache_ttl_secs),
        ];
        if let Some((name, _)) = zero_fields.iter().find(|(_, value)| *value == 0) {
            return Err(CoreError::InvalidConfig(format!("{name} must be non-zero")));
        }

        if self.resolve_cache_capacity == 0 {
            return Err(CoreError::InvalidConfig(
                "resolve_cache_capacity must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Queue capacity in samples: `sample_rate * buffer_seconds * max(max_pitch, 1)`
    pub fn queue_capacity(&self) -> usize {
        let scale = f64::from(self.max_pitch.max(1.0));
        let capacity = f64::from(self.sample_rate) * self.buffer_seconds * scale;
        (capacity.ceil() as usize).max(1)
    }

    /// Samples taken from the queue per consumer read.
    ///
    /// Shrinks as `max_pitch` grows so a pitch change is heard within one
    /// chunk, and never exceeds [`MAX_CHUNK_MS`].
    pub fn process_chunk_samples(&self) -> usize {
        let millis = (self.process_chunk_ms as f64 / f64::from(self.max_pitch.max(1.0)))
            .clamp(MIN_CHUNK_MS, MAX_CHUNK_MS);
        samples_for_millis(self.sample_rate, millis).max(1)
    }

    /// Queued samples needed before a non-final chunk is processed
    pub fn min_buffer_samples(&self) -> usize {
        let millis = self.min_buffer_ms as f64 / f64::from(self.min_pitch);
        samples_for_millis(self.sample_rate, millis).max(1)
    }

    pub fn prebuffer_timeout(&self) -> Duration {
        Duration::from_secs(self.prebuffer_timeout_secs)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn ready_poll(&self) -> Duration {
        Duration::from_millis(self.ready_poll_ms)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn resolve_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.resolve_cache_ttl_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            min_pitch: default_min_pitch(),
            max_pitch: default_max_pitch(),
            buffer_seconds: default_buffer_seconds(),
            process_chunk_ms: default_process_chunk_ms(),
            min_buffer_ms: default_min_buffer_ms(),
            prebuffer_timeout_secs: default_prebuffer_timeout_secs(),
            ready_timeout_secs: default_ready_timeout_secs(),
            ready_poll_ms: default_ready_poll_ms(),
            kill_grace_ms: default_kill_grace_ms(),
            resolve_cache_ttl_secs: default_resolve_cache_ttl_secs(),
            resolve_cache_capacity: default_resolve_cache_capacity(),
            ffmpeg_path: default_ffmpeg_path(),
            ytdlp_path: default_ytdlp_path(),
        }
    }
}

// Default values
fn default_sample_rate() -> u32 {
    48_000
}

fn default_min_pitch() -> f32 {
    0.5
}

fn default_max_pitch() -> f32 {
    2.0
}

fn default_buffer_seconds() -> f64 {
    5.0
}

fn default_process_chunk_ms() -> u64 {
    50
}

fn default_min_buffer_ms() -> u64 {
    10
}

fn default_prebuffer_timeout_secs() -> u64 {
    30
}

fn default_ready_timeout_secs() -> u64 {
    5
}

fn default_ready_poll_ms() -> u64 {
    100
}

fn default_kill_grace_ms() -> u64 {
    500
}

fn default_resolve_cache_ttl_secs() -> u64 {
    3600
}

fn default_resolve_cache_capacity() -> usize {
    64
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ytdlp_path() -> PathBuf {
    PathBuf::from("yt-dlp")
}
