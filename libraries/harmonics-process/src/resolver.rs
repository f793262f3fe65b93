//! Media reference resolution
//!
//! Turns a page URL (a video link, say) into a direct audio URL the decoder
//! can open. Resolution runs yt-dlp once per reference; [`CachedResolver`]
//! keeps results for a bounded time since the direct URLs expire.

use crate::error::{ProcessError, Result};
use crate::registry::lock;
use harmonics_core::{PipelineConfig, SharedClock};
use lru::LruCache;
use serde::Deserialize;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const FORMAT_SELECTOR: &str = "bestaudio[protocol^=http][protocol!*=m3u8]/bestaudio[protocol=https]/bestaudio[ext!=m3u8]/bestaudio/best";

/// A direct, decodable audio location
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSource {
    pub url: String,
    pub duration_secs: Option<f64>,
    pub title: Option<String>,
    pub http_headers: HashMap<String, String>,
}

pub trait UrlResolver: Send + Sync {
    fn resolve(&self, reference: &str) -> Result<ResolvedSource>;
}

/// Subset of the `yt-dlp -j` document
#[derive(Debug, Deserialize)]
struct InfoJson {
    url: Option<String>,
    // integer for most extractors, float for some
    duration: Option<f64>,
    title: Option<String>,
    #[serde(default)]
    http_headers: HashMap<String, String>,
}

/// Parse the first JSON document printed by `yt-dlp -j`
pub fn parse_info_json(stdout: &str) -> Result<ResolvedSource> {
    let line = stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| ProcessError::SourceResolution("resolver printed nothing".into()))?;

    let info: InfoJson = serde_json::from_str(line)
        .map_err(|e| ProcessError::SourceResolution(format!("invalid resolver output: {e}")))?;

    let url = info
        .url
        .filter(|url| !url.is_empty())
        .ok_or_else(|| ProcessError::SourceResolution("resolver returned no url".into()))?;

    Ok(ResolvedSource {
        url,
        duration_secs: info.duration.filter(|d| d.is_finite() && *d > 0.0),
        title: info.title,
        http_headers: info.http_headers,
    })
}

/// Resolves references by running yt-dlp
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    program: String,
}

impl YtDlpResolver {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.ytdlp_path.to_string_lossy().into_owned())
    }

    pub fn args(reference: &str) -> Vec<String> {
        [
            "-f",
            FORMAT_SELECTOR,
            "-j",
            "--quiet",
            "--no-playlist",
            "--no-call-home",
            "--skip-download",
            reference,
        ]
        .iter()
        .map(ToString::to_string)
        .collect()
    }
}

impl UrlResolver for YtDlpResolver {
    fn resolve(&self, reference: &str) -> Result<ResolvedSource> {
        debug!(reference, "Resolving source");
        let output = Command::new(&self.program)
            .args(Self::args(reference))
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ProcessError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProcessError::SourceResolution(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let resolved = parse_info_json(&String::from_utf8_lossy(&output.stdout))?;
        info!(
            reference,
            title = resolved.title.as_deref().unwrap_or("unknown"),
            duration = ?resolved.duration_secs,
            "Resolved source"
        );
        Ok(resolved)
    }
}

struct CacheEntry {
    source: ResolvedSource,
    stored_at: Instant,
}

/// TTL + LRU cache in front of another resolver
pub struct CachedResolver<R> {
    inner: R,
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
    clock: SharedClock,
}

impl<R: UrlResolver> CachedResolver<R> {
    pub fn new(inner: R, capacity: usize, ttl: Duration, clock: SharedClock) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            clock,
        }
    }

    pub fn from_config(inner: R, config: &PipelineConfig, clock: SharedClock) -> Self {
        Self::new(
            inner,
            config.resolve_cache_capacity,
            config.resolve_cache_ttl(),
            clock,
        )
    }

    fn cached(&self, reference: &str) -> Option<ResolvedSource> {
        let now = self.clock.now();
        let mut entries = lock(&self.entries);
        let expired = match entries.get(reference) {
            Some(entry) if now.duration_since(entry.stored_at) < self.ttl => {
                return Some(entry.source.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            debug!(reference, "Cached resolution expired");
            entries.pop(reference);
        }
        None
    }

    /// Forget one reference, e.g. after its direct URL stopped working
    pub fn invalidate(&self, reference: &str) -> bool {
        let removed = lock(&self.entries).pop(reference).is_some();
        if removed {
            info!(reference, "Invalidated cached resolution");
        }
        removed
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R: UrlResolver> UrlResolver for CachedResolver<R> {
    fn resolve(&self, reference: &str) -> Result<ResolvedSource> {
        if let Some(source) = self.cached(reference) {
            debug!(reference, "Resolution cache hit");
            return Ok(source);
        }

        let source = self.inner.resolve(reference).map_err(|e| {
            warn!(reference, "Resolution failed: {}", e);
            e
        })?;
        lock(&self.entries).put(
            reference.to_string(),
            CacheEntry {
                source: source.clone(),
                stored_at: self.clock.now(),
            },
        );
        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harmonics_core::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn parses_integer_and_float_durations() {
        let json = r#"{"url":"https://a/b.webm","duration":212,"title":"Song","http_headers":{"User-Agent":"x"}}"#;
        let source = parse_info_json(json).unwrap();
        assert_eq!(source.url, "https://a/b.webm");
        assert_eq!(source.duration_secs, Some(212.0));
        assert_eq!(source.title.as_deref(), Some("Song"));
        assert_eq!(source.http_headers["User-Agent"], "x");

        let json = r#"{"url":"https://a/c.m4a","duration":93.5}"#;
        let source = parse_info_json(json).unwrap();
        assert_eq!(source.duration_secs, Some(93.5));
        assert!(source.http_headers.is_empty());
        assert!(source.title.is_none());
    }

    #[test]
    fn missing_url_is_a_resolution_error() {
        for output in ["", "\n  \n", r#"{"title":"x"}"#, r#"{"url":""}"#, "not json"] {
            assert!(matches!(
                parse_info_json(output),
                Err(ProcessError::SourceResolution(_))
            ));
        }
    }

    #[test]
    fn args_end_with_reference() {
        let args = YtDlpResolver::args("https://example.com/watch?v=1");
        assert_eq!(args[0], "-f");
        assert!(args.contains(&"--no-playlist".to_string()));
        assert_eq!(args.last().unwrap(), "https://example.com/watch?v=1");
    }

    struct Counting(AtomicUsize);

    impl UrlResolver for Counting {
        fn resolve(&self, reference: &str) -> Result<ResolvedSource> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            if reference == "broken" {
                return Err(ProcessError::SourceResolution("broken".into()));
            }
            Ok(ResolvedSource {
                url: format!("{reference}#{n}"),
                duration_secs: None,
                title: None,
                http_headers: HashMap::new(),
            })
        }
    }

    #[test]
    fn cache_respects_ttl() {
        let clock = ManualClock::new();
        let resolver = CachedResolver::new(
            Counting(AtomicUsize::new(0)),
            8,
            Duration::from_secs(3_600),
            Arc::new(clock.clone()),
        );

        assert_eq!(resolver.resolve("a").unwrap().url, "a#0");
        clock.advance(Duration::from_secs(1_800));
        assert_eq!(resolver.resolve("a").unwrap().url, "a#0");

        clock.advance(Duration::from_secs(1_800));
        assert_eq!(resolver.resolve("a").unwrap().url, "a#1");
    }

    #[test]
    fn invalidate_and_clear() {
        let clock = ManualClock::new();
        let resolver = CachedResolver::new(
            Counting(AtomicUsize::new(0)),
            8,
            Duration::from_secs(60),
            Arc::new(clock),
        );

        resolver.resolve("a").unwrap();
        resolver.resolve("b").unwrap();
        assert_eq!(resolver.len(), 2);

        assert!(resolver.invalidate("a"));
        assert!(!resolver.invalidate("a"));
        assert_eq!(resolver.resolve("a").unwrap().url, "a#2");

        resolver.clear();
        assert!(resolver.is_empty());
    }

    #[test]
    fn failures_are_not_cached() {
        let resolver = CachedResolver::new(
            Counting(AtomicUsize::new(0)),
            8,
            Duration::from_secs(60),
            Arc::new(ManualClock::new()),
        );
        assert!(resolver.resolve("broken").is_err());
        assert!(resolver.resolve("broken").is_err());
        assert!(resolver.is_empty());
        assert_eq!(resolver.inner.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn capacity_evicts_least_recent() {
        let resolver = CachedResolver::new(
            Counting(AtomicUsize::new(0)),
            2,
            Duration::from_secs(60),
            Arc::new(ManualClock::new()),
        );
        resolver.resolve("a").unwrap();
        resolver.resolve("b").unwrap();
        resolver.resolve("c").unwrap();
        assert_eq!(resolver.len(), 2);
        // "a" was evicted and resolves again
        assert_eq!(resolver.resolve("a").unwrap().url, "a#3");
    }
}
