//! Session control surface
//!
//! A session binds one source, pitch function and effect chain to one
//! decoder process and one [`PcmStream`]. Sessions are addressed by an opaque
//! [`SessionKey`] so several can play at once. Every process and stream task
//! a session owns lives in the shared [`LifecycleRegistry`], and a single
//! finalize step releases them whether the session was stopped, failed or
//! played to the end.

use crate::error::{Result, StreamError};
use crate::source::{AudioSource, DecoderInput};
use crate::stream::{PcmStream, StreamControl, StreamEnd, StreamSettings};
use harmonics_core::{system_clock, PipelineConfig};
use harmonics_dsp::effects::PitchShift;
use harmonics_dsp::{EffectChain, PitchFunction};
use harmonics_process::{
    CachedResolver, DecoderCommand, DecoderOutput, LifecycleRegistry, Readiness, Resource,
    ResourceId, ShutdownReport, SubprocessManager, UrlResolver, YtDlpResolver,
};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Opaque session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for SessionKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<Uuid> for SessionKey {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A started session: the stream to read plus what is known about the source
#[derive(Debug)]
pub struct Playback {
    pub key: SessionKey,
    pub stream: PcmStream,
    pub duration_secs: Option<f64>,
    pub title: Option<String>,
}

struct SessionEntry {
    generation: u64,
    control: StreamControl,
    stream_id: ResourceId,
    process_id: ResourceId,
}

struct Inner {
    config: PipelineConfig,
    settings: StreamSettings,
    processes: SubprocessManager,
    resolver: Arc<dyn UrlResolver>,
    sessions: Mutex<HashMap<SessionKey, SessionEntry>>,
    generation: AtomicU64,
}

impl Inner {
    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionKey, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Release everything a session owns. Blocking: may wait out the kill grace.
    fn finalize(&self, key: &SessionKey, entry: SessionEntry) {
        entry.control.close();
        let registry = self.processes.registry();
        for id in [entry.stream_id, entry.process_id] {
            if let Err(e) = registry.destroy(id) {
                warn!(session = %key, id, "Failed to release resource: {}", e);
            }
        }
        info!(session = %key, active = self.sessions().len(), "Session finalized");
    }

    /// End and close hook: drop the session only if it has not been replaced
    /// or stopped since
    ///
    /// Runs on whichever thread ended the stream, often the reader inside
    /// `read`, so the blocking teardown moves to the blocking pool.
    fn end_session(self: &Arc<Self>, key: &SessionKey, generation: u64, end: StreamEnd) {
        let entry = {
            let mut sessions = self.sessions();
            match sessions.get(key) {
                Some(entry) if entry.generation == generation => sessions.remove(key),
                _ => None,
            }
        };
        let Some(entry) = entry else {
            return;
        };

        debug!(session = %key, ?end, "Session ended");
        let inner = Arc::clone(self);
        let key = key.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let _teardown = runtime.spawn_blocking(move || inner.finalize(&key, entry));
            }
            // outside a runtime there is no pool to hand off to
            Err(_) => inner.finalize(&key, entry),
        }
    }

    /// Blocking half of `play`: resolve, spawn and wait for the first bytes
    fn start_decoder(
        &self,
        source: &AudioSource,
        start_offset: f64,
    ) -> Result<(DecoderInput, ResourceId, DecoderOutput)> {
        let input = source.decoder_input(self.resolver.as_ref())?;
        let command =
            DecoderCommand::from_config(&self.config, input.location.clone()).start_at(start_offset);
        let process = self.processes.spawn(command.program(), &command.args())?;

        let readiness = process
            .output
            .wait_until_readable(self.config.ready_timeout(), self.config.ready_poll());
        let error = match readiness {
            Readiness::Ready(output) => return Ok((input, process.id, output)),
            Readiness::TimedOut => StreamError::Timeout(self.config.ready_timeout()),
            Readiness::Exited => StreamError::DecodeIo(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("decoder exited before producing audio from {source}"),
            )),
            Readiness::Failed(e) => StreamError::DecodeIo(e),
        };
        self.processes.destroy(process.id)?;
        Err(error)
    }
}

fn release_session(inner: &Weak<Inner>, key: &SessionKey, generation: u64, end: StreamEnd) {
    if let Some(inner) = inner.upgrade() {
        inner.end_session(key, generation, end);
    }
}

/// Plays, pauses and stops keyed sessions
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Sessions resolved through yt-dlp with a TTL cache
    pub fn new(config: PipelineConfig, registry: Arc<LifecycleRegistry>) -> Self {
        let resolver = CachedResolver::from_config(
            YtDlpResolver::from_config(&config),
            &config,
            system_clock(),
        );
        Self::with_resolver(config, registry, Arc::new(resolver))
    }

    pub fn with_resolver(
        config: PipelineConfig,
        registry: Arc<LifecycleRegistry>,
        resolver: Arc<dyn UrlResolver>,
    ) -> Self {
        let processes = SubprocessManager::from_config(registry, &config);
        Self {
            inner: Arc::new(Inner {
                settings: StreamSettings::from_config(&config),
                config,
                processes,
                resolver,
                sessions: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<LifecycleRegistry> {
        self.inner.processes.registry()
    }

    /// Start a session, replacing any session already under `key`
    ///
    /// A non-unity pitch function is applied ahead of `chain`, clamped to the
    /// configured pitch range. Resolution, spawning and the readiness wait run
    /// on the blocking pool.
    pub async fn play(
        &self,
        key: impl Into<SessionKey>,
        source: AudioSource,
        pitch: PitchFunction,
        mut chain: EffectChain,
        start_offset: f64,
    ) -> Result<Playback> {
        let key = key.into();
        if self.contains(&key) {
            debug!(session = %key, "Replacing running session");
            self.stop(&key).await?;
        }

        if pitch.constant_value() != Some(1.0) {
            chain.prepend(PitchShift::with_bounds(
                pitch,
                self.inner.config.min_pitch,
                self.inner.config.max_pitch,
            ));
        }

        info!(session = %key, %source, start_offset, chain = %chain.name(), "Starting session");

        let inner = Arc::clone(&self.inner);
        let (input, process_id, output) =
            tokio::task::spawn_blocking(move || inner.start_decoder(&source, start_offset))
                .await??;

        let mut stream = match PcmStream::spawn(
            key.as_str(),
            output,
            chain,
            self.inner.settings,
            start_offset,
        ) {
            Ok(stream) => stream,
            Err(e) => {
                self.inner.processes.destroy(process_id)?;
                return Err(e);
            }
        };

        let control = stream.control();
        let stream_id = self
            .registry()
            .register(Resource::Task(Arc::new(control.clone())));
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);

        let replaced = self.inner.sessions().insert(
            key.clone(),
            SessionEntry {
                generation,
                control,
                stream_id,
                process_id,
            },
        );
        if let Some(stale) = replaced {
            // a concurrent play won the race for this key
            let inner = Arc::clone(&self.inner);
            let stale_key = key.clone();
            let _cleanup = tokio::task::spawn_blocking(move || inner.finalize(&stale_key, stale));
        }

        let weak = Arc::downgrade(&self.inner);
        let hook_key = key.clone();
        stream.on_end(move |end| release_session(&weak, &hook_key, generation, end));
        // a close from any handle releases the decoder, not just a read that sees it
        let weak = Arc::downgrade(&self.inner);
        let hook_key = key.clone();
        stream.on_close(move || release_session(&weak, &hook_key, generation, StreamEnd::Closed));

        Ok(Playback {
            key,
            stream,
            duration_secs: input.duration_secs,
            title: input.title,
        })
    }

    fn control(&self, key: &SessionKey) -> Result<StreamControl> {
        self.inner
            .sessions()
            .get(key)
            .map(|entry| entry.control.clone())
            .ok_or_else(|| StreamError::UnknownSession(key.to_string()))
    }

    pub fn pause(&self, key: &SessionKey) -> Result<()> {
        self.control(key)?.pause();
        Ok(())
    }

    pub fn resume(&self, key: &SessionKey) -> Result<()> {
        self.control(key)?.resume();
        Ok(())
    }

    pub fn is_paused(&self, key: &SessionKey) -> Result<bool> {
        Ok(self.control(key)?.is_paused())
    }

    /// Stop one session and release its process and stream
    pub async fn stop(&self, key: &SessionKey) -> Result<()> {
        let entry = self
            .inner
            .sessions()
            .remove(key)
            .ok_or_else(|| StreamError::UnknownSession(key.to_string()))?;

        info!(session = %key, "Stopping session");
        let inner = Arc::clone(&self.inner);
        let key = key.clone();
        tokio::task::spawn_blocking(move || inner.finalize(&key, entry)).await?;
        Ok(())
    }

    /// Stop every session; returns how many were stopped
    pub async fn stop_all(&self) -> usize {
        let drained: Vec<(SessionKey, SessionEntry)> = self.inner.sessions().drain().collect();
        let count = drained.len();
        if count == 0 {
            return 0;
        }

        info!(count, "Stopping all sessions");
        let inner = Arc::clone(&self.inner);
        let finalized = tokio::task::spawn_blocking(move || {
            for (key, entry) in drained {
                inner.finalize(&key, entry);
            }
        })
        .await;
        if let Err(e) = finalized {
            warn!("Stopping sessions failed: {}", e);
        }
        count
    }

    /// Stop all sessions, then tear down anything else still registered
    pub async fn shutdown(&self) -> ShutdownReport {
        self.stop_all().await;
        let registry = Arc::clone(self.registry());
        match tokio::task::spawn_blocking(move || registry.shutdown_all()).await {
            Ok(report) => report,
            Err(e) => {
                warn!("Registry shutdown failed: {}", e);
                ShutdownReport::default()
            }
        }
    }

    pub fn contains(&self, key: &SessionKey) -> bool {
        self.inner.sessions().contains_key(key)
    }

    pub fn session_count(&self) -> usize {
        self.inner.sessions().len()
    }

    pub fn keys(&self) -> Vec<SessionKey> {
        let mut keys: Vec<SessionKey> = self.inner.sessions().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.session_count())
            .field("registry", self.registry())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harmonics_process::{ProcessError, ResolvedSource};
    use std::path::PathBuf;

    struct NoResolver;

    impl UrlResolver for NoResolver {
        fn resolve(&self, reference: &str) -> harmonics_process::Result<ResolvedSource> {
            Err(ProcessError::SourceResolution(format!("cannot resolve {reference}")))
        }
    }

    fn manager(config: PipelineConfig) -> SessionManager {
        SessionManager::with_resolver(
            config,
            Arc::new(LifecycleRegistry::new()),
            Arc::new(NoResolver),
        )
    }

    #[test]
    fn keys_convert() {
        assert_eq!(SessionKey::from("jukebox-1").as_str(), "jukebox-1");
        let id = Uuid::new_v4();
        assert_eq!(SessionKey::from(id).to_string(), id.to_string());
        assert_ne!(SessionKey::random(), SessionKey::random());
    }

    #[tokio::test]
    async fn unknown_sessions_are_reported() {
        let manager = manager(PipelineConfig::default());
        let key = SessionKey::from("missing");

        assert!(matches!(manager.pause(&key), Err(StreamError::UnknownSession(_))));
        assert!(matches!(manager.resume(&key), Err(StreamError::UnknownSession(_))));
        assert!(matches!(manager.stop(&key).await, Err(StreamError::UnknownSession(_))));
        assert_eq!(manager.stop_all().await, 0);
    }

    #[tokio::test]
    async fn resolution_failure_starts_nothing() {
        let manager = manager(PipelineConfig::default());
        let result = manager
            .play(
                "page",
                AudioSource::Resolvable("https://example.com/watch?v=1".into()),
                PitchFunction::constant(1.0),
                EffectChain::new(),
                0.0,
            )
            .await;

        assert!(matches!(
            result,
            Err(StreamError::Process(ProcessError::SourceResolution(_)))
        ));
        assert_eq!(manager.session_count(), 0);
        assert!(manager.registry().is_empty());
    }

    #[tokio::test]
    async fn missing_decoder_registers_nothing() {
        let config = PipelineConfig {
            ffmpeg_path: PathBuf::from("/definitely/not/ffmpeg"),
            ..PipelineConfig::default()
        };
        let manager = manager(config);
        let before = manager.registry().len();

        let result = manager
            .play(
                "file",
                AudioSource::File(PathBuf::from("/tmp/none.flac")),
                PitchFunction::constant(1.0),
                EffectChain::new(),
                0.0,
            )
            .await;

        assert!(matches!(
            result,
            Err(StreamError::Process(ProcessError::Spawn { .. }))
        ));
        assert_eq!(manager.registry().len(), before);
        assert!(!manager.contains(&SessionKey::from("file")));
    }
}
