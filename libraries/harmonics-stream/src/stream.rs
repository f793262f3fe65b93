//! PCM stream with effects and backpressure
//!
//! A producer thread reads raw s16le bytes from the decoder into a bounded
//! [`PcmQueue`]. The consumer side ([`PcmStream`]) pulls chunks out, runs them
//! through the [`EffectChain`] and serves the processed bytes. Reads never
//! block except for the first one, which waits (bounded) for the pre-buffer.
//!
//! [`StreamControl`] is the cloneable handle used to pause, resume or close
//! the stream from other threads. Closing also runs the hook installed with
//! [`PcmStream::on_close`], which is how a producer stuck inside a decoder
//! read gets released.

use crate::error::{Result, StreamError};
use crate::queue::{PcmQueue, Take};
use harmonics_core::{pcm, PipelineConfig, Sample, BYTES_PER_SAMPLE};
use harmonics_dsp::EffectChain;
use harmonics_process::Closeable;
use std::fmt;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, trace};

/// Bytes read from the decoder per producer iteration
const READ_CHUNK_BYTES: usize = 8_192;

/// Sleep between retries when [`PcmStream`] is used as a blocking [`Read`]
const BLOCKING_READ_POLL: Duration = Duration::from_millis(5);

/// Lifecycle of one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Starting,
    PreBuffered,
    /// Source finished, queued samples remain
    Draining,
    Finished,
    Error,
    Closed,
}

/// Outcome of [`PcmStream::read`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Data(usize),
    /// Nothing available right now; try again later
    NoData,
    Eof,
}

/// Outcome of [`PcmStream::read_byte`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRead {
    Byte(u8),
    NoData,
    Eof,
}

/// How a stream ended, passed to end hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Finished,
    Failed,
    /// Closed or dropped before the end
    Closed,
}

type EndHook = Box<dyn FnOnce(StreamEnd) + Send>;
type CloseHook = Box<dyn FnOnce() + Send>;

struct Shared {
    label: String,
    queue: PcmQueue,
    paused: AtomicBool,
    error: Mutex<Option<StreamError>>,
    close_hook: Mutex<Option<CloseHook>>,
}

impl Shared {
    /// Close the queue and run the close hook once. Returns `true` on the
    /// first call.
    fn close(&self) -> bool {
        let first = !self.queue.is_closed();
        self.queue.close();
        let hook = self
            .close_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(hook) = hook {
            hook();
        }
        first
    }

    fn store_error(&self, error: StreamError) {
        let mut slot = self.error.lock().unwrap_or_else(PoisonError::into_inner);
        // first error wins
        if slot.is_none() {
            *slot = Some(error);
        }
    }

    fn take_error(&self) -> Option<StreamError> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Thread-safe handle for controlling a [`PcmStream`]
#[derive(Clone)]
pub struct StreamControl {
    shared: Arc<Shared>,
}

impl StreamControl {
    pub fn pause(&self) {
        if !self.shared.paused.swap(true, Ordering::AcqRel) {
            debug!(stream = %self.shared.label, "Paused");
        }
    }

    pub fn resume(&self) {
        if self.shared.paused.swap(false, Ordering::AcqRel) {
            debug!(stream = %self.shared.label, "Resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    /// Stop the producer and drop queued audio. Idempotent.
    pub fn close(&self) {
        if self.shared.close() {
            info!(stream = %self.shared.label, "Stream closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.queue.is_closed()
    }

    /// Samples currently waiting in the queue
    pub fn queued_samples(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.shared.queue.capacity()
    }

    pub fn high_water_mark(&self) -> usize {
        self.shared.queue.high_water_mark()
    }
}

impl Closeable for StreamControl {
    fn close(&self) -> harmonics_process::Result<()> {
        StreamControl::close(self);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("stream {}", self.shared.label)
    }
}

impl fmt::Debug for StreamControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamControl")
            .field("label", &self.shared.label)
            .field("paused", &self.is_paused())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Stream settings derived from [`PipelineConfig`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamSettings {
    pub sample_rate: u32,
    pub queue_capacity: usize,
    pub chunk_samples: usize,
    pub min_samples: usize,
    pub prebuffer_timeout: Duration,
}

impl StreamSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            queue_capacity: config.queue_capacity(),
            chunk_samples: config.process_chunk_samples(),
            min_samples: config.min_buffer_samples(),
            prebuffer_timeout: config.prebuffer_timeout(),
        }
    }
}

/// Consumer side of one decoded, effect-processed stream
pub struct PcmStream {
    shared: Arc<Shared>,
    chain: EffectChain,
    settings: StreamSettings,
    start_offset: f64,
    samples_read: u64,
    output: Vec<u8>,
    cursor: usize,
    state: StreamState,
    end_hooks: Vec<EndHook>,
}

impl PcmStream {
    /// Start a producer thread over `source` and return the consumer side
    pub fn spawn(
        label: impl Into<String>,
        source: impl Read + Send + 'static,
        chain: EffectChain,
        settings: StreamSettings,
        start_offset: f64,
    ) -> Result<Self> {
        let label = label.into();
        let shared = Arc::new(Shared {
            label: label.clone(),
            queue: PcmQueue::new(settings.queue_capacity),
            paused: AtomicBool::new(false),
            error: Mutex::new(None),
            close_hook: Mutex::new(None),
        });

        let producer = Arc::clone(&shared);
        thread::Builder::new()
            .name(format!("pcm-producer-{label}"))
            .spawn(move || produce(source, &producer))?;

        info!(
            stream = %label,
            chain = %chain.name(),
            capacity = settings.queue_capacity,
            chunk = settings.chunk_samples,
            start_offset,
            "Stream started"
        );

        Ok(Self {
            shared,
            chain,
            settings,
            start_offset,
            samples_read: 0,
            output: Vec::new(),
            cursor: 0,
            state: StreamState::Starting,
            end_hooks: Vec::new(),
        })
    }

    pub fn control(&self) -> StreamControl {
        StreamControl {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    pub fn state(&self) -> StreamState {
        match self.state {
            StreamState::Error | StreamState::Finished => self.state,
            _ if self.shared.queue.is_closed() => StreamState::Closed,
            state => state,
        }
    }

    /// Stream time of the next unprocessed sample, in seconds
    pub fn position_secs(&self) -> f64 {
        self.start_offset + self.samples_read as f64 / f64::from(self.settings.sample_rate)
    }

    /// Run `hook` once when the stream ends, however it ends
    pub fn on_end(&mut self, hook: impl FnOnce(StreamEnd) + Send + 'static) {
        self.end_hooks.push(Box::new(hook));
    }

    /// Run `callback` once when the stream plays out to the end
    pub fn on_finished(&mut self, callback: impl FnOnce() + Send + 'static) {
        self.on_end(move |end| {
            if end == StreamEnd::Finished {
                callback();
            }
        });
    }

    /// Run `hook` once when the stream is closed from any handle
    ///
    /// The producer only notices a close between decoder reads, so a source
    /// that can block indefinitely should be released here, for example by
    /// stopping the process behind it. Replaces any earlier hook.
    pub fn on_close(&mut self, hook: impl FnOnce() + Send + 'static) {
        *self
            .shared
            .close_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(hook));
    }

    fn run_end_hooks(&mut self, end: StreamEnd) {
        for hook in self.end_hooks.drain(..) {
            hook(end);
        }
    }

    fn is_passthrough(&self) -> bool {
        self.chain.is_empty()
    }

    fn serve(&mut self, buf: &mut [u8]) -> usize {
        let remaining = &self.output[self.cursor..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.cursor += n;
        n
    }

    fn has_output(&self) -> bool {
        self.cursor < self.output.len()
    }

    fn clear_output(&mut self) {
        self.output.clear();
        self.cursor = 0;
    }

    fn fail(&mut self, error: StreamError) -> Result<ReadOutcome> {
        error!(stream = %self.shared.label, "Stream failed: {}", error);
        self.state = StreamState::Error;
        self.clear_output();
        self.chain.reset();
        self.shared.close();
        self.run_end_hooks(StreamEnd::Failed);
        Err(error)
    }

    fn enter_closed(&mut self) -> ReadOutcome {
        if self.state != StreamState::Closed {
            self.state = StreamState::Closed;
            self.clear_output();
            self.chain.reset();
            self.run_end_hooks(StreamEnd::Closed);
        }
        ReadOutcome::Eof
    }

    /// Read processed PCM bytes
    ///
    /// Returns [`ReadOutcome::NoData`] rather than blocking when nothing is
    /// ready, and [`ReadOutcome::Eof`] only once the source has finished and
    /// everything queued has been served. A producer error is returned once,
    /// after every sample decoded before it has been delivered; later reads
    /// report end of stream.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome> {
        if matches!(self.state, StreamState::Error | StreamState::Finished) {
            return Ok(ReadOutcome::Eof);
        }
        if self.shared.queue.is_closed() {
            return Ok(self.enter_closed());
        }
        if buf.is_empty() {
            return Ok(ReadOutcome::Data(0));
        }
        if self.shared.paused.load(Ordering::Acquire) {
            return Ok(ReadOutcome::NoData);
        }

        if self.has_output() {
            return Ok(ReadOutcome::Data(self.serve(buf)));
        }

        if self.state == StreamState::Starting {
            if !self.is_passthrough()
                && !self.shared.queue.wait_prebuffered(self.settings.prebuffer_timeout)
            {
                return self.fail(StreamError::Timeout(self.settings.prebuffer_timeout));
            }
            if self.shared.queue.is_closed() {
                return Ok(self.enter_closed());
            }
            if self.shared.queue.is_prebuffered() || self.shared.queue.is_finished() {
                debug!(stream = %self.shared.label, queued = self.shared.queue.len(), "Pre-buffered");
                self.state = StreamState::PreBuffered;
            }
        }

        let min = if self.is_passthrough() {
            1
        } else {
            self.settings.min_samples
        };

        match self.shared.queue.take(self.settings.chunk_samples, min) {
            Take::Samples(block) => {
                if self.shared.queue.is_finished() {
                    self.state = StreamState::Draining;
                } else if self.state == StreamState::Starting {
                    self.state = StreamState::PreBuffered;
                }
                self.process_block(&block)?;
                if self.has_output() {
                    Ok(ReadOutcome::Data(self.serve(buf)))
                } else {
                    Ok(ReadOutcome::NoData)
                }
            }
            Take::Pending => Ok(ReadOutcome::NoData),
            Take::Drained => {
                // the producer stores its error before marking the queue finished
                if let Some(error) = self.shared.take_error() {
                    return self.fail(error);
                }
                info!(
                    stream = %self.shared.label,
                    position = self.position_secs(),
                    "End of stream"
                );
                self.state = StreamState::Finished;
                self.run_end_hooks(StreamEnd::Finished);
                Ok(ReadOutcome::Eof)
            }
            Take::Closed => Ok(self.enter_closed()),
        }
    }

    fn process_block(&mut self, block: &[Sample]) -> Result<()> {
        let time = self.position_secs();
        self.samples_read += block.len() as u64;
        self.clear_output();

        if self.is_passthrough() {
            pcm::extend_bytes(&mut self.output, block);
            return Ok(());
        }

        match self.chain.process(block, time, self.settings.sample_rate) {
            Ok(processed) => {
                trace!(
                    stream = %self.shared.label,
                    input = block.len(),
                    output = processed.len(),
                    time,
                    "Processed chunk"
                );
                pcm::extend_bytes(&mut self.output, &processed);
                Ok(())
            }
            Err(e) => self.fail(e.into()).map(|_| ()),
        }
    }

    /// Read a single processed byte
    pub fn read_byte(&mut self) -> Result<ByteRead> {
        let mut byte = [0u8; 1];
        Ok(match self.read(&mut byte)? {
            ReadOutcome::Data(0) | ReadOutcome::NoData => ByteRead::NoData,
            ReadOutcome::Data(_) => ByteRead::Byte(byte[0]),
            ReadOutcome::Eof => ByteRead::Eof,
        })
    }

    /// Rough count of bytes that can be read without waiting
    ///
    /// Processed bytes are exact; queued samples are scaled by the chain's
    /// speed multiplier since resampling changes their output length.
    pub fn available_hint(&self) -> usize {
        if self.has_output() {
            return self.output.len() - self.cursor;
        }
        if self.state() == StreamState::Closed {
            return 0;
        }
        let queued_bytes = self.shared.queue.len() * BYTES_PER_SAMPLE;
        let speed = self.chain.speed_multiplier();
        if speed > 0.0 && speed.is_finite() {
            ((queued_bytes as f64 / speed) as usize) & !1
        } else {
            queued_bytes
        }
    }

    /// Cancel the producer, drop buffered audio and reset the effect chain
    pub fn close(&mut self) {
        self.control().close();
        self.enter_closed();
    }
}

impl Read for PcmStream {
    /// Blocking adapter: polls through "no data yet" until data or end
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match PcmStream::read(self, buf) {
                Ok(ReadOutcome::Data(n)) => return Ok(n),
                Ok(ReadOutcome::Eof) => return Ok(0),
                Ok(ReadOutcome::NoData) => thread::sleep(BLOCKING_READ_POLL),
                Err(StreamError::DecodeIo(e)) => return Err(e),
                Err(e) => return Err(io::Error::other(e)),
            }
        }
    }
}

impl Drop for PcmStream {
    fn drop(&mut self) {
        self.control().close();
        self.run_end_hooks(StreamEnd::Closed);
    }
}

impl fmt::Debug for PcmStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcmStream")
            .field("label", &self.shared.label)
            .field("state", &self.state())
            .field("chain", &self.chain)
            .field("samples_read", &self.samples_read)
            .finish_non_exhaustive()
    }
}

/// Producer loop: decoder bytes into the queue until EOF, error or close
fn produce(mut source: impl Read, shared: &Shared) {
    let mut buf = vec![0u8; READ_CHUNK_BYTES];
    // odd byte left over from the previous read
    let mut carry: Option<u8> = None;
    let mut total_samples: u64 = 0;

    loop {
        if shared.queue.is_closed() {
            debug!(stream = %shared.label, "Producer cancelled");
            return;
        }

        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!(stream = %shared.label, "Decoder read failed: {}", e);
                shared.store_error(StreamError::DecodeIo(e));
                shared.queue.finish();
                return;
            }
        };

        let mut bytes = &buf[..n];
        let mut samples = Vec::with_capacity(n / BYTES_PER_SAMPLE + 1);
        if let Some(low) = carry.take() {
            samples.push(Sample::from_le_bytes([low, bytes[0]]));
            bytes = &bytes[1..];
        }
        samples.extend(pcm::bytes_to_samples(bytes));
        if bytes.len() % BYTES_PER_SAMPLE == 1 {
            carry = bytes.last().copied();
        }

        total_samples += samples.len() as u64;
        if shared.queue.push(&samples).is_err() {
            debug!(stream = %shared.label, "Producer stopped by close");
            return;
        }
    }

    if carry.is_some() {
        debug!(stream = %shared.label, "Dropped trailing odd byte");
    }
    debug!(stream = %shared.label, samples = total_samples, "Decoder output ended");
    shared.queue.finish();
}
