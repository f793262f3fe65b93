//! Harmonics Stream
//!
//! Turns a decoder's raw PCM output into a pull-based, effect-processed byte
//! stream with bounded memory:
//!
//! - [`PcmQueue`]: bounded sample queue with producer backpressure
//! - [`PcmStream`]: consumer side; non-blocking reads, pre-buffering, pause,
//!   error surfacing and end-of-stream detection
//! - [`SessionManager`]: async `play`/`pause`/`resume`/`stop` keyed by
//!   [`SessionKey`], wiring sources, decoder processes and the lifecycle
//!   registry together
//!
//! # Example
//!
//! ```rust
//! use harmonics_core::PipelineConfig;
//! use harmonics_dsp::effects::PitchShift;
//! use harmonics_dsp::EffectChain;
//! use harmonics_stream::{PcmStream, ReadOutcome, StreamSettings};
//! use std::io::Cursor;
//!
//! let pcm = vec![0u8; 9_600]; // 4800 samples
//! let chain = EffectChain::new().with_effect(PitchShift::constant(2.0));
//! let settings = StreamSettings::from_config(&PipelineConfig::default());
//! let mut stream = PcmStream::spawn("demo", Cursor::new(pcm), chain, settings, 0.0)?;
//!
//! let mut buf = [0u8; 1_024];
//! let mut total = 0;
//! loop {
//!     match stream.read(&mut buf)? {
//!         ReadOutcome::Data(n) => total += n,
//!         ReadOutcome::NoData => std::thread::yield_now(),
//!         ReadOutcome::Eof => break,
//!     }
//! }
//! assert_eq!(total, 4_800);
//! # Ok::<(), harmonics_stream::StreamError>(())
//! ```

mod error;
pub mod queue;
pub mod session;
pub mod source;
pub mod stream;

pub use error::{Result, StreamError};
pub use queue::{PcmQueue, Take};
pub use session::{Playback, SessionKey, SessionManager};
pub use source::{AudioSource, DecoderInput};
pub use stream::{
    ByteRead, PcmStream, ReadOutcome, StreamControl, StreamEnd, StreamSettings, StreamState,
};
