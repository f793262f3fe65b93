//! Audio effects processing
//!
//! All effects operate on signed 16-bit mono samples and return a new block.
//!
//! Available effects:
//! - **PitchShift**: linear-interpolation resampling driven by a pitch function
//! - **LowPassFilter**: resonant biquad low-pass with soft clipping
//! - **HighPassFilter**: biquad high-pass
//! - **Equalizer**: N peaking bands in series with gain compensation
//! - **BitCrush**: bit depth and sample rate reduction from one knob
//! - **Reverb**: Freeverb-style comb/all-pass network
//! - **Mixer**: blends in a secondary generator or PCM stream

mod section;
mod bit_crush;
mod chain;
mod eq;
mod high_pass;
mod low_pass;
pub mod mixer;
mod pitch_shift;
mod reverb;
mod underwater;

pub use bit_crush::BitCrush;
pub use chain::{AudioEffect, EffectChain};
pub use eq::{default_bands, EqBand, Equalizer};
pub use high_pass::HighPassFilter;
pub use low_pass::{LowPassFilter, FLAT_CUTOFF_HZ, FLAT_RESONANCE};
pub use mixer::{Mixer, SecondarySource};
pub use pitch_shift::PitchShift;
pub use reverb::Reverb;
pub use underwater::{underwater_setting, Liquid, UnderwaterPreset, MAX_EFFECTIVE_FACES};
