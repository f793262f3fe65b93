//! Harmonics DSP
//!
//! Effects operate on blocks of signed 16-bit mono samples. Every effect
//! implements [`AudioEffect`]; an [`EffectChain`] folds a block through its
//! effects left to right.
//!
//! This crate provides:
//! - Biquad low-pass, high-pass and multi-band peaking EQ
//! - Bit crushing, Freeverb-style reverb and a two-source mixer
//! - Pitch shifting by linear-interpolation resampling, driven by a [`PitchFunction`]
//! - Live parameters ([`ParamHandle`], [`SmoothedParam`]) that other threads can steer
//!
//! # Example
//!
//! ```rust
//! use harmonics_dsp::effects::{EffectChain, LowPassFilter, PitchShift};
//!
//! let mut chain = EffectChain::new()
//!     .with_effect(LowPassFilter::new(1_200.0, 0.707))
//!     .with_effect(PitchShift::constant(2.0));
//!
//! let block = vec![0i16; 4_800];
//! let out = chain.process(&block, 0.0, 48_000).unwrap();
//! assert_eq!(out.len(), 2_400);
//! ```

pub mod effects;
mod error;
pub mod pitch;

pub use effects::{AudioEffect, EffectChain};
pub use error::{EffectError, Result};
pub use pitch::{Param, ParamHandle, PitchFunction, SmoothedParam};
