//! Pitch functions and resampling
//!
//! A [`PitchFunction`] maps stream time (seconds) to a pitch multiplier,
//! `1.0` meaning unchanged. The resampler in [`resample`] turns that
//! multiplier into a linear-interpolation sample-rate conversion.

mod param;
pub mod resample;

pub use param::{Param, ParamHandle, SmoothedParam, DEFAULT_SMOOTHING};
pub use resample::{resample_linear, StreamResampler};

use param::Ramp;
use harmonics_core::clock::SharedClock;
use std::f64::consts::PI;
use std::time::Duration;

/// Default transition of [`PitchFunction::smoothed`]
pub const DEFAULT_TRANSITION_SECS: f64 = 0.15;

/// Time-varying pitch multiplier
pub enum PitchFunction {
    /// Same pitch at every instant
    Constant(f32),

    /// Linear sweep from `start` to `end` over `duration` seconds, then hold `end`
    Linear { start: f32, end: f32, duration: f64 },

    /// Vibrato: `base + amplitude * sin(2π · frequency · t)`
    Oscillate {
        base: f32,
        amplitude: f32,
        frequency: f64,
    },

    /// Discrete pitches, each held for `step` seconds; the last one holds forever
    Steps { pitches: Vec<f32>, step: f64 },

    /// Externally supplied pitch, smoothed on the wall clock
    Live(SmoothedParam),

    /// Another function smoothed on stream time
    Smoothed(Box<StreamSmoothed>),

    /// Arbitrary callback of stream time
    Custom(Box<dyn FnMut(f64) -> f32 + Send>),
}

impl PitchFunction {
    pub fn constant(pitch: f32) -> Self {
        PitchFunction::Constant(pitch)
    }

    pub fn linear(start: f32, end: f32, duration: f64) -> Self {
        PitchFunction::Linear {
            start,
            end,
            duration,
        }
    }

    pub fn oscillate(base: f32, amplitude: f32, frequency: f64) -> Self {
        PitchFunction::Oscillate {
            base,
            amplitude,
            frequency,
        }
    }

    pub fn steps(pitches: Vec<f32>, step: f64) -> Self {
        PitchFunction::Steps { pitches, step }
    }

    /// Follow `handle`, gliding over the default 500 ms window
    pub fn live(handle: ParamHandle) -> Self {
        PitchFunction::Live(SmoothedParam::new(handle))
    }

    pub fn live_with_clock(handle: ParamHandle, window: Duration, clock: SharedClock) -> Self {
        PitchFunction::Live(SmoothedParam::with_clock(handle, window, clock))
    }

    /// Smooth `source` so a jump in its output becomes a linear glide lasting
    /// `transition_secs` of stream time
    pub fn smoothed(source: PitchFunction, transition_secs: f64) -> Self {
        PitchFunction::Smoothed(Box::new(StreamSmoothed {
            source,
            transition_secs,
            ramp: Ramp::default(),
        }))
    }

    pub fn custom(f: impl FnMut(f64) -> f32 + Send + 'static) -> Self {
        PitchFunction::Custom(Box::new(f))
    }

    /// Pitch multiplier at `time_secs` of stream time
    pub fn pitch_at(&mut self, time_secs: f64) -> f32 {
        match self {
            PitchFunction::Constant(pitch) => *pitch,
            PitchFunction::Linear {
                start,
                end,
                duration,
            } => {
                let progress = if *duration > 0.0 {
                    (time_secs / *duration).clamp(0.0, 1.0) as f32
                } else {
                    1.0
                };
                *start + (*end - *start) * progress
            }
            PitchFunction::Oscillate {
                base,
                amplitude,
                frequency,
            } => *base + *amplitude * (2.0 * PI * *frequency * time_secs).sin() as f32,
            PitchFunction::Steps { pitches, step } => {
                let Some(last) = pitches.len().checked_sub(1) else {
                    return 1.0;
                };
                let index = if *step > 0.0 {
                    ((time_secs / *step).max(0.0) as usize).min(last)
                } else {
                    last
                };
                pitches[index]
            }
            PitchFunction::Live(param) => param.value(),
            PitchFunction::Smoothed(smoothed) => smoothed.pitch_at(time_secs),
            PitchFunction::Custom(f) => f(time_secs),
        }
    }

    /// The fixed pitch, when this function never varies
    pub fn constant_value(&self) -> Option<f32> {
        match self {
            PitchFunction::Constant(pitch) => Some(*pitch),
            _ => None,
        }
    }

    /// Drop any smoothing history
    pub fn reset(&mut self) {
        match self {
            PitchFunction::Live(param) => param.reset(),
            PitchFunction::Smoothed(smoothed) => {
                smoothed.ramp.reset();
                smoothed.source.reset();
            }
            _ => {}
        }
    }
}

impl std::fmt::Debug for PitchFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PitchFunction::Constant(pitch) => f.debug_tuple("Constant").field(pitch).finish(),
            PitchFunction::Linear {
                start,
                end,
                duration,
            } => f
                .debug_struct("Linear")
                .field("start", start)
                .field("end", end)
                .field("duration", duration)
                .finish(),
            PitchFunction::Oscillate {
                base,
                amplitude,
                frequency,
            } => f
                .debug_struct("Oscillate")
                .field("base", base)
                .field("amplitude", amplitude)
                .field("frequency", frequency)
                .finish(),
            PitchFunction::Steps { pitches, step } => f
                .debug_struct("Steps")
                .field("pitches", pitches)
                .field("step", step)
                .finish(),
            PitchFunction::Live(param) => f.debug_tuple("Live").field(param).finish(),
            PitchFunction::Smoothed(smoothed) => f
                .debug_struct("Smoothed")
                .field("source", &smoothed.source)
                .field("transition_secs", &smoothed.transition_secs)
                .finish(),
            PitchFunction::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Stream-time smoothing state for [`PitchFunction::Smoothed`]
pub struct StreamSmoothed {
    source: PitchFunction,
    transition_secs: f64,
    ramp: Ramp,
}

impl StreamSmoothed {
    fn pitch_at(&mut self, time_secs: f64) -> f32 {
        let target = self.source.pitch_at(time_secs);
        self.ramp.next(target, time_secs, self.transition_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_everywhere() {
        let mut f = PitchFunction::constant(1.5);
        assert_eq!(f.pitch_at(0.0), 1.5);
        assert_eq!(f.pitch_at(100.0), 1.5);
        assert_eq!(f.constant_value(), Some(1.5));
    }

    #[test]
    fn linear_sweeps_then_holds() {
        let mut f = PitchFunction::linear(1.0, 2.0, 10.0);
        assert_eq!(f.pitch_at(0.0), 1.0);
        assert_eq!(f.pitch_at(5.0), 1.5);
        assert_eq!(f.pitch_at(20.0), 2.0);
        assert_eq!(f.constant_value(), None);
    }

    #[test]
    fn oscillate_centres_on_base() {
        let mut f = PitchFunction::oscillate(1.0, 0.05, 2.0);
        assert!((f.pitch_at(0.0) - 1.0).abs() < 1e-6);
        // quarter period of a 2 Hz wave
        assert!((f.pitch_at(0.125) - 1.05).abs() < 1e-5);
    }

    #[test]
    fn steps_hold_last() {
        let mut f = PitchFunction::steps(vec![1.0, 1.5, 2.0], 1.0);
        assert_eq!(f.pitch_at(0.5), 1.0);
        assert_eq!(f.pitch_at(1.5), 1.5);
        assert_eq!(f.pitch_at(99.0), 2.0);
        assert_eq!(f.pitch_at(-1.0), 1.0);
    }

    #[test]
    fn empty_steps_are_neutral() {
        let mut f = PitchFunction::steps(Vec::new(), 1.0);
        assert_eq!(f.pitch_at(3.0), 1.0);
    }

    #[test]
    fn custom_callback() {
        let mut f = PitchFunction::custom(|t| if t < 1.0 { 1.0 } else { 0.5 });
        assert_eq!(f.pitch_at(0.0), 1.0);
        assert_eq!(f.pitch_at(2.0), 0.5);
    }

    #[test]
    fn smoothed_glides_on_stream_time() {
        let source = PitchFunction::steps(vec![1.0, 2.0], 1.0);
        let mut f = PitchFunction::smoothed(source, 0.5);

        assert_eq!(f.pitch_at(0.0), 1.0);
        assert_eq!(f.pitch_at(0.9), 1.0);
        // target jumps at t = 1.0; the glide starts there
        assert_eq!(f.pitch_at(1.0), 1.0);
        assert!((f.pitch_at(1.25) - 1.5).abs() < 1e-5);
        assert_eq!(f.pitch_at(1.5), 2.0);
    }

    #[test]
    fn reset_restarts_smoothing() {
        let source = PitchFunction::steps(vec![1.0, 2.0], 1.0);
        let mut f = PitchFunction::smoothed(source, 0.5);
        f.pitch_at(0.0);
        f.pitch_at(1.0);

        f.reset();
        assert_eq!(f.pitch_at(1.1), 2.0);
    }
}
