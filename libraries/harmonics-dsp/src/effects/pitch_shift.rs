/// Pitch shift by resampling
///
/// A pitch above 1.0 reads the input faster, so the output is shorter and
/// plays back higher. Constant pitch functions take the exact-length path;
/// anything else walks the input per output sample.
use super::chain::AudioEffect;
use crate::error::Result;
use crate::pitch::{PitchFunction, StreamResampler};
use harmonics_core::Sample;

pub struct PitchShift {
    function: PitchFunction,
    min_pitch: f32,
    max_pitch: f32,
    resampler: StreamResampler,
    current_pitch: f32,
}

impl PitchShift {
    /// Follow `function`, clamped to `[0.5, 2.0]`
    pub fn new(function: PitchFunction) -> Self {
        Self::with_bounds(function, 0.5, 2.0)
    }

    pub fn with_bounds(function: PitchFunction, min_pitch: f32, max_pitch: f32) -> Self {
        let (min_pitch, max_pitch) = if min_pitch <= max_pitch {
            (min_pitch, max_pitch)
        } else {
            (max_pitch, min_pitch)
        };
        Self {
            function,
            min_pitch,
            max_pitch,
            resampler: StreamResampler::new(),
            current_pitch: 1.0,
        }
    }

    pub fn constant(pitch: f32) -> Self {
        Self::new(PitchFunction::constant(pitch))
    }

    fn bound(&self, pitch: f32) -> f32 {
        if pitch.is_finite() {
            pitch.clamp(self.min_pitch, self.max_pitch)
        } else {
            1.0
        }
    }
}

impl AudioEffect for PitchShift {
    fn process(&mut self, block: &[Sample], time_secs: f64, sample_rate: u32) -> Result<Vec<Sample>> {
        if let Some(pitch) = self.function.constant_value() {
            let pitch = self.bound(pitch);
            self.current_pitch = pitch;
            return Ok(self.resampler.process_constant(block, f64::from(pitch)));
        }

        let (min_pitch, max_pitch) = (self.min_pitch, self.max_pitch);
        let function = &mut self.function;
        let mut last = self.current_pitch;
        let output = self
            .resampler
            .process_dynamic(block, time_secs, sample_rate, |t| {
                let pitch = function.pitch_at(t);
                let pitch = if pitch.is_finite() {
                    pitch.clamp(min_pitch, max_pitch)
                } else {
                    1.0
                };
                last = pitch;
                f64::from(pitch)
            });
        self.current_pitch = last;

        Ok(output)
    }

    fn reset(&mut self) {
        self.resampler.reset();
        self.function.reset();
        self.current_pitch = 1.0;
    }

    fn name(&self) -> String {
        format!("PitchShift({:.2})", self.current_pitch)
    }

    fn speed_multiplier(&self) -> f64 {
        f64::from(self.current_pitch)
    }
}
