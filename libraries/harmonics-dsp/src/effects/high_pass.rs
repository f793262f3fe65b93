/// High-pass filter (cookbook biquad)
use super::section::{BiquadSection, Design, Shape};
use super::chain::AudioEffect;
use crate::error::Result;
use harmonics_core::pcm::clamp_to_sample;
use harmonics_core::Sample;

pub struct HighPassFilter {
    cutoff_hz: f32,
    q: f32,
    section: BiquadSection,
}

impl HighPassFilter {
    pub fn new(cutoff_hz: f32, q: f32) -> Self {
        Self {
            cutoff_hz,
            q: q.clamp(0.1, 20.0),
            section: BiquadSection::new(),
        }
    }
}

impl AudioEffect for HighPassFilter {
    fn process(&mut self, block: &[Sample], _time_secs: f64, sample_rate: u32) -> Result<Vec<Sample>> {
        self.section.configure(Design {
            shape: Shape::HighPass,
            sample_rate,
            frequency: self.cutoff_hz,
            q: self.q,
        })?;

        Ok(block
            .iter()
            .map(|&sample| clamp_to_sample(self.section.step(f32::from(sample))))
            .collect())
    }

    fn reset(&mut self) {
        self.section.reset();
    }

    fn name(&self) -> String {
        format!("HighPass({:.0}Hz, Q={:.1})", self.cutoff_hz, self.q)
    }

    fn speed_multiplier(&self) -> f64 {
        1.0
    }
}
