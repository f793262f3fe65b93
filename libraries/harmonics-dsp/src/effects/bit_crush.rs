/// Bit-crush effect
///
/// One `quality` knob in `[0, 1]` drives both bit depth (4 to 16 bits) and a
/// sample-and-hold downsample (16x to 1x), so a single slider degrades the
/// signal musically. Quality 1.0 is a pass-through.
use super::chain::AudioEffect;
use crate::error::Result;
use harmonics_core::Sample;

pub struct BitCrush {
    quality: f32,
    held: Sample,
    counter: u64,
}

impl BitCrush {
    pub fn new(quality: f32) -> Self {
        Self {
            quality: if quality.is_nan() { 1.0 } else { quality },
            held: 0,
            counter: 0,
        }
    }

    /// Bits kept at the current quality
    pub fn bit_depth(&self) -> u32 {
        let quality = self.quality.clamp(0.0, 1.0);
        ((4.0 + 12.0 * quality) as u32).clamp(1, 16)
    }

    /// Each held sample covers this many input samples
    pub fn downsample_factor(&self) -> u64 {
        let quality = self.quality.clamp(0.0, 1.0);
        ((1.0 + 15.0 * (1.0 - quality)).round() as u64).clamp(1, 16)
    }
}

/// Quantize to `levels + 1` evenly spaced steps across the 16-bit range
#[inline]
fn quantize(sample: Sample, levels: i64) -> Sample {
    let normalized = ((i64::from(sample) + 32_768) * levels) / 65_535;
    let quantized = (normalized * 65_535) / levels - 32_768;
    quantized.clamp(i64::from(Sample::MIN), i64::from(Sample::MAX)) as Sample
}

impl AudioEffect for BitCrush {
    fn process(&mut self, block: &[Sample], _time_secs: f64, _sample_rate: u32) -> Result<Vec<Sample>> {
        if self.quality >= 1.0 {
            return Ok(block.to_vec());
        }

        let levels = (1i64 << self.bit_depth()) - 1;
        let factor = self.downsample_factor();

        let mut output = Vec::with_capacity(block.len());
        for &sample in block {
            if self.counter % factor == 0 {
                self.held = quantize(sample, levels);
            }
            output.push(self.held);
            self.counter += 1;
        }
        Ok(output)
    }

    fn reset(&mut self) {
        self.held = 0;
        self.counter = 0;
    }

    fn name(&self) -> String {
        format!("BitCrush(quality={:.2})", self.quality)
    }

    fn speed_multiplier(&self) -> f64 {
        1.0
    }
}
