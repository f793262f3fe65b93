/// Resonant low-pass filter
///
/// A cookbook biquad with makeup gain for resonance peaks, pre-attenuation at
/// very high Q, a denormal flush and two soft-clip stages (one inside the
/// feedback path, one on the output).
use super::section::{BiquadSection, Design, Shape};
use super::chain::AudioEffect;
use crate::error::Result;
use crate::pitch::{Param, SmoothedParam};
use harmonics_core::pcm::clamp_to_sample;
use harmonics_core::Sample;

/// Cutoff at which the filter is effectively transparent
pub const FLAT_CUTOFF_HZ: f32 = 20_000.0;
/// Butterworth Q, no resonance peak
pub const FLAT_RESONANCE: f32 = 0.707;

const MIN_Q: f32 = 0.1;
const MAX_Q: f32 = 20.0;

const DENORMAL: f32 = 1e-25;

const INTERNAL_CLIP_THRESHOLD: f32 = 40_000.0;
const INTERNAL_CLIP_HEADROOM: f32 = 10_000.0;
const OUTPUT_CLIP_THRESHOLD: f32 = 26_000.0;
const OUTPUT_CLIP_HEADROOM: f32 = 6_768.0;

/// Smooth saturation above `threshold`, symmetric around zero:
/// `t + (x - t) / (1 + (x - t) / h)`
#[inline]
pub(crate) fn soft_clip(x: f32, threshold: f32, headroom: f32) -> f32 {
    let magnitude = x.abs();
    if magnitude <= threshold {
        return x;
    }
    let over = magnitude - threshold;
    (threshold + over / (1.0 + over / headroom)).copysign(x)
}

pub struct LowPassFilter {
    cutoff: Param,
    resonance: Param,
    section: BiquadSection,
    last_cutoff: f32,
    last_resonance: f32,
}

impl LowPassFilter {
    /// Fixed cutoff (Hz) and resonance (Q, 0.707 is flat)
    pub fn new(cutoff_hz: f32, resonance: f32) -> Self {
        Self::with_params(Param::Fixed(cutoff_hz), Param::Fixed(resonance))
    }

    /// Cutoff and resonance driven by live, smoothed parameters
    pub fn live(cutoff: SmoothedParam, resonance: SmoothedParam) -> Self {
        Self::with_params(Param::Live(cutoff), Param::Live(resonance))
    }

    pub fn with_params(cutoff: Param, resonance: Param) -> Self {
        Self {
            cutoff,
            resonance,
            section: BiquadSection::new(),
            last_cutoff: f32::NAN,
            last_resonance: f32::NAN,
        }
    }

    /// The transparent setting: 20 kHz cutoff, Q 0.707
    pub fn flat() -> Self {
        Self::new(FLAT_CUTOFF_HZ, FLAT_RESONANCE)
    }
}

impl AudioEffect for LowPassFilter {
    fn process(&mut self, block: &[Sample], _time_secs: f64, sample_rate: u32) -> Result<Vec<Sample>> {
        let cutoff = self.cutoff.value();
        let resonance = self.resonance.value();
        self.last_cutoff = cutoff;
        self.last_resonance = resonance;

        self.section.configure(Design {
            shape: Shape::LowPass,
            sample_rate,
            frequency: cutoff,
            q: resonance.clamp(MIN_Q, MAX_Q),
        })?;

        // Peak gain at the cutoff is roughly Q
        let makeup_gain = 1.0 / (1.0 + (resonance - FLAT_RESONANCE).max(0.0) * 1.2);
        let pre_gain = if resonance > 2.0 {
            0.7 / (resonance / 2.0)
        } else {
            1.0
        };

        let output = block
            .iter()
            .map(|&sample| {
                let input = f32::from(sample) * pre_gain;
                let y = self.section.step_shaped(input, |y| {
                    let y = (y + DENORMAL) - DENORMAL;
                    soft_clip(y, INTERNAL_CLIP_THRESHOLD, INTERNAL_CLIP_HEADROOM)
                });
                clamp_to_sample(soft_clip(
                    y * makeup_gain,
                    OUTPUT_CLIP_THRESHOLD,
                    OUTPUT_CLIP_HEADROOM,
                ))
            })
            .collect();

        Ok(output)
    }

    fn reset(&mut self) {
        self.section.reset();
        self.cutoff.reset();
        self.resonance.reset();
    }

    fn name(&self) -> String {
        format!(
            "LowPass({:.0}Hz, Q={:.1})",
            self.last_cutoff, self.last_resonance
        )
    }

    fn speed_multiplier(&self) -> f64 {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pitch::ParamHandle;
    use harmonics_core::ManualClock;
    use std::sync::Arc;
    use std::time::Duration;

    fn sine(freq: f32, amplitude: f32, sample_rate: u32, len: usize) -> Vec<Sample> {
        (0..len)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (amplitude * (2.0 * std::f32::consts::PI * freq * t).sin()).round() as Sample
            })
            .collect()
    }

    fn rms(samples: &[Sample]) -> f32 {
        let sum: f32 = samples.iter().map(|&s| f32::from(s).powi(2)).sum();
        (sum / samples.len() as f32).sqrt()
    }

    #[test]
    fn soft_clip_is_smooth_and_bounded() {
        assert_eq!(soft_clip(1_000.0, 26_000.0, 6_768.0), 1_000.0);
        let clipped = soft_clip(60_000.0, 26_000.0, 6_768.0);
        assert!(clipped > 26_000.0 && clipped < 26_000.0 + 6_768.0);
        assert_eq!(soft_clip(-60_000.0, 26_000.0, 6_768.0), -clipped);
    }

    #[test]
    fn attenuates_above_cutoff() {
        let mut filter = LowPassFilter::new(500.0, FLAT_RESONANCE);
        let input = sine(8_000.0, 10_000.0, 48_000, 4_800);
        let out = filter.process(&input, 0.0, 48_000).unwrap();
        assert!(rms(&out[480..]) < rms(&input[480..]) * 0.05);
    }

    #[test]
    fn passes_below_cutoff() {
        let mut filter = LowPassFilter::new(5_000.0, FLAT_RESONANCE);
        let input = sine(100.0, 10_000.0, 48_000, 4_800);
        let out = filter.process(&input, 0.0, 48_000).unwrap();
        let ratio = rms(&out[480..]) / rms(&input[480..]);
        assert!((ratio - 1.0).abs() < 0.02, "ratio {ratio}");
    }

    #[test]
    fn high_resonance_stays_in_range() {
        let mut filter = LowPassFilter::new(1_000.0, 15.0);
        let input = sine(1_000.0, 32_000.0, 48_000, 9_600);
        let out = filter.process(&input, 0.0, 48_000).unwrap();
        let peak = out.iter().map(|s| s.unsigned_abs()).max().unwrap();
        assert!(peak < i16::MAX as u16);
    }

    #[test]
    fn live_cutoff_follows_handle() {
        let clock = ManualClock::new();
        let cutoff = ParamHandle::new(FLAT_CUTOFF_HZ);
        let resonance = ParamHandle::new(FLAT_RESONANCE);
        let window = Duration::from_millis(500);
        let mut filter = LowPassFilter::live(
            SmoothedParam::with_clock(cutoff.clone(), window, Arc::new(clock.clone())),
            SmoothedParam::with_clock(resonance, window, Arc::new(clock.clone())),
        );

        let input = sine(4_000.0, 10_000.0, 48_000, 4_800);
        let open = filter.process(&input, 0.0, 48_000).unwrap();

        cutoff.set(300.0);
        // glide starts on the next read
        filter.process(&input, 0.1, 48_000).unwrap();
        clock.advance(Duration::from_secs(1));
        filter.process(&input, 0.2, 48_000).unwrap();
        let closed = filter.process(&input, 0.3, 48_000).unwrap();

        assert!(rms(&closed[480..]) < rms(&open[480..]) * 0.1);
        assert_eq!(filter.name(), "LowPass(300Hz, Q=0.7)");
    }

    #[test]
    fn reset_matches_first_call() {
        let mut filter = LowPassFilter::new(800.0, 4.0);
        let input = sine(440.0, 12_000.0, 44_100, 2_048);
        let first = filter.process(&input, 0.0, 44_100).unwrap();
        filter.process(&input, 0.1, 44_100).unwrap();
        filter.reset();
        assert_eq!(filter.process(&input, 0.0, 44_100).unwrap(), first);
    }
}
