/// Direct-form-1 biquad section shared by the low-pass, high-pass and EQ effects
///
/// Coefficients come from the `biquad` crate's cookbook implementation and are
/// cached against the parameter tuple that produced them, so trigonometry only
/// runs when a parameter actually changes.
use crate::error::{EffectError, Result};
use biquad::{Coefficients, ToHertz, Type};

/// Highest usable centre/cutoff frequency as a fraction of the sample rate
const NYQUIST_MARGIN: f32 = 0.49;

/// Lowest usable centre/cutoff frequency (Hz)
const MIN_FREQUENCY_HZ: f32 = 1.0;

/// Filter response shape
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Shape {
    LowPass,
    HighPass,
    /// Peaking EQ with the given gain in dB
    Peaking(f32),
}

/// Parameter tuple that determines a set of coefficients
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Design {
    pub shape: Shape,
    pub sample_rate: u32,
    pub frequency: f32,
    pub q: f32,
}

#[derive(Debug, Clone)]
pub(crate) struct BiquadSection {
    coefficients: Coefficients<f32>,
    design: Option<Design>,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl BiquadSection {
    /// A section that passes its input through unchanged until configured
    pub fn new() -> Self {
        Self {
            coefficients: Coefficients {
                a1: 0.0,
                a2: 0.0,
                b0: 1.0,
                b1: 0.0,
                b2: 0.0,
            },
            design: None,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Recompute coefficients if `design` differs from the cached one.
    ///
    /// Returns `true` when the coefficients changed.
    pub fn configure(&mut self, design: Design) -> Result<bool> {
        if self.design == Some(design) {
            return Ok(false);
        }

        if design.sample_rate == 0 {
            return Err(EffectError::InvalidParameter(
                "sample rate must be positive".to_string(),
            ));
        }
        if !design.frequency.is_finite() || !design.q.is_finite() || design.q <= 0.0 {
            return Err(EffectError::InvalidParameter(format!(
                "frequency {} / Q {} not usable",
                design.frequency, design.q
            )));
        }

        let fs = design.sample_rate as f32;
        let frequency = design
            .frequency
            .clamp(MIN_FREQUENCY_HZ, fs * NYQUIST_MARGIN);

        let filter_type = match design.shape {
            Shape::LowPass => Type::LowPass,
            Shape::HighPass => Type::HighPass,
            Shape::Peaking(gain_db) => Type::PeakingEQ(gain_db),
        };

        self.coefficients =
            Coefficients::<f32>::from_params(filter_type, fs.hz(), frequency.hz(), design.q)?;
        self.design = Some(design);

        tracing::trace!(?design, clamped_frequency = frequency, "Biquad coefficients updated");
        Ok(true)
    }

    /// Run one sample through the difference equation
    #[inline]
    pub fn step(&mut self, input: f32) -> f32 {
        self.step_shaped(input, |y| y)
    }

    /// Run one sample, passing the raw output through `shape` before it
    /// enters the feedback path.
    #[inline]
    pub fn step_shaped(&mut self, input: f32, shape: impl Fn(f32) -> f32) -> f32 {
        let c = &self.coefficients;
        let y = c.b0 * input + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        let y = shape(y);

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = if y.is_finite() { y } else { 0.0 };

        self.y1
    }

    /// Zero the delay lines, keeping coefficients
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

impl Default for BiquadSection {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn low_pass(frequency: f32) -> Design {
        Design {
            shape: Shape::LowPass,
            sample_rate: 44_100,
            frequency,
            q: 0.707,
        }
    }

    #[test]
    fn unconfigured_section_is_identity() {
        let mut section = BiquadSection::new();
        for x in [0.0, 1.0, -5.0, 1234.0] {
            assert_eq!(section.step(x), x);
        }
    }

    #[test]
    fn coefficients_are_cached() {
        let mut section = BiquadSection::new();
        assert!(section.configure(low_pass(1_000.0)).unwrap());
        assert!(!section.configure(low_pass(1_000.0)).unwrap());
        assert!(section.configure(low_pass(2_000.0)).unwrap());
    }

    #[test]
    fn frequency_above_nyquist_is_clamped() {
        let mut section = BiquadSection::new();
        assert!(section.configure(low_pass(30_000.0)).is_ok());
    }

    #[test]
    fn rejects_non_positive_q() {
        let mut section = BiquadSection::new();
        let design = Design {
            q: 0.0,
            ..low_pass(1_000.0)
        };
        assert!(matches!(
            section.configure(design),
            Err(EffectError::InvalidParameter(_))
        ));
    }

    #[test]
    fn low_pass_settles_to_dc() {
        let mut section = BiquadSection::new();
        section.configure(low_pass(1_000.0)).unwrap();

        let mut y = 0.0;
        for _ in 0..10_000 {
            y = section.step(1_000.0);
        }
        assert!((y - 1_000.0).abs() < 1.0);
    }

    #[test]
    fn high_pass_blocks_dc() {
        let mut section = BiquadSection::new();
        section
            .configure(Design {
                shape: Shape::HighPass,
                ..low_pass(500.0)
            })
            .unwrap();

        let mut y = 0.0;
        for _ in 0..10_000 {
            y = section.step(1_000.0);
        }
        assert!(y.abs() < 1.0);
    }

    #[test]
    fn reset_clears_state() {
        let mut section = BiquadSection::new();
        section.configure(low_pass(1_000.0)).unwrap();
        let first = section.step(500.0);
        section.step(200.0);
        section.reset();
        assert_eq!(section.step(500.0), first);
    }
}
