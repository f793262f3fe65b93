/// Multi-band parametric equalizer
///
/// Each band is a peaking biquad; bands run in series. Boosting several bands
/// at once is tamed by a gain compensation scalar of
/// `1 / (1 + total_positive_gain_db / 30)`.
use super::section::{BiquadSection, Design, Shape};
use super::chain::AudioEffect;
use crate::error::{EffectError, Result};
use harmonics_core::pcm::clamp_to_sample;
use harmonics_core::Sample;

/// EQ band configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EqBand {
    /// Center frequency in Hz
    pub frequency: f32,
    /// Q factor (0.1 to 10.0)
    q: f32,
    /// Gain in dB (-24 to +24)
    gain_db: f32,
}

impl EqBand {
    pub fn new(frequency: f32, q: f32, gain_db: f32) -> Self {
        Self {
            frequency,
            q: q.clamp(0.1, 10.0),
            gain_db: gain_db.clamp(-24.0, 24.0),
        }
    }

    /// A band with no boost or cut
    pub fn flat(frequency: f32) -> Self {
        Self::new(frequency, 1.0, 0.0)
    }

    pub fn q(&self) -> f32 {
        self.q
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }
}

/// Low / mid / high bands at 200 Hz, 1 kHz and 6 kHz, all flat
pub fn default_bands() -> Vec<EqBand> {
    vec![EqBand::flat(200.0), EqBand::flat(1_000.0), EqBand::flat(6_000.0)]
}

pub struct Equalizer {
    bands: Vec<EqBand>,
    sections: Vec<BiquadSection>,
    compensation: f32,
}

impl Equalizer {
    pub fn new(bands: Vec<EqBand>) -> Self {
        let mut eq = Self {
            bands: Vec::new(),
            sections: Vec::new(),
            compensation: 1.0,
        };
        eq.set_bands(bands);
        eq
    }

    pub fn bands(&self) -> &[EqBand] {
        &self.bands
    }

    /// Replace every band; filter state starts from silence
    pub fn set_bands(&mut self, bands: Vec<EqBand>) {
        self.sections = bands.iter().map(|_| BiquadSection::new()).collect();
        self.bands = bands;
        self.update_compensation();
    }

    /// Replace one band, keeping the other bands' filter state
    pub fn update_band(&mut self, index: usize, band: EqBand) -> Result<()> {
        let Some(slot) = self.bands.get_mut(index) else {
            return Err(EffectError::InvalidParameter(format!(
                "EQ band index {index} out of range (have {})",
                self.bands.len()
            )));
        };
        *slot = band;
        self.update_compensation();
        Ok(())
    }

    pub fn gain_compensation(&self) -> f32 {
        self.compensation
    }

    fn update_compensation(&mut self) {
        let total_positive: f32 = self
            .bands
            .iter()
            .map(|band| band.gain_db.max(0.0))
            .sum();
        self.compensation = 1.0 / (1.0 + total_positive / 30.0);
    }
}

impl Default for Equalizer {
    fn default() -> Self {
        Self::new(default_bands())
    }
}

impl AudioEffect for Equalizer {
    fn process(&mut self, block: &[Sample], _time_secs: f64, sample_rate: u32) -> Result<Vec<Sample>> {
        for (section, band) in self.sections.iter_mut().zip(&self.bands) {
            section.configure(Design {
                shape: Shape::Peaking(band.gain_db),
                sample_rate,
                frequency: band.frequency,
                q: band.q,
            })?;
        }

        let compensation = self.compensation;
        Ok(block
            .iter()
            .map(|&sample| {
                let signal = self
                    .sections
                    .iter_mut()
                    .fold(f32::from(sample), |signal, section| section.step(signal));
                clamp_to_sample(signal * compensation)
            })
            .collect())
    }

    fn reset(&mut self) {
        for section in &mut self.sections {
            section.reset();
        }
    }

    fn name(&self) -> String {
        let bands: Vec<String> = self
            .bands
            .iter()
            .map(|band| format!("{:.0}Hz:{:.0}dB", band.frequency, band.gain_db))
            .collect();
        format!("EQ({})", bands.join(", "))
    }

    fn speed_multiplier(&self) -> f64 {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, len: usize) -> Vec<Sample> {
        (0..len)
            .map(|i| {
                let t = i as f32 / 48_000.0;
                (8_000.0 * (2.0 * std::f32::consts::PI * freq * t).sin()).round() as Sample
            })
            .collect()
    }

    fn peak(samples: &[Sample]) -> i32 {
        samples.iter().map(|&s| i32::from(s).abs()).max().unwrap_or(0)
    }

    #[test]
    fn flat_bands_are_transparent() {
        let mut eq = Equalizer::default();
        let input = sine(1_000.0, 4_800);
        let out = eq.process(&input, 0.0, 48_000).unwrap();
        for (a, b) in input.iter().zip(&out) {
            assert!((i32::from(*a) - i32::from(*b)).abs() <= 1);
        }
    }

    #[test]
    fn compensation_follows_positive_gain() {
        let eq = Equalizer::new(vec![
            EqBand::new(100.0, 1.0, 6.0),
            EqBand::new(1_000.0, 1.0, 9.0),
            EqBand::new(5_000.0, 1.0, -12.0),
        ]);
        assert!((eq.gain_compensation() - 1.0 / 1.5).abs() < 1e-6);
    }

    #[test]
    fn gain_is_clamped() {
        let band = EqBand::new(1_000.0, 50.0, 40.0);
        assert_eq!(band.gain_db(), 24.0);
        assert_eq!(band.q(), 10.0);
    }

    #[test]
    fn cut_reduces_level_at_centre() {
        let mut eq = Equalizer::new(vec![EqBand::new(1_000.0, 1.0, -12.0)]);
        let input = sine(1_000.0, 9_600);
        let out = eq.process(&input, 0.0, 48_000).unwrap();
        // -12 dB is roughly a quarter of the amplitude
        assert!(peak(&out[4_800..]) < 2_500);
    }

    #[test]
    fn update_band_changes_response() {
        let mut eq = Equalizer::default();
        eq.update_band(1, EqBand::new(1_000.0, 1.0, -12.0)).unwrap();
        assert_eq!(eq.bands()[1].gain_db(), -12.0);
        assert!(eq.update_band(7, EqBand::flat(50.0)).is_err());

        let input = sine(1_000.0, 9_600);
        let out = eq.process(&input, 0.0, 48_000).unwrap();
        assert!(peak(&out[4_800..]) < 2_500);
    }

    #[test]
    fn set_bands_replaces_all() {
        let mut eq = Equalizer::default();
        eq.set_bands(vec![EqBand::new(500.0, 2.0, 3.0)]);
        assert_eq!(eq.bands().len(), 1);
        assert_eq!(eq.name(), "EQ(500Hz:3dB)");
    }
}
