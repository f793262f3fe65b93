/// Two-source mixer
///
/// Blends the primary block with a secondary source at a `mix` level in
/// `[0, 1]` (0 = only primary, 1 = only secondary). When the secondary source
/// fails the primary block passes through untouched for that block.
use super::chain::AudioEffect;
use crate::error::{EffectError, Result};
use harmonics_core::pcm::{clamp_to_sample, Sample, BYTES_PER_SAMPLE};
use rand::Rng;
use std::f64::consts::PI;
use std::io::{ErrorKind, Read};

/// Produces `count` secondary samples starting at `time_secs`
pub type Generator = Box<dyn FnMut(f64, usize, u32) -> Result<Vec<Sample>> + Send>;

/// Where the secondary signal comes from
pub enum SecondarySource {
    /// A function of stream time
    Generator(Generator),
    /// A raw 16-bit little-endian PCM byte stream
    Stream(Box<dyn Read + Send>),
}

impl SecondarySource {
    fn label(&self) -> &'static str {
        match self {
            SecondarySource::Generator(_) => "Function",
            SecondarySource::Stream(_) => "Stream",
        }
    }
}

pub struct Mixer {
    source: SecondarySource,
    mix: f32,
    /// Odd byte left over from the previous stream read
    pending: Option<u8>,
}

impl Mixer {
    pub fn new(source: SecondarySource, mix: f32) -> Self {
        Self {
            source,
            mix: mix.clamp(0.0, 1.0),
            pending: None,
        }
    }

    pub fn with_generator(
        generator: impl FnMut(f64, usize, u32) -> Result<Vec<Sample>> + Send + 'static,
        mix: f32,
    ) -> Self {
        Self::new(SecondarySource::Generator(Box::new(generator)), mix)
    }

    pub fn with_stream(stream: impl Read + Send + 'static, mix: f32) -> Self {
        Self::new(SecondarySource::Stream(Box::new(stream)), mix)
    }

    fn secondary(&mut self, time_secs: f64, count: usize, sample_rate: u32) -> Result<Vec<Sample>> {
        match &mut self.source {
            SecondarySource::Generator(generate) => generate(time_secs, count, sample_rate),
            SecondarySource::Stream(stream) => {
                read_samples(stream.as_mut(), &mut self.pending, count)
            }
        }
    }
}

/// Read up to `count` samples, stopping early at end of stream
fn read_samples(stream: &mut dyn Read, pending: &mut Option<u8>, count: usize) -> Result<Vec<Sample>> {
    let mut bytes = vec![0u8; count * BYTES_PER_SAMPLE];
    let mut filled = 0;
    if let Some(byte) = pending.take() {
        if let Some(first) = bytes.first_mut() {
            *first = byte;
            filled = 1;
        }
    }

    while filled < bytes.len() {
        match stream.read(&mut bytes[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(EffectError::SecondarySource(e.to_string())),
        }
    }

    if filled % BYTES_PER_SAMPLE == 1 {
        *pending = Some(bytes[filled - 1]);
        filled -= 1;
    }

    Ok(bytes[..filled]
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| Sample::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

impl AudioEffect for Mixer {
    fn process(&mut self, block: &[Sample], time_secs: f64, sample_rate: u32) -> Result<Vec<Sample>> {
        let secondary = match self.secondary(time_secs, block.len(), sample_rate) {
            Ok(samples) => samples,
            Err(e) => {
                tracing::debug!(error = %e, "Mixer secondary source failed, passing primary through");
                return Ok(block.to_vec());
            }
        };

        let primary_level = 1.0 - self.mix;
        let secondary_level = self.mix;

        Ok(block
            .iter()
            .enumerate()
            .map(|(i, &primary)| {
                let primary = f32::from(primary) * primary_level;
                let secondary = secondary
                    .get(i)
                    .map_or(0.0, |&s| f32::from(s) * secondary_level);
                clamp_to_sample(primary + secondary)
            })
            .collect())
    }

    fn reset(&mut self) {
        self.pending = None;
    }

    fn name(&self) -> String {
        format!("Mixer(source={}, level={:.2})", self.source.label(), self.mix)
    }

    fn speed_multiplier(&self) -> f64 {
        1.0
    }
}

/// Secondary source of silence
pub fn silence() -> Generator {
    Box::new(|_time, count, _rate| Ok(vec![0; count]))
}

/// Sine tone at `frequency` Hz; `amplitude` is a fraction of full scale
pub fn tone(frequency: f32, amplitude: f32) -> Generator {
    let frequency = f64::from(frequency);
    let amplitude = f64::from(amplitude) * f64::from(Sample::MAX);
    Box::new(move |time, count, rate| {
        let rate = f64::from(rate.max(1));
        Ok((0..count)
            .map(|i| {
                let t = time + i as f64 / rate;
                clamp_to_sample((amplitude * (2.0 * PI * frequency * t).sin()) as f32)
            })
            .collect())
    })
}

/// Uniform white noise; `amplitude` is a fraction of full scale
pub fn noise(amplitude: f32) -> Generator {
    let amplitude = amplitude.abs() * f32::from(Sample::MAX);
    Box::new(move |_time, count, _rate| {
        let mut rng = rand::thread_rng();
        Ok((0..count)
            .map(|_| clamp_to_sample(rng.gen_range(-1.0f32..=1.0) * amplitude))
            .collect())
    })
}
