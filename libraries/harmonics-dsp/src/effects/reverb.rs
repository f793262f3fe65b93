/// Freeverb-style reverb
///
/// Eight parallel damped comb filters summed, then four serial all-pass
/// filters. Delay lengths are the classic Freeverb tunings at 44.1 kHz,
/// scaled to the stream's sample rate.
use super::chain::AudioEffect;
use crate::error::Result;
use harmonics_core::pcm::clamp_to_sample;
use harmonics_core::Sample;

const COMB_TUNINGS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
const ALLPASS_TUNINGS: [usize; 4] = [556, 441, 341, 225];
const TUNING_RATE: f64 = 44_100.0;

const FIXED_GAIN: f32 = 0.015;
const SCALE_ROOM: f32 = 0.28;
const OFFSET_ROOM: f32 = 0.7;
const SCALE_DAMP: f32 = 0.4;
const ALLPASS_FEEDBACK: f32 = 0.5;
const WET_SCALE: f32 = 3.0;

/// Any value written into a delay line is clamped to this magnitude
const DELAY_LIMIT: f32 = 4.0;

const FULL_SCALE: f32 = 32_768.0;

#[inline]
fn sanitize(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(-DELAY_LIMIT, DELAY_LIMIT)
    } else {
        0.0
    }
}

#[derive(Debug, Clone)]
struct Comb {
    buffer: Vec<f32>,
    index: usize,
    filter_store: f32,
}

impl Comb {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            index: 0,
            filter_store: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let output = self.buffer[self.index];
        self.filter_store = sanitize(output * (1.0 - damp) + self.filter_store * damp);
        self.buffer[self.index] = sanitize(input + self.filter_store * feedback);
        self.index = (self.index + 1) % self.buffer.len();
        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
        self.filter_store = 0.0;
    }
}

#[derive(Debug, Clone)]
struct AllPass {
    buffer: Vec<f32>,
    index: usize,
}

impl AllPass {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            index: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.index];
        let output = buffered - input;
        self.buffer[self.index] = sanitize(input + buffered * ALLPASS_FEEDBACK);
        self.index = (self.index + 1) % self.buffer.len();
        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
    }
}

pub struct Reverb {
    room_size: f32,
    damping: f32,
    wet: f32,
    sample_rate: u32,
    combs: Vec<Comb>,
    allpasses: Vec<AllPass>,
}

impl Reverb {
    /// `room_size`, `damping` and `wet` all range over `[0, 1]`
    pub fn new(room_size: f32, damping: f32, wet: f32) -> Self {
        Self {
            room_size: room_size.clamp(0.0, 1.0),
            damping: damping.clamp(0.0, 1.0),
            wet: wet.clamp(0.0, 1.0),
            sample_rate: 0,
            combs: Vec::new(),
            allpasses: Vec::new(),
        }
    }

    fn ensure_buffers(&mut self, sample_rate: u32) {
        if self.sample_rate == sample_rate && !self.combs.is_empty() {
            return;
        }
        let scale = f64::from(sample_rate) / TUNING_RATE;
        let scaled = |tuning: usize| ((tuning as f64 * scale).round() as usize).max(1);

        self.combs = COMB_TUNINGS.iter().map(|&t| Comb::new(scaled(t))).collect();
        self.allpasses = ALLPASS_TUNINGS
            .iter()
            .map(|&t| AllPass::new(scaled(t)))
            .collect();
        self.sample_rate = sample_rate;
    }
}

impl Default for Reverb {
    fn default() -> Self {
        Self::new(0.7, 0.4, 0.5)
    }
}

impl AudioEffect for Reverb {
    fn process(&mut self, block: &[Sample], _time_secs: f64, sample_rate: u32) -> Result<Vec<Sample>> {
        if self.wet <= 0.0 {
            return Ok(block.to_vec());
        }
        self.ensure_buffers(sample_rate);

        let feedback = self.room_size * SCALE_ROOM + OFFSET_ROOM;
        let damp = self.damping * SCALE_DAMP;
        let dry = 1.0 - self.wet;
        let wet = self.wet * WET_SCALE;

        let mut output = Vec::with_capacity(block.len());
        for &sample in block {
            let input = f32::from(sample) / FULL_SCALE;
            let driven = input * FIXED_GAIN;

            let mut reverb: f32 = self
                .combs
                .iter_mut()
                .map(|comb| comb.process(driven, feedback, damp))
                .sum();
            for allpass in &mut self.allpasses {
                reverb = allpass.process(reverb);
            }

            let mixed = input * dry + reverb * wet;
            output.push(clamp_to_sample(mixed * FULL_SCALE));
        }
        Ok(output)
    }

    fn reset(&mut self) {
        for comb in &mut self.combs {
            comb.clear();
        }
        for allpass in &mut self.allpasses {
            allpass.clear();
        }
    }

    fn name(&self) -> String {
        format!(
            "Reverb(room={:.2}, damp={:.2}, wet={:.2})",
            self.room_size, self.damping, self.wet
        )
    }

    fn speed_multiplier(&self) -> f64 {
        1.0
    }
}
