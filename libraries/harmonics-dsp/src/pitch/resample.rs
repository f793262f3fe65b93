/// Linear-interpolation resampling
///
/// [`resample_linear`] converts one self-contained block. [`StreamResampler`]
/// converts a stream delivered in blocks and carries position and the last
/// input sample across block boundaries, so the seams are inaudible and the
/// total output length does not drift.
use harmonics_core::pcm::{clamp_to_sample, Sample};

/// Safe numeric range of a per-sample pitch step
pub const MIN_STEP: f64 = 0.1;
pub const MAX_STEP: f64 = 10.0;

#[inline]
fn lerp(a: Sample, b: Sample, fraction: f64) -> Sample {
    let a = f64::from(a);
    let b = f64::from(b);
    clamp_to_sample((a + fraction * (b - a)) as f32)
}

/// Resample `input` by a constant `factor`.
///
/// Output has `round(len / factor)` samples; output `i` reads source position
/// `i * factor`, interpolating between its floor and the next sample (the last
/// sample is held at the edge). A factor of exactly `1.0` copies the input.
pub fn resample_linear(input: &[Sample], factor: f64) -> Vec<Sample> {
    if input.is_empty() || !factor.is_finite() || factor <= 0.0 {
        return Vec::new();
    }
    if factor == 1.0 {
        return input.to_vec();
    }

    let output_len = (input.len() as f64 / factor).round() as usize;
    let last = input.len() - 1;

    (0..output_len)
        .map(|i| {
            let position = i as f64 * factor;
            let index = (position.floor() as usize).min(last);
            let fraction = position - index as f64;
            let next = input[(index + 1).min(last)];
            lerp(input[index], next, fraction.clamp(0.0, 1.0))
        })
        .collect()
}

/// Block-to-block resampling state
#[derive(Debug, Clone, Default)]
pub struct StreamResampler {
    /// Input samples consumed by earlier constant-pitch blocks
    consumed: u64,
    /// Output samples produced by earlier constant-pitch blocks
    produced: u64,
    /// Read position relative to the start of the next block; `-1.0..0.0`
    /// means "between the previous block's last sample and the next block's
    /// first"
    position: f64,
    previous: Option<Sample>,
}

impl StreamResampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resample one block at a constant `factor`.
    ///
    /// Output `j` of the whole stream reads global input position `j * factor`;
    /// each block emits just enough samples to bring the running output total
    /// to `round(total_input / factor)`. A fresh resampler fed a single block
    /// therefore matches [`resample_linear`] exactly.
    pub fn process_constant(&mut self, block: &[Sample], factor: f64) -> Vec<Sample> {
        if block.is_empty() {
            return Vec::new();
        }
        if factor == 1.0 {
            self.consumed += block.len() as u64;
            self.produced += block.len() as u64;
            self.previous = block.last().copied();
            return block.to_vec();
        }

        let factor = factor.clamp(MIN_STEP, MAX_STEP);
        let total_in = self.consumed + block.len() as u64;
        let target_out = (total_in as f64 / factor).round() as u64;
        let count = target_out.saturating_sub(self.produced) as usize;
        let last = block.len() - 1;
        let block_start = self.consumed as f64;

        let mut out = Vec::with_capacity(count);
        for k in 0..count {
            let global = (self.produced + k as u64) as f64 * factor;
            let local = global - block_start;

            let sample = if local < 0.0 {
                match self.previous {
                    Some(previous) => lerp(previous, block[0], (local + 1.0).clamp(0.0, 1.0)),
                    None => block[0],
                }
            } else {
                let index = (local.floor() as usize).min(last);
                let fraction = (local - index as f64).clamp(0.0, 1.0);
                lerp(block[index], block[(index + 1).min(last)], fraction)
            };
            out.push(sample);
        }

        self.consumed = total_in;
        self.produced += count as u64;
        self.previous = block.last().copied();
        out
    }

    /// Resample one block with a pitch that may change per output sample.
    ///
    /// `pitch_at` receives the output time of each sample, counted from
    /// `start_time` at the block's first output sample. The step is clamped to
    /// `MIN_STEP..=MAX_STEP`. The fractional read position and the block's
    /// last sample carry over to the next call.
    pub fn process_dynamic(
        &mut self,
        block: &[Sample],
        start_time: f64,
        sample_rate: u32,
        mut pitch_at: impl FnMut(f64) -> f64,
    ) -> Vec<Sample> {
        if block.is_empty() {
            return Vec::new();
        }

        let sample_duration = 1.0 / f64::from(sample_rate.max(1));
        let len = block.len() as f64;
        // Sample at virtual index -1 is the previous block's last one
        let at = |index: isize| -> Sample {
            if index < 0 {
                self.previous.unwrap_or(block[0])
            } else {
                block[index as usize]
            }
        };

        let mut position = if self.previous.is_some() {
            self.position
        } else {
            self.position.max(0.0)
        };
        let mut output_time = start_time;
        let mut out = Vec::with_capacity((len / 0.5) as usize + 1);

        while position + 1.0 < len {
            let index = position.floor() as isize;
            let fraction = position - index as f64;
            out.push(lerp(at(index), at(index + 1), fraction));

            let step = pitch_at(output_time);
            let step = if step.is_finite() { step } else { 1.0 };
            position += step.clamp(MIN_STEP, MAX_STEP);
            output_time += sample_duration;
        }

        self.position = position - len;
        self.previous = block.last().copied();
        self.consumed += block.len() as u64;
        self.produced += out.len() as u64;
        out
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
