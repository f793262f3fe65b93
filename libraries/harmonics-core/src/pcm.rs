//! Signed 16-bit little-endian PCM helpers

/// One mono PCM amplitude value
pub type Sample = i16;

/// Bytes occupied by one [`Sample`] on the wire
pub const BYTES_PER_SAMPLE: usize = 2;

/// Decode little-endian byte pairs into samples.
///
/// A trailing odd byte is ignored; callers that stream bytes keep it
/// around and prepend it to the next read.
pub fn bytes_to_samples(bytes: &[u8]) -> Vec<Sample> {
    bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| Sample::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Encode samples as little-endian bytes
pub fn samples_to_bytes(samples: &[Sample]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    extend_bytes(&mut out, samples);
    out
}

/// Append the little-endian encoding of `samples` to `out`
pub fn extend_bytes(out: &mut Vec<u8>, samples: &[Sample]) {
    out.reserve(samples.len() * BYTES_PER_SAMPLE);
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
}

/// Round and saturate a floating point amplitude into the sample range
#[inline]
pub fn clamp_to_sample(value: f32) -> Sample {
    if value.is_nan() {
        return 0;
    }
    value
        .round()
        .clamp(f32::from(Sample::MIN), f32::from(Sample::MAX)) as Sample
}

/// Number of samples covering `millis` milliseconds at `sample_rate`
pub fn samples_for_millis(sample_rate: u32, millis: f64) -> usize {
    ((f64::from(sample_rate) * millis / 1000.0).round().max(0.0)) as usize
}
