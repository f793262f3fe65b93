/// Output sinks for rendered PCM
use anyhow::Context;
use harmonics_core::{Sample, BYTES_PER_SAMPLE};
use std::io::{self, Read, Write};
use std::path::Path;

const READ_CHUNK: usize = 16 * 1024;

/// Drain `reader` into a 16-bit mono WAV file; returns the samples written
pub fn write_wav(reader: &mut impl Read, path: &Path, sample_rate: u32) -> anyhow::Result<u64> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("failed to create {}", path.display()))?;

    let mut buf = vec![0u8; READ_CHUNK];
    let mut carry: Option<u8> = None;
    let mut written = 0u64;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("stream failed while rendering"),
        };

        let mut bytes = &buf[..n];
        if let Some(low) = carry.take() {
            writer.write_sample(Sample::from_le_bytes([low, bytes[0]]))?;
            written += 1;
            bytes = &bytes[1..];
        }
        let mut pairs = bytes.chunks_exact(BYTES_PER_SAMPLE);
        for pair in &mut pairs {
            writer.write_sample(Sample::from_le_bytes([pair[0], pair[1]]))?;
            written += 1;
        }
        carry = pairs.remainder().first().copied();
    }

    if carry.is_some() {
        tracing::warn!("Dropping trailing odd byte");
    }
    writer
        .finalize()
        .with_context(|| format!("failed to finish {}", path.display()))?;
    Ok(written)
}

/// Copy raw s16le bytes to `writer`; returns the samples written
pub fn write_raw(reader: &mut impl Read, writer: &mut impl Write) -> anyhow::Result<u64> {
    let bytes = io::copy(reader, writer).context("stream failed while rendering")?;
    writer.flush()?;
    Ok(bytes / BYTES_PER_SAMPLE as u64)
}
