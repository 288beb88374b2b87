use std::io::Cursor;

use anyhow::{Context, Result};

pub(crate) const WAV_MIME: &str = "audio/wav";

/// Encodes interleaved 16-bit PCM as an in-memory WAV file.
pub(crate) fn encode_pcm16(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut buffer = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut buffer, spec).context("Failed to create WAV writer")?;
        for sample in samples {
            writer.write_sample(*sample).context("Failed to write WAV sample")?;
        }
        writer.finalize().context("Failed to finalize WAV")?;
    }

    Ok(buffer.into_inner())
}

/// Whole seconds of audio in an interleaved buffer.
pub(crate) fn duration_seconds(sample_count: usize, sample_rate: u32, channels: u16) -> u32 {
    let frames_per_second = u64::from(sample_rate) * u64::from(channels.max(1));
    if frames_per_second == 0 {
        return 0;
    }
    (sample_count as u64 / frames_per_second) as u32
}
