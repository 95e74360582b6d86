use base64::Engine;
use ringbuf::HeapRb;
use rubato::{FastFixedIn, PolynomialDegree};

use gemini_live_audio_types::audio::{EncodedChunk, PlaybackSegment, CAPTURE_MIME_TYPE};

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("malformed audio payload: {0}")]
    MalformedAudio(String),
}

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// Splits samples into fixed-size chunks, zero-padding the last one.
pub fn split_for_chunks(samples: &[f32], chunk_size: usize) -> Vec<Vec<f32>> {
    samples
        .chunks(chunk_size)
        .map(|chunk| {
            let mut chunk = chunk.to_vec();
            chunk.resize(chunk_size, 0.0);
            chunk
        })
        .collect()
}

/// Creates the ring buffer shared between the feeder task and the output
/// audio callback.
pub fn shared_buffer(size: usize) -> HeapRb<f32> {
    HeapRb::new(size)
}

/// Encodes one capture block as the wire chunk the model expects: each sample
/// mapped to `round(clamp(s, -1, 1) * 32768)`, saturated to int16, packed
/// little-endian and base64-encoded.
pub fn encode(samples: &[f32]) -> EncodedChunk {
    let pcm16: Vec<u8> = samples
        .iter()
        .flat_map(|&sample| {
            let scaled = (sample.clamp(-1.0, 1.0) * 32768.0).round();
            let v = scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            v.to_le_bytes()
        })
        .collect();
    EncodedChunk {
        data: base64::engine::general_purpose::STANDARD.encode(&pcm16),
        mime_type: CAPTURE_MIME_TYPE.to_string(),
    }
}

/// Decodes a base64 chunk of interleaved little-endian int16 PCM into a
/// [`PlaybackSegment`], de-interleaving across `channel_count` and
/// normalizing each sample by 1/32768.
pub fn decode(
    data: &str,
    sample_rate: u32,
    channel_count: usize,
) -> Result<PlaybackSegment, AudioError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| AudioError::MalformedAudio(format!("invalid base64: {e}")))?;

    if channel_count == 0 {
        return Err(AudioError::MalformedAudio(
            "channel count must be non-zero".to_string(),
        ));
    }
    if bytes.len() % (2 * channel_count) != 0 {
        return Err(AudioError::MalformedAudio(format!(
            "{} bytes do not divide into {}-channel int16 frames",
            bytes.len(),
            channel_count
        )));
    }

    let pcm16: Vec<i16> = bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect();

    let samples_per_channel = pcm16.len() / channel_count;
    let mut channels = vec![Vec::with_capacity(samples_per_channel); channel_count];
    for (index, value) in pcm16.into_iter().enumerate() {
        channels[index % channel_count].push(value as f32 / 32768.0);
    }

    Ok(PlaybackSegment::new(channels, sample_rate))
}
