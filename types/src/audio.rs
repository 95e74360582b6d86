/// Audio data encoded as base64
pub type Base64EncodedAudioBytes = String;

/// Sample rate the model expects for microphone input.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;
/// Sample rate of synthesized audio coming back from the model.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;
/// MIME descriptor attached to every outbound capture chunk.
pub const CAPTURE_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// One microphone chunk in wire form: little-endian int16 PCM, base64-encoded,
/// tagged with the capture sample rate.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedChunk {
    pub data: Base64EncodedAudioBytes,
    pub mime_type: String,
}

/// A decoded block of playable audio, one Vec per channel, normalized to
/// [-1.0, 1.0]. Owned by the playback scheduler from decode until playback
/// completes or is flushed.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSegment {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl PlaybackSegment {
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn samples_per_channel(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration in seconds: samples per channel over the sample rate.
    pub fn duration_secs(&self) -> f64 {
        self.samples_per_channel() as f64 / self.sample_rate as f64
    }
}
