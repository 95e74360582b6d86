//! Microphone capture: a cpal input stream feeding an encoder task that
//! aggregates capture blocks, resamples them to the model's 16 kHz input
//! rate, and hands wire chunks to the session manager.

use std::collections::VecDeque;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FrameCount, StreamConfig};
use rubato::Resampler;
use tokio::sync::mpsc;

use crate::config::INPUT_CHUNK_SIZE;
use crate::session::Command;
use crate::types::audio::CAPTURE_SAMPLE_RATE;
use crate::utils;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("no usable input device: {0}")]
    Device(String),

    #[error("failed to start input stream: {0}")]
    Stream(String),
}

/// Owns the input stream while recording. Dropping the stream releases the
/// device and ends the encoder task, so stop is safe on every path.
pub struct Recorder {
    stream: Option<cpal::Stream>,
    is_recording: bool,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            stream: None,
            is_recording: false,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording
    }

    /// Opens the capture device and begins streaming encoded chunks into
    /// `command_tx`. A failure leaves no device handle behind.
    pub fn start(
        &mut self,
        device_name: Option<&str>,
        command_tx: mpsc::Sender<Command>,
    ) -> Result<(), CaptureError> {
        if self.is_recording {
            return Ok(());
        }

        let device = utils::device::input_device(device_name)
            .map_err(|e| CaptureError::Device(e.to_string()))?;
        tracing::info!(
            "using input device: {:?}",
            device.name().unwrap_or_else(|_| "<unnamed>".to_string())
        );

        let default_config = device
            .default_input_config()
            .map_err(|e| CaptureError::Device(e.to_string()))?;
        let stream_config = StreamConfig {
            channels: default_config.channels(),
            sample_rate: default_config.sample_rate(),
            buffer_size: cpal::BufferSize::Fixed(FrameCount::from(INPUT_CHUNK_SIZE as u32)),
        };
        let channel_count = stream_config.channels as usize;
        let input_sample_rate = stream_config.sample_rate.0;

        let (frame_tx, frame_rx) = mpsc::channel::<Vec<f32>>(1024);
        spawn_encoder(frame_rx, command_tx, input_sample_rate);

        // The audio callback mixes to mono and hands off without blocking.
        let input_data_fn = move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let audio = if channel_count > 1 {
                data.chunks(channel_count)
                    .map(|frame| frame.iter().sum::<f32>() / channel_count as f32)
                    .collect::<Vec<f32>>()
            } else {
                data.to_vec()
            };
            if let Err(e) = frame_tx.try_send(audio) {
                tracing::warn!("failed to hand off capture block: {:?}", e);
            }
        };

        let stream = device
            .build_input_stream(
                &stream_config,
                input_data_fn,
                move |err| tracing::error!("input stream error: {}", err),
                None,
            )
            .map_err(|e| CaptureError::Stream(e.to_string()))?;
        stream
            .play()
            .map_err(|e| CaptureError::Stream(e.to_string()))?;

        self.stream = Some(stream);
        self.is_recording = true;
        Ok(())
    }

    /// Ends capture and releases the device.
    pub fn stop(&mut self) {
        self.stream = None;
        self.is_recording = false;
    }
}

/// Buffers incoming capture blocks until a full chunk is available, resamples
/// it to 16 kHz and forwards the encoded result. Ends when the stream (and
/// with it the frame sender) is dropped.
pub fn spawn_encoder(
    mut frame_rx: mpsc::Receiver<Vec<f32>>,
    command_tx: mpsc::Sender<Command>,
    input_sample_rate: u32,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut resampler = if input_sample_rate == CAPTURE_SAMPLE_RATE {
            None
        } else {
            match utils::audio::create_resampler(
                input_sample_rate as f64,
                CAPTURE_SAMPLE_RATE as f64,
                INPUT_CHUNK_SIZE,
            ) {
                Ok(resampler) => Some(resampler),
                Err(e) => {
                    tracing::error!("failed to create capture resampler: {}", e);
                    return;
                }
            }
        };

        let mut buffer: VecDeque<f32> = VecDeque::with_capacity(INPUT_CHUNK_SIZE * 2);
        while let Some(block) = frame_rx.recv().await {
            buffer.extend(block);

            while buffer.len() >= INPUT_CHUNK_SIZE {
                let chunk: Vec<f32> = buffer.drain(..INPUT_CHUNK_SIZE).collect();
                let samples = match resampler.as_mut() {
                    None => chunk,
                    Some(resampler) => match resampler.process(&[chunk.as_slice()], None) {
                        Ok(output) => output.into_iter().next().unwrap_or_default(),
                        Err(e) => {
                            tracing::warn!("failed to resample capture chunk: {}", e);
                            continue;
                        }
                    },
                };
                if samples.is_empty() {
                    continue;
                }
                let encoded = utils::audio::encode(&samples);
                if command_tx
                    .send(Command::SendAudioChunk(encoded))
                    .await
                    .is_err()
                {
                    tracing::debug!("session command channel closed; capture encoder stopping");
                    return;
                }
            }
        }
    })
}
