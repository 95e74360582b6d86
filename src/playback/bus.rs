//! Output bus backed by the shared ring buffer the audio callback drains.
//!
//! The scheduler hands segments to [`RingBufferBus::start`]; a feeder task
//! trickles their samples (resampled to the device rate) into the ring
//! buffer just in time, so a stop can still cut everything that has not yet
//! reached the buffer's short tail.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use ringbuf::traits::Producer;
use rubato::{FastFixedIn, Resampler};
use tokio::sync::mpsc;

use crate::playback::{OutputBus, SourceId};
use crate::types::audio::{PlaybackSegment, PLAYBACK_SAMPLE_RATE};
use crate::utils;

const RESAMPLE_CHUNK: usize = 1024;
const FEED_INTERVAL_MS: u64 = 10;

enum Step {
    Silence,
    Sample(f32),
    Retire(SourceId),
}

struct BusSource {
    id: SourceId,
    start_sample: u64,
    samples: Vec<f32>,
    cursor: usize,
}

#[derive(Default)]
struct BusQueue {
    sources: VecDeque<BusSource>,
}

pub struct RingBufferBus {
    queue: Arc<Mutex<BusQueue>>,
    clock: Arc<AtomicU64>,
    sample_rate: u32,
    resampler: Option<FastFixedIn<f32>>,
    next_id: SourceId,
}

impl RingBufferBus {
    /// `sample_rate` is the output device rate; segments arrive at the
    /// model's 24 kHz and are resampled on the way in when the rates differ.
    pub fn new(sample_rate: u32) -> anyhow::Result<Self> {
        let resampler = if sample_rate == PLAYBACK_SAMPLE_RATE {
            None
        } else {
            Some(utils::audio::create_resampler(
                PLAYBACK_SAMPLE_RATE as f64,
                sample_rate as f64,
                RESAMPLE_CHUNK,
            )?)
        };
        Ok(Self {
            queue: Arc::new(Mutex::new(BusQueue::default())),
            clock: Arc::new(AtomicU64::new(0)),
            sample_rate,
            resampler,
            next_id: 0,
        })
    }

    /// Frame counter the output callback advances as it consumes samples.
    pub fn clock(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.clock)
    }

    /// Spawns the task that moves queued samples into the ring buffer and
    /// reports sources whose audio has been fully played out.
    pub fn spawn_feeder<P>(
        &self,
        mut producer: P,
        ended_tx: mpsc::UnboundedSender<SourceId>,
    ) -> tokio::task::JoinHandle<()>
    where
        P: Producer<Item = f32> + Send + 'static,
    {
        let queue = Arc::clone(&self.queue);
        let clock = Arc::clone(&self.clock);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_millis(FEED_INTERVAL_MS));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut feed_pos: u64 = 0;
            // Sources whose samples are all in the ring but not yet consumed.
            let mut draining: Vec<(SourceId, u64)> = Vec::new();

            loop {
                interval.tick().await;

                let played = clock.load(Ordering::Relaxed);
                draining.retain(|&(id, end_sample)| {
                    if end_sample <= played {
                        if ended_tx.send(id).is_err() {
                            tracing::debug!("ended receiver dropped");
                        }
                        false
                    } else {
                        true
                    }
                });

                let Ok(mut queue) = queue.lock() else {
                    tracing::error!("playback queue lock poisoned; feeder stopping");
                    return;
                };
                while producer.vacant_len() > 0 {
                    let sample = loop {
                        let step = match queue.sources.front_mut() {
                            None => Step::Silence,
                            Some(source) if feed_pos < source.start_sample => Step::Silence,
                            Some(source) if source.cursor < source.samples.len() => {
                                let sample = source.samples[source.cursor];
                                source.cursor += 1;
                                Step::Sample(sample)
                            }
                            Some(source) => Step::Retire(source.id),
                        };
                        match step {
                            Step::Silence => break 0.0,
                            Step::Sample(sample) => break sample,
                            Step::Retire(id) => {
                                queue.sources.pop_front();
                                draining.push((id, feed_pos));
                            }
                        }
                    };
                    if producer.try_push(sample).is_err() {
                        break;
                    }
                    feed_pos += 1;
                }
            }
        })
    }

    /// Mono mixdown plus resampling to the device rate.
    fn device_samples(&mut self, segment: &PlaybackSegment) -> Vec<f32> {
        if segment.channel_count() == 0 {
            return Vec::new();
        }
        let mono: Vec<f32> = if segment.channel_count() <= 1 {
            segment.channel(0).to_vec()
        } else {
            let channels = segment.channel_count();
            (0..segment.samples_per_channel())
                .map(|i| {
                    (0..channels).map(|c| segment.channel(c)[i]).sum::<f32>() / channels as f32
                })
                .collect()
        };

        let Some(resampler) = self.resampler.as_mut() else {
            return mono;
        };
        let chunk_size = resampler.input_frames_next();
        let mut resampled = Vec::with_capacity(mono.len());
        for chunk in utils::audio::split_for_chunks(&mono, chunk_size) {
            match resampler.process(&[chunk.as_slice()], None) {
                Ok(output) => {
                    if let Some(samples) = output.first() {
                        resampled.extend_from_slice(samples);
                    }
                }
                Err(e) => {
                    tracing::warn!("failed to resample playback chunk: {}", e);
                }
            }
        }
        resampled
    }
}

impl OutputBus for RingBufferBus {
    fn now(&self) -> f64 {
        self.clock.load(Ordering::Relaxed) as f64 / self.sample_rate as f64
    }

    fn start(&mut self, segment: PlaybackSegment, at: f64) -> SourceId {
        let samples = self.device_samples(&segment);
        let id = self.next_id;
        self.next_id += 1;
        let start_sample = (at * self.sample_rate as f64).round() as u64;
        if let Ok(mut queue) = self.queue.lock() {
            queue.sources.push_back(BusSource {
                id,
                start_sample,
                samples,
                cursor: 0,
            });
        } else {
            tracing::error!("playback queue lock poisoned; dropping segment");
        }
        id
    }

    fn stop(&mut self, id: SourceId) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.sources.retain(|source| source.id != id);
        }
    }
}
