//! Host glue for the smart-mirror panel: reads `start-recording`,
//! `stop-recording` and `reset-session` notifications on stdin, prints
//! status lines for the UI, and runs the capture → session → playback
//! pipeline against real audio devices.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::Parser;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FrameCount, StreamConfig};
use ringbuf::traits::{Consumer, Split};
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::fmt::time::ChronoLocal;

use gemini_live_audio::capture::Recorder;
use gemini_live_audio::config::{Config, OUTPUT_CHUNK_SIZE, OUTPUT_LATENCY_MS};
use gemini_live_audio::playback::{PlaybackScheduler, RingBufferBus};
use gemini_live_audio::session::{Command, Notification, SessionManager};
use gemini_live_audio::transport::GeminiDial;
use gemini_live_audio::types::audio::PLAYBACK_SAMPLE_RATE;
use gemini_live_audio::utils;

#[derive(Parser)]
#[command(name = "panel", about = "Smart-mirror Gemini Live audio panel")]
struct Cli {
    /// Capture device name (system default if omitted)
    #[arg(long)]
    input_device: Option<String>,

    /// Playback device name (system default if omitted)
    #[arg(long)]
    output_device: Option<String>,

    /// List audio devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            // Fatal to startup: surfaced as a status line, no session attempted.
            println!("status: Error: {e}");
            return Ok(());
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    if args.list_devices {
        println!("inputs:\n{}", utils::device::list_inputs()?);
        println!("outputs:\n{}", utils::device::list_outputs()?);
        return Ok(());
    }

    // --- Output path: device → callback ← ring buffer ← feeder ← scheduler ---

    let output = utils::device::output_device(args.output_device.as_deref())?;
    tracing::info!("using output device: {:?}", output.name()?);
    let output_config = output.default_output_config()?;
    let output_config = StreamConfig {
        channels: output_config.channels(),
        sample_rate: output_config.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(FrameCount::from(OUTPUT_CHUNK_SIZE as u32)),
    };
    let output_channel_count = output_config.channels as usize;
    let output_sample_rate = output_config.sample_rate.0;
    tracing::info!("output stream config: {:?}", &output_config);

    let ring =
        utils::audio::shared_buffer(output_sample_rate as usize * OUTPUT_LATENCY_MS / 1000);
    let (producer, consumer) = ring.split();

    let bus = RingBufferBus::new(output_sample_rate)?;
    let clock = bus.clock();
    let (ended_tx, mut ended_rx) = tokio::sync::mpsc::unbounded_channel();
    let feeder = bus.spawn_feeder(producer, ended_tx);
    let scheduler = Arc::new(PlaybackScheduler::new(bus));

    // The callback pulls mono samples, duplicates them across channels and
    // advances the playback clock by the frames it consumed.
    let mut consumer = consumer;
    let output_data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        let mut sample_index = 0;
        while sample_index < data.len() {
            let sample = consumer.try_pop().unwrap_or(0.0);
            // L channel (ch:0)
            if sample_index < data.len() {
                data[sample_index] = sample;
                sample_index += 1;
            }
            // R channel (ch:1)
            if output_channel_count > 1 && sample_index < data.len() {
                data[sample_index] = sample;
                sample_index += 1;
            }
            // Ignore other channels.
            sample_index += output_channel_count.saturating_sub(2);
        }
        clock.fetch_add((data.len() / output_channel_count) as u64, Ordering::Relaxed);
    };
    let output_stream = output.build_output_stream(
        &output_config,
        output_data_fn,
        move |err| tracing::error!("output stream error: {}", err),
        None,
    )?;
    output_stream.play()?;

    let ended_scheduler = Arc::clone(&scheduler);
    let ended_task = tokio::spawn(async move {
        while let Some(id) = ended_rx.recv().await {
            ended_scheduler.handle_ended(id);
        }
    });

    // --- Session manager ---

    let (notify_tx, mut notify_rx) = tokio::sync::mpsc::channel(256);
    let (command_tx, command_rx) = tokio::sync::mpsc::channel(256);
    let manager = SessionManager::new(GeminiDial, config.session_config(), notify_tx);
    let manager_task = tokio::spawn(manager.run(command_rx));
    command_tx.send(Command::InitSession).await?;

    // Render status, schedule reply audio, cut playback on interruption.
    let playback = Arc::clone(&scheduler);
    let notify_task = tokio::spawn(async move {
        while let Some(notification) = notify_rx.recv().await {
            match notification {
                Notification::Status(text) => println!("status: {text}"),
                Notification::Error(text) => println!("status: Error: {text}"),
                Notification::Audio(data) => {
                    match utils::audio::decode(&data, PLAYBACK_SAMPLE_RATE, 1) {
                        Ok(segment) => playback.enqueue(segment),
                        Err(e) => tracing::warn!("dropping malformed audio chunk: {}", e),
                    }
                }
                Notification::Interrupted => playback.flush_and_reset(),
            }
        }
    });

    // --- Host notifications on stdin ---

    let mut recorder = Recorder::new();
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    println!("status: Initializing...");
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "start-recording" => {
                match recorder.start(args.input_device.as_deref(), command_tx.clone()) {
                    Ok(()) => println!("status: Recording... Speak now."),
                    // Recoverable: recording simply does not start.
                    Err(e) => println!("status: Error: {e}"),
                }
            }
            "stop-recording" => {
                recorder.stop();
                println!("status: Recording stopped.");
            }
            "reset-session" => {
                if recorder.is_recording() {
                    recorder.stop();
                }
                println!("status: Resetting session...");
                command_tx.send(Command::ResetSession).await?;
            }
            "" => {}
            other => tracing::warn!("unknown notification: {:?}", other),
        }
    }

    // Host hung up: tear everything down.
    recorder.stop();
    let _ = command_tx.send(Command::Close).await;
    let _ = manager_task.await;
    drop(command_tx);
    let _ = notify_task.await;
    ended_task.abort();
    feeder.abort();
    drop(output_stream);
    Ok(())
}
