//! Microphone capture via the host's default input device.
//!
//! cpal streams are not `Send`, so the device lives on its own thread. The
//! data callback runs the conditioning chain and assembles 160-sample
//! frames into the mic source channel, non-blocking. The record-mic toggle
//! is honored inside the callback: the device stays open while disabled,
//! but no frames are produced.

use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use tokio_util::sync::CancellationToken;

use super::chain::ConditioningChain;
use crate::audio::sources::SourceSender;
use crate::protocol_constants::FRAME_SAMPLES;
use crate::state::StationState;

/// Owns the per-stream conditioning state and feeds whole frames into the
/// mic source channel.
struct Processor {
    state: Arc<StationState>,
    mic: SourceSender,
    chain: ConditioningChain,
    pending: Vec<i32>,
    scratch: Vec<f32>,
}

impl Processor {
    fn new(rate: u32, channels: u16, state: Arc<StationState>, mic: SourceSender) -> Self {
        Self {
            state,
            mic,
            chain: ConditioningChain::new(rate, channels),
            pending: Vec::with_capacity(FRAME_SAMPLES),
            scratch: Vec::new(),
        }
    }

    fn feed(&mut self, samples: impl Iterator<Item = f32>) {
        if !self.state.toggles.record_mic.get() {
            return;
        }
        self.scratch.clear();
        self.scratch.extend(samples);
        let conditioned = self.chain.process(&self.scratch);
        for &s in conditioned {
            self.pending
                .push(s.clamp(f32::from(i16::MIN), f32::from(i16::MAX)).round() as i32);
            if self.pending.len() == FRAME_SAMPLES {
                let mut frame = [0i32; FRAME_SAMPLES];
                frame.copy_from_slice(&self.pending);
                self.pending.clear();
                self.mic.push(frame);
            }
        }
    }
}

/// Starts the capture thread. Returns immediately; device failures are
/// logged from the thread, leaving the rest of the station running.
pub fn spawn_capture(
    state: Arc<StationState>,
    mic: SourceSender,
    cancel: CancellationToken,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("mic-capture".into())
        .spawn(move || run_capture(state, mic, cancel))
        .expect("spawn mic capture thread")
}

fn open_stream(
    device: &Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    state: Arc<StationState>,
    mic: SourceSender,
) -> Result<Stream, cpal::BuildStreamError> {
    let rate = config.sample_rate.0;
    let channels = config.channels;
    let err_fn = |e| log::warn!("[Mic] Stream error: {}", e);

    match sample_format {
        SampleFormat::F32 => {
            let mut p = Processor::new(rate, channels, state, mic);
            device.build_input_stream(
                config,
                move |data: &[f32], _| p.feed(data.iter().map(|&s| s * f32::from(i16::MAX))),
                err_fn,
                None,
            )
        }
        SampleFormat::I16 => {
            let mut p = Processor::new(rate, channels, state, mic);
            device.build_input_stream(
                config,
                move |data: &[i16], _| p.feed(data.iter().map(|&s| f32::from(s))),
                err_fn,
                None,
            )
        }
        SampleFormat::U16 => {
            let mut p = Processor::new(rate, channels, state, mic);
            device.build_input_stream(
                config,
                move |data: &[u16], _| {
                    p.feed(data.iter().map(|&s| (i32::from(s) - 32768) as f32))
                },
                err_fn,
                None,
            )
        }
        other => {
            log::warn!("[Mic] Unsupported sample format {:?}, converting via f32", other);
            let mut p = Processor::new(rate, channels, state, mic);
            device.build_input_stream(
                config,
                move |data: &[f32], _| p.feed(data.iter().map(|&s| s * f32::from(i16::MAX))),
                err_fn,
                None,
            )
        }
    }
}

fn run_capture(state: Arc<StationState>, mic: SourceSender, cancel: CancellationToken) {
    let host = cpal::default_host();
    let Some(device) = host.default_input_device() else {
        log::warn!("[Mic] No default capture device, mic source disabled");
        return;
    };

    let config = match device.default_input_config() {
        Ok(c) => c,
        Err(e) => {
            log::warn!("[Mic] No usable input config: {}", e);
            return;
        }
    };
    let sample_format = config.sample_format();
    let stream_config: StreamConfig = config.into();

    let stream = match open_stream(&device, &stream_config, sample_format, state, mic) {
        Ok(s) => s,
        Err(e) => {
            log::warn!("[Mic] Failed to open capture stream: {}", e);
            return;
        }
    };
    if let Err(e) = stream.play() {
        log::warn!("[Mic] Failed to start capture stream: {}", e);
        return;
    }

    log::info!(
        "[Mic] Capture running: {} Hz, {} ch, {:?} -> 8000 Hz mono",
        stream_config.sample_rate.0,
        stream_config.channels,
        sample_format
    );

    // Keep the stream alive until shutdown.
    while !cancel.is_cancelled() {
        std::thread::sleep(Duration::from_millis(200));
    }
    drop(stream);
    log::info!("[Mic] Capture stopped");
}
