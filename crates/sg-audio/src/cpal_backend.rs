//! CPAL-based audio output backend.
//!
//! A producer thread renders frames into a ring buffer; the device
//! callback pops them and advances the shared `FrameClock`, which makes
//! the count of played frames the session's audio clock.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use sg_engine::{Frame, FrameClock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

use crate::traits::{AudioError, AudioOutput};

/// CPAL-based audio output.
pub struct CpalOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    producer: HeapProd<Frame>,
    clock: FrameClock,
    running: Arc<AtomicBool>,
}

impl CpalOutput {
    /// Open the default output device.
    ///
    /// The ring holds `buffer_ms` of audio; that is the output latency on
    /// top of the device's own buffering.
    pub fn new(buffer_ms: u32) -> Result<(Self, HeapCons<Frame>), AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        let config = device.default_output_config().map_err(|e| AudioError::DeviceInit(e.to_string()))?;

        let mut config: StreamConfig = config.into();
        // the callback writes interleaved stereo
        config.channels = 2;

        let sample_rate = config.sample_rate.0;
        let capacity = (sample_rate as usize * buffer_ms.max(1) as usize / 1000).max(64);
        let (producer, consumer) = HeapRb::<Frame>::new(capacity).split();

        info!(
            device = %device.name().unwrap_or_default(),
            sample_rate,
            capacity,
            "opened audio output"
        );

        let output = Self {
            device,
            config,
            stream: None,
            producer,
            clock: FrameClock::new(sample_rate),
            running: Arc::new(AtomicBool::new(false)),
        };
        Ok((output, consumer))
    }

    /// Build the stream around `consumer` and start the device.
    pub fn build_stream(&mut self, mut consumer: HeapCons<Frame>) -> Result<(), AudioError> {
        let running = self.running.clone();
        let clock = self.clock.clone();
        let channels = self.config.channels as usize;

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !running.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }

                    let mut played = 0;
                    for chunk in data.chunks_mut(channels) {
                        match consumer.try_pop() {
                            Some(frame) => {
                                played += 1;
                                for (i, sample) in chunk.iter_mut().enumerate() {
                                    *sample = match i {
                                        0 => frame.left,
                                        1 => frame.right,
                                        _ => 0.0,
                                    };
                                }
                            }
                            None => chunk.fill(0.0),
                        }
                    }
                    clock.advance(played);
                },
                |err| error!("audio stream error: {err}"),
                None,
            )
            .map_err(|e| AudioError::StreamCreate(e.to_string()))?;

        stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn write(&mut self, frames: &[Frame]) -> usize {
        self.producer.push_slice(frames)
    }

    fn clock(&self) -> FrameClock {
        self.clock.clone()
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.running.store(true, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.running.store(false, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream.pause().map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }
}
