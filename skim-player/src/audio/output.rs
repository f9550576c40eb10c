//! Audio output using cpal
//!
//! Callback-based device playback pulling from the session's audio buffer.
//! The callback never blocks the engine: a paused session or an empty buffer
//! yields silence, and stream errors are marshalled into the control queue
//! as failures so the decode worker's drain surfaces them.

use crate::audio::types::AudioSpec;
use crate::error::{Error, Result};
use crate::playback::audio_buffer::AudioBuffer;
use crate::playback::worker::ControlQueue;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, trace, warn};

/// Audio output stream bound to one playback session.
///
/// Holds the cpal stream handle; dropping the struct tears the stream down.
pub struct AudioOutput {
    _stream: Stream,
}

impl AudioOutput {
    /// List available audio output device names.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();
        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open the requested device (falling back to the default device when the
    /// name is unknown) and start pulling from `buffer`.
    pub fn start(
        device_name: Option<&str>,
        spec: AudioSpec,
        buffer: Arc<Mutex<AudioBuffer>>,
        playing: Arc<AtomicBool>,
        queue: Arc<ControlQueue>,
    ) -> Result<Self> {
        let device = Self::pick_device(device_name)?;

        let config = StreamConfig {
            channels: spec.channels,
            sample_rate: SampleRate(spec.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let channels = spec.channels as usize;
        let underruns = AtomicU64::new(0);
        let data_callback = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            if !playing.load(Ordering::Acquire) {
                data.fill(0.0);
                return;
            }

            let wanted = data.len() / channels;
            let available = buffer.lock().unwrap().read(wanted);
            data[..available.len()].copy_from_slice(&available);
            if available.len() < data.len() {
                // Underrun: pad with silence; the decode worker will catch up.
                data[available.len()..].fill(0.0);
                let count = underruns.fetch_add(1, Ordering::Relaxed) + 1;
                if count % 1000 == 0 {
                    trace!("audio output underrun (total: {})", count);
                }
            }
        };

        let error_queue = Arc::clone(&queue);
        let error_callback = move |err: cpal::StreamError| {
            // Marshal the failure onto the worker thread via the queue.
            error_queue.add_failure(Error::AudioOutput(format!("stream error: {}", err)));
        };

        let stream = device
            .build_output_stream(&config, data_callback, error_callback, None)
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))?;
        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

        info!(
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            "audio output started"
        );
        Ok(Self { _stream: stream })
    }

    fn pick_device(device_name: Option<&str>) -> Result<Device> {
        let host = cpal::default_host();

        if let Some(name) = device_name {
            let mut devices = host
                .output_devices()
                .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;
            if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
                info!("Using requested audio device: {}", name);
                return Ok(device);
            }
            warn!(
                "Requested device '{}' not found, falling back to default device",
                name
            );
        }

        let device = host.default_output_device().ok_or_else(|| {
            Error::AudioOutput("No default output device available".to_string())
        })?;
        if let Ok(name) = device.name() {
            info!("Using default audio device: {}", name);
        }
        Ok(device)
    }
}
