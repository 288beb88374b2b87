//! `cpal` default input device.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BuildStreamError, PlayStreamError, SampleFormat, Stream};

use super::{AudioInput, DeviceError, InputStream};

#[derive(Debug, Default)]
pub struct MicrophoneInput;

impl MicrophoneInput {
    pub fn new() -> Self {
        Self
    }
}

impl AudioInput for MicrophoneInput {
    fn open(&mut self) -> Result<Box<dyn InputStream>, DeviceError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| DeviceError::Unavailable("no default input device".to_string()))?;

        let supported = device
            .default_input_config()
            .map_err(|e| DeviceError::Unavailable(format!("failed to get input config: {e}")))?;
        let sample_format = supported.sample_format();
        let config = supported.config();

        let buffer: Arc<Mutex<Vec<i16>>> = Arc::new(Mutex::new(Vec::new()));
        let on_error = |err: cpal::StreamError| tracing::error!("Audio input stream error: {}", err);

        let stream = match sample_format {
            SampleFormat::F32 => {
                let sink = Arc::clone(&buffer);
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        if let Ok(mut samples) = sink.lock() {
                            samples.extend(
                                data.iter().map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                            );
                        }
                    },
                    on_error,
                    None,
                )
            }
            SampleFormat::I16 => {
                let sink = Arc::clone(&buffer);
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        if let Ok(mut samples) = sink.lock() {
                            samples.extend_from_slice(data);
                        }
                    },
                    on_error,
                    None,
                )
            }
            SampleFormat::U16 => {
                let sink = Arc::clone(&buffer);
                device.build_input_stream(
                    &config,
                    move |data: &[u16], _: &cpal::InputCallbackInfo| {
                        if let Ok(mut samples) = sink.lock() {
                            samples.extend(data.iter().map(|s| (*s as i32 - 32_768) as i16));
                        }
                    },
                    on_error,
                    None,
                )
            }
            other => {
                return Err(DeviceError::Unavailable(format!("unsupported sample format {other:?}")))
            }
        }
        .map_err(map_build_error)?;

        stream.play().map_err(map_play_error)?;

        Ok(Box::new(MicrophoneStream {
            stream,
            buffer,
            sample_rate: config.sample_rate.0,
            channels: config.channels,
        }))
    }
}

struct MicrophoneStream {
    stream: Stream,
    buffer: Arc<Mutex<Vec<i16>>>,
    sample_rate: u32,
    channels: u16,
}

impl InputStream for MicrophoneStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn set_paused(&mut self, paused: bool) -> Result<(), DeviceError> {
        if paused {
            self.stream
                .pause()
                .map_err(|e| DeviceError::Unavailable(format!("failed to pause input: {e}")))
        } else {
            self.stream.play().map_err(map_play_error)
        }
    }

    fn drain(&mut self) -> Vec<i16> {
        match self.buffer.lock() {
            Ok(mut samples) => std::mem::take(&mut *samples),
            Err(_) => Vec::new(),
        }
    }
}

fn map_build_error(err: BuildStreamError) -> DeviceError {
    match err {
        BuildStreamError::DeviceNotAvailable => {
            DeviceError::Unavailable("input device is not available".to_string())
        }
        // Hosts surface a denied microphone as a backend error mentioning permission.
        BuildStreamError::BackendSpecific { err } if is_permission_error(&err.description) => {
            DeviceError::PermissionDenied
        }
        other => DeviceError::Unavailable(format!("failed to build input stream: {other}")),
    }
}

fn map_play_error(err: PlayStreamError) -> DeviceError {
    match err {
        PlayStreamError::BackendSpecific { err } if is_permission_error(&err.description) => {
            DeviceError::PermissionDenied
        }
        other => DeviceError::Unavailable(format!("failed to start input stream: {other}")),
    }
}

fn is_permission_error(description: &str) -> bool {
    let lowered = description.to_ascii_lowercase();
    lowered.contains("permission") || lowered.contains("denied") || lowered.contains("not authorized")
}
