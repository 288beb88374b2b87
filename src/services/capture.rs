//! Capture Component: a bounded microphone recording driven by explicit transitions.
//!
//! `idle -> recording <-> paused -> captured`, and `idle | recording | paused -> idle`
//! on cancel. The caller drives the duration clock with [`Recorder::tick`] once per
//! second; reaching the configured maximum stops the capture and reports
//! [`CaptureSignal::DurationExceeded`].

#[cfg(feature = "microphone")]
pub mod microphone;

use thiserror::Error;

use super::wav;
use crate::core::time::{format_clock, now_utc};
use crate::errors::HomeworkError;
use crate::models::Recording;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("microphone access was denied")]
    PermissionDenied,
    #[error("{0}")]
    Unavailable(String),
}

impl From<DeviceError> for HomeworkError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::PermissionDenied => Self::PermissionDenied,
            DeviceError::Unavailable(reason) => Self::DeviceUnavailable(reason),
        }
    }
}

/// An open input stream. Dropping it releases the device.
pub trait InputStream {
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> u16;
    fn set_paused(&mut self, paused: bool) -> Result<(), DeviceError>;
    /// Interleaved samples buffered since the previous drain.
    fn drain(&mut self) -> Vec<i16>;
}

pub trait AudioInput {
    fn open(&mut self) -> Result<Box<dyn InputStream>, DeviceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Recording,
    Paused,
    Captured,
}

impl CaptureState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Paused => "paused",
            Self::Captured => "captured",
        }
    }
}

/// Soft signal, not an error: the clamp stopped the capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSignal {
    DurationExceeded,
}

pub struct Recorder {
    input: Box<dyn AudioInput>,
    max_seconds: u32,
    state: CaptureState,
    stream: Option<Box<dyn InputStream>>,
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
    elapsed_seconds: u32,
    recording: Option<Recording>,
}

impl Recorder {
    pub fn new(input: Box<dyn AudioInput>, max_seconds: u32) -> Self {
        Self {
            input,
            max_seconds: max_seconds.max(1),
            state: CaptureState::Idle,
            stream: None,
            samples: Vec::new(),
            sample_rate: 0,
            channels: 0,
            elapsed_seconds: 0,
            recording: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn elapsed_seconds(&self) -> u32 {
        self.elapsed_seconds
    }

    pub fn max_seconds(&self) -> u32 {
        self.max_seconds
    }

    /// `m:ss` label for the running timer.
    pub fn clock_label(&self) -> String {
        format_clock(self.elapsed_seconds)
    }

    pub fn is_holding_device(&self) -> bool {
        self.stream.is_some()
    }

    pub fn recording(&self) -> Option<&Recording> {
        self.recording.as_ref()
    }

    pub fn start_capture(&mut self) -> Result<(), HomeworkError> {
        if self.state != CaptureState::Idle {
            return Err(HomeworkError::invalid_state("start capture", self.busy_reason()));
        }

        // Never hold two streams at once.
        self.release();

        let stream = self.input.open().map_err(|err| {
            tracing::warn!(error = %err, "Microphone could not be opened");
            HomeworkError::from(err)
        })?;

        let (sample_rate, channels) = (stream.sample_rate(), stream.channels());
        if sample_rate == 0 || channels == 0 {
            drop(stream);
            tracing::warn!(sample_rate, channels, "Microphone reported an unusable format");
            return Err(HomeworkError::DeviceUnavailable(format!(
                "unusable input format: {sample_rate} Hz, {channels} channel(s)"
            )));
        }

        self.sample_rate = sample_rate;
        self.channels = channels;
        self.stream = Some(stream);
        self.samples.clear();
        self.elapsed_seconds = 0;
        self.state = CaptureState::Recording;

        tracing::info!(
            sample_rate = self.sample_rate,
            channels = self.channels,
            max_seconds = self.max_seconds,
            "Capture started"
        );
        Ok(())
    }

    pub fn pause_capture(&mut self) -> Result<(), HomeworkError> {
        if self.state != CaptureState::Recording {
            return Err(HomeworkError::invalid_state("pause capture", self.not_recording_reason()));
        }
        self.collect();
        if let Some(stream) = self.stream.as_mut() {
            if let Err(err) = stream.set_paused(true) {
                return Err(self.fail(err));
            }
        }
        self.state = CaptureState::Paused;
        tracing::debug!(elapsed_seconds = self.elapsed_seconds, "Capture paused");
        Ok(())
    }

    pub fn resume_capture(&mut self) -> Result<(), HomeworkError> {
        if self.state != CaptureState::Paused {
            return Err(HomeworkError::invalid_state("resume capture", "capture is not paused"));
        }
        if let Some(stream) = self.stream.as_mut() {
            if let Err(err) = stream.set_paused(false) {
                return Err(self.fail(err));
            }
        }
        self.state = CaptureState::Recording;
        tracing::debug!(elapsed_seconds = self.elapsed_seconds, "Capture resumed");
        Ok(())
    }

    /// One second of wall clock. Counts only while recording.
    ///
    /// Reaching the maximum finalizes the recording. If that fails, the error is
    /// returned and the recorder is back to idle.
    pub fn tick(&mut self) -> Result<Option<CaptureSignal>, HomeworkError> {
        if self.state != CaptureState::Recording {
            return Ok(None);
        }

        self.collect();
        self.elapsed_seconds = self.elapsed_seconds.saturating_add(1);
        if self.elapsed_seconds < self.max_seconds {
            return Ok(None);
        }

        tracing::info!(max_seconds = self.max_seconds, "Recording reached its maximum duration");
        if let Err(err) = self.finish("clamped") {
            tracing::error!(error = %err, "Failed to finalize clamped recording");
            return Err(err);
        }
        Ok(Some(CaptureSignal::DurationExceeded))
    }

    pub fn stop_capture(&mut self) -> Result<&Recording, HomeworkError> {
        if !matches!(self.state, CaptureState::Recording | CaptureState::Paused) {
            return Err(HomeworkError::invalid_state("stop capture", self.not_recording_reason()));
        }
        self.finish("stopped")?;
        self.recording
            .as_ref()
            .ok_or_else(|| HomeworkError::invalid_state("stop capture", "nothing was captured"))
    }

    /// Discards whatever is being recorded and returns to idle.
    pub fn cancel(&mut self) -> Result<(), HomeworkError> {
        if self.state == CaptureState::Captured {
            return Err(HomeworkError::invalid_state(
                "cancel capture",
                "a recording is waiting to be submitted",
            ));
        }
        if self.state != CaptureState::Idle {
            metrics::counter!("homework_recordings_total", "ended" => "cancelled").increment(1);
            tracing::info!(elapsed_seconds = self.elapsed_seconds, "Capture cancelled");
        }
        self.reset();
        Ok(())
    }

    /// Hands the captured recording over. The recorder is idle again afterwards.
    pub fn take_recording(&mut self) -> Result<Recording, HomeworkError> {
        if self.state != CaptureState::Captured {
            return Err(HomeworkError::invalid_state(
                "take the recording",
                "nothing has been captured",
            ));
        }
        let recording = self
            .recording
            .take()
            .ok_or_else(|| HomeworkError::invalid_state("take the recording", "nothing has been captured"))?;
        self.reset();
        Ok(recording)
    }

    /// Back to idle from any state, dropping buffered audio and the device.
    pub fn reset(&mut self) {
        self.release();
        self.samples.clear();
        self.elapsed_seconds = 0;
        self.recording = None;
        self.state = CaptureState::Idle;
    }

    fn finish(&mut self, ended: &'static str) -> Result<(), HomeworkError> {
        self.collect();
        self.release();

        let samples = std::mem::take(&mut self.samples);
        let payload = match wav::encode_pcm16(&samples, self.sample_rate, self.channels) {
            Ok(payload) => payload,
            Err(err) => {
                self.reset();
                return Err(HomeworkError::InvalidRecording(format!("{err:#}")));
            }
        };

        let duration_seconds = self.elapsed_seconds.min(self.max_seconds);
        let recording = Recording::finalize(payload, wav::WAV_MIME, duration_seconds, now_utc());

        tracing::info!(
            recording_id = %recording.id(),
            duration_seconds,
            audio_seconds = wav::duration_seconds(samples.len(), self.sample_rate, self.channels),
            size_bytes = recording.size_bytes(),
            "Capture finished"
        );
        metrics::counter!("homework_recordings_total", "ended" => ended).increment(1);

        self.recording = Some(recording);
        self.state = CaptureState::Captured;
        Ok(())
    }

    fn collect(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            self.samples.extend(stream.drain());
        }
    }

    fn release(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("Input device released");
        }
    }

    fn fail(&mut self, err: DeviceError) -> HomeworkError {
        tracing::warn!(error = %err, "Input device failed mid-capture");
        self.reset();
        err.into()
    }

    fn busy_reason(&self) -> &'static str {
        match self.state {
            CaptureState::Captured => "a recording is waiting to be submitted",
            _ => "a capture is already running",
        }
    }

    fn not_recording_reason(&self) -> &'static str {
        match self.state {
            CaptureState::Idle => "nothing is being recorded",
            CaptureState::Paused => "capture is paused",
            CaptureState::Captured => "the recording is already finished",
            CaptureState::Recording => "capture is running",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeInput;

    #[test]
    fn permission_denied_leaves_recorder_idle() {
        let input = FakeInput::denied();
        let mut recorder = Recorder::new(Box::new(input.clone()), 60);

        let err = recorder.start_capture().expect_err("denied");

        assert!(matches!(err, HomeworkError::PermissionDenied));
        assert_eq!(recorder.state(), CaptureState::Idle);
        assert!(recorder.recording().is_none());
        assert!(!input.is_open());
    }

    #[test]
    fn missing_device_reports_unavailable() {
        let mut recorder = Recorder::new(Box::new(FakeInput::missing()), 60);
        assert!(matches!(recorder.start_capture(), Err(HomeworkError::DeviceUnavailable(_))));
        assert_eq!(recorder.state(), CaptureState::Idle);
    }

    #[test]
    fn stop_yields_recording_of_elapsed_duration_and_releases_device() {
        let input = FakeInput::new(8_000, 1);
        let mut recorder = Recorder::new(Box::new(input.clone()), 60);

        recorder.start_capture().expect("start");
        assert!(input.is_open());
        for _ in 0..5 {
            assert_eq!(recorder.tick().expect("tick"), None);
        }
        assert_eq!(recorder.clock_label(), "0:05");

        let recording = recorder.stop_capture().expect("stop");
        assert_eq!(recording.duration_seconds(), 5);
        assert_eq!(recording.mime_type(), "audio/wav");
        assert!(recording.size_bytes() > 44);

        assert_eq!(recorder.state(), CaptureState::Captured);
        assert!(!input.is_open());
    }

    #[test]
    fn paused_time_is_not_counted() {
        let input = FakeInput::new(8_000, 1);
        let mut recorder = Recorder::new(Box::new(input.clone()), 60);

        recorder.start_capture().expect("start");
        recorder.tick().expect("tick");
        recorder.pause_capture().expect("pause");
        assert!(input.is_paused());
        recorder.tick().expect("tick");
        recorder.tick().expect("tick");
        recorder.resume_capture().expect("resume");
        recorder.tick().expect("tick");

        assert_eq!(recorder.stop_capture().expect("stop").duration_seconds(), 2);
    }

    #[test]
    fn clamp_stops_at_maximum_without_error() {
        let input = FakeInput::new(8_000, 1);
        let mut recorder = Recorder::new(Box::new(input.clone()), 3);

        recorder.start_capture().expect("start");
        assert_eq!(recorder.tick().expect("tick"), None);
        assert_eq!(recorder.tick().expect("tick"), None);
        assert_eq!(recorder.tick().expect("tick"), Some(CaptureSignal::DurationExceeded));

        assert_eq!(recorder.state(), CaptureState::Captured);
        assert_eq!(recorder.recording().map(Recording::duration_seconds), Some(3));
        assert!(!input.is_open());
        assert_eq!(recorder.tick().expect("tick"), None);
    }

    #[test]
    fn unusable_stream_format_is_refused() {
        for (rate, channels) in [(8_000, 0), (0, 1)] {
            let input = FakeInput::new(rate, channels);
            let mut recorder = Recorder::new(Box::new(input.clone()), 2);

            let err = recorder.start_capture().expect_err("unusable format");

            assert!(matches!(err, HomeworkError::DeviceUnavailable(_)));
            assert_eq!(recorder.state(), CaptureState::Idle);
            assert!(!input.is_open());
            assert_eq!(recorder.tick().expect("idle tick"), None);
        }
    }

    #[test]
    fn clamp_failure_reaches_the_caller() {
        let input = FakeInput::new(8_000, 3).torn_frames();
        let mut recorder = Recorder::new(Box::new(input.clone()), 1);
        recorder.start_capture().expect("start");

        let err = recorder.tick().expect_err("partial frame");

        assert!(matches!(err, HomeworkError::InvalidRecording(_)));
        assert_eq!(recorder.state(), CaptureState::Idle);
        assert!(recorder.recording().is_none());
        assert!(!input.is_open());
    }

    #[test]
    fn illegal_transitions_are_refused() {
        let mut recorder = Recorder::new(Box::new(FakeInput::new(8_000, 1)), 60);

        assert!(matches!(recorder.stop_capture(), Err(HomeworkError::InvalidState { .. })));
        assert!(matches!(recorder.pause_capture(), Err(HomeworkError::InvalidState { .. })));
        assert!(matches!(recorder.resume_capture(), Err(HomeworkError::InvalidState { .. })));

        recorder.start_capture().expect("start");
        assert!(matches!(recorder.resume_capture(), Err(HomeworkError::InvalidState { .. })));
        assert!(matches!(recorder.start_capture(), Err(HomeworkError::InvalidState { .. })));

        recorder.stop_capture().expect("stop");
        assert!(matches!(recorder.start_capture(), Err(HomeworkError::InvalidState { .. })));
        assert!(matches!(recorder.cancel(), Err(HomeworkError::InvalidState { .. })));
    }

    #[test]
    fn cancel_discards_and_releases() {
        let input = FakeInput::new(8_000, 1);
        let mut recorder = Recorder::new(Box::new(input.clone()), 60);

        recorder.start_capture().expect("start");
        recorder.tick().expect("tick");
        recorder.pause_capture().expect("pause");
        recorder.cancel().expect("cancel");

        assert_eq!(recorder.state(), CaptureState::Idle);
        assert_eq!(recorder.elapsed_seconds(), 0);
        assert!(recorder.recording().is_none());
        assert!(!input.is_open());
    }

    #[test]
    fn captured_recording_is_consumed_once() {
        let mut recorder = Recorder::new(Box::new(FakeInput::new(8_000, 1)), 60);
        recorder.start_capture().expect("start");
        recorder.tick().expect("tick");
        recorder.stop_capture().expect("stop");

        let recording = recorder.take_recording().expect("take");
        assert_eq!(recording.duration_seconds(), 1);
        assert_eq!(recorder.state(), CaptureState::Idle);
        assert!(matches!(recorder.take_recording(), Err(HomeworkError::InvalidState { .. })));
    }

    #[test]
    fn dropping_recorder_releases_device() {
        let input = FakeInput::new(8_000, 1);
        let mut recorder = Recorder::new(Box::new(input.clone()), 60);
        recorder.start_capture().expect("start");
        assert!(input.is_open());

        drop(recorder);

        assert!(!input.is_open());
    }

    #[test]
    fn device_failure_on_pause_releases_stream() {
        let input = FakeInput::new(8_000, 1).failing_pause();
        let mut recorder = Recorder::new(Box::new(input.clone()), 60);
        recorder.start_capture().expect("start");

        assert!(matches!(recorder.pause_capture(), Err(HomeworkError::DeviceUnavailable(_))));
        assert_eq!(recorder.state(), CaptureState::Idle);
        assert!(!input.is_open());
    }
}
