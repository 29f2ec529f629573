// src/media/controller.rs

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::{
    error::AppError,
    media::{CaptureKind, MediaBackend, MediaStream, RecorderId, RecorderState, Track},
    models::{submission::EvidenceBlob, verification::StillImage},
};

/// Owns every stream and recorder opened for one media session.
///
/// * `acquire` opens camera+microphone or the screen; re-acquiring a kind releases the old stream first.
/// * `start_recording` records the screen video together with the microphone audio.
/// * `stop` stops the recorder and every track. It is idempotent and also runs on `Drop`,
///   so dropping the controller on any exit path releases the devices.
///
/// Chunks are buffered in memory until `take_evidence`; nothing caps the buffer size.
pub struct MediaCaptureController {
    backend: Arc<dyn MediaBackend>,
    timeslice: Duration,
    inner: Mutex<Inner>,
}

struct Inner {
    streams: Vec<MediaStream>,
    recorder: Option<RecorderId>,
    state: RecorderState,
    receiver: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
    chunks: Vec<Vec<u8>>,
    /// Bumped by every `stop`; an acquisition that straddles a stop is discarded.
    generation: u64,
}

impl Inner {
    fn drain(&mut self) {
        if let Some(receiver) = self.receiver.as_mut() {
            while let Ok(chunk) = receiver.try_recv() {
                if !chunk.is_empty() {
                    self.chunks.push(chunk);
                }
            }
        }
    }
}

impl MediaCaptureController {
    pub fn new(backend: Arc<dyn MediaBackend>, timeslice: Duration) -> Self {
        Self {
            backend,
            timeslice,
            inner: Mutex::new(Inner {
                streams: Vec::new(),
                recorder: None,
                state: RecorderState::Idle,
                receiver: None,
                chunks: Vec::new(),
                generation: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Requests a device stream. Failures are surfaced, never retried here.
    ///
    /// If `stop` runs while the request is pending, the granted stream is
    /// released at once and `InvalidState` is returned.
    pub async fn acquire(&self, kind: CaptureKind) -> Result<MediaStream, AppError> {
        self.release_stream(kind);
        let generation = self.lock().generation;

        let stream = self.backend.acquire(kind).await.map_err(|e| {
            tracing::warn!("Failed to acquire {:?}: {}", kind, e);
            e
        })?;

        let mut inner = self.lock();
        if inner.generation != generation {
            drop(inner);
            for track in &stream.tracks {
                self.backend.stop_track(track);
            }
            tracing::warn!("Capture stopped while acquiring {:?}, releasing it", kind);
            return Err(AppError::InvalidState(
                "capture was stopped while the device was being opened".into(),
            ));
        }

        tracing::info!("Acquired {:?} with {} track(s)", kind, stream.tracks.len());
        inner.streams.push(stream.clone());
        Ok(stream)
    }

    pub fn stream(&self, kind: CaptureKind) -> Option<MediaStream> {
        self.lock().streams.iter().find(|s| s.kind == kind).cloned()
    }

    pub fn is_open(&self) -> bool {
        !self.lock().streams.is_empty()
    }

    pub fn recorder_state(&self) -> RecorderState {
        self.lock().state
    }

    /// Tracks that make up the evidence: screen video plus microphone audio.
    pub fn evidence_tracks(&self) -> Result<Vec<Track>, AppError> {
        let inner = self.lock();
        let screen = inner
            .streams
            .iter()
            .find(|s| s.kind == CaptureKind::Screen)
            .and_then(MediaStream::video_track)
            .ok_or_else(|| AppError::DeviceUnavailable("screen capture is not active".into()))?;
        let microphone = inner
            .streams
            .iter()
            .find(|s| s.kind == CaptureKind::CameraMicrophone)
            .and_then(MediaStream::audio_track)
            .ok_or_else(|| AppError::DeviceUnavailable("microphone is not active".into()))?;

        Ok(vec![screen.clone(), microphone.clone()])
    }

    pub fn start_recording(&self, tracks: &[Track]) -> Result<(), AppError> {
        let mut inner = self.lock();
        if inner.state == RecorderState::Recording {
            return Err(AppError::InvalidState("recorder is already running".into()));
        }

        let (sink, receiver) = mpsc::unbounded_channel();
        let recorder = self.backend.start_recorder(tracks, self.timeslice, sink)?;

        inner.chunks.clear();
        inner.receiver = Some(receiver);
        inner.recorder = Some(recorder);
        inner.state = RecorderState::Recording;
        tracing::info!("Recording started over {} track(s)", tracks.len());
        Ok(())
    }

    /// Moves delivered chunks into the buffer. Returns the buffered chunk count.
    pub fn collect(&self) -> usize {
        let mut inner = self.lock();
        inner.drain();
        inner.chunks.len()
    }

    pub fn buffered_bytes(&self) -> usize {
        let mut inner = self.lock();
        inner.drain();
        inner.chunks.iter().map(Vec::len).sum()
    }

    /// Draws the live camera frame into a still image.
    pub fn grab_frame(&self) -> Result<StillImage, AppError> {
        let track = self
            .stream(CaptureKind::CameraMicrophone)
            .and_then(|s| s.video_track().cloned())
            .ok_or_else(|| AppError::DeviceUnavailable("camera is not active".into()))?;
        self.backend.grab_frame(&track)
    }

    /// Stops the recorder and every open track.
    pub fn stop(&self) {
        let mut inner = self.lock();
        inner.generation += 1;

        if let Some(recorder) = inner.recorder.take() {
            self.backend.stop_recorder(recorder);
            inner.state = RecorderState::Stopped;
            tracing::info!("Recorder stopped");
        }

        for stream in inner.streams.drain(..) {
            for track in &stream.tracks {
                self.backend.stop_track(track);
            }
        }
    }

    /// Concatenates every buffered chunk into one blob and empties the buffer.
    /// Call after `stop` plus the settle interval to include the final chunk.
    pub fn take_evidence(&self) -> EvidenceBlob {
        let mut inner = self.lock();
        inner.drain();
        inner.receiver = None;

        let chunks = std::mem::take(&mut inner.chunks);
        EvidenceBlob {
            chunk_count: chunks.len(),
            bytes: chunks.concat(),
        }
    }

    fn release_stream(&self, kind: CaptureKind) {
        let mut inner = self.lock();
        if let Some(pos) = inner.streams.iter().position(|s| s.kind == kind) {
            let stream = inner.streams.remove(pos);
            for track in &stream.tracks {
                self.backend.stop_track(track);
            }
        }
    }
}

impl Drop for MediaCaptureController {
    fn drop(&mut self) {
        self.stop();
    }
}
