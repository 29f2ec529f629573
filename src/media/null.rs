// src/media/null.rs

//! Nullable media backend: deterministic, in-memory, controllable from tests
//! and usable for headless runs where no devices exist.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::{
    error::AppError,
    media::{CaptureKind, ChunkSink, MediaBackend, MediaStream, RecorderId, Track, TrackKind},
    models::verification::StillImage,
};

#[derive(Default)]
struct State {
    denied: HashSet<CaptureKind>,
    unavailable: HashSet<CaptureKind>,
    live_tracks: HashSet<String>,
    recorders: HashMap<u64, ChunkSink>,
    final_chunk: Option<Vec<u8>>,
    next_id: u64,
    frames_taken: u32,
    acquisitions: u32,
    acquire_delay: Duration,
}

/// Media backend that never touches a device.
///
/// Frames are numbered, so every `grab_frame` returns distinct bytes.
#[derive(Default)]
pub struct NullMedia {
    state: Mutex<State>,
}

impl NullMedia {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut state)
    }

    /// The next `acquire(kind)` is refused as if the candidate said no.
    pub fn deny(&self, kind: CaptureKind) {
        self.with(|s| s.denied.insert(kind));
    }

    pub fn make_unavailable(&self, kind: CaptureKind) {
        self.with(|s| s.unavailable.insert(kind));
    }

    /// Undo `deny`/`make_unavailable`.
    pub fn allow(&self, kind: CaptureKind) {
        self.with(|s| {
            s.denied.remove(&kind);
            s.unavailable.remove(&kind);
        });
    }

    /// Every later `acquire` waits this long before the platform answers.
    pub fn set_acquire_delay(&self, delay: Duration) {
        self.with(|s| s.acquire_delay = delay);
    }

    /// Chunk delivered to the recorder sink when it is stopped.
    pub fn set_final_chunk(&self, chunk: Vec<u8>) {
        self.with(|s| s.final_chunk = Some(chunk));
    }

    /// Delivers a chunk to every running recorder.
    pub fn emit_chunk(&self, chunk: Vec<u8>) {
        self.with(|s| {
            for sink in s.recorders.values() {
                let _ = sink.send(chunk.clone());
            }
        });
    }

    pub fn live_track_count(&self) -> usize {
        self.with(|s| s.live_tracks.len())
    }

    pub fn running_recorders(&self) -> usize {
        self.with(|s| s.recorders.len())
    }

    pub fn acquisitions(&self) -> u32 {
        self.with(|s| s.acquisitions)
    }

    fn track(state: &mut State, kind: TrackKind, source: CaptureKind) -> Track {
        state.next_id += 1;
        let track = Track {
            id: format!("{:?}-{:?}-{}", source, kind, state.next_id).to_lowercase(),
            kind,
            source,
        };
        state.live_tracks.insert(track.id.clone());
        track
    }
}

#[async_trait]
impl MediaBackend for NullMedia {
    async fn acquire(&self, kind: CaptureKind) -> Result<MediaStream, AppError> {
        let delay = self.with(|s| s.acquire_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.with(|s| {
            if s.denied.contains(&kind) {
                return Err(AppError::PermissionDenied(match kind {
                    CaptureKind::CameraMicrophone => {
                        "Camera and microphone access is required to proceed with the exam."
                            .to_string()
                    }
                    CaptureKind::Screen => {
                        "Screen sharing is required for exam proctoring.".to_string()
                    }
                }));
            }
            if s.unavailable.contains(&kind) {
                return Err(AppError::DeviceUnavailable(format!("{kind:?} device not found")));
            }

            s.acquisitions += 1;
            let tracks = match kind {
                CaptureKind::CameraMicrophone => vec![
                    Self::track(s, TrackKind::Video, kind),
                    Self::track(s, TrackKind::Audio, kind),
                ],
                CaptureKind::Screen => vec![Self::track(s, TrackKind::Video, kind)],
            };
            Ok(MediaStream { kind, tracks })
        })
    }

    fn stop_track(&self, track: &Track) {
        self.with(|s| s.live_tracks.remove(&track.id));
    }

    fn start_recorder(
        &self,
        tracks: &[Track],
        _timeslice: Duration,
        sink: ChunkSink,
    ) -> Result<RecorderId, AppError> {
        self.with(|s| {
            if let Some(dead) = tracks.iter().find(|t| !s.live_tracks.contains(&t.id)) {
                return Err(AppError::DeviceUnavailable(format!(
                    "track {} has ended",
                    dead.id
                )));
            }
            s.next_id += 1;
            s.recorders.insert(s.next_id, sink);
            Ok(RecorderId(s.next_id))
        })
    }

    fn stop_recorder(&self, recorder: RecorderId) {
        self.with(|s| {
            if let Some(sink) = s.recorders.remove(&recorder.0) {
                if let Some(chunk) = s.final_chunk.clone() {
                    let _ = sink.send(chunk);
                }
            }
        });
    }

    fn grab_frame(&self, track: &Track) -> Result<StillImage, AppError> {
        self.with(|s| {
            if track.kind != TrackKind::Video || !s.live_tracks.contains(&track.id) {
                return Err(AppError::DeviceUnavailable("no live video frame".to_string()));
            }
            s.frames_taken += 1;
            Ok(StillImage::jpeg(
                format!("frame-{}", s.frames_taken).into_bytes(),
                640,
                480,
            ))
        })
    }
}
