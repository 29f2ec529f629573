// src/media/mod.rs

//! Camera, microphone and screen capture.
//!
//! The platform capabilities sit behind [`MediaBackend`]; [`MediaCaptureController`]
//! owns what was acquired and releases it on every exit path.

pub mod controller;
pub mod null;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{error::AppError, models::verification::StillImage};

pub use controller::MediaCaptureController;
pub use null::NullMedia;

/// What to ask the platform for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureKind {
    /// Camera video plus microphone audio, acquired together.
    CameraMicrophone,
    /// Full-screen display capture.
    Screen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Track {
    pub id: String,
    pub kind: TrackKind,
    pub source: CaptureKind,
}

/// An open device stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStream {
    pub kind: CaptureKind,
    pub tracks: Vec<Track>,
}

impl MediaStream {
    pub fn video_track(&self) -> Option<&Track> {
        self.tracks.iter().find(|t| t.kind == TrackKind::Video)
    }

    pub fn audio_track(&self) -> Option<&Track> {
        self.tracks.iter().find(|t| t.kind == TrackKind::Audio)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecorderId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
    Stopped,
}

/// Where a recorder delivers its periodic chunks.
pub type ChunkSink = mpsc::UnboundedSender<Vec<u8>>;

/// Platform media capabilities.
///
/// Acquisition is asynchronous (it may prompt the candidate); release is
/// synchronous so it can run from `Drop` and from teardown paths.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    async fn acquire(&self, kind: CaptureKind) -> Result<MediaStream, AppError>;

    fn stop_track(&self, track: &Track);

    /// Starts a recorder over `tracks` that emits a chunk every `timeslice` into `sink`.
    /// A final chunk may still arrive shortly after `stop_recorder`.
    fn start_recorder(
        &self,
        tracks: &[Track],
        timeslice: Duration,
        sink: ChunkSink,
    ) -> Result<RecorderId, AppError>;

    fn stop_recorder(&self, recorder: RecorderId);

    /// Draws the current frame of a live video track into a still image.
    fn grab_frame(&self, track: &Track) -> Result<StillImage, AppError>;
}
