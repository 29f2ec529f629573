// tests/verification_tests.rs

mod common;

use std::sync::atomic::Ordering;

use common::{EXAM_ID, Harness, STUDENT_ID};
use exam_client::{
    error::{AppError, NextAction},
    media::{CaptureKind, MediaCaptureController},
    models::{attempt::AttemptKey, verification::UploadStatus},
    verification::{VerificationFlow, VerificationStage},
};

#[tokio::test]
async fn test_retake_uploads_only_the_latest_photo() {
    // Arrange
    let h = Harness::new();
    let mut flow = h.verification_flow();
    flow.grant_consent().await.unwrap();

    // Act
    flow.capture().unwrap(); // frame-1, discarded
    flow.retake().unwrap();
    assert_eq!(flow.stage(), VerificationStage::CapturingIdentity);
    assert!(flow.identity_photo().is_none());
    flow.capture().unwrap(); // frame-2
    flow.confirm().await.unwrap();
    flow.capture().unwrap(); // frame-3
    flow.confirm().await.unwrap();

    // Assert
    let uploads = h.api.verifications.lock().unwrap().clone();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].photo.bytes, b"frame-2".to_vec());
    assert_eq!(uploads[0].id_proof.bytes, b"frame-3".to_vec());
    assert_eq!(uploads[0].photo.mime_type, "image/jpeg");
    assert_eq!(flow.stage(), VerificationStage::Complete);
    assert_eq!(flow.upload_status(), UploadStatus::Succeeded);
    assert!(flow.identity_photo().is_none());
}

#[tokio::test]
async fn test_denied_camera_keeps_awaiting_consent() {
    // Arrange
    let h = Harness::new();
    h.media.deny(CaptureKind::CameraMicrophone);
    let mut flow = h.verification_flow();

    // Act
    let result = flow.grant_consent().await;

    // Assert
    let err = result.unwrap_err();
    assert!(matches!(err, AppError::PermissionDenied(_)));
    assert_eq!(err.next_action(), NextAction::Retry);
    assert_eq!(flow.stage(), VerificationStage::AwaitingConsent);
    assert!(flow.last_error().is_some());

    h.media.allow(CaptureKind::CameraMicrophone);
    flow.grant_consent().await.unwrap();
    assert_eq!(flow.stage(), VerificationStage::CapturingIdentity);
    assert!(flow.preview_live());
}

#[tokio::test]
async fn test_missing_identifiers_fail_before_upload() {
    // Arrange
    let h = Harness::new();
    let mut flow = VerificationFlow::new(
        h.api.clone(),
        MediaCaptureController::new(h.media.clone(), h.config.recorder_timeslice),
        None,
        Some(EXAM_ID),
    );
    flow.grant_consent().await.unwrap();
    flow.capture().unwrap();
    flow.confirm().await.unwrap();
    flow.capture().unwrap();

    // Act
    let result = flow.confirm().await;

    // Assert
    assert!(matches!(result, Err(AppError::ValidationFailure(_))));
    assert!(h.api.verifications.lock().unwrap().is_empty());
    assert_eq!(flow.stage(), VerificationStage::ReviewingIdProof);
    assert_eq!(flow.upload_status(), UploadStatus::Pending);
    assert!(flow.clearance().is_none());
}

#[tokio::test]
async fn test_failed_upload_can_be_confirmed_again() {
    // Arrange
    let h = Harness::new();
    h.api.fail_verification.store(1, Ordering::SeqCst);
    let mut flow = h.verification_flow();
    flow.grant_consent().await.unwrap();
    flow.capture().unwrap();
    flow.confirm().await.unwrap();
    flow.capture().unwrap();

    // Act
    let first = flow.confirm().await;
    let stage_after_failure = flow.stage();
    let status_after_failure = flow.upload_status();
    let second = flow.confirm().await;

    // Assert
    assert!(matches!(first, Err(AppError::NetworkFailure(_))));
    assert_eq!(stage_after_failure, VerificationStage::ReviewingIdProof);
    assert_eq!(status_after_failure, UploadStatus::Failed);
    assert!(second.is_ok());
    assert_eq!(
        flow.clearance().map(|c| c.key()),
        Some(AttemptKey::new(EXAM_ID, STUDENT_ID))
    );
}

#[tokio::test]
async fn test_capture_requires_consent_first() {
    // Arrange
    let h = Harness::new();
    let mut flow = h.verification_flow();

    // Act
    let result = flow.capture();

    // Assert
    assert!(matches!(result, Err(AppError::InvalidState(_))));
    assert!(flow.clearance().is_none());
}

#[tokio::test]
async fn test_completion_releases_the_camera() {
    // Arrange
    let h = Harness::new();
    let mut flow = h.verification_flow();
    flow.grant_consent().await.unwrap();
    flow.share_screen().await.unwrap();
    assert_eq!(h.media.live_track_count(), 3);

    // Act
    flow.capture().unwrap();
    flow.confirm().await.unwrap();
    flow.capture().unwrap();
    flow.confirm().await.unwrap();

    // Assert
    assert_eq!(h.media.live_track_count(), 0);
    assert!(!flow.preview_live());
    let uploads = h.api.verifications.lock().unwrap().clone();
    assert!(uploads[0].flags.screen);
    assert!(uploads[0].flags.camera && uploads[0].flags.microphone);
}

#[tokio::test]
async fn test_dropping_the_flow_releases_the_camera() {
    // Arrange
    let h = Harness::new();
    let mut flow = h.verification_flow();
    flow.grant_consent().await.unwrap();

    // Act
    drop(flow);

    // Assert
    assert_eq!(h.media.live_track_count(), 0);
}

#[tokio::test]
async fn test_screen_flag_reflects_actual_capture() {
    // Arrange
    let h = Harness::new();
    h.media.deny(CaptureKind::Screen);
    let mut flow = h.verification_flow();
    flow.grant_consent().await.unwrap();

    // Act
    let shared = flow.share_screen().await;
    flow.capture().unwrap();
    flow.confirm().await.unwrap();
    flow.capture().unwrap();
    flow.confirm().await.unwrap();

    // Assert
    assert!(matches!(shared, Err(AppError::PermissionDenied(_))));
    let uploads = h.api.verifications.lock().unwrap().clone();
    assert!(!uploads[0].flags.screen);
    assert!(uploads[0].flags.camera);
}
