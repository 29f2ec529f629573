// src/verification.rs

use std::sync::Arc;

use validator::Validate;

use crate::{
    api::ExamApi,
    error::AppError,
    media::{CaptureKind, MediaCaptureController},
    models::{
        attempt::AttemptKey,
        verification::{CaptureFlags, CapturedPhoto, UploadStatus, VerificationUpload},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStage {
    AwaitingConsent,
    CapturingIdentity,
    ReviewingIdentity,
    CapturingIdProof,
    ReviewingIdProof,
    Uploading,
    Complete,
}

/// Proof that identity verification was uploaded for an attempt.
/// Only [`VerificationFlow`] can create one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExamClearance {
    key: AttemptKey,
}

impl ExamClearance {
    pub fn key(&self) -> AttemptKey {
        self.key
    }
}

/// Identity photo, then ID-proof photo, each with review and retake, then one upload.
///
/// The flow owns the camera stream it opens and releases it on completion or drop.
pub struct VerificationFlow {
    api: Arc<dyn ExamApi>,
    media: MediaCaptureController,
    student_id: Option<i64>,
    exam_id: Option<i64>,
    stage: VerificationStage,
    identity: Option<CapturedPhoto>,
    id_proof: Option<CapturedPhoto>,
    upload_status: UploadStatus,
    last_error: Option<String>,
}

impl VerificationFlow {
    pub fn new(
        api: Arc<dyn ExamApi>,
        media: MediaCaptureController,
        student_id: Option<i64>,
        exam_id: Option<i64>,
    ) -> Self {
        Self {
            api,
            media,
            student_id,
            exam_id,
            stage: VerificationStage::AwaitingConsent,
            identity: None,
            id_proof: None,
            upload_status: UploadStatus::Pending,
            last_error: None,
        }
    }

    pub fn stage(&self) -> VerificationStage {
        self.stage
    }

    pub fn upload_status(&self) -> UploadStatus {
        self.upload_status
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn identity_photo(&self) -> Option<&CapturedPhoto> {
        self.identity.as_ref()
    }

    pub fn id_proof_photo(&self) -> Option<&CapturedPhoto> {
        self.id_proof.as_ref()
    }

    /// True while the live camera preview should be shown.
    pub fn preview_live(&self) -> bool {
        matches!(
            self.stage,
            VerificationStage::CapturingIdentity | VerificationStage::CapturingIdProof
        ) && self.media.stream(CaptureKind::CameraMicrophone).is_some()
    }

    /// Opens screen capture so the upload can report it. Optional before upload;
    /// a refusal is recorded and leaves the stage unchanged.
    pub async fn share_screen(&mut self) -> Result<(), AppError> {
        self.expect_stage(
            &[
                VerificationStage::CapturingIdentity,
                VerificationStage::ReviewingIdentity,
                VerificationStage::CapturingIdProof,
                VerificationStage::ReviewingIdProof,
            ],
            "share the screen",
        )?;

        match self.media.acquire(CaptureKind::Screen).await {
            Ok(_) => {
                tracing::info!("Screen sharing enabled for verification");
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// True when a screen stream is actually open.
    pub fn screen_shared(&self) -> bool {
        self.media.stream(CaptureKind::Screen).is_some()
    }

    fn fail(&mut self, err: AppError) -> AppError {
        self.last_error = Some(err.user_message());
        err
    }

    fn expect_stage(&self, allowed: &[VerificationStage], action: &str) -> Result<(), AppError> {
        if allowed.contains(&self.stage) {
            Ok(())
        } else {
            Err(AppError::InvalidState(format!(
                "cannot {action} while {:?}",
                self.stage
            )))
        }
    }

    /// Requests camera and microphone. Denial keeps the flow in `AwaitingConsent`.
    pub async fn grant_consent(&mut self) -> Result<(), AppError> {
        self.expect_stage(&[VerificationStage::AwaitingConsent], "request devices")?;

        match self.media.acquire(CaptureKind::CameraMicrophone).await {
            Ok(_) => {
                self.last_error = None;
                self.stage = VerificationStage::CapturingIdentity;
                tracing::info!("Camera and microphone granted, capturing identity photo");
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Draws the current preview frame into the still for the active stage.
    pub fn capture(&mut self) -> Result<(), AppError> {
        self.expect_stage(
            &[
                VerificationStage::CapturingIdentity,
                VerificationStage::CapturingIdProof,
            ],
            "capture",
        )?;

        let image = self.media.grab_frame().map_err(|e| self.fail(e))?;
        let photo = Some(CapturedPhoto {
            image,
            confirmed: false,
        });

        if self.stage == VerificationStage::CapturingIdentity {
            self.identity = photo;
            self.stage = VerificationStage::ReviewingIdentity;
        } else {
            self.id_proof = photo;
            self.stage = VerificationStage::ReviewingIdProof;
        }
        Ok(())
    }

    /// Discards the still under review and goes back to the live preview.
    pub fn retake(&mut self) -> Result<(), AppError> {
        self.expect_stage(
            &[
                VerificationStage::ReviewingIdentity,
                VerificationStage::ReviewingIdProof,
            ],
            "retake",
        )?;

        if self.stage == VerificationStage::ReviewingIdentity {
            self.identity = None;
            self.stage = VerificationStage::CapturingIdentity;
        } else {
            self.id_proof = None;
            self.upload_status = UploadStatus::Pending;
            self.stage = VerificationStage::CapturingIdProof;
        }
        self.last_error = None;
        Ok(())
    }

    /// Confirms the still under review.
    ///
    /// Confirming the ID proof uploads both photos. On failure the flow stays in
    /// `ReviewingIdProof` so the candidate can confirm again or retake.
    pub async fn confirm(&mut self) -> Result<(), AppError> {
        self.expect_stage(
            &[
                VerificationStage::ReviewingIdentity,
                VerificationStage::ReviewingIdProof,
            ],
            "confirm",
        )?;

        if self.stage == VerificationStage::ReviewingIdentity {
            if let Some(photo) = self.identity.as_mut() {
                photo.confirmed = true;
            }
            self.stage = VerificationStage::CapturingIdProof;
            return Ok(());
        }

        self.upload().await
    }

    async fn upload(&mut self) -> Result<(), AppError> {
        let photos = match (&self.identity, &self.id_proof) {
            (Some(identity), Some(id_proof)) => Some((identity.image.clone(), id_proof.image.clone())),
            _ => None,
        };
        let Some((photo, id_proof)) = photos else {
            let err = AppError::ValidationFailure(
                "Please capture both verification and ID proof photos.".to_string(),
            );
            return Err(self.fail(err));
        };

        let upload = VerificationUpload {
            student_id: self.student_id,
            exam_id: self.exam_id,
            photo,
            id_proof,
            flags: CaptureFlags {
                camera: true,
                microphone: true,
                screen: self.screen_shared(),
            },
        };
        if let Err(errors) = upload.validate() {
            tracing::error!("Invalid user or exam credentials: {}", errors);
            return Err(self.fail(errors.into()));
        }

        if let Some(photo) = self.id_proof.as_mut() {
            photo.confirmed = true;
        }
        self.stage = VerificationStage::Uploading;
        self.upload_status = UploadStatus::InFlight;
        tracing::info!("Uploading verification documents");

        match self.api.upload_verification(&upload).await {
            Ok(()) => {
                tracing::info!("Verification completed successfully");
                self.upload_status = UploadStatus::Succeeded;
                self.stage = VerificationStage::Complete;
                self.last_error = None;
                self.identity = None;
                self.id_proof = None;
                self.media.stop();
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Verification upload failed: {}", e);
                self.upload_status = UploadStatus::Failed;
                self.stage = VerificationStage::ReviewingIdProof;
                Err(self.fail(e))
            }
        }
    }

    /// The exam may start only once this returns `Some`.
    pub fn clearance(&self) -> Option<ExamClearance> {
        match (self.stage, self.student_id, self.exam_id) {
            (VerificationStage::Complete, Some(student_id), Some(exam_id)) => Some(ExamClearance {
                key: AttemptKey::new(exam_id, student_id),
            }),
            _ => None,
        }
    }
}
