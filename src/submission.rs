// src/submission.rs

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::{
    api::ExamApi,
    error::{AppError, NextAction},
    media::MediaCaptureController,
    models::{
        attempt::AttemptStatus,
        submission::{
            EvidenceBlob, EvidenceUpload, SubmissionPayload, SubmissionReason, SubmissionReceipt,
        },
    },
    persistence::SessionPersistence,
    state::{AttemptState, TerminalOutcome},
};

/// Result of one `submit` call.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// The guard was already held (or the exam is not running): nothing was done.
    Skipped,
    Submitted(SubmissionReceipt),
    /// A manual submission failed. Answers are kept and the candidate may retry.
    Retriable(AppError),
    /// A timer or violation submission failed. The attempt is over.
    Fatal(AppError),
}

/// Evidence kept across a failed manual submission so a retry does not lose it.
#[derive(Default)]
struct RetainedEvidence {
    reference: Option<String>,
    unsent: Option<EvidenceBlob>,
}

/// The single terminal consumer of an attempt.
///
/// `submit` may be called from the timer, the integrity monitor and the submit
/// button at the same time; the guard in [`AttemptState`] lets exactly one through.
pub struct SubmissionPipeline {
    state: Arc<AttemptState>,
    media: Arc<MediaCaptureController>,
    api: Arc<dyn ExamApi>,
    persistence: SessionPersistence,
    settle: Duration,
    retained: Mutex<RetainedEvidence>,
}

impl SubmissionPipeline {
    pub fn new(
        state: Arc<AttemptState>,
        media: Arc<MediaCaptureController>,
        api: Arc<dyn ExamApi>,
        persistence: SessionPersistence,
        settle: Duration,
    ) -> Self {
        Self {
            state,
            media,
            api,
            persistence,
            settle,
            retained: Mutex::new(RetainedEvidence::default()),
        }
    }

    pub fn state(&self) -> &Arc<AttemptState> {
        &self.state
    }

    /// Stops capture, uploads evidence (best effort), submits the answers and
    /// tears the session down.
    pub async fn submit(&self, reason: SubmissionReason) -> SubmitOutcome {
        // Must stay the first statement: no await before the guard is taken.
        if !self.state.try_begin_submission() {
            tracing::debug!("Submission ({}) skipped: already submitting or not running", reason);
            return SubmitOutcome::Skipped;
        }
        tracing::info!("Submitting attempt {} ({})", self.state.key(), reason);

        self.media.stop();
        tokio::time::sleep(self.settle).await;

        let video_url = self.upload_evidence().await;

        let payload = {
            let inner = self.state.lock();
            SubmissionPayload::build(
                self.state.key(),
                &inner.paper,
                &inner.answers,
                video_url,
                reason,
                inner.monitor.violation_count(),
                inner.attempt.assigned_set_number,
            )
        };

        let result = match payload {
            Ok(payload) => self.api.submit_exam(&payload).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(receipt) => {
                self.persistence.purge();
                if let Err(e) = self.api.logout().await {
                    tracing::warn!("Error clearing backend session: {}", e);
                }

                let status = match reason {
                    SubmissionReason::IntegrityViolation => AttemptStatus::Terminated,
                    _ => AttemptStatus::Submitted,
                };
                self.state.finish(
                    status,
                    TerminalOutcome::Confirmation {
                        reason,
                        receipt: receipt.clone(),
                    },
                );
                SubmitOutcome::Submitted(receipt)
            }
            Err(e) if reason.is_retriable() => {
                tracing::error!("Exam submission failed, candidate may retry: {}", e);
                self.state.release_submission();
                SubmitOutcome::Retriable(e)
            }
            Err(e) => {
                tracing::error!("Exam submission failed after {}: {}", reason, e);
                self.state.finish(
                    AttemptStatus::Terminated,
                    TerminalOutcome::FatalError {
                        reason,
                        message: "Failed to submit exam.".to_string(),
                        next_action: NextAction::ContactSupport,
                    },
                );
                SubmitOutcome::Fatal(e)
            }
        }
    }

    /// Returns the evidence reference, or `None` when there is nothing to send
    /// or the upload failed. Never fails the submission.
    async fn upload_evidence(&self) -> Option<String> {
        let fresh = self.media.take_evidence();

        let blob = {
            let mut retained = self.retained.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(reference) = retained.reference.clone() {
                return Some(reference);
            }
            match retained.unsent.take() {
                Some(mut earlier) if !fresh.is_empty() => {
                    earlier.bytes.extend_from_slice(&fresh.bytes);
                    earlier.chunk_count += fresh.chunk_count;
                    earlier
                }
                Some(earlier) => earlier,
                None => fresh,
            }
        };

        if blob.is_empty() {
            tracing::info!("No evidence recorded for {}", self.state.key());
            return None;
        }

        let upload = EvidenceUpload {
            key: self.state.key(),
            blob,
        };
        match self.api.upload_evidence(&upload).await {
            Ok(reference) => {
                tracing::info!(
                    "Uploaded evidence ({} chunk(s)) as {}",
                    upload.blob.chunk_count,
                    reference
                );
                self.retained
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .reference = Some(reference.clone());
                Some(reference)
            }
            Err(e) => {
                tracing::warn!("Video upload failed, submitting without evidence: {}", e);
                self.retained
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .unsent = Some(upload.blob);
                None
            }
        }
    }
}
