// src/api/mod.rs

pub mod endpoints;
pub mod http;

use async_trait::async_trait;

use crate::{
    error::AppError,
    models::{
        question::Question,
        submission::{EvidenceUpload, SubmissionPayload, SubmissionReceipt},
        user::{Assignment, CurrentUser, LoginRequest},
        verification::VerificationUpload,
    },
};

pub use http::HttpExamApi;

/// The exam server as seen by the candidate client.
///
/// Every call is attempted once; callers decide whether a failure is retried.
/// Calls that mutate server-side session or attempt state carry the session cookie.
#[async_trait]
pub trait ExamApi: Send + Sync {
    /// Session check. `AuthError` when there is no active session.
    async fn current_user(&self) -> Result<CurrentUser, AppError>;

    async fn login(&self, request: &LoginRequest) -> Result<CurrentUser, AppError>;

    async fn logout(&self) -> Result<(), AppError>;

    /// Active question-set assignment, `None` when the candidate has none yet.
    async fn fetch_assignment(
        &self,
        student_id: i64,
        exam_id: i64,
    ) -> Result<Option<Assignment>, AppError>;

    async fn auto_assign(&self, student_id: i64, exam_id: i64) -> Result<Assignment, AppError>;

    /// The already-shuffled question list for the candidate's assigned set.
    async fn fetch_questions(&self, exam_id: i64) -> Result<Vec<Question>, AppError>;

    async fn upload_verification(&self, upload: &VerificationUpload) -> Result<(), AppError>;

    /// Uploads recorded evidence and returns its server-side reference.
    async fn upload_evidence(&self, upload: &EvidenceUpload) -> Result<String, AppError>;

    /// Final answer submission. Must be called at most once per single-flight acquisition.
    async fn submit_exam(&self, payload: &SubmissionPayload)
    -> Result<SubmissionReceipt, AppError>;
}
