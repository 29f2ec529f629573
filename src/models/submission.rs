// src/models/submission.rs

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{attempt::AttemptKey, question::QuestionPaper};

/// Why a submission was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmissionReason {
    Manual,
    TimeExpired,
    IntegrityViolation,
}

impl SubmissionReason {
    /// Only a candidate-initiated submission may be retried after a failure.
    pub fn is_retriable(self) -> bool {
        matches!(self, SubmissionReason::Manual)
    }
}

impl fmt::Display for SubmissionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SubmissionReason::Manual => "manual",
            SubmissionReason::TimeExpired => "time-expired",
            SubmissionReason::IntegrityViolation => "integrity-violation",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: i64,
}

/// The final answer submission. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub user: EntityRef,
    pub exam: EntityRef,
    /// JSON-encoded `questionId -> selectedOption` map.
    pub answers_json: String,
    /// Evidence reference; `None` when the evidence upload failed or was skipped.
    pub video_url: Option<String>,
    pub submission_reason: SubmissionReason,
    pub violation_count: u32,
    pub assigned_set_number: Option<i64>,
}

impl SubmissionPayload {
    /// Keeps only answers for questions in the loaded paper.
    pub fn build(
        key: AttemptKey,
        paper: &QuestionPaper,
        answers: &HashMap<i64, String>,
        video_url: Option<String>,
        reason: SubmissionReason,
        violation_count: u32,
        assigned_set_number: Option<i64>,
    ) -> Result<Self, AppError> {
        // BTreeMap keeps the encoded answers in a stable order.
        let kept: BTreeMap<String, &String> = answers
            .iter()
            .filter(|(id, _)| paper.contains(**id))
            .map(|(id, option)| (id.to_string(), option))
            .collect();

        let answers_json = serde_json::to_string(&kept)
            .map_err(|e| AppError::ValidationFailure(e.to_string()))?;

        Ok(Self {
            user: EntityRef { id: key.student_id },
            exam: EntityRef { id: key.exam_id },
            answers_json,
            video_url,
            submission_reason: reason,
            violation_count,
            assigned_set_number,
        })
    }

    pub fn answers(&self) -> BTreeMap<String, String> {
        serde_json::from_str(&self.answers_json).unwrap_or_default()
    }
}

/// Server acknowledgement of an accepted submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    #[serde(default)]
    pub submission_id: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub submitted_at: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
}

/// The recorded evidence assembled from buffered chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvidenceBlob {
    pub bytes: Vec<u8>,
    pub chunk_count: usize,
}

impl EvidenceBlob {
    pub const MIME_TYPE: &'static str = "video/webm";

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Multipart body for the evidence endpoint.
#[derive(Debug, Clone)]
pub struct EvidenceUpload {
    pub key: AttemptKey,
    pub blob: EvidenceBlob,
}

impl EvidenceUpload {
    pub fn file_name(&self) -> String {
        format!(
            "exam_{}_student_{}.webm",
            self.key.exam_id, self.key.student_id
        )
    }
}
