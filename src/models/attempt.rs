// src/models/attempt.rs

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Identifies one candidate's run of one exam.
/// Also the scope of the persisted snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptKey {
    pub exam_id: i64,
    pub student_id: i64,
}

impl AttemptKey {
    pub fn new(exam_id: i64, student_id: i64) -> Self {
        Self { exam_id, student_id }
    }

    /// Storage key for the snapshot of this attempt.
    pub fn storage_key(&self) -> String {
        format!("exam_{}_{}_snapshot", self.exam_id, self.student_id)
    }
}

impl fmt::Display for AttemptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exam {} / student {}", self.exam_id, self.student_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptStatus {
    Unverified,
    Verifying,
    Ready,
    InProgress,
    Submitting,
    Submitted,
    Terminated,
}

impl AttemptStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptStatus::Submitted | AttemptStatus::Terminated)
    }
}

/// The running attempt. Created at authentication success.
#[derive(Debug, Clone)]
pub struct ExamAttempt {
    pub key: AttemptKey,
    pub assigned_set_number: Option<i64>,
    pub status: AttemptStatus,
    /// Wall-clock deadline derived from the remaining-time counter.
    pub deadline: Option<DateTime<Utc>>,
}

impl ExamAttempt {
    pub fn new(key: AttemptKey) -> Self {
        Self {
            key,
            assigned_set_number: None,
            status: AttemptStatus::Unverified,
            deadline: None,
        }
    }

    pub fn update_deadline(&mut self, time_left_secs: u64, now: DateTime<Utc>) {
        self.deadline = i64::try_from(time_left_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|left| now.checked_add_signed(left));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_key_is_scoped_to_exam_and_student() {
        let a = AttemptKey::new(11, 5);
        let b = AttemptKey::new(11, 6);
        assert_eq!(a.storage_key(), "exam_11_5_snapshot");
        assert_ne!(a.storage_key(), b.storage_key());
    }

    #[test]
    fn deadline_follows_time_left() {
        let mut attempt = ExamAttempt::new(AttemptKey::new(1, 2));
        let now = Utc::now();
        attempt.update_deadline(90, now);
        assert_eq!(attempt.deadline, Some(now + Duration::seconds(90)));
        assert_eq!(attempt.status, AttemptStatus::Unverified);
    }
}
