// src/state.rs

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{
    error::NextAction,
    integrity::IntegrityMonitor,
    models::{
        attempt::{AttemptKey, AttemptStatus, ExamAttempt},
        question::QuestionPaper,
        snapshot::PersistedSnapshot,
        submission::{SubmissionReason, SubmissionReceipt},
    },
    timer::ExamTimer,
};

/// How an attempt ended, for the terminal view.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalOutcome {
    /// The server accepted the submission.
    Confirmation {
        reason: SubmissionReason,
        receipt: SubmissionReceipt,
    },
    /// A non-retriable submission failed. No further interaction is offered.
    FatalError {
        reason: SubmissionReason,
        message: String,
        next_action: NextAction,
    },
    /// The candidate logged out mid-exam.
    LoggedOut,
}

/// Attempt-scoped state shared by every submission trigger.
///
/// The single-flight guard lives here as a field; the timer, the integrity
/// monitor and the submit button all reach the pipeline through the same
/// `Arc<AttemptState>`.
pub struct AttemptState {
    key: AttemptKey,
    submitting: AtomicBool,
    inner: Mutex<AttemptInner>,
}

#[derive(Debug, Clone)]
pub struct AttemptInner {
    pub attempt: ExamAttempt,
    pub paper: QuestionPaper,
    pub answers: HashMap<i64, String>,
    pub current_index: usize,
    pub timer: ExamTimer,
    pub monitor: IntegrityMonitor,
    pub outcome: Option<TerminalOutcome>,
}

impl AttemptInner {
    pub fn snapshot(&self) -> PersistedSnapshot {
        PersistedSnapshot {
            key: self.attempt.key,
            answers: self.answers.clone(),
            time_left_seconds: self.timer.remaining(),
            current_question_index: self.current_index,
            violation_count: self.monitor.violation_count(),
        }
    }
}

impl AttemptState {
    pub fn new(
        attempt: ExamAttempt,
        paper: QuestionPaper,
        timer: ExamTimer,
        monitor: IntegrityMonitor,
    ) -> Self {
        Self {
            key: attempt.key,
            submitting: AtomicBool::new(false),
            inner: Mutex::new(AttemptInner {
                attempt,
                paper,
                answers: HashMap::new(),
                current_index: 0,
                timer,
                monitor,
                outcome: None,
            }),
        }
    }

    pub fn key(&self) -> AttemptKey {
        self.key
    }

    pub fn lock(&self) -> MutexGuard<'_, AttemptInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> AttemptStatus {
        self.lock().attempt.status
    }

    pub fn set_status(&self, status: AttemptStatus) {
        let mut inner = self.lock();
        tracing::info!(
            "Attempt {} status {:?} -> {:?}",
            self.key,
            inner.attempt.status,
            status
        );
        inner.attempt.status = status;
    }

    pub fn outcome(&self) -> Option<TerminalOutcome> {
        self.lock().outcome.clone()
    }

    pub fn is_submission_guarded(&self) -> bool {
        self.submitting.load(Ordering::Acquire)
    }

    /// Synchronous check-and-set of the single-flight guard.
    ///
    /// Succeeds only for an in-progress attempt whose guard is free, and moves it to
    /// `Submitting` before returning.
    pub fn try_begin_submission(&self) -> bool {
        let mut inner = self.lock();
        if inner.attempt.status != AttemptStatus::InProgress {
            return false;
        }
        if self
            .submitting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        inner.attempt.status = AttemptStatus::Submitting;
        inner.timer.disarm();
        inner.monitor.disarm();
        true
    }

    /// Reopens the attempt after a retriable submission failure.
    /// The countdown and the monitor resume where they stopped.
    pub fn release_submission(&self) {
        let mut inner = self.lock();
        inner.attempt.status = AttemptStatus::InProgress;
        inner.timer.arm();
        inner.monitor.arm();
        self.submitting.store(false, Ordering::Release);
    }

    /// Records the terminal outcome. The guard stays set.
    pub fn finish(&self, status: AttemptStatus, outcome: TerminalOutcome) {
        let mut inner = self.lock();
        tracing::info!("Attempt {} finished as {:?}", self.key, status);
        inner.attempt.status = status;
        inner.outcome = Some(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_progress() -> AttemptState {
        let mut attempt = ExamAttempt::new(AttemptKey::new(1, 2));
        attempt.status = AttemptStatus::InProgress;
        AttemptState::new(
            attempt,
            QuestionPaper::default(),
            ExamTimer::new(60),
            IntegrityMonitor::new(2),
        )
    }

    #[test]
    fn guard_is_single_flight() {
        let state = in_progress();
        assert!(state.try_begin_submission());
        assert!(!state.try_begin_submission());
        assert_eq!(state.status(), AttemptStatus::Submitting);
        assert!(!state.lock().monitor.is_armed());
    }

    #[test]
    fn released_guard_can_be_taken_again() {
        let state = in_progress();
        assert!(state.try_begin_submission());
        state.release_submission();
        assert_eq!(state.status(), AttemptStatus::InProgress);
        assert!(state.try_begin_submission());
    }

    #[test]
    fn guard_is_refused_outside_the_active_exam() {
        let state = AttemptState::new(
            ExamAttempt::new(AttemptKey::new(1, 2)),
            QuestionPaper::default(),
            ExamTimer::new(60),
            IntegrityMonitor::new(2),
        );
        assert!(!state.try_begin_submission());
        assert!(!state.is_submission_guarded());
    }
}
