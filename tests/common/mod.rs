// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use exam_client::{
    api::ExamApi,
    config::Config,
    error::AppError,
    media::{MediaCaptureController, NullMedia},
    models::{
        question::Question,
        submission::{EvidenceUpload, SubmissionPayload, SubmissionReceipt},
        user::{Assignment, CurrentUser, LoginRequest},
        verification::VerificationUpload,
    },
    persistence::MemoryStore,
    session::SessionDeps,
    verification::{ExamClearance, VerificationFlow},
};

pub const EXAM_ID: i64 = 11;
pub const STUDENT_ID: i64 = 5;

/// In-memory exam server that records every call.
///
/// Failure counters make the next N calls of an endpoint fail with `NetworkFailure`.
pub struct FakeExamApi {
    pub user: Mutex<Option<CurrentUser>>,
    pub assignment: Mutex<Option<Assignment>>,
    pub questions: Mutex<Vec<Question>>,

    pub fail_verification: AtomicU32,
    pub fail_evidence: AtomicU32,
    pub fail_submit: AtomicU32,
    /// Delay inside `submit_exam`, to widen race windows.
    pub submit_delay: Mutex<Duration>,

    pub verifications: Mutex<Vec<VerificationUpload>>,
    pub evidence: Mutex<Vec<EvidenceUpload>>,
    pub submissions: Mutex<Vec<SubmissionPayload>>,
    pub submit_calls: AtomicU32,
    pub auto_assigns: AtomicU32,
    pub logouts: AtomicU32,
}

impl FakeExamApi {
    pub fn new() -> Self {
        Self {
            user: Mutex::new(Some(CurrentUser {
                user_id: STUDENT_ID,
                email: Some("asha@example.com".to_string()),
                name: Some("Asha".to_string()),
                role: Some("student".to_string()),
            })),
            assignment: Mutex::new(Some(Assignment {
                assigned_set_number: 2,
                slot_number: Some(1),
                has_started: Some(false),
                has_completed: Some(false),
            })),
            questions: Mutex::new(sample_questions()),
            fail_verification: AtomicU32::new(0),
            fail_evidence: AtomicU32::new(0),
            fail_submit: AtomicU32::new(0),
            submit_delay: Mutex::new(Duration::ZERO),
            verifications: Mutex::new(Vec::new()),
            evidence: Mutex::new(Vec::new()),
            submissions: Mutex::new(Vec::new()),
            submit_calls: AtomicU32::new(0),
            auto_assigns: AtomicU32::new(0),
            logouts: AtomicU32::new(0),
        }
    }

    pub fn submissions(&self) -> Vec<SubmissionPayload> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn evidence_uploads(&self) -> usize {
        self.evidence.lock().unwrap().len()
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ExamApi for FakeExamApi {
    async fn current_user(&self) -> Result<CurrentUser, AppError> {
        self.user
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AppError::AuthError("Not authenticated".to_string()))
    }

    async fn login(&self, request: &LoginRequest) -> Result<CurrentUser, AppError> {
        let user = CurrentUser {
            user_id: STUDENT_ID,
            email: Some(request.email.clone()),
            name: None,
            role: None,
        };
        *self.user.lock().unwrap() = Some(user.clone());
        Ok(user)
    }

    async fn logout(&self) -> Result<(), AppError> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        *self.user.lock().unwrap() = None;
        Ok(())
    }

    async fn fetch_assignment(
        &self,
        _student_id: i64,
        _exam_id: i64,
    ) -> Result<Option<Assignment>, AppError> {
        Ok(self.assignment.lock().unwrap().clone())
    }

    async fn auto_assign(&self, _student_id: i64, _exam_id: i64) -> Result<Assignment, AppError> {
        self.auto_assigns.fetch_add(1, Ordering::SeqCst);
        let assignment = Assignment {
            assigned_set_number: 3,
            slot_number: None,
            has_started: None,
            has_completed: None,
        };
        *self.assignment.lock().unwrap() = Some(assignment.clone());
        Ok(assignment)
    }

    async fn fetch_questions(&self, _exam_id: i64) -> Result<Vec<Question>, AppError> {
        Ok(self.questions.lock().unwrap().clone())
    }

    async fn upload_verification(&self, upload: &VerificationUpload) -> Result<(), AppError> {
        if Self::take_failure(&self.fail_verification) {
            return Err(AppError::NetworkFailure("verification upload failed".to_string()));
        }
        self.verifications.lock().unwrap().push(upload.clone());
        Ok(())
    }

    async fn upload_evidence(&self, upload: &EvidenceUpload) -> Result<String, AppError> {
        if Self::take_failure(&self.fail_evidence) {
            return Err(AppError::NetworkFailure("video upload failed".to_string()));
        }
        self.evidence.lock().unwrap().push(upload.clone());
        Ok(format!("/uploads/videos/{}", upload.file_name()))
    }

    async fn submit_exam(
        &self,
        payload: &SubmissionPayload,
    ) -> Result<SubmissionReceipt, AppError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.submit_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if Self::take_failure(&self.fail_submit) {
            return Err(AppError::NetworkFailure("Failed to submit exam.".to_string()));
        }

        let mut submissions = self.submissions.lock().unwrap();
        submissions.push(payload.clone());
        Ok(SubmissionReceipt {
            submission_id: Some(submissions.len() as i64),
            status: Some("SUBMITTED".to_string()),
            submitted_at: Some("2026-10-19T10:00:00".to_string()),
            video_url: payload.video_url.clone(),
        })
    }
}

pub fn question(id: i64, section: &str) -> Question {
    Question {
        id,
        section: Some(section.to_string()),
        question_type: Some("mcq".to_string()),
        question_text: format!("Question {id}"),
        options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
        marks: None,
    }
}

/// Four questions across sections A, B and D.
pub fn sample_questions() -> Vec<Question> {
    vec![
        question(1, "A"),
        question(2, "A"),
        question(3, "B"),
        question(4, "D"),
    ]
}

pub fn test_config() -> Config {
    Config {
        exam_duration_secs: 60,
        max_tab_switches: 2,
        submit_settle: Duration::ZERO,
        ..Config::default()
    }
}

pub struct Harness {
    pub api: Arc<FakeExamApi>,
    pub media: Arc<NullMedia>,
    pub store: Arc<MemoryStore>,
    pub config: Config,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            api: Arc::new(FakeExamApi::new()),
            media: Arc::new(NullMedia::new()),
            store: Arc::new(MemoryStore::new()),
            config: test_config(),
        }
    }

    pub fn deps(&self) -> SessionDeps {
        SessionDeps {
            api: self.api.clone(),
            media: self.media.clone(),
            store: self.store.clone(),
            config: self.config.clone(),
        }
    }

    pub fn verification_flow(&self) -> VerificationFlow {
        VerificationFlow::new(
            self.api.clone(),
            MediaCaptureController::new(self.media.clone(), self.config.recorder_timeslice),
            Some(STUDENT_ID),
            Some(EXAM_ID),
        )
    }

    /// Runs identity verification to completion.
    pub async fn clearance(&self) -> ExamClearance {
        let mut flow = self.verification_flow();
        flow.grant_consent().await.unwrap();
        flow.capture().unwrap();
        flow.confirm().await.unwrap();
        flow.capture().unwrap();
        flow.confirm().await.unwrap();
        flow.clearance().unwrap()
    }
}
