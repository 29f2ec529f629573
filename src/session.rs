// src/session.rs

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{
    api::ExamApi,
    config::Config,
    error::{AppError, NextAction},
    integrity::{IntegrityMonitor, IntegrityOutcome, Visibility},
    media::{CaptureKind, MediaBackend, MediaCaptureController},
    models::{
        attempt::{AttemptKey, AttemptStatus, ExamAttempt},
        question::{Question, QuestionPaper, QuestionStatus},
        submission::SubmissionReason,
        user::{Assignment, CurrentUser},
    },
    persistence::{KeyValueStore, SessionPersistence},
    state::{AttemptInner, AttemptState, TerminalOutcome},
    submission::{SubmissionPipeline, SubmitOutcome},
    timer::{self, ExamTimer, TimerOutcome},
    utils::format::format_time,
    verification::ExamClearance,
};

const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Everything an exam session talks to.
#[derive(Clone)]
pub struct SessionDeps {
    pub api: Arc<dyn ExamApi>,
    pub media: Arc<dyn MediaBackend>,
    pub store: Arc<dyn KeyValueStore>,
    pub config: Config,
}

/// Inputs delivered to the session reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// One second of exam time elapsed.
    Tick,
    Visibility(Visibility),
    SelectAnswer { question_id: i64, option: String },
    /// Clears the answer of the current question.
    ClearAnswer,
    Next,
    Previous,
    Jump(usize),
    SubmitRequested,
    Logout,
}

/// What the reducer decided for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    Ignored,
    /// State changed and the snapshot was written.
    Updated,
    Warning { count: u32, threshold: u32 },
    Submit(SubmissionReason),
    Logout,
}

/// Answered/total counts for the progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub answered: usize,
    pub total: usize,
}

/// Makes sure the candidate has a question-set assignment, auto-assigning when missing.
pub async fn ensure_assignment(
    api: &dyn ExamApi,
    student_id: i64,
    exam_id: i64,
) -> Result<Assignment, AppError> {
    match api.fetch_assignment(student_id, exam_id).await {
        Ok(Some(assignment)) => return Ok(assignment),
        Ok(None) => tracing::info!("No existing assignment for student {}", student_id),
        Err(AppError::AuthError(msg)) => return Err(AppError::AuthError(msg)),
        Err(e) => tracing::info!("No existing assignment for student {}: {}", student_id, e),
    }

    tracing::info!("Assigning student {} to an exam set for exam {}", student_id, exam_id);
    let assigned = api.auto_assign(student_id, exam_id).await?;

    match api.fetch_assignment(student_id, exam_id).await {
        Ok(Some(assignment)) => Ok(assignment),
        _ => Ok(assigned),
    }
}

/// One candidate's running exam: questions, answers, countdown, violation
/// monitor, evidence recording and the single submission pipeline.
///
/// Dropping the session cancels the countdown and releases every device.
pub struct ExamSession {
    api: Arc<dyn ExamApi>,
    user: CurrentUser,
    state: Arc<AttemptState>,
    media: Arc<MediaCaptureController>,
    persistence: SessionPersistence,
    pipeline: Arc<SubmissionPipeline>,
    resumed: bool,
    events: mpsc::UnboundedSender<SessionEvent>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    warning: Mutex<Option<String>>,
    /// Set by `teardown`; a closed session accepts no events and cannot start.
    closed: AtomicBool,
}

impl ExamSession {
    /// Loads the exam for the logged-in candidate and restores a snapshot if one exists.
    ///
    /// A fresh attempt needs the clearance from identity verification; resuming
    /// from a snapshot does not, since the snapshot only exists for a started attempt.
    pub async fn mount(
        deps: SessionDeps,
        exam_id: i64,
        clearance: Option<ExamClearance>,
    ) -> Result<Self, AppError> {
        let user = deps.api.current_user().await.map_err(|e| match e {
            AppError::AuthError(_) => {
                AppError::AuthError("Please login to access the exam.".to_string())
            }
            other => other,
        })?;
        let key = AttemptKey::new(exam_id, user.user_id);

        if let Some(clearance) = clearance {
            if clearance.key() != key {
                return Err(AppError::ValidationFailure(format!(
                    "verification was completed for {}, not {}",
                    clearance.key(),
                    key
                )));
            }
        }

        let assignment = ensure_assignment(deps.api.as_ref(), user.user_id, exam_id).await?;

        let questions = deps.api.fetch_questions(exam_id).await?;
        if questions.is_empty() {
            return Err(AppError::ValidationFailure("No questions found.".to_string()));
        }
        let paper = QuestionPaper::new(questions);

        let persistence = SessionPersistence::new(deps.store.clone(), key);
        let snapshot = persistence.load();
        if snapshot.is_none() && clearance.is_none() {
            return Err(AppError::ValidationFailure(
                "Identity verification must be completed before the exam starts.".to_string(),
            ));
        }

        let config = &deps.config;
        let mut attempt = ExamAttempt::new(key);
        attempt.assigned_set_number = Some(assignment.assigned_set_number);
        attempt.status = AttemptStatus::Ready;

        let (timer, monitor, answers, index) = match &snapshot {
            Some(saved) => {
                // An expired snapshot resumes at zero and submits on the first tick.
                (
                    ExamTimer::new(saved.time_left_seconds),
                    IntegrityMonitor::resume(saved.violation_count, config.max_tab_switches),
                    saved.answers.clone(),
                    saved.current_question_index.min(paper.len() - 1),
                )
            }
            None => (
                ExamTimer::new(config.exam_duration_secs),
                IntegrityMonitor::new(config.max_tab_switches),
                HashMap::new(),
                0,
            ),
        };
        attempt.update_deadline(timer.remaining(), Utc::now());

        let state = Arc::new(AttemptState::new(attempt, paper, timer, monitor));
        {
            let mut inner = state.lock();
            inner.answers = answers;
            inner.current_index = index;
        }

        // A forced submission that failed leaves its snapshot behind; the attempt stays over.
        if let Some(saved) = snapshot
            .as_ref()
            .filter(|s| s.violation_count > config.max_tab_switches)
        {
            tracing::error!(
                "Attempt {} exceeded the violation threshold ({}/{}) and cannot resume",
                key,
                saved.violation_count,
                config.max_tab_switches
            );
            state.finish(
                AttemptStatus::Terminated,
                TerminalOutcome::FatalError {
                    reason: SubmissionReason::IntegrityViolation,
                    message: "This exam was terminated after repeated tab switches.".to_string(),
                    next_action: NextAction::ContactSupport,
                },
            );
        }

        let media = Arc::new(MediaCaptureController::new(
            deps.media.clone(),
            config.recorder_timeslice,
        ));
        let pipeline = Arc::new(SubmissionPipeline::new(
            state.clone(),
            media.clone(),
            deps.api.clone(),
            persistence.clone(),
            config.submit_settle,
        ));
        let (events, receiver) = mpsc::unbounded_channel();

        {
            let inner = state.lock();
            tracing::info!(
                "Mounted {} with set {} ({} question(s), {} left{})",
                key,
                assignment.assigned_set_number,
                inner.paper.len(),
                format_time(inner.timer.remaining()),
                if snapshot.is_some() { ", resumed" } else { "" }
            );
        }

        Ok(Self {
            api: deps.api,
            user,
            state,
            media,
            persistence,
            pipeline,
            resumed: snapshot.is_some(),
            events,
            receiver: Mutex::new(Some(receiver)),
            ticker: Mutex::new(None),
            warning: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Opens camera+microphone and the screen, starts recording, then arms the
    /// countdown and the violation monitor. A capture failure leaves the session
    /// `Ready` so the candidate can try again.
    ///
    /// A logout or teardown that lands while devices are being opened wins:
    /// whatever was acquired is released and `start` fails with `InvalidState`.
    pub async fn start(&self) -> Result<(), AppError> {
        self.ensure_startable(self.state.status())?;

        if let Err(e) = self.open_capture().await {
            self.media.stop();
            return Err(e);
        }

        {
            let mut inner = self.state.lock();
            if let Err(e) = self.ensure_startable(inner.attempt.status) {
                drop(inner);
                tracing::warn!("Exam {} closed while opening capture", self.state.key());
                self.media.stop();
                return Err(e);
            }
            inner.attempt.status = AttemptStatus::InProgress;
            let remaining = inner.timer.remaining();
            inner.attempt.update_deadline(remaining, Utc::now());
            inner.timer.arm();
            inner.monitor.arm();
        }

        let handle = timer::spawn_ticker(self.events.clone(), TICK_PERIOD, || SessionEvent::Tick);
        if let Some(old) = self.lock_ticker().replace(handle) {
            old.abort();
        }
        // Teardown may have run between arming and storing the ticker.
        if self.is_closed() {
            if let Some(handle) = self.lock_ticker().take() {
                handle.abort();
            }
            return Err(AppError::InvalidState("the exam session was closed".to_string()));
        }

        tracing::info!("Exam {} in progress", self.state.key());
        Ok(())
    }

    fn ensure_startable(&self, status: AttemptStatus) -> Result<(), AppError> {
        if self.is_closed() {
            return Err(AppError::InvalidState("the exam session was closed".to_string()));
        }
        if status != AttemptStatus::Ready {
            return Err(AppError::InvalidState(format!(
                "cannot start the exam while {status:?}"
            )));
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn open_capture(&self) -> Result<(), AppError> {
        self.media.acquire(CaptureKind::CameraMicrophone).await?;
        self.media.acquire(CaptureKind::Screen).await?;
        let tracks = self.media.evidence_tracks()?;
        self.media.start_recording(&tracks)
    }

    fn lock_ticker(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.ticker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn save(&self, inner: &AttemptInner) {
        self.persistence.save(&inner.snapshot());
    }

    /// Applies one event. Never awaits; submissions are returned, not run.
    pub fn handle(&self, event: SessionEvent) -> Reaction {
        if event == SessionEvent::Logout {
            return Reaction::Logout;
        }

        let mut inner = self.state.lock();
        if inner.attempt.status != AttemptStatus::InProgress || self.is_closed() {
            return Reaction::Ignored;
        }

        let reaction = match event {
            SessionEvent::Tick => match inner.timer.tick() {
                TimerOutcome::Idle => Reaction::Ignored,
                TimerOutcome::Running { remaining } => {
                    inner.attempt.update_deadline(remaining, Utc::now());
                    Reaction::Updated
                }
                TimerOutcome::Expired => Reaction::Submit(SubmissionReason::TimeExpired),
            },
            SessionEvent::Visibility(visibility) => {
                match inner.monitor.observe(visibility, Utc::now()) {
                    IntegrityOutcome::Ignored => Reaction::Ignored,
                    IntegrityOutcome::Warning { count, threshold } => {
                        *self.warning.lock().unwrap_or_else(PoisonError::into_inner) = Some(
                            format!("Warning: Tab switch detected! ({count}/{threshold})"),
                        );
                        Reaction::Warning { count, threshold }
                    }
                    IntegrityOutcome::ThresholdExceeded { .. } => {
                        Reaction::Submit(SubmissionReason::IntegrityViolation)
                    }
                }
            }
            SessionEvent::SelectAnswer {
                question_id,
                option,
            } => {
                if inner.paper.contains(question_id) {
                    inner.answers.insert(question_id, option);
                    Reaction::Updated
                } else {
                    Reaction::Ignored
                }
            }
            SessionEvent::ClearAnswer => {
                let current = inner.paper.get(inner.current_index).map(|q| q.id);
                match current {
                    Some(id) if inner.answers.remove(&id).is_some() => Reaction::Updated,
                    _ => Reaction::Ignored,
                }
            }
            SessionEvent::Next => {
                let next = inner.paper.next_index(inner.current_index);
                Self::move_to(&mut inner, next)
            }
            SessionEvent::Previous => {
                let previous = inner.paper.previous_index(inner.current_index);
                Self::move_to(&mut inner, previous)
            }
            SessionEvent::Jump(index) => {
                let target = (index < inner.paper.len()).then_some(index);
                Self::move_to(&mut inner, target)
            }
            SessionEvent::SubmitRequested => Reaction::Submit(SubmissionReason::Manual),
            SessionEvent::Logout => Reaction::Logout,
        };

        // Violations and expiry also change persisted fields.
        if reaction != Reaction::Ignored {
            self.save(&inner);
        }
        reaction
    }

    fn move_to(inner: &mut AttemptInner, target: Option<usize>) -> Reaction {
        match target {
            Some(index) if index != inner.current_index => {
                inner.current_index = index;
                Reaction::Updated
            }
            _ => Reaction::Ignored,
        }
    }

    /// Handle for the platform and the UI to deliver events to `run`.
    pub fn sender(&self) -> mpsc::UnboundedSender<SessionEvent> {
        self.events.clone()
    }

    /// Processes events until the attempt ends, then tears the session down.
    pub async fn run(&self) -> Option<TerminalOutcome> {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut events) = receiver else {
            tracing::warn!("Session event loop is already running");
            return self.state.outcome();
        };

        while let Some(event) = events.recv().await {
            match self.handle(event) {
                Reaction::Submit(reason) => {
                    if let SubmitOutcome::Retriable(e) = self.pipeline.submit(reason).await {
                        *self.warning.lock().unwrap_or_else(PoisonError::into_inner) =
                            Some(e.user_message());
                    }
                }
                Reaction::Logout => self.logout().await,
                Reaction::Warning { .. } | Reaction::Updated | Reaction::Ignored => {}
            }

            if self.state.status().is_terminal() {
                break;
            }
        }

        self.teardown();
        self.state.outcome()
    }

    /// Direct entry to the single-flight submission.
    pub async fn submit(&self, reason: SubmissionReason) -> SubmitOutcome {
        self.pipeline.submit(reason).await
    }

    /// Ends the attempt without submitting: purges the snapshot and the server session.
    pub async fn logout(&self) {
        if self.state.status() == AttemptStatus::Submitting {
            tracing::warn!("Logout ignored while a submission is in flight");
            return;
        }

        self.teardown();
        self.persistence.purge();
        if let Err(e) = self.api.logout().await {
            tracing::warn!("Error clearing backend session: {}", e);
        }
        if !self.state.status().is_terminal() {
            self.state
                .finish(AttemptStatus::Terminated, TerminalOutcome::LoggedOut);
        }
    }

    /// Cancels the countdown, stops the monitor and releases every device. Synchronous.
    pub fn teardown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(handle) = self.lock_ticker().take() {
            handle.abort();
        }
        {
            let mut inner = self.state.lock();
            inner.timer.disarm();
            inner.monitor.disarm();
        }
        self.media.stop();
    }

    pub fn pipeline(&self) -> Arc<SubmissionPipeline> {
        self.pipeline.clone()
    }

    pub fn key(&self) -> AttemptKey {
        self.state.key()
    }

    pub fn user(&self) -> &CurrentUser {
        &self.user
    }

    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    pub fn status(&self) -> AttemptStatus {
        self.state.status()
    }

    pub fn outcome(&self) -> Option<TerminalOutcome> {
        self.state.outcome()
    }

    pub fn time_left(&self) -> u64 {
        self.state.lock().timer.remaining()
    }

    pub fn time_left_display(&self) -> String {
        format_time(self.time_left())
    }

    pub fn violation_count(&self) -> u32 {
        self.state.lock().monitor.violation_count()
    }

    pub fn current_index(&self) -> usize {
        self.state.lock().current_index
    }

    pub fn current_question(&self) -> Option<Question> {
        let inner = self.state.lock();
        inner.paper.get(inner.current_index).cloned()
    }

    pub fn answers(&self) -> HashMap<i64, String> {
        self.state.lock().answers.clone()
    }

    pub fn progress(&self) -> Progress {
        let inner = self.state.lock();
        Progress {
            answered: inner
                .answers
                .keys()
                .filter(|id| inner.paper.contains(**id))
                .count(),
            total: inner.paper.len(),
        }
    }

    pub fn question_status(&self, index: usize) -> Option<QuestionStatus> {
        let inner = self.state.lock();
        inner.paper.status(index, inner.current_index, &inner.answers)
    }

    pub fn last_warning(&self) -> Option<String> {
        self.warning
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn media(&self) -> &MediaCaptureController {
        &self.media
    }
}

impl Drop for ExamSession {
    fn drop(&mut self) {
        self.teardown();
    }
}
