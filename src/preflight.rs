// src/preflight.rs

use std::sync::Arc;

use crate::{
    api::ExamApi,
    config::Config,
    error::AppError,
    models::{
        attempt::AttemptKey,
        question::{Question, SECTIONS, section_by_id},
        user::{CurrentUser, LoginRequest},
    },
    persistence::{KeyValueStore, SessionPersistence},
    session::ensure_assignment,
};

/// What the device-free check found for one exam.
#[derive(Debug, Clone)]
pub struct PreflightReport {
    pub user: CurrentUser,
    pub assigned_set_number: i64,
    pub question_count: usize,
    pub total_marks: i32,
    /// Question count per section code, in section order. Empty sections are left out.
    pub sections: Vec<(&'static str, usize)>,
    pub saved: SavedAttempt,
}

/// State of the locally saved snapshot for the attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SavedAttempt {
    None,
    Resumable {
        time_left_seconds: u64,
        answered: usize,
    },
    /// The violation count already exceeds the threshold; the attempt will not restart.
    Terminated { violation_count: u32 },
}

/// Logs in with the configured credentials and checks that the candidate
/// can sit `exam_id`: session, assignment, question paper, saved snapshot.
pub async fn run(
    api: &dyn ExamApi,
    store: Arc<dyn KeyValueStore>,
    config: &Config,
    exam_id: i64,
) -> Result<PreflightReport, AppError> {
    let (Some(email), Some(password)) = (
        config.candidate_email.clone(),
        config.candidate_password.clone(),
    ) else {
        return Err(AppError::Config(
            "EXAM_EMAIL and EXAM_PASSWORD must be set".to_string(),
        ));
    };

    api.login(&LoginRequest { email, password }).await?;
    let user = api.current_user().await?;
    tracing::info!("Session active for {} (id {})", user.display_name(), user.user_id);

    let assignment = ensure_assignment(api, user.user_id, exam_id).await?;
    tracing::info!("Assigned question set {}", assignment.assigned_set_number);

    let questions = api.fetch_questions(exam_id).await?;
    if questions.is_empty() {
        return Err(AppError::ValidationFailure("No questions found.".to_string()));
    }

    let persistence = SessionPersistence::new(store, AttemptKey::new(exam_id, user.user_id));
    let saved = match persistence.load() {
        None => SavedAttempt::None,
        Some(s) if s.violation_count > config.max_tab_switches => SavedAttempt::Terminated {
            violation_count: s.violation_count,
        },
        Some(s) => SavedAttempt::Resumable {
            time_left_seconds: s.time_left_seconds,
            answered: s
                .answers
                .keys()
                .filter(|id| questions.iter().any(|q| q.id == **id))
                .count(),
        },
    };

    Ok(PreflightReport {
        user,
        assigned_set_number: assignment.assigned_set_number,
        question_count: questions.len(),
        total_marks: questions.iter().map(marks_for).sum(),
        sections: section_counts(&questions),
        saved,
    })
}

/// Explicit marks win; otherwise the section's marks, or 1.
fn marks_for(question: &Question) -> i32 {
    question.marks.unwrap_or_else(|| {
        question
            .section
            .as_deref()
            .and_then(section_by_id)
            .map_or(1, |s| s.marks)
    })
}

fn section_counts(questions: &[Question]) -> Vec<(&'static str, usize)> {
    SECTIONS
        .iter()
        .map(|section| {
            let count = questions
                .iter()
                .filter(|q| q.section.as_deref() == Some(section.id))
                .count();
            (section.id, count)
        })
        .filter(|(_, count)| *count > 0)
        .collect()
}
