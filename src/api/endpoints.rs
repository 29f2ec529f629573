// src/api/endpoints.rs

//! Paths of the exam API, relative to the configured base URL.

pub const CURRENT_USER: &str = "api/auth/current-user";
pub const LOGIN: &str = "api/auth/login";
pub const LOGOUT: &str = "api/auth/logout";

pub const AUTO_ASSIGN: &str = "api/examset/auto-assign";
pub const ASSIGNMENT: &str = "api/examset/assignment";

pub const VERIFICATION_UPLOAD: &str = "api/proctoring/save";
pub const EVIDENCE_UPLOAD: &str = "api/candidate/upload-video";
pub const SUBMIT_EXAM: &str = "api/candidate/submit-exam";

pub fn shuffled_questions(exam_id: i64) -> String {
    format!("api/candidate/exams/{exam_id}/shuffled-questions")
}
