// src/lib.rs

pub mod api;
pub mod config;
pub mod error;
pub mod integrity;
pub mod media;
pub mod models;
pub mod persistence;
pub mod preflight;
pub mod session;
pub mod state;
pub mod submission;
pub mod timer;
pub mod utils;
pub mod verification;

pub use session::{ExamSession, SessionDeps, SessionEvent};
