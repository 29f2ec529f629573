// src/models/mod.rs

pub mod attempt;
pub mod question;
pub mod snapshot;
pub mod submission;
pub mod user;
pub mod verification;
