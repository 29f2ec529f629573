// src/models/snapshot.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::attempt::AttemptKey;

/// Durable copy of in-progress exam state, used to survive a reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSnapshot {
    /// The attempt this snapshot belongs to. Checked again on load.
    pub key: AttemptKey,
    pub answers: HashMap<i64, String>,
    pub time_left_seconds: u64,
    pub current_question_index: usize,
    pub violation_count: u32,
}
