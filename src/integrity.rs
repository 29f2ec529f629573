// src/integrity.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Application-visibility transition reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Hidden,
    Visible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationKind {
    /// The exam lost foreground visibility (tab or window switch).
    VisibilityLost,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationEvent {
    pub at: DateTime<Utc>,
    pub kind: ViolationKind,
}

/// Violation record for one attempt. The count never decreases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityLog {
    pub violation_count: u32,
    pub events: Vec<ViolationEvent>,
    pub threshold: u32,
}

/// What the monitor decided for one visibility transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityOutcome {
    /// Visible transition, or the monitor is not armed.
    Ignored,
    /// Within tolerance: show `count/threshold` to the candidate.
    Warning { count: u32, threshold: u32 },
    /// Over the threshold: the attempt must be force-submitted.
    ThresholdExceeded { count: u32 },
}

/// Counts visibility losses during the active exam and escalates past the threshold.
///
/// Every hidden transition counts; there is no debounce.
#[derive(Debug, Clone)]
pub struct IntegrityMonitor {
    log: IntegrityLog,
    armed: bool,
}

impl IntegrityMonitor {
    pub fn new(threshold: u32) -> Self {
        Self::resume(0, threshold)
    }

    /// Continues from a count restored from a snapshot.
    pub fn resume(violation_count: u32, threshold: u32) -> Self {
        Self {
            log: IntegrityLog {
                violation_count,
                events: Vec::new(),
                threshold,
            },
            armed: false,
        }
    }

    pub fn arm(&mut self) {
        self.armed = true;
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn violation_count(&self) -> u32 {
        self.log.violation_count
    }

    pub fn log(&self) -> &IntegrityLog {
        &self.log
    }

    pub fn observe(&mut self, visibility: Visibility, at: DateTime<Utc>) -> IntegrityOutcome {
        if !self.armed || visibility == Visibility::Visible {
            return IntegrityOutcome::Ignored;
        }

        self.log.violation_count = self.log.violation_count.saturating_add(1);
        self.log.events.push(ViolationEvent {
            at,
            kind: ViolationKind::VisibilityLost,
        });

        let count = self.log.violation_count;
        let threshold = self.log.threshold;
        if count > threshold {
            tracing::warn!("Violation {} exceeds threshold {}", count, threshold);
            self.armed = false;
            IntegrityOutcome::ThresholdExceeded { count }
        } else {
            tracing::warn!("Tab switch detected ({}/{})", count, threshold);
            IntegrityOutcome::Warning { count, threshold }
        }
    }
}
