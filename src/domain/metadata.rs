use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::equipment::normalize_notes;

/// Per-exercise usage bookkeeping, keyed by the catalog exercise id. The
/// record references the catalog entry weakly; deleting a catalog exercise
/// never cascades here. Created lazily the first time an exercise is used.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExerciseMetadata {
    pub exercise_id: String,
    pub name: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_used: Option<OffsetDateTime>,
    pub usage_count: u64,
    pub personal_notes: Option<String>,
    pub custom_weight: Option<f64>,
}

impl ExerciseMetadata {
    pub fn new(exercise_id: &str, name: &str) -> Self {
        Self {
            exercise_id: exercise_id.to_string(),
            name: name.trim().to_string(),
            last_used: None,
            usage_count: 0,
            personal_notes: None,
            custom_weight: None,
        }
    }

    /// Increment-on-use. `last_used` is clamped so a skewed caller clock can
    /// never persist a future timestamp.
    pub fn record_usage(&mut self, at: OffsetDateTime) {
        let now = OffsetDateTime::now_utc();
        self.usage_count += 1;
        self.last_used = Some(at.min(now));
    }

    pub fn set_notes(&mut self, notes: Option<&str>) {
        self.personal_notes = normalize_notes(notes);
    }
}
