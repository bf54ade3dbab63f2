use std::error::Error;
use std::fmt;

use rusqlite::Connection;
use serde::Serialize;
use time::OffsetDateTime;

use crate::db::{self, EquipmentRecord, MetadataRecord, PlanExerciseRecord, PlanRecord};
use crate::payload;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IntegrityIssue {
    pub entity: &'static str,
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IntegrityReport {
    pub records_scanned: u64,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn ok(&self) -> bool {
        self.issues.is_empty()
    }
}

#[derive(Debug)]
pub enum IntegrityError {
    Db(rusqlite::Error),
    ValidationFailed {
        entity: &'static str,
        field: &'static str,
        message: String,
    },
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityError::Db(err) => write!(f, "database error: {}", err),
            IntegrityError::ValidationFailed {
                entity,
                field,
                message,
            } => write!(f, "validation failed for {} field '{}': {}", entity, field, message),
        }
    }
}

impl Error for IntegrityError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            IntegrityError::Db(err) => Some(err),
            IntegrityError::ValidationFailed { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for IntegrityError {
    fn from(value: rusqlite::Error) -> Self {
        IntegrityError::Db(value)
    }
}

/// Strict sweep over every record of every kind. Fails on the first
/// domain-rule violation, naming the offending entity and field, and never
/// attempts repair. The lenient counterpart is `detect_and_handle_corruption`.
pub fn validate_data_integrity(conn: &Connection) -> Result<(), IntegrityError> {
    let report = scan(conn)?;
    match report.issues.into_iter().next() {
        None => Ok(()),
        Some(issue) => Err(IntegrityError::ValidationFailed {
            entity: issue.entity,
            field: issue.field,
            message: issue.message,
        }),
    }
}

/// Lenient sweep collecting every violation instead of failing on the first.
pub fn scan(conn: &Connection) -> Result<IntegrityReport, IntegrityError> {
    let now = OffsetDateTime::now_utc();
    let mut issues = Vec::new();
    let mut records_scanned = 0u64;

    for record in db::list_equipment(conn)? {
        records_scanned += 1;
        check_equipment(&record, now, &mut issues);
    }
    for record in db::list_plans(conn)? {
        records_scanned += 1;
        check_plan(&record, now, &mut issues);
    }
    for record in db::list_all_plan_exercises(conn)? {
        records_scanned += 1;
        check_plan_exercise(&record, &mut issues);
    }
    for record in db::list_exercise_metadata(conn)? {
        records_scanned += 1;
        check_metadata(&record, now, &mut issues);
    }

    Ok(IntegrityReport {
        records_scanned,
        issues,
    })
}

/// Opportunistic auto-repair: equipment rows with a blank identifier are
/// removed outright and the removal is reported. Plan and exercise
/// corruption is deliberately NOT handled here; those violations only
/// surface through the strict validator. Preserved asymmetry from the
/// shipped behavior.
pub fn detect_and_handle_corruption(conn: &Connection) -> Result<bool, IntegrityError> {
    let removed = conn.execute("DELETE FROM equipment WHERE TRIM(equipment_id) = ''", [])?;
    if removed > 0 {
        tracing::warn!(removed, "integrity.equipment_rows_removed");
    }
    Ok(removed > 0)
}

pub fn equipment_record_is_sound(record: &EquipmentRecord) -> bool {
    !record.equipment_id.trim().is_empty()
}

pub fn plan_record_is_sound(record: &PlanRecord) -> bool {
    !record.plan_id.trim().is_empty() && !record.name.trim().is_empty()
}

fn check_equipment(record: &EquipmentRecord, now: OffsetDateTime, issues: &mut Vec<IntegrityIssue>) {
    if record.equipment_id.trim().is_empty() {
        issues.push(issue("equipment", "equipment_id", "identifier is empty"));
    }
    if record.name.trim().is_empty() {
        issues.push(issue("equipment", "name", "name is empty"));
    }
    check_timestamp("equipment", "date_added", &record.date_added, now, issues);
}

fn check_plan(record: &PlanRecord, now: OffsetDateTime, issues: &mut Vec<IntegrityIssue>) {
    if record.plan_id.trim().is_empty() {
        issues.push(issue("workout_plan", "plan_id", "identifier is empty"));
    }
    if record.name.trim().is_empty() {
        issues.push(issue("workout_plan", "name", "name is empty"));
    }
    if record.exercise_count < 0 {
        issues.push(issue(
            "workout_plan",
            "exercise_count",
            "exercise count is negative",
        ));
    }
    check_timestamp("workout_plan", "created_date", &record.created_date, now, issues);
    if let Some(last_used) = record.last_used_date.as_deref() {
        check_timestamp("workout_plan", "last_used_date", last_used, now, issues);
    }
    match payload::decode_plan_payload(&record.plan_data) {
        Ok(exercises) => {
            if exercises.len() as i64 != record.exercise_count {
                issues.push(issue(
                    "workout_plan",
                    "exercise_count",
                    "exercise count does not match embedded payload",
                ));
            }
        }
        Err(err) => {
            issues.push(IntegrityIssue {
                entity: "workout_plan",
                field: "plan_data",
                message: format!("embedded payload does not parse: {}", err),
            });
        }
    }
}

fn check_plan_exercise(record: &PlanExerciseRecord, issues: &mut Vec<IntegrityIssue>) {
    if record.exercise_id.trim().is_empty() {
        issues.push(issue("plan_exercise", "exercise_id", "identifier is empty"));
    }
    if record.sets < 0 {
        issues.push(issue("plan_exercise", "sets", "set count is negative"));
    }
    if record.reps < 0 {
        issues.push(issue("plan_exercise", "reps", "rep count is negative"));
    }
    if record.weight < 0.0 {
        issues.push(issue("plan_exercise", "weight", "weight is negative"));
    }
    if record.rest_time < 0 {
        issues.push(issue("plan_exercise", "rest_time", "rest time is negative"));
    }
    if let Some(sets_data) = record.sets_data.as_deref() {
        if let Err(err) = payload::decode_sets_payload(sets_data) {
            issues.push(IntegrityIssue {
                entity: "plan_exercise",
                field: "sets_data",
                message: format!("embedded payload does not parse: {}", err),
            });
        }
    }
}

fn check_metadata(record: &MetadataRecord, now: OffsetDateTime, issues: &mut Vec<IntegrityIssue>) {
    if record.exercise_id.trim().is_empty() {
        issues.push(issue("exercise_metadata", "exercise_id", "identifier is empty"));
    }
    if record.usage_count < 0 {
        issues.push(issue(
            "exercise_metadata",
            "usage_count",
            "usage count is negative",
        ));
    }
    if let Some(last_used) = record.last_used.as_deref() {
        check_timestamp("exercise_metadata", "last_used", last_used, now, issues);
    }
    if record.custom_weight.is_some_and(|weight| weight < 0.0) {
        issues.push(issue(
            "exercise_metadata",
            "custom_weight",
            "custom weight is negative",
        ));
    }
}

fn check_timestamp(
    entity: &'static str,
    field: &'static str,
    raw: &str,
    now: OffsetDateTime,
    issues: &mut Vec<IntegrityIssue>,
) {
    match db::parse_rfc3339(raw) {
        Ok(timestamp) => {
            if timestamp > now {
                issues.push(IntegrityIssue {
                    entity,
                    field,
                    message: format!("timestamp '{}' is in the future", raw),
                });
            }
        }
        Err(err) => {
            issues.push(IntegrityIssue {
                entity,
                field,
                message: format!("timestamp '{}' does not parse: {}", raw, err),
            });
        }
    }
}

fn issue(entity: &'static str, field: &'static str, message: &str) -> IntegrityIssue {
    IntegrityIssue {
        entity,
        field,
        message: message.to_string(),
    }
}
