use std::error::Error;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::db::{self, RecordStore, StoreLocation, CURRENT_SCHEMA_VERSION};
use crate::domain::plan::{validate_legacy, ExerciseSet};
use crate::payload;

#[derive(Debug)]
pub enum MigrationError {
    StoreNotFound(PathBuf),
    BackupFailed(std::io::Error),
    DataCorruption(String),
    ValidationFailed { exercise: String, message: String },
    MigrationFailed(rusqlite::Error),
}

impl fmt::Display for MigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationError::StoreNotFound(path) => {
                write!(f, "store file '{}' not found", path.display())
            }
            MigrationError::BackupFailed(err) => {
                write!(f, "pre-migration backup failed: {}", err)
            }
            MigrationError::DataCorruption(message) => {
                write!(f, "store data is corrupted: {}", message)
            }
            MigrationError::ValidationFailed { exercise, message } => {
                write!(f, "exercise '{}' has invalid legacy data: {}", exercise, message)
            }
            MigrationError::MigrationFailed(err) => write!(f, "migration failed: {}", err),
        }
    }
}

impl Error for MigrationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MigrationError::BackupFailed(err) => Some(err),
            MigrationError::MigrationFailed(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for MigrationError {
    fn from(value: rusqlite::Error) -> Self {
        MigrationError::MigrationFailed(value)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct MigrationSummary {
    pub examined: u64,
    pub migrated: u64,
    pub skipped: u64,
}

/// Schema upgrade driver for on-disk stores. The pre-migration backup copy
/// is written and verified before any destructive step; a failed backup
/// aborts the whole pass. Returns whether anything was migrated.
pub fn perform_migration_if_needed(store: &mut RecordStore) -> Result<bool, MigrationError> {
    check_version_marker(&store.conn)?;
    if !store.needs_migration() {
        return Ok(false);
    }

    let from_version = store.persisted_version;
    if let StoreLocation::OnDisk(path) = &store.location {
        if !path.exists() {
            return Err(MigrationError::StoreNotFound(path.clone()));
        }
        let backup_path = backup_store_file(path, from_version)?;
        tracing::info!(backup = %backup_path.display(), "migration.backup_written");
    }

    db::apply_schema_migrations(&mut store.conn)?;
    let summary = migrate_legacy_exercises(&mut store.conn)?;
    store.persisted_version = CURRENT_SCHEMA_VERSION;

    tracing::info!(
        from_version,
        to_version = CURRENT_SCHEMA_VERSION,
        migrated = summary.migrated,
        skipped = summary.skipped,
        "migration.completed"
    );
    Ok(true)
}

/// One-directional upgrade of legacy scalar prescriptions into the per-set
/// representation. Runs as one transaction: a single invalid record aborts
/// the whole batch and nothing is committed. Records that already carry a
/// per-set payload are skipped, so re-running is a no-op.
pub fn migrate_legacy_exercises(conn: &mut Connection) -> Result<MigrationSummary, MigrationError> {
    let tx = conn.transaction()?;
    let mut summary = MigrationSummary::default();

    let legacy_rows: Vec<(String, String, i64, i64, f64)> = {
        let mut stmt = tx.prepare(
            r#"
SELECT exercise_id, name, sets, reps, weight
FROM plan_exercise
WHERE sets_data IS NULL
ORDER BY plan_id ASC, order_index ASC, exercise_id ASC
"#,
        )?;
        let mut rows = stmt.query([])?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            result.push((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
            ));
        }
        result
    };

    summary.skipped = {
        let already_migrated: i64 = tx.query_row(
            "SELECT COUNT(*) FROM plan_exercise WHERE sets_data IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        already_migrated as u64
    };
    summary.examined = summary.skipped + legacy_rows.len() as u64;

    for (exercise_id, name, sets, reps, weight) in legacy_rows {
        if sets < 0 || reps < 0 {
            return Err(MigrationError::ValidationFailed {
                exercise: name,
                message: "set and rep counts must not be negative".to_string(),
            });
        }
        validate_legacy(sets as u32, reps as u32, weight).map_err(|err| {
            MigrationError::ValidationFailed {
                exercise: name.clone(),
                message: err.message,
            }
        })?;

        let synthesized: Vec<ExerciseSet> = (1..=sets as u32)
            .map(|set_number| ExerciseSet::new(set_number, reps as u32, weight))
            .collect();
        let sets_data = payload::encode_sets_payload(&synthesized)
            .map_err(|err| MigrationError::DataCorruption(err.to_string()))?;
        let average_weight =
            synthesized.iter().map(|set| set.weight).sum::<f64>() / synthesized.len() as f64;

        tx.execute(
            r#"
UPDATE plan_exercise
SET sets_data = ?2, sets = ?3, weight = ?4
WHERE exercise_id = ?1
"#,
            params![exercise_id, sets_data, synthesized.len() as i64, average_weight],
        )?;
        summary.migrated += 1;
    }

    tx.commit()?;
    Ok(summary)
}

fn check_version_marker(conn: &Connection) -> Result<(), MigrationError> {
    let marker = match db::get_meta(conn, "schema_version") {
        Ok(value) => value,
        // A store without a meta table yet has no marker to corrupt.
        Err(_) => return Ok(()),
    };
    if let Some(raw) = marker {
        raw.parse::<i64>().map_err(|_| {
            MigrationError::DataCorruption(format!("schema_version marker '{}' is not a number", raw))
        })?;
    }
    Ok(())
}

fn backup_store_file(path: &Path, from_version: i64) -> Result<PathBuf, MigrationError> {
    let backup_path = path.with_extension(format!("v{from_version}.backup"));
    std::fs::copy(path, &backup_path).map_err(MigrationError::BackupFailed)?;

    let original = file_digest(path).map_err(MigrationError::BackupFailed)?;
    let copied = file_digest(&backup_path).map_err(MigrationError::BackupFailed)?;
    if original != copied {
        return Err(MigrationError::BackupFailed(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("backup digest mismatch for '{}'", backup_path.display()),
        )));
    }
    Ok(backup_path)
}

fn file_digest(path: &Path) -> std::io::Result<[u8; 32]> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use rusqlite::params;

    use crate::db::{
        self, list_plan_exercises, now_utc_rfc3339, upsert_plan, PlanExerciseRecord, PlanRecord,
        RecordStore, StoreLocation,
    };
    use crate::domain::plan::SetType;
    use crate::payload::decode_sets_payload;

    use super::{migrate_legacy_exercises, MigrationError};

    fn open_store() -> RecordStore {
        RecordStore::open(StoreLocation::InMemory).expect("in-memory store should open")
    }

    fn seed_plan(store: &mut RecordStore, exercises: &[PlanExerciseRecord]) {
        let plan = PlanRecord {
            plan_id: "plan-1".to_string(),
            name: "Full Body".to_string(),
            created_date: now_utc_rfc3339(),
            last_used_date: None,
            exercise_count: exercises.len() as i64,
            plan_data: "[]".to_string(),
        };
        upsert_plan(store.connection_mut(), &plan, exercises).expect("seed should work");
    }

    fn legacy_exercise(id: &str, name: &str, sets: i64, reps: i64, weight: f64) -> PlanExerciseRecord {
        PlanExerciseRecord {
            exercise_id: id.to_string(),
            plan_id: "plan-1".to_string(),
            name: name.to_string(),
            sets,
            reps,
            weight,
            rest_time: 60,
            order_index: 0,
            sets_data: None,
        }
    }

    #[test]
    fn migrates_bodyweight_exercise_into_three_normal_sets() {
        let mut store = open_store();
        seed_plan(&mut store, &[legacy_exercise("ex-1", "Push-Up", 3, 12, 0.0)]);

        let summary = migrate_legacy_exercises(store.connection_mut())
            .expect("valid legacy data should migrate");
        assert_eq!(summary.examined, 1);
        assert_eq!(summary.migrated, 1);
        assert_eq!(summary.skipped, 0);

        let rows = list_plan_exercises(store.connection(), "plan-1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sets, 3);
        assert_eq!(rows[0].weight, 0.0);

        let sets_data = rows[0].sets_data.as_deref().expect("payload should be written");
        let sets = decode_sets_payload(sets_data).expect("payload should decode");
        assert_eq!(sets.len(), 3);
        for (index, set) in sets.iter().enumerate() {
            assert_eq!(set.set_number as usize, index + 1);
            assert_eq!(set.reps, 12);
            assert_eq!(set.weight, 0.0);
            assert_eq!(set.set_type, SetType::Normal);
            assert!(!set.is_completed);
        }
    }

    #[test]
    fn second_run_is_a_no_op() {
        let mut store = open_store();
        seed_plan(&mut store, &[legacy_exercise("ex-1", "Squat", 4, 8, 80.0)]);

        migrate_legacy_exercises(store.connection_mut()).expect("first run should migrate");
        let first_state = list_plan_exercises(store.connection(), "plan-1").unwrap();

        let summary =
            migrate_legacy_exercises(store.connection_mut()).expect("second run should pass");
        assert_eq!(summary.migrated, 0);
        assert_eq!(summary.skipped, 1);

        let second_state = list_plan_exercises(store.connection(), "plan-1").unwrap();
        assert_eq!(second_state, first_state);
    }

    #[test]
    fn invalid_legacy_data_fails_and_writes_nothing() {
        let mut store = open_store();
        seed_plan(
            &mut store,
            &[
                legacy_exercise("ex-1", "Push-Up", 3, 12, 0.0),
                legacy_exercise("ex-2", "Ghost Lift", 0, 12, 0.0),
            ],
        );

        let err = migrate_legacy_exercises(store.connection_mut())
            .expect_err("zero set count should abort the batch");
        match err {
            MigrationError::ValidationFailed { exercise, .. } => {
                assert_eq!(exercise, "Ghost Lift");
            }
            other => panic!("unexpected error: {other}"),
        }

        // The batch aborted, so even the valid sibling stays untouched.
        for row in list_plan_exercises(store.connection(), "plan-1").unwrap() {
            assert!(row.sets_data.is_none());
        }
    }

    #[test]
    fn averages_weight_across_synthesized_sets() {
        let mut store = open_store();
        seed_plan(&mut store, &[legacy_exercise("ex-1", "Bench Press", 5, 5, 62.5)]);

        migrate_legacy_exercises(store.connection_mut()).expect("migration should pass");
        let rows = list_plan_exercises(store.connection(), "plan-1").unwrap();
        assert_eq!(rows[0].sets, 5);
        assert_eq!(rows[0].weight, 62.5);
    }

    #[test]
    fn negative_scalar_rows_are_rejected() {
        let mut store = open_store();
        seed_plan(&mut store, &[]);
        store
            .connection()
            .execute(
                concat!(
                    "INSERT INTO plan_exercise ",
                    "(exercise_id, plan_id, name, sets, reps, weight, rest_time, order_index) ",
                    "VALUES ('ex-1', 'plan-1', 'Broken Row', -1, 10, 20.0, 60, 0)"
                ),
                params![],
            )
            .unwrap();

        let err = migrate_legacy_exercises(store.connection_mut())
            .expect_err("negative set count should abort");
        assert!(matches!(err, MigrationError::ValidationFailed { .. }));
        assert_eq!(db::count_plan_exercises(store.connection(), "plan-1").unwrap(), 1);
    }
}
