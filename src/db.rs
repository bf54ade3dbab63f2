use std::path::PathBuf;
use std::time::Duration;

use rusqlite::{params, Connection, DatabaseName, OptionalExtension, Result};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub const CURRENT_SCHEMA_VERSION: i64 = 2;

struct SchemaMigration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const SCHEMA_MIGRATIONS: [SchemaMigration; 2] = [
    SchemaMigration {
        version: 1,
        name: "baseline_preferences_schema_v1",
        sql: r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS equipment (
    equipment_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    category TEXT NOT NULL,
    is_selected INTEGER NOT NULL DEFAULT 0,
    date_added TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS workout_plan (
    plan_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    created_date TEXT NOT NULL,
    last_used_date TEXT,
    exercise_count INTEGER NOT NULL DEFAULT 0,
    plan_data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS plan_exercise (
    exercise_id TEXT PRIMARY KEY,
    plan_id TEXT NOT NULL REFERENCES workout_plan(plan_id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    sets INTEGER NOT NULL DEFAULT 0,
    reps INTEGER NOT NULL DEFAULT 0,
    weight REAL NOT NULL DEFAULT 0,
    rest_time INTEGER NOT NULL DEFAULT 0,
    order_index INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS exercise_metadata (
    exercise_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    last_used TEXT,
    usage_count INTEGER NOT NULL DEFAULT 0,
    personal_notes TEXT,
    custom_weight REAL
);

CREATE INDEX IF NOT EXISTS idx_equipment_category ON equipment(category, name);
CREATE INDEX IF NOT EXISTS idx_workout_plan_last_used ON workout_plan(last_used_date);
CREATE INDEX IF NOT EXISTS idx_plan_exercise_plan ON plan_exercise(plan_id, order_index);
"#,
    },
    SchemaMigration {
        version: 2,
        name: "per_set_payload_v1",
        sql: r#"
ALTER TABLE plan_exercise ADD COLUMN sets_data TEXT;
"#,
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    InMemory,
    OnDisk(PathBuf),
}

/// Handle over the durable store: one connection plus the schema version
/// that was found on disk when it was opened. Fresh stores (and in-memory
/// stores, which exist only for test isolation) are stamped to the current
/// version immediately; existing stores keep their old schema until the
/// migration engine is invoked, so the backup step sees the pre-migration
/// file intact.
pub struct RecordStore {
    pub(crate) conn: Connection,
    pub(crate) location: StoreLocation,
    pub(crate) persisted_version: i64,
}

impl RecordStore {
    pub fn open(location: StoreLocation) -> Result<Self> {
        let conn = match &location {
            StoreLocation::InMemory => Connection::open_in_memory()?,
            StoreLocation::OnDisk(path) => Connection::open(path)?,
        };
        configure_for_speed(&conn)?;

        let mut store = Self {
            conn,
            location,
            persisted_version: 0,
        };
        store.persisted_version = persisted_schema_version(&store.conn)?;
        if matches!(store.location, StoreLocation::InMemory) || store.persisted_version == 0 {
            apply_schema_migrations(&mut store.conn)?;
            store.persisted_version = CURRENT_SCHEMA_VERSION;
        }
        Ok(store)
    }

    pub fn needs_migration(&self) -> bool {
        match self.location {
            StoreLocation::InMemory => false,
            StoreLocation::OnDisk(_) => self.persisted_version < CURRENT_SCHEMA_VERSION,
        }
    }

    pub fn persisted_version(&self) -> i64 {
        self.persisted_version
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn into_connection(self) -> Connection {
        self.conn
    }
}

fn configure_for_speed(conn: &Connection) -> Result<()> {
    conn.pragma_update(None::<DatabaseName>, "journal_mode", "WAL")?;
    conn.pragma_update(None::<DatabaseName>, "synchronous", "NORMAL")?;
    conn.pragma_update(None::<DatabaseName>, "foreign_keys", "ON")?;
    conn.pragma_update(None::<DatabaseName>, "temp_store", "MEMORY")?;
    conn.pragma_update(None::<DatabaseName>, "busy_timeout", 5000i64)?;
    conn.busy_timeout(Duration::from_millis(5000))?;
    Ok(())
}

pub(crate) fn persisted_schema_version(conn: &Connection) -> Result<i64> {
    let table_present: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_migrations')",
        [],
        |row| row.get(0),
    )?;
    if table_present == 0 {
        return Ok(0);
    }
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
}

pub(crate) fn apply_schema_migrations(conn: &mut Connection) -> Result<u32> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL
);
"#,
    )?;

    let mut applied = 0;
    for migration in SCHEMA_MIGRATIONS {
        let already_applied: Option<i64> = tx
            .query_row(
                "SELECT version FROM schema_migrations WHERE version = ?1",
                params![migration.version],
                |row| row.get(0),
            )
            .optional()?;

        if already_applied.is_some() {
            continue;
        }

        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![migration.version, migration.name, now_utc_rfc3339()],
        )?;
        applied += 1;
    }

    tx.execute(
        r#"
INSERT INTO meta (key, value)
VALUES ('schema_version', ?1)
ON CONFLICT(key) DO UPDATE SET value = excluded.value
"#,
        params![CURRENT_SCHEMA_VERSION.to_string()],
    )?;

    tx.commit()?;
    Ok(applied)
}

pub fn now_utc_rfc3339() -> String {
    format_rfc3339(OffsetDateTime::now_utc())
}

pub fn format_rfc3339(timestamp: OffsetDateTime) -> String {
    timestamp
        .format(&Rfc3339)
        .expect("RFC3339 formatting for UTC timestamp should never fail")
}

pub fn parse_rfc3339(raw: &str) -> std::result::Result<OffsetDateTime, time::error::Parse> {
    OffsetDateTime::parse(raw, &Rfc3339)
}

#[derive(Debug, Clone, PartialEq)]
pub struct EquipmentRecord {
    pub equipment_id: String,
    pub name: String,
    pub category: String,
    pub is_selected: bool,
    pub date_added: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanRecord {
    pub plan_id: String,
    pub name: String,
    pub created_date: String,
    pub last_used_date: Option<String>,
    pub exercise_count: i64,
    pub plan_data: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanExerciseRecord {
    pub exercise_id: String,
    pub plan_id: String,
    pub name: String,
    pub sets: i64,
    pub reps: i64,
    pub weight: f64,
    pub rest_time: i64,
    pub order_index: i64,
    pub sets_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRecord {
    pub exercise_id: String,
    pub name: String,
    pub last_used: Option<String>,
    pub usage_count: i64,
    pub personal_notes: Option<String>,
    pub custom_weight: Option<f64>,
}

pub fn upsert_equipment(conn: &Connection, record: &EquipmentRecord) -> Result<()> {
    conn.execute(
        r#"
INSERT INTO equipment (equipment_id, name, category, is_selected, date_added)
VALUES (?1, ?2, ?3, ?4, ?5)
ON CONFLICT(equipment_id) DO UPDATE SET
    name = excluded.name,
    category = excluded.category,
    is_selected = excluded.is_selected,
    date_added = COALESCE(equipment.date_added, excluded.date_added)
"#,
        params![
            record.equipment_id,
            record.name,
            record.category,
            record.is_selected,
            record.date_added
        ],
    )?;
    Ok(())
}

/// Replace-all bulk save: every prior equipment record is dropped and the
/// given collection becomes the full durable state, in one transaction.
/// An empty slice clears the table.
pub fn replace_all_equipment(conn: &mut Connection, records: &[EquipmentRecord]) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM equipment", [])?;
    for record in records {
        tx.execute(
            r#"
INSERT INTO equipment (equipment_id, name, category, is_selected, date_added)
VALUES (?1, ?2, ?3, ?4, ?5)
"#,
            params![
                record.equipment_id,
                record.name,
                record.category,
                record.is_selected,
                record.date_added
            ],
        )?;
    }
    tx.commit()
}

pub fn get_equipment(conn: &Connection, equipment_id: &str) -> Result<Option<EquipmentRecord>> {
    conn.query_row(
        r#"
SELECT equipment_id, name, category, is_selected, date_added
FROM equipment
WHERE equipment_id = ?1
"#,
        params![equipment_id],
        |row| {
            Ok(EquipmentRecord {
                equipment_id: row.get(0)?,
                name: row.get(1)?,
                category: row.get(2)?,
                is_selected: row.get(3)?,
                date_added: row.get(4)?,
            })
        },
    )
    .optional()
}

pub fn list_equipment(conn: &Connection) -> Result<Vec<EquipmentRecord>> {
    let mut stmt = conn.prepare(
        r#"
SELECT equipment_id, name, category, is_selected, date_added
FROM equipment
ORDER BY category ASC, name ASC, equipment_id ASC
"#,
    )?;

    let mut rows = stmt.query([])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(EquipmentRecord {
            equipment_id: row.get(0)?,
            name: row.get(1)?,
            category: row.get(2)?,
            is_selected: row.get(3)?,
            date_added: row.get(4)?,
        });
    }
    Ok(result)
}

pub fn count_equipment(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM equipment", [], |row| row.get(0))
}

pub fn count_selected_equipment(conn: &Connection) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM equipment WHERE is_selected = 1",
        [],
        |row| row.get(0),
    )
}

/// Upsert the plan row and replace its owned exercise rows as one unit of
/// work. The payload blob and the child rows are never committed separately.
pub fn upsert_plan(
    conn: &mut Connection,
    plan: &PlanRecord,
    exercises: &[PlanExerciseRecord],
) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute(
        r#"
INSERT INTO workout_plan (plan_id, name, created_date, last_used_date, exercise_count, plan_data)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(plan_id) DO UPDATE SET
    name = excluded.name,
    created_date = COALESCE(workout_plan.created_date, excluded.created_date),
    last_used_date = excluded.last_used_date,
    exercise_count = excluded.exercise_count,
    plan_data = excluded.plan_data
"#,
        params![
            plan.plan_id,
            plan.name,
            plan.created_date,
            plan.last_used_date,
            plan.exercise_count,
            plan.plan_data
        ],
    )?;
    tx.execute(
        "DELETE FROM plan_exercise WHERE plan_id = ?1",
        params![plan.plan_id],
    )?;
    for exercise in exercises {
        tx.execute(
            r#"
INSERT INTO plan_exercise
    (exercise_id, plan_id, name, sets, reps, weight, rest_time, order_index, sets_data)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
"#,
            params![
                exercise.exercise_id,
                exercise.plan_id,
                exercise.name,
                exercise.sets,
                exercise.reps,
                exercise.weight,
                exercise.rest_time,
                exercise.order_index,
                exercise.sets_data
            ],
        )?;
    }
    tx.commit()
}

pub fn get_plan(conn: &Connection, plan_id: &str) -> Result<Option<PlanRecord>> {
    conn.query_row(
        r#"
SELECT plan_id, name, created_date, last_used_date, exercise_count, plan_data
FROM workout_plan
WHERE plan_id = ?1
"#,
        params![plan_id],
        |row| {
            Ok(PlanRecord {
                plan_id: row.get(0)?,
                name: row.get(1)?,
                created_date: row.get(2)?,
                last_used_date: row.get(3)?,
                exercise_count: row.get(4)?,
                plan_data: row.get(5)?,
            })
        },
    )
    .optional()
}

pub fn list_plans(conn: &Connection) -> Result<Vec<PlanRecord>> {
    let mut stmt = conn.prepare(
        r#"
SELECT plan_id, name, created_date, last_used_date, exercise_count, plan_data
FROM workout_plan
ORDER BY last_used_date IS NULL ASC, last_used_date DESC, created_date DESC, plan_id ASC
"#,
    )?;

    let mut rows = stmt.query([])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(PlanRecord {
            plan_id: row.get(0)?,
            name: row.get(1)?,
            created_date: row.get(2)?,
            last_used_date: row.get(3)?,
            exercise_count: row.get(4)?,
            plan_data: row.get(5)?,
        });
    }
    Ok(result)
}

pub fn delete_plan(conn: &Connection, plan_id: &str) -> Result<usize> {
    conn.execute(
        "DELETE FROM workout_plan WHERE plan_id = ?1",
        params![plan_id],
    )
}

pub fn update_plan_name(conn: &Connection, plan_id: &str, name: &str) -> Result<usize> {
    conn.execute(
        "UPDATE workout_plan SET name = ?2 WHERE plan_id = ?1",
        params![plan_id, name],
    )
}

pub fn update_plan_last_used(conn: &Connection, plan_id: &str, last_used: &str) -> Result<usize> {
    conn.execute(
        "UPDATE workout_plan SET last_used_date = ?2 WHERE plan_id = ?1",
        params![plan_id, last_used],
    )
}

pub fn count_plans(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM workout_plan", [], |row| row.get(0))
}

fn plan_exercise_from_row(row: &rusqlite::Row<'_>) -> Result<PlanExerciseRecord> {
    Ok(PlanExerciseRecord {
        exercise_id: row.get(0)?,
        plan_id: row.get(1)?,
        name: row.get(2)?,
        sets: row.get(3)?,
        reps: row.get(4)?,
        weight: row.get(5)?,
        rest_time: row.get(6)?,
        order_index: row.get(7)?,
        sets_data: row.get(8)?,
    })
}

pub fn list_plan_exercises(conn: &Connection, plan_id: &str) -> Result<Vec<PlanExerciseRecord>> {
    let mut stmt = conn.prepare(
        r#"
SELECT exercise_id, plan_id, name, sets, reps, weight, rest_time, order_index, sets_data
FROM plan_exercise
WHERE plan_id = ?1
ORDER BY order_index ASC, exercise_id ASC
"#,
    )?;

    let mut rows = stmt.query(params![plan_id])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(plan_exercise_from_row(row)?);
    }
    Ok(result)
}

pub fn list_all_plan_exercises(conn: &Connection) -> Result<Vec<PlanExerciseRecord>> {
    let mut stmt = conn.prepare(
        r#"
SELECT exercise_id, plan_id, name, sets, reps, weight, rest_time, order_index, sets_data
FROM plan_exercise
ORDER BY plan_id ASC, order_index ASC, exercise_id ASC
"#,
    )?;

    let mut rows = stmt.query([])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(plan_exercise_from_row(row)?);
    }
    Ok(result)
}

pub fn count_plan_exercises(conn: &Connection, plan_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM plan_exercise WHERE plan_id = ?1",
        params![plan_id],
        |row| row.get(0),
    )
}

pub fn upsert_exercise_metadata(conn: &Connection, record: &MetadataRecord) -> Result<()> {
    conn.execute(
        r#"
INSERT INTO exercise_metadata
    (exercise_id, name, last_used, usage_count, personal_notes, custom_weight)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(exercise_id) DO UPDATE SET
    name = excluded.name,
    last_used = excluded.last_used,
    usage_count = excluded.usage_count,
    personal_notes = excluded.personal_notes,
    custom_weight = excluded.custom_weight
"#,
        params![
            record.exercise_id,
            record.name,
            record.last_used,
            record.usage_count,
            record.personal_notes,
            record.custom_weight
        ],
    )?;
    Ok(())
}

/// Lazy-create-then-increment: the first usage inserts the record, every
/// later usage bumps the count and refreshes `last_used`.
pub fn record_exercise_usage(
    conn: &Connection,
    exercise_id: &str,
    name: &str,
    used_at: &str,
) -> Result<()> {
    conn.execute(
        r#"
INSERT INTO exercise_metadata (exercise_id, name, last_used, usage_count)
VALUES (?1, ?2, ?3, 1)
ON CONFLICT(exercise_id) DO UPDATE SET
    usage_count = exercise_metadata.usage_count + 1,
    last_used = excluded.last_used
"#,
        params![exercise_id, name, used_at],
    )?;
    Ok(())
}

pub fn get_exercise_metadata(
    conn: &Connection,
    exercise_id: &str,
) -> Result<Option<MetadataRecord>> {
    conn.query_row(
        r#"
SELECT exercise_id, name, last_used, usage_count, personal_notes, custom_weight
FROM exercise_metadata
WHERE exercise_id = ?1
"#,
        params![exercise_id],
        |row| {
            Ok(MetadataRecord {
                exercise_id: row.get(0)?,
                name: row.get(1)?,
                last_used: row.get(2)?,
                usage_count: row.get(3)?,
                personal_notes: row.get(4)?,
                custom_weight: row.get(5)?,
            })
        },
    )
    .optional()
}

pub fn list_exercise_metadata(conn: &Connection) -> Result<Vec<MetadataRecord>> {
    let mut stmt = conn.prepare(
        r#"
SELECT exercise_id, name, last_used, usage_count, personal_notes, custom_weight
FROM exercise_metadata
ORDER BY exercise_id ASC
"#,
    )?;

    let mut rows = stmt.query([])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        result.push(MetadataRecord {
            exercise_id: row.get(0)?,
            name: row.get(1)?,
            last_used: row.get(2)?,
            usage_count: row.get(3)?,
            personal_notes: row.get(4)?,
            custom_weight: row.get(5)?,
        });
    }
    Ok(result)
}

pub fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM meta WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        r#"
INSERT INTO meta (key, value)
VALUES (?1, ?2)
ON CONFLICT(key) DO UPDATE SET value = excluded.value
"#,
        params![key, value],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests;
