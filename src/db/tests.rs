use rusqlite::params;

use super::{
    count_equipment, count_plan_exercises, count_selected_equipment, get_equipment, get_meta,
    get_plan, list_equipment, list_plan_exercises, now_utc_rfc3339, record_exercise_usage,
    replace_all_equipment, upsert_equipment, upsert_plan, EquipmentRecord, PlanExerciseRecord,
    PlanRecord, RecordStore, StoreLocation, CURRENT_SCHEMA_VERSION,
};

fn open_store() -> RecordStore {
    RecordStore::open(StoreLocation::InMemory).expect("in-memory store should open")
}

fn equipment(id: &str, name: &str, category: &str, selected: bool) -> EquipmentRecord {
    EquipmentRecord {
        equipment_id: id.to_string(),
        name: name.to_string(),
        category: category.to_string(),
        is_selected: selected,
        date_added: now_utc_rfc3339(),
    }
}

fn plan(id: &str, name: &str) -> PlanRecord {
    PlanRecord {
        plan_id: id.to_string(),
        name: name.to_string(),
        created_date: now_utc_rfc3339(),
        last_used_date: None,
        exercise_count: 1,
        plan_data: "[]".to_string(),
    }
}

fn plan_exercise(id: &str, plan_id: &str, name: &str) -> PlanExerciseRecord {
    PlanExerciseRecord {
        exercise_id: id.to_string(),
        plan_id: plan_id.to_string(),
        name: name.to_string(),
        sets: 3,
        reps: 10,
        weight: 40.0,
        rest_time: 90,
        order_index: 0,
        sets_data: None,
    }
}

fn table_exists(conn: &rusqlite::Connection, table_name: &str) -> bool {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1)",
            params![table_name],
            |row| row.get(0),
        )
        .expect("table existence query should be readable");
    exists == 1
}

#[test]
fn configures_connection_pragmas() {
    let store = open_store();
    let conn = store.connection();

    let foreign_keys: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .expect("foreign_keys pragma should be readable");
    assert_eq!(foreign_keys, 1);

    let temp_store: i64 = conn
        .query_row("PRAGMA temp_store;", [], |row| row.get(0))
        .expect("temp_store pragma should be readable");
    assert_eq!(temp_store, 2);

    let busy_timeout: i64 = conn
        .query_row("PRAGMA busy_timeout;", [], |row| row.get(0))
        .expect("busy_timeout pragma should be readable");
    assert_eq!(busy_timeout, 5000);
}

#[test]
fn initializes_required_tables_and_schema_version() {
    let store = open_store();
    let conn = store.connection();

    let tables = [
        "schema_migrations",
        "meta",
        "equipment",
        "workout_plan",
        "plan_exercise",
        "exercise_metadata",
    ];
    for table in tables {
        assert!(
            table_exists(conn, table),
            "expected table '{}' to exist",
            table
        );
    }

    let schema_version = get_meta(conn, "schema_version")
        .expect("meta should be readable")
        .expect("schema_version should be recorded");
    assert_eq!(schema_version, CURRENT_SCHEMA_VERSION.to_string());
}

#[test]
fn in_memory_store_never_needs_migration() {
    let store = open_store();
    assert!(!store.needs_migration());
    assert_eq!(store.persisted_version(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn replace_all_equipment_supersedes_prior_records() {
    let mut store = open_store();
    let old_set = vec![
        equipment("dumbbells", "Dumbbells", "Free Weights", true),
        equipment("barbell", "Barbell", "Free Weights", false),
    ];
    replace_all_equipment(store.connection_mut(), &old_set).expect("first save should work");
    assert_eq!(count_equipment(store.connection()).unwrap(), 2);

    let new_set = vec![equipment("kettlebell", "Kettlebell", "Free Weights", true)];
    replace_all_equipment(store.connection_mut(), &new_set).expect("second save should work");

    let remaining = list_equipment(store.connection()).expect("listing should work");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].equipment_id, "kettlebell");
    assert!(get_equipment(store.connection(), "dumbbells")
        .unwrap()
        .is_none());
}

#[test]
fn replace_all_with_empty_input_clears_equipment() {
    let mut store = open_store();
    replace_all_equipment(
        store.connection_mut(),
        &[equipment("bench", "Bench", "Benches", true)],
    )
    .expect("seed save should work");

    replace_all_equipment(store.connection_mut(), &[]).expect("clearing save should work");
    assert_eq!(count_equipment(store.connection()).unwrap(), 0);
}

#[test]
fn equipment_upsert_updates_selection_and_preserves_date_added() {
    let store = open_store();
    let mut record = equipment("dumbbells", "Dumbbells", "Free Weights", false);
    record.date_added = "2026-01-01T00:00:00Z".to_string();
    upsert_equipment(store.connection(), &record).expect("insert should work");

    record.is_selected = true;
    record.date_added = now_utc_rfc3339();
    upsert_equipment(store.connection(), &record).expect("update should work");

    let stored = get_equipment(store.connection(), "dumbbells")
        .expect("lookup should work")
        .expect("record should exist");
    assert!(stored.is_selected);
    assert_eq!(stored.date_added, "2026-01-01T00:00:00Z");
    assert_eq!(count_selected_equipment(store.connection()).unwrap(), 1);
}

#[test]
fn lists_equipment_sorted_by_category_then_name() {
    let store = open_store();
    for record in [
        equipment("pullup-bar", "Pull-Up Bar", "Bodyweight", true),
        equipment("dumbbells", "Dumbbells", "Free Weights", true),
        equipment("barbell", "Barbell", "Free Weights", true),
    ] {
        upsert_equipment(store.connection(), &record).expect("insert should work");
    }

    let listed = list_equipment(store.connection()).expect("listing should work");
    let ids: Vec<&str> = listed
        .iter()
        .map(|record| record.equipment_id.as_str())
        .collect();
    assert_eq!(ids, ["pullup-bar", "barbell", "dumbbells"]);
}

#[test]
fn plan_upsert_replaces_child_exercise_rows() {
    let mut store = open_store();
    let record = plan("plan-1", "Push Day");
    let first_children = vec![
        plan_exercise("ex-1", "plan-1", "Bench Press"),
        plan_exercise("ex-2", "plan-1", "Push-Up"),
    ];
    upsert_plan(store.connection_mut(), &record, &first_children).expect("insert should work");
    assert_eq!(count_plan_exercises(store.connection(), "plan-1").unwrap(), 2);

    let second_children = vec![plan_exercise("ex-3", "plan-1", "Overhead Press")];
    upsert_plan(store.connection_mut(), &record, &second_children).expect("update should work");

    let children = list_plan_exercises(store.connection(), "plan-1").expect("listing should work");
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].exercise_id, "ex-3");
}

#[test]
fn deleting_a_plan_cascades_to_owned_exercises() {
    let mut store = open_store();
    upsert_plan(
        store.connection_mut(),
        &plan("plan-1", "Leg Day"),
        &[plan_exercise("ex-1", "plan-1", "Squat")],
    )
    .expect("insert should work");

    let deleted = super::delete_plan(store.connection(), "plan-1").expect("delete should work");
    assert_eq!(deleted, 1);
    assert!(get_plan(store.connection(), "plan-1").unwrap().is_none());
    assert_eq!(count_plan_exercises(store.connection(), "plan-1").unwrap(), 0);
}

#[test]
fn plan_upsert_preserves_created_date() {
    let mut store = open_store();
    let mut record = plan("plan-1", "Pull Day");
    record.created_date = "2026-03-01T08:00:00Z".to_string();
    upsert_plan(store.connection_mut(), &record, &[]).expect("insert should work");

    record.created_date = now_utc_rfc3339();
    record.name = "Pull Day v2".to_string();
    upsert_plan(store.connection_mut(), &record, &[]).expect("update should work");

    let stored = get_plan(store.connection(), "plan-1")
        .expect("lookup should work")
        .expect("plan should exist");
    assert_eq!(stored.created_date, "2026-03-01T08:00:00Z");
    assert_eq!(stored.name, "Pull Day v2");
}

#[test]
fn usage_recording_creates_then_increments() {
    let store = open_store();
    record_exercise_usage(store.connection(), "cat-1", "Bench Press", "2026-04-01T10:00:00Z")
        .expect("first usage should insert");
    record_exercise_usage(store.connection(), "cat-1", "Bench Press", "2026-04-02T10:00:00Z")
        .expect("second usage should update");

    let stored = super::get_exercise_metadata(store.connection(), "cat-1")
        .expect("lookup should work")
        .expect("metadata should exist");
    assert_eq!(stored.usage_count, 2);
    assert_eq!(stored.last_used.as_deref(), Some("2026-04-02T10:00:00Z"));
}
