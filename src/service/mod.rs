//! Async facade over the record store. All storage work runs on blocking
//! threads behind a single connection lock; reads of the published state are
//! lock-cheap and never touch the database. Operations that exceed the
//! configured timeout surface `OperationTimeout` to the caller, but the
//! underlying write still runs to completion, so a timed-out save may have
//! landed.

mod cache;
mod classify;
mod errors;

pub use cache::PlanCache;
pub use classify::{classify_decode_error, classify_storage_error, StorageOp};
pub use errors::{PreferencesError, RecoveryAction, Severity};

use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use rusqlite::Connection;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::catalog::{CatalogError, CatalogRegistry};
use crate::config::ServiceConfig;
use crate::db::{
    self, EquipmentRecord, MetadataRecord, PlanExerciseRecord, PlanRecord, RecordStore,
};
use crate::domain::equipment::{normalize_notes, EquipmentItem};
use crate::domain::metadata::ExerciseMetadata;
use crate::domain::plan::{
    is_half_step_weight, validate_legacy, ExerciseData, Prescription, WorkoutPlanData,
};
use crate::filtering::{self, CatalogFilter, ExerciseAvailability};
use crate::integrity::{self, IntegrityError, IntegrityReport};
use crate::migration::{self, MigrationError};
use crate::payload;

const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Snapshot of what callers see between operations. Published after every
/// successful mutation; reading it never blocks on the database.
#[derive(Debug, Clone, Default)]
pub struct ServiceState {
    pub selected_equipment: Vec<EquipmentItem>,
    pub saved_plans: Vec<WorkoutPlanData>,
    pub is_loading: bool,
    pub progress_message: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct MaintenanceSummary {
    pub corrupt_equipment_removed: bool,
    pub exercises_migrated: u64,
}

#[derive(Clone)]
pub struct PreferencesService {
    conn: Arc<tokio::sync::Mutex<Connection>>,
    state: Arc<RwLock<ServiceState>>,
    plan_cache: Arc<Mutex<PlanCache>>,
    catalog: Arc<CatalogRegistry>,
    op_timeout: Duration,
}

impl PreferencesService {
    pub fn from_store(store: RecordStore) -> Result<Self, PreferencesError> {
        let catalog = CatalogRegistry::load().map_err(catalog_load_error)?;
        Ok(Self {
            conn: Arc::new(tokio::sync::Mutex::new(store.into_connection())),
            state: Arc::new(RwLock::new(ServiceState::default())),
            plan_cache: Arc::new(Mutex::new(PlanCache::default())),
            catalog: Arc::new(catalog),
            op_timeout: DEFAULT_OPERATION_TIMEOUT,
        })
    }

    pub fn with_config(store: RecordStore, config: &ServiceConfig) -> Result<Self, PreferencesError> {
        let catalog = CatalogRegistry::load().map_err(catalog_load_error)?;
        Ok(Self {
            conn: Arc::new(tokio::sync::Mutex::new(store.into_connection())),
            state: Arc::new(RwLock::new(ServiceState::default())),
            plan_cache: Arc::new(Mutex::new(PlanCache::with_capacity(
                config.plan_cache_capacity,
            ))),
            catalog: Arc::new(catalog),
            op_timeout: config.operation_timeout(),
        })
    }

    pub fn catalog(&self) -> &CatalogRegistry {
        &self.catalog
    }

    pub fn state_snapshot(&self) -> ServiceState {
        read_lock(&self.state).clone()
    }

    pub fn is_loading(&self) -> bool {
        read_lock(&self.state).is_loading
    }

    /// Loads the durable equipment collection and publishes the selected
    /// subset. Rows with a blank id are skipped rather than failing the
    /// whole load; they are cleaned up by the next maintenance pass.
    pub async fn load_selected_equipment(&self) -> Result<Vec<EquipmentItem>, PreferencesError> {
        self.begin_loading("Loading equipment");
        let result = self
            .with_conn(StorageOp::Load, |conn| db::list_equipment(conn))
            .await;
        let records = match result {
            Ok(records) => records,
            Err(err) => {
                self.end_loading();
                return Err(err);
            }
        };

        let mut items = Vec::new();
        for record in records {
            if !integrity::equipment_record_is_sound(&record) {
                tracing::warn!(name = %record.name, "equipment.skipped_unsound");
                continue;
            }
            items.push(equipment_item_from_record(&record));
        }
        let selected: Vec<EquipmentItem> = items
            .iter()
            .filter(|item| item.is_selected)
            .cloned()
            .collect();

        {
            let mut state = write_lock(&self.state);
            state.selected_equipment = selected.clone();
            state.is_loading = false;
            state.progress_message = None;
        }
        tracing::debug!(total = items.len(), selected = selected.len(), "equipment.loaded");
        Ok(items)
    }

    /// Loads every saved plan, most recently used first. A plan whose
    /// payload no longer decodes is logged and skipped; one corrupt blob
    /// must not hide the rest of the library.
    pub async fn load_saved_plans(&self) -> Result<Vec<WorkoutPlanData>, PreferencesError> {
        self.begin_loading("Loading workout plans");
        let result = self
            .with_conn(StorageOp::Load, |conn| db::list_plans(conn))
            .await;
        let records = match result {
            Ok(records) => records,
            Err(err) => {
                self.end_loading();
                return Err(err);
            }
        };

        let mut plans = Vec::new();
        for record in records {
            if !integrity::plan_record_is_sound(&record) {
                tracing::warn!(plan_id = %record.plan_id, "plan.skipped_unsound");
                continue;
            }
            match plan_data_from_record(&record) {
                Ok(plan) => plans.push(plan),
                Err(err) => {
                    tracing::warn!(plan_id = %record.plan_id, error = %err, "plan.skipped_undecodable");
                }
            }
        }

        {
            let mut state = write_lock(&self.state);
            state.saved_plans = plans.clone();
            state.is_loading = false;
            state.progress_message = None;
        }
        tracing::debug!(count = plans.len(), "plans.loaded");
        Ok(plans)
    }

    /// Replace-all save of the equipment collection. The given items become
    /// the entire durable state; an empty slice clears it.
    pub async fn save_equipment_selection(
        &self,
        items: &[EquipmentItem],
    ) -> Result<(), PreferencesError> {
        if let Some(bad) = items.iter().find(|item| !item.has_valid_id()) {
            tracing::warn!(name = %bad.name, "equipment.rejected_blank_id");
            return Err(PreferencesError::InvalidData {
                field: "equipment id".to_string(),
            });
        }

        let records: Vec<EquipmentRecord> =
            items.iter().map(equipment_record_from_item).collect();
        self.with_conn(StorageOp::Save, move |conn| {
            db::replace_all_equipment(conn, &records)
        })
        .await?;

        let selected: Vec<EquipmentItem> = items
            .iter()
            .filter(|item| item.is_selected)
            .cloned()
            .collect();
        write_lock(&self.state).selected_equipment = selected;
        tracing::info!(count = items.len(), "equipment.replaced");
        Ok(())
    }

    /// Point update of one equipment item, preserving its original
    /// `date_added` if it already exists.
    pub async fn update_equipment_selection(
        &self,
        item: &EquipmentItem,
    ) -> Result<(), PreferencesError> {
        if !item.has_valid_id() {
            return Err(PreferencesError::InvalidData {
                field: "equipment id".to_string(),
            });
        }

        let record = equipment_record_from_item(item);
        self.with_conn(StorageOp::Save, move |conn| {
            db::upsert_equipment(conn, &record)
        })
        .await?;

        let mut state = write_lock(&self.state);
        state.selected_equipment.retain(|existing| existing.id != item.id);
        if item.is_selected {
            state.selected_equipment.push(item.clone());
            state
                .selected_equipment
                .sort_by(|left, right| (&left.category, &left.name).cmp(&(&right.category, &right.name)));
        }
        Ok(())
    }

    /// Flips the selection flag on a stored item. Unlike the upsert path,
    /// the item must already exist.
    pub async fn set_equipment_selected(
        &self,
        equipment_id: &str,
        selected: bool,
    ) -> Result<(), PreferencesError> {
        let id = equipment_id.to_string();
        let updated = self
            .with_conn(StorageOp::Save, move |conn| {
                let existing = db::get_equipment(conn, &id)?;
                match existing {
                    Some(mut record) => {
                        record.is_selected = selected;
                        db::upsert_equipment(conn, &record)?;
                        Ok(Some(record))
                    }
                    None => Ok(None),
                }
            })
            .await?;

        let record = updated
            .ok_or_else(|| PreferencesError::EquipmentNotFound(equipment_id.to_string()))?;
        let item = equipment_item_from_record(&record);
        let mut state = write_lock(&self.state);
        state.selected_equipment.retain(|existing| existing.id != item.id);
        if item.is_selected {
            state.selected_equipment.push(item);
        }
        Ok(())
    }

    /// Persists a plan: header row, opaque payload, and child exercise rows
    /// in one transaction. Order indexes are renumbered to list position
    /// before anything is written.
    pub async fn save_plan(&self, mut plan: WorkoutPlanData) -> Result<WorkoutPlanData, PreferencesError> {
        if plan.name.trim().is_empty() {
            return Err(PreferencesError::InvalidData {
                field: "plan name".to_string(),
            });
        }
        for exercise in &plan.exercises {
            match &exercise.prescription {
                Prescription::Legacy {
                    sets,
                    reps,
                    weight,
                    rest_time: _,
                } => {
                    if let Err(err) = validate_legacy(*sets, *reps, *weight) {
                        return Err(PreferencesError::InvalidData {
                            field: err.field.to_string(),
                        });
                    }
                }
                Prescription::PerSet { sets } => {
                    if sets.is_empty() {
                        return Err(PreferencesError::InvalidData {
                            field: "sets".to_string(),
                        });
                    }
                    if sets.iter().any(|set| !set.completion_consistent()) {
                        return Err(PreferencesError::InvalidData {
                            field: "set completion".to_string(),
                        });
                    }
                }
            }
        }
        plan.name = plan.name.trim().to_string();
        plan.normalize_order_indexes();

        let (record, exercises) = plan_record_from_data(&plan)?;
        let plan_id = plan.id;
        let exercise_count = plan.exercises.len();
        self.with_conn(StorageOp::Save, move |conn| {
            db::upsert_plan(conn, &record, &exercises)
        })
        .await?;

        lock_cache(&self.plan_cache).insert(plan.clone());
        {
            let mut state = write_lock(&self.state);
            state.saved_plans.retain(|existing| existing.id != plan.id);
            state.saved_plans.push(plan.clone());
            sort_plans_for_display(&mut state.saved_plans);
        }
        tracing::info!(plan_id = %plan_id, exercises = exercise_count, "plan.saved");
        Ok(plan)
    }

    pub async fn save_plan_named(
        &self,
        name: &str,
        exercises: Vec<ExerciseData>,
    ) -> Result<WorkoutPlanData, PreferencesError> {
        let plan = WorkoutPlanData::new(name).with_exercises(exercises);
        self.save_plan(plan).await
    }

    /// Fire-and-forget save. Failures are logged, not surfaced; callers who
    /// need the outcome should use `save_plan` and await it.
    pub fn save_plan_in_background(&self, plan: WorkoutPlanData) -> tokio::task::JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let plan_id = plan.id;
            if let Err(err) = service.save_plan(plan).await {
                tracing::warn!(plan_id = %plan_id, error = %err, "plan.background_save_failed");
            }
        })
    }

    pub async fn delete_plan(&self, plan_id: Uuid) -> Result<(), PreferencesError> {
        let key = plan_id.to_string();
        let deleted = self
            .with_conn(StorageOp::Save, move |conn| db::delete_plan(conn, &key))
            .await?;
        if deleted == 0 {
            return Err(PreferencesError::PlanNotFound(plan_id));
        }

        lock_cache(&self.plan_cache).invalidate(&plan_id);
        write_lock(&self.state)
            .saved_plans
            .retain(|existing| existing.id != plan_id);
        tracing::info!(plan_id = %plan_id, "plan.deleted");
        Ok(())
    }

    pub async fn rename_plan(&self, plan_id: Uuid, name: &str) -> Result<(), PreferencesError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(PreferencesError::InvalidData {
                field: "plan name".to_string(),
            });
        }

        let key = plan_id.to_string();
        let new_name = trimmed.to_string();
        let renamed = {
            let new_name = new_name.clone();
            self.with_conn(StorageOp::Save, move |conn| {
                db::update_plan_name(conn, &key, &new_name)
            })
            .await?
        };
        if renamed == 0 {
            return Err(PreferencesError::PlanNotFound(plan_id));
        }

        lock_cache(&self.plan_cache).invalidate(&plan_id);
        let mut state = write_lock(&self.state);
        if let Some(plan) = state
            .saved_plans
            .iter_mut()
            .find(|existing| existing.id == plan_id)
        {
            plan.name = new_name;
        }
        Ok(())
    }

    pub async fn mark_plan_as_used(&self, plan_id: Uuid) -> Result<(), PreferencesError> {
        let used_at = OffsetDateTime::now_utc();
        let key = plan_id.to_string();
        let stamp = db::format_rfc3339(used_at);
        let updated = self
            .with_conn(StorageOp::Save, move |conn| {
                db::update_plan_last_used(conn, &key, &stamp)
            })
            .await?;
        if updated == 0 {
            return Err(PreferencesError::PlanNotFound(plan_id));
        }

        lock_cache(&self.plan_cache).invalidate(&plan_id);
        let mut state = write_lock(&self.state);
        if let Some(plan) = state
            .saved_plans
            .iter_mut()
            .find(|existing| existing.id == plan_id)
        {
            plan.mark_used(used_at);
        }
        sort_plans_for_display(&mut state.saved_plans);
        Ok(())
    }

    /// Full plan detail, served from the bounded cache when possible.
    pub async fn plan_detail(&self, plan_id: Uuid) -> Result<WorkoutPlanData, PreferencesError> {
        if let Some(plan) = lock_cache(&self.plan_cache).get(&plan_id) {
            return Ok(plan);
        }

        let key = plan_id.to_string();
        let record = self
            .with_conn(StorageOp::Load, move |conn| db::get_plan(conn, &key))
            .await?
            .ok_or(PreferencesError::PlanNotFound(plan_id))?;
        let plan = plan_data_from_record(&record)?;
        lock_cache(&self.plan_cache).insert(plan.clone());
        Ok(plan)
    }

    /// Setup is complete once at least one piece of equipment is selected.
    pub async fn check_setup_completion(&self) -> Result<bool, PreferencesError> {
        let selected = self
            .with_conn(StorageOp::Load, |conn| db::count_selected_equipment(conn))
            .await?;
        Ok(selected > 0)
    }

    pub async fn mark_setup_complete(&self) -> Result<(), PreferencesError> {
        if !self.check_setup_completion().await? {
            return Err(PreferencesError::InvalidData {
                field: "equipment selection".to_string(),
            });
        }
        self.with_conn(StorageOp::Save, |conn| {
            db::set_meta(conn, "setup_complete", "true")
        })
        .await
    }

    /// Startup pass: sweep corrupt equipment rows, then upgrade any legacy
    /// exercise prescriptions still in the store. Plans are never silently
    /// repaired; a corrupt plan surfaces through validation instead.
    pub async fn run_startup_maintenance(&self) -> Result<MaintenanceSummary, PreferencesError> {
        self.with_conn_app(|conn| {
            let removed = integrity::detect_and_handle_corruption(conn)
                .map_err(integrity_error_to_preferences)?;
            let migrated = migration::migrate_legacy_exercises(conn)
                .map_err(migration_error_to_preferences)?;
            Ok(MaintenanceSummary {
                corrupt_equipment_removed: removed,
                exercises_migrated: migrated.migrated,
            })
        })
        .await
    }

    /// Strict validation: the first structural violation fails the call.
    /// On success the full scan report is returned for logging.
    pub async fn validate_data_integrity(&self) -> Result<IntegrityReport, PreferencesError> {
        self.with_conn_app(|conn| {
            integrity::validate_data_integrity(conn).map_err(integrity_error_to_preferences)?;
            integrity::scan(conn).map_err(integrity_error_to_preferences)
        })
        .await
    }

    pub async fn detect_and_handle_corruption(&self) -> Result<bool, PreferencesError> {
        self.with_conn_app(|conn| {
            integrity::detect_and_handle_corruption(conn).map_err(integrity_error_to_preferences)
        })
        .await
    }

    /// Sheds cached plan details down to `target` entries, least recently
    /// used first. Only memory is dropped; durable rows are untouched.
    pub fn handle_memory_pressure(&self, target: usize) {
        let mut cache = lock_cache(&self.plan_cache);
        let before = cache.len();
        cache.evict_under_pressure(target);
        if cache.len() < before {
            tracing::debug!(evicted = before - cache.len(), "plan_cache.pressure_eviction");
        }
    }

    /// Catalog filtered and annotated against the published equipment
    /// selection. Purely in-memory; never touches the store.
    pub fn available_exercises(&self, filter: &CatalogFilter) -> Vec<ExerciseAvailability<'_>> {
        let owned: HashSet<String> = read_lock(&self.state)
            .selected_equipment
            .iter()
            .map(|item| item.name.clone())
            .collect();
        filtering::display_order(self.catalog.exercises(), filter, &owned)
    }

    pub async fn most_used_exercises(
        &self,
        limit: usize,
    ) -> Result<Vec<ExerciseMetadata>, PreferencesError> {
        let mut entries = self.load_exercise_metadata().await?;
        filtering::rank_most_used(&mut entries);
        entries.truncate(limit);
        Ok(entries)
    }

    pub async fn recently_used_exercises(
        &self,
        limit: usize,
    ) -> Result<Vec<ExerciseMetadata>, PreferencesError> {
        let mut entries = self.load_exercise_metadata().await?;
        filtering::rank_recently_used(&mut entries);
        entries.retain(|entry| entry.last_used.is_some());
        entries.truncate(limit);
        Ok(entries)
    }

    pub async fn record_exercise_usage(&self, exercise_id: &str) -> Result<(), PreferencesError> {
        let exercise = self
            .catalog
            .require(exercise_id)
            .map_err(|_| PreferencesError::InvalidData {
                field: "exercise id".to_string(),
            })?;
        let id = exercise.id.clone();
        let name = exercise.name.clone();
        let used_at = db::now_utc_rfc3339();
        self.with_conn(StorageOp::Save, move |conn| {
            db::record_exercise_usage(conn, &id, &name, &used_at)
        })
        .await
    }

    pub async fn set_exercise_notes(
        &self,
        exercise_id: &str,
        notes: Option<&str>,
    ) -> Result<(), PreferencesError> {
        let normalized = normalize_notes(notes);
        self.update_metadata(exercise_id, move |record| {
            record.personal_notes = normalized;
        })
        .await
    }

    pub async fn set_custom_weight(
        &self,
        exercise_id: &str,
        weight: Option<f64>,
    ) -> Result<(), PreferencesError> {
        if let Some(value) = weight {
            if !is_half_step_weight(value) {
                return Err(PreferencesError::InvalidData {
                    field: "custom weight".to_string(),
                });
            }
        }
        self.update_metadata(exercise_id, move |record| {
            record.custom_weight = weight;
        })
        .await
    }

    async fn update_metadata(
        &self,
        exercise_id: &str,
        apply: impl FnOnce(&mut MetadataRecord) + Send + 'static,
    ) -> Result<(), PreferencesError> {
        let exercise = self
            .catalog
            .require(exercise_id)
            .map_err(|_| PreferencesError::InvalidData {
                field: "exercise id".to_string(),
            })?;
        let id = exercise.id.clone();
        let name = exercise.name.clone();
        self.with_conn(StorageOp::Save, move |conn| {
            let mut record = db::get_exercise_metadata(conn, &id)?.unwrap_or(MetadataRecord {
                exercise_id: id.clone(),
                name,
                last_used: None,
                usage_count: 0,
                personal_notes: None,
                custom_weight: None,
            });
            apply(&mut record);
            db::upsert_exercise_metadata(conn, &record)
        })
        .await
    }

    async fn load_exercise_metadata(&self) -> Result<Vec<ExerciseMetadata>, PreferencesError> {
        let records = self
            .with_conn(StorageOp::Load, |conn| db::list_exercise_metadata(conn))
            .await?;
        Ok(records.iter().map(metadata_from_record).collect())
    }

    fn begin_loading(&self, message: &str) {
        let mut state = write_lock(&self.state);
        state.is_loading = true;
        state.progress_message = Some(message.to_string());
    }

    fn end_loading(&self) {
        let mut state = write_lock(&self.state);
        state.is_loading = false;
        state.progress_message = None;
    }

    /// Runs a storage closure on a blocking thread under the connection
    /// lock, bounded by the operation timeout. A timeout abandons the wait,
    /// not the work.
    async fn with_conn<T, F>(&self, op: StorageOp, f: F) -> Result<T, PreferencesError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let join = tokio::task::spawn_blocking(move || {
            let mut guard = conn.blocking_lock();
            f(&mut guard)
        });
        match tokio::time::timeout(self.op_timeout, join).await {
            Ok(Ok(result)) => result.map_err(|err| classify_storage_error(op, &err)),
            Ok(Err(join_err)) => Err(match op {
                StorageOp::Load => PreferencesError::LoadFailure(join_err.to_string()),
                StorageOp::Save => PreferencesError::SaveFailure(join_err.to_string()),
            }),
            Err(_) => Err(PreferencesError::OperationTimeout),
        }
    }

    async fn with_conn_app<T, F>(&self, f: F) -> Result<T, PreferencesError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, PreferencesError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let join = tokio::task::spawn_blocking(move || {
            let mut guard = conn.blocking_lock();
            f(&mut guard)
        });
        match tokio::time::timeout(self.op_timeout, join).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(PreferencesError::SaveFailure(join_err.to_string())),
            Err(_) => Err(PreferencesError::OperationTimeout),
        }
    }
}

fn catalog_load_error(err: CatalogError) -> PreferencesError {
    PreferencesError::DataCorruption(err.to_string())
}

fn integrity_error_to_preferences(err: IntegrityError) -> PreferencesError {
    match err {
        IntegrityError::Db(db_err) => classify_storage_error(StorageOp::Load, &db_err),
        IntegrityError::ValidationFailed {
            entity,
            field,
            message,
        } => PreferencesError::DataCorruption(format!("{entity}.{field}: {message}")),
    }
}

fn migration_error_to_preferences(err: MigrationError) -> PreferencesError {
    tracing::error!(error = %err, "migration.failed");
    PreferencesError::MigrationFailure {
        version: db::CURRENT_SCHEMA_VERSION,
    }
}

fn equipment_record_from_item(item: &EquipmentItem) -> EquipmentRecord {
    EquipmentRecord {
        equipment_id: item.id.clone(),
        name: item.name.clone(),
        category: item.category.clone(),
        is_selected: item.is_selected,
        date_added: db::now_utc_rfc3339(),
    }
}

fn equipment_item_from_record(record: &EquipmentRecord) -> EquipmentItem {
    EquipmentItem {
        id: record.equipment_id.clone(),
        name: record.name.clone(),
        category: record.category.clone(),
        is_selected: record.is_selected,
    }
}

fn plan_record_from_data(
    plan: &WorkoutPlanData,
) -> Result<(PlanRecord, Vec<PlanExerciseRecord>), PreferencesError> {
    let plan_data =
        payload::encode_plan_payload(&plan.exercises).map_err(|err| classify_decode_error(&err))?;

    let mut exercises = Vec::with_capacity(plan.exercises.len());
    for exercise in &plan.exercises {
        let record = match &exercise.prescription {
            Prescription::Legacy {
                sets,
                reps,
                weight,
                rest_time,
            } => PlanExerciseRecord {
                exercise_id: exercise.id.to_string(),
                plan_id: plan.id.to_string(),
                name: exercise.name.clone(),
                sets: i64::from(*sets),
                reps: i64::from(*reps),
                weight: *weight,
                rest_time: i64::from(*rest_time),
                order_index: i64::from(exercise.order_index),
                sets_data: None,
            },
            Prescription::PerSet { sets } => PlanExerciseRecord {
                exercise_id: exercise.id.to_string(),
                plan_id: plan.id.to_string(),
                name: exercise.name.clone(),
                sets: sets.len() as i64,
                reps: sets.first().map(|set| i64::from(set.reps)).unwrap_or(0),
                weight: exercise.average_weight(),
                rest_time: 0,
                order_index: i64::from(exercise.order_index),
                sets_data: Some(
                    payload::encode_sets_payload(sets)
                        .map_err(|err| classify_decode_error(&err))?,
                ),
            },
        };
        exercises.push(record);
    }

    let record = PlanRecord {
        plan_id: plan.id.to_string(),
        name: plan.name.clone(),
        created_date: db::format_rfc3339(plan.created_date),
        last_used_date: plan.last_used_date.map(db::format_rfc3339),
        exercise_count: plan.exercises.len() as i64,
        plan_data,
    };
    Ok((record, exercises))
}

fn plan_data_from_record(record: &PlanRecord) -> Result<WorkoutPlanData, PreferencesError> {
    let id = record
        .plan_id
        .parse::<Uuid>()
        .map_err(|err| PreferencesError::DataCorruption(format!("plan id: {err}")))?;
    let exercises =
        payload::decode_plan_payload(&record.plan_data).map_err(|err| classify_decode_error(&err))?;
    let created_date = db::parse_rfc3339(&record.created_date)
        .map_err(|err| PreferencesError::DataCorruption(format!("created date: {err}")))?;
    let last_used_date = match &record.last_used_date {
        Some(raw) => Some(
            db::parse_rfc3339(raw)
                .map_err(|err| PreferencesError::DataCorruption(format!("last used date: {err}")))?,
        ),
        None => None,
    };

    Ok(WorkoutPlanData {
        id,
        name: record.name.clone(),
        exercises,
        created_date,
        last_used_date,
    })
}

fn metadata_from_record(record: &MetadataRecord) -> ExerciseMetadata {
    let last_used = record.last_used.as_deref().and_then(|raw| {
        db::parse_rfc3339(raw)
            .map_err(|err| {
                tracing::warn!(exercise_id = %record.exercise_id, error = %err, "metadata.bad_timestamp");
                err
            })
            .ok()
    });
    ExerciseMetadata {
        exercise_id: record.exercise_id.clone(),
        name: record.name.clone(),
        last_used,
        usage_count: record.usage_count.max(0) as u64,
        personal_notes: record.personal_notes.clone(),
        custom_weight: record.custom_weight,
    }
}

fn sort_plans_for_display(plans: &mut [WorkoutPlanData]) {
    plans.sort_by(|left, right| {
        right
            .last_used_date
            .cmp(&left.last_used_date)
            .then_with(|| right.created_date.cmp(&left.created_date))
            .then_with(|| left.id.cmp(&right.id))
    });
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn lock_cache(cache: &Mutex<PlanCache>) -> std::sync::MutexGuard<'_, PlanCache> {
    match cache.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use crate::db::{RecordStore, StoreLocation};
    use crate::domain::equipment::EquipmentItem;
    use crate::domain::plan::{ExerciseData, Prescription};
    use crate::filtering::CatalogFilter;

    use super::{PreferencesError, PreferencesService};

    fn service() -> PreferencesService {
        let store = RecordStore::open(StoreLocation::InMemory).expect("store should open");
        PreferencesService::from_store(store).expect("service should build")
    }

    fn dumbbells() -> EquipmentItem {
        EquipmentItem::new("dumbbells", "Dumbbells", "Free Weights").selected()
    }

    fn legacy_exercise(name: &str) -> ExerciseData {
        ExerciseData::new(
            name,
            Prescription::Legacy {
                sets: 3,
                reps: 10,
                weight: 20.0,
                rest_time: 90,
            },
        )
    }

    #[tokio::test]
    async fn equipment_save_replaces_the_prior_selection() {
        let service = service();
        service
            .save_equipment_selection(&[dumbbells(), EquipmentItem::new("bench", "Bench", "Benches")])
            .await
            .expect("first save should work");

        let kettlebell = EquipmentItem::new("kettlebell", "Kettlebell", "Free Weights").selected();
        service
            .save_equipment_selection(&[kettlebell])
            .await
            .expect("second save should work");

        let items = service
            .load_selected_equipment()
            .await
            .expect("load should work");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "kettlebell");
        assert_eq!(service.state_snapshot().selected_equipment.len(), 1);
    }

    #[tokio::test]
    async fn upserting_dumbbells_flips_selection_without_duplicating() {
        let service = service();
        let unselected = EquipmentItem::new("dumbbells", "Dumbbells", "Free Weights");
        service
            .save_equipment_selection(&[unselected.clone()])
            .await
            .expect("seed save should work");

        service
            .update_equipment_selection(&unselected.selected())
            .await
            .expect("upsert should work");

        let items = service
            .load_selected_equipment()
            .await
            .expect("load should work");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "dumbbells");
        assert!(items[0].is_selected);
    }

    #[tokio::test]
    async fn memory_pressure_eviction_keeps_durable_plans() {
        let service = service();
        let mut ids = Vec::new();
        for index in 0..5 {
            let plan = service
                .save_plan_named(&format!("Plan {index}"), vec![legacy_exercise("Squat")])
                .await
                .unwrap();
            ids.push(plan.id);
        }

        service.handle_memory_pressure(0);
        for id in ids {
            // A cold cache still serves every plan from the store.
            service.plan_detail(id).await.expect("plan should reload");
        }
    }

    #[tokio::test]
    async fn blank_equipment_id_is_rejected_before_the_store_is_touched() {
        let service = service();
        service
            .save_equipment_selection(&[dumbbells()])
            .await
            .expect("seed save should work");

        let bad = EquipmentItem {
            id: "  ".to_string(),
            name: "Ghost".to_string(),
            category: "None".to_string(),
            is_selected: true,
        };
        let err = service
            .save_equipment_selection(&[bad])
            .await
            .expect_err("blank id should be rejected");
        assert!(matches!(err, PreferencesError::InvalidData { .. }));

        // The prior selection survives the rejected save.
        let items = service.load_selected_equipment().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "dumbbells");
    }

    #[tokio::test]
    async fn saved_plan_round_trips_through_detail_lookup() {
        let service = service();
        let plan = service
            .save_plan_named("Push Day", vec![legacy_exercise("Bench Press")])
            .await
            .expect("save should work");

        let detail = service.plan_detail(plan.id).await.expect("detail should load");
        assert_eq!(detail, plan);
        assert!(detail.order_indexes_dense());

        let listed = service.load_saved_plans().await.expect("listing should work");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, plan.id);
    }

    #[tokio::test]
    async fn zero_set_legacy_prescription_never_reaches_the_store() {
        let service = service();
        let zero_sets = ExerciseData::new(
            "Bench Press",
            Prescription::Legacy {
                sets: 0,
                reps: 12,
                weight: 0.0,
                rest_time: 60,
            },
        );
        let err = service
            .save_plan_named("Push Day", vec![zero_sets])
            .await
            .expect_err("zero sets should be rejected");
        assert_eq!(
            err,
            PreferencesError::InvalidData {
                field: "sets".to_string()
            }
        );

        let zero_reps = ExerciseData::new(
            "Bench Press",
            Prescription::Legacy {
                sets: 3,
                reps: 0,
                weight: 0.0,
                rest_time: 60,
            },
        );
        let err = service
            .save_plan_named("Push Day", vec![zero_reps])
            .await
            .expect_err("zero reps should be rejected");
        assert!(matches!(err, PreferencesError::InvalidData { .. }));
        assert!(service.load_saved_plans().await.unwrap().is_empty());

        // Nothing poisoned the store, so startup maintenance stays clean.
        let summary = service
            .run_startup_maintenance()
            .await
            .expect("maintenance should pass");
        assert_eq!(summary.exercises_migrated, 0);
    }

    #[tokio::test]
    async fn empty_plan_name_is_rejected() {
        let service = service();
        let err = service
            .save_plan_named("   ", vec![legacy_exercise("Bench Press")])
            .await
            .expect_err("blank name should be rejected");
        assert_eq!(
            err,
            PreferencesError::InvalidData {
                field: "plan name".to_string()
            }
        );
        assert!(service.load_saved_plans().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn renaming_a_missing_plan_reports_not_found() {
        let service = service();
        let plan = service
            .save_plan_named("Leg Day", vec![legacy_exercise("Squat")])
            .await
            .unwrap();

        let missing = Uuid::now_v7();
        let err = service
            .rename_plan(missing, "New Name")
            .await
            .expect_err("missing plan should not rename");
        assert_eq!(err, PreferencesError::PlanNotFound(missing));

        let err = service
            .rename_plan(plan.id, "   ")
            .await
            .expect_err("blank name should be rejected");
        assert!(matches!(err, PreferencesError::InvalidData { .. }));
        assert_eq!(service.plan_detail(plan.id).await.unwrap().name, "Leg Day");
    }

    #[tokio::test]
    async fn deleting_a_missing_plan_leaves_the_library_alone() {
        let service = service();
        service
            .save_plan_named("Pull Day", vec![legacy_exercise("Dumbbell Row")])
            .await
            .unwrap();

        let err = service
            .delete_plan(Uuid::now_v7())
            .await
            .expect_err("missing plan should not delete");
        assert!(matches!(err, PreferencesError::PlanNotFound(_)));
        assert_eq!(service.load_saved_plans().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn marking_a_plan_used_reorders_the_library() {
        let service = service();
        let older = service
            .save_plan_named("Older", vec![legacy_exercise("Squat")])
            .await
            .unwrap();
        let newer = service
            .save_plan_named("Newer", vec![legacy_exercise("Bench Press")])
            .await
            .unwrap();

        service.mark_plan_as_used(older.id).await.expect("mark should work");
        let listed = service.load_saved_plans().await.unwrap();
        assert_eq!(listed[0].id, older.id);
        assert!(listed[0].last_used_date.is_some());
        assert_eq!(listed[1].id, newer.id);
    }

    #[tokio::test]
    async fn setup_completes_only_with_a_selection() {
        let service = service();
        assert!(!service.check_setup_completion().await.unwrap());

        let err = service
            .mark_setup_complete()
            .await
            .expect_err("setup without equipment should be rejected");
        assert!(matches!(err, PreferencesError::InvalidData { .. }));

        service
            .save_equipment_selection(&[dumbbells()])
            .await
            .unwrap();
        assert!(service.check_setup_completion().await.unwrap());
        service
            .mark_setup_complete()
            .await
            .expect("setup with equipment should complete");
    }

    #[tokio::test]
    async fn background_save_lands_before_the_handle_resolves() {
        let service = service();
        let plan = crate::domain::plan::WorkoutPlanData::new("Background Day")
            .with_exercises(vec![legacy_exercise("Plank")]);
        let plan_id = plan.id;

        let handle = service.save_plan_in_background(plan);
        handle.await.expect("background task should not panic");

        let detail = service.plan_detail(plan_id).await.expect("plan should exist");
        assert_eq!(detail.name, "Background Day");
    }

    #[tokio::test]
    async fn concurrent_equipment_updates_all_land() {
        let service = service();
        let mut handles = Vec::new();
        for index in 0..8 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                let item = EquipmentItem::new(
                    &format!("item-{index}"),
                    &format!("Item {index}"),
                    "Misc",
                )
                .selected();
                service.update_equipment_selection(&item).await
            }));
        }
        for handle in handles {
            handle
                .await
                .expect("task should not panic")
                .expect("update should succeed");
        }

        let items = service.load_selected_equipment().await.unwrap();
        assert_eq!(items.len(), 8);
    }

    #[tokio::test]
    async fn usage_recording_feeds_the_most_used_ranking() {
        let service = service();
        for _ in 0..3 {
            service.record_exercise_usage("push-up").await.unwrap();
        }
        service.record_exercise_usage("barbell-squat").await.unwrap();

        let ranked = service.most_used_exercises(10).await.unwrap();
        assert_eq!(ranked[0].exercise_id, "push-up");
        assert_eq!(ranked[0].usage_count, 3);

        let recent = service.recently_used_exercises(10).await.unwrap();
        assert!(!recent.is_empty());
        assert!(recent.iter().all(|entry| entry.last_used.is_some()));
    }

    #[tokio::test]
    async fn unknown_catalog_exercise_is_invalid_data() {
        let service = service();
        let err = service
            .record_exercise_usage("nonexistent")
            .await
            .expect_err("unknown exercise should be rejected");
        assert!(matches!(err, PreferencesError::InvalidData { .. }));
    }

    #[tokio::test]
    async fn custom_weight_must_land_on_a_half_step() {
        let service = service();
        let err = service
            .set_custom_weight("push-up", Some(20.25))
            .await
            .expect_err("quarter steps should be rejected");
        assert!(matches!(err, PreferencesError::InvalidData { .. }));

        service
            .set_custom_weight("push-up", Some(22.5))
            .await
            .expect("half steps should be accepted");
    }

    #[tokio::test]
    async fn availability_tracks_the_published_selection() {
        let service = service();
        let all = service.available_exercises(&CatalogFilter::default());
        let bench_press = all
            .iter()
            .find(|entry| entry.exercise.id == "bench-press")
            .expect("bench press should be in the catalog");
        assert!(!bench_press.is_available);

        service
            .save_equipment_selection(&[
                EquipmentItem::new("barbell", "Barbell", "Free Weights").selected(),
                EquipmentItem::new("bench", "Bench", "Benches").selected(),
            ])
            .await
            .unwrap();

        let all = service.available_exercises(&CatalogFilter::default());
        let bench_press = all
            .iter()
            .find(|entry| entry.exercise.id == "bench-press")
            .expect("bench press should be in the catalog");
        assert!(bench_press.is_available);
        assert!(bench_press.missing_equipment.is_empty());
    }

    #[tokio::test]
    async fn missing_equipment_rows_flow_through_set_equipment_selected() {
        let service = service();
        let err = service
            .set_equipment_selected("ghost", true)
            .await
            .expect_err("missing equipment should be reported");
        assert_eq!(err, PreferencesError::EquipmentNotFound("ghost".to_string()));
    }

    #[tokio::test]
    async fn startup_maintenance_on_a_clean_store_is_a_no_op() {
        let service = service();
        service
            .save_plan_named("Push Day", vec![legacy_exercise("Bench Press")])
            .await
            .unwrap();

        let summary = service
            .run_startup_maintenance()
            .await
            .expect("maintenance should pass");
        assert!(!summary.corrupt_equipment_removed);
        // The legacy exercise row seeded above gets upgraded in place.
        assert_eq!(summary.exercises_migrated, 1);

        let report = service
            .validate_data_integrity()
            .await
            .expect("clean store should validate");
        assert!(report.ok());
    }
}
