//! Local persistence for workout preferences: equipment selection, a plan
//! library with per-set tracking, exercise usage bookkeeping, and the
//! built-in exercise catalog. Everything lives in one SQLite store; the
//! async [`service::PreferencesService`] is the intended entry point.

pub mod catalog;
pub mod config;
pub mod db;
pub mod domain;
pub mod filtering;
pub mod integrity;
pub mod migration;
pub mod payload;
pub mod service;

pub use catalog::{CatalogExercise, CatalogRegistry, Difficulty, MuscleGroup};
pub use config::ServiceConfig;
pub use db::{RecordStore, StoreLocation, CURRENT_SCHEMA_VERSION};
pub use domain::equipment::EquipmentItem;
pub use domain::metadata::ExerciseMetadata;
pub use domain::plan::{ExerciseData, ExerciseSet, Prescription, SetType, WorkoutPlanData};
pub use filtering::{CatalogFilter, ExerciseAvailability};
pub use integrity::{IntegrityIssue, IntegrityReport};
pub use migration::{perform_migration_if_needed, MigrationSummary};
pub use service::{PreferencesError, PreferencesService, RecoveryAction, ServiceState, Severity};
