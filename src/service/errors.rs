use std::error::Error;
use std::fmt;

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a caller should do about a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    Retry,
    UseDefaults,
    ResetData,
    Refresh,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PreferencesError {
    DataCorruption(String),
    SaveFailure(String),
    LoadFailure(String),
    InvalidData { field: String },
    PlanNotFound(Uuid),
    EquipmentNotFound(String),
    InsufficientStorage,
    NetworkUnavailable,
    OperationTimeout,
    ConcurrentModification,
    MigrationFailure { version: i64 },
}

impl fmt::Display for PreferencesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreferencesError::DataCorruption(message) => {
                write!(f, "stored data is corrupted: {}", message)
            }
            PreferencesError::SaveFailure(message) => write!(f, "save failed: {}", message),
            PreferencesError::LoadFailure(message) => write!(f, "load failed: {}", message),
            PreferencesError::InvalidData { field } => {
                write!(f, "invalid value for {}", field)
            }
            PreferencesError::PlanNotFound(plan_id) => {
                write!(f, "workout plan '{}' not found", plan_id)
            }
            PreferencesError::EquipmentNotFound(equipment_id) => {
                write!(f, "equipment '{}' not found", equipment_id)
            }
            PreferencesError::InsufficientStorage => {
                write!(f, "not enough storage space to save data")
            }
            PreferencesError::NetworkUnavailable => write!(f, "network is unavailable"),
            PreferencesError::OperationTimeout => write!(f, "operation timed out"),
            PreferencesError::ConcurrentModification => {
                write!(f, "data was modified by another operation")
            }
            PreferencesError::MigrationFailure { version } => {
                write!(f, "migration to schema version {} failed", version)
            }
        }
    }
}

impl Error for PreferencesError {}

impl PreferencesError {
    pub fn severity(&self) -> Severity {
        match self {
            PreferencesError::DataCorruption(_) => Severity::Critical,
            PreferencesError::SaveFailure(_) => Severity::Error,
            PreferencesError::LoadFailure(_) => Severity::Error,
            PreferencesError::InvalidData { .. } => Severity::Error,
            PreferencesError::PlanNotFound(_) => Severity::Error,
            PreferencesError::EquipmentNotFound(_) => Severity::Error,
            PreferencesError::InsufficientStorage => Severity::Critical,
            PreferencesError::NetworkUnavailable => Severity::Warning,
            PreferencesError::OperationTimeout => Severity::Warning,
            PreferencesError::ConcurrentModification => Severity::Error,
            PreferencesError::MigrationFailure { .. } => Severity::Critical,
        }
    }

    /// Whether the caller can do anything useful about the failure.
    /// Corruption and failed migrations are beyond repair from the caller's
    /// side; everything else has a sensible reaction.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            PreferencesError::DataCorruption(_) | PreferencesError::MigrationFailure { .. }
        )
    }

    /// Whether retrying the same operation unchanged may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PreferencesError::SaveFailure(_)
                | PreferencesError::LoadFailure(_)
                | PreferencesError::NetworkUnavailable
                | PreferencesError::OperationTimeout
                | PreferencesError::ConcurrentModification
        )
    }

    pub fn recovery_action(&self) -> RecoveryAction {
        match self {
            PreferencesError::DataCorruption(_) => RecoveryAction::ResetData,
            PreferencesError::SaveFailure(_) => RecoveryAction::Retry,
            PreferencesError::LoadFailure(_) => RecoveryAction::Retry,
            PreferencesError::InvalidData { .. } => RecoveryAction::UseDefaults,
            PreferencesError::PlanNotFound(_) => RecoveryAction::Refresh,
            PreferencesError::EquipmentNotFound(_) => RecoveryAction::Refresh,
            PreferencesError::InsufficientStorage => RecoveryAction::UseDefaults,
            PreferencesError::NetworkUnavailable => RecoveryAction::Retry,
            PreferencesError::OperationTimeout => RecoveryAction::Retry,
            PreferencesError::ConcurrentModification => RecoveryAction::Refresh,
            PreferencesError::MigrationFailure { .. } => RecoveryAction::ResetData,
        }
    }
}
