//! Maps low-level storage failures onto the service error taxonomy. The
//! structured SQLite codes are checked first; message sniffing is the
//! fallback for errors that arrive as plain text.

use rusqlite::ffi::ErrorCode;

use super::errors::PreferencesError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOp {
    Load,
    Save,
}

pub fn classify_storage_error(op: StorageOp, err: &rusqlite::Error) -> PreferencesError {
    match err {
        rusqlite::Error::SqliteFailure(failure, message) => match failure.code {
            ErrorCode::DiskFull => PreferencesError::InsufficientStorage,
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                PreferencesError::ConcurrentModification
            }
            ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase => {
                PreferencesError::DataCorruption(err.to_string())
            }
            _ => classify_message(
                op,
                message.as_deref().unwrap_or("sqlite failure"),
                err,
            ),
        },
        rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::IntegralValueOutOfRange(..)
        | rusqlite::Error::InvalidColumnType(..) => {
            PreferencesError::DataCorruption(err.to_string())
        }
        _ => classify_message(op, &err.to_string(), err),
    }
}

pub fn classify_decode_error(err: &serde_json::Error) -> PreferencesError {
    PreferencesError::DataCorruption(err.to_string())
}

fn classify_message(op: StorageOp, message: &str, err: &rusqlite::Error) -> PreferencesError {
    let lowered = message.to_lowercase();
    if lowered.contains("disk") && lowered.contains("full") || lowered.contains("no space") {
        return PreferencesError::InsufficientStorage;
    }
    if lowered.contains("timeout") || lowered.contains("timed out") {
        return PreferencesError::OperationTimeout;
    }
    if lowered.contains("network") || lowered.contains("offline") || lowered.contains("unreachable")
    {
        return PreferencesError::NetworkUnavailable;
    }
    if lowered.contains("locked") || lowered.contains("busy") || lowered.contains("conflict") {
        return PreferencesError::ConcurrentModification;
    }
    if lowered.contains("corrupt") || lowered.contains("malformed") {
        return PreferencesError::DataCorruption(err.to_string());
    }
    match op {
        StorageOp::Load => PreferencesError::LoadFailure(err.to_string()),
        StorageOp::Save => PreferencesError::SaveFailure(err.to_string()),
    }
}
