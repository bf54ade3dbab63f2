use std::error::Error;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SetType {
    WarmUp,
    Normal,
    CoolDown,
}

impl SetType {
    pub const ALL: [SetType; 3] = [SetType::WarmUp, SetType::Normal, SetType::CoolDown];

    pub fn as_str(self) -> &'static str {
        match self {
            SetType::WarmUp => "warm_up",
            SetType::Normal => "normal",
            SetType::CoolDown => "cool_down",
        }
    }
}

impl fmt::Display for SetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SetType {
    type Err = ParseSetTypeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        let set_type = match normalized.as_str() {
            "warm_up" | "warmup" => SetType::WarmUp,
            "normal" | "working" => SetType::Normal,
            "cool_down" | "cooldown" => SetType::CoolDown,
            _ => {
                return Err(ParseSetTypeError {
                    value: value.to_string(),
                });
            }
        };
        Ok(set_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSetTypeError {
    value: String,
}

impl fmt::Display for ParseSetTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid set type '{}': expected one of {}",
            self.value,
            SetType::ALL
                .iter()
                .map(|set_type| set_type.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl Error for ParseSetTypeError {}

/// Weights are prescribed in 0.5 increments; anything finer is a data error.
pub fn is_half_step_weight(weight: f64) -> bool {
    if weight < 0.0 || !weight.is_finite() {
        return false;
    }
    let doubled = weight * 2.0;
    (doubled - doubled.round()).abs() < 1e-9
}

/// One unit of prescribed work within an exercise. `completed_at` is present
/// exactly when `is_completed` is true; the mutators below are the only
/// sanctioned way to flip completion so the pair can never drift.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExerciseSet {
    pub id: Uuid,
    pub set_number: u32,
    pub reps: u32,
    pub weight: f64,
    pub set_type: SetType,
    pub is_completed: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

impl ExerciseSet {
    pub fn new(set_number: u32, reps: u32, weight: f64) -> Self {
        Self {
            id: Uuid::now_v7(),
            set_number,
            reps,
            weight,
            set_type: SetType::Normal,
            is_completed: false,
            completed_at: None,
        }
    }

    pub fn with_type(mut self, set_type: SetType) -> Self {
        self.set_type = set_type;
        self
    }

    pub fn complete(&mut self, at: OffsetDateTime) {
        self.is_completed = true;
        self.completed_at = Some(at);
    }

    pub fn reset(&mut self) {
        self.is_completed = false;
        self.completed_at = None;
    }

    pub fn completion_consistent(&self) -> bool {
        self.is_completed == self.completed_at.is_some()
    }
}

/// Exactly one prescription representation is authoritative per exercise:
/// the flat scalar triple written before per-set tracking existed, or the
/// per-set array written by the migration engine and everything after it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum Prescription {
    Legacy {
        sets: u32,
        reps: u32,
        weight: f64,
        rest_time: u32,
    },
    PerSet {
        sets: Vec<ExerciseSet>,
    },
}

impl Prescription {
    pub fn is_migrated(&self) -> bool {
        matches!(self, Prescription::PerSet { .. })
    }

    pub fn total_sets(&self) -> usize {
        match self {
            Prescription::Legacy { sets, .. } => *sets as usize,
            Prescription::PerSet { sets } => sets.len(),
        }
    }

    pub fn average_weight(&self) -> f64 {
        match self {
            Prescription::Legacy { weight, .. } => *weight,
            Prescription::PerSet { sets } => {
                if sets.is_empty() {
                    return 0.0;
                }
                sets.iter().map(|set| set.weight).sum::<f64>() / sets.len() as f64
            }
        }
    }

    /// Total conversion into the per-set representation. Already-migrated
    /// prescriptions pass through unchanged, which is what makes the
    /// migration pass safe to re-run.
    pub fn migrated(&self) -> Result<Prescription, InvalidPrescription> {
        match self {
            Prescription::PerSet { sets } => Ok(Prescription::PerSet { sets: sets.clone() }),
            Prescription::Legacy {
                sets,
                reps,
                weight,
                rest_time: _,
            } => {
                validate_legacy(*sets, *reps, *weight)?;
                let synthesized = (1..=*sets)
                    .map(|set_number| ExerciseSet::new(set_number, *reps, *weight))
                    .collect();
                Ok(Prescription::PerSet { sets: synthesized })
            }
        }
    }
}

pub fn validate_legacy(sets: u32, reps: u32, weight: f64) -> Result<(), InvalidPrescription> {
    if sets == 0 {
        return Err(InvalidPrescription {
            field: "sets",
            message: "set count must be greater than zero".to_string(),
        });
    }
    if reps == 0 {
        return Err(InvalidPrescription {
            field: "reps",
            message: "rep count must be greater than zero".to_string(),
        });
    }
    if weight < 0.0 || !weight.is_finite() {
        return Err(InvalidPrescription {
            field: "weight",
            message: format!("weight must be non-negative, got {weight}"),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPrescription {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for InvalidPrescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid prescription field '{}': {}", self.field, self.message)
    }
}

impl Error for InvalidPrescription {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExerciseData {
    pub id: Uuid,
    pub name: String,
    pub prescription: Prescription,
    pub order_index: u32,
}

impl ExerciseData {
    pub fn new(name: &str, prescription: Prescription) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.trim().to_string(),
            prescription,
            order_index: 0,
        }
    }

    pub fn total_sets(&self) -> usize {
        self.prescription.total_sets()
    }

    pub fn average_weight(&self) -> f64 {
        self.prescription.average_weight()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkoutPlanData {
    pub id: Uuid,
    pub name: String,
    pub exercises: Vec<ExerciseData>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_date: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_used_date: Option<OffsetDateTime>,
}

impl WorkoutPlanData {
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.trim().to_string(),
            exercises: Vec::new(),
            created_date: OffsetDateTime::now_utc(),
            last_used_date: None,
        }
    }

    pub fn with_exercises(mut self, exercises: Vec<ExerciseData>) -> Self {
        self.exercises = exercises;
        self.normalize_order_indexes();
        self
    }

    pub fn exercise_count(&self) -> usize {
        self.exercises.len()
    }

    /// Rewrites `order_index` to the dense 0..N-1 permutation implied by
    /// list position. Called on every save so stored indexes always mirror
    /// display order.
    pub fn normalize_order_indexes(&mut self) {
        for (position, exercise) in self.exercises.iter_mut().enumerate() {
            exercise.order_index = position as u32;
        }
    }

    pub fn order_indexes_dense(&self) -> bool {
        self.exercises
            .iter()
            .enumerate()
            .all(|(position, exercise)| exercise.order_index == position as u32)
    }

    pub fn mark_used(&mut self, at: OffsetDateTime) {
        self.last_used_date = Some(at);
    }
}
