//! Availability and filter logic over the exercise catalog. Equipment names
//! are matched exactly, case included, against whatever the picker stored.

use std::collections::HashSet;

use serde::Serialize;

use crate::catalog::{CatalogExercise, Difficulty, MuscleGroup};
use crate::domain::metadata::ExerciseMetadata;

/// An exercise is available when every piece of required equipment is owned.
/// Exercises with no requirements are always available.
pub fn is_available(exercise: &CatalogExercise, owned_equipment: &HashSet<String>) -> bool {
    exercise
        .required_equipment
        .iter()
        .all(|name| owned_equipment.contains(name))
}

/// Equipment the exercise needs but the user does not own, sorted by name.
pub fn missing_equipment(
    exercise: &CatalogExercise,
    owned_equipment: &HashSet<String>,
) -> Vec<String> {
    let mut missing: Vec<String> = exercise
        .required_equipment
        .iter()
        .filter(|name| !owned_equipment.contains(*name))
        .cloned()
        .collect();
    missing.sort();
    missing
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogFilter {
    pub muscle_group: Option<MuscleGroup>,
    pub difficulty: Option<Difficulty>,
    pub query: Option<String>,
}

impl CatalogFilter {
    pub fn matches(&self, exercise: &CatalogExercise) -> bool {
        if let Some(group) = self.muscle_group {
            if exercise.muscle_group != group {
                return false;
            }
        }
        if let Some(difficulty) = self.difficulty {
            if exercise.difficulty != difficulty {
                return false;
            }
        }
        if let Some(query) = &self.query {
            let needle = query.trim().to_lowercase();
            if !needle.is_empty() && !exercise.name.to_lowercase().contains(&needle) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExerciseAvailability<'a> {
    pub exercise: &'a CatalogExercise,
    pub is_available: bool,
    pub missing_equipment: Vec<String>,
}

/// Applies the filter and annotates each surviving exercise with its
/// availability. Available exercises sort before unavailable ones; within
/// each group the catalog's name order is kept. The result is deterministic
/// for a given catalog, filter, and equipment set.
pub fn display_order<'a>(
    exercises: &'a [CatalogExercise],
    filter: &CatalogFilter,
    owned_equipment: &HashSet<String>,
) -> Vec<ExerciseAvailability<'a>> {
    let mut annotated: Vec<ExerciseAvailability<'a>> = exercises
        .iter()
        .filter(|exercise| filter.matches(exercise))
        .map(|exercise| ExerciseAvailability {
            exercise,
            is_available: is_available(exercise, owned_equipment),
            missing_equipment: missing_equipment(exercise, owned_equipment),
        })
        .collect();
    annotated.sort_by(|left, right| {
        right
            .is_available
            .cmp(&left.is_available)
            .then_with(|| left.exercise.name.cmp(&right.exercise.name))
    });
    annotated
}

/// Most-used first; ties broken by most recent use.
pub fn rank_most_used(metadata: &mut Vec<ExerciseMetadata>) {
    metadata.sort_by(|left, right| {
        right
            .usage_count
            .cmp(&left.usage_count)
            .then_with(|| right.last_used.cmp(&left.last_used))
            .then_with(|| left.name.cmp(&right.name))
    });
}

/// Most recently used first; never-used entries sink to the end.
pub fn rank_recently_used(metadata: &mut Vec<ExerciseMetadata>) {
    metadata.sort_by(|left, right| {
        right
            .last_used
            .cmp(&left.last_used)
            .then_with(|| left.name.cmp(&right.name))
    });
}
