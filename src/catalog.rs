//! Built-in exercise catalog. Definitions live in `catalog.toml`, compiled
//! into the binary; the registry validates the whole file up front so a bad
//! definition fails at load rather than surfacing as a missing exercise later.

use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};

const CATALOG_TOML: &str = include_str!("catalog.toml");

const MIN_DIFFICULTY_MODIFIER: i8 = -2;
const MAX_DIFFICULTY_MODIFIER: i8 = 2;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MuscleGroup {
    Chest,
    Back,
    Shoulders,
    Arms,
    Legs,
    Core,
    FullBody,
}

impl MuscleGroup {
    pub const ALL: [MuscleGroup; 7] = [
        MuscleGroup::Chest,
        MuscleGroup::Back,
        MuscleGroup::Shoulders,
        MuscleGroup::Arms,
        MuscleGroup::Legs,
        MuscleGroup::Core,
        MuscleGroup::FullBody,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MuscleGroup::Chest => "chest",
            MuscleGroup::Back => "back",
            MuscleGroup::Shoulders => "shoulders",
            MuscleGroup::Arms => "arms",
            MuscleGroup::Legs => "legs",
            MuscleGroup::Core => "core",
            MuscleGroup::FullBody => "full_body",
        }
    }
}

impl fmt::Display for MuscleGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExerciseVariation {
    pub id: String,
    pub name: String,
    pub difficulty_modifier: i8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogExercise {
    pub id: String,
    pub name: String,
    pub muscle_group: MuscleGroup,
    #[serde(default)]
    pub required_equipment: Vec<String>,
    pub difficulty: Difficulty,
    pub instructions: Vec<String>,
    pub safety_tips: Vec<String>,
    pub target_muscles: Vec<String>,
    #[serde(default)]
    pub variations: Vec<ExerciseVariation>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawCatalogFile {
    #[serde(default)]
    exercises: Vec<CatalogExercise>,
}

#[derive(Debug)]
pub enum CatalogError {
    Toml(toml::de::Error),
    InvalidDefinition(String),
    UnknownExercise(String),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Toml(err) => write!(f, "invalid catalog TOML: {}", err),
            CatalogError::InvalidDefinition(message) => {
                write!(f, "invalid exercise definition: {}", message)
            }
            CatalogError::UnknownExercise(id) => write!(f, "unknown exercise '{}'", id),
        }
    }
}

impl Error for CatalogError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CatalogError::Toml(err) => Some(err),
            CatalogError::InvalidDefinition(_) => None,
            CatalogError::UnknownExercise(_) => None,
        }
    }
}

impl From<toml::de::Error> for CatalogError {
    fn from(value: toml::de::Error) -> Self {
        CatalogError::Toml(value)
    }
}

#[derive(Debug, Clone)]
pub struct CatalogRegistry {
    exercises: Vec<CatalogExercise>,
    by_id: HashMap<String, usize>,
}

impl CatalogRegistry {
    pub fn load() -> Result<Self, CatalogError> {
        Self::from_toml(CATALOG_TOML)
    }

    pub(crate) fn from_toml(raw: &str) -> Result<Self, CatalogError> {
        let file: RawCatalogFile = toml::from_str(raw)?;
        if file.exercises.is_empty() {
            return Err(CatalogError::InvalidDefinition(
                "at least one exercise must be defined".to_string(),
            ));
        }

        let mut exercises = file.exercises;
        exercises.sort_by(|left, right| left.name.cmp(&right.name));

        let mut by_id = HashMap::new();
        let mut seen_names = HashMap::new();
        for (index, exercise) in exercises.iter().enumerate() {
            validate_exercise(exercise)?;
            if by_id.insert(exercise.id.clone(), index).is_some() {
                return Err(CatalogError::InvalidDefinition(format!(
                    "duplicate exercise id '{}'",
                    exercise.id
                )));
            }
            if seen_names.insert(exercise.name.clone(), index).is_some() {
                return Err(CatalogError::InvalidDefinition(format!(
                    "duplicate exercise name '{}'",
                    exercise.name
                )));
            }
        }

        Ok(Self { exercises, by_id })
    }

    /// All exercises, sorted by name.
    pub fn exercises(&self) -> &[CatalogExercise] {
        &self.exercises
    }

    pub fn get(&self, exercise_id: &str) -> Option<&CatalogExercise> {
        self.by_id.get(exercise_id).map(|index| &self.exercises[*index])
    }

    pub fn require(&self, exercise_id: &str) -> Result<&CatalogExercise, CatalogError> {
        self.get(exercise_id)
            .ok_or_else(|| CatalogError::UnknownExercise(exercise_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.exercises.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exercises.is_empty()
    }
}

fn validate_exercise(exercise: &CatalogExercise) -> Result<(), CatalogError> {
    if exercise.id.trim().is_empty() {
        return Err(CatalogError::InvalidDefinition(
            "exercise id must not be blank".to_string(),
        ));
    }
    if exercise.name.trim().is_empty() {
        return Err(CatalogError::InvalidDefinition(format!(
            "exercise '{}' must have a name",
            exercise.id
        )));
    }
    if exercise.instructions.is_empty()
        || exercise.instructions.iter().any(|step| step.trim().is_empty())
    {
        return Err(CatalogError::InvalidDefinition(format!(
            "exercise '{}' must list non-blank instruction steps",
            exercise.id
        )));
    }
    if exercise.safety_tips.is_empty()
        || exercise.safety_tips.iter().any(|tip| tip.trim().is_empty())
    {
        return Err(CatalogError::InvalidDefinition(format!(
            "exercise '{}' must list non-blank safety tips",
            exercise.id
        )));
    }
    if exercise.target_muscles.is_empty() {
        return Err(CatalogError::InvalidDefinition(format!(
            "exercise '{}' must list target muscles",
            exercise.id
        )));
    }
    if exercise
        .required_equipment
        .iter()
        .any(|name| name.trim().is_empty())
    {
        return Err(CatalogError::InvalidDefinition(format!(
            "exercise '{}' has a blank equipment name",
            exercise.id
        )));
    }

    let mut variation_ids = HashSet::new();
    let mut variation_names = HashSet::new();
    for variation in &exercise.variations {
        if variation.id.trim().is_empty() || variation.name.trim().is_empty() {
            return Err(CatalogError::InvalidDefinition(format!(
                "exercise '{}' has a variation with a blank id or name",
                exercise.id
            )));
        }
        if !(MIN_DIFFICULTY_MODIFIER..=MAX_DIFFICULTY_MODIFIER)
            .contains(&variation.difficulty_modifier)
        {
            return Err(CatalogError::InvalidDefinition(format!(
                "variation '{}' of exercise '{}' has difficulty modifier {} outside [{}, {}]",
                variation.id,
                exercise.id,
                variation.difficulty_modifier,
                MIN_DIFFICULTY_MODIFIER,
                MAX_DIFFICULTY_MODIFIER
            )));
        }
        if !variation_ids.insert(variation.id.clone()) {
            return Err(CatalogError::InvalidDefinition(format!(
                "exercise '{}' has duplicate variation id '{}'",
                exercise.id, variation.id
            )));
        }
        if !variation_names.insert(variation.name.clone()) {
            return Err(CatalogError::InvalidDefinition(format!(
                "exercise '{}' has duplicate variation name '{}'",
                exercise.id, variation.name
            )));
        }
    }

    Ok(())
}
