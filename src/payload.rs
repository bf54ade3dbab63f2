//! Codec for the opaque structured blobs persisted alongside plan and
//! exercise rows. Encoding then decoding must reproduce the input exactly,
//! optional fields and ordering included; the integrity validator treats a
//! blob that fails to decode as corruption.

use serde_json::Error;

use crate::domain::plan::{ExerciseData, ExerciseSet};

pub fn encode_plan_payload(exercises: &[ExerciseData]) -> Result<String, Error> {
    serde_json::to_string(exercises)
}

pub fn decode_plan_payload(raw: &str) -> Result<Vec<ExerciseData>, Error> {
    serde_json::from_str(raw)
}

pub fn encode_sets_payload(sets: &[ExerciseSet]) -> Result<String, Error> {
    serde_json::to_string(sets)
}

pub fn decode_sets_payload(raw: &str) -> Result<Vec<ExerciseSet>, Error> {
    serde_json::from_str(raw)
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use crate::domain::plan::{ExerciseData, ExerciseSet, Prescription, SetType};

    use super::{
        decode_plan_payload, decode_sets_payload, encode_plan_payload, encode_sets_payload,
    };

    fn sample_exercises() -> Vec<ExerciseData> {
        let mut completed = ExerciseSet::new(1, 10, 42.5).with_type(SetType::WarmUp);
        completed.complete(OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap());
        let pending = ExerciseSet::new(2, 8, 60.0);

        let mut migrated = ExerciseData::new(
            "Bench Press",
            Prescription::PerSet {
                sets: vec![completed, pending],
            },
        );
        migrated.order_index = 0;

        let mut legacy = ExerciseData::new(
            "Push-Up",
            Prescription::Legacy {
                sets: 3,
                reps: 15,
                weight: 0.0,
                rest_time: 60,
            },
        );
        legacy.order_index = 1;

        vec![migrated, legacy]
    }

    #[test]
    fn plan_payload_round_trips_both_prescription_formats() {
        let exercises = sample_exercises();
        let encoded = encode_plan_payload(&exercises).expect("encoding should succeed");
        let decoded = decode_plan_payload(&encoded).expect("decoding should succeed");
        assert_eq!(decoded, exercises);
    }

    #[test]
    fn sets_payload_round_trips_completion_state() {
        let mut first = ExerciseSet::new(1, 12, 20.0);
        first.complete(OffsetDateTime::from_unix_timestamp(1_700_000_123).unwrap());
        let sets = vec![first, ExerciseSet::new(2, 12, 20.0)];

        let encoded = encode_sets_payload(&sets).expect("encoding should succeed");
        let decoded = decode_sets_payload(&encoded).expect("decoding should succeed");
        assert_eq!(decoded, sets);
        assert!(decoded[0].is_completed);
        assert!(decoded[0].completed_at.is_some());
        assert!(!decoded[1].is_completed);
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(decode_plan_payload("{not json").is_err());
        assert!(decode_sets_payload("[{\"set_number\": \"three\"}]").is_err());
    }
}
