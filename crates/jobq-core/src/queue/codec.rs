//! JobCodec - job record と store の bytes の相互変換
//!
//! Records are stored as JSON. Timestamps are RFC 3339 with full precision,
//! so a record written and read back compares equal on every field.

use serde::Serialize;
use serde::de::{DeserializeOwned, IgnoredAny};

use crate::domain::Job;

pub fn encode<P: Serialize>(job: &Job<P>) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(job)
}

pub fn decode<P: DeserializeOwned>(bytes: &[u8]) -> Result<Job<P>, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// Decode only the metadata; the payload is skipped without being parsed into `P`.
pub fn decode_meta(bytes: &[u8]) -> Result<Job<IgnoredAny>, serde_json::Error> {
    serde_json::from_slice(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Decision, JobId, JobState};
    use chrono::{TimeDelta, TimeZone, Utc};
    use serde::Deserialize;
    use ulid::Ulid;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Email {
        to: String,
        retries_hint: Option<u8>,
    }

    #[test]
    fn record_round_trips_on_every_field() {
        let started = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()
            + TimeDelta::nanoseconds(123_456_789);
        let mut job = Job::new(
            JobId::from_ulid(Ulid::new()),
            Email {
                to: "ops@example.com".into(),
                retries_hint: None,
            },
        );
        job.claim(started, Some(TimeDelta::seconds(30)));
        job.fail(
            "smtp timeout".into(),
            Decision::Scheduled(started + TimeDelta::milliseconds(200)),
        );

        let back: Job<Email> = decode(&encode(&job).unwrap()).unwrap();
        assert_eq!(back, job);
        assert_eq!(back.state, JobState::Scheduled);
    }

    #[test]
    fn meta_decoding_ignores_payload_shape() {
        let job = Job::new(JobId::from_ulid(Ulid::new()), vec![1u8, 2, 3]);
        let meta = decode_meta(&encode(&job).unwrap()).unwrap();
        assert_eq!(meta.id, job.id);
        assert_eq!(meta.state, JobState::Available);
    }

    #[test]
    fn wrong_payload_type_is_an_error() {
        let job = Job::new(JobId::from_ulid(Ulid::new()), "text");
        let result: Result<Job<u64>, _> = decode(&encode(&job).unwrap());
        assert!(result.is_err());
    }
}
