use serde::{Deserialize, Serialize};

/// Why a job (or one of its requests) ended without a usable result.
///
/// Every variant is an expected outcome of talking to the remote service and is
/// recorded in the job record rather than raised.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobFailure {
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Request rejected with non-retryable status {status}")]
    Protocol { status: u16 },

    #[error("Response body was not valid JSON (status {status})")]
    Decode { status: u16 },

    #[error("Request still failing after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        last_status: Option<u16>,
    },

    #[error("Throttle wait of {wait_secs}s exceeds the {limit_secs}s ceiling")]
    ThrottleTooLong { wait_secs: f64, limit_secs: f64 },

    #[error("Job reported an error: {message}")]
    Application { message: String },

    #[error("Job completed without a result")]
    MissingResult,

    #[error("Submission response carried no job identifier")]
    IdentifierMissing,

    #[error("Job was cancelled")]
    Cancelled,

    #[error("Job deadline of {deadline_secs}s exceeded")]
    DeadlineExceeded { deadline_secs: u64 },
}

impl JobFailure {
    /// True when the failure came from the caller stopping the job, not the service.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded { .. })
    }
}

/// Invalid job record state change.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Cannot {action} for job '{label}': {reason}")]
    InvalidTransition {
        label: String,
        action: &'static str,
        reason: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_protocol() {
        let err = JobFailure::Protocol { status: 400 };
        assert_eq!(
            err.to_string(),
            "Request rejected with non-retryable status 400"
        );
    }

    #[test]
    fn test_display_exhausted() {
        let err = JobFailure::Exhausted {
            attempts: 5,
            last_status: Some(503),
        };
        assert_eq!(err.to_string(), "Request still failing after 5 attempts");
    }

    #[test]
    fn test_display_throttle_too_long() {
        let err = JobFailure::ThrottleTooLong {
            wait_secs: 3600.0,
            limit_secs: 1800.0,
        };
        assert_eq!(
            err.to_string(),
            "Throttle wait of 3600s exceeds the 1800s ceiling"
        );
    }

    #[test]
    fn test_display_application() {
        let err = JobFailure::Application {
            message: "Geoprocessing failed".into(),
        };
        assert_eq!(err.to_string(), "Job reported an error: Geoprocessing failed");
    }

    #[test]
    fn test_serialized_kind_tag() {
        let value = serde_json::to_value(JobFailure::MissingResult).unwrap();
        assert_eq!(value, serde_json::json!({"kind": "missing_result"}));

        let value = serde_json::to_value(JobFailure::Decode { status: 502 }).unwrap();
        assert_eq!(value, serde_json::json!({"kind": "decode", "status": 502}));
    }

    #[test]
    fn test_failure_roundtrips_through_json() {
        let failure = JobFailure::DeadlineExceeded { deadline_secs: 90 };
        let encoded = serde_json::to_string(&failure).unwrap();
        let decoded: JobFailure = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, failure);
    }

    #[test]
    fn test_is_interrupt() {
        assert!(JobFailure::Cancelled.is_interrupt());
        assert!(JobFailure::DeadlineExceeded { deadline_secs: 1 }.is_interrupt());
        assert!(!JobFailure::IdentifierMissing.is_interrupt());
    }

    #[test]
    fn test_display_invalid_transition() {
        let err = RecordError::InvalidTransition {
            label: "020402050301".into(),
            action: "record poll result",
            reason: "submission has not succeeded",
        };
        assert_eq!(
            err.to_string(),
            "Cannot record poll result for job '020402050301': submission has not succeeded"
        );
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<JobFailure>();
        assert_send_sync::<RecordError>();
    }
}
