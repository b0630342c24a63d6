use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{JobFailure, RecordError};

/// Progress of one phase (submission or polling) of a job.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    #[serde(alias = "Not Started")]
    NotStarted,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Request body for a job submission.
///
/// `Fields` is a key-value mapping (encoded as JSON or as a form depending on the
/// endpoint family). `Form` is a body the caller already form-encoded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Form(String),
    Fields(Value),
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::String(form) => Self::Form(form),
            other => Self::Fields(other),
        }
    }
}

/// Model package a project is created for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum ModelPackage {
    #[serde(rename = "gwlfe")]
    #[value(name = "gwlfe")]
    Gwlfe,
    #[serde(rename = "tr-55")]
    #[value(name = "tr-55")]
    Tr55,
}

impl ModelPackage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gwlfe => "gwlfe",
            Self::Tr55 => "tr-55",
        }
    }
}

impl std::fmt::Display for ModelPackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable input to one job submission.
#[derive(Clone, Debug, PartialEq)]
pub struct JobDescriptor {
    endpoint: String,
    label: String,
    payload: Option<Payload>,
}

impl JobDescriptor {
    pub fn new(endpoint: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            label: label.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<Payload>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_form(self, form: impl Into<String>) -> Self {
        self.with_payload(Payload::Form(form.into()))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }
}

/// Accumulated state of one job, from submission to a terminal poll.
///
/// Field co-occurrence:
/// - `start_job_response` is set once `start_job_status` leaves `not_started`.
/// - `job_id` is set exactly when `start_job_status` is `succeeded`.
/// - `job_result_status` leaves `not_started` only after a successful submission.
/// - `result_response` is set only when `job_result_status` is `succeeded`;
///   `failure` (and usually `error_response`) only when a phase `failed`.
///
/// The serialized keys match the dump files written by earlier versions of the
/// client so old caches keep loading.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    job_label: String,
    request_host: String,
    request_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Payload>,
    #[serde(default)]
    start_job_status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_job_response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    job_id: Option<String>,
    #[serde(default)]
    job_result_status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result_response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure: Option<JobFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn new(descriptor: &JobDescriptor, host: impl Into<String>) -> Self {
        Self {
            job_label: descriptor.label.clone(),
            request_host: host.into(),
            request_endpoint: descriptor.endpoint.clone(),
            payload: descriptor.payload.clone(),
            start_job_status: JobStatus::NotStarted,
            start_job_response: None,
            job_id: None,
            job_result_status: JobStatus::NotStarted,
            result_response: None,
            error_response: None,
            failure: None,
            finished_at: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.job_label
    }

    pub fn host(&self) -> &str {
        &self.request_host
    }

    pub fn endpoint(&self) -> &str {
        &self.request_endpoint
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn submission_status(&self) -> JobStatus {
        self.start_job_status
    }

    pub fn submission_response(&self) -> Option<&Value> {
        self.start_job_response.as_ref()
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    pub fn polling_status(&self) -> JobStatus {
        self.job_result_status
    }

    /// Full body of the final poll response.
    pub fn result_response(&self) -> Option<&Value> {
        self.result_response.as_ref()
    }

    /// The job's terminal payload (the `result` member of the final poll body).
    pub fn result(&self) -> Option<&Value> {
        self.result_response.as_ref()?.get("result")
    }

    pub fn error_response(&self) -> Option<&Value> {
        self.error_response.as_ref()
    }

    pub fn failure(&self) -> Option<&JobFailure> {
        self.failure.as_ref()
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Terminal once polling finished either way, or submission failed (polling can
    /// then never start).
    pub fn is_terminal(&self) -> bool {
        self.job_result_status != JobStatus::NotStarted
            || self.start_job_status == JobStatus::Failed
    }

    pub fn succeeded(&self) -> bool {
        self.job_result_status == JobStatus::Succeeded
    }

    pub fn failed(&self) -> bool {
        self.start_job_status == JobStatus::Failed || self.job_result_status == JobStatus::Failed
    }

    pub fn record_submission(
        &mut self,
        response: Value,
        job_id: impl Into<String>,
    ) -> Result<(), RecordError> {
        self.ensure_submission_open("record submission")?;
        self.start_job_status = JobStatus::Succeeded;
        self.start_job_response = Some(response);
        self.job_id = Some(job_id.into());
        Ok(())
    }

    pub fn fail_submission(
        &mut self,
        response: Option<Value>,
        failure: JobFailure,
    ) -> Result<(), RecordError> {
        self.ensure_submission_open("fail submission")?;
        self.start_job_status = JobStatus::Failed;
        self.start_job_response = response.clone();
        self.error_response = response;
        self.failure = Some(failure);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn record_result(&mut self, final_response: Value) -> Result<(), RecordError> {
        self.ensure_polling_open("record poll result")?;
        self.job_result_status = JobStatus::Succeeded;
        self.result_response = Some(final_response);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail_polling(
        &mut self,
        response: Option<Value>,
        failure: JobFailure,
    ) -> Result<(), RecordError> {
        self.ensure_polling_open("fail polling")?;
        self.job_result_status = JobStatus::Failed;
        self.error_response = response;
        self.failure = Some(failure);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    fn ensure_submission_open(&self, action: &'static str) -> Result<(), RecordError> {
        if self.start_job_status != JobStatus::NotStarted {
            return Err(self.invalid(action, "submission already finished"));
        }
        Ok(())
    }

    fn ensure_polling_open(&self, action: &'static str) -> Result<(), RecordError> {
        if self.start_job_status != JobStatus::Succeeded || self.job_id.is_none() {
            return Err(self.invalid(action, "submission has not succeeded"));
        }
        if self.job_result_status != JobStatus::NotStarted {
            return Err(self.invalid(action, "record is already terminal"));
        }
        Ok(())
    }

    fn invalid(&self, action: &'static str, reason: &'static str) -> RecordError {
        RecordError::InvalidTransition {
            label: self.job_label.clone(),
            action,
            reason,
        }
    }
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
