//! Job lifecycle: submit, wait, poll to a terminal state, persist.
//!
//! ```text
//! not_started --submit--> submitted --poll--> pending --poll--> ... --> succeeded
//!             \--------------------------------------------------------> failed
//! ```
//!
//! Jobs are never resubmitted; only the individual requests are retried by the
//! executor.

use serde_json::Value;
use tracing::{Instrument, debug, error, info, info_span, warn};

use mmw_core::endpoints::display_name;
use mmw_core::{JobDescriptor, JobFailure, JobRecord, JobStatus};

use crate::cache::CachedJob;
use crate::client::ModelMwClient;
use crate::error::ClientError;
use crate::executor::Outcome;
use crate::interrupt::Interrupt;

const JOB_ID_FIELDS: &[&str] = &["job_uuid", "job"];
const POLL_FIELDS: &[&str] = &["status"];

/// Result of [`ModelMwClient::run_job_cached`].
#[derive(Debug, Clone, PartialEq)]
pub enum JobRun {
    /// Replayed from the result cache; nothing was sent.
    Cached(CachedJob),
    /// Ran against the service.
    Completed(JobRecord),
}

impl JobRun {
    pub fn succeeded(&self) -> bool {
        match self {
            Self::Cached(_) => true,
            Self::Completed(record) => record.succeeded(),
        }
    }

    pub fn result(&self) -> Option<&Value> {
        match self {
            Self::Cached(cached) => Some(&cached.result),
            Self::Completed(record) => record.result(),
        }
    }

    pub fn record(&self) -> Option<JobRecord> {
        match self {
            Self::Cached(cached) => cached.record(),
            Self::Completed(record) => Some(record.clone()),
        }
    }
}

impl ModelMwClient {
    /// Submit a job. The returned record is either submitted (with a job id) or
    /// failed; it is never left `not_started`.
    pub async fn start_job(&self, descriptor: &JobDescriptor) -> Result<JobRecord, ClientError> {
        let interrupt = self.interrupt();
        self.submit(descriptor, &interrupt)
            .instrument(job_span(descriptor.label(), descriptor.endpoint()))
            .await
    }

    /// Poll a submitted job until it finishes. Records whose submission did not
    /// succeed, or that already finished, come back unchanged.
    pub async fn get_job_result(&self, record: JobRecord) -> Result<JobRecord, ClientError> {
        let interrupt = self.interrupt();
        let span = job_span(record.label(), record.endpoint());
        self.poll(record, &interrupt).instrument(span).await
    }

    /// Submit, wait for the service to pick the job up, then poll to completion.
    pub async fn run_job(&self, descriptor: &JobDescriptor) -> Result<JobRecord, ClientError> {
        let interrupt = self.interrupt();
        self.run_with(descriptor, &interrupt)
            .instrument(job_span(descriptor.label(), descriptor.endpoint()))
            .await
    }

    /// [`Self::run_job`], unless the cache already holds a result for this
    /// label and endpoint (containing `needed_key`, when given).
    pub async fn run_job_cached(
        &self,
        descriptor: &JobDescriptor,
        needed_key: Option<&str>,
    ) -> Result<JobRun, ClientError> {
        if let Some(cache) = &self.cache {
            match cache.lookup(descriptor, needed_key) {
                Ok(Some(cached)) => return Ok(JobRun::Cached(cached)),
                Ok(None) => {}
                Err(err) => warn!("Ignoring unreadable cached result: {:#}", err),
            }
        }
        self.run_job(descriptor).await.map(JobRun::Completed)
    }

    async fn run_with(
        &self,
        descriptor: &JobDescriptor,
        interrupt: &Interrupt,
    ) -> Result<JobRecord, ClientError> {
        let mut record = self.submit(descriptor, interrupt).await?;
        if record.submission_status() != JobStatus::Succeeded {
            return Ok(record);
        }

        // The submission endpoints allow roughly 20 requests per minute.
        if let Err(failure) = interrupt.sleep(self.polling.submit_delay()).await {
            record.fail_polling(None, failure)?;
            self.persist(&record);
            return Ok(record);
        }
        self.poll(record, interrupt).await
    }

    async fn submit(
        &self,
        descriptor: &JobDescriptor,
        interrupt: &Interrupt,
    ) -> Result<JobRecord, ClientError> {
        let request = self.normalizer.submission(descriptor)?;
        let mut record = JobRecord::new(descriptor, self.host());

        match self
            .executor
            .execute(&request, JOB_ID_FIELDS, interrupt)
            .await
        {
            Outcome::Succeeded { json, .. } => {
                let response = json.unwrap_or(Value::Null);
                match job_id(&response) {
                    Some(id) => {
                        debug!("Submitted job {}", id);
                        record.record_submission(response, id)?;
                    }
                    None => {
                        error!("Submission response carried no job id");
                        record.fail_submission(Some(response), JobFailure::IdentifierMissing)?;
                    }
                }
            }
            Outcome::Failed { error, failure, .. } => {
                error!("Failed to start job: {}", failure);
                record.fail_submission(error, failure)?;
            }
        }
        Ok(record)
    }

    async fn poll(
        &self,
        mut record: JobRecord,
        interrupt: &Interrupt,
    ) -> Result<JobRecord, ClientError> {
        if record.is_terminal() || record.submission_status() != JobStatus::Succeeded {
            return Ok(record);
        }
        let Some(id) = record.job_id().map(str::to_string) else {
            return Ok(record);
        };
        let request = self.normalizer.poll_request(record.endpoint(), &id)?;

        loop {
            let response = match self.executor.execute(&request, POLL_FIELDS, interrupt).await {
                Outcome::Succeeded { json, .. } => json.unwrap_or(Value::Null),
                Outcome::Failed { error, failure, .. } => {
                    error!("Failed to get results for job {}: {}", id, failure);
                    record.fail_polling(error, failure)?;
                    break;
                }
            };

            if let Some(message) = job_error(&response) {
                error!("Job {} reported an error: {}", id, message);
                record.fail_polling(Some(response), JobFailure::Application { message })?;
                break;
            }

            if response.get("status").and_then(Value::as_str) == Some("complete") {
                if has_result(&response) {
                    info!(
                        "Got {} results for {}",
                        display_name(record.endpoint()),
                        record.label()
                    );
                    record.record_result(response)?;
                } else {
                    error!("Job {} completed without a result", id);
                    record.fail_polling(Some(response), JobFailure::MissingResult)?;
                }
                break;
            }

            debug!("Job {} has not yet finished", id);
            if let Err(failure) = interrupt.sleep(self.polling.interval()).await {
                record.fail_polling(Some(response), failure)?;
                break;
            }
        }

        self.persist(&record);
        Ok(record)
    }

    /// Dump a terminal record; cache trouble never fails the job.
    fn persist(&self, record: &JobRecord) {
        if let Some(cache) = &self.cache {
            if let Err(err) = cache.store(record) {
                warn!("Failed to save job record: {:#}", err);
            }
        }
    }
}

fn job_span(label: &str, endpoint: &str) -> tracing::Span {
    info_span!("job", label = %label, endpoint = %display_name(endpoint))
}

/// `job_uuid` wins over `job`; either may be a string or a number.
fn job_id(response: &Value) -> Option<String> {
    JOB_ID_FIELDS
        .iter()
        .filter_map(|field| response.get(*field))
        .find_map(|value| match value {
            Value::String(id) if !id.trim().is_empty() => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        })
}

/// Message of a populated `error` field. A `failed` status without one still
/// counts as an error.
fn job_error(response: &Value) -> Option<String> {
    let message = match response.get("error") {
        Some(Value::String(message)) if !message.trim().is_empty() => Some(message.clone()),
        Some(value) if !is_empty_value(value) && !value.is_string() => Some(value.to_string()),
        _ => None,
    };
    message.or_else(|| {
        (response.get("status").and_then(Value::as_str) == Some("failed"))
            .then(|| "job status is failed".to_string())
    })
}

fn has_result(response: &Value) -> bool {
    response.get("result").is_some_and(|result| !is_empty_value(result))
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
