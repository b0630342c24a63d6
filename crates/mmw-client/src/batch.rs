//! Sequential runs over many areas of interest.
//!
//! Jobs run one after another: the service rate-limits submissions per user, so
//! parallel submissions would only trade sleeps for throttle responses.

use serde_json::{Map, Value};
use tracing::{info, warn};

use mmw_core::endpoints::{GWLFE_PREPARE, GWLFE_RUN, INPUTMOD_HASH};
use mmw_core::{AreaOfInterest, JobDescriptor, JobFailure, JobRecord};

use crate::client::ModelMwClient;
use crate::error::ClientError;
use crate::projects::LayerOverrides;

/// Both halves of a GWLF-E model run.
#[derive(Debug, Clone, PartialEq)]
pub struct GwlfeRun {
    pub label: String,
    /// The MapShed (prepare) job.
    pub prepare: JobRecord,
    /// Only attempted when `prepare` produced a result.
    pub run: Option<JobRecord>,
}

impl GwlfeRun {
    pub fn succeeded(&self) -> bool {
        self.run.as_ref().is_some_and(JobRecord::succeeded)
    }
}

impl ModelMwClient {
    /// Run `endpoint` once per area of interest, in order.
    ///
    /// Stops early, without submitting the remaining jobs, once the client is
    /// cancelled.
    pub async fn run_batch(
        &self,
        aois: &[AreaOfInterest],
        endpoint: &str,
    ) -> Result<Vec<JobRecord>, ClientError> {
        let mut records = Vec::with_capacity(aois.len());
        for (index, aoi) in aois.iter().enumerate() {
            let label = aoi.label(index + 1);
            let descriptor =
                JobDescriptor::new(endpoint, label).with_payload(aoi.analysis_payload());
            let record = self.run_job(&descriptor).await?;
            let cancelled = record.failure() == Some(&JobFailure::Cancelled);
            records.push(record);
            if cancelled {
                warn!("Batch cancelled after {} of {} jobs", records.len(), aois.len());
                break;
            }
        }
        info!(
            "Batch on {} finished: {} of {} jobs succeeded",
            endpoint,
            records.iter().filter(|r| r.succeeded()).count(),
            aois.len()
        );
        Ok(records)
    }

    /// GWLF-E prepare (MapShed) for `aoi`, then the model run on its output.
    pub async fn run_gwlfe(
        &self,
        aoi: &AreaOfInterest,
        ordinal: usize,
        layer_overrides: Option<&LayerOverrides>,
    ) -> Result<GwlfeRun, ClientError> {
        let label = aoi.label(ordinal);

        let mut prepare_payload = Map::new();
        aoi.insert_into(&mut prepare_payload);
        if let Some(overrides) = layer_overrides.filter(|o| !o.is_empty()) {
            prepare_payload.insert("layer_overrides".into(), overrides.to_value());
        }
        let prepare = self
            .run_job(
                &JobDescriptor::new(GWLFE_PREPARE, label.clone())
                    .with_payload(Value::Object(prepare_payload)),
            )
            .await?;

        let Some(mapshed_job) = prepare.job_id().filter(|_| prepare.succeeded()) else {
            warn!("Skipping GWLF-E run for {}: prepare job did not succeed", label);
            return Ok(GwlfeRun {
                label,
                prepare,
                run: None,
            });
        };

        let run_payload = serde_json::json!({
            "inputmod_hash": INPUTMOD_HASH,
            "modifications": "[{}]",
            "job_uuid": mapshed_job,
        });
        let run = self
            .run_job(&JobDescriptor::new(GWLFE_RUN, label.clone()).with_payload(run_payload))
            .await?;

        Ok(GwlfeRun {
            label,
            prepare,
            run: Some(run),
        })
    }
}
