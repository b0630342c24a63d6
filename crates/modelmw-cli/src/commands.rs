use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tracing::warn;

use mmw_client::{GwlfeRun, JobRun, LayerOverrides, ModelMwClient, ResultCache};
use mmw_config::ClientConfig;
use mmw_config::paths;
use mmw_core::endpoints::{self, display_name};
use mmw_core::{AreaOfInterest, JobDescriptor, JobRecord};

use crate::cli::OutputFormat;

/// Exit code for a job that finished without a result.
pub(crate) const JOB_FAILED: i32 = 1;

pub(crate) struct RunArgs {
    pub endpoint: String,
    pub label: String,
    pub payload: Option<String>,
    pub payload_file: Option<PathBuf>,
    pub form: Option<String>,
    pub no_cache: bool,
    pub needed_key: Option<String>,
}

pub(crate) async fn handle_run(
    client: &ModelMwClient,
    args: RunArgs,
    format: OutputFormat,
) -> Result<i32> {
    let descriptor = build_descriptor(
        &args.endpoint,
        &args.label,
        args.payload.as_deref(),
        args.payload_file.as_deref(),
        args.form,
    )?;

    let run = if args.no_cache {
        JobRun::Completed(client.run_job(&descriptor).await?)
    } else {
        client
            .run_job_cached(&descriptor, args.needed_key.as_deref())
            .await?
    };

    match run {
        JobRun::Cached(cached) => {
            eprintln!("Using saved result from {}", cached.path.display());
            match format {
                OutputFormat::Json => print_json(&cached.document)?,
                OutputFormat::Text => print_json(&cached.result)?,
            }
            Ok(0)
        }
        JobRun::Completed(record) => report_record(&record, format),
    }
}

pub(crate) fn handle_lookup(
    config: &ClientConfig,
    endpoint: &str,
    label: &str,
    needed_key: Option<&str>,
    alt_file: Option<&Path>,
    format: OutputFormat,
) -> Result<i32> {
    let dir = config
        .cache
        .dir
        .clone()
        .or_else(paths::default_cache_dir)
        .context("Cannot determine cache directory; set cache.dir or MMW_CACHE_DIR")?;
    let cache = ResultCache::new(dir);
    let descriptor = JobDescriptor::new(endpoint, label);

    match cache.lookup_with_fallback(&descriptor, alt_file, needed_key)? {
        Some(cached) => {
            match format {
                OutputFormat::Json => print_json(&cached.document)?,
                OutputFormat::Text => print_json(&cached.result)?,
            }
            Ok(0)
        }
        None => {
            eprintln!(
                "No saved {} result for {} in {}",
                display_name(endpoint),
                label,
                cache.dir().display()
            );
            Ok(JOB_FAILED)
        }
    }
}

pub(crate) async fn handle_batch(
    client: &ModelMwClient,
    endpoint: &str,
    aois: &[AreaOfInterest],
    format: OutputFormat,
) -> Result<i32> {
    let records = client.run_batch(aois, endpoint).await?;
    match format {
        OutputFormat::Json => print_json(&serde_json::to_value(&records)?)?,
        OutputFormat::Text => {
            for record in &records {
                println!("{}\t{}", record.label(), status_line(record));
            }
        }
    }
    let all_ok = records.len() == aois.len() && records.iter().all(JobRecord::succeeded);
    Ok(if all_ok { 0 } else { JOB_FAILED })
}

pub(crate) async fn handle_gwlfe(
    client: &ModelMwClient,
    aoi: &AreaOfInterest,
    land: Option<String>,
    streams: Option<String>,
    format: OutputFormat,
) -> Result<i32> {
    let overrides = layer_overrides(land, streams)?;
    let run = client.run_gwlfe(aoi, 1, Some(&overrides)).await?;
    report_gwlfe(&run, format)
}

pub(crate) fn handle_endpoints(format: OutputFormat) -> Result<()> {
    let catalogue = endpoints::catalogue();
    match format {
        OutputFormat::Json => {
            let entries: Vec<Value> = catalogue
                .iter()
                .map(|(endpoint, description)| {
                    serde_json::json!({"endpoint": endpoint, "description": description})
                })
                .collect();
            print_json(&Value::Array(entries))?;
        }
        OutputFormat::Text => {
            let width = catalogue.iter().map(|(e, _)| e.len()).max().unwrap_or(0);
            for (endpoint, description) in &catalogue {
                println!("{endpoint:<width$}  {description}");
            }
        }
    }
    Ok(())
}

fn build_descriptor(
    endpoint: &str,
    label: &str,
    payload: Option<&str>,
    payload_file: Option<&Path>,
    form: Option<String>,
) -> Result<JobDescriptor> {
    let descriptor = JobDescriptor::new(endpoint, label);
    let raw = match (payload, payload_file) {
        (Some(raw), _) => Some(raw.to_string()),
        (None, Some(path)) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read payload: {}", path.display()))?,
        ),
        (None, None) => None,
    };
    match (raw, form) {
        (Some(_), Some(_)) => bail!("--payload and --form are mutually exclusive"),
        (Some(raw), None) => {
            let value: Value =
                serde_json::from_str(&raw).context("Payload is not valid JSON")?;
            Ok(descriptor.with_payload(value))
        }
        (None, Some(form)) => Ok(descriptor.with_form(form)),
        (None, None) => Ok(descriptor),
    }
}

/// `--land` accepts a land-use key (e.g. `2019_2019`) or a raw layer name.
fn layer_overrides(land: Option<String>, streams: Option<String>) -> Result<LayerOverrides> {
    if let Some(source) = &streams {
        if !endpoints::STREAM_SOURCES.contains(&source.as_str()) {
            bail!(
                "Unknown stream source '{}'; expected one of {}",
                source,
                endpoints::STREAM_SOURCES.join(", ")
            );
        }
    }
    let land = land.map(|key| match endpoints::land_use_layer(&key) {
        Some(layer) => layer.to_string(),
        None => key,
    });
    Ok(LayerOverrides { land, streams })
}

fn report_record(record: &JobRecord, format: OutputFormat) -> Result<i32> {
    match format {
        OutputFormat::Json => print_json(&serde_json::to_value(record)?)?,
        OutputFormat::Text => {
            if let Some(result) = record.result() {
                print_json(result)?;
            }
        }
    }
    if record.succeeded() {
        return Ok(0);
    }
    report_failure(record)?;
    Ok(JOB_FAILED)
}

fn report_gwlfe(run: &GwlfeRun, format: OutputFormat) -> Result<i32> {
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "label": run.label,
            "prepare": run.prepare,
            "run": run.run,
        }))?,
        OutputFormat::Text => {
            if let Some(result) = run.run.as_ref().and_then(JobRecord::result) {
                print_json(result)?;
            }
        }
    }
    if run.succeeded() {
        return Ok(0);
    }
    match &run.run {
        Some(model) => report_failure(model)?,
        None => report_failure(&run.prepare)?,
    }
    Ok(JOB_FAILED)
}

fn report_failure(record: &JobRecord) -> Result<()> {
    let reason = record
        .failure()
        .map(ToString::to_string)
        .unwrap_or_else(|| "no result".to_string());
    eprintln!(
        "{} job for {} failed: {}",
        display_name(record.endpoint()),
        record.label(),
        reason
    );
    if let Some(error) = record.error_response() {
        eprintln!("{}", serde_json::to_string_pretty(error)?);
    } else {
        warn!("No error response recorded for {}", record.label());
    }
    Ok(())
}

fn status_line(record: &JobRecord) -> String {
    match record.failure() {
        None if record.succeeded() => "succeeded".to_string(),
        None => "incomplete".to_string(),
        Some(failure) => format!("failed: {failure}"),
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
