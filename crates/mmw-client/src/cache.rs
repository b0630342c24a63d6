//! On-disk job records, one JSON file per (label, endpoint).
//!
//! Files written here can be replayed instead of resubmitting a job. Lookups
//! also understand dumps produced by other tools, as long as the result sits
//! under `result_response.result`, a top-level `result`, or the document root.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info};

use mmw_core::endpoints::display_name;
use mmw_core::{JobDescriptor, JobRecord};

/// `{label'}_{endpoint'}.json`, safe to use as a file name on every platform.
pub fn dump_file_name(endpoint: &str, label: &str) -> String {
    let label = label
        .replace('/', "_")
        .trim_matches(|c| c == ' ' || c == '_')
        .to_string();
    format!("{}_{}.json", label, display_name(endpoint))
}

/// A stored job whose result was found.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedJob {
    pub path: PathBuf,
    /// The whole file as read.
    pub document: Value,
    pub result: Value,
}

impl CachedJob {
    /// The stored job record, when the file was written by this client.
    pub fn record(&self) -> Option<JobRecord> {
        serde_json::from_value(self.document.clone()).ok()
    }
}

#[derive(Debug, Clone)]
pub struct ResultCache {
    dir: PathBuf,
}

impl ResultCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, endpoint: &str, label: &str) -> PathBuf {
        self.dir.join(dump_file_name(endpoint, label))
    }

    /// Write `record` to its derived path through a temp file and rename.
    pub fn store(&self, record: &JobRecord) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create cache dir: {}", self.dir.display()))?;

        let path = self.path_for(record.endpoint(), record.label());
        let tmp_path = path.with_extension("json.tmp");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .with_context(|| format!("failed to open temp dump file: {}", tmp_path.display()))?;

        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, record)
            .context("failed to serialize job record")?;
        writer.flush().context("failed to flush job record")?;
        drop(writer);

        fs::rename(&tmp_path, &path)
            .with_context(|| format!("failed to move job record into {}", path.display()))?;
        debug!("Saved job record to {}", path.display());
        Ok(path)
    }

    /// Cached result for `descriptor`, if its file exists and holds one.
    ///
    /// With `needed_key`, the result must contain that key.
    pub fn lookup(
        &self,
        descriptor: &JobDescriptor,
        needed_key: Option<&str>,
    ) -> Result<Option<CachedJob>> {
        self.lookup_with_fallback(descriptor, None, needed_key)
    }

    /// Like [`Self::lookup`], reading `alt_path` when the derived file is absent.
    pub fn lookup_with_fallback(
        &self,
        descriptor: &JobDescriptor,
        alt_path: Option<&Path>,
        needed_key: Option<&str>,
    ) -> Result<Option<CachedJob>> {
        let derived = self.path_for(descriptor.endpoint(), descriptor.label());
        let path = if derived.is_file() {
            derived
        } else {
            match alt_path {
                Some(alt) if alt.is_file() => alt.to_path_buf(),
                _ => return Ok(None),
            }
        };

        let cached = read_cached(&path, needed_key)?;
        if cached.is_some() {
            info!(
                "Read saved {} results for {} from {}",
                display_name(descriptor.endpoint()),
                descriptor.label(),
                path.display()
            );
        }
        Ok(cached)
    }
}

/// Read any dump file and pull its result out.
pub fn read_cached(path: &Path, needed_key: Option<&str>) -> Result<Option<CachedJob>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read dump file: {}", path.display()))?;
    let document: Value = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse dump file: {}", path.display()))?;

    Ok(extract_result(&document, needed_key).map(|result| CachedJob {
        path: path.to_path_buf(),
        result,
        document,
    }))
}

fn extract_result(document: &Value, needed_key: Option<&str>) -> Option<Value> {
    let nested = document
        .get("result_response")
        .and_then(|response| response.get("result"));
    let top = document.get("result");

    match needed_key {
        Some(key) => {
            let has_key = |value: &&Value| value.get(key).is_some();
            nested
                .filter(has_key)
                .or_else(|| top.filter(has_key))
                .or_else(|| Some(document).filter(has_key))
                .cloned()
        }
        None => nested.or(top).cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn finished_record(label: &str) -> JobRecord {
        let descriptor = JobDescriptor::new("api/analyze/land/2019_2019/", label)
            .with_payload(json!({"huc": "020402050505"}));
        let mut record = JobRecord::new(&descriptor, "https://mmw.test");
        record
            .record_submission(json!({"job": "abc"}), "abc")
            .unwrap();
        record
            .record_result(json!({"status": "complete", "result": {"survey": {"x": 1}}}))
            .unwrap();
        record
    }

    #[test]
    fn test_dump_file_name() {
        assert_eq!(
            dump_file_name("api/analyze/land/2019_2019/", "020402050505"),
            "020402050505_land_2019_2019.json"
        );
        assert_eq!(
            dump_file_name("api/modeling/gwlf-e/prepare/", " _a/b_ "),
            "a_b_gwlf-e_prepare.json"
        );
        assert_eq!(
            dump_file_name("mmw/modeling/tr55/", "site"),
            "site_mmw_modeling_tr55.json"
        );
    }

    #[test]
    fn test_store_then_lookup_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(tmp.path().join("json_results"));
        let record = finished_record("020402050505");

        let path = cache.store(&record).unwrap();
        assert_eq!(
            path,
            cache.path_for("api/analyze/land/2019_2019/", "020402050505")
        );
        assert!(!path.with_extension("json.tmp").exists());

        let descriptor = JobDescriptor::new("api/analyze/land/2019_2019/", "020402050505");
        let cached = cache.lookup(&descriptor, None).unwrap().unwrap();
        assert_eq!(Some(&cached.result), record.result());
        assert_eq!(cached.record(), Some(record));
    }

    #[test]
    fn test_repeated_lookups_are_identical() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(tmp.path());
        cache.store(&finished_record("a")).unwrap();
        let descriptor = JobDescriptor::new("api/analyze/land/2019_2019/", "a");
        let path = cache.path_for(descriptor.endpoint(), descriptor.label());
        let before = fs::read(&path).unwrap();

        let first = cache.lookup(&descriptor, Some("survey")).unwrap();
        let second = cache.lookup(&descriptor, Some("survey")).unwrap();
        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_missing_file_is_a_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(tmp.path());
        let descriptor = JobDescriptor::new("api/analyze/soil/", "nothing");
        assert!(cache.lookup(&descriptor, None).unwrap().is_none());
    }

    #[test]
    fn test_needed_key_must_be_present() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(tmp.path());
        cache.store(&finished_record("a")).unwrap();
        let descriptor = JobDescriptor::new("api/analyze/land/2019_2019/", "a");
        assert!(cache.lookup(&descriptor, Some("missing")).unwrap().is_none());
    }

    #[test]
    fn test_failed_record_is_not_replayed() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(tmp.path());
        let descriptor = JobDescriptor::new("api/analyze/soil/", "f");
        let mut record = JobRecord::new(&descriptor, "https://mmw.test");
        record.record_submission(json!({"job": "1"}), "1").unwrap();
        record
            .fail_polling(
                Some(json!({"error": "boom"})),
                mmw_core::JobFailure::Application {
                    message: "boom".into(),
                },
            )
            .unwrap();
        cache.store(&record).unwrap();
        assert!(cache.lookup(&descriptor, None).unwrap().is_none());
    }

    #[test]
    fn test_alt_path_used_when_derived_file_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(tmp.path().join("cache"));
        let alt = tmp.path().join("external.json");
        fs::write(&alt, r#"{"result": {"summary": [1, 2]}}"#).unwrap();

        let descriptor = JobDescriptor::new("api/analyze/soil/", "external");
        assert!(cache.lookup(&descriptor, None).unwrap().is_none());
        let cached = cache
            .lookup_with_fallback(&descriptor, Some(&alt), Some("summary"))
            .unwrap()
            .unwrap();
        assert_eq!(cached.result, json!({"summary": [1, 2]}));
        assert!(cached.record().is_none());
    }

    #[test]
    fn test_extract_result_order() {
        let nested = json!({
            "result_response": {"result": {"a": 1}},
            "result": {"b": 2},
            "c": 3
        });
        assert_eq!(extract_result(&nested, None), Some(json!({"a": 1})));
        assert_eq!(extract_result(&nested, Some("a")), Some(json!({"a": 1})));
        assert_eq!(extract_result(&nested, Some("b")), Some(json!({"b": 2})));
        assert_eq!(extract_result(&nested, Some("c")), Some(nested.clone()));
        assert_eq!(extract_result(&nested, Some("zzz")), None);

        let bare = json!({"c": 3});
        assert_eq!(extract_result(&bare, None), None);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(tmp.path());
        let descriptor = JobDescriptor::new("api/analyze/soil/", "bad");
        fs::write(cache.path_for(descriptor.endpoint(), descriptor.label()), "{not json").unwrap();
        let err = cache.lookup(&descriptor, None).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse dump file"));
    }
}
