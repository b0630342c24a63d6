use super::*;
use serde_json::json;

fn descriptor() -> JobDescriptor {
    JobDescriptor::new("api/analyze/land/2019_2019/", "020402050301")
        .with_payload(json!({"huc": "020402050301"}))
}

fn submitted() -> JobRecord {
    let mut record = JobRecord::new(&descriptor(), "https://modelmywatershed.org");
    record
        .record_submission(json!({"job": "abc123"}), "abc123")
        .unwrap();
    record
}

#[test]
fn test_new_record_starts_untouched() {
    let record = JobRecord::new(&descriptor(), "https://modelmywatershed.org");
    assert_eq!(record.submission_status(), JobStatus::NotStarted);
    assert_eq!(record.polling_status(), JobStatus::NotStarted);
    assert!(record.submission_response().is_none());
    assert!(record.job_id().is_none());
    assert!(!record.is_terminal());
    assert_eq!(record.label(), "020402050301");
    assert_eq!(record.endpoint(), "api/analyze/land/2019_2019/");
}

#[test]
fn test_successful_lifecycle() {
    let mut record = submitted();
    assert_eq!(record.job_id(), Some("abc123"));
    assert!(!record.is_terminal());

    record
        .record_result(json!({"status": "complete", "result": {"x": 1}}))
        .unwrap();
    assert!(record.succeeded());
    assert!(record.is_terminal());
    assert_eq!(record.result(), Some(&json!({"x": 1})));
    assert!(record.failure().is_none());
    assert!(record.finished_at().is_some());
}

#[test]
fn test_polling_requires_successful_submission() {
    let mut record = JobRecord::new(&descriptor(), "https://modelmywatershed.org");
    let err = record
        .record_result(json!({"status": "complete", "result": {}}))
        .unwrap_err();
    assert!(err.to_string().contains("submission has not succeeded"));
    assert_eq!(record.polling_status(), JobStatus::NotStarted);

    record
        .fail_submission(Some(json!({"detail": "bad"})), JobFailure::Protocol { status: 400 })
        .unwrap();
    assert!(record.fail_polling(None, JobFailure::MissingResult).is_err());
    assert!(record.is_terminal());
    assert!(record.failed());
}

#[test]
fn test_terminal_record_is_frozen() {
    let mut record = submitted();
    record.fail_polling(None, JobFailure::MissingResult).unwrap();

    let err = record
        .record_result(json!({"status": "complete", "result": {"x": 1}}))
        .unwrap_err();
    assert!(err.to_string().contains("already terminal"));
    assert!(record.result().is_none());
    assert_eq!(record.failure(), Some(&JobFailure::MissingResult));
}

#[test]
fn test_submission_cannot_be_recorded_twice() {
    let mut record = submitted();
    assert!(record.record_submission(json!({"job": "other"}), "other").is_err());
    assert_eq!(record.job_id(), Some("abc123"));
}

#[test]
fn test_failed_submission_keeps_error_payload() {
    let mut record = JobRecord::new(&descriptor(), "https://modelmywatershed.org");
    let body = json!({"detail": "Not found."});
    record
        .fail_submission(Some(body.clone()), JobFailure::Protocol { status: 404 })
        .unwrap();
    assert_eq!(record.submission_status(), JobStatus::Failed);
    assert_eq!(record.submission_response(), Some(&body));
    assert_eq!(record.error_response(), Some(&body));
    assert_eq!(record.polling_status(), JobStatus::NotStarted);
}

#[test]
fn test_serialized_keys_and_status_spelling() {
    let mut record = submitted();
    record.fail_polling(None, JobFailure::MissingResult).unwrap();

    let value = serde_json::to_value(&record).unwrap();
    assert_eq!(value["job_label"], "020402050301");
    assert_eq!(value["start_job_status"], "succeeded");
    assert_eq!(value["job_result_status"], "failed");
    assert_eq!(value["failure"]["kind"], "missing_result");
    assert!(value.get("result_response").is_none());
}

#[test]
fn test_reads_legacy_dump_spelling() {
    let legacy = json!({
        "job_label": "020402050301",
        "request_host": "https://staging.modelmywatershed.org",
        "request_endpoint": "mmw/modeling/tr55/",
        "payload": "model_input=%7B%7D",
        "start_job_status": "failed",
        "job_result_status": "Not Started",
        "error_response": {"detail": "Bad request"}
    });
    let record: JobRecord = serde_json::from_value(legacy).unwrap();
    assert_eq!(record.polling_status(), JobStatus::NotStarted);
    assert_eq!(
        record.payload(),
        Some(&Payload::Form("model_input=%7B%7D".into()))
    );
    assert!(record.is_terminal());
}

#[test]
fn test_payload_from_value() {
    assert_eq!(
        Payload::from(json!("a=1&b=2")),
        Payload::Form("a=1&b=2".into())
    );
    assert_eq!(
        Payload::from(json!({"huc": "02040205"})),
        Payload::Fields(json!({"huc": "02040205"}))
    );
}

#[test]
fn test_model_package_names() {
    assert_eq!(ModelPackage::Gwlfe.to_string(), "gwlfe");
    assert_eq!(
        serde_json::to_value(ModelPackage::Tr55).unwrap(),
        json!("tr-55")
    );
}
