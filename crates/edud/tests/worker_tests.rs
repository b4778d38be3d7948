//! Tests for the outbox worker.
//!
//! Tests verify:
//! - Issued certificates are rendered and their tasks acknowledged
//! - Redelivery overwrites the rendered file
//! - Failing tasks are released for retry with the error recorded
//! - Unknown tasks are dropped
//! - Certificates whose task was never queued are picked up by the sweep

use chrono::{TimeZone, Utc};
use edu_common::config::WorkerSettings;
use edu_common::engine::CertificateIssuer;
use edu_common::queue::TaskQueue;
use edu_common::store::SqliteStore;
use edu_shared::tasks::CERTIFICATE_ISSUED;
use edu_shared::{Course, EduError, EduResult, Task};
use edud::{CertificateDocument, Worker};
use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;

fn setup() -> (TempDir, SqliteStore, Worker) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(&dir.path().join("edu.db"), Duration::from_secs(5)).unwrap();
    let settings = WorkerSettings {
        render_dir: dir.path().join("rendered"),
        ..Default::default()
    };
    let worker = Worker::new(store.clone(), &settings);
    (dir, store, worker)
}

fn issue(store: &SqliteStore) -> uuid::Uuid {
    let now = Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap();
    let issuer = CertificateIssuer::new(store.clone(), store.outbox());
    issuer
        .register_course(&Course {
            id: 2,
            title: "Databases".to_string(),
            instructor_name: "Edgar".to_string(),
            duration_hours: 16,
        })
        .unwrap();
    issuer.record_enrollment(9, 2, 100.0, now).unwrap();
    issuer.issue_certificate(9, 2, now).unwrap().certificate.id
}

#[tokio::test]
async fn test_renders_issued_certificate() {
    let (_dir, store, worker) = setup();
    let id = issue(&store);

    let report = worker.run_once().await.unwrap();
    assert_eq!(report.claimed, 1);
    assert_eq!(report.completed, 1);
    assert_eq!(store.outbox().pending().unwrap(), 0);

    let path = worker.render_dir().join(format!("{}.json", id));
    let doc: CertificateDocument =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(doc.certificate.id, id);
    assert_eq!(doc.certificate.user_id, 9);
    assert!(doc.authentic);
    assert_eq!(doc.verification_path, format!("/api/certificates/verify/{}/", id));

    // Nothing left to do
    assert_eq!(worker.run_once().await.unwrap().claimed, 0);
}

#[tokio::test]
async fn test_redelivery_overwrites() {
    let (_dir, store, worker) = setup();
    let id = issue(&store);
    let outbox = store.outbox();

    // Simulate a duplicate delivery of the same event
    let task = Task::new(CERTIFICATE_ISSUED, json!({ "certificate_id": id.to_string() }));
    outbox.push(&task.name, &task.payload, Utc::now()).unwrap();

    let report = worker.run_once().await.unwrap();
    assert_eq!(report.completed, 2);

    let files: Vec<_> = std::fs::read_dir(worker.render_dir())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(files.len(), 1);
}

#[tokio::test]
async fn test_missing_certificate_is_released() {
    let (_dir, store, worker) = setup();
    let outbox = store.outbox();
    outbox
        .push(
            CERTIFICATE_ISSUED,
            &json!({ "certificate_id": uuid::Uuid::new_v4().to_string() }),
            Utc::now(),
        )
        .unwrap();

    let report = worker.run_once().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(outbox.pending().unwrap(), 1);

    let retry = outbox.claim(10, 60, Utc::now()).unwrap();
    assert_eq!(retry.len(), 1);
    assert!(retry[0].last_error.as_deref().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_unknown_task_dropped() {
    let (_dir, store, worker) = setup();
    store
        .outbox()
        .push("mystery.event", &json!({}), Utc::now())
        .unwrap();

    let report = worker.run_once().await.unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(store.outbox().pending().unwrap(), 0);
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let (_dir, store, worker) = setup();
    issue(&store);

    worker.run(async {}).await.unwrap();
    assert_eq!(store.outbox().pending().unwrap(), 0);
}

struct OfflineQueue;

impl TaskQueue for OfflineQueue {
    fn enqueue(&self, _name: &str, _payload: Value) -> EduResult<()> {
        Err(EduError::Queue("queue offline".to_string()))
    }
}

#[tokio::test]
async fn test_sweep_queues_lost_certificate_task() {
    let (_dir, store, worker) = setup();
    let issued_at = Utc.with_ymd_and_hms(2020, 5, 4, 9, 0, 0).unwrap();
    let issuer = CertificateIssuer::new(store.clone(), OfflineQueue);
    issuer
        .register_course(&Course {
            id: 3,
            title: "Networking".to_string(),
            instructor_name: "Vint".to_string(),
            duration_hours: 12,
        })
        .unwrap();
    issuer.record_enrollment(4, 3, 100.0, issued_at).unwrap();
    let id = issuer.issue_certificate(4, 3, issued_at).unwrap().certificate.id;
    assert_eq!(store.outbox().pending().unwrap(), 0);

    let report = worker.run_once().await.unwrap();
    assert_eq!(report.claimed, 1);
    assert_eq!(report.completed, 1);
    assert!(worker.render_dir().join(format!("{}.json", id)).exists());

    // Queued once only
    assert_eq!(worker.run_once().await.unwrap().claimed, 0);
}
