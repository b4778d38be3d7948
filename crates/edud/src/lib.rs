//! Edud - background worker for the EduAI progress core
//!
//! Drains the task outbox: claim a batch, handle each task, ack on success,
//! release with the error on failure. Delivery is at-least-once, so every
//! handler must tolerate running twice for the same task.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use edu_common::config::WorkerSettings;
use edu_common::engine::CertificateIssuer;
use edu_common::store::{SqliteOutbox, SqliteStore, Store};
use edu_shared::tasks::CERTIFICATE_ISSUED;
use edu_shared::{Certificate, QueuedTask};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What one poll did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub claimed: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Certificate document written for the learner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateDocument {
    pub certificate: Certificate,
    pub verification_path: String,
    pub authentic: bool,
    pub rendered_at: DateTime<Utc>,
}

/// How a task ended
#[derive(Debug, Clone, PartialEq, Eq)]
enum Handled {
    Done,
    Skipped,
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> edu_shared::EduResult<T> + Send + 'static,
    T: Send + 'static,
{
    let value = tokio::task::spawn_blocking(f)
        .await
        .context("Blocking task panicked")??;
    Ok(value)
}

pub struct Worker {
    store: SqliteStore,
    outbox: SqliteOutbox,
    render_dir: PathBuf,
    batch_size: usize,
    lease_secs: u64,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(store: SqliteStore, settings: &WorkerSettings) -> Self {
        Self {
            outbox: store.outbox(),
            store,
            render_dir: settings.render_dir.clone(),
            batch_size: settings.effective_batch_size(),
            lease_secs: settings.effective_lease_secs(),
            poll_interval: Duration::from_secs(settings.effective_poll_interval()),
        }
    }

    pub fn render_dir(&self) -> &Path {
        &self.render_dir
    }

    /// Claim and process one batch
    pub async fn run_once(&self) -> Result<BatchReport> {
        if let Err(e) = self.requeue_certificates().await {
            warn!("Certificate task sweep failed: {:#}", e);
        }

        let outbox = self.outbox.clone();
        let (limit, lease) = (self.batch_size, self.lease_secs);
        let tasks = blocking(move || outbox.claim(limit, lease, Utc::now())).await?;

        let mut report = BatchReport {
            claimed: tasks.len(),
            ..Default::default()
        };
        for task in tasks {
            let id = task.id;
            match self.handle(&task).await {
                Ok(handled) => {
                    debug!("Task {} ({}) {:?}", id, task.name, handled);
                    let outbox = self.outbox.clone();
                    blocking(move || outbox.ack(id)).await?;
                    report.completed += 1;
                }
                Err(e) => {
                    warn!(
                        "Task {} ({}) failed on attempt {}: {:#}",
                        id, task.name, task.attempts, e
                    );
                    let outbox = self.outbox.clone();
                    let message = format!("{:#}", e);
                    blocking(move || outbox.release(id, &message)).await?;
                    report.failed += 1;
                }
            }
        }

        if report.claimed > 0 {
            info!(
                "Processed {} tasks ({} ok, {} failed)",
                report.claimed, report.completed, report.failed
            );
        }
        Ok(report)
    }

    /// Poll until `shutdown` resolves. A failed poll is logged and retried
    /// on the next tick.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(
            "Worker polling every {}s (batch {}, lease {}s)",
            self.poll_interval.as_secs(),
            self.batch_size,
            self.lease_secs
        );

        loop {
            if let Err(e) = self.run_once().await {
                warn!("Outbox poll failed: {:#}", e);
            }
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        Ok(())
    }

    // Certificates whose issuer stopped before queueing their task. Anything
    // younger than a lease may still be in flight.
    async fn requeue_certificates(&self) -> Result<usize> {
        let issuer = CertificateIssuer::new(self.store.clone(), self.outbox.clone());
        let now = Utc::now();
        let cutoff = now - chrono::Duration::seconds(self.lease_secs as i64);
        let limit = self.batch_size;
        blocking(move || issuer.requeue_unqueued(cutoff, limit, now)).await
    }

    async fn handle(&self, task: &QueuedTask) -> Result<Handled> {
        match task.name.as_str() {
            CERTIFICATE_ISSUED => {
                self.render_certificate(&task.payload).await?;
                Ok(Handled::Done)
            }
            other => {
                // Nothing will ever handle it; drop instead of redelivering forever
                warn!("Dropping task {} with unknown name {}", task.id, other);
                Ok(Handled::Skipped)
            }
        }
    }

    /// Write `<render_dir>/<uuid>.json`, replacing any earlier rendering
    pub async fn render_certificate(&self, payload: &Value) -> Result<PathBuf> {
        let raw = payload
            .get("certificate_id")
            .and_then(Value::as_str)
            .context("Payload has no certificate_id")?;
        let id = Uuid::parse_str(raw).with_context(|| format!("Bad certificate id {}", raw))?;

        let store = self.store.clone();
        let certificate = blocking(move || store.read(|tx| tx.certificate_by_id(id)))
            .await?
            .with_context(|| format!("Certificate {} not found", id))?;

        let doc = CertificateDocument {
            verification_path: certificate.verification_path(),
            authentic: certificate.is_authentic(),
            rendered_at: Utc::now(),
            certificate,
        };

        tokio::fs::create_dir_all(&self.render_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.render_dir.display()))?;
        let path = self.render_dir.join(format!("{}.json", id));
        let tmp = self.render_dir.join(format!(".{}.json.tmp", id));
        let body = serde_json::to_vec_pretty(&doc).context("Failed to serialize certificate")?;
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to move certificate into {}", path.display()))?;

        info!(
            "Rendered certificate {} ({}) to {}",
            id,
            doc.certificate.course_title,
            path.display()
        );
        info!(
            "Notify user {}: certificate for \"{}\" is ready at {}",
            doc.certificate.user_id, doc.certificate.course_title, doc.verification_path
        );
        Ok(path)
    }
}
