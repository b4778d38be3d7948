//! Certificate issuance and verification.

use crate::store::Store;
use crate::queue::TaskQueue;
use chrono::{DateTime, Utc};
use edu_shared::tasks::Task;
use edu_shared::{
    Certificate, Course, CourseId, EduError, EduResult, Enrollment, Issued, UserId, Verification,
};
use tracing::{info, warn};
use uuid::Uuid;

pub struct CertificateIssuer<S, Q> {
    store: S,
    queue: Q,
    completion_threshold: f64,
}

impl<S: Store, Q: TaskQueue> CertificateIssuer<S, Q> {
    pub fn new(store: S, queue: Q) -> Self {
        Self {
            store,
            queue,
            completion_threshold: 100.0,
        }
    }

    /// Minimum enrollment progress (percent) required to issue
    pub fn with_completion_threshold(mut self, threshold: f64) -> Self {
        self.completion_threshold = threshold;
        self
    }

    /// Add or update a course record
    pub fn register_course(&self, course: &Course) -> EduResult<()> {
        course.validate()?;
        self.store.transaction(|tx| tx.upsert_course(course))
    }

    /// Create or update the enrollment for (user, course)
    pub fn record_enrollment(
        &self,
        user_id: UserId,
        course_id: CourseId,
        progress: f64,
        now: DateTime<Utc>,
    ) -> EduResult<Enrollment> {
        self.store.transaction(|tx| {
            if tx.load_course(course_id)?.is_none() {
                return Err(EduError::not_found("course", course_id));
            }
            let mut enrollment = tx
                .load_enrollment(user_id, course_id)?
                .unwrap_or_else(|| Enrollment::new(user_id, course_id));
            enrollment.set_progress(progress, now)?;
            tx.upsert_enrollment(&enrollment)?;
            Ok(enrollment)
        })
    }

    /// Issue the certificate for a completed course. Idempotent per
    /// (user, course): a second call returns the stored certificate with
    /// `created = false`. The issued task is queued at least once; a call
    /// that finds the certificate but no record of its task queues it again.
    pub fn issue_certificate(
        &self,
        user_id: UserId,
        course_id: CourseId,
        now: DateTime<Utc>,
    ) -> EduResult<Issued> {
        let threshold = self.completion_threshold;
        let (issued, queued) = self.store.transaction(|tx| {
            let enrollment = tx.load_enrollment(user_id, course_id)?.ok_or_else(|| {
                EduError::precondition(format!(
                    "user {} is not enrolled in course {}",
                    user_id, course_id
                ))
            })?;
            if !enrollment.meets(threshold) {
                return Err(EduError::precondition(format!(
                    "course {} is {}% complete, {}% required",
                    course_id, enrollment.progress, threshold
                )));
            }

            if let Some(existing) = tx.find_certificate(user_id, course_id)? {
                let queued = tx.certificate_task_queued(existing.id)?;
                let issued = Issued {
                    certificate: existing,
                    created: false,
                };
                return Ok((issued, queued));
            }

            let course = tx
                .load_course(course_id)?
                .ok_or_else(|| EduError::not_found("course", course_id))?;
            let fresh = Certificate::issue(&course, &enrollment, now);
            let stored = tx.insert_certificate(&fresh)?;
            let queued = tx.certificate_task_queued(stored.id)?;
            let issued = Issued {
                created: stored.id == fresh.id,
                certificate: stored,
            };
            Ok((issued, queued))
        })?;

        if issued.created {
            info!(
                "Issued certificate {} to user {} for course {}",
                issued.certificate.id, user_id, course_id
            );
        }
        if !queued {
            if let Err(e) = self.queue_issued(&issued.certificate, now) {
                warn!(
                    "Certificate {} issued but task not queued: {}",
                    issued.certificate.id, e
                );
            }
        }

        Ok(issued)
    }

    /// Queue the issued task for certificates older than `issued_before`
    /// that never had one accepted. Returns how many were queued.
    pub fn requeue_unqueued(
        &self,
        issued_before: DateTime<Utc>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> EduResult<usize> {
        let pending = self
            .store
            .read(|tx| tx.unqueued_certificates(issued_before, limit))?;
        let mut queued = 0;
        for cert in &pending {
            self.queue_issued(cert, now)?;
            queued += 1;
        }
        if queued > 0 {
            info!("Queued {} certificate tasks left over from earlier runs", queued);
        }
        Ok(queued)
    }

    // Enqueue, then record it. A crash between the two only causes a
    // duplicate delivery.
    fn queue_issued(&self, cert: &Certificate, now: DateTime<Utc>) -> EduResult<()> {
        let task = Task::certificate_issued(cert);
        self.queue.enqueue(&task.name, task.payload)?;
        self.store
            .transaction(|tx| tx.mark_certificate_queued(cert.id, now))
    }

    /// Look up a certificate and check its fingerprint
    pub fn verify_certificate(&self, id: Uuid) -> EduResult<Verification> {
        let certificate = self
            .store
            .read(|tx| tx.certificate_by_id(id))?
            .ok_or_else(|| EduError::not_found("certificate", id))?;
        Ok(Verification {
            authentic: certificate.is_authentic(),
            certificate,
        })
    }

    pub fn certificates_for_user(&self, user_id: UserId) -> EduResult<Vec<Certificate>> {
        self.store.read(|tx| tx.certificates_for_user(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use edu_shared::tasks::CERTIFICATE_ISSUED;
    use serde_json::Value;
    use std::sync::Arc;

    struct BrokenQueue;

    impl TaskQueue for BrokenQueue {
        fn enqueue(&self, _name: &str, _payload: Value) -> EduResult<()> {
            Err(EduError::Queue("broker unreachable".to_string()))
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 14, 16, 45, 30).unwrap()
    }

    fn course() -> Course {
        Course {
            id: 10,
            title: "Async Rust".to_string(),
            instructor_name: "Ada".to_string(),
            duration_hours: 8,
        }
    }

    fn issuer() -> (CertificateIssuer<MemoryStore, Arc<MemoryQueue>>, Arc<MemoryQueue>) {
        let queue = Arc::new(MemoryQueue::new());
        let issuer = CertificateIssuer::new(MemoryStore::new(), Arc::clone(&queue));
        issuer.register_course(&course()).unwrap();
        (issuer, queue)
    }

    #[test]
    fn test_issue_once() {
        let (issuer, queue) = issuer();
        issuer.record_enrollment(1, 10, 100.0, now()).unwrap();

        let first = issuer.issue_certificate(1, 10, now()).unwrap();
        assert!(first.created);
        assert_eq!(first.certificate.course_title, "Async Rust");
        assert_eq!(first.certificate.hours_completed, 8);

        let second = issuer.issue_certificate(1, 10, now()).unwrap();
        assert!(!second.created);
        assert_eq!(second.certificate.id, first.certificate.id);

        let tasks = queue.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, CERTIFICATE_ISSUED);
        assert_eq!(
            tasks[0].payload["certificate_id"],
            first.certificate.id.to_string()
        );
    }

    #[test]
    fn test_requires_enrollment() {
        let (issuer, queue) = issuer();
        let err = issuer.issue_certificate(1, 10, now()).unwrap_err();
        assert_eq!(err.kind(), "precondition_failed");
        assert!(queue.tasks().is_empty());
    }

    #[test]
    fn test_requires_completion() {
        let (issuer, _) = issuer();
        issuer.record_enrollment(1, 10, 99.5, now()).unwrap();
        let err = issuer.issue_certificate(1, 10, now()).unwrap_err();
        assert_eq!(err.code(), 412);
        assert!(issuer.certificates_for_user(1).unwrap().is_empty());
    }

    #[test]
    fn test_lower_threshold() {
        let (issuer, _) = issuer();
        let issuer = issuer.with_completion_threshold(80.0);
        issuer.record_enrollment(2, 10, 85.0, now()).unwrap();
        assert!(issuer.issue_certificate(2, 10, now()).unwrap().created);
    }

    #[test]
    fn test_enrollment_for_unknown_course() {
        let (issuer, _) = issuer();
        let err = issuer.record_enrollment(1, 404, 10.0, now()).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_queue_failure_keeps_certificate() {
        let store = Arc::new(MemoryStore::new());
        let broken = CertificateIssuer::new(Arc::clone(&store), BrokenQueue);
        broken.register_course(&course()).unwrap();
        broken.record_enrollment(3, 10, 100.0, now()).unwrap();

        let issued = broken.issue_certificate(3, 10, now()).unwrap();
        assert!(issued.created);
        assert_eq!(broken.certificates_for_user(3).unwrap().len(), 1);

        // A retry through a working queue delivers the task once
        let queue = Arc::new(MemoryQueue::new());
        let issuer = CertificateIssuer::new(Arc::clone(&store), Arc::clone(&queue));
        let retry = issuer.issue_certificate(3, 10, now()).unwrap();
        assert!(!retry.created);
        assert_eq!(retry.certificate.id, issued.certificate.id);
        assert_eq!(queue.tasks().len(), 1);

        issuer.issue_certificate(3, 10, now()).unwrap();
        assert_eq!(queue.tasks().len(), 1);
    }

    #[test]
    fn test_requeue_unqueued() {
        let store = Arc::new(MemoryStore::new());
        let broken = CertificateIssuer::new(Arc::clone(&store), BrokenQueue);
        broken.register_course(&course()).unwrap();
        for user in [4, 5] {
            broken.record_enrollment(user, 10, 100.0, now()).unwrap();
            broken.issue_certificate(user, 10, now()).unwrap();
        }
        assert!(broken.requeue_unqueued(now(), 10, now()).is_err());

        let queue = Arc::new(MemoryQueue::new());
        let issuer = CertificateIssuer::new(Arc::clone(&store), Arc::clone(&queue));
        let earlier = now() - chrono::Duration::seconds(1);
        assert_eq!(issuer.requeue_unqueued(earlier, 10, now()).unwrap(), 0);
        assert_eq!(issuer.requeue_unqueued(now(), 10, now()).unwrap(), 2);
        assert_eq!(issuer.requeue_unqueued(now(), 10, now()).unwrap(), 0);
        assert_eq!(queue.tasks().len(), 2);
    }

    #[test]
    fn test_verify() {
        let (issuer, _) = issuer();
        issuer.record_enrollment(1, 10, 100.0, now()).unwrap();
        let issued = issuer.issue_certificate(1, 10, now()).unwrap();

        let check = issuer.verify_certificate(issued.certificate.id).unwrap();
        assert!(check.authentic);
        assert_eq!(check.certificate, issued.certificate);

        let missing = issuer.verify_certificate(Uuid::new_v4()).unwrap_err();
        assert_eq!(missing.code(), 404);
    }

    #[test]
    fn test_completion_date_from_enrollment() {
        let (issuer, _) = issuer();
        let finished = Utc.with_ymd_and_hms(2026, 7, 1, 8, 0, 0).unwrap();
        issuer.record_enrollment(1, 10, 100.0, finished).unwrap();
        let issued = issuer.issue_certificate(1, 10, now()).unwrap();
        assert_eq!(issued.certificate.completion_date, finished.date_naive());
    }
}
