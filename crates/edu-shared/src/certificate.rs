//! Course completion certificates.
//!
//! A certificate carries a snapshot of the course at issue time and a
//! SHA-256 fingerprint over its identifying fields. Verification recomputes
//! the fingerprint, so an edited row is detected.

use crate::courses::{Course, Enrollment};
use crate::ids::{CourseId, UserId};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const VERIFY_PATH_PREFIX: &str = "/api/certificates/verify";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: Uuid,
    pub user_id: UserId,
    pub course_id: CourseId,
    pub course_title: String,
    pub instructor_name: String,
    pub completion_date: NaiveDate,
    pub hours_completed: u32,
    pub issued_at: DateTime<Utc>,
    pub fingerprint: String,
}

impl Certificate {
    /// Build a new certificate with a fresh v4 id.
    ///
    /// `issued_at` is truncated to whole seconds so the fingerprint survives
    /// storage round trips.
    pub fn issue(course: &Course, enrollment: &Enrollment, now: DateTime<Utc>) -> Self {
        let issued_at = DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now);
        let completion_date = enrollment.completed_at.unwrap_or(issued_at).date_naive();
        let mut cert = Self {
            id: Uuid::new_v4(),
            user_id: enrollment.user_id,
            course_id: course.id,
            course_title: course.title.clone(),
            instructor_name: course.instructor_name.clone(),
            completion_date,
            hours_completed: course.duration_hours,
            issued_at,
            fingerprint: String::new(),
        };
        cert.fingerprint = cert.compute_fingerprint();
        cert
    }

    pub fn compute_fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [
            self.id.to_string(),
            self.user_id.to_string(),
            self.course_id.to_string(),
            self.course_title.clone(),
            self.completion_date.to_string(),
            self.issued_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        ] {
            hasher.update(part.as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }

    pub fn is_authentic(&self) -> bool {
        self.fingerprint == self.compute_fingerprint()
    }

    pub fn verification_path(&self) -> String {
        format!("{}/{}/", VERIFY_PATH_PREFIX, self.id)
    }
}

/// Result of a verification lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub certificate: Certificate,
    pub authentic: bool,
}

/// Result of an issue request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issued {
    pub certificate: Certificate,
    /// False when an existing certificate was returned
    pub created: bool,
}
