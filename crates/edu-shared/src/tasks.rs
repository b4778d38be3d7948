//! Background task records.

use crate::certificate::Certificate;
use crate::ids::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Render the certificate document and notify its owner
pub const CERTIFICATE_ISSUED: &str = "certificate.issued";

/// Task as handed to a queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    pub payload: Value,
}

impl Task {
    pub fn new(name: &str, payload: Value) -> Self {
        Self {
            name: name.to_string(),
            payload,
        }
    }

    pub fn certificate_issued(cert: &Certificate) -> Self {
        Self::new(
            CERTIFICATE_ISSUED,
            json!({
                "certificate_id": cert.id,
                "user_id": cert.user_id,
                "course_id": cert.course_id,
                "verification_path": cert.verification_path(),
            }),
        )
    }
}

/// Task as stored in a durable queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedTask {
    pub id: TaskId,
    pub name: String,
    pub payload: Value,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
}
