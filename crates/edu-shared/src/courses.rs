//! Course and enrollment records owned by the course catalog.
//!
//! The core only needs enough of them to decide certificate eligibility and
//! to snapshot course details into a certificate.

use crate::error::{EduError, EduResult};
use crate::ids::{CourseId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub title: String,
    pub instructor_name: String,
    /// Estimated course duration in hours
    #[serde(default)]
    pub duration_hours: u32,
}

impl Course {
    pub fn validate(&self) -> EduResult<()> {
        if self.title.trim().is_empty() {
            return Err(EduError::validation("course title must not be empty"));
        }
        Ok(())
    }
}

/// A user's enrollment in a course
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub user_id: UserId,
    pub course_id: CourseId,
    /// Completion percentage, 0-100
    pub progress: f64,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Enrollment {
    pub fn new(user_id: UserId, course_id: CourseId) -> Self {
        Self {
            user_id,
            course_id,
            progress: 0.0,
            completed_at: None,
        }
    }

    /// Set progress; reaching 100 stamps `completed_at` once.
    pub fn set_progress(&mut self, progress: f64, now: DateTime<Utc>) -> EduResult<()> {
        if !(0.0..=100.0).contains(&progress) {
            return Err(EduError::validation(format!(
                "enrollment progress must be 0-100, got {}",
                progress
            )));
        }
        self.progress = progress;
        if progress >= 100.0 && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    pub fn meets(&self, threshold: f64) -> bool {
        self.progress >= threshold
    }
}
