//! Roadmap and step model.
//!
//! Step order within a roadmap is always a contiguous permutation of
//! `[0, n)`. Roadmap status is derived from the steps and never stored.

use crate::error::{EduError, EduResult};
use crate::ids::{CourseId, RoadmapId, StepId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
        }
    }

    /// The only status this one may move to
    pub fn next(&self) -> Option<StepStatus> {
        match self {
            StepStatus::Pending => Some(StepStatus::InProgress),
            StepStatus::InProgress => Some(StepStatus::Completed),
            StepStatus::Completed => None,
        }
    }

    /// Validate a move to `to`
    pub fn transition(self, to: StepStatus) -> EduResult<StepStatus> {
        if self.next() == Some(to) {
            Ok(to)
        } else {
            Err(EduError::InvalidTransition {
                from: self.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = EduError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StepStatus::Pending),
            "in_progress" => Ok(StepStatus::InProgress),
            "completed" => Ok(StepStatus::Completed),
            other => Err(EduError::validation(format!("unknown step status: {}", other))),
        }
    }
}

/// Derived roadmap status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoadmapStatus {
    Pending,
    InProgress,
    Completed,
}

impl RoadmapStatus {
    /// Completed iff there is at least one step and every step is completed
    pub fn derive(steps: &[RoadmapStep]) -> Self {
        if !steps.is_empty() && steps.iter().all(|s| s.status == StepStatus::Completed) {
            RoadmapStatus::Completed
        } else if steps.iter().any(|s| s.status != StepStatus::Pending) {
            RoadmapStatus::InProgress
        } else {
            RoadmapStatus::Pending
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RoadmapStatus::Pending => "pending",
            RoadmapStatus::InProgress => "in_progress",
            RoadmapStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Roadmap {
    pub id: RoadmapId,
    pub user_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub target_skill: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a roadmap
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewRoadmap {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub target_skill: Option<String>,
}

impl NewRoadmap {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> EduResult<()> {
        if self.name.trim().is_empty() {
            return Err(EduError::validation("roadmap name must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadmapStep {
    pub id: StepId,
    pub roadmap_id: RoadmapId,
    pub title: String,
    pub description: Option<String>,
    pub course_id: Option<CourseId>,
    pub resource_url: Option<String>,
    pub order: u32,
    pub status: StepStatus,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Input for appending a step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewStep {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub course_id: Option<CourseId>,
    #[serde(default)]
    pub resource_url: Option<String>,
}

impl NewStep {
    pub fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> EduResult<()> {
        if self.title.trim().is_empty() {
            return Err(EduError::validation("step title must not be empty"));
        }
        Ok(())
    }
}

/// Step counts for a roadmap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadmapProgress {
    pub roadmap_id: RoadmapId,
    pub status: RoadmapStatus,
    pub total_steps: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub pending: usize,
    /// Rounded to one decimal
    pub progress_percentage: f64,
}

impl RoadmapProgress {
    pub fn summarize(roadmap_id: RoadmapId, steps: &[RoadmapStep]) -> Self {
        let count = |status| steps.iter().filter(|s| s.status == status).count();
        let total = steps.len();
        let completed = count(StepStatus::Completed);
        let in_progress = count(StepStatus::InProgress);
        let progress_percentage = if total > 0 {
            (completed as f64 / total as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };
        Self {
            roadmap_id,
            status: RoadmapStatus::derive(steps),
            total_steps: total,
            completed,
            in_progress,
            pending: total - completed - in_progress,
            progress_percentage,
        }
    }
}

/// Check that `ordered` is a permutation of the ids in `steps`
pub fn check_permutation(steps: &[RoadmapStep], ordered: &[StepId]) -> EduResult<()> {
    if ordered.len() != steps.len() {
        return Err(EduError::validation(format!(
            "expected {} step ids, got {}",
            steps.len(),
            ordered.len()
        )));
    }
    let existing: HashSet<StepId> = steps.iter().map(|s| s.id).collect();
    let mut seen = HashSet::with_capacity(ordered.len());
    for id in ordered {
        if !existing.contains(id) {
            return Err(EduError::validation(format!(
                "step {} does not belong to this roadmap",
                id
            )));
        }
        if !seen.insert(*id) {
            return Err(EduError::validation(format!("step {} listed twice", id)));
        }
    }
    Ok(())
}

/// Order values form exactly `[0, n)`
pub fn is_contiguous(steps: &[RoadmapStep]) -> bool {
    let mut orders: Vec<u32> = steps.iter().map(|s| s.order).collect();
    orders.sort_unstable();
    orders.iter().enumerate().all(|(i, &o)| o as usize == i)
}

/// Order for a step appended after `steps`
pub fn next_order(steps: &[RoadmapStep]) -> u32 {
    steps.iter().map(|s| s.order).max().map_or(0, |max| max + 1)
}
