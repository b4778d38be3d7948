//! Learner activity events and the XP table.
//!
//! Activities arrive as tagged JSON (`{"type": "course_completed", ...}`).
//! Each variant maps to an [`ActivityKind`], which is the key into the
//! [`XpTable`]. Per-kind validation runs before any XP is computed.

use crate::error::{EduError, EduResult};
use crate::ids::{AssessmentId, CourseId, StepId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MAX_SESSION_MINUTES: u32 = 24 * 60;

/// Activity discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    DailyLogin,
    CourseEnrolled,
    ModuleCompleted,
    CourseCompleted,
    AssessmentCompleted,
    RoadmapStepCompleted,
    StudySession,
    XpAdjustment,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 8] = [
        ActivityKind::DailyLogin,
        ActivityKind::CourseEnrolled,
        ActivityKind::ModuleCompleted,
        ActivityKind::CourseCompleted,
        ActivityKind::AssessmentCompleted,
        ActivityKind::RoadmapStepCompleted,
        ActivityKind::StudySession,
        ActivityKind::XpAdjustment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::DailyLogin => "daily_login",
            ActivityKind::CourseEnrolled => "course_enrolled",
            ActivityKind::ModuleCompleted => "module_completed",
            ActivityKind::CourseCompleted => "course_completed",
            ActivityKind::AssessmentCompleted => "assessment_completed",
            ActivityKind::RoadmapStepCompleted => "roadmap_step_completed",
            ActivityKind::StudySession => "study_session",
            ActivityKind::XpAdjustment => "xp_adjustment",
        }
    }

    /// Manual XP adjustments do not count as learning days.
    pub fn counts_for_streak(&self) -> bool {
        !matches!(self, ActivityKind::XpAdjustment)
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityKind {
    type Err = EduError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActivityKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| EduError::validation(format!("unknown activity type: {}", s)))
    }
}

/// What the learner did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityDetail {
    DailyLogin,
    CourseEnrolled { course_id: CourseId },
    ModuleCompleted { course_id: CourseId },
    CourseCompleted { course_id: CourseId },
    AssessmentCompleted { assessment_id: AssessmentId, score: u8 },
    RoadmapStepCompleted { step_id: StepId },
    StudySession { minutes: u32 },
    XpAdjustment { amount: i64, reason: String },
}

impl ActivityDetail {
    pub fn kind(&self) -> ActivityKind {
        match self {
            ActivityDetail::DailyLogin => ActivityKind::DailyLogin,
            ActivityDetail::CourseEnrolled { .. } => ActivityKind::CourseEnrolled,
            ActivityDetail::ModuleCompleted { .. } => ActivityKind::ModuleCompleted,
            ActivityDetail::CourseCompleted { .. } => ActivityKind::CourseCompleted,
            ActivityDetail::AssessmentCompleted { .. } => ActivityKind::AssessmentCompleted,
            ActivityDetail::RoadmapStepCompleted { .. } => ActivityKind::RoadmapStepCompleted,
            ActivityDetail::StudySession { .. } => ActivityKind::StudySession,
            ActivityDetail::XpAdjustment { .. } => ActivityKind::XpAdjustment,
        }
    }

    pub fn is_perfect_score(&self) -> bool {
        matches!(self, ActivityDetail::AssessmentCompleted { score: 100, .. })
    }

    /// Per-kind input rules
    pub fn validate(&self) -> EduResult<()> {
        match self {
            ActivityDetail::AssessmentCompleted { score, .. } if *score > 100 => Err(
                EduError::validation(format!("assessment score must be 0-100, got {}", score)),
            ),
            ActivityDetail::StudySession { minutes }
                if *minutes == 0 || *minutes > MAX_SESSION_MINUTES =>
            {
                Err(EduError::validation(format!(
                    "study session minutes must be 1-{}, got {}",
                    MAX_SESSION_MINUTES, minutes
                )))
            }
            ActivityDetail::XpAdjustment { amount: 0, .. } => {
                Err(EduError::validation("xp adjustment must be non-zero"))
            }
            _ => Ok(()),
        }
    }
}

/// A timestamped activity event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(flatten)]
    pub detail: ActivityDetail,
    pub occurred_at: DateTime<Utc>,
}

impl Activity {
    pub fn new(detail: ActivityDetail, occurred_at: DateTime<Utc>) -> Self {
        Self {
            detail,
            occurred_at,
        }
    }

    pub fn kind(&self) -> ActivityKind {
        self.detail.kind()
    }

    /// Parse an activity from untyped JSON. Unknown `type` values and
    /// malformed payloads are validation errors.
    pub fn from_json(value: serde_json::Value) -> EduResult<Self> {
        if let Some(tag) = value.get("type").and_then(|t| t.as_str()) {
            tag.parse::<ActivityKind>()?;
        }
        serde_json::from_value(value)
            .map_err(|e| EduError::validation(format!("malformed activity: {}", e)))
    }
}

/// XP awarded per activity kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XpTable {
    pub daily_login: u64,
    pub course_enrolled: u64,
    pub module_completed: u64,
    pub course_completed: u64,
    pub assessment_completed: u64,
    /// Extra XP on top of `assessment_completed` for a 100% score
    pub perfect_score_bonus: u64,
    pub roadmap_step_completed: u64,
    pub study_minute: u64,
}

impl Default for XpTable {
    fn default() -> Self {
        Self {
            daily_login: 5,
            course_enrolled: 10,
            module_completed: 20,
            course_completed: 100,
            assessment_completed: 50,
            perfect_score_bonus: 25,
            roadmap_step_completed: 15,
            study_minute: 1,
        }
    }
}

impl XpTable {
    /// XP delta for an activity. Validates the activity first.
    pub fn xp_delta(&self, detail: &ActivityDetail) -> EduResult<i64> {
        detail.validate()?;
        let delta = match detail {
            ActivityDetail::DailyLogin => Some(self.daily_login),
            ActivityDetail::CourseEnrolled { .. } => Some(self.course_enrolled),
            ActivityDetail::ModuleCompleted { .. } => Some(self.module_completed),
            ActivityDetail::CourseCompleted { .. } => Some(self.course_completed),
            ActivityDetail::AssessmentCompleted { .. } if detail.is_perfect_score() => self
                .assessment_completed
                .checked_add(self.perfect_score_bonus),
            ActivityDetail::AssessmentCompleted { .. } => Some(self.assessment_completed),
            ActivityDetail::RoadmapStepCompleted { .. } => Some(self.roadmap_step_completed),
            ActivityDetail::StudySession { minutes } => {
                self.study_minute.checked_mul(u64::from(*minutes))
            }
            ActivityDetail::XpAdjustment { amount, .. } => return Ok(*amount),
        }
        .ok_or_else(|| EduError::validation("xp delta out of range"))?;
        i64::try_from(delta).map_err(|_| EduError::validation("xp delta out of range"))
    }
}
