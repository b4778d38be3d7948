//! Per-user progress snapshot.

use crate::activity::ActivityDetail;
use crate::ids::UserId;
use crate::levels::{rank_for, LevelTable};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Running totals used by achievement criteria
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityCounters {
    pub courses_enrolled: u32,
    pub courses_completed: u32,
    pub modules_completed: u32,
    pub assessments_completed: u32,
    pub perfect_scores: u32,
    pub steps_completed: u32,
    pub minutes_spent: u64,
}

impl ActivityCounters {
    pub fn record(&mut self, detail: &ActivityDetail) {
        match detail {
            ActivityDetail::CourseEnrolled { .. } => self.courses_enrolled += 1,
            ActivityDetail::ModuleCompleted { .. } => self.modules_completed += 1,
            ActivityDetail::CourseCompleted { .. } => self.courses_completed += 1,
            ActivityDetail::AssessmentCompleted { .. } => {
                self.assessments_completed += 1;
                if detail.is_perfect_score() {
                    self.perfect_scores += 1;
                }
            }
            ActivityDetail::RoadmapStepCompleted { .. } => self.steps_completed += 1,
            ActivityDetail::StudySession { minutes } => {
                self.minutes_spent = self.minutes_spent.saturating_add(*minutes as u64)
            }
            ActivityDetail::DailyLogin | ActivityDetail::XpAdjustment { .. } => {}
        }
    }
}

/// XP, level and streak state for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProgress {
    pub user_id: UserId,
    pub xp: u64,
    pub level: u32,
    pub rank: String,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_activity_date: Option<NaiveDate>,
    #[serde(default)]
    pub counters: ActivityCounters,
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserProgress {
    /// Zero snapshot for a user with no recorded activity
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            xp: 0,
            level: 1,
            rank: rank_for(0).to_string(),
            current_streak: 0,
            longest_streak: 0,
            last_activity_date: None,
            counters: ActivityCounters::default(),
            updated_at: None,
        }
    }

    /// Set XP and re-derive level and rank from it
    pub fn set_xp(&mut self, xp: u64, levels: &LevelTable) {
        self.xp = xp;
        self.level = levels.level_for(xp);
        self.rank = rank_for(xp).to_string();
    }

    /// Add XP, saturating at `u64::MAX`
    pub fn add_xp(&mut self, amount: u64, levels: &LevelTable) {
        self.set_xp(self.xp.saturating_add(amount), levels);
    }

    /// XP after applying a signed delta, or `None` if it would go negative
    pub fn xp_after(&self, delta: i64) -> Option<u64> {
        if delta >= 0 {
            Some(self.xp.saturating_add(delta as u64))
        } else {
            self.xp.checked_sub(delta.unsigned_abs())
        }
    }

    /// Level invariant: level is derived from xp
    pub fn is_consistent(&self, levels: &LevelTable) -> bool {
        self.level == levels.level_for(self.xp)
            && self.rank == rank_for(self.xp)
            && self.longest_streak >= self.current_streak
    }
}

/// Read-only view with next-level details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressView {
    #[serde(flatten)]
    pub progress: UserProgress,
    pub xp_to_next_level: u64,
    pub level_progress: f64,
}

impl ProgressView {
    pub fn new(progress: UserProgress, levels: &LevelTable) -> Self {
        Self {
            xp_to_next_level: levels.xp_to_next(progress.xp),
            level_progress: levels.progress_to_next(progress.xp),
            progress,
        }
    }
}
