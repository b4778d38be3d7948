//! Progress engine: XP, levels, streaks and achievement unlocks.
//!
//! `apply_activity` is one unit of work: load, compute, unlock, save. Any
//! error before the commit leaves the stored snapshot untouched.

use crate::config::EduConfig;
use crate::store::{Store, StoreTx};
use anyhow::Result;
use chrono::{DateTime, Utc};
use edu_shared::achievements::overview;
use edu_shared::streaks::{advance_streak, streak_bonus};
use edu_shared::{
    AchievementCatalog, AchievementView, Activity, DayBoundary, EduError, EduResult, LevelTable,
    ProgressView, StreakChange, UnlockedAchievement, UserId, UserProgress, XpTable,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

pub const LEADERBOARD_MAX: usize = 100;

/// Result of one applied activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityOutcome {
    pub progress: UserProgress,
    /// XP from the activity itself (may be negative for adjustments)
    pub xp_delta: i64,
    pub streak_bonus: u64,
    pub achievement_xp: u64,
    pub streak: StreakChange,
    pub previous_level: u32,
    pub leveled_up: bool,
    pub unlocked: Vec<UnlockedAchievement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub position: u64,
    pub user_id: UserId,
    pub xp: u64,
    pub level: u32,
    pub rank: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leaderboard {
    pub entries: Vec<LeaderboardEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewer: Option<LeaderboardEntry>,
}

pub struct ProgressEngine<S> {
    store: S,
    xp_table: XpTable,
    levels: LevelTable,
    catalog: AchievementCatalog,
    days: DayBoundary,
    streak_bonus_enabled: bool,
}

impl<S: Store> ProgressEngine<S> {
    /// Default XP table, level curve and UTC days
    pub fn new(store: S, catalog: AchievementCatalog) -> Self {
        Self {
            store,
            xp_table: XpTable::default(),
            levels: LevelTable::default(),
            catalog,
            days: DayBoundary::utc(),
            streak_bonus_enabled: true,
        }
    }

    pub fn from_config(store: S, config: &EduConfig) -> Result<Self> {
        Ok(Self::new(store, config.catalog()?)
            .with_xp_table(config.progress.xp.clone())
            .with_levels(config.progress.level_table()?)
            .with_day_boundary(config.progress.day_boundary())
            .with_streak_bonus(config.progress.streak_bonus_enabled))
    }

    pub fn with_xp_table(mut self, xp_table: XpTable) -> Self {
        self.xp_table = xp_table;
        self
    }

    pub fn with_levels(mut self, levels: LevelTable) -> Self {
        self.levels = levels;
        self
    }

    pub fn with_day_boundary(mut self, days: DayBoundary) -> Self {
        self.days = days;
        self
    }

    pub fn with_streak_bonus(mut self, enabled: bool) -> Self {
        self.streak_bonus_enabled = enabled;
        self
    }

    pub fn levels(&self) -> &LevelTable {
        &self.levels
    }

    pub fn catalog(&self) -> &AchievementCatalog {
        &self.catalog
    }

    /// Apply one activity event for `user_id`. `now` stamps the snapshot and
    /// any unlocks; the streak uses the activity's own timestamp.
    pub fn apply_activity(
        &self,
        user_id: UserId,
        activity: &Activity,
        now: DateTime<Utc>,
    ) -> EduResult<ActivityOutcome> {
        activity.detail.validate()?;
        let xp_delta = self.xp_table.xp_delta(&activity.detail)?;
        let day = self.days.day_of(activity.occurred_at);

        let outcome = self.store.transaction(|tx| {
            let mut progress = self.load_current(tx, user_id)?;
            let previous_level = progress.level;

            let mut xp = progress.xp_after(xp_delta).ok_or_else(|| {
                EduError::validation(format!(
                    "xp would become negative: {} {:+}",
                    progress.xp, xp_delta
                ))
            })?;

            let mut bonus = 0;
            let streak = if activity.kind().counts_for_streak() {
                let previous = progress.current_streak;
                let out = advance_streak(
                    progress.current_streak,
                    progress.longest_streak,
                    progress.last_activity_date,
                    day,
                );
                progress.current_streak = out.current;
                progress.longest_streak = out.longest;
                progress.last_activity_date = out.last_day;
                if self.streak_bonus_enabled && out.grew(previous) {
                    bonus = streak_bonus(out.current);
                }
                out.change
            } else {
                StreakChange::Ignored
            };
            xp = xp.saturating_add(bonus);

            progress.counters.record(&activity.detail);
            progress.set_xp(xp, &self.levels);

            // Rewards can satisfy XP and level criteria, so evaluate until
            // nothing new unlocks.
            let mut held: HashSet<String> = tx
                .unlocked_achievements(user_id)?
                .into_iter()
                .map(|u| u.achievement_id)
                .collect();
            let mut unlocked = Vec::new();
            let mut achievement_xp = 0u64;
            loop {
                let met: Vec<_> = self
                    .catalog
                    .newly_met(&progress, &held)
                    .into_iter()
                    .map(|def| (def.id.clone(), def.xp_reward))
                    .collect();
                if met.is_empty() {
                    break;
                }
                for (id, reward) in met {
                    held.insert(id.clone());
                    let unlock = UnlockedAchievement {
                        achievement_id: id,
                        unlocked_at: now,
                    };
                    if tx.insert_unlock(user_id, &unlock)? {
                        achievement_xp = achievement_xp.saturating_add(reward);
                        progress.add_xp(reward, &self.levels);
                        unlocked.push(unlock);
                    }
                }
            }

            progress.updated_at = Some(now);
            tx.save_progress(&progress)?;

            Ok(ActivityOutcome {
                leveled_up: progress.level > previous_level,
                progress,
                xp_delta,
                streak_bonus: bonus,
                achievement_xp,
                streak,
                previous_level,
                unlocked,
            })
        })?;

        debug!(
            "User {} applied {} ({:+} xp, streak {:?})",
            user_id,
            activity.kind(),
            outcome.xp_delta,
            outcome.streak
        );
        if outcome.leveled_up {
            info!(
                "User {} leveled up: {} -> {}",
                user_id, outcome.previous_level, outcome.progress.level
            );
        }
        for unlock in &outcome.unlocked {
            info!("User {} unlocked achievement {}", user_id, unlock.achievement_id);
        }

        Ok(outcome)
    }

    // Level and rank follow the table in force, not the one the snapshot
    // was saved under.
    fn load_current(&self, tx: &mut dyn StoreTx, user_id: UserId) -> EduResult<UserProgress> {
        let mut progress = tx
            .load_progress(user_id)?
            .unwrap_or_else(|| UserProgress::new(user_id));
        progress.set_xp(progress.xp, &self.levels);
        Ok(progress)
    }

    /// Stored snapshot, or a zero snapshot for a user with no activity
    pub fn get_progress(&self, user_id: UserId) -> EduResult<UserProgress> {
        self.store.read(|tx| self.load_current(tx, user_id))
    }

    /// Snapshot with distance to the next level
    pub fn progress_view(&self, user_id: UserId) -> EduResult<ProgressView> {
        let progress = self.get_progress(user_id)?;
        Ok(ProgressView::new(progress, &self.levels))
    }

    /// Every catalog entry with the user's status for it
    pub fn achievements(&self, user_id: UserId) -> EduResult<Vec<AchievementView>> {
        let (progress, unlocked) = self.store.read(|tx| {
            let progress = self.load_current(tx, user_id)?;
            let unlocked = tx.unlocked_achievements(user_id)?;
            Ok((progress, unlocked))
        })?;
        Ok(overview(&self.catalog, &progress, &unlocked))
    }

    /// Top users by XP. `limit` is clamped to 1..=100. The viewer's
    /// position is 1 + the number of users with strictly more XP.
    pub fn leaderboard(&self, limit: usize, viewer: Option<UserId>) -> EduResult<Leaderboard> {
        let limit = limit.clamp(1, LEADERBOARD_MAX);
        self.store.read(|tx| {
            let top = tx.top_progress(limit)?;
            let mut entries = Vec::with_capacity(top.len());
            for mut p in top {
                p.set_xp(p.xp, &self.levels);
                entries.push(LeaderboardEntry {
                    position: tx.count_xp_above(p.xp)? + 1,
                    user_id: p.user_id,
                    xp: p.xp,
                    level: p.level,
                    rank: p.rank,
                });
            }

            let viewer = match viewer {
                Some(user_id) => {
                    let p = self.load_current(tx, user_id)?;
                    Some(LeaderboardEntry {
                        position: tx.count_xp_above(p.xp)? + 1,
                        user_id,
                        xp: p.xp,
                        level: p.level,
                        rank: p.rank,
                    })
                }
                None => None,
            };

            Ok(Leaderboard { entries, viewer })
        })
    }
}
