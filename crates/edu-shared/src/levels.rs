//! Level and rank system.
//!
//! ## XP Curve
//!
//! XP required for level L: `(L - 1)^2 * base_xp`
//! - base_xp = 100
//! - Level 1: 0 XP
//! - Level 2: 100 XP
//! - Level 5: 1,600 XP
//! - Level 10: 8,100 XP
//!
//! A deployment can replace the curve with an explicit threshold list. The
//! level for a given XP is always the largest level whose threshold is
//! reached, so the mapping is monotonic as long as thresholds increase.

use crate::error::{EduError, EduResult};

pub const DEFAULT_BASE_XP: u64 = 100;
pub const DEFAULT_MAX_LEVEL: u32 = 100;

/// Rank bands: (minimum XP, rank name)
pub const RANK_BANDS: &[(u64, &str)] = &[
    (0, "Novice"),
    (100, "Beginner"),
    (500, "Learner"),
    (1_000, "Student"),
    (2_500, "Scholar"),
    (5_000, "Expert"),
    (10_000, "Master"),
    (25_000, "Grandmaster"),
    (50_000, "Legend"),
];

/// XP thresholds indexed by `level - 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelTable {
    thresholds: Vec<u64>,
}

impl LevelTable {
    /// Quadratic curve used by default.
    pub fn quadratic(base_xp: u64, max_level: u32) -> Self {
        let base_xp = base_xp.max(1);
        let max_level = max_level.max(1);
        let thresholds = (1..=max_level as u64)
            .map(|level| (level - 1).saturating_mul(level - 1).saturating_mul(base_xp))
            .collect();
        Self { thresholds }
    }

    /// Explicit thresholds. The first must be 0 and each must be larger
    /// than the one before it.
    pub fn from_thresholds(thresholds: Vec<u64>) -> EduResult<Self> {
        match thresholds.first() {
            None => return Err(EduError::validation("level table is empty")),
            Some(&first) if first != 0 => {
                return Err(EduError::validation(format!(
                    "level 1 threshold must be 0, got {}",
                    first
                )))
            }
            _ => {}
        }
        if let Some(pair) = thresholds.windows(2).find(|w| w[1] <= w[0]) {
            return Err(EduError::validation(format!(
                "level thresholds must strictly increase ({} then {})",
                pair[0], pair[1]
            )));
        }
        Ok(Self { thresholds })
    }

    pub fn max_level(&self) -> u32 {
        self.thresholds.len() as u32
    }

    /// XP required to reach `level`. Levels above the table cap at the last
    /// threshold; level 0 is treated as level 1.
    pub fn threshold(&self, level: u32) -> u64 {
        let idx = (level.max(1) as usize - 1).min(self.thresholds.len() - 1);
        self.thresholds[idx]
    }

    /// Largest level L with `threshold(L) <= xp`.
    pub fn level_for(&self, xp: u64) -> u32 {
        // thresholds[0] == 0, so at least one entry always qualifies
        self.thresholds.partition_point(|&t| t <= xp) as u32
    }

    /// XP still needed for the next level; 0 at max level.
    pub fn xp_to_next(&self, xp: u64) -> u64 {
        let level = self.level_for(xp);
        if level >= self.max_level() {
            return 0;
        }
        self.threshold(level + 1).saturating_sub(xp)
    }

    /// Progress within the current level as a fraction (0.0 - 1.0)
    pub fn progress_to_next(&self, xp: u64) -> f64 {
        let level = self.level_for(xp);
        if level >= self.max_level() {
            return 1.0;
        }
        let current = self.threshold(level);
        let range = self.threshold(level + 1) - current;
        ((xp - current) as f64 / range as f64).clamp(0.0, 1.0)
    }
}

impl Default for LevelTable {
    fn default() -> Self {
        Self::quadratic(DEFAULT_BASE_XP, DEFAULT_MAX_LEVEL)
    }
}

/// Rank name for an XP total
pub fn rank_for(xp: u64) -> &'static str {
    RANK_BANDS
        .iter()
        .rev()
        .find(|(min, _)| xp >= *min)
        .map(|(_, name)| *name)
        .unwrap_or("Novice")
}
