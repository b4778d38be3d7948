//! Achievement catalog and unlock evaluation.
//!
//! The catalog is plain configuration: a list of definitions, each with a
//! [`Criterion`] evaluated against a [`UserProgress`] snapshot. It is built
//! once and handed to the progress engine; there is no global registry.

use crate::error::{EduError, EduResult};
use crate::progress::UserProgress;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    #[default]
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

/// Predicate over a progress snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Criterion {
    TotalXp { min: u64 },
    Level { min: u32 },
    Streak { min: u32 },
    CoursesEnrolled { min: u32 },
    CoursesCompleted { min: u32 },
    ModulesCompleted { min: u32 },
    AssessmentsCompleted { min: u32 },
    PerfectScores { min: u32 },
    StepsCompleted { min: u32 },
    MinutesSpent { min: u64 },
}

impl Criterion {
    /// Value the criterion is measured against
    pub fn current_value(&self, p: &UserProgress) -> u64 {
        let c = &p.counters;
        match self {
            Criterion::TotalXp { .. } => p.xp,
            Criterion::Level { .. } => p.level as u64,
            Criterion::Streak { .. } => p.current_streak as u64,
            Criterion::CoursesEnrolled { .. } => c.courses_enrolled as u64,
            Criterion::CoursesCompleted { .. } => c.courses_completed as u64,
            Criterion::ModulesCompleted { .. } => c.modules_completed as u64,
            Criterion::AssessmentsCompleted { .. } => c.assessments_completed as u64,
            Criterion::PerfectScores { .. } => c.perfect_scores as u64,
            Criterion::StepsCompleted { .. } => c.steps_completed as u64,
            Criterion::MinutesSpent { .. } => c.minutes_spent,
        }
    }

    pub fn requirement(&self) -> u64 {
        match *self {
            Criterion::TotalXp { min } | Criterion::MinutesSpent { min } => min,
            Criterion::Level { min }
            | Criterion::Streak { min }
            | Criterion::CoursesEnrolled { min }
            | Criterion::CoursesCompleted { min }
            | Criterion::ModulesCompleted { min }
            | Criterion::AssessmentsCompleted { min }
            | Criterion::PerfectScores { min }
            | Criterion::StepsCompleted { min } => min as u64,
        }
    }

    pub fn is_met(&self, p: &UserProgress) -> bool {
        self.current_value(p) >= self.requirement()
    }
}

/// One achievement definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementDef {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub criterion: Criterion,
    #[serde(default)]
    pub xp_reward: u64,
    #[serde(default)]
    pub rarity: Rarity,
}

impl AchievementDef {
    pub fn new(id: &str, title: &str, description: &str, criterion: Criterion) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            criterion,
            xp_reward: 0,
            rarity: Rarity::Common,
        }
    }

    pub fn reward(mut self, xp: u64, rarity: Rarity) -> Self {
        self.xp_reward = xp;
        self.rarity = rarity;
        self
    }
}

/// Stored unlock record. Never modified once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockedAchievement {
    pub achievement_id: String,
    pub unlocked_at: DateTime<Utc>,
}

/// Validated set of achievement definitions keyed by id
#[derive(Debug, Clone, PartialEq)]
pub struct AchievementCatalog {
    defs: Vec<AchievementDef>,
}

impl AchievementCatalog {
    pub fn new(defs: Vec<AchievementDef>) -> EduResult<Self> {
        let mut seen = HashSet::new();
        for def in &defs {
            if def.id.trim().is_empty() {
                return Err(EduError::validation("achievement id must not be empty"));
            }
            if !seen.insert(def.id.as_str()) {
                return Err(EduError::validation(format!(
                    "duplicate achievement id: {}",
                    def.id
                )));
            }
        }
        Ok(Self { defs })
    }

    pub fn empty() -> Self {
        Self { defs: Vec::new() }
    }

    pub fn get(&self, id: &str) -> Option<&AchievementDef> {
        self.defs.iter().find(|d| d.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AchievementDef> {
        self.defs.iter()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Definitions whose criterion holds and that are not yet unlocked
    pub fn newly_met<'a>(
        &'a self,
        progress: &UserProgress,
        unlocked: &HashSet<String>,
    ) -> Vec<&'a AchievementDef> {
        self.defs
            .iter()
            .filter(|d| !unlocked.contains(&d.id) && d.criterion.is_met(progress))
            .collect()
    }
}

impl Default for AchievementCatalog {
    fn default() -> Self {
        Self {
            defs: default_achievements(),
        }
    }
}

/// Seed achievements shipped with the platform
pub fn default_achievements() -> Vec<AchievementDef> {
    use Criterion::*;
    use Rarity::*;
    vec![
        // Course completion
        AchievementDef::new(
            "first_steps",
            "First Steps",
            "Complete your first course",
            CoursesCompleted { min: 1 },
        )
        .reward(100, Common),
        AchievementDef::new(
            "dedicated_learner",
            "Dedicated Learner",
            "Complete 5 courses",
            CoursesCompleted { min: 5 },
        )
        .reward(500, Uncommon),
        AchievementDef::new(
            "knowledge_seeker",
            "Knowledge Seeker",
            "Complete 10 courses",
            CoursesCompleted { min: 10 },
        )
        .reward(1000, Rare),
        AchievementDef::new(
            "course_master",
            "Course Master",
            "Complete 25 courses",
            CoursesCompleted { min: 25 },
        )
        .reward(2500, Epic),

        // Streak
        AchievementDef::new(
            "getting_started",
            "Getting Started",
            "Maintain a 3-day streak",
            Streak { min: 3 },
        )
        .reward(50, Common),
        AchievementDef::new(
            "week_warrior",
            "Week Warrior",
            "Maintain a 7-day streak",
            Streak { min: 7 },
        )
        .reward(150, Uncommon),
        AchievementDef::new(
            "consistency_champion",
            "Consistency Champion",
            "Maintain a 30-day streak",
            Streak { min: 30 },
        )
        .reward(500, Rare),
        AchievementDef::new(
            "unstoppable",
            "Unstoppable",
            "Maintain a 100-day streak",
            Streak { min: 100 },
        )
        .reward(2000, Epic),

        // Time spent (minutes)
        AchievementDef::new(
            "first_hour",
            "First Hour",
            "Spend 1 hour learning",
            MinutesSpent { min: 60 },
        )
        .reward(50, Common),
        AchievementDef::new(
            "time_investor",
            "Time Investor",
            "Spend 10 hours learning",
            MinutesSpent { min: 600 },
        )
        .reward(300, Uncommon),
        AchievementDef::new(
            "learning_marathon",
            "Learning Marathon",
            "Spend 50 hours learning",
            MinutesSpent { min: 3000 },
        )
        .reward(1000, Rare),

        // Assessments
        AchievementDef::new(
            "quiz_taker",
            "Quiz Taker",
            "Complete your first assessment",
            AssessmentsCompleted { min: 1 },
        )
        .reward(75, Common),
        AchievementDef::new(
            "assessment_pro",
            "Assessment Pro",
            "Complete 10 assessments",
            AssessmentsCompleted { min: 10 },
        )
        .reward(500, Uncommon),

        // Perfect score
        AchievementDef::new(
            "perfect_score",
            "Perfect Score",
            "Score 100% on an assessment",
            PerfectScores { min: 1 },
        )
        .reward(200, Rare),
        AchievementDef::new(
            "perfectionist",
            "Perfectionist",
            "Score 100% on 5 assessments",
            PerfectScores { min: 5 },
        )
        .reward(1000, Epic),
    ]
}

/// Where a user stands on one achievement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AchievementState {
    Unlocked { unlocked_at: DateTime<Utc> },
    InProgress { current: u64, percent: f64 },
    Locked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub rarity: Rarity,
    pub xp_reward: u64,
    pub requirement: u64,
    #[serde(flatten)]
    pub state: AchievementState,
}

/// Status of every catalog entry for one user
pub fn overview(
    catalog: &AchievementCatalog,
    progress: &UserProgress,
    unlocked: &[UnlockedAchievement],
) -> Vec<AchievementView> {
    let unlocked_at: HashMap<&str, DateTime<Utc>> = unlocked
        .iter()
        .map(|u| (u.achievement_id.as_str(), u.unlocked_at))
        .collect();

    catalog
        .iter()
        .map(|def| {
            let requirement = def.criterion.requirement();
            let state = match unlocked_at.get(def.id.as_str()) {
                Some(&at) => AchievementState::Unlocked { unlocked_at: at },
                None => {
                    let current = def.criterion.current_value(progress);
                    if current == 0 {
                        AchievementState::Locked
                    } else {
                        AchievementState::InProgress {
                            current,
                            percent: percent_of(current, requirement),
                        }
                    }
                }
            };
            AchievementView {
                id: def.id.clone(),
                title: def.title.clone(),
                description: def.description.clone(),
                rarity: def.rarity,
                xp_reward: def.xp_reward,
                requirement,
                state,
            }
        })
        .collect()
}

/// Percentage rounded to one decimal, capped at 100
fn percent_of(current: u64, requirement: u64) -> f64 {
    if requirement == 0 {
        return 100.0;
    }
    let pct = (current as f64 / requirement as f64 * 1000.0).round() / 10.0;
    pct.min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn progress_with(courses: u32, streak: u32) -> UserProgress {
        let mut p = UserProgress::new(1);
        p.counters.courses_completed = courses;
        p.current_streak = streak;
        p.longest_streak = streak;
        p
    }

    #[test]
    fn test_default_catalog_is_valid() {
        let defs = default_achievements();
        assert_eq!(defs.len(), 15);
        assert!(AchievementCatalog::new(defs).is_ok());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let defs = vec![
            AchievementDef::new("a", "A", "", Criterion::Level { min: 2 }),
            AchievementDef::new("a", "A again", "", Criterion::Level { min: 3 }),
        ];
        let err = AchievementCatalog::new(defs).unwrap_err();
        assert!(err.to_string().contains("duplicate achievement id: a"));
    }

    #[test]
    fn test_criteria() {
        let p = progress_with(5, 7);
        assert!(Criterion::CoursesCompleted { min: 5 }.is_met(&p));
        assert!(!Criterion::CoursesCompleted { min: 6 }.is_met(&p));
        assert!(Criterion::Streak { min: 7 }.is_met(&p));
        assert!(Criterion::Level { min: 1 }.is_met(&p));
        assert!(!Criterion::TotalXp { min: 1 }.is_met(&p));
    }

    #[test]
    fn test_newly_met_skips_unlocked() {
        let catalog = AchievementCatalog::default();
        let p = progress_with(1, 3);
        let mut unlocked = HashSet::new();
        let ids: Vec<_> = catalog.newly_met(&p, &unlocked).iter().map(|d| d.id.clone()).collect();
        assert_eq!(ids, vec!["first_steps", "getting_started"]);

        unlocked.insert("first_steps".to_string());
        let ids: Vec<_> = catalog.newly_met(&p, &unlocked).iter().map(|d| d.id.clone()).collect();
        assert_eq!(ids, vec!["getting_started"]);
    }

    #[test]
    fn test_overview_states() {
        let catalog = AchievementCatalog::default();
        let p = progress_with(2, 0);
        let at = Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap();
        let unlocked = vec![UnlockedAchievement {
            achievement_id: "first_steps".into(),
            unlocked_at: at,
        }];
        let views = overview(&catalog, &p, &unlocked);
        let find = |id: &str| views.iter().find(|v| v.id == id).unwrap().state.clone();

        assert_eq!(find("first_steps"), AchievementState::Unlocked { unlocked_at: at });
        assert_eq!(
            find("dedicated_learner"),
            AchievementState::InProgress { current: 2, percent: 40.0 }
        );
        assert_eq!(find("week_warrior"), AchievementState::Locked);
    }

    #[test]
    fn test_percent_capped() {
        assert_eq!(percent_of(3, 2), 100.0);
        assert_eq!(percent_of(1, 3), 33.3);
    }

    #[test]
    fn test_criterion_serde_shape() {
        let def: AchievementDef = serde_json::from_value(serde_json::json!({
            "id": "night_owl",
            "title": "Night Owl",
            "criterion": {"type": "minutes_spent", "min": 120},
            "xp_reward": 40,
            "rarity": "uncommon"
        }))
        .unwrap();
        assert_eq!(def.criterion, Criterion::MinutesSpent { min: 120 });
        assert_eq!(def.rarity, Rarity::Uncommon);
    }
}
