//! Shared domain types for the EduAI progress core.
//!
//! Pure data and arithmetic: activities and the XP table, levels and ranks,
//! streaks, achievements, roadmap steps, courses and certificates. Nothing
//! in this crate touches storage or the clock.

pub mod achievements;
pub mod activity;
pub mod certificate;
pub mod courses;
pub mod error;
pub mod ids;
pub mod levels;
pub mod progress;
pub mod roadmap;
pub mod streaks;
pub mod tasks;

pub use achievements::{
    AchievementCatalog, AchievementDef, AchievementState, AchievementView, Criterion, Rarity,
    UnlockedAchievement,
};
pub use activity::{Activity, ActivityDetail, ActivityKind, XpTable};
pub use certificate::{Certificate, Issued, Verification};
pub use courses::{Course, Enrollment};
pub use error::{EduError, EduResult, ErrorResponse};
pub use ids::*;
pub use levels::{rank_for, LevelTable};
pub use progress::{ActivityCounters, ProgressView, UserProgress};
pub use roadmap::{
    NewRoadmap, NewStep, Roadmap, RoadmapProgress, RoadmapStatus, RoadmapStep, StepStatus,
};
pub use streaks::{DayBoundary, StreakChange};
pub use tasks::{QueuedTask, Task};
