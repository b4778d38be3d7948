//! Identifier aliases shared across the workspace.
//!
//! Users, courses and assessments are owned by the surrounding web
//! application; the core only ever refers to them by id.

pub type UserId = i64;
pub type CourseId = i64;
pub type AssessmentId = i64;
pub type RoadmapId = i64;
pub type StepId = i64;
pub type TaskId = i64;
