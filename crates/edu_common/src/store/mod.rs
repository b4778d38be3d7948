//! Persistence interface for the engines.
//!
//! A `Store` hands out units of work. `transaction` runs a closure against a
//! `StoreTx` and commits only if the closure returns `Ok`; any error leaves
//! stored state exactly as it was. Writers on the same store are serialized
//! for the whole closure, so read-modify-write sequences inside one
//! transaction never lose updates.

pub mod memory;
pub mod outbox;
pub mod sqlite;

pub use memory::MemoryStore;
pub use outbox::SqliteOutbox;
pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};
use edu_shared::{
    Certificate, Course, CourseId, EduResult, Enrollment, NewRoadmap, NewStep, Roadmap,
    RoadmapId, RoadmapStep, StepId, UnlockedAchievement, UserId, UserProgress,
};
use std::sync::Arc;
use uuid::Uuid;

/// Per-entity operations available inside a unit of work
pub trait StoreTx {
    // Progress
    fn load_progress(&mut self, user_id: UserId) -> EduResult<Option<UserProgress>>;
    fn save_progress(&mut self, progress: &UserProgress) -> EduResult<()>;
    /// Highest XP first, ties by ascending user id
    fn top_progress(&mut self, limit: usize) -> EduResult<Vec<UserProgress>>;
    fn count_xp_above(&mut self, xp: u64) -> EduResult<u64>;

    // Achievements
    fn unlocked_achievements(&mut self, user_id: UserId) -> EduResult<Vec<UnlockedAchievement>>;
    /// Returns false if the achievement was already unlocked; the stored
    /// row is left untouched in that case.
    fn insert_unlock(&mut self, user_id: UserId, unlock: &UnlockedAchievement) -> EduResult<bool>;

    // Roadmaps
    fn insert_roadmap(
        &mut self,
        user_id: UserId,
        new: &NewRoadmap,
        created_at: DateTime<Utc>,
    ) -> EduResult<Roadmap>;
    fn load_roadmap(&mut self, roadmap_id: RoadmapId) -> EduResult<Option<Roadmap>>;
    /// Steps sorted by order
    fn load_steps(&mut self, roadmap_id: RoadmapId) -> EduResult<Vec<RoadmapStep>>;
    fn load_step(&mut self, step_id: StepId) -> EduResult<Option<RoadmapStep>>;
    fn insert_step(
        &mut self,
        roadmap_id: RoadmapId,
        new: &NewStep,
        order: u32,
    ) -> EduResult<RoadmapStep>;
    /// Persist status and completion time. Order is changed only through
    /// `reassign_orders`.
    fn save_step(&mut self, step: &RoadmapStep) -> EduResult<()>;
    fn delete_step(&mut self, step_id: StepId) -> EduResult<()>;
    /// Apply a batch of `(step, order)` assignments. Intermediate states may
    /// repeat an order; only the final assignment must be unique.
    fn reassign_orders(&mut self, roadmap_id: RoadmapId, orders: &[(StepId, u32)])
        -> EduResult<()>;

    // Courses and enrollments
    fn upsert_course(&mut self, course: &Course) -> EduResult<()>;
    fn load_course(&mut self, course_id: CourseId) -> EduResult<Option<Course>>;
    fn upsert_enrollment(&mut self, enrollment: &Enrollment) -> EduResult<()>;
    fn load_enrollment(
        &mut self,
        user_id: UserId,
        course_id: CourseId,
    ) -> EduResult<Option<Enrollment>>;

    // Certificates
    fn find_certificate(
        &mut self,
        user_id: UserId,
        course_id: CourseId,
    ) -> EduResult<Option<Certificate>>;
    /// Insert unless a certificate for the same (user, course) exists.
    /// Returns the stored row, which is the existing one on conflict.
    fn insert_certificate(&mut self, cert: &Certificate) -> EduResult<Certificate>;
    fn certificate_by_id(&mut self, id: Uuid) -> EduResult<Option<Certificate>>;
    fn certificates_for_user(&mut self, user_id: UserId) -> EduResult<Vec<Certificate>>;
    /// Whether the issued task for this certificate was accepted by a queue
    fn certificate_task_queued(&mut self, id: Uuid) -> EduResult<bool>;
    fn mark_certificate_queued(&mut self, id: Uuid, at: DateTime<Utc>) -> EduResult<()>;
    /// Certificates issued at or before `issued_before` whose task was never
    /// queued, oldest first
    fn unqueued_certificates(
        &mut self,
        issued_before: DateTime<Utc>,
        limit: usize,
    ) -> EduResult<Vec<Certificate>>;
}

/// Source of units of work
pub trait Store: Send + Sync {
    /// Run `f` in a write transaction; commit on `Ok`, discard on `Err`
    fn transaction<T>(
        &self,
        f: impl FnOnce(&mut dyn StoreTx) -> EduResult<T>,
    ) -> EduResult<T>;

    /// Run `f` against a consistent snapshot. Writes made by `f` are
    /// discarded.
    fn read<T>(&self, f: impl FnOnce(&mut dyn StoreTx) -> EduResult<T>) -> EduResult<T>;
}

impl<S: Store> Store for Arc<S> {
    fn transaction<T>(
        &self,
        f: impl FnOnce(&mut dyn StoreTx) -> EduResult<T>,
    ) -> EduResult<T> {
        (**self).transaction(f)
    }

    fn read<T>(&self, f: impl FnOnce(&mut dyn StoreTx) -> EduResult<T>) -> EduResult<T> {
        (**self).read(f)
    }
}
