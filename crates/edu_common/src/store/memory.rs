//! In-process store backed by ordered maps.
//!
//! The mutex is held for the whole unit of work. The closure runs against a
//! copy of the state and the copy replaces the original only on success.

use super::{Store, StoreTx};
use chrono::{DateTime, Utc};
use edu_shared::{
    Certificate, Course, CourseId, EduError, EduResult, Enrollment, NewRoadmap, NewStep, Roadmap,
    RoadmapId, RoadmapStep, StepId, StepStatus, UnlockedAchievement, UserId, UserProgress,
};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    progress: BTreeMap<UserId, UserProgress>,
    unlocks: BTreeMap<UserId, Vec<UnlockedAchievement>>,
    roadmaps: BTreeMap<RoadmapId, Roadmap>,
    steps: BTreeMap<StepId, RoadmapStep>,
    courses: BTreeMap<CourseId, Course>,
    enrollments: BTreeMap<(UserId, CourseId), Enrollment>,
    certificates: BTreeMap<Uuid, Certificate>,
    queued_certificates: BTreeMap<Uuid, DateTime<Utc>>,
    last_roadmap_id: RoadmapId,
    last_step_id: StepId,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> EduResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| EduError::Storage("memory store lock poisoned".to_string()))
    }
}

impl Store for MemoryStore {
    fn transaction<T>(
        &self,
        f: impl FnOnce(&mut dyn StoreTx) -> EduResult<T>,
    ) -> EduResult<T> {
        let mut guard = self.lock()?;
        let mut working = guard.clone();
        let value = f(&mut working)?;
        *guard = working;
        Ok(value)
    }

    fn read<T>(&self, f: impl FnOnce(&mut dyn StoreTx) -> EduResult<T>) -> EduResult<T> {
        let guard = self.lock()?;
        let mut snapshot = guard.clone();
        drop(guard);
        f(&mut snapshot)
    }
}

impl StoreTx for MemoryState {
    fn load_progress(&mut self, user_id: UserId) -> EduResult<Option<UserProgress>> {
        Ok(self.progress.get(&user_id).cloned())
    }

    fn save_progress(&mut self, progress: &UserProgress) -> EduResult<()> {
        self.progress.insert(progress.user_id, progress.clone());
        Ok(())
    }

    fn top_progress(&mut self, limit: usize) -> EduResult<Vec<UserProgress>> {
        let mut all: Vec<UserProgress> = self.progress.values().cloned().collect();
        all.sort_by(|a, b| b.xp.cmp(&a.xp).then(a.user_id.cmp(&b.user_id)));
        all.truncate(limit);
        Ok(all)
    }

    fn count_xp_above(&mut self, xp: u64) -> EduResult<u64> {
        Ok(self.progress.values().filter(|p| p.xp > xp).count() as u64)
    }

    fn unlocked_achievements(&mut self, user_id: UserId) -> EduResult<Vec<UnlockedAchievement>> {
        Ok(self.unlocks.get(&user_id).cloned().unwrap_or_default())
    }

    fn insert_unlock(&mut self, user_id: UserId, unlock: &UnlockedAchievement) -> EduResult<bool> {
        let list = self.unlocks.entry(user_id).or_default();
        if list
            .iter()
            .any(|u| u.achievement_id == unlock.achievement_id)
        {
            return Ok(false);
        }
        list.push(unlock.clone());
        Ok(true)
    }

    fn insert_roadmap(
        &mut self,
        user_id: UserId,
        new: &NewRoadmap,
        created_at: DateTime<Utc>,
    ) -> EduResult<Roadmap> {
        self.last_roadmap_id += 1;
        let roadmap = Roadmap {
            id: self.last_roadmap_id,
            user_id,
            name: new.name.clone(),
            description: new.description.clone(),
            target_skill: new.target_skill.clone(),
            created_at,
        };
        self.roadmaps.insert(roadmap.id, roadmap.clone());
        Ok(roadmap)
    }

    fn load_roadmap(&mut self, roadmap_id: RoadmapId) -> EduResult<Option<Roadmap>> {
        Ok(self.roadmaps.get(&roadmap_id).cloned())
    }

    fn load_steps(&mut self, roadmap_id: RoadmapId) -> EduResult<Vec<RoadmapStep>> {
        let mut steps: Vec<RoadmapStep> = self
            .steps
            .values()
            .filter(|s| s.roadmap_id == roadmap_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.order);
        Ok(steps)
    }

    fn load_step(&mut self, step_id: StepId) -> EduResult<Option<RoadmapStep>> {
        Ok(self.steps.get(&step_id).cloned())
    }

    fn insert_step(
        &mut self,
        roadmap_id: RoadmapId,
        new: &NewStep,
        order: u32,
    ) -> EduResult<RoadmapStep> {
        if !self.roadmaps.contains_key(&roadmap_id) {
            return Err(EduError::not_found("roadmap", roadmap_id));
        }
        if self
            .steps
            .values()
            .any(|s| s.roadmap_id == roadmap_id && s.order == order)
        {
            return Err(EduError::Storage(format!(
                "order {} already taken in roadmap {}",
                order, roadmap_id
            )));
        }
        self.last_step_id += 1;
        let step = RoadmapStep {
            id: self.last_step_id,
            roadmap_id,
            title: new.title.clone(),
            description: new.description.clone(),
            course_id: new.course_id,
            resource_url: new.resource_url.clone(),
            order,
            status: StepStatus::Pending,
            completed_at: None,
        };
        self.steps.insert(step.id, step.clone());
        Ok(step)
    }

    fn save_step(&mut self, step: &RoadmapStep) -> EduResult<()> {
        let stored = self
            .steps
            .get_mut(&step.id)
            .ok_or_else(|| EduError::not_found("step", step.id))?;
        stored.status = step.status;
        stored.completed_at = step.completed_at;
        Ok(())
    }

    fn delete_step(&mut self, step_id: StepId) -> EduResult<()> {
        self.steps.remove(&step_id);
        Ok(())
    }

    fn reassign_orders(
        &mut self,
        roadmap_id: RoadmapId,
        orders: &[(StepId, u32)],
    ) -> EduResult<()> {
        for (step_id, order) in orders {
            match self.steps.get_mut(step_id) {
                Some(step) if step.roadmap_id == roadmap_id => step.order = *order,
                _ => return Err(EduError::not_found("step", step_id)),
            }
        }
        Ok(())
    }

    fn upsert_course(&mut self, course: &Course) -> EduResult<()> {
        self.courses.insert(course.id, course.clone());
        Ok(())
    }

    fn load_course(&mut self, course_id: CourseId) -> EduResult<Option<Course>> {
        Ok(self.courses.get(&course_id).cloned())
    }

    fn upsert_enrollment(&mut self, enrollment: &Enrollment) -> EduResult<()> {
        self.enrollments.insert(
            (enrollment.user_id, enrollment.course_id),
            enrollment.clone(),
        );
        Ok(())
    }

    fn load_enrollment(
        &mut self,
        user_id: UserId,
        course_id: CourseId,
    ) -> EduResult<Option<Enrollment>> {
        Ok(self.enrollments.get(&(user_id, course_id)).cloned())
    }

    fn find_certificate(
        &mut self,
        user_id: UserId,
        course_id: CourseId,
    ) -> EduResult<Option<Certificate>> {
        Ok(self
            .certificates
            .values()
            .find(|c| c.user_id == user_id && c.course_id == course_id)
            .cloned())
    }

    fn insert_certificate(&mut self, cert: &Certificate) -> EduResult<Certificate> {
        if let Some(existing) = self.find_certificate(cert.user_id, cert.course_id)? {
            return Ok(existing);
        }
        self.certificates.insert(cert.id, cert.clone());
        Ok(cert.clone())
    }

    fn certificate_by_id(&mut self, id: Uuid) -> EduResult<Option<Certificate>> {
        Ok(self.certificates.get(&id).cloned())
    }

    fn certificates_for_user(&mut self, user_id: UserId) -> EduResult<Vec<Certificate>> {
        let mut certs: Vec<Certificate> = self
            .certificates
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        certs.sort_by_key(|c| (c.issued_at, c.course_id));
        Ok(certs)
    }

    fn certificate_task_queued(&mut self, id: Uuid) -> EduResult<bool> {
        Ok(self.queued_certificates.contains_key(&id))
    }

    fn mark_certificate_queued(&mut self, id: Uuid, at: DateTime<Utc>) -> EduResult<()> {
        if !self.certificates.contains_key(&id) {
            return Err(EduError::not_found("certificate", id));
        }
        self.queued_certificates.entry(id).or_insert(at);
        Ok(())
    }

    fn unqueued_certificates(
        &mut self,
        issued_before: DateTime<Utc>,
        limit: usize,
    ) -> EduResult<Vec<Certificate>> {
        let mut certs: Vec<Certificate> = self
            .certificates
            .values()
            .filter(|c| c.issued_at <= issued_before)
            .filter(|c| !self.queued_certificates.contains_key(&c.id))
            .cloned()
            .collect();
        certs.sort_by_key(|c| (c.issued_at, c.id));
        certs.truncate(limit);
        Ok(certs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_transaction_discards_writes() {
        let store = MemoryStore::new();
        let result: EduResult<()> = store.transaction(|tx| {
            tx.save_progress(&UserProgress::new(1))?;
            Err(EduError::validation("boom"))
        });
        assert!(result.is_err());

        let loaded = store.read(|tx| tx.load_progress(1)).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_read_discards_writes() {
        let store = MemoryStore::new();
        store
            .read(|tx| tx.save_progress(&UserProgress::new(3)))
            .unwrap();
        assert!(store.read(|tx| tx.load_progress(3)).unwrap().is_none());
    }

    #[test]
    fn test_unlock_insert_is_idempotent() {
        let store = MemoryStore::new();
        let first = UnlockedAchievement {
            achievement_id: "first_steps".to_string(),
            unlocked_at: Utc::now(),
        };
        let again = UnlockedAchievement {
            achievement_id: "first_steps".to_string(),
            unlocked_at: first.unlocked_at + chrono::Duration::days(1),
        };

        store
            .transaction(|tx| {
                assert!(tx.insert_unlock(7, &first)?);
                assert!(!tx.insert_unlock(7, &again)?);
                Ok(())
            })
            .unwrap();

        let unlocks = store.read(|tx| tx.unlocked_achievements(7)).unwrap();
        assert_eq!(unlocks, vec![first]);
    }

    #[test]
    fn test_top_progress_tie_break() {
        let store = MemoryStore::new();
        store
            .transaction(|tx| {
                for (user, xp) in [(3, 50), (1, 50), (2, 90)] {
                    let mut p = UserProgress::new(user);
                    p.xp = xp;
                    tx.save_progress(&p)?;
                }
                Ok(())
            })
            .unwrap();

        let top = store.read(|tx| tx.top_progress(10)).unwrap();
        let ids: Vec<UserId> = top.iter().map(|p| p.user_id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
        assert_eq!(store.read(|tx| tx.count_xp_above(50)).unwrap(), 1);
    }
}
