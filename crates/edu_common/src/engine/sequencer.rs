//! Roadmap step sequencer.
//!
//! Keeps step orders a contiguous `0..n` per roadmap and enforces the
//! forward-only step lifecycle. Roadmap status is always derived from the
//! steps on read.

use crate::store::Store;
use chrono::{DateTime, Utc};
use edu_shared::roadmap::{check_permutation, next_order};
use edu_shared::{
    EduError, EduResult, NewRoadmap, NewStep, Roadmap, RoadmapId, RoadmapProgress, RoadmapStatus,
    RoadmapStep, StepId, StepStatus, UserId,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Step after a status change, with the roadmap status it produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepUpdate {
    pub step: RoadmapStep,
    pub roadmap_status: RoadmapStatus,
}

pub struct RoadmapSequencer<S> {
    store: S,
}

impl<S: Store> RoadmapSequencer<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn create_roadmap(
        &self,
        user_id: UserId,
        new: &NewRoadmap,
        now: DateTime<Utc>,
    ) -> EduResult<Roadmap> {
        new.validate()?;
        let roadmap = self
            .store
            .transaction(|tx| tx.insert_roadmap(user_id, new, now))?;
        info!("Created roadmap {} for user {}", roadmap.id, user_id);
        Ok(roadmap)
    }

    /// Append a step after the current last one
    pub fn add_step(&self, roadmap_id: RoadmapId, new: &NewStep) -> EduResult<RoadmapStep> {
        new.validate()?;
        self.store.transaction(|tx| {
            if tx.load_roadmap(roadmap_id)?.is_none() {
                return Err(EduError::not_found("roadmap", roadmap_id));
            }
            let steps = tx.load_steps(roadmap_id)?;
            tx.insert_step(roadmap_id, new, next_order(&steps))
        })
    }

    /// Reassign orders so that `ordered_ids[i]` gets order `i`
    pub fn reorder_steps(
        &self,
        roadmap_id: RoadmapId,
        ordered_ids: &[StepId],
    ) -> EduResult<Vec<RoadmapStep>> {
        let steps = self.store.transaction(|tx| {
            if tx.load_roadmap(roadmap_id)?.is_none() {
                return Err(EduError::not_found("roadmap", roadmap_id));
            }
            let steps = tx.load_steps(roadmap_id)?;
            check_permutation(&steps, ordered_ids)?;

            let orders: Vec<(StepId, u32)> = ordered_ids
                .iter()
                .enumerate()
                .map(|(i, id)| (*id, i as u32))
                .collect();
            tx.reassign_orders(roadmap_id, &orders)?;
            tx.load_steps(roadmap_id)
        })?;
        info!("Reordered {} steps in roadmap {}", steps.len(), roadmap_id);
        Ok(steps)
    }

    /// Move a step forward one lifecycle stage. Entering `completed`
    /// stamps `completed_at`.
    pub fn update_step_status(
        &self,
        step_id: StepId,
        status: StepStatus,
        now: DateTime<Utc>,
    ) -> EduResult<StepUpdate> {
        self.store.transaction(|tx| {
            let mut step = tx
                .load_step(step_id)?
                .ok_or_else(|| EduError::not_found("step", step_id))?;
            step.status = step.status.transition(status)?;
            if step.status == StepStatus::Completed {
                step.completed_at = Some(now);
            }
            tx.save_step(&step)?;

            let steps = tx.load_steps(step.roadmap_id)?;
            Ok(StepUpdate {
                roadmap_status: RoadmapStatus::derive(&steps),
                step,
            })
        })
    }

    /// Delete a step and close the gap it leaves
    pub fn remove_step(&self, step_id: StepId) -> EduResult<Vec<RoadmapStep>> {
        self.store.transaction(|tx| {
            let step = tx
                .load_step(step_id)?
                .ok_or_else(|| EduError::not_found("step", step_id))?;
            tx.delete_step(step_id)?;

            let remaining = tx.load_steps(step.roadmap_id)?;
            let orders: Vec<(StepId, u32)> = remaining
                .iter()
                .enumerate()
                .map(|(i, s)| (s.id, i as u32))
                .collect();
            tx.reassign_orders(step.roadmap_id, &orders)?;
            tx.load_steps(step.roadmap_id)
        })
    }

    pub fn get_roadmap_status(&self, roadmap_id: RoadmapId) -> EduResult<RoadmapStatus> {
        let steps = self.load_existing(roadmap_id)?;
        Ok(RoadmapStatus::derive(&steps))
    }

    pub fn roadmap_progress(&self, roadmap_id: RoadmapId) -> EduResult<RoadmapProgress> {
        let steps = self.load_existing(roadmap_id)?;
        Ok(RoadmapProgress::summarize(roadmap_id, &steps))
    }

    pub fn steps(&self, roadmap_id: RoadmapId) -> EduResult<Vec<RoadmapStep>> {
        self.load_existing(roadmap_id)
    }

    pub fn roadmap(&self, roadmap_id: RoadmapId) -> EduResult<Roadmap> {
        self.store
            .read(|tx| tx.load_roadmap(roadmap_id))?
            .ok_or_else(|| EduError::not_found("roadmap", roadmap_id))
    }

    fn load_existing(&self, roadmap_id: RoadmapId) -> EduResult<Vec<RoadmapStep>> {
        self.store.read(|tx| {
            if tx.load_roadmap(roadmap_id)?.is_none() {
                return Err(EduError::not_found("roadmap", roadmap_id));
            }
            tx.load_steps(roadmap_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use edu_shared::roadmap::is_contiguous;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 9, 30, 0).unwrap()
    }

    fn setup(n: usize) -> (RoadmapSequencer<MemoryStore>, RoadmapId, Vec<StepId>) {
        let seq = RoadmapSequencer::new(MemoryStore::new());
        let roadmap = seq
            .create_roadmap(1, &NewRoadmap::named("Backend"), now())
            .unwrap();
        let ids = (0..n)
            .map(|i| {
                seq.add_step(roadmap.id, &NewStep::titled(&format!("step {}", i)))
                    .unwrap()
                    .id
            })
            .collect();
        (seq, roadmap.id, ids)
    }

    #[test]
    fn test_add_step_appends() {
        let (seq, roadmap, ids) = setup(3);
        let steps = seq.steps(roadmap).unwrap();
        let orders: Vec<u32> = steps.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
        assert_eq!(steps.iter().map(|s| s.id).collect::<Vec<_>>(), ids);
    }

    #[test]
    fn test_add_step_missing_roadmap() {
        let seq = RoadmapSequencer::new(MemoryStore::new());
        let err = seq.add_step(77, &NewStep::titled("x")).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_add_step_blank_title() {
        let (seq, roadmap, _) = setup(0);
        let err = seq.add_step(roadmap, &NewStep::titled("  ")).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn test_reorder() {
        let (seq, roadmap, ids) = setup(3);
        let wanted = vec![ids[2], ids[0], ids[1]];
        let steps = seq.reorder_steps(roadmap, &wanted).unwrap();
        assert_eq!(steps.iter().map(|s| s.id).collect::<Vec<_>>(), wanted);
        assert!(is_contiguous(&steps));
    }

    #[test]
    fn test_reorder_rejects_non_permutation() {
        let (seq, roadmap, ids) = setup(3);
        let before = seq.steps(roadmap).unwrap();

        for bad in [
            vec![ids[0], ids[1]],
            vec![ids[0], ids[0], ids[1]],
            vec![ids[0], ids[1], 999],
        ] {
            let err = seq.reorder_steps(roadmap, &bad).unwrap_err();
            assert_eq!(err.kind(), "validation_error");
            assert_eq!(seq.steps(roadmap).unwrap(), before);
        }
    }

    #[test]
    fn test_status_lifecycle() {
        let (seq, roadmap, ids) = setup(2);
        assert_eq!(seq.get_roadmap_status(roadmap).unwrap(), RoadmapStatus::Pending);

        let started = seq
            .update_step_status(ids[0], StepStatus::InProgress, now())
            .unwrap();
        assert_eq!(started.roadmap_status, RoadmapStatus::InProgress);
        assert!(started.step.completed_at.is_none());

        let done = seq
            .update_step_status(ids[0], StepStatus::Completed, now())
            .unwrap();
        assert_eq!(done.step.completed_at, Some(now()));
        assert_eq!(done.roadmap_status, RoadmapStatus::InProgress);

        seq.update_step_status(ids[1], StepStatus::InProgress, now())
            .unwrap();
        let last = seq
            .update_step_status(ids[1], StepStatus::Completed, now())
            .unwrap();
        assert_eq!(last.roadmap_status, RoadmapStatus::Completed);
    }

    #[test]
    fn test_invalid_transitions() {
        let (seq, _, ids) = setup(1);
        for to in [StepStatus::Pending, StepStatus::Completed] {
            let err = seq.update_step_status(ids[0], to, now()).unwrap_err();
            assert!(matches!(err, EduError::InvalidTransition { .. }));
        }

        seq.update_step_status(ids[0], StepStatus::InProgress, now())
            .unwrap();
        let err = seq
            .update_step_status(ids[0], StepStatus::Pending, now())
            .unwrap_err();
        assert_eq!(err.code(), 409);
    }

    #[test]
    fn test_remove_step_compacts() {
        let (seq, roadmap, ids) = setup(4);
        let steps = seq.remove_step(ids[1]).unwrap();
        assert_eq!(
            steps.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![ids[0], ids[2], ids[3]]
        );
        assert!(is_contiguous(&steps));

        let next = seq.add_step(roadmap, &NewStep::titled("tail")).unwrap();
        assert_eq!(next.order, 3);
    }

    #[test]
    fn test_empty_roadmap_is_pending() {
        let (seq, roadmap, _) = setup(0);
        assert_eq!(seq.get_roadmap_status(roadmap).unwrap(), RoadmapStatus::Pending);
        let progress = seq.roadmap_progress(roadmap).unwrap();
        assert_eq!(progress.total_steps, 0);
        assert_eq!(progress.progress_percentage, 0.0);
    }

    #[test]
    fn test_status_of_missing_roadmap() {
        let seq = RoadmapSequencer::new(MemoryStore::new());
        assert!(matches!(
            seq.get_roadmap_status(5),
            Err(EduError::NotFound { entity: "roadmap", .. })
        ));
    }
}
