//! Concurrency tests against an on-disk SQLite database.
//!
//! Tests verify:
//! - Concurrent activities for one user never lose an update
//! - Concurrent certificate issuance yields a single certificate
//! - Separate store handles on one file serialize through the database lock

use chrono::{TimeZone, Utc};
use edu_common::engine::{CertificateIssuer, ProgressEngine};
use edu_common::queue::MemoryQueue;
use edu_common::store::{SqliteStore, Store};
use edu_shared::{AchievementCatalog, Activity, ActivityDetail, Course};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const THREADS: usize = 4;
const PER_THREAD: usize = 25;

fn open(path: &Path) -> SqliteStore {
    SqliteStore::open(path, Duration::from_secs(30)).unwrap()
}

fn adjustment(amount: i64) -> Activity {
    Activity::new(
        ActivityDetail::XpAdjustment {
            amount,
            reason: "load".to_string(),
        },
        Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap(),
    )
}

#[test]
fn test_no_lost_xp_updates_across_handles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("edu.db");
    open(&path);

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            // One store per thread: each has its own connection
            let engine = ProgressEngine::new(open(&path), AchievementCatalog::empty());
            thread::spawn(move || {
                for _ in 0..PER_THREAD {
                    engine
                        .apply_activity(1, &adjustment(3), Utc::now())
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let engine = ProgressEngine::new(open(&path), AchievementCatalog::empty());
    let progress = engine.get_progress(1).unwrap();
    assert_eq!(progress.xp, (THREADS * PER_THREAD * 3) as u64);
    assert!(progress.is_consistent(engine.levels()));
}

#[test]
fn test_no_lost_updates_shared_handle() {
    let store = SqliteStore::open_in_memory().unwrap();
    let engine = Arc::new(ProgressEngine::new(store, AchievementCatalog::default()));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for _ in 0..PER_THREAD {
                    let minutes = ActivityDetail::StudySession {
                        minutes: 1 + i as u32,
                    };
                    let at = Utc.with_ymd_and_hms(2026, 8, 2, 9, 0, 0).unwrap();
                    engine
                        .apply_activity(7, &Activity::new(minutes, at), at)
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let progress = engine.get_progress(7).unwrap();
    let expected_minutes: u64 = (0..THREADS as u64).map(|i| (1 + i) * PER_THREAD as u64).sum();
    assert_eq!(progress.counters.minutes_spent, expected_minutes);
    assert_eq!(progress.current_streak, 1);

    // first_hour unlocks exactly once however the writers interleave
    let views = engine.achievements(7).unwrap();
    let unlocked: HashSet<&str> = views
        .iter()
        .filter(|v| matches!(v.state, edu_shared::AchievementState::Unlocked { .. }))
        .map(|v| v.id.as_str())
        .collect();
    assert!(unlocked.contains("first_hour"));
    assert!(!unlocked.contains("time_investor"));
}

#[test]
fn test_concurrent_issue_single_certificate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("certs.db");
    let now = Utc.with_ymd_and_hms(2026, 8, 3, 18, 0, 0).unwrap();

    let setup = CertificateIssuer::new(open(&path), MemoryQueue::new());
    setup
        .register_course(&Course {
            id: 1,
            title: "Systems Programming".to_string(),
            instructor_name: "Grace".to_string(),
            duration_hours: 30,
        })
        .unwrap();
    setup.record_enrollment(5, 1, 100.0, now).unwrap();

    let queue = Arc::new(MemoryQueue::new());
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let issuer = CertificateIssuer::new(open(&path), Arc::clone(&queue));
            thread::spawn(move || issuer.issue_certificate(5, 1, now).unwrap())
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let ids: HashSet<_> = results.iter().map(|r| r.certificate.id).collect();
    assert_eq!(ids.len(), 1);
    assert_eq!(results.iter().filter(|r| r.created).count(), 1);
    // At least once; a caller racing the issuer may queue a duplicate
    let tasks = queue.tasks();
    assert!(!tasks.is_empty());
    let id = results[0].certificate.id.to_string();
    assert!(tasks.iter().all(|t| t.payload["certificate_id"] == id.as_str()));

    let store = open(&path);
    let all = store.read(|tx| tx.certificates_for_user(5)).unwrap();
    assert_eq!(all.len(), 1);
}
