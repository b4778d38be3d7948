//! Property tests for levels and streaks.
//!
//! Inputs come from a seeded `StdRng` so failures are reproducible.

use chrono::{Duration, NaiveDate};
use edu_shared::levels::{rank_for, LevelTable, RANK_BANDS};
use edu_shared::streaks::{advance_streak, StreakChange};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const ITERATIONS: usize = 2_000;

#[test]
fn prop_level_monotonic_in_xp() {
    let mut rng = StdRng::seed_from_u64(0xED0A1);
    let tables = [
        LevelTable::default(),
        LevelTable::quadratic(37, 500),
        LevelTable::from_thresholds(vec![0, 1, 2, 10, 1_000, 1_000_000]).unwrap(),
    ];

    for table in &tables {
        for _ in 0..ITERATIONS {
            let a: u64 = rng.gen_range(0..10_000_000);
            let b: u64 = rng.gen_range(0..10_000_000);
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            assert!(
                table.level_for(lo) <= table.level_for(hi),
                "level({}) > level({})",
                lo,
                hi
            );
        }
    }
}

#[test]
fn prop_level_is_largest_reached_threshold() {
    let mut rng = StdRng::seed_from_u64(42);
    let table = LevelTable::default();

    for _ in 0..ITERATIONS {
        let xp: u64 = rng.gen_range(0..2_000_000);
        let level = table.level_for(xp);
        assert!(table.threshold(level) <= xp);
        if level < table.max_level() {
            assert!(table.threshold(level + 1) > xp);
        }
    }
}

#[test]
fn prop_rank_monotonic() {
    let mut rng = StdRng::seed_from_u64(7);
    let position = |name: &str| RANK_BANDS.iter().position(|(_, n)| *n == name).unwrap();

    for _ in 0..ITERATIONS {
        let a: u64 = rng.gen_range(0..100_000);
        let b = a + rng.gen_range(0..10_000);
        assert!(position(rank_for(a)) <= position(rank_for(b)));
    }
}

#[test]
fn prop_streak_walk() {
    let mut rng = StdRng::seed_from_u64(2026);
    let mut day = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
    let (mut current, mut longest, mut last) = (0u32, 0u32, None);
    let mut expected = 0u32;

    for _ in 0..ITERATIONS {
        // 0 = same day, 1 = next day, 2+ = gap
        let step: i64 = rng.gen_range(0..4);
        if last.is_some() {
            day += Duration::days(step);
        }
        expected = match (last, step) {
            (None, _) => 1,
            (Some(_), 0) => expected,
            (Some(_), 1) => expected + 1,
            _ => 1,
        };

        let out = advance_streak(current, longest, last, day);
        assert_eq!(out.current, expected);
        assert!(out.longest >= out.current);
        assert_ne!(out.change, StreakChange::Backdated);

        current = out.current;
        longest = out.longest;
        last = out.last_day;
    }
}
