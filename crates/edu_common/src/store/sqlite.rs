//! SQLite-backed store.
//!
//! One connection per store behind a mutex. Write transactions start with
//! `BEGIN IMMEDIATE`, so the database write lock is taken before the first
//! read and concurrent writers (other threads or other processes on the same
//! file) wait on the busy timeout instead of interleaving.

use super::outbox::SqliteOutbox;
use super::{Store, StoreTx};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use edu_shared::{
    ActivityCounters, Certificate, Course, CourseId, EduError, EduResult, Enrollment, NewRoadmap,
    NewStep, Roadmap, RoadmapId, RoadmapStep, StepId, StepStatus, UnlockedAchievement, UserId,
    UserProgress,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS user_progress (
    user_id INTEGER PRIMARY KEY,
    xp INTEGER NOT NULL CHECK (xp >= 0),
    level INTEGER NOT NULL,
    rank TEXT NOT NULL,
    current_streak INTEGER NOT NULL,
    longest_streak INTEGER NOT NULL,
    last_activity_date TEXT,
    counters TEXT NOT NULL,
    updated_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_user_progress_xp ON user_progress(xp DESC, user_id);

CREATE TABLE IF NOT EXISTS user_achievements (
    user_id INTEGER NOT NULL,
    achievement_id TEXT NOT NULL,
    unlocked_at TEXT NOT NULL,
    PRIMARY KEY (user_id, achievement_id)
);

CREATE TABLE IF NOT EXISTS roadmaps (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    target_skill TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS roadmap_steps (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    roadmap_id INTEGER NOT NULL REFERENCES roadmaps(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    description TEXT,
    course_id INTEGER,
    resource_url TEXT,
    step_order INTEGER NOT NULL,
    status TEXT NOT NULL,
    completed_at TEXT,
    UNIQUE (roadmap_id, step_order)
);

CREATE TABLE IF NOT EXISTS courses (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    instructor_name TEXT NOT NULL,
    duration_hours INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS enrollments (
    user_id INTEGER NOT NULL,
    course_id INTEGER NOT NULL REFERENCES courses(id),
    progress REAL NOT NULL,
    completed_at TEXT,
    PRIMARY KEY (user_id, course_id)
);

CREATE TABLE IF NOT EXISTS certificates (
    id TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL,
    course_id INTEGER NOT NULL,
    course_title TEXT NOT NULL,
    instructor_name TEXT NOT NULL,
    completion_date TEXT NOT NULL,
    hours_completed INTEGER NOT NULL,
    issued_at TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    task_queued_at TEXT,
    UNIQUE (user_id, course_id)
);

CREATE TABLE IF NOT EXISTS task_outbox (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    payload TEXT NOT NULL,
    enqueued_at TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    leased_until INTEGER,
    last_error TEXT
);
";

pub(crate) fn db_err(e: rusqlite::Error) -> EduError {
    EduError::Storage(e.to_string())
}

pub(crate) fn lock_conn(conn: &Mutex<Connection>) -> EduResult<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| EduError::Storage("database connection lock poisoned".to_string()))
}

pub(crate) fn to_i64(value: u64, what: &str) -> EduResult<i64> {
    i64::try_from(value).map_err(|_| EduError::Storage(format!("{} out of range: {}", what, value)))
}

pub(crate) fn get_u64(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let value: i64 = row.get(idx)?;
    u64::try_from(value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

fn get_u32(row: &Row<'_>, idx: usize) -> rusqlite::Result<u32> {
    let value: i64 = row.get(idx)?;
    u32::try_from(value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

fn get_status(row: &Row<'_>, idx: usize) -> rusqlite::Result<StepStatus> {
    let text: String = row.get(idx)?;
    text.parse::<StepStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn get_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn get_counters(row: &Row<'_>, idx: usize) -> rusqlite::Result<ActivityCounters> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

const PROGRESS_COLUMNS: &str = "user_id, xp, level, rank, current_streak, longest_streak, \
     last_activity_date, counters, updated_at";

fn progress_from_row(row: &Row<'_>) -> rusqlite::Result<UserProgress> {
    Ok(UserProgress {
        user_id: row.get(0)?,
        xp: get_u64(row, 1)?,
        level: get_u32(row, 2)?,
        rank: row.get(3)?,
        current_streak: get_u32(row, 4)?,
        longest_streak: get_u32(row, 5)?,
        last_activity_date: row.get::<_, Option<NaiveDate>>(6)?,
        counters: get_counters(row, 7)?,
        updated_at: row.get::<_, Option<DateTime<Utc>>>(8)?,
    })
}

const STEP_COLUMNS: &str =
    "id, roadmap_id, title, description, course_id, resource_url, step_order, status, completed_at";

fn step_from_row(row: &Row<'_>) -> rusqlite::Result<RoadmapStep> {
    Ok(RoadmapStep {
        id: row.get(0)?,
        roadmap_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        course_id: row.get(4)?,
        resource_url: row.get(5)?,
        order: get_u32(row, 6)?,
        status: get_status(row, 7)?,
        completed_at: row.get(8)?,
    })
}

const CERTIFICATE_COLUMNS: &str = "id, user_id, course_id, course_title, instructor_name, \
     completion_date, hours_completed, issued_at, fingerprint";

fn certificate_from_row(row: &Row<'_>) -> rusqlite::Result<Certificate> {
    Ok(Certificate {
        id: get_uuid(row, 0)?,
        user_id: row.get(1)?,
        course_id: row.get(2)?,
        course_title: row.get(3)?,
        instructor_name: row.get(4)?,
        completion_date: row.get(5)?,
        hours_completed: get_u32(row, 6)?,
        issued_at: row.get(7)?,
        fingerprint: row.get(8)?,
    })
}

/// SQLite store (single connection with mutex)
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at `path`
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        info!("Opening database at: {}", path.display());
        let conn = Connection::open(path).context("Failed to open SQLite database")?;

        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))
            .context("Failed to enable WAL mode")?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .context("Failed to set synchronous mode")?;
        Self::init(conn, busy_timeout)
    }

    /// Private database, mainly for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn, Duration::from_secs(5))
    }

    fn init(conn: Connection, busy_timeout: Duration) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("Failed to enable foreign keys")?;
        conn.busy_timeout(busy_timeout)
            .context("Failed to set busy timeout")?;
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize schema")?;
        debug!("Database schema ready");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Task outbox sharing this store's connection
    pub fn outbox(&self) -> SqliteOutbox {
        SqliteOutbox::new(Arc::clone(&self.conn))
    }

    fn run<T>(
        &self,
        behavior: TransactionBehavior,
        commit: bool,
        f: impl FnOnce(&mut dyn StoreTx) -> EduResult<T>,
    ) -> EduResult<T> {
        let mut conn = lock_conn(&self.conn)?;
        let tx = conn.transaction_with_behavior(behavior).map_err(db_err)?;
        let value = f(&mut SqliteTx { conn: &tx })?;
        if commit {
            tx.commit().map_err(db_err)?;
        } else {
            tx.rollback().map_err(db_err)?;
        }
        Ok(value)
    }
}

impl Store for SqliteStore {
    fn transaction<T>(
        &self,
        f: impl FnOnce(&mut dyn StoreTx) -> EduResult<T>,
    ) -> EduResult<T> {
        self.run(TransactionBehavior::Immediate, true, f)
    }

    fn read<T>(&self, f: impl FnOnce(&mut dyn StoreTx) -> EduResult<T>) -> EduResult<T> {
        self.run(TransactionBehavior::Deferred, false, f)
    }
}

struct SqliteTx<'a> {
    conn: &'a Connection,
}

impl StoreTx for SqliteTx<'_> {
    fn load_progress(&mut self, user_id: UserId) -> EduResult<Option<UserProgress>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM user_progress WHERE user_id = ?1", PROGRESS_COLUMNS),
                params![user_id],
                progress_from_row,
            )
            .optional()
            .map_err(db_err)
    }

    fn save_progress(&mut self, progress: &UserProgress) -> EduResult<()> {
        let counters = serde_json::to_string(&progress.counters)
            .map_err(|e| EduError::Storage(e.to_string()))?;
        self.conn
            .execute(
                "INSERT INTO user_progress
                     (user_id, xp, level, rank, current_streak, longest_streak,
                      last_activity_date, counters, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(user_id) DO UPDATE SET
                     xp = excluded.xp,
                     level = excluded.level,
                     rank = excluded.rank,
                     current_streak = excluded.current_streak,
                     longest_streak = excluded.longest_streak,
                     last_activity_date = excluded.last_activity_date,
                     counters = excluded.counters,
                     updated_at = excluded.updated_at",
                params![
                    progress.user_id,
                    to_i64(progress.xp, "xp")?,
                    progress.level,
                    progress.rank,
                    progress.current_streak,
                    progress.longest_streak,
                    progress.last_activity_date,
                    counters,
                    progress.updated_at,
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn top_progress(&mut self, limit: usize) -> EduResult<Vec<UserProgress>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM user_progress ORDER BY xp DESC, user_id ASC LIMIT ?1",
                PROGRESS_COLUMNS
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![to_i64(limit as u64, "limit")?], progress_from_row)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    fn count_xp_above(&mut self, xp: u64) -> EduResult<u64> {
        // Nothing can be stored above i64::MAX
        let Ok(xp) = i64::try_from(xp) else {
            return Ok(0);
        };
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM user_progress WHERE xp > ?1",
                params![xp],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count.max(0) as u64)
    }

    fn unlocked_achievements(&mut self, user_id: UserId) -> EduResult<Vec<UnlockedAchievement>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT achievement_id, unlocked_at FROM user_achievements
                 WHERE user_id = ?1 ORDER BY unlocked_at, achievement_id",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(UnlockedAchievement {
                    achievement_id: row.get(0)?,
                    unlocked_at: row.get(1)?,
                })
            })
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    fn insert_unlock(&mut self, user_id: UserId, unlock: &UnlockedAchievement) -> EduResult<bool> {
        let inserted = self
            .conn
            .execute(
                "INSERT INTO user_achievements (user_id, achievement_id, unlocked_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id, achievement_id) DO NOTHING",
                params![user_id, unlock.achievement_id, unlock.unlocked_at],
            )
            .map_err(db_err)?;
        Ok(inserted == 1)
    }

    fn insert_roadmap(
        &mut self,
        user_id: UserId,
        new: &NewRoadmap,
        created_at: DateTime<Utc>,
    ) -> EduResult<Roadmap> {
        self.conn
            .execute(
                "INSERT INTO roadmaps (user_id, name, description, target_skill, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user_id,
                    new.name,
                    new.description,
                    new.target_skill,
                    created_at
                ],
            )
            .map_err(db_err)?;
        Ok(Roadmap {
            id: self.conn.last_insert_rowid(),
            user_id,
            name: new.name.clone(),
            description: new.description.clone(),
            target_skill: new.target_skill.clone(),
            created_at,
        })
    }

    fn load_roadmap(&mut self, roadmap_id: RoadmapId) -> EduResult<Option<Roadmap>> {
        self.conn
            .query_row(
                "SELECT id, user_id, name, description, target_skill, created_at
                 FROM roadmaps WHERE id = ?1",
                params![roadmap_id],
                |row| {
                    Ok(Roadmap {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        name: row.get(2)?,
                        description: row.get(3)?,
                        target_skill: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(db_err)
    }

    fn load_steps(&mut self, roadmap_id: RoadmapId) -> EduResult<Vec<RoadmapStep>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM roadmap_steps WHERE roadmap_id = ?1 ORDER BY step_order",
                STEP_COLUMNS
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![roadmap_id], step_from_row)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    fn load_step(&mut self, step_id: StepId) -> EduResult<Option<RoadmapStep>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM roadmap_steps WHERE id = ?1", STEP_COLUMNS),
                params![step_id],
                step_from_row,
            )
            .optional()
            .map_err(db_err)
    }

    fn insert_step(
        &mut self,
        roadmap_id: RoadmapId,
        new: &NewStep,
        order: u32,
    ) -> EduResult<RoadmapStep> {
        let status = StepStatus::Pending;
        self.conn
            .execute(
                "INSERT INTO roadmap_steps
                     (roadmap_id, title, description, course_id, resource_url, step_order, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    roadmap_id,
                    new.title,
                    new.description,
                    new.course_id,
                    new.resource_url,
                    order,
                    status.as_str(),
                ],
            )
            .map_err(db_err)?;
        Ok(RoadmapStep {
            id: self.conn.last_insert_rowid(),
            roadmap_id,
            title: new.title.clone(),
            description: new.description.clone(),
            course_id: new.course_id,
            resource_url: new.resource_url.clone(),
            order,
            status,
            completed_at: None,
        })
    }

    fn save_step(&mut self, step: &RoadmapStep) -> EduResult<()> {
        let updated = self
            .conn
            .execute(
                "UPDATE roadmap_steps SET status = ?1, completed_at = ?2 WHERE id = ?3",
                params![step.status.as_str(), step.completed_at, step.id],
            )
            .map_err(db_err)?;
        if updated == 0 {
            return Err(EduError::not_found("step", step.id));
        }
        Ok(())
    }

    fn delete_step(&mut self, step_id: StepId) -> EduResult<()> {
        self.conn
            .execute("DELETE FROM roadmap_steps WHERE id = ?1", params![step_id])
            .map_err(db_err)?;
        Ok(())
    }

    fn reassign_orders(
        &mut self,
        roadmap_id: RoadmapId,
        orders: &[(StepId, u32)],
    ) -> EduResult<()> {
        // Park every moved step on a distinct negative slot first so the
        // UNIQUE (roadmap_id, step_order) constraint holds after each update.
        let mut park = self
            .conn
            .prepare(
                "UPDATE roadmap_steps SET step_order = ?1 WHERE id = ?2 AND roadmap_id = ?3",
            )
            .map_err(db_err)?;
        for (step_id, order) in orders {
            let parked = -(*order as i64) - 1;
            let updated = park
                .execute(params![parked, step_id, roadmap_id])
                .map_err(db_err)?;
            if updated == 0 {
                return Err(EduError::not_found("step", step_id));
            }
        }
        self.conn
            .execute(
                "UPDATE roadmap_steps SET step_order = -step_order - 1
                 WHERE roadmap_id = ?1 AND step_order < 0",
                params![roadmap_id],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn upsert_course(&mut self, course: &Course) -> EduResult<()> {
        self.conn
            .execute(
                "INSERT INTO courses (id, title, instructor_name, duration_hours)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                     title = excluded.title,
                     instructor_name = excluded.instructor_name,
                     duration_hours = excluded.duration_hours",
                params![
                    course.id,
                    course.title,
                    course.instructor_name,
                    course.duration_hours
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn load_course(&mut self, course_id: CourseId) -> EduResult<Option<Course>> {
        self.conn
            .query_row(
                "SELECT id, title, instructor_name, duration_hours FROM courses WHERE id = ?1",
                params![course_id],
                |row| {
                    Ok(Course {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        instructor_name: row.get(2)?,
                        duration_hours: get_u32(row, 3)?,
                    })
                },
            )
            .optional()
            .map_err(db_err)
    }

    fn upsert_enrollment(&mut self, enrollment: &Enrollment) -> EduResult<()> {
        self.conn
            .execute(
                "INSERT INTO enrollments (user_id, course_id, progress, completed_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, course_id) DO UPDATE SET
                     progress = excluded.progress,
                     completed_at = excluded.completed_at",
                params![
                    enrollment.user_id,
                    enrollment.course_id,
                    enrollment.progress,
                    enrollment.completed_at
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn load_enrollment(
        &mut self,
        user_id: UserId,
        course_id: CourseId,
    ) -> EduResult<Option<Enrollment>> {
        self.conn
            .query_row(
                "SELECT user_id, course_id, progress, completed_at FROM enrollments
                 WHERE user_id = ?1 AND course_id = ?2",
                params![user_id, course_id],
                |row| {
                    Ok(Enrollment {
                        user_id: row.get(0)?,
                        course_id: row.get(1)?,
                        progress: row.get(2)?,
                        completed_at: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(db_err)
    }

    fn find_certificate(
        &mut self,
        user_id: UserId,
        course_id: CourseId,
    ) -> EduResult<Option<Certificate>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM certificates WHERE user_id = ?1 AND course_id = ?2",
                    CERTIFICATE_COLUMNS
                ),
                params![user_id, course_id],
                certificate_from_row,
            )
            .optional()
            .map_err(db_err)
    }

    fn insert_certificate(&mut self, cert: &Certificate) -> EduResult<Certificate> {
        self.conn
            .execute(
                "INSERT INTO certificates
                     (id, user_id, course_id, course_title, instructor_name,
                      completion_date, hours_completed, issued_at, fingerprint)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(user_id, course_id) DO NOTHING",
                params![
                    cert.id.to_string(),
                    cert.user_id,
                    cert.course_id,
                    cert.course_title,
                    cert.instructor_name,
                    cert.completion_date,
                    cert.hours_completed,
                    cert.issued_at,
                    cert.fingerprint,
                ],
            )
            .map_err(db_err)?;
        self.find_certificate(cert.user_id, cert.course_id)?
            .ok_or_else(|| EduError::Storage("certificate vanished after insert".to_string()))
    }

    fn certificate_by_id(&mut self, id: Uuid) -> EduResult<Option<Certificate>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM certificates WHERE id = ?1", CERTIFICATE_COLUMNS),
                params![id.to_string()],
                certificate_from_row,
            )
            .optional()
            .map_err(db_err)
    }

    fn certificates_for_user(&mut self, user_id: UserId) -> EduResult<Vec<Certificate>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM certificates WHERE user_id = ?1 ORDER BY issued_at, course_id",
                CERTIFICATE_COLUMNS
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![user_id], certificate_from_row)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    fn certificate_task_queued(&mut self, id: Uuid) -> EduResult<bool> {
        let queued: Option<bool> = self
            .conn
            .query_row(
                "SELECT task_queued_at IS NOT NULL FROM certificates WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        Ok(queued.unwrap_or(false))
    }

    fn mark_certificate_queued(&mut self, id: Uuid, at: DateTime<Utc>) -> EduResult<()> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM certificates WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        if found.is_none() {
            return Err(EduError::not_found("certificate", id));
        }
        self.conn
            .execute(
                "UPDATE certificates SET task_queued_at = ?2
                 WHERE id = ?1 AND task_queued_at IS NULL",
                params![id.to_string(), at],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn unqueued_certificates(
        &mut self,
        issued_before: DateTime<Utc>,
        limit: usize,
    ) -> EduResult<Vec<Certificate>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM certificates
                 WHERE task_queued_at IS NULL AND issued_at <= ?1
                 ORDER BY issued_at, id LIMIT ?2",
                CERTIFICATE_COLUMNS
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(
                params![issued_before, to_i64(limit as u64, "limit")?],
                certificate_from_row,
            )
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn test_progress_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut progress = UserProgress::new(11);
        progress.xp = 1_234;
        progress.level = 4;
        progress.current_streak = 3;
        progress.longest_streak = 9;
        progress.last_activity_date = NaiveDate::from_ymd_opt(2026, 2, 28);
        progress.counters.perfect_scores = 2;
        progress.updated_at = Some(at(9));

        store.transaction(|tx| tx.save_progress(&progress)).unwrap();
        let loaded = store.read(|tx| tx.load_progress(11)).unwrap();
        assert_eq!(loaded, Some(progress));
    }

    #[test]
    fn test_rollback_on_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        let result: EduResult<()> = store.transaction(|tx| {
            tx.save_progress(&UserProgress::new(5))?;
            Err(EduError::precondition("abort"))
        });
        assert!(result.is_err());
        assert!(store.read(|tx| tx.load_progress(5)).unwrap().is_none());
    }

    #[test]
    fn test_reassign_orders_swaps_without_conflict() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (a, b, c) = store
            .transaction(|tx| {
                let roadmap = tx.insert_roadmap(1, &NewRoadmap::named("Rust"), at(8))?;
                let a = tx.insert_step(roadmap.id, &NewStep::titled("a"), 0)?;
                let b = tx.insert_step(roadmap.id, &NewStep::titled("b"), 1)?;
                let c = tx.insert_step(roadmap.id, &NewStep::titled("c"), 2)?;
                Ok((a, b, c))
            })
            .unwrap();

        store
            .transaction(|tx| tx.reassign_orders(a.roadmap_id, &[(c.id, 0), (a.id, 1), (b.id, 2)]))
            .unwrap();

        let steps = store.read(|tx| tx.load_steps(a.roadmap_id)).unwrap();
        let titles: Vec<&str> = steps.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_certificate_conflict_returns_canonical() {
        let store = SqliteStore::open_in_memory().unwrap();
        let course = Course {
            id: 3,
            title: "Ownership".to_string(),
            instructor_name: "Ferris".to_string(),
            duration_hours: 12,
        };
        let mut enrollment = Enrollment::new(1, 3);
        enrollment.set_progress(100.0, at(10)).unwrap();

        let first = Certificate::issue(&course, &enrollment, at(11));
        let second = Certificate::issue(&course, &enrollment, at(12));

        let stored = store
            .transaction(|tx| {
                tx.upsert_course(&course)?;
                tx.insert_certificate(&first)?;
                tx.insert_certificate(&second)
            })
            .unwrap();
        assert_eq!(stored.id, first.id);
        assert!(stored.is_authentic());

        let by_id = store.read(|tx| tx.certificate_by_id(first.id)).unwrap();
        assert_eq!(by_id, Some(first));
        assert!(store
            .read(|tx| tx.certificate_by_id(second.id))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_unqueued_certificates() {
        let store = SqliteStore::open_in_memory().unwrap();
        let course = Course {
            id: 4,
            title: "Lifetimes".to_string(),
            instructor_name: "Ferris".to_string(),
            duration_hours: 6,
        };
        let certs: Vec<Certificate> = (1..=2)
            .map(|user| {
                let mut enrollment = Enrollment::new(user, 4);
                enrollment.set_progress(100.0, at(9)).unwrap();
                Certificate::issue(&course, &enrollment, at(10 + user as u32))
            })
            .collect();
        store
            .transaction(|tx| {
                tx.upsert_course(&course)?;
                for cert in &certs {
                    tx.insert_certificate(cert)?;
                }
                Ok(())
            })
            .unwrap();

        let pending = store.read(|tx| tx.unqueued_certificates(at(23), 10)).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, certs[0].id);
        // Issued after the cutoff
        let early = store.read(|tx| tx.unqueued_certificates(at(11), 10)).unwrap();
        assert_eq!(early.len(), 1);

        store
            .transaction(|tx| tx.mark_certificate_queued(certs[0].id, at(13)))
            .unwrap();
        assert!(store
            .read(|tx| tx.certificate_task_queued(certs[0].id))
            .unwrap());
        assert!(!store
            .read(|tx| tx.certificate_task_queued(certs[1].id))
            .unwrap());
        let pending = store.read(|tx| tx.unqueued_certificates(at(23), 10)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, certs[1].id);

        let missing = store.transaction(|tx| tx.mark_certificate_queued(Uuid::new_v4(), at(14)));
        assert_eq!(missing.unwrap_err().kind(), "not_found");
    }

    #[test]
    fn test_enrollment_requires_course() {
        let store = SqliteStore::open_in_memory().unwrap();
        let result = store.transaction(|tx| tx.upsert_enrollment(&Enrollment::new(1, 99)));
        assert!(matches!(result, Err(EduError::Storage(_))));
    }
}
