//! Durable task outbox in the store's database.
//!
//! Delivery is at-least-once: `claim` leases tasks to a worker, `ack`
//! deletes them, `release` makes them visible again with the failure noted.
//! A worker that dies mid-task loses its lease when it expires.

use super::sqlite::{db_err, get_u64, lock_conn, to_i64};
use crate::queue::TaskQueue;
use chrono::{DateTime, Utc};
use edu_shared::{EduError, EduResult, QueuedTask, TaskId};
use rusqlite::types::Type;
use rusqlite::{params, Connection, TransactionBehavior};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Clone)]
pub struct SqliteOutbox {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteOutbox {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Enqueue with an explicit timestamp
    pub fn push(&self, name: &str, payload: &Value, now: DateTime<Utc>) -> EduResult<TaskId> {
        let payload =
            serde_json::to_string(payload).map_err(|e| EduError::Queue(e.to_string()))?;
        let conn = lock_conn(&self.conn)?;
        conn.execute(
            "INSERT INTO task_outbox (name, payload, enqueued_at) VALUES (?1, ?2, ?3)",
            params![name, payload, now],
        )
        .map_err(db_err)?;
        let id = conn.last_insert_rowid();
        debug!("Enqueued task {} ({})", id, name);
        Ok(id)
    }

    /// Lease up to `limit` visible tasks for `lease_secs`, oldest first
    pub fn claim(
        &self,
        limit: usize,
        lease_secs: u64,
        now: DateTime<Utc>,
    ) -> EduResult<Vec<QueuedTask>> {
        let now_ts = now.timestamp();
        let until = now_ts.saturating_add(to_i64(lease_secs, "lease")?);

        let mut conn = lock_conn(&self.conn)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let tasks = {
            let mut stmt = tx
                .prepare(
                    "SELECT id, name, payload, enqueued_at, attempts, last_error
                     FROM task_outbox
                     WHERE leased_until IS NULL OR leased_until <= ?1
                     ORDER BY id LIMIT ?2",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![now_ts, to_i64(limit as u64, "limit")?], |row| {
                    let payload: String = row.get(2)?;
                    let payload: Value = serde_json::from_str(&payload).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
                    })?;
                    let attempts = get_u64(row, 4)?;
                    Ok(QueuedTask {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        payload,
                        enqueued_at: row.get(3)?,
                        attempts: u32::try_from(attempts + 1).unwrap_or(u32::MAX),
                        last_error: row.get(5)?,
                    })
                })
                .map_err(db_err)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)?
        };

        for task in &tasks {
            tx.execute(
                "UPDATE task_outbox SET leased_until = ?1, attempts = attempts + 1 WHERE id = ?2",
                params![until, task.id],
            )
            .map_err(db_err)?;
        }
        tx.commit().map_err(db_err)?;
        Ok(tasks)
    }

    /// Task handled; remove it
    pub fn ack(&self, id: TaskId) -> EduResult<()> {
        let conn = lock_conn(&self.conn)?;
        conn.execute("DELETE FROM task_outbox WHERE id = ?1", params![id])
            .map_err(db_err)?;
        Ok(())
    }

    /// Task failed; make it visible to the next claim
    pub fn release(&self, id: TaskId, error: &str) -> EduResult<()> {
        let conn = lock_conn(&self.conn)?;
        conn.execute(
            "UPDATE task_outbox SET leased_until = NULL, last_error = ?1 WHERE id = ?2",
            params![error, id],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Tasks not yet acknowledged, leased or not
    pub fn pending(&self) -> EduResult<u64> {
        let conn = lock_conn(&self.conn)?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM task_outbox", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(count.max(0) as u64)
    }
}

impl TaskQueue for SqliteOutbox {
    fn enqueue(&self, name: &str, payload: Value) -> EduResult<()> {
        self.push(name, &payload, Utc::now())
            .map(|_| ())
            .map_err(|e| match e {
                EduError::Storage(msg) => EduError::Queue(msg),
                other => other,
            })
    }
}
