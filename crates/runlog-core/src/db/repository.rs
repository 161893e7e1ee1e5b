//! Run repository implementation

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension};

use super::Database;
use crate::error::Result;
use crate::models::{ContentKey, Run, RunId, SyncStatus, Tombstone};

const LAST_SYNC_KEY: &str = "last_sync_at";

const RUN_COLUMNS: &str = "id, date_ms, distance_km, time_minutes, status";

/// Durable keyed storage for runs.
///
/// Every method commits on its own; multi-statement methods
/// (`replace`, `delete_and_tombstone`) are atomic.
pub trait RunRepository {
    /// Get a run by ID
    fn get(&self, id: &RunId) -> Result<Option<Run>>;

    /// Find the run occupying a content key, if any
    fn find_by_content_key(&self, key: &ContentKey) -> Result<Option<Run>>;

    /// Full scan, newest run first
    fn list(&self) -> Result<Vec<Run>>;

    /// Insert a new run
    fn insert(&self, run: &Run) -> Result<()>;

    /// Swap `old_id` for `run` in one transaction.
    ///
    /// Any other row holding `run`'s content key is the same logical run and
    /// is removed too.
    fn replace(&self, old_id: &RunId, run: &Run) -> Result<()>;

    /// Update the sync status of a run, returning whether it existed
    fn set_status(&self, id: &RunId, status: SyncStatus) -> Result<bool>;

    /// Remove a run, returning it if it existed
    fn delete(&self, id: &RunId) -> Result<Option<Run>>;

    /// Remove a run and record a tombstone for it in one transaction
    fn delete_and_tombstone(&self, id: &RunId) -> Result<Option<Run>>;

    /// Tombstones awaiting remote confirmation, oldest first
    fn list_tombstones(&self) -> Result<Vec<Tombstone>>;

    /// Drop a tombstone once the remote no longer holds the run
    fn clear_tombstone(&self, id: &RunId) -> Result<()>;

    /// Bump the attempt counter and remember the failure message
    fn record_tombstone_failure(&self, id: &RunId, error: &str) -> Result<()>;

    /// When the last successful download pass finished
    fn last_sync_at(&self) -> Result<Option<DateTime<Utc>>>;

    /// Persist the time of a successful download pass
    fn set_last_sync_at(&self, at: DateTime<Utc>) -> Result<()>;
}

fn conversion_error(
    column: usize,
    error: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(error))
}

fn parse_timestamp(column: usize, value: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(value)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(column, value))
}

/// Parse a run from a database row
fn parse_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<Run> {
    let id: String = row.get(0)?;
    let status: String = row.get(4)?;
    Ok(Run {
        id: id.parse().map_err(|error| conversion_error(0, error))?,
        date: parse_timestamp(1, row.get(1)?)?,
        distance_km: row.get(2)?,
        time_minutes: row.get(3)?,
        status: status.parse().map_err(|error| conversion_error(4, error))?,
    })
}

fn parse_tombstone(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tombstone> {
    let id: String = row.get(0)?;
    Ok(Tombstone {
        id: id.parse().map_err(|error| conversion_error(0, error))?,
        deleted_at: parse_timestamp(1, row.get(1)?)?,
        attempts: row.get(2)?,
        last_error: row.get(3)?,
    })
}

fn insert_run(conn: &rusqlite::Connection, run: &Run) -> Result<()> {
    let now = Utc::now().timestamp_millis();
    conn.execute(
        "INSERT INTO runs (id, date_ms, distance_km, time_minutes, content_key, status, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            run.id.as_str(),
            run.date.timestamp_millis(),
            run.distance_km,
            run.time_minutes,
            run.content_key().to_storage_key(),
            run.status.as_str(),
            now,
            now
        ],
    )?;
    Ok(())
}

impl Database {
    fn query_run(&self, sql: &str, param: &str) -> Result<Option<Run>> {
        Ok(self
            .connection()
            .query_row(sql, params![param], parse_run)
            .optional()?)
    }
}

impl RunRepository for Database {
    fn get(&self, id: &RunId) -> Result<Option<Run>> {
        self.query_run(
            &format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?"),
            &id.as_str(),
        )
    }

    fn find_by_content_key(&self, key: &ContentKey) -> Result<Option<Run>> {
        self.query_run(
            &format!("SELECT {RUN_COLUMNS} FROM runs WHERE content_key = ?"),
            &key.to_storage_key(),
        )
    }

    fn list(&self) -> Result<Vec<Run>> {
        let mut stmt = self.connection().prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM runs ORDER BY date_ms DESC, id ASC"
        ))?;

        let runs = stmt
            .query_map([], parse_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(runs)
    }

    fn insert(&self, run: &Run) -> Result<()> {
        insert_run(self.connection(), run)
    }

    fn replace(&self, old_id: &RunId, run: &Run) -> Result<()> {
        let tx = self.connection().unchecked_transaction()?;

        tx.execute("DELETE FROM runs WHERE id = ?", params![old_id.as_str()])?;
        tx.execute(
            "DELETE FROM runs WHERE id = ? OR content_key = ?",
            params![run.id.as_str(), run.content_key().to_storage_key()],
        )?;
        insert_run(&tx, run)?;

        tx.commit()?;
        Ok(())
    }

    fn set_status(&self, id: &RunId, status: SyncStatus) -> Result<bool> {
        let rows = self.connection().execute(
            "UPDATE runs SET status = ?, updated_at = ? WHERE id = ?",
            params![status.as_str(), Utc::now().timestamp_millis(), id.as_str()],
        )?;
        Ok(rows > 0)
    }

    fn delete(&self, id: &RunId) -> Result<Option<Run>> {
        let existing = self.get(id)?;
        if existing.is_some() {
            self.connection()
                .execute("DELETE FROM runs WHERE id = ?", params![id.as_str()])?;
        }
        Ok(existing)
    }

    fn delete_and_tombstone(&self, id: &RunId) -> Result<Option<Run>> {
        let existing = self.get(id)?;
        let tx = self.connection().unchecked_transaction()?;

        tx.execute("DELETE FROM runs WHERE id = ?", params![id.as_str()])?;
        tx.execute(
            "INSERT INTO tombstones (id, deleted_at, attempts, last_error) VALUES (?, ?, 0, NULL)
             ON CONFLICT(id) DO UPDATE SET deleted_at = excluded.deleted_at",
            params![id.as_str(), Utc::now().timestamp_millis()],
        )?;

        tx.commit()?;
        Ok(existing)
    }

    fn list_tombstones(&self) -> Result<Vec<Tombstone>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, deleted_at, attempts, last_error FROM tombstones ORDER BY deleted_at ASC",
        )?;

        let tombstones = stmt
            .query_map([], parse_tombstone)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(tombstones)
    }

    fn clear_tombstone(&self, id: &RunId) -> Result<()> {
        self.connection()
            .execute("DELETE FROM tombstones WHERE id = ?", params![id.as_str()])?;
        Ok(())
    }

    fn record_tombstone_failure(&self, id: &RunId, error: &str) -> Result<()> {
        self.connection().execute(
            "UPDATE tombstones SET attempts = attempts + 1, last_error = ? WHERE id = ?",
            params![error, id.as_str()],
        )?;
        Ok(())
    }

    fn last_sync_at(&self) -> Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = self
            .connection()
            .query_row(
                "SELECT value FROM sync_meta WHERE key = ?",
                params![LAST_SYNC_KEY],
                |row| row.get(0),
            )
            .optional()?;

        Ok(raw
            .and_then(|value| DateTime::parse_from_rfc3339(&value).ok())
            .map(|value| value.with_timezone(&Utc)))
    }

    fn set_last_sync_at(&self, at: DateTime<Utc>) -> Result<()> {
        self.connection().execute(
            "INSERT INTO sync_meta (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![LAST_SYNC_KEY, at.to_rfc3339()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn run_on(day: u32, distance_km: f64, time_minutes: f64) -> Run {
        Run::new(
            Utc.with_ymd_and_hms(2025, 1, day, 7, 0, 0).unwrap(),
            distance_km,
            time_minutes,
        )
        .unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let db = setup();
        let run = run_on(1, 5.0, 30.0);
        db.insert(&run).unwrap();

        let fetched = db.get(&run.id).unwrap().unwrap();
        assert_eq!(fetched, run);
    }

    #[test]
    fn test_list_newest_first() {
        let db = setup();
        db.insert(&run_on(1, 5.0, 30.0)).unwrap();
        db.insert(&run_on(3, 5.0, 30.0)).unwrap();
        db.insert(&run_on(2, 5.0, 30.0)).unwrap();

        let runs = db.list().unwrap();
        assert_eq!(runs.len(), 3);
        assert!(runs[0].date > runs[1].date);
        assert!(runs[1].date > runs[2].date);
    }

    #[test]
    fn test_insert_rejects_duplicate_content_key() {
        let db = setup();
        db.insert(&run_on(1, 5.0, 30.0)).unwrap();
        assert!(db.insert(&run_on(1, 5.0, 30.0)).is_err());
        assert_eq!(db.list().unwrap().len(), 1);
    }

    #[test]
    fn test_find_by_content_key() {
        let db = setup();
        let run = run_on(1, 5.0, 30.0);
        db.insert(&run).unwrap();

        let found = db.find_by_content_key(&run.content_key()).unwrap();
        assert_eq!(found.map(|found| found.id), Some(run.id));
        assert!(db
            .find_by_content_key(&run_on(2, 5.0, 30.0).content_key())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_replace_swaps_identity() {
        let db = setup();
        let local = run_on(1, 5.0, 30.0);
        db.insert(&local).unwrap();

        let canonical = Run {
            id: RunId::new(),
            status: SyncStatus::Synced,
            ..local.clone()
        };
        db.replace(&local.id, &canonical).unwrap();

        assert!(db.get(&local.id).unwrap().is_none());
        assert_eq!(db.get(&canonical.id).unwrap(), Some(canonical));
        assert_eq!(db.list().unwrap().len(), 1);
    }

    #[test]
    fn test_replace_absorbs_other_row_with_same_key() {
        let db = setup();
        let old = run_on(1, 5.0, 30.0);
        let other = run_on(2, 5.0, 30.0);
        db.insert(&old).unwrap();
        db.insert(&other).unwrap();

        let canonical = Run {
            id: RunId::new(),
            status: SyncStatus::Synced,
            ..other.clone()
        };
        db.replace(&old.id, &canonical).unwrap();

        let runs = db.list().unwrap();
        assert_eq!(runs, vec![canonical]);
    }

    #[test]
    fn test_set_status() {
        let db = setup();
        let run = run_on(1, 5.0, 30.0);
        db.insert(&run).unwrap();

        assert!(db.set_status(&run.id, SyncStatus::Synced).unwrap());
        assert!(db.get(&run.id).unwrap().unwrap().is_synced());
        assert!(!db.set_status(&RunId::new(), SyncStatus::Synced).unwrap());
    }

    #[test]
    fn test_delete_missing_is_not_an_error() {
        let db = setup();
        assert!(db.delete(&RunId::new()).unwrap().is_none());
    }

    #[test]
    fn test_delete_and_tombstone() {
        let db = setup();
        let run = run_on(1, 5.0, 30.0).with_status(SyncStatus::Synced);
        db.insert(&run).unwrap();

        let removed = db.delete_and_tombstone(&run.id).unwrap();
        assert_eq!(removed, Some(run.clone()));
        assert!(db.get(&run.id).unwrap().is_none());

        let tombstones = db.list_tombstones().unwrap();
        assert_eq!(tombstones.len(), 1);
        assert_eq!(tombstones[0].id, run.id);
        assert_eq!(tombstones[0].attempts, 0);
        assert_eq!(tombstones[0].status(), SyncStatus::TombstonePending);
    }

    #[test]
    fn test_tombstone_failure_and_clear() {
        let db = setup();
        let id = RunId::new();
        db.delete_and_tombstone(&id).unwrap();

        db.record_tombstone_failure(&id, "HTTP 500").unwrap();
        db.record_tombstone_failure(&id, "timed out").unwrap();
        let tombstone = db.list_tombstones().unwrap().remove(0);
        assert_eq!(tombstone.attempts, 2);
        assert_eq!(tombstone.last_error.as_deref(), Some("timed out"));

        db.clear_tombstone(&id).unwrap();
        assert!(db.list_tombstones().unwrap().is_empty());
    }

    #[test]
    fn test_last_sync_at_roundtrip() {
        let db = setup();
        assert!(db.last_sync_at().unwrap().is_none());

        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        db.set_last_sync_at(at).unwrap();
        db.set_last_sync_at(at).unwrap();
        assert_eq!(db.last_sync_at().unwrap(), Some(at));
    }
}
