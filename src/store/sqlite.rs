//! SQLite-backed durable store for events, daily state, missing periods, and
//! alert attempts. WAL-mode, schema-on-open, single-writer-per-row discipline.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, SecondsFormat};
use chrono_tz::Tz;
use rusqlite::{Connection, OpenFlags, params};

use crate::core::config::StoreConfig;
use crate::core::errors::{PctrError, Result};
use crate::store::model::{
    AlertLogRow, AlertStatus, DailyStatePatch, DailyStateRow, Direction, EventRow,
    MissingPeriodRow, Session,
};

/// Durable store. Owns all persistent state; every other component holds a
/// short-lived handle and reads/writes exclusively through this contract.
pub struct Store {
    conn: Connection,
    path: PathBuf,
}

impl Store {
    /// Open (or create) the database at `path`, applying pragmas and schema.
    ///
    /// Fails hard only if the storage location is unreachable; schema
    /// mismatch at startup is the only other fatal condition.
    pub fn open(path: &Path, cfg: &StoreConfig) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| PctrError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        apply_pragmas(&conn, cfg)?;
        apply_schema(&conn)?;

        let store = Self {
            conn,
            path: path.to_path_buf(),
        };
        store.log_startup_verification()?;
        Ok(store)
    }

    /// Path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn log_startup_verification(&self) -> Result<()> {
        let tables = ["events", "daily_state", "missing_periods", "alert_log"];
        for table in tables {
            let count: i64 =
                self.conn
                    .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                        row.get(0)
                    })?;
            eprintln!(
                "[PCTR-STORE] verified table {table} ({count} rows) at {}",
                self.path.display()
            );
        }
        Ok(())
    }

    // ──────────────────── events ────────────────────

    /// Insert a gate-crossing event, normalizing direction and returning the
    /// assigned monotonic id.
    pub fn append_event(
        &self,
        event_time: DateTime<Tz>,
        direction: Direction,
        camera_id: &str,
    ) -> Result<i64> {
        let created_at = event_time;
        self.conn
            .prepare_cached(
                "INSERT INTO events (event_time, event_time_utc, local_date, direction, camera_id, created_at)
                 VALUES (?1,?2,?3,?4,?5,?6)",
            )?
            .execute(params![
                to_rfc3339(event_time),
                to_rfc3339_utc(event_time),
                event_time.date_naive().to_string(),
                direction.as_db_str(),
                camera_id,
                to_rfc3339(created_at),
            ])?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Self-test: if Events is empty and the service has been up for more
    /// than 60 seconds, insert one marker event proving the write path end
    /// to end. Returns whether a marker was inserted.
    pub fn maybe_self_test(&self, uptime: Duration, now: DateTime<Tz>) -> Result<bool> {
        if uptime < Duration::from_secs(60) {
            return Ok(false);
        }
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        if count > 0 {
            return Ok(false);
        }
        self.append_event(now, Direction::In, "self_test")?;
        eprintln!("[PCTR-STORE] inserted self-test marker event after {uptime:?} uptime");
        Ok(true)
    }

    /// All events for a calendar date, oldest first.
    pub fn events_for_date(&self, date: NaiveDate) -> Result<Vec<EventRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, event_time, direction, camera_id, created_at
             FROM events WHERE local_date = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![date.to_string()], row_to_event)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Count of IN and OUT events within `[start, end)`, used for morning
    /// baseline recomputation and realtime-present computation.
    pub fn event_counts_between(
        &self,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> Result<(i64, i64)> {
        let in_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM events
             WHERE direction = 'IN' AND event_time_utc >= ?1 AND event_time_utc < ?2",
            params![to_rfc3339_utc(start), to_rfc3339_utc(end)],
            |row| row.get(0),
        )?;
        let out_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM events
             WHERE direction = 'OUT' AND event_time_utc >= ?1 AND event_time_utc < ?2",
            params![to_rfc3339_utc(start), to_rfc3339_utc(end)],
            |row| row.get(0),
        )?;
        Ok((in_count, out_count))
    }

    /// Count of IN and OUT events for the whole calendar date so far.
    pub fn event_counts_for_date(&self, date: NaiveDate) -> Result<(i64, i64)> {
        let in_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM events WHERE local_date = ?1 AND direction = 'IN'",
            params![date.to_string()],
            |row| row.get(0),
        )?;
        let out_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM events WHERE local_date = ?1 AND direction = 'OUT'",
            params![date.to_string()],
            |row| row.get(0),
        )?;
        Ok((in_count, out_count))
    }

    // ──────────────────── daily_state ────────────────────

    /// Merge `patch` into today's row, creating it if absent. Once
    /// `is_frozen`, further writes to `total_morning` are silently ignored.
    pub fn upsert_daily_state(
        &self,
        date: NaiveDate,
        patch: &DailyStatePatch,
        now: DateTime<Tz>,
    ) -> Result<()> {
        let existing = self.daily_state(date)?;
        let base = existing.unwrap_or(DailyStateRow {
            date,
            total_morning: 0,
            is_frozen: false,
            realtime_in: 0,
            realtime_out: 0,
            updated_at: now,
        });

        let total_morning = if base.is_frozen {
            base.total_morning
        } else {
            patch.total_morning.unwrap_or(base.total_morning)
        };
        let is_frozen = patch.is_frozen.unwrap_or(base.is_frozen);
        let realtime_in = patch.realtime_in.unwrap_or(base.realtime_in);
        let realtime_out = patch.realtime_out.unwrap_or(base.realtime_out);

        self.conn
            .prepare_cached(
                "INSERT INTO daily_state (date, total_morning, is_frozen, realtime_in, realtime_out, updated_at)
                 VALUES (?1,?2,?3,?4,?5,?6)
                 ON CONFLICT(date) DO UPDATE SET
                    total_morning = excluded.total_morning,
                    is_frozen = excluded.is_frozen,
                    realtime_in = excluded.realtime_in,
                    realtime_out = excluded.realtime_out,
                    updated_at = excluded.updated_at",
            )?
            .execute(params![
                date.to_string(),
                total_morning,
                i64::from(is_frozen),
                realtime_in,
                realtime_out,
                to_rfc3339(now),
            ])?;
        Ok(())
    }

    /// The row for `date`, if one has been created.
    pub fn daily_state(&self, date: NaiveDate) -> Result<Option<DailyStateRow>> {
        self.conn
            .query_row(
                "SELECT date, total_morning, is_frozen, realtime_in, realtime_out, updated_at
                 FROM daily_state WHERE date = ?1",
                params![date.to_string()],
                row_to_daily_state,
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other.into()),
            })
    }

    // ──────────────────── missing_periods ────────────────────

    /// Open a new missing period for `date`. Fails if one is already open.
    pub fn open_missing_period(
        &self,
        date: NaiveDate,
        session: Session,
        start_time: DateTime<Tz>,
    ) -> Result<i64> {
        if self.active_missing_period(date)?.is_some() {
            return Err(PctrError::Runtime {
                details: format!("missing period already open for {date}"),
            });
        }
        self.conn
            .prepare_cached(
                "INSERT INTO missing_periods (date, session, start_time, end_time, duration_minutes, missing_count_observed)
                 VALUES (?1,?2,?3,NULL,NULL,0)",
            )?
            .execute(params![
                date.to_string(),
                session.as_db_str(),
                to_rfc3339(start_time),
            ])?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Update the rolling witnessed shortfall on an open period.
    pub fn update_missing_period(&self, id: i64, missing_observed: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE missing_periods SET missing_count_observed = ?1 WHERE id = ?2 AND end_time IS NULL",
            params![missing_observed, id],
        )?;
        Ok(())
    }

    /// Close an open period, freezing its `duration_minutes`.
    pub fn close_missing_period(&self, id: i64, end_time: DateTime<Tz>) -> Result<()> {
        let start_time: String = self.conn.query_row(
            "SELECT start_time FROM missing_periods WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        let start = parse_rfc3339(&start_time)?;
        let duration_minutes = (end_time.naive_utc() - start.naive_utc()).num_minutes();
        self.conn.execute(
            "UPDATE missing_periods SET end_time = ?1, duration_minutes = ?2 WHERE id = ?3 AND end_time IS NULL",
            params![to_rfc3339(end_time), duration_minutes, id],
        )?;
        Ok(())
    }

    /// The open period for `date`, if any.
    pub fn active_missing_period(&self, date: NaiveDate) -> Result<Option<MissingPeriodRow>> {
        self.conn
            .query_row(
                "SELECT id, date, session, start_time, end_time, duration_minutes, missing_count_observed
                 FROM missing_periods WHERE date = ?1 AND end_time IS NULL",
                params![date.to_string()],
                row_to_missing_period,
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other.into()),
            })
    }

    /// All missing periods (open or closed) for `date`, oldest first.
    pub fn missing_periods_for_date(&self, date: NaiveDate) -> Result<Vec<MissingPeriodRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, date, session, start_time, end_time, duration_minutes, missing_count_observed
             FROM missing_periods WHERE date = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![date.to_string()], row_to_missing_period)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ──────────────────── alert_log ────────────────────

    /// Record one alert attempt (sent, failed, or skipped). Never fails on
    /// duplicates — every attempt, including skips, is recorded for audit.
    pub fn append_alert(&self, row: &AlertLogRow, date: NaiveDate) -> Result<i64> {
        self.conn
            .prepare_cached(
                "INSERT INTO alert_log (alert_time, date, expected_total, current_total, missing, status, reason)
                 VALUES (?1,?2,?3,?4,?5,?6,?7)",
            )?
            .execute(params![
                to_rfc3339(row.alert_time),
                date.to_string(),
                row.expected_total,
                row.current_total,
                row.missing,
                row.status.as_db_str(),
                row.reason,
            ])?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All alert attempts for `date`, oldest first.
    pub fn alerts_for_date(&self, date: NaiveDate) -> Result<Vec<AlertLogRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, alert_time, expected_total, current_total, missing, status, reason
             FROM alert_log WHERE date = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![date.to_string()], row_to_alert)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// The most recently recorded alert attempt for `date`, if any.
    pub fn last_alert_for_date(&self, date: NaiveDate) -> Result<Option<AlertLogRow>> {
        self.conn
            .query_row(
                "SELECT id, alert_time, expected_total, current_total, missing, status, reason
                 FROM alert_log WHERE date = ?1 ORDER BY id DESC LIMIT 1",
                params![date.to_string()],
                row_to_alert,
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other.into()),
            })
    }

    /// Check that WAL mode is active (diagnostics).
    #[must_use]
    pub fn is_wal_mode(&self) -> bool {
        self.conn
            .query_row("PRAGMA journal_mode", [], |row| row.get::<_, String>(0))
            .map(|mode| mode.eq_ignore_ascii_case("wal"))
            .unwrap_or(false)
    }
}

// ──────────────────── row mapping ────────────────────

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventRow> {
    let event_time: String = row.get(1)?;
    let created_at: String = row.get(4)?;
    let direction: String = row.get(2)?;
    Ok(EventRow {
        id: row.get(0)?,
        event_time: time_col(1, &event_time)?,
        direction: Direction::parse(&direction)
            .map_err(|source| conversion_failure(2, source))?,
        camera_id: row.get(3)?,
        created_at: time_col(4, &created_at)?,
    })
}

fn row_to_daily_state(row: &rusqlite::Row<'_>) -> rusqlite::Result<DailyStateRow> {
    let date: String = row.get(0)?;
    let is_frozen: i64 = row.get(2)?;
    let updated_at: String = row.get(5)?;
    Ok(DailyStateRow {
        date: date_col(0, &date)?,
        total_morning: row.get(1)?,
        is_frozen: is_frozen != 0,
        realtime_in: row.get(3)?,
        realtime_out: row.get(4)?,
        updated_at: time_col(5, &updated_at)?,
    })
}

fn row_to_missing_period(row: &rusqlite::Row<'_>) -> rusqlite::Result<MissingPeriodRow> {
    let date: String = row.get(1)?;
    let session: String = row.get(2)?;
    let start_time: String = row.get(3)?;
    let end_time: Option<String> = row.get(4)?;
    Ok(MissingPeriodRow {
        id: row.get(0)?,
        date: date_col(1, &date)?,
        session: Session::parse(&session),
        start_time: time_col(3, &start_time)?,
        end_time: end_time.map(|s| time_col(4, &s)).transpose()?,
        duration_minutes: row.get(5)?,
        missing_count_observed: row.get(6)?,
    })
}

fn row_to_alert(row: &rusqlite::Row<'_>) -> rusqlite::Result<AlertLogRow> {
    let alert_time: String = row.get(1)?;
    let status: String = row.get(5)?;
    let reason: Option<String> = row.get(6)?;
    Ok(AlertLogRow {
        id: row.get(0)?,
        alert_time: time_col(1, &alert_time)?,
        expected_total: row.get(2)?,
        current_total: row.get(3)?,
        missing: row.get(4)?,
        status: AlertStatus::parse(&status),
        reason: reason.unwrap_or_default(),
    })
}

/// Wraps a conversion error so `query_map`/`query_row` surface it as a real
/// error instead of the caller silently getting a default value in its place.
fn conversion_failure(
    col: usize,
    source: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(source))
}

/// Parses an RFC 3339 timestamp column, propagating a real error on a
/// corrupt or truncated value rather than substituting the Unix epoch.
fn time_col(col: usize, raw: &str) -> rusqlite::Result<DateTime<Tz>> {
    parse_rfc3339(raw).map_err(|source| conversion_failure(col, source))
}

/// Parses a `YYYY-MM-DD` date column, propagating a real error on a corrupt
/// value rather than substituting `NaiveDate::default()` (`1970-01-01`).
fn date_col(col: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    raw.parse()
        .map_err(|source: chrono::ParseError| conversion_failure(col, source))
}

fn to_rfc3339(t: DateTime<Tz>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, false)
}

fn to_rfc3339_utc(t: DateTime<Tz>) -> String {
    t.with_timezone(&chrono::Utc)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_rfc3339(raw: &str) -> Result<DateTime<Tz>> {
    let fixed = DateTime::parse_from_rfc3339(raw).map_err(|source| PctrError::Serialization {
        context: "rfc3339",
        details: source.to_string(),
    })?;
    Ok(fixed.with_timezone(&Tz::UTC))
}

// ──────────────────── schema & pragmas ────────────────────

fn apply_pragmas(conn: &Connection, cfg: &StoreConfig) -> Result<()> {
    conn.execute_batch(&format!(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -{};
         PRAGMA mmap_size = {};
         PRAGMA temp_store = MEMORY;
         PRAGMA busy_timeout = {};",
        cfg.cache_size_kib, cfg.mmap_size_bytes, cfg.busy_timeout_ms
    ))?;
    let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        eprintln!("[PCTR-STORE] WARNING: requested WAL mode but got '{mode}'");
    }
    Ok(())
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_time TEXT NOT NULL,
            event_time_utc TEXT NOT NULL,
            local_date TEXT NOT NULL,
            direction TEXT NOT NULL CHECK (direction IN ('IN','OUT')),
            camera_id TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS daily_state (
            date TEXT PRIMARY KEY,
            total_morning INTEGER NOT NULL DEFAULT 0,
            is_frozen INTEGER NOT NULL DEFAULT 0,
            realtime_in INTEGER NOT NULL DEFAULT 0,
            realtime_out INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS missing_periods (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL,
            session TEXT NOT NULL CHECK (session IN ('morning','afternoon')),
            start_time TEXT NOT NULL,
            end_time TEXT,
            duration_minutes INTEGER,
            missing_count_observed INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS alert_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            alert_time TEXT NOT NULL,
            date TEXT NOT NULL,
            expected_total INTEGER NOT NULL,
            current_total INTEGER NOT NULL,
            missing INTEGER NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('sent','failed','skipped')),
            reason TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_events_local_date ON events(local_date);
        CREATE INDEX IF NOT EXISTS idx_events_time_utc ON events(event_time_utc);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_missing_open_per_date
            ON missing_periods(date) WHERE end_time IS NULL;
        CREATE INDEX IF NOT EXISTS idx_missing_date ON missing_periods(date);
        CREATE INDEX IF NOT EXISTS idx_alert_date ON alert_log(date);",
    )?;
    Ok(())
}

// ──────────────────── tests ────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let store = Store::open(&db_path, &StoreConfig::default()).unwrap();
        (dir, store)
    }

    fn t(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Tz> {
        Tz::UTC.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn schema_created_and_wal_active() {
        let (_dir, store) = temp_store();
        assert!(store.is_wal_mode());
    }

    #[test]
    fn append_and_query_events() {
        let (_dir, store) = temp_store();
        let date = NaiveDate::from_ymd_opt(2026, 2, 14).unwrap();
        store
            .append_event(t(2026, 2, 14, 7, 0), Direction::In, "cam1")
            .unwrap();
        store
            .append_event(t(2026, 2, 14, 8, 0), Direction::Out, "cam1")
            .unwrap();

        let events = store.events_for_date(date).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].direction, Direction::In);

        let (in_count, out_count) = store.event_counts_for_date(date).unwrap();
        assert_eq!(in_count, 1);
        assert_eq!(out_count, 1);
    }

    #[test]
    fn self_test_marker_only_inserted_after_uptime_and_once() {
        let (_dir, store) = temp_store();
        let now = t(2026, 2, 14, 6, 0);
        assert!(!store.maybe_self_test(Duration::from_secs(10), now).unwrap());
        assert!(store.maybe_self_test(Duration::from_secs(61), now).unwrap());
        assert!(!store.maybe_self_test(Duration::from_secs(120), now).unwrap());

        let date = NaiveDate::from_ymd_opt(2026, 2, 14).unwrap();
        let events = store.events_for_date(date).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].camera_id, "self_test");
    }

    #[test]
    fn frozen_daily_state_ignores_total_morning_writes() {
        let (_dir, store) = temp_store();
        let date = NaiveDate::from_ymd_opt(2026, 2, 14).unwrap();
        let now = t(2026, 2, 14, 8, 30);

        store
            .upsert_daily_state(
                date,
                &DailyStatePatch {
                    total_morning: Some(4),
                    ..Default::default()
                },
                now,
            )
            .unwrap();
        store
            .upsert_daily_state(
                date,
                &DailyStatePatch {
                    is_frozen: Some(true),
                    ..Default::default()
                },
                now,
            )
            .unwrap();
        store
            .upsert_daily_state(
                date,
                &DailyStatePatch {
                    total_morning: Some(99),
                    ..Default::default()
                },
                now,
            )
            .unwrap();

        let state = store.daily_state(date).unwrap().unwrap();
        assert!(state.is_frozen);
        assert_eq!(state.total_morning, 4);
    }

    #[test]
    fn only_one_open_missing_period_per_date() {
        let (_dir, store) = temp_store();
        let date = NaiveDate::from_ymd_opt(2026, 2, 14).unwrap();
        let start = t(2026, 2, 14, 9, 0);

        store.open_missing_period(date, Session::Morning, start).unwrap();
        let err = store
            .open_missing_period(date, Session::Morning, start)
            .unwrap_err();
        assert_eq!(err.code(), "PCTR-5900");
    }

    #[test]
    fn missing_period_close_computes_duration() {
        let (_dir, store) = temp_store();
        let date = NaiveDate::from_ymd_opt(2026, 2, 14).unwrap();
        let start = t(2026, 2, 14, 9, 0);
        let end = t(2026, 2, 14, 11, 10);

        let id = store.open_missing_period(date, Session::Morning, start).unwrap();
        store.update_missing_period(id, 1).unwrap();
        store.close_missing_period(id, end).unwrap();

        assert!(store.active_missing_period(date).unwrap().is_none());
        let periods = store.missing_periods_for_date(date).unwrap();
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].duration_minutes, Some(130));
        assert!(!periods[0].is_open());
    }

    #[test]
    fn alert_log_records_every_attempt_including_skips() {
        let (_dir, store) = temp_store();
        let date = NaiveDate::from_ymd_opt(2026, 2, 14).unwrap();
        let now = t(2026, 2, 14, 9, 30);

        store
            .append_alert(
                &AlertLogRow {
                    id: 0,
                    alert_time: now,
                    expected_total: 4,
                    current_total: 3,
                    missing: 1,
                    status: AlertStatus::Skipped,
                    reason: "duration<30.5m".to_string(),
                },
                date,
            )
            .unwrap();

        let alerts = store.alerts_for_date(date).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].status, AlertStatus::Skipped);

        let last = store.last_alert_for_date(date).unwrap().unwrap();
        assert_eq!(last.missing, 1);
    }

    #[test]
    fn corrupt_timestamp_surfaces_as_error_not_epoch_default() {
        let (_dir, store) = temp_store();
        store
            .append_event(t(2026, 2, 14, 7, 0), Direction::In, "cam1")
            .unwrap();
        store
            .conn
            .execute("UPDATE events SET event_time = 'not-a-timestamp'", [])
            .unwrap();

        let date = NaiveDate::from_ymd_opt(2026, 2, 14).unwrap();
        let err = store.events_for_date(date).unwrap_err();
        assert_eq!(err.code(), "PCTR-2002");
    }

    #[test]
    fn idempotent_schema_creation() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("idempotent.db");
        let _ = Store::open(&db_path, &StoreConfig::default()).unwrap();
        let store = Store::open(&db_path, &StoreConfig::default()).unwrap();
        assert!(store.is_wal_mode());
    }
}
