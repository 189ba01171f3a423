//! Shared data-model types persisted by the [`crate::store::sqlite::Store`].

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;

/// Direction of a gate crossing, normalized to canonical upper-case at the
/// write boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    #[must_use]
    pub const fn as_db_str(self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::Out => "OUT",
        }
    }

    /// Parse the canonical upper-case form; any other value is rejected.
    pub fn parse(raw: &str) -> crate::core::errors::Result<Self> {
        match raw {
            "IN" => Ok(Self::In),
            "OUT" => Ok(Self::Out),
            other => Err(crate::core::errors::PctrError::InvalidConfig {
                details: format!("direction must be IN or OUT, got {other:?}"),
            }),
        }
    }
}

/// Which half of the day a missing period belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Session {
    Morning,
    Afternoon,
}

impl Session {
    #[must_use]
    pub const fn as_db_str(self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Afternoon => "afternoon",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "afternoon" => Self::Afternoon,
            _ => Self::Morning,
        }
    }
}

/// Disposition of a single alert attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertStatus {
    Sent,
    Failed,
    Skipped,
}

impl AlertStatus {
    #[must_use]
    pub const fn as_db_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "sent" => Self::Sent,
            "failed" => Self::Failed,
            _ => Self::Skipped,
        }
    }
}

/// A single durable gate-crossing event.
#[derive(Debug, Clone)]
pub struct EventRow {
    pub id: i64,
    pub event_time: DateTime<Tz>,
    pub direction: Direction,
    pub camera_id: String,
    pub created_at: DateTime<Tz>,
}

/// One row per calendar date.
#[derive(Debug, Clone)]
pub struct DailyStateRow {
    pub date: NaiveDate,
    pub total_morning: i64,
    pub is_frozen: bool,
    pub realtime_in: i64,
    pub realtime_out: i64,
    pub updated_at: DateTime<Tz>,
}

/// A partial update applied to a [`DailyStateRow`] via `upsert_daily_state`.
///
/// `None` fields are left unchanged. `total_morning` is silently dropped by
/// the store once the date's row is frozen.
#[derive(Debug, Clone, Default)]
pub struct DailyStatePatch {
    pub total_morning: Option<i64>,
    pub is_frozen: Option<bool>,
    pub realtime_in: Option<i64>,
    pub realtime_out: Option<i64>,
}

/// A maximal contiguous interval during which live occupancy was below the
/// frozen morning baseline.
#[derive(Debug, Clone)]
pub struct MissingPeriodRow {
    pub id: i64,
    pub date: NaiveDate,
    pub session: Session,
    pub start_time: DateTime<Tz>,
    pub end_time: Option<DateTime<Tz>>,
    pub duration_minutes: Option<i64>,
    pub missing_count_observed: i64,
}

impl MissingPeriodRow {
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

/// One attempted alert, sent or not.
#[derive(Debug, Clone)]
pub struct AlertLogRow {
    pub id: i64,
    pub alert_time: DateTime<Tz>,
    pub expected_total: i64,
    pub current_total: i64,
    pub missing: i64,
    pub status: AlertStatus,
    pub reason: String,
}
