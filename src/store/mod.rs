//! Durable storage: the single source of truth for events, daily state,
//! missing periods, and alert attempts.

pub mod model;
pub mod sqlite;

pub use model::{
    AlertLogRow, AlertStatus, DailyStatePatch, DailyStateRow, Direction, EventRow,
    MissingPeriodRow, Session,
};
pub use sqlite::Store;
