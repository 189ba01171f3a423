//! Workbook export: per-day snapshots, a rolling multi-day summary built
//! from those snapshots (never from the Store), and retention pruning.

mod xlsx;

pub mod daily;
pub mod retention;
pub mod rolling;

pub use daily::DailyExporter;
pub use retention::RetentionSweeper;
pub use rolling::RollingExporter;
pub use xlsx::ReplaceOutcome;
