//! `RetentionSweeper`: deletes per-day workbooks older than the retention
//! window. Never touches the rolling summary or `.tmp.xlsx` files, so a
//! locked-and-abandoned temp file stays around for inspection.

use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;

use crate::core::errors::{PctrError, Result};
use crate::export::xlsx::date_from_daily_filename;

pub struct RetentionSweeper {
    daily_dir: PathBuf,
    retention_days: u32,
}

impl RetentionSweeper {
    #[must_use]
    pub fn new(daily_dir: PathBuf, retention_days: u32) -> Self {
        Self {
            daily_dir,
            retention_days,
        }
    }

    /// Deletes workbooks dated before `today - retention_days`. Returns the
    /// dates of files actually removed.
    pub fn sweep(&self, today: NaiveDate) -> Result<Vec<NaiveDate>> {
        let cutoff = today - chrono::Duration::days(i64::from(self.retention_days));
        let entries = match fs::read_dir(&self.daily_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(PctrError::Io {
                    path: self.daily_dir.clone(),
                    source: e,
                });
            }
        };

        let mut removed = Vec::new();
        for entry in entries.filter_map(std::result::Result::ok) {
            let path = entry.path();
            let Some(date) = date_from_daily_filename(&path) else {
                continue;
            };
            if date < cutoff {
                fs::remove_file(&path).map_err(|e| PctrError::Io {
                    path: path.clone(),
                    source: e,
                })?;
                eprintln!("[PCTR-RETENTION] removed {} (date {date} < cutoff {cutoff})", path.display());
                removed.push(date);
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_only_files_past_retention_window() {
        let dir = tempfile::tempdir().unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();

        let old = dir.path().join("people_counter_2026-06-01.xlsx");
        let recent = dir.path().join("people_counter_2026-07-27.xlsx");
        let tmp = dir.path().join("people_counter_2026-06-01.tmp.xlsx");
        let rolling = dir.path().join("people_counter_LAST_7_DAYS.xlsx");
        for f in [&old, &recent, &tmp, &rolling] {
            std::fs::write(f, b"x").unwrap();
        }

        let sweeper = RetentionSweeper::new(dir.path().to_path_buf(), 30);
        let removed = sweeper.sweep(today).unwrap();

        assert_eq!(removed, vec![NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()]);
        assert!(!old.exists());
        assert!(recent.exists());
        assert!(tmp.exists(), "tmp files are never swept");
        assert!(rolling.exists(), "rolling summary is never swept");
    }

    #[test]
    fn missing_directory_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let sweeper = RetentionSweeper::new(missing, 30);
        let removed = sweeper.sweep(NaiveDate::from_ymd_opt(2026, 7, 28).unwrap()).unwrap();
        assert!(removed.is_empty());
    }
}
