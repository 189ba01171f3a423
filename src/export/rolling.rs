//! `RollingExporter`: merges the most recent N per-day workbooks into one
//! summary, reading only the files on disk — never the Store. The per-day
//! workbook is the attested, operator-visible source of truth; rebuilding
//! from it guarantees the rolling summary can never disagree with what an
//! operator already saw.

use std::fs;
use std::path::{Path, PathBuf};

use calamine::{Data, Reader, open_workbook_auto};
use rust_xlsxwriter::Workbook;

use crate::core::errors::{PctrError, Result};
use crate::export::xlsx::{
    self, Cell, ReplaceOutcome, date_from_daily_filename, rolling_tmp_filename, try_replace,
};

pub struct RollingExporter {
    daily_dir: PathBuf,
    summary_dir: PathBuf,
    window_days: u32,
}

impl RollingExporter {
    #[must_use]
    pub fn new(daily_dir: PathBuf, summary_dir: PathBuf, window_days: u32) -> Self {
        Self {
            daily_dir,
            summary_dir,
            window_days,
        }
    }

    pub fn export(&self) -> Result<ReplaceOutcome> {
        fs::create_dir_all(&self.summary_dir).map_err(|e| PctrError::Io {
            path: self.summary_dir.clone(),
            source: e,
        })?;

        let mut candidates: Vec<PathBuf> = fs::read_dir(&self.daily_dir)
            .map_err(|e| PctrError::Io {
                path: self.daily_dir.clone(),
                source: e,
            })?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|p| date_from_daily_filename(p).is_some())
            .collect();
        candidates.sort_by_key(|p| date_from_daily_filename(p));

        let window = usize::try_from(self.window_days).unwrap_or(usize::MAX);
        let selected: Vec<PathBuf> = candidates
            .into_iter()
            .rev()
            .take(window)
            .rev()
            .collect();

        let dest = self.summary_dir.join(xlsx::rolling_filename(self.window_days));
        let tmp = self.summary_dir.join(rolling_tmp_filename(self.window_days));

        let mut daily_summary_rows = Vec::new();
        let mut daily_alert_rows = Vec::new();
        let mut daily_missing_rows = Vec::new();

        for path in &selected {
            let date = date_from_daily_filename(path).expect("filtered above");
            let sheets = read_workbook(path)?;

            if let Some(row) = sheets.summary.first() {
                let (min_rt, max_rt) = min_max_realtime(&sheets.events);
                daily_summary_rows.push(vec![
                    Cell::text(date.to_string()),
                    row.get(1).cloned().unwrap_or(Cell::Empty),
                    row.get(2).cloned().unwrap_or(Cell::Empty),
                    row.get(3).cloned().unwrap_or(Cell::Empty),
                    max_rt.map_or(Cell::Empty, Cell::Int),
                    min_rt.map_or(Cell::Empty, Cell::Int),
                ]);
            }

            for row in &sheets.alerts {
                let mut with_date = vec![Cell::text(date.to_string())];
                with_date.extend(row.iter().cloned());
                daily_alert_rows.push(with_date);
            }

            for row in &sheets.missing_periods {
                let mut with_date = vec![Cell::text(date.to_string())];
                with_date.extend(row.iter().cloned());
                daily_missing_rows.push(with_date);
            }
        }

        let mut workbook = Workbook::new();
        xlsx::write_sheet(
            &mut workbook,
            &tmp,
            "DAILY_SUMMARY",
            &[
                "Date",
                "Total Morning",
                "Current Realtime",
                "Current Missing",
                "Max Realtime",
                "Min Realtime",
            ],
            &daily_summary_rows,
        )?;
        xlsx::write_sheet(
            &mut workbook,
            &tmp,
            "DAILY_ALERTS",
            &["Date", "alert_time", "total_morning", "realtime", "missing"],
            &daily_alert_rows,
        )?;
        xlsx::write_sheet(
            &mut workbook,
            &tmp,
            "DAILY_MISSING_PERIODS",
            &["Date", "start_time", "end_time", "duration_minutes"],
            &daily_missing_rows,
        )?;

        workbook.save(&tmp).map_err(|e| PctrError::Export {
            path: tmp.clone(),
            details: e.to_string(),
        })?;

        if dest.exists() {
            return try_replace(&tmp, &dest);
        }
        fs::rename(&tmp, &dest).map_err(|e| PctrError::Io {
            path: dest.clone(),
            source: e,
        })?;
        Ok(ReplaceOutcome::Replaced)
    }
}

struct DailySheets {
    summary: Vec<Vec<Cell>>,
    alerts: Vec<Vec<Cell>>,
    missing_periods: Vec<Vec<Cell>>,
    events: Vec<Vec<Cell>>,
}

fn read_workbook(path: &Path) -> Result<DailySheets> {
    let mut workbook = open_workbook_auto(path).map_err(|e| PctrError::Export {
        path: path.to_path_buf(),
        details: e.to_string(),
    })?;

    Ok(DailySheets {
        summary: read_sheet_rows(&mut workbook, path, "SUMMARY")?,
        alerts: read_sheet_rows(&mut workbook, path, "ALERTS")?,
        missing_periods: read_sheet_rows(&mut workbook, path, "MISSING_PERIODS")?,
        events: read_sheet_rows(&mut workbook, path, "EVENTS")?,
    })
}

fn read_sheet_rows<R: Reader<std::io::BufReader<std::fs::File>>>(
    workbook: &mut R,
    path: &Path,
    sheet: &str,
) -> Result<Vec<Vec<Cell>>> {
    let range = workbook.worksheet_range(sheet).map_err(|e| PctrError::Export {
        path: path.to_path_buf(),
        details: format!("{sheet}: {e}"),
    })?;
    Ok(range
        .rows()
        .skip(1)
        .map(|row| row.iter().map(cell_from_data).collect())
        .collect())
}

fn cell_from_data(value: &Data) -> Cell {
    match value {
        Data::Int(i) => Cell::Int(*i),
        Data::Float(f) => Cell::Int(*f as i64),
        Data::Empty => Cell::Empty,
        other => Cell::text(other.to_string()),
    }
}

fn min_max_realtime(events: &[Vec<Cell>]) -> (Option<i64>, Option<i64>) {
    let mut running = 0i64;
    let mut min = None;
    let mut max = None;
    for row in events {
        let Some(Cell::Text(direction)) = row.get(1) else {
            continue;
        };
        running += if direction.as_str() == "IN" { 1 } else { -1 };
        min = Some(min.map_or(running, |m: i64| m.min(running)));
        max = Some(max.map_or(running, |m: i64| m.max(running)));
    }
    (min, max)
}
