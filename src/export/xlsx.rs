//! Shared workbook formatting and the atomic temp-then-rename write
//! protocol used by both exporters.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rust_xlsxwriter::{Color, Format, Workbook, XlsxError};

use crate::core::errors::{PctrError, Result};

/// One exported cell. Kept deliberately small — these sheets only ever hold
/// text, integers, or a blank (an open period's `end_time`).
#[derive(Clone)]
pub enum Cell {
    Text(String),
    Int(i64),
    Empty,
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }
}

pub fn header_format() -> Format {
    Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0x1F4E78))
        .set_font_color(Color::White)
}

fn xlsx_err(path: &Path, err: XlsxError) -> PctrError {
    PctrError::Export {
        path: path.to_path_buf(),
        details: err.to_string(),
    }
}

/// Writes one sheet with a bold dark header, frozen header row, an
/// autofilter over the data range, and column widths auto-fit to content
/// capped at 50 characters.
pub fn write_sheet(
    workbook: &mut Workbook,
    context_path: &Path,
    name: &str,
    headers: &[&str],
    rows: &[Vec<Cell>],
) -> Result<()> {
    let format = header_format();
    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name(name)
        .map_err(|e| xlsx_err(context_path, e))?;

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for (col, header) in headers.iter().enumerate() {
        worksheet
            .write_with_format(0, u16::try_from(col).unwrap_or(u16::MAX), *header, &format)
            .map_err(|e| xlsx_err(context_path, e))?;
    }

    for (r, row) in rows.iter().enumerate() {
        let row_idx = u32::try_from(r + 1).unwrap_or(u32::MAX);
        for (c, cell) in row.iter().enumerate() {
            let col_idx = u16::try_from(c).unwrap_or(u16::MAX);
            match cell {
                Cell::Text(s) => {
                    worksheet
                        .write(row_idx, col_idx, s.as_str())
                        .map_err(|e| xlsx_err(context_path, e))?;
                    widths[c] = widths[c].max(s.len());
                }
                Cell::Int(n) => {
                    worksheet
                        .write(row_idx, col_idx, *n as f64)
                        .map_err(|e| xlsx_err(context_path, e))?;
                    widths[c] = widths[c].max(n.to_string().len());
                }
                Cell::Empty => {}
            }
        }
    }

    worksheet
        .set_freeze_panes(1, 0)
        .map_err(|e| xlsx_err(context_path, e))?;
    if !rows.is_empty() {
        let last_col = u16::try_from(headers.len().saturating_sub(1)).unwrap_or(0);
        worksheet
            .autofilter(0, 0, u32::try_from(rows.len()).unwrap_or(u32::MAX), last_col)
            .map_err(|e| xlsx_err(context_path, e))?;
    }
    for (col, width) in widths.into_iter().enumerate() {
        worksheet
            .set_column_width(u16::try_from(col).unwrap_or(u16::MAX), (width + 2).min(50) as f64)
            .map_err(|e| xlsx_err(context_path, e))?;
    }

    Ok(())
}

/// What happened when swapping a finished temp file into place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Replaced,
    /// Destination exists and could not be removed (operator has it open).
    Locked,
}

/// Atomic temp-then-rename swap. The typed result, not an exception, covers
/// the one outcome the caller must handle specially — a locked destination
/// is expected operator behaviour, not a failure to report and stop on.
pub fn try_replace(tmp_path: &Path, dest_path: &Path) -> Result<ReplaceOutcome> {
    match fs::rename(tmp_path, dest_path) {
        Ok(()) => Ok(ReplaceOutcome::Replaced),
        Err(err) if is_lock_like(&err) => Ok(ReplaceOutcome::Locked),
        Err(err) => Err(PctrError::Export {
            path: dest_path.to_path_buf(),
            details: err.to_string(),
        }),
    }
}

fn is_lock_like(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(err.kind(), ErrorKind::PermissionDenied)
        || err.raw_os_error() == Some(26) // ETXTBSY
        || err.raw_os_error() == Some(16) // EBUSY
}

/// Extracts the `YYYY-MM-DD` embedded in `people_counter_YYYY-MM-DD.xlsx`,
/// skipping `.tmp.xlsx` and any file whose stem doesn't parse.
pub fn date_from_daily_filename(path: &Path) -> Option<NaiveDate> {
    let stem = path.file_stem()?.to_str()?;
    if path.extension().and_then(|e| e.to_str()) != Some("xlsx") {
        return None;
    }
    let raw = stem.strip_prefix("people_counter_")?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

pub fn daily_filename(date: NaiveDate) -> String {
    format!("people_counter_{date}.xlsx")
}

pub fn daily_tmp_filename(date: NaiveDate) -> String {
    format!("people_counter_{date}.tmp.xlsx")
}

pub fn rolling_filename(window_days: u32) -> String {
    format!("people_counter_LAST_{window_days}_DAYS.xlsx")
}

pub fn rolling_tmp_filename(window_days: u32) -> String {
    format!("people_counter_LAST_{window_days}_DAYS.tmp.xlsx")
}

#[must_use]
pub fn daily_export_path(daily_dir: &Path, date: NaiveDate) -> PathBuf {
    daily_dir.join(daily_filename(date))
}
