//! `PhaseClock`: a pure function of wall clock + configuration. No state, no
//! I/O — every consequential decision elsewhere reads the [`Store`] fresh
//! rather than trusting a cached phase.
//!
//! [`Store`]: crate::store::Store

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike};
use chrono_tz::Tz;

use crate::core::config::PhaseConfig;
use crate::core::errors::{PctrError, Result};

/// Named wall-clock window, each with fixed alerting and baseline-writability
/// rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Before `reset_time`. Not named in the phase table (which starts at
    /// `reset_time`); included here so `phase_at` is total over the day.
    Idle,
    MorningCount,
    RealtimeMorning,
    LunchBreak,
    AfternoonMonitoring,
    DayClose,
}

impl Phase {
    /// Whether `AlertManager` may dispatch during this phase.
    #[must_use]
    pub const fn alerts_enabled(self) -> bool {
        matches!(self, Self::RealtimeMorning | Self::AfternoonMonitoring)
    }

    /// Whether `DailyState.total_morning` accumulates during this phase.
    #[must_use]
    pub const fn baseline_writable(self) -> bool {
        matches!(self, Self::MorningCount)
    }
}

/// Phase boundaries as minutes-since-midnight, resolved once from
/// [`PhaseConfig`]'s `HH:MM` strings.
#[derive(Debug, Clone, Copy)]
pub struct PhaseBounds {
    pub reset: u32,
    pub morning_end: u32,
    pub lunch_start: u32,
    pub lunch_end: u32,
    pub day_close: u32,
}

impl PhaseBounds {
    pub fn from_config(config: &PhaseConfig) -> Result<Self> {
        Ok(Self {
            reset: parse_hhmm(&config.reset_time)?,
            morning_end: parse_hhmm(&config.morning_end)?,
            lunch_start: parse_hhmm(&config.lunch_start)?,
            lunch_end: parse_hhmm(&config.lunch_end)?,
            day_close: parse_hhmm(&config.day_close)?,
        })
    }

    /// The instant `minute_of_day` falls on `date` in `tz`.
    #[must_use]
    pub fn at(date: NaiveDate, minute_of_day: u32, tz: Tz) -> DateTime<Tz> {
        let hour = minute_of_day / 60;
        let minute = minute_of_day % 60;
        tz.from_local_datetime(
            &date
                .and_hms_opt(hour, minute, 0)
                .expect("validated HH:MM in range"),
        )
        .single()
        .unwrap_or_else(|| tz.from_utc_datetime(&date.and_hms_opt(hour, minute, 0).unwrap()))
    }

    /// The instant `reset_time` falls on `date`.
    #[must_use]
    pub fn reset_at(&self, date: NaiveDate, tz: Tz) -> DateTime<Tz> {
        Self::at(date, self.reset, tz)
    }

    /// The instant `morning_end` falls on `date`.
    #[must_use]
    pub fn morning_end_at(&self, date: NaiveDate, tz: Tz) -> DateTime<Tz> {
        Self::at(date, self.morning_end, tz)
    }

    /// The start-of-session instant for `phase` on `date` — `08:30` for
    /// `RealtimeMorning`, `13:15` for `AfternoonMonitoring`. Used only for
    /// the restart `start_time` alignment rule; falls back to `reset_time`
    /// for any other phase.
    #[must_use]
    pub fn session_start_at(&self, phase: Phase, date: NaiveDate, tz: Tz) -> DateTime<Tz> {
        let minute = match phase {
            Phase::RealtimeMorning => self.morning_end,
            Phase::AfternoonMonitoring => self.lunch_end,
            _ => self.reset,
        };
        Self::at(date, minute, tz)
    }
}

/// Pure phase-from-wall-clock function.
#[must_use]
pub fn phase_at(now: DateTime<Tz>, bounds: &PhaseBounds) -> Phase {
    let minute_of_day = now.hour() * 60 + now.minute();
    if minute_of_day < bounds.reset {
        Phase::Idle
    } else if minute_of_day < bounds.morning_end {
        Phase::MorningCount
    } else if minute_of_day < bounds.lunch_start {
        Phase::RealtimeMorning
    } else if minute_of_day < bounds.lunch_end {
        Phase::LunchBreak
    } else if minute_of_day < bounds.day_close {
        Phase::AfternoonMonitoring
    } else {
        Phase::DayClose
    }
}

fn parse_hhmm(raw: &str) -> Result<u32> {
    let (h, m) = raw.split_once(':').ok_or_else(|| PctrError::InvalidConfig {
        details: format!("{raw:?} is not HH:MM"),
    })?;
    let h: u32 = h.parse().map_err(|_| PctrError::InvalidConfig {
        details: format!("{raw:?}: invalid hour"),
    })?;
    let m: u32 = m.parse().map_err(|_| PctrError::InvalidConfig {
        details: format!("{raw:?}: invalid minute"),
    })?;
    Ok(h * 60 + m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bounds() -> PhaseBounds {
        PhaseBounds::from_config(&PhaseConfig::default()).unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Tz> {
        Tz::UTC.with_ymd_and_hms(2026, 7, 28, h, m, 0).unwrap()
    }

    #[test]
    fn phase_table_matches_spec_boundaries() {
        let b = bounds();
        assert_eq!(phase_at(at(5, 59), &b), Phase::Idle);
        assert_eq!(phase_at(at(6, 0), &b), Phase::MorningCount);
        assert_eq!(phase_at(at(8, 29), &b), Phase::MorningCount);
        assert_eq!(phase_at(at(8, 30), &b), Phase::RealtimeMorning);
        assert_eq!(phase_at(at(11, 54), &b), Phase::RealtimeMorning);
        assert_eq!(phase_at(at(11, 55), &b), Phase::LunchBreak);
        assert_eq!(phase_at(at(13, 14), &b), Phase::LunchBreak);
        assert_eq!(phase_at(at(13, 15), &b), Phase::AfternoonMonitoring);
        assert_eq!(phase_at(at(23, 58), &b), Phase::AfternoonMonitoring);
        assert_eq!(phase_at(at(23, 59), &b), Phase::DayClose);
    }

    #[test]
    fn alerting_and_baseline_flags_match_table() {
        assert!(!Phase::MorningCount.alerts_enabled());
        assert!(Phase::MorningCount.baseline_writable());
        assert!(Phase::RealtimeMorning.alerts_enabled());
        assert!(!Phase::RealtimeMorning.baseline_writable());
        assert!(!Phase::LunchBreak.alerts_enabled());
        assert!(Phase::AfternoonMonitoring.alerts_enabled());
        assert!(!Phase::DayClose.alerts_enabled());
    }

    #[test]
    fn session_start_matches_morning_and_afternoon_bounds() {
        let b = bounds();
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let morning_start = b.session_start_at(Phase::RealtimeMorning, date, Tz::UTC);
        assert_eq!(morning_start.hour(), 8);
        assert_eq!(morning_start.minute(), 30);

        let afternoon_start = b.session_start_at(Phase::AfternoonMonitoring, date, Tz::UTC);
        assert_eq!(afternoon_start.hour(), 13);
        assert_eq!(afternoon_start.minute(), 15);
    }

    fn phase_rank(phase: Phase) -> u8 {
        match phase {
            Phase::Idle => 0,
            Phase::MorningCount => 1,
            Phase::RealtimeMorning => 2,
            Phase::LunchBreak => 3,
            Phase::AfternoonMonitoring => 4,
            Phase::DayClose => 5,
        }
    }

    proptest::proptest! {
        /// For any strictly-increasing set of bounds, walking the clock
        /// forward never regresses to an earlier phase, and exactly one
        /// phase (`MorningCount`) ever accumulates the baseline.
        #[test]
        fn phase_is_monotonic_over_the_day(
            reset in 0u32..200,
            gap1 in 1u32..200,
            gap2 in 1u32..200,
            gap3 in 1u32..200,
            gap4 in 1u32..200,
            sample_minutes in proptest::collection::vec(0u32..1440, 1..50),
        ) {
            let morning_end = reset + gap1;
            let lunch_start = morning_end + gap2;
            let lunch_end = lunch_start + gap3;
            let day_close = (lunch_end + gap4).min(1439);
            if day_close <= lunch_end {
                return Ok(());
            }
            let bounds = PhaseBounds { reset, morning_end, lunch_start, lunch_end, day_close };

            let mut sorted = sample_minutes;
            sorted.sort_unstable();
            let mut last_rank = 0u8;
            for minute in sorted {
                let now = Tz::UTC
                    .with_ymd_and_hms(2026, 7, 28, minute / 60, minute % 60, 0)
                    .unwrap();
                let phase = phase_at(now, &bounds);
                let rank = phase_rank(phase);
                proptest::prop_assert!(rank >= last_rank);
                proptest::prop_assert_eq!(phase.baseline_writable(), phase == Phase::MorningCount);
                last_rank = rank;
            }
        }
    }
}
