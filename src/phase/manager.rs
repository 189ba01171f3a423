//! `PhaseManager`: applies phase transitions, freezes the morning baseline,
//! and tracks missing periods. Runs on a 1-minute tick; every tick
//! recomputes from the [`Store`] so missed ticks self-heal.

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;

use crate::core::errors::Result;
use crate::phase::clock::{Phase, PhaseBounds, phase_at};
use crate::store::Store;
use crate::store::model::{DailyStatePatch, Session};

/// Snapshot of what a tick observed, returned for logging and for the
/// exporter worker's phase-boundary trigger.
#[derive(Debug, Clone, Copy)]
pub struct TickOutcome {
    pub date: NaiveDate,
    pub phase: Phase,
    pub baseline: i64,
    pub present: i64,
    pub missing: i64,
}

/// Tick-driven phase state machine. The only in-memory state is
/// `first_tick_done`, used solely to resolve the restart `start_time`
/// alignment rule; every other decision is re-derived from the Store on
/// each call, per the "process-memory caches are advisory" design note.
pub struct PhaseManager {
    bounds: PhaseBounds,
    tz: Tz,
    first_tick_done: bool,
}

impl PhaseManager {
    #[must_use]
    pub fn new(bounds: PhaseBounds, tz: Tz) -> Self {
        Self {
            bounds,
            tz,
            first_tick_done: false,
        }
    }

    /// Run one tick at wall-clock `now`. Idempotent: running twice
    /// back-to-back with no new events is a no-op on the Store.
    pub fn tick(&mut self, store: &Store, now: DateTime<Tz>) -> Result<TickOutcome> {
        let date = now.date_naive();
        let phase = phase_at(now, &self.bounds);

        if store.daily_state(date)?.is_none() {
            store.upsert_daily_state(
                date,
                &DailyStatePatch {
                    total_morning: Some(0),
                    is_frozen: Some(false),
                    realtime_in: Some(0),
                    realtime_out: Some(0),
                },
                now,
            )?;
        }

        let outcome = match phase {
            Phase::Idle => self.snapshot(store, date, phase)?,
            Phase::MorningCount => self.tick_morning_count(store, date, now, phase)?,
            Phase::RealtimeMorning | Phase::AfternoonMonitoring => {
                self.tick_realtime(store, date, now, phase)?
            }
            Phase::LunchBreak => self.snapshot(store, date, phase)?,
            Phase::DayClose => self.tick_day_close(store, date, now, phase)?,
        };

        self.first_tick_done = true;
        Ok(outcome)
    }

    fn tick_morning_count(
        &self,
        store: &Store,
        date: NaiveDate,
        now: DateTime<Tz>,
        phase: Phase,
    ) -> Result<TickOutcome> {
        let reset_at = self.bounds.reset_at(date, self.tz);
        let (in_count, out_count) = store.event_counts_between(reset_at, now)?;
        let total_morning = (in_count - out_count).max(0);
        store.upsert_daily_state(
            date,
            &DailyStatePatch {
                total_morning: Some(total_morning),
                ..Default::default()
            },
            now,
        )?;
        Ok(TickOutcome {
            date,
            phase,
            baseline: total_morning,
            present: total_morning,
            missing: 0,
        })
    }

    fn tick_realtime(
        &self,
        store: &Store,
        date: NaiveDate,
        now: DateTime<Tz>,
        phase: Phase,
    ) -> Result<TickOutcome> {
        if let Some(state) = store.daily_state(date)?
            && !state.is_frozen
        {
            store.upsert_daily_state(
                date,
                &DailyStatePatch {
                    is_frozen: Some(true),
                    ..Default::default()
                },
                now,
            )?;
        }

        let state = store
            .daily_state(date)?
            .expect("row created at top of tick");

        let baseline = if state.total_morning == 0 {
            // Crash-recovery: a restart before freeze left total_morning at
            // its pre-freeze value (possibly 0 even with real morning
            // events). Recompute from events rather than trusting the row.
            let reset_at = self.bounds.reset_at(date, self.tz);
            let morning_end_at = self.bounds.morning_end_at(date, self.tz);
            let (in_count, out_count) = store.event_counts_between(reset_at, morning_end_at)?;
            (in_count - out_count).max(0)
        } else {
            state.total_morning
        };

        let (in_today, out_today) = store.event_counts_for_date(date)?;
        let present = (in_today - out_today).max(0);
        let missing = (baseline - present).max(0);

        store.upsert_daily_state(
            date,
            &DailyStatePatch {
                realtime_in: Some(in_today),
                realtime_out: Some(out_today),
                ..Default::default()
            },
            now,
        )?;

        let session = if matches!(phase, Phase::RealtimeMorning) {
            Session::Morning
        } else {
            Session::Afternoon
        };

        match store.active_missing_period(date)? {
            None if missing > 0 => {
                // On the very first tick after process start, a pre-existing
                // shortfall aligns start_time to the session boundary rather
                // than `now`; every later opening uses `now`.
                let start_time = if self.first_tick_done {
                    now
                } else {
                    self.bounds.session_start_at(phase, date, self.tz)
                };
                let id = store.open_missing_period(date, session, start_time)?;
                store.update_missing_period(id, missing)?;
            }
            Some(period) if missing > 0 => {
                store.update_missing_period(period.id, missing)?;
            }
            Some(period) => {
                // missing == 0: a period closes only on shortfall returning
                // to zero, never merely decreasing.
                store.close_missing_period(period.id, now)?;
            }
            None => {}
        }

        Ok(TickOutcome {
            date,
            phase,
            baseline,
            present,
            missing,
        })
    }

    fn tick_day_close(
        &self,
        store: &Store,
        date: NaiveDate,
        now: DateTime<Tz>,
        phase: Phase,
    ) -> Result<TickOutcome> {
        if let Some(period) = store.active_missing_period(date)? {
            store.close_missing_period(period.id, now)?;
        }
        self.snapshot(store, date, phase)
    }

    fn snapshot(&self, store: &Store, date: NaiveDate, phase: Phase) -> Result<TickOutcome> {
        let state = store.daily_state(date)?;
        let (in_today, out_today) = store.event_counts_for_date(date)?;
        let present = (in_today - out_today).max(0);
        let baseline = state.map_or(0, |s| s.total_morning);
        let missing = (baseline - present).max(0);
        Ok(TickOutcome {
            date,
            phase,
            baseline,
            present,
            missing,
        })
    }
}
