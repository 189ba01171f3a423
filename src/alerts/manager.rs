//! `AlertManager`: decides whether today's open shortfall warrants an email,
//! and logs every decision — sent, failed, or skipped — for audit.

use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::alerts::email::{AlertMessage, EmailSender};
use crate::core::errors::Result;
use crate::phase::clock::Phase;
use crate::store::Store;
use crate::store::model::{AlertLogRow, AlertStatus};

/// First alert fires only after the shortfall has persisted this long —
/// 30 minutes plus a 30-second debounce window, resolved exactly rather
/// than "approximately 30 minutes".
pub const FIRST_ALERT_DELAY_SECS: i64 = 30 * 60 + 30;

/// Minimum spacing between two `sent` alerts for the same date.
pub const ALERT_COOLDOWN_SECS: i64 = 30 * 60;

/// Slack added on top of `ALERT_COOLDOWN_SECS` when deciding whether the
/// cooldown still applies. The alert worker ticks on exactly this cadence
/// (see `daemon::loop_main::ALERT_TICK`), so the real wall-clock gap between
/// two consecutive ticks is never less than 30 minutes — it is 30 minutes
/// plus whatever the previous tick's processing and sleep-loop overhead
/// added. Comparing against the bare 30-minute constant would therefore
/// never see `since_last < ALERT_COOLDOWN_SECS`, and the cooldown would
/// never actually suppress the very next tick. This margin absorbs that
/// overhead so a tick landing at "one cooldown period later" is still
/// recognized as within the cooldown.
const ALERT_COOLDOWN_MARGIN_SECS: i64 = 10;

/// SMTP configuration. Field names are load bearing:
/// `core::config::apply_env_overrides` writes through them directly and
/// `validate()` reads `to_addresses` and `enabled`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlertConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u32,
    pub from_address: String,
    pub password: String,
    pub to_addresses: Vec<String>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: 587,
            from_address: String::new(),
            password: String::new(),
            to_addresses: Vec::new(),
        }
    }
}

pub struct AlertManager {
    config: AlertConfig,
    sender: Box<dyn EmailSender>,
}

impl AlertManager {
    #[must_use]
    pub fn new(config: AlertConfig, sender: Box<dyn EmailSender>) -> Self {
        Self { config, sender }
    }

    /// Run one decision tick. Always appends exactly one `AlertLog` row,
    /// one per attempt including skips.
    pub fn tick(&self, store: &Store, now: DateTime<Tz>, phase: Phase) -> Result<AlertLogRow> {
        let date = now.date_naive();

        if !phase.alerts_enabled() {
            return self.log(store, date, now, 0, 0, AlertStatus::Skipped, "phase");
        }

        if !self.config.enabled {
            return self.log(store, date, now, 0, 0, AlertStatus::Skipped, "disabled");
        }

        let Some(period) = store.active_missing_period(date)? else {
            return self.log(store, date, now, 0, 0, AlertStatus::Skipped, "no_missing");
        };

        let state = store.daily_state(date)?;
        let total_morning = state.as_ref().map_or(0, |s| s.total_morning);
        let present = total_morning - period.missing_count_observed;
        let missing = period.missing_count_observed;

        let duration_secs = (now - period.start_time).num_seconds();
        if duration_secs < FIRST_ALERT_DELAY_SECS {
            return self.log(
                store,
                date,
                now,
                total_morning,
                present,
                AlertStatus::Skipped,
                "duration<30.5m",
            );
        }

        // A missing-count change alone never bypasses the cooldown — only
        // elapsed time does. The updated count simply rides along on the
        // next slot's email.
        if let Some(last) = store.last_alert_for_date(date)? {
            let since_last = (now - last.alert_time).num_seconds();
            if since_last < ALERT_COOLDOWN_SECS + ALERT_COOLDOWN_MARGIN_SECS {
                return self.log(
                    store,
                    date,
                    now,
                    total_morning,
                    present,
                    AlertStatus::Skipped,
                    "cooldown",
                );
            }
        }

        let message = AlertMessage {
            date,
            now,
            total_morning,
            present,
            missing,
            period_start: period.start_time,
            duration: now - period.start_time,
        };

        match self
            .sender
            .send(&self.config.from_address, &self.config.to_addresses, &message)
        {
            Ok(()) => self.log(store, date, now, total_morning, present, AlertStatus::Sent, ""),
            Err(err) => self.log(
                store,
                date,
                now,
                total_morning,
                present,
                AlertStatus::Failed,
                &err.to_string(),
            ),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn log(
        &self,
        store: &Store,
        date: chrono::NaiveDate,
        now: DateTime<Tz>,
        expected_total: i64,
        current_total: i64,
        status: AlertStatus,
        reason: &str,
    ) -> Result<AlertLogRow> {
        let missing = (expected_total - current_total).max(0);
        let row = AlertLogRow {
            id: 0,
            alert_time: now,
            expected_total,
            current_total,
            missing,
            status,
            reason: reason.to_string(),
        };
        let id = store.append_alert(&row, date)?;
        Ok(AlertLogRow { id, ..row })
    }
}
