//! SMTP dispatch: a single capability trait in front of one real channel
//! (email) and one recording test double.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate};
use chrono_tz::Tz;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use parking_lot::Mutex;

use crate::core::errors::{PctrError, Result};

/// Everything an alert email needs to say: date, timestamp, baseline, live
/// count, shortfall, and the open period's start and duration.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertMessage {
    pub date: NaiveDate,
    pub now: DateTime<Tz>,
    pub total_morning: i64,
    pub present: i64,
    pub missing: i64,
    pub period_start: DateTime<Tz>,
    pub duration: ChronoDuration,
}

impl AlertMessage {
    #[must_use]
    pub fn subject(&self) -> String {
        format!("[pctr] {} shortfall: {} missing", self.date, self.missing)
    }

    #[must_use]
    pub fn body(&self) -> String {
        let minutes = self.duration.num_minutes();
        format!(
            "Date: {date}\nObserved at: {now}\nTotal morning (baseline): {baseline}\nCurrent present: {present}\nMissing: {missing}\nOpen since: {start} ({minutes} min ago)\n",
            date = self.date,
            now = self.now,
            baseline = self.total_morning,
            present = self.present,
            missing = self.missing,
            start = self.period_start,
        )
    }
}

/// Dispatch boundary, implemented once for real SMTP and once for tests.
pub trait EmailSender: Send + Sync {
    fn send(&self, from: &str, to: &[String], message: &AlertMessage) -> Result<()>;
}

/// Plain-text SMTP over TLS via `lettre`.
pub struct LettreEmailSender {
    transport: SmtpTransport,
}

impl LettreEmailSender {
    pub fn new(smtp_host: &str, smtp_port: u32, from_address: &str, password: &str) -> Result<Self> {
        let creds = Credentials::new(from_address.to_string(), password.to_string());
        let transport = SmtpTransport::starttls_relay(smtp_host)
            .map_err(|details| PctrError::Smtp {
                details: details.to_string(),
            })?
            .port(u16::try_from(smtp_port).unwrap_or(587))
            .credentials(creds)
            .build();
        Ok(Self { transport })
    }
}

impl EmailSender for LettreEmailSender {
    fn send(&self, from: &str, to: &[String], message: &AlertMessage) -> Result<()> {
        let mut builder = Message::builder()
            .from(from.parse().map_err(|_| PctrError::Smtp {
                details: format!("invalid from_address {from:?}"),
            })?)
            .subject(message.subject());
        for addr in to {
            builder = builder.to(addr.parse().map_err(|_| PctrError::Smtp {
                details: format!("invalid recipient address {addr:?}"),
            })?);
        }
        let email = builder.body(message.body()).map_err(|details| PctrError::Smtp {
            details: details.to_string(),
        })?;
        self.transport
            .send(&email)
            .map_err(|details| PctrError::Smtp {
                details: details.to_string(),
            })?;
        Ok(())
    }
}

/// Records every send attempt instead of touching the network; used by
/// `AlertManager`'s own test suite.
#[derive(Default)]
pub struct RecordingEmailSender {
    pub sent: Mutex<Vec<AlertMessage>>,
    pub fail_next: Mutex<bool>,
}

impl EmailSender for RecordingEmailSender {
    fn send(&self, _from: &str, _to: &[String], message: &AlertMessage) -> Result<()> {
        let mut fail = self.fail_next.lock();
        if *fail {
            *fail = false;
            return Err(PctrError::Smtp {
                details: "simulated failure".to_string(),
            });
        }
        self.sent.lock().push(message.clone());
        Ok(())
    }
}
