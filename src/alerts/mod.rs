//! Duration-gated, cooldown-limited shortfall alerting.

pub mod email;
pub mod manager;

pub use email::{AlertMessage, EmailSender, LettreEmailSender, RecordingEmailSender};
pub use manager::{AlertConfig, AlertManager};
