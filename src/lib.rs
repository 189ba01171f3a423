#![forbid(unsafe_code)]

//! people_counter (`pctr`) — single-camera gate-occupancy monitor.
//!
//! Observes a stream of tracked bounding boxes crossing a configured virtual
//! gate, accumulates a morning head-count, then compares live occupancy
//! against that frozen baseline for the rest of the day, raising email
//! alerts on sustained shortfall. Daily and rolling spreadsheet artefacts
//! are derived entirely from the durable store so non-technical operators
//! can audit history without touching the service.

pub mod alerts;
#[cfg(feature = "cli")]
pub mod cli;
pub mod core;
pub mod daemon;
pub mod export;
pub mod gate;
pub mod phase;
pub mod store;
