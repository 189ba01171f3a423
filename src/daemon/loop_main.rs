//! Main monitoring loop: five cooperating worker threads communicating
//! through the [`Store`] and a bounded crossbeam channel.
//!
//! - **Frame worker**: polls the injected [`FrameSource`], runs each frame
//!   through [`GateCounter`], and writes resolved crossings.
//! - **Phase worker**: ticks [`PhaseManager`] once a minute and pushes an
//!   export hint whenever the phase changes.
//! - **Alert worker**: ticks [`AlertManager`] every 30 minutes, reading the
//!   phase worker's last-observed phase.
//! - **Export worker**: serializes `DailyExporter`/`RollingExporter` runs,
//!   woken by its own interval or by a phase-boundary hint.
//! - **Retention worker**: sweeps expired per-day workbooks on a slow tick.
//!
//! `rusqlite::Connection` is `Send` but not `Sync`, so each worker opens its
//! own [`Store`] handle onto the same SQLite file rather than sharing one
//! behind a lock; WAL mode is what makes the concurrent opens safe. Thread
//! panics are caught at the worker's own loop boundary and the loop is
//! restarted up to a bounded number of times within a sliding window, so a
//! transient bug in one worker never brings the whole daemon down.
//!
//! `SIGHUP` reloads configuration from the same file the daemon was started
//! with. Gate geometry, alert/SMTP settings, and export directories/rolling
//! window/retention are held in `Arc<RwLock<_>>` cells the relevant workers
//! re-read on each tick; timezone, phase schedule, and the store path are
//! fixed at spawn time and a change there is logged but requires a restart.

#![allow(missing_docs)]

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::RwLock;

use crate::alerts::email::{EmailSender, LettreEmailSender, RecordingEmailSender};
use crate::alerts::manager::{AlertConfig, AlertManager};
use crate::core::config::{Config, ExportConfig, GateConfig, StoreConfig};
use crate::core::errors::{PctrError, Result};
use crate::daemon::signals::{ShutdownCoordinator, SignalHandler, WatchdogHeartbeat};
use crate::export::{DailyExporter, RetentionSweeper, RollingExporter};
use crate::gate::counter::{FrameSource, GateCounter};
use crate::phase::clock::{Phase, PhaseBounds};
use crate::phase::manager::PhaseManager;
use crate::store::Store;
use crate::store::model::AlertStatus;

const MAX_RESPAWNS: u32 = 3;
const RESPAWN_WINDOW: Duration = Duration::from_secs(300);
const SHUTDOWN_POLL: Duration = Duration::from_millis(250);
const PHASE_TICK: Duration = Duration::from_secs(60);
const ALERT_TICK: Duration = Duration::from_secs(30 * 60);
const RETENTION_TICK: Duration = Duration::from_secs(6 * 60 * 60);
const EXPORT_HINT_CHANNEL_CAP: usize = 16;

/// Runtime knobs not sourced from the config file.
#[derive(Debug, Clone)]
pub struct DaemonArgs {
    /// Identifies the camera in every stored event. Free-form, config-less.
    pub camera_id: String,
    /// Systemd watchdog timeout in seconds (0 disables).
    pub watchdog_sec: u64,
}

impl Default for DaemonArgs {
    fn default() -> Self {
        Self {
            camera_id: "camera_1".to_string(),
            watchdog_sec: 0,
        }
    }
}

struct ThreadHealth {
    panic_times: Vec<Instant>,
}

impl ThreadHealth {
    fn new() -> Self {
        Self {
            panic_times: Vec::new(),
        }
    }

    /// Record a panic. Returns false if the worker has exceeded the respawn
    /// limit within the sliding window.
    fn record_panic(&mut self) -> bool {
        let now = Instant::now();
        self.panic_times
            .retain(|t| now.duration_since(*t) < RESPAWN_WINDOW);
        self.panic_times.push(now);
        self.panic_times.len() <= MAX_RESPAWNS as usize
    }
}

/// A reason to run the exporter early, pushed by the phase worker whenever
/// the phase changes. The exporter also fires on its own fixed interval, so
/// a missed or coalesced hint is never load-bearing.
#[derive(Debug, Clone, Copy)]
struct ExportHint {
    date: NaiveDate,
}

/// Sleeps in short increments so shutdown is noticed promptly instead of at
/// the end of a long fixed sleep.
fn sleep_checking_shutdown(signal_handler: &SignalHandler, total: Duration) {
    let deadline = Instant::now() + total;
    while Instant::now() < deadline {
        if signal_handler.should_shutdown() {
            return;
        }
        thread::sleep(SHUTDOWN_POLL.min(deadline.saturating_duration_since(Instant::now())));
    }
}

/// Runs `body` to completion; if it panics and shutdown was not requested,
/// restarts it up to `MAX_RESPAWNS` times within `RESPAWN_WINDOW`, then asks
/// the whole process to shut down.
fn run_supervised(name: &'static str, signal_handler: &SignalHandler, mut body: impl FnMut()) {
    let mut health = ThreadHealth::new();
    loop {
        let outcome = panic::catch_unwind(AssertUnwindSafe(&mut body));
        if signal_handler.should_shutdown() {
            if outcome.is_err() {
                eprintln!("[PCTR-{name}] panicked during shutdown, exiting");
            }
            return;
        }
        match outcome {
            Ok(()) => return,
            Err(_) => {
                if health.record_panic() {
                    eprintln!("[PCTR-{name}] worker panicked, respawning");
                } else {
                    eprintln!(
                        "[PCTR-{name}] worker panicked {MAX_RESPAWNS}+ times in {RESPAWN_WINDOW:?}, requesting shutdown"
                    );
                    signal_handler.request_shutdown();
                    return;
                }
            }
        }
    }
}

/// Owns the configuration and coordinates the worker threads for one run of
/// `pctr run`. Each call to [`Daemon::run`] blocks until shutdown.
pub struct Daemon {
    config: Config,
    tz: Tz,
    bounds: PhaseBounds,
    signal_handler: SignalHandler,
    watchdog: WatchdogHeartbeat,
}

impl Daemon {
    /// Validates configuration and opens the store once up front so startup
    /// failures (bad timezone, unreachable storage path) surface before any
    /// worker thread is spawned.
    pub fn init(config: Config, args: &DaemonArgs) -> Result<Self> {
        let tz = config.phase.tz()?;
        let bounds = PhaseBounds::from_config(&config.phase)?;
        Store::open(&config.paths.sqlite_db, &config.store)?;

        let watchdog = if args.watchdog_sec > 0 {
            WatchdogHeartbeat::new(args.watchdog_sec)
        } else {
            WatchdogHeartbeat::disabled()
        };

        Ok(Self {
            config,
            tz,
            bounds,
            signal_handler: SignalHandler::new(),
            watchdog,
        })
    }

    /// Run every worker until a shutdown signal is observed, then drain the
    /// frame worker, run one final export, and return.
    pub fn run(&mut self, frame_source: Box<dyn FrameSource>, args: &DaemonArgs) -> Result<()> {
        eprintln!(
            "[PCTR-DAEMON] starting (config hash {})",
            self.config.stable_hash().unwrap_or_default()
        );

        let db_path = self.config.paths.sqlite_db.clone();
        let store_cfg = self.config.store.clone();
        let phase_state = Arc::new(RwLock::new(Phase::Idle));
        let (export_tx, export_rx) = bounded::<ExportHint>(EXPORT_HINT_CHANNEL_CAP);

        // Live-reloadable config cells: gate geometry, alert/SMTP settings, and
        // export directories/rolling window/retention can change without a
        // restart. Timezone, phase schedule, store path, and export cadence
        // are baked into worker threads at spawn time and still require one.
        let gate_live = Arc::new(RwLock::new(self.config.gate.clone()));
        let alert_live = Arc::new(RwLock::new(self.config.alert.clone()));
        let export_live = Arc::new(RwLock::new(self.config.export.clone()));

        let frame_handle = {
            let signal_handler = self.signal_handler.clone();
            let db_path = db_path.clone();
            let store_cfg = store_cfg.clone();
            let gate_cfg = Arc::clone(&gate_live);
            let tz = self.tz;
            let camera_id = args.camera_id.clone();
            let mut frame_source = frame_source;
            thread::Builder::new()
                .name("pctr-frame".to_string())
                .spawn(move || {
                    run_supervised("FRAME", &signal_handler, || {
                        frame_worker(
                            &db_path,
                            &store_cfg,
                            &gate_cfg,
                            tz,
                            &camera_id,
                            frame_source.as_mut(),
                            &signal_handler,
                        );
                    });
                })
                .map_err(|source| PctrError::Runtime {
                    details: format!("failed to spawn frame worker: {source}"),
                })?
        };

        let phase_handle = {
            let signal_handler = self.signal_handler.clone();
            let db_path = db_path.clone();
            let store_cfg = store_cfg.clone();
            let bounds = self.bounds;
            let tz = self.tz;
            let phase_state = Arc::clone(&phase_state);
            let export_tx = export_tx.clone();
            thread::Builder::new()
                .name("pctr-phase".to_string())
                .spawn(move || {
                    run_supervised("PHASE", &signal_handler, || {
                        phase_worker(
                            &db_path,
                            &store_cfg,
                            bounds,
                            tz,
                            &signal_handler,
                            &phase_state,
                            &export_tx,
                        );
                    });
                })
                .map_err(|source| PctrError::Runtime {
                    details: format!("failed to spawn phase worker: {source}"),
                })?
        };

        let alert_handle = {
            let signal_handler = self.signal_handler.clone();
            let db_path = db_path.clone();
            let store_cfg = store_cfg.clone();
            let alert_cfg = Arc::clone(&alert_live);
            let tz = self.tz;
            let phase_state = Arc::clone(&phase_state);
            thread::Builder::new()
                .name("pctr-alert".to_string())
                .spawn(move || {
                    run_supervised("ALERT", &signal_handler, || {
                        alert_worker(&db_path, &store_cfg, &alert_cfg, tz, &signal_handler, &phase_state);
                    });
                })
                .map_err(|source| PctrError::Runtime {
                    details: format!("failed to spawn alert worker: {source}"),
                })?
        };

        let export_handle = {
            let signal_handler = self.signal_handler.clone();
            let db_path = db_path.clone();
            let store_cfg = store_cfg.clone();
            let export_cfg = Arc::clone(&export_live);
            let tz = self.tz;
            let bounds = self.bounds;
            let export_interval =
                Duration::from_secs(self.config.export.export_interval_minutes.max(1) * 60);
            thread::Builder::new()
                .name("pctr-export".to_string())
                .spawn(move || {
                    run_supervised("EXPORT", &signal_handler, || {
                        export_worker(
                            &db_path,
                            &store_cfg,
                            &export_cfg,
                            bounds,
                            tz,
                            export_interval,
                            &export_rx,
                            &signal_handler,
                        );
                    });
                })
                .map_err(|source| PctrError::Runtime {
                    details: format!("failed to spawn export worker: {source}"),
                })?
        };

        let retention_handle = {
            let signal_handler = self.signal_handler.clone();
            let export_cfg = Arc::clone(&export_live);
            let tz = self.tz;
            thread::Builder::new()
                .name("pctr-retention".to_string())
                .spawn(move || {
                    run_supervised("RETENTION", &signal_handler, || {
                        retention_worker(&export_cfg, tz, &signal_handler);
                    });
                })
                .map_err(|source| PctrError::Runtime {
                    details: format!("failed to spawn retention worker: {source}"),
                })?
        };

        while !self.signal_handler.should_shutdown() {
            if self.signal_handler.should_reload() {
                self.handle_config_reload(&gate_live, &alert_live, &export_live);
            }
            self.watchdog.maybe_notify("running");
            sleep_checking_shutdown(&self.signal_handler, Duration::from_secs(1));
        }

        self.shutdown(
            export_tx,
            vec![
                ("frame", frame_handle),
                ("phase", phase_handle),
                ("alert", alert_handle),
                ("export", export_handle),
                ("retention", retention_handle),
            ],
        )
    }

    /// Reloads configuration from the file this daemon was started with.
    ///
    /// Gate geometry, alert/SMTP settings, and export directories/rolling
    /// window/retention take effect immediately through the shared cells
    /// workers read each tick. Timezone, phase schedule, and the store path
    /// are fixed for the lifetime of the process; a change there is logged
    /// but not applied, since the worker threads that depend on them were
    /// spawned with those values baked in.
    fn handle_config_reload(
        &mut self,
        gate_live: &Arc<RwLock<GateConfig>>,
        alert_live: &Arc<RwLock<AlertConfig>>,
        export_live: &Arc<RwLock<ExportConfig>>,
    ) {
        eprintln!("[PCTR-DAEMON] config reload requested (SIGHUP)");

        let new_config = match Config::load(Some(&self.config.paths.config_file)) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("[PCTR-DAEMON] config reload failed: {e}");
                return;
            }
        };

        let old_hash = self.config.stable_hash().unwrap_or_default();
        let new_hash = new_config.stable_hash().unwrap_or_default();
        if old_hash == new_hash {
            eprintln!("[PCTR-DAEMON] config unchanged, skipping reload");
            return;
        }

        if new_config.phase != self.config.phase
            || new_config.paths != self.config.paths
            || new_config.store != self.config.store
        {
            eprintln!(
                "[PCTR-DAEMON] phase schedule/timezone, store tuning, or storage path changed; these require a restart and were not applied"
            );
        }
        if new_config.export.export_interval_minutes != self.config.export.export_interval_minutes {
            eprintln!("[PCTR-DAEMON] export_interval_minutes changed; requires a restart to take effect");
        }

        if new_config.gate != self.config.gate {
            *gate_live.write() = new_config.gate.clone();
            self.config.gate = new_config.gate.clone();
        }
        if new_config.alert != self.config.alert {
            *alert_live.write() = new_config.alert.clone();
            self.config.alert = new_config.alert.clone();
        }
        if new_config.export != self.config.export {
            *export_live.write() = new_config.export.clone();
            self.config.export = new_config.export.clone();
        }

        eprintln!("[PCTR-DAEMON] config reloaded (hash {old_hash} -> {new_hash})");
    }

    /// Drains the frame worker first, force-runs one final daily + rolling
    /// export directly against the store, then waits (bounded) for the
    /// remaining workers to notice shutdown and stop.
    fn shutdown(
        &mut self,
        export_tx: Sender<ExportHint>,
        mut handles: Vec<(&'static str, thread::JoinHandle<()>)>,
    ) -> Result<()> {
        let coordinator = ShutdownCoordinator::new();
        eprintln!("[PCTR-DAEMON] shutdown requested, draining frame worker");

        let (frame_name, frame_handle) = handles.remove(0);
        join_with_timeout(frame_name, frame_handle, coordinator.timeout);

        eprintln!("[PCTR-DAEMON] running final export pass");
        match Store::open(&self.config.paths.sqlite_db, &self.config.store) {
            Ok(store) => {
                let now = Utc::now().with_timezone(&self.tz);
                let today = now.date_naive();
                let daily = DailyExporter::new(self.config.export.daily_dir.clone(), self.bounds, self.tz);
                if let Err(e) = daily.export(&store, today, now) {
                    eprintln!("[PCTR-DAEMON] final daily export failed: {e}");
                }
                let rolling = RollingExporter::new(
                    self.config.export.daily_dir.clone(),
                    self.config.export.summary_dir.clone(),
                    self.config.export.rolling_window_days,
                );
                if let Err(e) = rolling.export() {
                    eprintln!("[PCTR-DAEMON] final rolling export failed: {e}");
                }
                let retention = RetentionSweeper::new(
                    self.config.export.daily_dir.clone(),
                    self.config.export.retention_days,
                );
                match retention.sweep(today) {
                    Ok(removed) if !removed.is_empty() => {
                        eprintln!("[PCTR-DAEMON] final retention sweep removed {} workbook(s)", removed.len());
                    }
                    Ok(_) => {}
                    Err(e) => eprintln!("[PCTR-DAEMON] final retention sweep failed: {e}"),
                }
            }
            Err(e) => eprintln!("[PCTR-DAEMON] could not open store for final export: {e}"),
        }
        drop(export_tx);

        for (name, handle) in handles {
            join_with_timeout(name, handle, coordinator.timeout);
        }

        eprintln!("[PCTR-DAEMON] shutdown complete");
        Ok(())
    }
}

/// Joins `handle` on a helper thread and waits at most `timeout`. If the
/// worker does not stop in time it is abandoned, per the shutdown
/// cancellation contract: every write the worker could have made was
/// already durable, so an abandoned worker never corrupts the Store.
fn join_with_timeout(name: &str, handle: thread::JoinHandle<()>, timeout: Duration) {
    let (tx, rx) = bounded::<()>(1);
    let _waiter = thread::spawn(move || {
        let _ = handle.join();
        let _ = tx.send(());
    });
    match rx.recv_timeout(timeout) {
        Ok(()) => eprintln!("[PCTR-SHUTDOWN] {name}: stopped"),
        Err(_) => eprintln!("[PCTR-SHUTDOWN] {name}: did not stop within {timeout:?}, abandoning"),
    }
}

fn open_store_or_log(label: &str, db_path: &Path, store_cfg: &StoreConfig) -> Option<Store> {
    match Store::open(db_path, store_cfg) {
        Ok(store) => Some(store),
        Err(e) => {
            eprintln!("[PCTR-{label}] failed to open store: {e}");
            None
        }
    }
}

fn frame_worker(
    db_path: &Path,
    store_cfg: &StoreConfig,
    gate_cfg: &Arc<RwLock<GateConfig>>,
    tz: Tz,
    camera_id: &str,
    frame_source: &mut dyn FrameSource,
    signal_handler: &SignalHandler,
) {
    let Some(store) = open_store_or_log("FRAME", db_path, store_cfg) else {
        return;
    };
    let mut applied = gate_cfg.read().clone();
    let mut counter = GateCounter::new(applied.clone());
    let start = Instant::now();

    while !signal_handler.should_shutdown() {
        let current = gate_cfg.read().clone();
        if current != applied {
            counter.set_config(current.clone());
            applied = current;
            eprintln!("[PCTR-FRAME] gate config reloaded");
        }
        let Some(boxes) = frame_source.next_frame() else {
            eprintln!("[PCTR-FRAME] frame source exhausted, stopping");
            return;
        };
        let now = Utc::now().with_timezone(&tz);
        if let Err(e) = counter.process_frame(&store, now, camera_id, &boxes) {
            eprintln!("[PCTR-FRAME] failed to record crossing: {e}");
        }
        match store.maybe_self_test(start.elapsed(), now) {
            Ok(true) => eprintln!("[PCTR-FRAME] self-test marker inserted"),
            Ok(false) => {}
            Err(e) => eprintln!("[PCTR-FRAME] self-test check failed: {e}"),
        }
    }
}

fn phase_worker(
    db_path: &Path,
    store_cfg: &StoreConfig,
    bounds: PhaseBounds,
    tz: Tz,
    signal_handler: &SignalHandler,
    phase_state: &Arc<RwLock<Phase>>,
    export_tx: &Sender<ExportHint>,
) {
    let Some(store) = open_store_or_log("PHASE", db_path, store_cfg) else {
        return;
    };
    let mut manager = PhaseManager::new(bounds, tz);
    let mut last_phase: Option<Phase> = None;

    while !signal_handler.should_shutdown() {
        let now = Utc::now().with_timezone(&tz);
        match manager.tick(&store, now) {
            Ok(outcome) => {
                *phase_state.write() = outcome.phase;
                if last_phase != Some(outcome.phase) {
                    eprintln!(
                        "[PCTR-PHASE] transition -> {:?} (baseline={} present={} missing={})",
                        outcome.phase, outcome.baseline, outcome.present, outcome.missing
                    );
                    let _ = export_tx.try_send(ExportHint { date: outcome.date });
                    last_phase = Some(outcome.phase);
                }
            }
            Err(e) => eprintln!("[PCTR-PHASE] tick failed: {e}"),
        }
        sleep_checking_shutdown(signal_handler, PHASE_TICK);
    }
}

fn build_email_sender(cfg: &AlertConfig) -> Box<dyn EmailSender> {
    if !cfg.enabled {
        return Box::new(RecordingEmailSender::default());
    }
    match LettreEmailSender::new(&cfg.smtp_host, cfg.smtp_port, &cfg.from_address, &cfg.password) {
        Ok(sender) => Box::new(sender),
        Err(e) => {
            eprintln!("[PCTR-ALERT] failed to build SMTP transport ({e}); alerts will not be sent");
            Box::new(RecordingEmailSender::default())
        }
    }
}

fn alert_worker(
    db_path: &Path,
    store_cfg: &StoreConfig,
    alert_cfg: &Arc<RwLock<AlertConfig>>,
    tz: Tz,
    signal_handler: &SignalHandler,
    phase_state: &Arc<RwLock<Phase>>,
) {
    let Some(store) = open_store_or_log("ALERT", db_path, store_cfg) else {
        return;
    };
    let mut applied = alert_cfg.read().clone();
    let mut manager = AlertManager::new(applied.clone(), build_email_sender(&applied));

    while !signal_handler.should_shutdown() {
        let current = alert_cfg.read().clone();
        if current != applied {
            manager = AlertManager::new(current.clone(), build_email_sender(&current));
            applied = current;
            eprintln!("[PCTR-ALERT] config reloaded");
        }
        let now = Utc::now().with_timezone(&tz);
        let phase = *phase_state.read();
        match manager.tick(&store, now, phase) {
            Ok(row) if row.status == AlertStatus::Sent => {
                eprintln!("[PCTR-ALERT] sent (missing={})", row.missing);
            }
            Ok(row) if row.status == AlertStatus::Failed => {
                eprintln!("[PCTR-ALERT] dispatch failed: {}", row.reason);
            }
            Ok(_) => {}
            Err(e) => eprintln!("[PCTR-ALERT] tick failed: {e}"),
        }
        sleep_checking_shutdown(signal_handler, ALERT_TICK);
    }
}

/// Runs the daily (today + yesterday) and rolling exports, then sweeps
/// retention defensively — a rolling export is the natural point to also
/// prune stale workbooks, rather than relying solely on the retention
/// worker's own six-hour timer.
fn run_export_pass(
    store: &Store,
    export_cfg: &ExportConfig,
    bounds: PhaseBounds,
    tz: Tz,
    date: NaiveDate,
    now: chrono::DateTime<Tz>,
) {
    let daily = DailyExporter::new(export_cfg.daily_dir.clone(), bounds, tz);
    let rolling = RollingExporter::new(
        export_cfg.daily_dir.clone(),
        export_cfg.summary_dir.clone(),
        export_cfg.rolling_window_days,
    );
    let retention = RetentionSweeper::new(export_cfg.daily_dir.clone(), export_cfg.retention_days);

    if let Err(e) = daily.export(store, date, now) {
        eprintln!("[PCTR-EXPORT] daily export failed for {date}: {e}");
    }
    let previous = date - chrono::Duration::days(1);
    if let Err(e) = daily.export(store, previous, now) {
        eprintln!("[PCTR-EXPORT] daily export failed for {previous}: {e}");
    }
    if let Err(e) = rolling.export() {
        eprintln!("[PCTR-EXPORT] rolling export failed: {e}");
    }
    match retention.sweep(date) {
        Ok(removed) if !removed.is_empty() => {
            eprintln!("[PCTR-EXPORT] retention sweep removed {} workbook(s)", removed.len());
        }
        Ok(_) => {}
        Err(e) => eprintln!("[PCTR-EXPORT] retention sweep failed: {e}"),
    }
}

fn export_worker(
    db_path: &Path,
    store_cfg: &StoreConfig,
    export_cfg: &Arc<RwLock<ExportConfig>>,
    bounds: PhaseBounds,
    tz: Tz,
    export_interval: Duration,
    export_rx: &Receiver<ExportHint>,
    signal_handler: &SignalHandler,
) {
    let Some(store) = open_store_or_log("EXPORT", db_path, store_cfg) else {
        return;
    };

    let startup_now = Utc::now().with_timezone(&tz);
    run_export_pass(&store, &export_cfg.read().clone(), bounds, tz, startup_now.date_naive(), startup_now);
    let mut deadline = Instant::now() + export_interval;

    loop {
        if signal_handler.should_shutdown() {
            break;
        }
        if signal_handler.should_force_export() {
            let now = Utc::now().with_timezone(&tz);
            run_export_pass(&store, &export_cfg.read().clone(), bounds, tz, now.date_naive(), now);
            deadline = Instant::now() + export_interval;
            continue;
        }
        let poll = SHUTDOWN_POLL.min(deadline.saturating_duration_since(Instant::now()));
        match export_rx.recv_timeout(poll) {
            Ok(hint) => {
                let now = Utc::now().with_timezone(&tz);
                run_export_pass(&store, &export_cfg.read().clone(), bounds, tz, hint.date, now);
                deadline = Instant::now() + export_interval;
            }
            Err(RecvTimeoutError::Timeout) => {
                if Instant::now() >= deadline {
                    let now = Utc::now().with_timezone(&tz);
                    run_export_pass(&store, &export_cfg.read().clone(), bounds, tz, now.date_naive(), now);
                    deadline = Instant::now() + export_interval;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let final_now = Utc::now().with_timezone(&tz);
    run_export_pass(&store, &export_cfg.read().clone(), bounds, tz, final_now.date_naive(), final_now);
}

fn retention_worker(export_cfg: &Arc<RwLock<ExportConfig>>, tz: Tz, signal_handler: &SignalHandler) {
    while !signal_handler.should_shutdown() {
        let today = Utc::now().with_timezone(&tz).date_naive();
        let cfg = export_cfg.read().clone();
        let sweeper = RetentionSweeper::new(cfg.daily_dir.clone(), cfg.retention_days);
        match sweeper.sweep(today) {
            Ok(removed) if !removed.is_empty() => {
                eprintln!("[PCTR-RETENTION] removed {} workbook(s)", removed.len());
            }
            Ok(_) => {}
            Err(e) => eprintln!("[PCTR-RETENTION] sweep failed: {e}"),
        }
        sleep_checking_shutdown(signal_handler, RETENTION_TICK);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_health_allows_bounded_respawns() {
        let mut health = ThreadHealth::new();
        assert!(health.record_panic());
        assert!(health.record_panic());
        assert!(health.record_panic());
        assert!(health.record_panic());
        assert!(!health.record_panic());
    }

    #[test]
    fn daemon_args_default_has_nonempty_camera_id() {
        let args = DaemonArgs::default();
        assert!(!args.camera_id.is_empty());
        assert_eq!(args.watchdog_sec, 0);
    }
}
