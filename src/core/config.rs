//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::alerts::manager::AlertConfig;
use crate::core::errors::{PctrError, Result};

/// Full configuration model for the people counter daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub gate: GateConfig,
    pub phase: PhaseConfig,
    pub alert: AlertConfig,
    pub export: ExportConfig,
    pub store: StoreConfig,
    pub paths: PathsConfig,
}

/// Gate geometry and anti-jitter tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GateConfig {
    pub mode: GateMode,
    /// Horizontal band center, in pixels (`HorizontalBand` mode).
    pub gate_y: f64,
    /// Horizontal band thickness, in pixels (`HorizontalBand` mode).
    pub gate_height: f64,
    pub gate_x_min: Option<f64>,
    pub gate_x_max: Option<f64>,
    /// Line-band endpoints (`LineBand` mode).
    pub p1: (f64, f64),
    pub p2: (f64, f64),
    pub gate_thickness: f64,
    pub cooldown_sec: f64,
    pub min_frames_in_gate: u32,
    pub min_travel_px: f64,
    /// Maps the (entry_side, exit_side) traversal direction to IN or OUT.
    /// `true` means "top-to-bottom" (or left-to-right for `LineBand`) counts as IN.
    pub top_to_bottom_is_in: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum GateMode {
    #[default]
    HorizontalBand,
    LineBand,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            mode: GateMode::HorizontalBand,
            gate_y: 360.0,
            gate_height: 60.0,
            gate_x_min: None,
            gate_x_max: None,
            p1: (0.0, 360.0),
            p2: (1280.0, 360.0),
            gate_thickness: 60.0,
            cooldown_sec: 2.0,
            min_frames_in_gate: 3,
            min_travel_px: 40.0,
            top_to_bottom_is_in: true,
        }
    }
}

/// Phase boundaries and timezone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PhaseConfig {
    /// IANA timezone name, e.g. `"America/New_York"`.
    pub timezone: String,
    /// `HH:MM` daily reset / start of morning counting.
    pub reset_time: String,
    /// `HH:MM` end of morning counting; freezes the baseline.
    pub morning_end: String,
    /// `HH:MM` start of lunch break.
    pub lunch_start: String,
    /// `HH:MM` end of lunch break; start of afternoon monitoring.
    pub lunch_end: String,
    /// `HH:MM` day close instant.
    pub day_close: String,
}

impl PhaseConfig {
    /// Resolves the configured IANA timezone name against `chrono-tz`'s
    /// bundled database.
    pub fn tz(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse()
            .map_err(|_| PctrError::UnknownTimezone {
                tz: self.timezone.clone(),
            })
    }
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            reset_time: "06:00".to_string(),
            morning_end: "08:30".to_string(),
            lunch_start: "11:55".to_string(),
            lunch_end: "13:15".to_string(),
            day_close: "23:59".to_string(),
        }
    }
}

/// Export cadence, directories, and retention.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExportConfig {
    pub daily_dir: PathBuf,
    pub summary_dir: PathBuf,
    pub export_interval_minutes: u64,
    pub rolling_window_days: u32,
    pub retention_days: u32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            daily_dir: PathBuf::from("exports/daily"),
            summary_dir: PathBuf::from("exports/summary"),
            export_interval_minutes: 30,
            rolling_window_days: 7,
            retention_days: 30,
        }
    }
}

/// Store engine tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    pub busy_timeout_ms: u32,
    pub cache_size_kib: i64,
    pub mmap_size_bytes: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            cache_size_kib: 8_000,
            mmap_size_bytes: 256 * 1024 * 1024,
        }
    }
}

/// Filesystem locations for config and the SQLite store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub sqlite_db: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[PCTR-CONFIG] WARNING: HOME not set, falling back to /var/lib/pctr for data paths"
                );
                PathBuf::from("/var/lib/pctr")
            },
            PathBuf::from,
        );
        let (cfg, data) = if home_dir == Path::new("/var/lib/pctr") {
            (PathBuf::from("/etc/pctr/config.toml"), home_dir)
        } else {
            (
                home_dir.join(".config").join("pctr").join("config.toml"),
                home_dir.join(".local").join("share").join("pctr"),
            )
        };
        Self {
            config_file: cfg,
            sqlite_db: data.join("people_counter.sqlite3"),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Resolution order for config file path:
    /// 1. Explicit `path` argument (from `--config` CLI flag)
    /// 2. `PCTR_CONFIG` environment variable
    /// 3. Default path (`~/.config/pctr/config.toml`)
    ///
    /// Missing config file is not an error when loading from the default path;
    /// defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_config = if path.is_none() {
            env::var_os("PCTR_CONFIG").map(PathBuf::from)
        } else {
            None
        };

        let path_buf = path.map_or_else(
            || env_config.clone().unwrap_or_else(Self::default_path),
            Path::to_path_buf,
        );
        let is_explicit_path = path.is_some() || env_config.is_some();

        // System-wide fallback: when no explicit path is given and the
        // user-level config doesn't exist, try /etc/pctr/config.toml so
        // `pctr status` (run as a regular user) finds the same config the
        // daemon uses.
        let system_config = PathBuf::from("/etc/pctr/config.toml");
        let (effective_path, is_system_fallback) =
            if !is_explicit_path && !path_buf.exists() && system_config.exists() {
                (system_config, true)
            } else {
                (path_buf, false)
            };

        let mut cfg = if effective_path.exists() {
            let raw = fs::read_to_string(&effective_path).map_err(|source| PctrError::Io {
                path: effective_path.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            if is_system_fallback {
                eprintln!(
                    "[PCTR-CONFIG] using system config at {}",
                    effective_path.display()
                );
            }
            parsed
        } else if is_explicit_path {
            return Err(PctrError::MissingConfig {
                path: effective_path,
            });
        } else {
            Self::default()
        };

        cfg.paths.config_file = effective_path;
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config, used to detect change
    /// across a `SIGHUP` reload without depending on a seed-varying hasher.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        set_env_f64("PCTR_GATE_GATE_Y", &mut self.gate.gate_y)?;
        set_env_f64("PCTR_GATE_GATE_HEIGHT", &mut self.gate.gate_height)?;
        set_env_f64("PCTR_GATE_COOLDOWN_SEC", &mut self.gate.cooldown_sec)?;
        set_env_u32(
            "PCTR_GATE_MIN_FRAMES_IN_GATE",
            &mut self.gate.min_frames_in_gate,
        )?;
        set_env_f64("PCTR_GATE_MIN_TRAVEL_PX", &mut self.gate.min_travel_px)?;

        set_env_string("PCTR_PHASE_TIMEZONE", &mut self.phase.timezone);
        set_env_string("PCTR_PHASE_RESET_TIME", &mut self.phase.reset_time);
        set_env_string("PCTR_PHASE_MORNING_END", &mut self.phase.morning_end);
        set_env_string("PCTR_PHASE_LUNCH_START", &mut self.phase.lunch_start);
        set_env_string("PCTR_PHASE_LUNCH_END", &mut self.phase.lunch_end);

        set_env_bool("PCTR_ALERT_ENABLED", &mut self.alert.enabled)?;
        set_env_string("PCTR_ALERT_SMTP_HOST", &mut self.alert.smtp_host);
        set_env_u32("PCTR_ALERT_SMTP_PORT", &mut self.alert.smtp_port)?;
        set_env_string("PCTR_ALERT_FROM_ADDRESS", &mut self.alert.from_address);
        set_env_string("PCTR_ALERT_PASSWORD", &mut self.alert.password);

        set_env_u32(
            "PCTR_EXPORT_ROLLING_WINDOW_DAYS",
            &mut self.export.rolling_window_days,
        )?;
        set_env_u32(
            "PCTR_EXPORT_RETENTION_DAYS",
            &mut self.export.retention_days,
        )?;

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.phase.tz()?;

        let times = [
            ("reset_time", &self.phase.reset_time),
            ("morning_end", &self.phase.morning_end),
            ("lunch_start", &self.phase.lunch_start),
            ("lunch_end", &self.phase.lunch_end),
            ("day_close", &self.phase.day_close),
        ];
        let mut minutes = Vec::with_capacity(times.len());
        for (name, raw) in times {
            minutes.push((name, parse_hhmm(name, raw)?));
        }
        for pair in minutes.windows(2) {
            let (prev_name, prev) = pair[0];
            let (next_name, next) = pair[1];
            if next <= prev {
                return Err(PctrError::InvalidConfig {
                    details: format!(
                        "phase bound {next_name} ({next}) must be strictly after {prev_name} ({prev})"
                    ),
                });
            }
        }

        if self.gate.min_travel_px < 0.0 {
            return Err(PctrError::InvalidConfig {
                details: "gate.min_travel_px must be >= 0".to_string(),
            });
        }
        if self.gate.gate_height <= 0.0 {
            return Err(PctrError::InvalidConfig {
                details: "gate.gate_height must be > 0".to_string(),
            });
        }
        if self.export.rolling_window_days == 0 {
            return Err(PctrError::InvalidConfig {
                details: "export.rolling_window_days must be >= 1".to_string(),
            });
        }
        if self.export.retention_days == 0 {
            return Err(PctrError::InvalidConfig {
                details: "export.retention_days must be >= 1".to_string(),
            });
        }
        if self.alert.enabled && self.alert.to_addresses.is_empty() {
            return Err(PctrError::InvalidConfig {
                details: "alert.to_addresses must be non-empty when alert.enabled".to_string(),
            });
        }

        Ok(())
    }
}

/// Parse `HH:MM` into minutes-since-midnight for ordering checks.
fn parse_hhmm(name: &str, raw: &str) -> Result<u32> {
    let (h, m) = raw.split_once(':').ok_or_else(|| PctrError::InvalidConfig {
        details: format!("{name}={raw:?} is not HH:MM"),
    })?;
    let h: u32 = h.parse().map_err(|_| PctrError::InvalidConfig {
        details: format!("{name}={raw:?}: invalid hour"),
    })?;
    let m: u32 = m.parse().map_err(|_| PctrError::InvalidConfig {
        details: format!("{name}={raw:?}: invalid minute"),
    })?;
    if h > 23 || m > 59 {
        return Err(PctrError::InvalidConfig {
            details: format!("{name}={raw:?} out of range"),
        });
    }
    Ok(h * 60 + m)
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_env_f64(name: &str, slot: &mut f64) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<f64>().map_err(|error| PctrError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_u32(name: &str, slot: &mut u32) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<u32>().map_err(|error| PctrError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_bool(name: &str, slot: &mut bool) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<bool>().map_err(|error| PctrError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_string(name: &str, slot: &mut String) {
    if let Some(raw) = env_var(name) {
        *slot = raw;
    }
}
