//! Shared test infrastructure for `people_counter` integration tests.
//!
//! Provides `run_cli_case()`, a thin wrapper around the built `pctr` binary,
//! and `TestHome`, a scratch directory tree with a config file pointing at
//! its own store/export paths so tests never touch a real operator's data.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_pctr") {
        return PathBuf::from(path);
    }
    let exe_name = if cfg!(windows) { "pctr.exe" } else { "pctr" };
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name))
        .filter(|p| p.exists())
        .unwrap_or_else(|| {
            panic!("unable to resolve pctr binary path (checked CARGO_BIN_EXE_pctr and debug sibling path)")
        })
}

pub fn run_cli(config: Option<&std::path::Path>, args: &[&str]) -> CmdResult {
    let mut cmd = Command::new(resolve_bin_path());
    if let Some(path) = config {
        cmd.arg("--config").arg(path);
    }
    cmd.args(args);
    let output = cmd.output().expect("execute pctr command");
    CmdResult {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    }
}

/// A scratch directory with a `config.toml` pointing its store and export
/// directories at itself, so `status`/`export` subcommands run against an
/// isolated throwaway database.
pub struct TestHome {
    pub dir: tempfile::TempDir,
    pub config_path: PathBuf,
}

impl TestHome {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create scratch dir");
        let config_path = dir.path().join("config.toml");
        let db_path = dir.path().join("people_counter.sqlite3");
        let daily_dir = dir.path().join("exports").join("daily");
        let summary_dir = dir.path().join("exports").join("summary");
        fs::create_dir_all(&daily_dir).expect("create scratch daily dir");
        fs::create_dir_all(&summary_dir).expect("create scratch summary dir");
        let toml = format!(
            r#"
[paths]
sqlite_db = {db_path:?}

[export]
daily_dir = {daily_dir:?}
summary_dir = {summary_dir:?}
"#
        );
        fs::write(&config_path, toml).expect("write scratch config");
        Self { dir, config_path }
    }
}
