//! End-to-end smoke tests against the built `pctr` binary.

mod common;

use common::{TestHome, run_cli};

#[test]
fn help_prints_usage() {
    let result = run_cli(None, &["--help"]);
    assert!(result.status.success());
    assert!(result.stdout.contains("Usage: pctr"));
}

#[test]
fn completions_prints_a_nonempty_script() {
    let result = run_cli(None, &["completions", "bash"]);
    assert!(result.status.success(), "stderr: {}", result.stderr);
    assert!(result.stdout.contains("pctr"));
}

#[test]
fn config_validate_accepts_scratch_config() {
    let home = TestHome::new();
    let result = run_cli(Some(&home.config_path), &["config", "validate"]);
    assert!(result.status.success(), "stderr: {}", result.stderr);
    assert!(result.stdout.contains("config is valid"));
}

#[test]
fn config_path_echoes_explicit_override() {
    let home = TestHome::new();
    let result = run_cli(Some(&home.config_path), &["config", "path"]);
    assert!(result.status.success());
    assert_eq!(result.stdout.trim(), home.config_path.to_string_lossy());
}

#[test]
fn config_show_prints_json_with_expected_fields() {
    let home = TestHome::new();
    let result = run_cli(Some(&home.config_path), &["config", "show"]);
    assert!(result.status.success(), "stderr: {}", result.stderr);
    assert!(result.stdout.contains("\"phase\""));
    assert!(result.stdout.contains("\"gate\""));
}

#[test]
fn status_reports_zero_baseline_on_a_fresh_store() {
    let home = TestHome::new();
    let result = run_cli(Some(&home.config_path), &["status"]);
    assert!(result.status.success(), "stderr: {}", result.stderr);
    assert!(result.stdout.contains("baseline (total_morning): 0"));
    assert!(result.stdout.contains("last alert: none"));
}

#[test]
fn export_rolling_succeeds_against_an_empty_daily_dir() {
    let home = TestHome::new();
    let result = run_cli(Some(&home.config_path), &["export", "rolling"]);
    assert!(result.status.success(), "stderr: {}", result.stderr);
    assert!(result.stdout.contains("rolling export:"));
}

#[test]
fn missing_explicit_config_file_is_an_error() {
    let result = run_cli(Some(std::path::Path::new("/nonexistent/pctr.toml")), &["status"]);
    assert!(!result.status.success());
}
