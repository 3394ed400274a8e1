use std::path::PathBuf;
use std::process::Command;

fn wr_binary() -> PathBuf {
	PathBuf::from(env!("CARGO_BIN_EXE_wr"))
}

fn run_wr(args: &[&str]) -> (bool, String, String) {
	let output = Command::new(wr_binary()).args(args).env_remove("RUST_LOG").output().expect("Failed to execute wr");
	let stdout = String::from_utf8_lossy(&output.stdout).to_string();
	let stderr = String::from_utf8_lossy(&output.stderr).to_string();
	(output.status.success(), stdout, stderr)
}

#[test]
fn help_lists_commands() {
	let (ok, stdout, _) = run_wr(&["--help"]);
	assert!(ok);
	assert!(stdout.contains("targets"));
	assert!(stdout.contains("record"));
	assert!(stdout.contains("--verbose"));
}

#[test]
fn record_help_lists_options() {
	let (ok, stdout, _) = run_wr(&["record", "--help"]);
	assert!(ok);
	for option in ["--port", "--target", "--out", "--config", "--duration-secs", "--no-intercept"] {
		assert!(stdout.contains(option), "missing {option} in:\n{stdout}");
	}
}

#[test]
fn invalid_config_fails_before_connecting() {
	let dir = tempfile::tempdir().unwrap();
	let config = dir.path().join("recorder.json");
	std::fs::write(&config, r#"{"sizeReportIntervalMs": "soon"}"#).unwrap();

	let (ok, _, stderr) = run_wr(&["record", "--port", "1", "--config", config.to_str().unwrap()]);
	assert!(!ok);
	assert!(stderr.contains("command failed"), "stderr: {stderr}");
	assert!(stderr.contains("Configuration error"), "stderr: {stderr}");
	assert!(!stderr.contains("No browser"), "stderr: {stderr}");
}

#[test]
fn rejected_config_values_are_reported() {
	let dir = tempfile::tempdir().unwrap();
	let config = dir.path().join("recorder.json");
	std::fs::write(&config, r#"{"commandTimeoutMs": 0}"#).unwrap();

	let (ok, _, stderr) = run_wr(&["record", "--port", "1", "--config", config.to_str().unwrap()]);
	assert!(!ok);
	assert!(stderr.contains("commandTimeoutMs"), "stderr: {stderr}");
}

#[test]
fn missing_browser_is_a_discovery_error() {
	let (ok, stdout, stderr) = run_wr(&["targets", "--port", "1"]);
	assert!(!ok);
	assert!(stdout.is_empty());
	assert!(stderr.contains("No browser with remote debugging found on port 1"), "stderr: {stderr}");
}

#[test]
fn unknown_subcommand_is_rejected() {
	let (ok, _, stderr) = run_wr(&["replay"]);
	assert!(!ok);
	assert!(stderr.contains("unrecognized subcommand"), "stderr: {stderr}");
}
