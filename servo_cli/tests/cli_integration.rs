use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

const CONFIG: &str = r#"
[pins]
encoder_a = 2
encoder_b = 3
endstop = 13
motor_a = 6
motor_b = 7
motor_pwm = 5
"#;

fn config_file(extra: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().expect("tempfile");
    write!(f, "{CONFIG}{extra}").expect("write config");
    f
}

#[test]
fn check_accepts_a_valid_config() {
    let cfg = config_file("");
    Command::cargo_bin("servo")
        .expect("binary")
        .args(["--config"])
        .arg(cfg.path())
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("config OK"));
}

#[test]
fn check_rejects_an_invalid_config() {
    let cfg = config_file("\n[control]\nloop_hz = 0\n");
    Command::cargo_bin("servo")
        .expect("binary")
        .args(["--config"])
        .arg(cfg.path())
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("loop_hz must be > 0"));
}

#[test]
fn missing_config_file_fails_with_context() {
    Command::cargo_bin("servo")
        .expect("binary")
        .args(["--config", "/nonexistent/servo.toml", "check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read config"));
}

#[test]
fn simulated_run_completes_within_its_deadline() {
    let cfg = config_file("");
    Command::cargo_bin("servo")
        .expect("binary")
        .args(["--config"])
        .arg(cfg.path())
        .args(["run", "--simulate", "--run-ms", "150"])
        .timeout(std::time::Duration::from_secs(20))
        .assert()
        .success();
}

#[test]
fn json_mode_emits_structured_errors() {
    let cfg = config_file("\n[control]\ntelemetry_downsample = 0\n");
    Command::cargo_bin("servo")
        .expect("binary")
        .args(["--json", "--config"])
        .arg(cfg.path())
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("\"error\""));
}
