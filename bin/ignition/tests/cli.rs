//! Integration tests for the ignition binary
//!
//! Uses the pre-compiled binary via CARGO_BIN_EXE to avoid re-compilation at test time.

use std::path::Path;
use std::process::{Command, Output, Stdio};

fn ignition(args: &[&str], env: &[(&str, &str)]) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_ignition"));
    command
        .args(args)
        .env_remove("IGNITION_SPEC")
        .env_remove("IGNITION_SECRETS_DIR")
        .env_remove("IGNITION_LOG_DIR")
        .env_remove("IGNITION_LOG_FORMAT")
        .env_remove("RUST_LOG");
    for (key, value) in env {
        command.env(key, value);
    }
    command.output().expect("Failed to run ignition")
}

/// A service with one secret, one config key and no dependencies.
/// The daemon exits with status 7.
fn write_spec(root: &Path) -> std::path::PathBuf {
    std::fs::create_dir_all(root.join("secrets")).unwrap();
    std::fs::write(root.join("secrets/ftp_password"), "ftp-pass").unwrap();
    let spec = root.join("ftp.yml");
    std::fs::write(
        &spec,
        format!(
            r#"
version: v1
service: ftp
secrets:
  dir: {root}/secrets
  names: [ftp_password]
config:
  required: [FTP_USER]
marker:
  path: {root}/data/.initialized
init:
  steps:
    - id: create-user
      command: [/bin/sh, -c, 'printf "%s" "$0" > "$1"', "${{config:FTP_USER}}", {root}/user]
launch:
  command: [/bin/sh, -c, "exit 7"]
  mode: supervise
"#,
            root = root.display()
        ),
    )
    .unwrap();
    spec
}

#[test]
fn test_help_lists_commands() {
    let output = ignition(&["--help"], &[]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    for command in ["run", "validate", "check", "status"] {
        assert!(stdout.contains(command), "Should have {} command", command);
    }
}

#[test]
fn test_validate() {
    let dir = tempfile::tempdir().unwrap();
    let spec = write_spec(dir.path());

    let output = ignition(&["validate", spec.to_str().unwrap()], &[]);
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Service:      ftp"));

    let broken = dir.path().join("broken.yml");
    std::fs::write(&broken, "version: v9\nservice: ftp\n").unwrap();
    let output = ignition(&["validate", broken.to_str().unwrap()], &[]);
    assert_eq!(output.status.code(), Some(78));
}

#[test]
fn test_run_initializes_once_and_propagates_exit_status() {
    let dir = tempfile::tempdir().unwrap();
    let spec = write_spec(dir.path());
    let spec = spec.to_str().unwrap();

    let output = ignition(&["status", spec], &[]);
    assert_eq!(output.status.code(), Some(1));

    let output = ignition(&["run", spec], &[("FTP_USER", "ftpuser")]);
    assert_eq!(
        output.status.code(),
        Some(7),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("user")).unwrap(),
        "ftpuser"
    );

    let output = ignition(&["status", spec], &[]);
    assert_eq!(output.status.code(), Some(0));

    std::fs::remove_file(dir.path().join("user")).unwrap();
    let output = ignition(&["run", spec], &[("FTP_USER", "ftpuser")]);
    assert_eq!(output.status.code(), Some(7));
    assert!(!dir.path().join("user").exists());
}

#[test]
fn test_run_missing_config_exits_78() {
    let dir = tempfile::tempdir().unwrap();
    let spec = write_spec(dir.path());

    let output = ignition(&["run", spec.to_str().unwrap()], &[("FTP_USER", "")]);
    assert_eq!(output.status.code(), Some(78));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(
        stderr.matches("Missing config 'FTP_USER'").count(),
        1,
        "failure should be reported once: {}",
        stderr
    );
    assert!(!dir.path().join("data/.initialized").exists());
}

#[test]
fn test_run_missing_secret_exits_78() {
    let dir = tempfile::tempdir().unwrap();
    let spec = write_spec(dir.path());
    std::fs::remove_file(dir.path().join("secrets/ftp_password")).unwrap();

    let output = ignition(&["run", spec.to_str().unwrap()], &[("FTP_USER", "ftpuser")]);
    assert_eq!(output.status.code(), Some(78));
    assert!(!String::from_utf8_lossy(&output.stderr).contains("ftp-pass"));
}

#[test]
fn test_check_reports_down_dependency() {
    let dir = tempfile::tempdir().unwrap();
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let spec = dir.path().join("wordpress.yml");
    std::fs::write(
        &spec,
        format!(
            r#"
version: v1
service: wordpress
depends:
  - name: mariadb
    probe:
      type: tcp
      host: 127.0.0.1
      port: {port}
    probe_timeout: 500ms
marker:
  path: {root}/wp-config.php
launch:
  command: [php-fpm, -F]
"#,
            port = port,
            root = dir.path().display()
        ),
    )
    .unwrap();

    let output = ignition(&["check", "--json", spec.to_str().unwrap()], &[]);
    assert_eq!(output.status.code(), Some(69));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["all_up"], false);
    assert_eq!(report["probes"][0]["dependency"], "mariadb");
    assert_eq!(report["probes"][0]["up"], false);
    assert!(report["checked_at"].is_string());
}

#[test]
fn test_exec_hands_off_process_and_status() {
    let dir = tempfile::tempdir().unwrap();
    let spec = dir.path().join("nginx.yml");
    std::fs::write(
        &spec,
        format!(
            r#"
version: v1
service: nginx
marker:
  path: {root}/.initialized
launch:
  command: [/bin/sh, -c, 'echo "daemon pid=$$" >&2; exit 5']
"#,
            root = dir.path().display()
        ),
    )
    .unwrap();
    let logs = dir.path().join("logs");

    let child = Command::new(env!("CARGO_BIN_EXE_ignition"))
        .args(["--log-dir", logs.to_str().unwrap(), "run", spec.to_str().unwrap()])
        .env_remove("IGNITION_SPEC")
        .env_remove("IGNITION_SECRETS_DIR")
        .env_remove("IGNITION_LOG_DIR")
        .env_remove("IGNITION_LOG_FORMAT")
        .env_remove("RUST_LOG")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to run ignition");
    let pid = child.id();
    let output = child.wait_with_output().unwrap();
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(5), "stderr: {}", stderr);
    // The daemon runs as the same process and has the last word.
    assert!(stderr.contains("Launching service"));
    assert_eq!(
        stderr.trim_end().lines().last(),
        Some(format!("daemon pid={}", pid).as_str())
    );
    assert!(output.stdout.is_empty());

    let file_log = std::fs::read_to_string(logs.join("ignition.log")).unwrap();
    assert!(file_log.contains("Launching service"), "file log: {}", file_log);
}
