//! E2E Scenario: reporting after runs
//!
//! - `status` aggregates artifacts and outcome events
//! - `logs` lists files, prints one and refuses traversal

use std::fs;

use super::fixture::E2EFixture;

#[test]
fn test_status_reflects_completed_runs() {
    let mut fixture = E2EFixture::new("status_after_runs", &["orders", "users"]);
    fixture.set_env("FAKE_PG_DUMP_FAIL", "users");

    fixture.log_step("Run twice");
    for _ in 0..2 {
        let output = fixture.run_pgbackup(&["run"]);
        fixture.assert_success(&output, "pgbackup run");
    }

    fixture.log_step("Collect status");
    let output = fixture.run_pgbackup(&["-m", "status", "--recent", "3"]);
    fixture.assert_success(&output, "pgbackup status");
    let data = &output.json()["data"];

    assert_eq!(data["total_backups"], 2);
    assert_eq!(data["events"]["success"], 2);
    assert_eq!(data["events"]["failure"], 2);
    assert_eq!(
        data["backup_dates"],
        serde_json::json!([E2EFixture::today().format("%Y-%m-%d").to_string()])
    );
    assert!(data.get("lock").is_none());

    let recent = data["recent"].as_array().unwrap();
    assert_eq!(recent.len(), 3);
    assert_eq!(recent[2]["event"], "backup_all_complete");

    let names: Vec<_> = data["log_files"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.iter().any(|n| n.starts_with("pg-backup-error-")));
}

#[test]
fn test_status_on_empty_directory() {
    let mut fixture = E2EFixture::new("status_empty", &[]);
    let output = fixture.run_pgbackup(&["-m", "status"]);
    fixture.assert_success(&output, "pgbackup status");

    let data = &output.json()["data"];
    assert_eq!(data["total_backups"], 0);
    assert_eq!(data["total_size_mb"], 0.0);
    assert_eq!(data["log_files"], serde_json::json!([]));
    assert!(!fixture.backups().exists(), "status must not create directories");
    assert!(!fixture.log_dir().exists(), "status must not create directories");
}

#[test]
fn test_logs_list_and_print() {
    let mut fixture = E2EFixture::new("logs", &["orders"]);
    let output = fixture.run_pgbackup(&["run"]);
    fixture.assert_success(&output, "pgbackup run");

    let name = format!("pg-backup-{}.log", E2EFixture::today().format("%Y-%m-%d"));

    let listing = fixture.run_pgbackup(&["logs"]);
    fixture.assert_success(&listing, "pgbackup logs");
    assert!(listing.stdout.contains(&name));

    let printed = fixture.run_pgbackup(&["logs", &name]);
    fixture.assert_success(&printed, "pgbackup logs FILE");
    assert_eq!(
        printed.stdout,
        fs::read_to_string(fixture.log_dir().join(&name)).unwrap()
    );
    assert!(printed.stdout.contains("backup_all_complete"));
}

#[test]
fn test_logs_refuses_paths_outside_log_dir() {
    let mut fixture = E2EFixture::new("logs_traversal", &[]);
    fs::create_dir_all(fixture.log_dir()).unwrap();
    fs::write(fixture.root.join("secret.txt"), "do not print").unwrap();

    let output = fixture.run_pgbackup(&["-m", "logs", "../secret.txt"]);
    assert_eq!(output.exit_code, 1);
    assert_eq!(output.json()["status"]["error"]["code"], "LOG_NOT_FOUND");
    assert!(!output.stdout.contains("do not print"));
}
