//! E2E Scenario: backup runs
//!
//! - Every listed database is dumped once, into the dated layout
//! - A failing dump does not stop the others
//! - A held lock makes the run a no-op that exits 0
//! - Expired date partitions are removed before dumping
//! - Listing failures and missing config exit 1 and leave no marker

use std::fs;
use std::time::Duration;

use super::fixture::E2EFixture;

#[test]
fn test_full_run_dumps_every_database() {
    let mut fixture = E2EFixture::new("full_run", &["inventory", "orders"]);

    fixture.log_step("Run a backup");
    let output = fixture.run_pgbackup(&["-m", "run"]);
    fixture.assert_success(&output, "pgbackup run");

    let json = output.json();
    assert_eq!(json["status"], "ok");
    let outcomes = json["data"]["outcomes"].as_array().unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o["status"] == "success"));

    fixture.log_step("Verify artifacts and lock");
    for db in ["inventory", "orders"] {
        let files = fixture.artifacts(db);
        assert_eq!(files.len(), 1, "one artifact for {db}");
        let name = files[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(&format!("{db}-")) && name.ends_with(".dump"));
        let content = fs::read_to_string(&files[0]).unwrap();
        assert!(content.contains(db));
    }
    assert!(!fixture.lock_path().exists(), "lock marker must be removed");

    fixture.log_step("Verify tool invocations");
    let calls = fixture.pg_calls();
    assert!(calls[0].starts_with("psql -h db.internal -p 5432 -U backup"));
    assert!(calls[0].contains("-At -c SELECT datname FROM pg_database"));
    assert_eq!(
        &calls[1..],
        ["pg_dump inventory password=s3cret", "pg_dump orders password=s3cret"]
    );

    fixture.log_step("Verify event log");
    assert_eq!(
        fixture.event_kinds(),
        vec![
            "list_databases_start",
            "list_databases_success",
            "backup_start",
            "backup_success",
            "backup_start",
            "backup_success",
            "backup_all_complete",
        ]
    );
    let success = &fixture.events()[3];
    assert_eq!(success["database"], "inventory");
    assert_eq!(success["level"], "info");
    assert!(success["sizeMB"].is_number());
    assert!(success["durationMs"].as_u64().unwrap() > 0);
    assert!(success["time"].is_string());
}

#[test]
fn test_failed_dump_is_isolated() {
    let mut fixture = E2EFixture::new("failed_dump", &["alpha", "broken", "gamma"]);
    fixture.set_env("FAKE_PG_DUMP_FAIL", "broken");

    let output = fixture.run_pgbackup(&["-m", "run"]);
    fixture.assert_success(&output, "pgbackup run with one failure");

    let json = output.json();
    let statuses: Vec<_> = json["data"]["outcomes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["status"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(statuses, vec!["success", "failure", "success"]);

    assert_eq!(fixture.artifacts("alpha").len(), 1);
    assert!(
        fixture.artifacts("broken").is_empty(),
        "partial output of a failed dump is removed"
    );
    assert_eq!(fixture.artifacts("gamma").len(), 1);

    let status = fixture.run_pgbackup(&["-m", "status"]);
    assert_eq!(status.json()["data"]["total_backups"], 2);

    let errors = fixture.error_events();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["event"], "backup_failed");
    assert_eq!(errors[0]["database"], "broken");
    assert!(errors[0]["error"].as_str().unwrap().contains("is broken"));
    assert!(errors[0].get("sizeMB").is_none());

    let complete = fixture.events().pop().unwrap();
    assert_eq!(complete["event"], "backup_all_complete");
    assert_eq!(complete["succeeded"], 2);
    assert_eq!(complete["failed"], 1);
}

#[test]
fn test_held_lock_exits_without_work() {
    let mut fixture = E2EFixture::new("held_lock", &["orders"]);
    fs::write(fixture.lock_path(), "4242").unwrap();
    let old = fixture.create_partition(60);

    let output = fixture.run_pgbackup(&["-m", "run"]);
    fixture.assert_success(&output, "pgbackup run while locked");

    let json = output.json();
    assert_eq!(json["data"]["already_running"], true);
    assert_eq!(json["data"]["pid"], 4242);

    assert!(fixture.pg_calls().is_empty(), "no enumeration, no dumps");
    assert!(old.exists(), "no retention sweep");
    assert_eq!(fs::read_to_string(fixture.lock_path()).unwrap(), "4242");
    assert_eq!(fixture.event_kinds(), vec!["backup_already_running"]);
    assert_eq!(fixture.events()[0]["lockFile"], ".backup.lock");
}

#[test]
fn test_retention_removes_only_expired_partitions() {
    let mut fixture = E2EFixture::new("retention", &["orders"]);
    fixture.set_env("BACKUP_RETENTION_DAYS", "7");
    let expired = fixture.create_partition(8);
    let boundary = fixture.create_partition(7);
    let recent = fixture.create_partition(6);
    let manual = fixture.backups().join("manual-export");
    fs::create_dir_all(&manual).unwrap();

    let output = fixture.run_pgbackup(&["run"]);
    fixture.assert_success(&output, "pgbackup run with retention");

    assert!(!expired.exists());
    assert!(!boundary.exists(), "day D+7 has begun, so D is past a 7 day window");
    assert!(recent.exists());
    assert!(manual.exists());

    let cleanups: Vec<_> = fixture
        .events()
        .into_iter()
        .filter(|e| e["event"] == "backup_retention_cleanup")
        .collect();
    assert_eq!(cleanups.len(), 2);
    for (event, days_ago) in cleanups.iter().zip([8, 7]) {
        let date = (E2EFixture::today() - chrono::Duration::days(days_ago))
            .format("%Y-%m-%d")
            .to_string();
        assert!(event["deleted"].as_str().unwrap().ends_with(&date));
    }
}

#[test]
fn test_enumeration_failure_exits_one_and_releases_lock() {
    let mut fixture = E2EFixture::new("enumeration_failure", &["orders"]);
    fixture.set_env("FAKE_PSQL_FAIL", "1");

    let output = fixture.run_pgbackup(&["-m", "run"]);
    assert_eq!(output.exit_code, 1);
    let json = output.json();
    assert_eq!(json["status"]["error"]["code"], "ENUMERATION_FAILED");

    assert!(!fixture.lock_path().exists());
    assert!(fixture.pg_calls().iter().all(|c| c.starts_with("psql")));
    assert_eq!(
        fixture.event_kinds(),
        vec!["list_databases_start", "list_databases_failed"]
    );
}

#[test]
fn test_missing_credentials_is_a_startup_error() {
    let mut fixture = E2EFixture::new("missing_credentials", &["orders"]);
    fixture.remove_env("PG_PASSWORD");

    let output = fixture.run_pgbackup(&["-m", "run"]);
    assert_eq!(output.exit_code, 1);
    let json = output.json();
    assert_eq!(json["status"]["error"]["code"], "CONFIG_MISSING_REQUIRED");
    assert_eq!(json["status"]["error"]["context"]["config_key"], "PG_PASSWORD");

    assert!(!fixture.lock_path().exists());
    assert!(fixture.pg_calls().is_empty());
    assert_eq!(fixture.event_kinds(), vec!["startup_error"]);
    assert_eq!(fixture.error_events().len(), 1);
}

#[test]
fn test_slow_dump_is_killed_after_timeout() {
    let mut fixture = E2EFixture::new("dump_timeout", &["slow", "fast"]);
    fixture.set_env("BACKUP_DUMP_TIMEOUT_SECS", "1");
    fixture.set_env("FAKE_PG_DUMP_SLEEP", "5");

    let output = fixture.run_pgbackup(&["-m", "run"]);
    fixture.assert_success(&output, "pgbackup run with timeout");
    assert!(output.elapsed < Duration::from_secs(9));

    let failures: Vec<_> = fixture
        .events()
        .into_iter()
        .filter(|e| e["event"] == "backup_failed")
        .collect();
    assert_eq!(failures.len(), 2);
    assert!(failures[0]["error"].as_str().unwrap().contains("timeout"));
    assert!(fixture.artifacts("slow").is_empty());
}

#[test]
fn test_sigterm_releases_lock() {
    let mut fixture = E2EFixture::new("sigterm", &["orders"]);
    fixture.set_env("FAKE_PG_DUMP_SLEEP", "10");

    fixture.log_step("Start a run that blocks in pg_dump");
    let child = fixture.spawn_pgbackup(&["run"]);
    let started = fixture.wait_until(Duration::from_secs(10), || {
        fixture.lock_path().exists() && fixture.pg_calls().iter().any(|c| c.starts_with("pg_dump"))
    });
    assert!(started, "run never reached pg_dump");

    fixture.log_step("Send SIGTERM");
    let status = std::process::Command::new("kill")
        .args(["-TERM", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    let output = child.wait_with_output().unwrap();
    assert_eq!(output.status.code(), Some(143));
    assert!(!fixture.lock_path().exists());
    assert!(fixture.event_kinds().contains(&"backup_interrupted".to_string()));
}
