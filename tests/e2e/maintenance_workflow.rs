//! E2E Scenario: lock maintenance
//!
//! - `unlock` clears a marker left by a dead run
//! - opt-in stale lock reclamation lets a run proceed

use std::fs;

use super::fixture::E2EFixture;

#[test]
fn test_unlock_removes_leftover_marker() {
    let mut fixture = E2EFixture::new("unlock", &["orders"]);
    fs::write(fixture.lock_path(), "999999").unwrap();

    fixture.log_step("Status shows the stale marker");
    let status = fixture.run_pgbackup(&["-m", "status"]);
    let lock = &status.json()["data"]["lock"];
    assert_eq!(lock["pid"], 999_999);
    assert_eq!(lock["alive"], false);

    fixture.log_step("Unlock");
    let output = fixture.run_pgbackup(&["-m", "unlock"]);
    fixture.assert_success(&output, "pgbackup unlock");
    assert_eq!(output.json()["data"]["removed"], true);
    assert!(!fixture.lock_path().exists());

    fixture.log_step("Unlock again is a no-op");
    let again = fixture.run_pgbackup(&["unlock"]);
    fixture.assert_success(&again, "pgbackup unlock (no marker)");
    assert!(again.stdout.contains("No lock marker"));

    fixture.log_step("A run now proceeds");
    let run = fixture.run_pgbackup(&["run"]);
    fixture.assert_success(&run, "pgbackup run");
    assert_eq!(fixture.artifacts("orders").len(), 1);
}

#[test]
fn test_stale_marker_reclaimed_when_enabled() {
    let mut fixture = E2EFixture::new("reclaim_stale", &["orders"]);
    fixture.set_env("BACKUP_RECLAIM_STALE_LOCK", "true");
    fs::write(fixture.lock_path(), "999999").unwrap();

    let output = fixture.run_pgbackup(&["run"]);
    fixture.assert_success(&output, "pgbackup run over stale marker");

    assert_eq!(fixture.artifacts("orders").len(), 1);
    assert!(!fixture.lock_path().exists());
    let kinds = fixture.event_kinds();
    assert_eq!(kinds[0], "stale_lock_reclaimed");
    assert_eq!(kinds.last().map(String::as_str), Some("backup_all_complete"));
}
