//! E2E test fixture: an isolated working directory with fake PostgreSQL tools.
//!
//! `psql` and `pg_dump` are replaced by shell scripts that read their
//! behavior from environment variables and append every call to
//! `pg-calls.log`, so scenarios can assert on what the orchestrator did.

use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tempfile::TempDir;

const FAKE_PSQL: &str = r#"#!/bin/sh
echo "psql $*" >> "$FAKE_PG_CALLS"
if [ -n "$FAKE_PSQL_FAIL" ]; then
    echo "psql: error: connection to server failed" >&2
    exit 2
fi
cat "$FAKE_PG_DATABASES"
"#;

const FAKE_PG_DUMP: &str = r#"#!/bin/sh
out=""
db=""
while [ $# -gt 0 ]; do
    case "$1" in
        -f) out="$2"; shift 2 ;;
        -h|-p|-U|-F) shift 2 ;;
        -*) shift ;;
        *) db="$1"; shift ;;
    esac
done
echo "pg_dump $db password=$PGPASSWORD" >> "$FAKE_PG_CALLS"
case " $FAKE_PG_DUMP_FAIL " in
    *" $db "*)
        printf 'PGDMP partial' > "$out"
        echo "pg_dump: error: database \"$db\" is broken" >&2
        exit 1
        ;;
esac
if [ -n "$FAKE_PG_DUMP_SLEEP" ]; then
    printf 'PGDMP partial' > "$out"
    exec sleep "$FAKE_PG_DUMP_SLEEP"
fi
printf 'PGDMP fake archive of %s\n' "$db" > "$out"
"#;

/// Isolated working directory for one scenario.
pub struct E2EFixture {
    pub scenario_name: String,
    pub temp_dir: TempDir,
    pub root: PathBuf,
    env: HashMap<String, String>,
    start_time: Instant,
    step_count: usize,
}

impl E2EFixture {
    /// Create a fixture whose server lists `databases`.
    pub fn new(scenario_name: &str, databases: &[&str]) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().to_path_buf();
        let bin = root.join("bin");
        fs::create_dir_all(&bin).expect("Failed to create bin dir");

        let psql = install_script(&bin, "psql", FAKE_PSQL);
        let pg_dump = install_script(&bin, "pg_dump", FAKE_PG_DUMP);

        let databases_file = root.join("databases.txt");
        let mut listing = databases.join("\n");
        listing.push('\n');
        fs::write(&databases_file, listing).expect("Failed to write database list");

        let mut env = HashMap::new();
        env.insert("PATH".to_string(), "/usr/bin:/bin".to_string());
        env.insert("HOME".to_string(), root.display().to_string());
        env.insert("PG_HOST".to_string(), "db.internal".to_string());
        env.insert("PG_USER".to_string(), "backup".to_string());
        env.insert("PG_PASSWORD".to_string(), "s3cret".to_string());
        env.insert("PSQL_BIN".to_string(), psql.display().to_string());
        env.insert("PG_DUMP_BIN".to_string(), pg_dump.display().to_string());
        env.insert(
            "FAKE_PG_DATABASES".to_string(),
            databases_file.display().to_string(),
        );
        env.insert(
            "FAKE_PG_CALLS".to_string(),
            root.join("pg-calls.log").display().to_string(),
        );

        println!();
        println!("{}", "█".repeat(70));
        println!("█ E2E SCENARIO: {scenario_name}");
        println!("{}", "█".repeat(70));
        println!("[E2E] Root: {root:?}");

        Self {
            scenario_name: scenario_name.to_string(),
            temp_dir,
            root,
            env,
            start_time: Instant::now(),
            step_count: 0,
        }
    }

    /// Set an environment variable for every later command.
    pub fn set_env(&mut self, key: &str, value: &str) {
        self.env.insert(key.to_string(), value.to_string());
    }

    pub fn remove_env(&mut self, key: &str) {
        self.env.remove(key);
    }

    /// Log a step in the E2E workflow.
    pub fn log_step(&mut self, description: &str) {
        self.step_count += 1;
        println!();
        println!("┌{}", "─".repeat(68));
        println!("│ STEP {}: {}", self.step_count, description);
        println!("│ Time: {:?}", self.start_time.elapsed());
        println!("└{}", "─".repeat(68));
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_pgbackup"));
        cmd.args(args)
            .env_clear()
            .envs(&self.env)
            .current_dir(&self.root);
        cmd
    }

    /// Run pgbackup and capture its output.
    pub fn run_pgbackup(&mut self, args: &[&str]) -> CommandOutput {
        println!("[CMD] pgbackup {}", args.join(" "));
        let start = Instant::now();
        let output = self
            .command(args)
            .output()
            .expect("Failed to execute pgbackup");
        let result = CommandOutput::from_output(&output, start.elapsed());
        result.print();
        result
    }

    /// Start pgbackup without waiting for it.
    pub fn spawn_pgbackup(&self, args: &[&str]) -> Child {
        println!("[CMD] pgbackup {} (background)", args.join(" "));
        self.command(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("Failed to spawn pgbackup")
    }

    pub fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    pub fn backups(&self) -> PathBuf {
        self.root.join("backups")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(".backup.lock")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Create a date partition `days_ago` days before today.
    pub fn create_partition(&self, days_ago: i64) -> PathBuf {
        let date = Self::today() - chrono::Duration::days(days_ago);
        let dir = self.backups().join(date.format("%Y-%m-%d").to_string());
        let db_dir = dir.join("orders");
        fs::create_dir_all(&db_dir).expect("Failed to create partition");
        fs::write(db_dir.join("orders-old.dump"), b"old").expect("Failed to write dump");
        dir
    }

    /// Dump artifacts written today for `database`.
    pub fn artifacts(&self, database: &str) -> Vec<PathBuf> {
        let dir = self
            .backups()
            .join(Self::today().format("%Y-%m-%d").to_string())
            .join(database);
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
        files.sort();
        files
    }

    /// Lines the fake tools appended to the call log.
    pub fn pg_calls(&self) -> Vec<String> {
        fs::read_to_string(self.root.join("pg-calls.log"))
            .map(|content| content.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Parsed records from today's main event log.
    pub fn events(&self) -> Vec<Value> {
        let name = format!("pg-backup-{}.log", Self::today().format("%Y-%m-%d"));
        read_json_lines(&self.log_dir().join(name))
    }

    /// Parsed records from today's error log.
    pub fn error_events(&self) -> Vec<Value> {
        let name = format!("pg-backup-error-{}.log", Self::today().format("%Y-%m-%d"));
        read_json_lines(&self.log_dir().join(name))
    }

    /// Event kinds from today's main log, in order.
    pub fn event_kinds(&self) -> Vec<String> {
        self.events()
            .iter()
            .filter_map(|record| record["event"].as_str().map(str::to_string))
            .collect()
    }

    /// Poll until `check` holds or `timeout` passes.
    pub fn wait_until(&self, timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if check() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        check()
    }

    /// Assert command succeeded.
    pub fn assert_success(&self, output: &CommandOutput, operation: &str) {
        assert!(
            output.success,
            "[E2E] {} failed with exit code {}: {}",
            operation, output.exit_code, output.stderr
        );
        println!("[ASSERT] {operation} - SUCCESS");
    }
}

impl Drop for E2EFixture {
    fn drop(&mut self) {
        println!();
        println!("█ E2E CLEANUP: {} ({:?})", self.scenario_name, self.start_time.elapsed());
    }
}

fn install_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).expect("Failed to write fake tool");
    let mut perms = fs::metadata(&path).expect("stat fake tool").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod fake tool");
    path
}

fn read_json_lines(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .map(|content| {
            content
                .lines()
                .map(|line| serde_json::from_str(line).expect("event log line is JSON"))
                .collect()
        })
        .unwrap_or_default()
}

/// Command output structure.
pub struct CommandOutput {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl CommandOutput {
    pub fn from_output(output: &std::process::Output, elapsed: Duration) -> Self {
        Self {
            success: output.status.success(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            elapsed,
        }
    }

    fn print(&self) {
        println!("[CMD] Exit: {} ({:?})", self.exit_code, self.elapsed);
        if !self.stdout.is_empty() {
            println!("[STDOUT] {}", self.stdout);
        }
        if !self.stderr.is_empty() {
            println!("[STDERR] {}", self.stderr);
        }
    }

    /// Parse stdout as the machine-mode JSON envelope.
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.stdout)
            .unwrap_or_else(|err| panic!("stdout is not JSON ({err}): {}", self.stdout))
    }
}
