//! PgClient - wrapper around the `psql` and `pg_dump` binaries.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::{ConnectionParams, PgTools, RunSettings};
use crate::error::{BackupError, DumpError, Result};

use super::PgOperations;

/// Databases that are never backed up, whatever the server reports.
const MAINTENANCE_DATABASE: &str = "postgres";

/// Query listing user databases: no templates, no maintenance database.
pub const LIST_DATABASES_QUERY: &str = "SELECT datname FROM pg_database \
     WHERE datistemplate = false AND datname NOT IN ('postgres') ORDER BY datname;";

/// Longest stderr excerpt carried into an error message.
const STDERR_EXCERPT: usize = 2000;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Client that shells out to the PostgreSQL command-line tools.
#[derive(Debug, Clone)]
pub struct PgClient {
    connection: ConnectionParams,
    tools: PgTools,
    exclude: Vec<String>,
    dump_timeout: Option<Duration>,
}

impl PgClient {
    /// Create a client using the given connection and binaries.
    pub fn new(connection: ConnectionParams, tools: PgTools) -> Self {
        Self {
            connection,
            tools,
            exclude: Vec::new(),
            dump_timeout: None,
        }
    }

    /// Skip these databases in addition to templates and `postgres`.
    #[must_use]
    pub fn with_exclusions(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    /// Kill a dump that runs longer than `timeout`.
    #[must_use]
    pub fn with_dump_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.dump_timeout = timeout;
        self
    }

    fn command(&self, program: &Path) -> Command {
        let mut cmd = Command::new(program);
        cmd.arg("-h")
            .arg(&self.connection.host)
            .arg("-p")
            .arg(self.connection.port.to_string())
            .arg("-U")
            .arg(&self.connection.user)
            .arg("-w")
            .env("PGPASSWORD", &self.connection.password)
            .stdin(Stdio::null());
        cmd
    }
}

impl PgOperations for PgClient {
    fn list_databases(&self) -> Result<Vec<String>> {
        let program = &self.tools.psql;
        let mut cmd = self.command(program);
        cmd.args(["-At", "-c", LIST_DATABASES_QUERY]);

        debug!(program = %program.display(), "listing databases");
        let output = cmd.output().map_err(|err| {
            BackupError::Enumeration(format!("failed to run {}: {err}", program.display()))
        })?;

        if !output.status.success() {
            return Err(BackupError::Enumeration(format!(
                "{} exited with {}: {}",
                program.display(),
                output.status,
                stderr_excerpt(&output.stderr)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_database_list(&stdout, &self.exclude))
    }

    fn dump_database(&self, database: &str, destination: &Path) -> std::result::Result<(), DumpError> {
        let program = &self.tools.pg_dump;
        let mut cmd = self.command(program);
        cmd.args(["-F", "c", "-b", "-f"])
            .arg(destination)
            .arg(database)
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        debug!(program = %program.display(), database, "starting dump");
        let mut child = cmd.spawn().map_err(|err| DumpError::Spawn {
            program: program_name(program),
            reason: err.to_string(),
        })?;

        // Drain stderr on its own thread so a chatty dump cannot fill the pipe
        // while we wait on it.
        let stderr_reader = spawn_stderr_reader(&mut child);
        let waited = wait_with_deadline(&mut child, self.dump_timeout);
        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        match waited {
            Ok(Some(status)) if status.success() => Ok(()),
            Ok(Some(status)) => Err(DumpError::ExitStatus {
                program: program_name(program),
                status: status.to_string(),
                stderr: stderr_excerpt(&stderr),
            }),
            Ok(None) => Err(DumpError::Timeout {
                program: program_name(program),
                timeout_secs: self.dump_timeout.map_or(0, |t| t.as_secs()),
            }),
            Err(err) => Err(DumpError::Spawn {
                program: program_name(program),
                reason: format!("wait failed: {err}"),
            }),
        }
    }
}

/// Turn `psql -At` output into a list of database names.
#[must_use]
pub fn parse_database_list(stdout: &str, exclude: &[String]) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter(|name| *name != MAINTENANCE_DATABASE)
        .filter(|name| !exclude.iter().any(|excluded| excluded == name))
        .map(str::to_string)
        .collect()
}

fn spawn_stderr_reader(child: &mut Child) -> Option<JoinHandle<Vec<u8>>> {
    let mut stderr = child.stderr.take()?;
    Some(std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stderr.read_to_end(&mut buf);
        buf
    }))
}

/// Wait for the child, killing it once `timeout` elapses.
///
/// Returns `Ok(None)` when the child was killed for running too long.
fn wait_with_deadline(
    child: &mut Child,
    timeout: Option<Duration>,
) -> std::io::Result<Option<ExitStatus>> {
    let Some(timeout) = timeout else {
        return child.wait().map(Some);
    };

    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= timeout {
            warn!(pid = child.id(), ?timeout, "dump timed out, killing");
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL.min(timeout));
    }
}

fn stderr_excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_EXCERPT {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_EXCERPT;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}

fn program_name(program: &Path) -> String {
    program
        .file_name()
        .map_or_else(|| program.display().to_string(), |name| name.to_string_lossy().into_owned())
}

impl From<&RunSettings> for PgClient {
    fn from(settings: &RunSettings) -> Self {
        Self::new(settings.connection.clone(), settings.tools.clone())
            .with_exclusions(settings.exclude.clone())
            .with_dump_timeout(settings.dump_timeout)
    }
}
