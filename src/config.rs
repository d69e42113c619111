use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BackupError, Result};

/// File name looked up in the working directory when no explicit config is given.
pub const PROJECT_CONFIG_FILE: &str = "pgbackup.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load defaults, then the config file, then environment overrides.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        Self::load_with(explicit_path, |key| std::env::var(key).ok())
    }

    /// Same as [`Config::load`] with an explicit environment lookup.
    pub fn load_with<F>(explicit_path: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let path = explicit_path
            .map(PathBuf::from)
            .or_else(|| env("PGBACKUP_CONFIG").map(PathBuf::from));

        match path {
            Some(path) => {
                let patch = Self::load_patch(&path)?.ok_or_else(|| {
                    BackupError::Config(format!("config file {} not found", path.display()))
                })?;
                config.merge_patch(patch);
            }
            None => {
                if let Some(patch) = Self::load_patch(Path::new(PROJECT_CONFIG_FILE))? {
                    config.merge_patch(patch);
                }
            }
        }

        config.apply_env_overrides(&env)?;
        Ok(config)
    }

    fn load_patch(path: &Path) -> Result<Option<ConfigPatch>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|err| BackupError::Config(format!("read config {}: {err}", path.display())))?;
        let patch = toml::from_str(&raw)
            .map_err(|err| BackupError::Config(format!("parse config {}: {err}", path.display())))?;
        Ok(Some(patch))
    }

    fn merge_patch(&mut self, patch: ConfigPatch) {
        if let Some(patch) = patch.postgres {
            self.postgres.merge(patch);
        }
        if let Some(patch) = patch.backup {
            self.backup.merge(patch);
        }
        if let Some(patch) = patch.log {
            self.log.merge(patch);
        }
    }

    fn apply_env_overrides<F>(&mut self, env: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = env_string(env, "PG_HOST") {
            self.postgres.host = Some(value);
        }
        if let Some(value) = env_parse::<u16, _>(env, "PG_PORT")? {
            self.postgres.port = value;
        }
        if let Some(value) = env_string(env, "PG_USER") {
            self.postgres.user = Some(value);
        }
        if let Some(value) = env_string(env, "PG_PASSWORD") {
            self.postgres.password = Some(value);
        }
        if let Some(value) = env_string(env, "PSQL_BIN") {
            self.postgres.psql_bin = PathBuf::from(value);
        }
        if let Some(value) = env_string(env, "PG_DUMP_BIN") {
            self.postgres.pg_dump_bin = PathBuf::from(value);
        }
        if let Some(values) = env_list(env, "BACKUP_EXCLUDE_DATABASES") {
            self.postgres.exclude = values;
        }

        if let Some(value) = env_string(env, "BACKUP_DIR") {
            self.backup.dir = PathBuf::from(value);
        }
        if let Some(value) = env_parse::<u32, _>(env, "BACKUP_RETENTION_DAYS")? {
            self.backup.retention_days = value;
        }
        if let Some(value) = env_string(env, "BACKUP_LOCK_FILE") {
            self.backup.lock_file = PathBuf::from(value);
        }
        if let Some(value) = env_parse::<u64, _>(env, "BACKUP_DUMP_TIMEOUT_SECS")? {
            self.backup.dump_timeout_secs = (value > 0).then_some(value);
        }
        if let Some(value) = env_bool(env, "BACKUP_RECLAIM_STALE_LOCK")? {
            self.backup.reclaim_stale_lock = value;
        }

        if let Some(value) = env_string(env, "BACKUP_LOG_DIR") {
            self.log.dir = PathBuf::from(value);
        }
        if let Some(value) = env_parse::<u32, _>(env, "BACKUP_LOG_RETENTION_DAYS")? {
            self.log.retention_days = value;
        }

        Ok(())
    }

    /// Check required values and freeze the configuration for a run.
    pub fn validate(&self) -> Result<RunSettings> {
        let host = required(self.postgres.host.as_deref(), "PG_HOST")?;
        let user = required(self.postgres.user.as_deref(), "PG_USER")?;
        let password = required(self.postgres.password.as_deref(), "PG_PASSWORD")?;

        if self.postgres.port == 0 {
            return Err(BackupError::Config("PG_PORT must be non-zero".to_string()));
        }

        Ok(RunSettings {
            connection: ConnectionParams {
                host: host.to_string(),
                port: self.postgres.port,
                user: user.to_string(),
                password: password.to_string(),
            },
            tools: PgTools {
                psql: self.postgres.psql_bin.clone(),
                pg_dump: self.postgres.pg_dump_bin.clone(),
            },
            exclude: self.postgres.exclude.clone(),
            backup_root: self.backup.dir.clone(),
            retention_days: self.backup.retention_days,
            lock_path: self.backup.lock_file.clone(),
            reclaim_stale_lock: self.backup.reclaim_stale_lock,
            dump_timeout: self.backup.dump_timeout_secs.map(Duration::from_secs),
            log_dir: self.log.dir.clone(),
        })
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default = "default_psql_bin")]
    pub psql_bin: PathBuf,
    #[serde(default = "default_pg_dump_bin")]
    pub pg_dump_bin: PathBuf,
    /// Databases skipped in addition to templates and `postgres`.
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_port(),
            user: None,
            password: None,
            psql_bin: default_psql_bin(),
            pg_dump_bin: default_pg_dump_bin(),
            exclude: Vec::new(),
        }
    }
}

impl std::fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("psql_bin", &self.psql_bin)
            .field("pg_dump_bin", &self.pg_dump_bin)
            .field("exclude", &self.exclude)
            .finish()
    }
}

impl PostgresConfig {
    fn merge(&mut self, patch: PostgresPatch) {
        if let Some(value) = patch.host {
            self.host = Some(value);
        }
        if let Some(value) = patch.port {
            self.port = value;
        }
        if let Some(value) = patch.user {
            self.user = Some(value);
        }
        if let Some(value) = patch.password {
            self.password = Some(value);
        }
        if let Some(value) = patch.psql_bin {
            self.psql_bin = value;
        }
        if let Some(value) = patch.pg_dump_bin {
            self.pg_dump_bin = value;
        }
        if let Some(values) = patch.exclude {
            self.exclude = values;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_backup_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_lock_file")]
    pub lock_file: PathBuf,
    /// Kill a dump after this many seconds. Unset means wait forever.
    #[serde(default)]
    pub dump_timeout_secs: Option<u64>,
    #[serde(default)]
    pub reclaim_stale_lock: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: default_backup_dir(),
            retention_days: default_retention_days(),
            lock_file: default_lock_file(),
            dump_timeout_secs: None,
            reclaim_stale_lock: false,
        }
    }
}

impl BackupConfig {
    fn merge(&mut self, patch: BackupPatch) {
        if let Some(value) = patch.dir {
            self.dir = value;
        }
        if let Some(value) = patch.retention_days {
            self.retention_days = value;
        }
        if let Some(value) = patch.lock_file {
            self.lock_file = value;
        }
        if let Some(value) = patch.dump_timeout_secs {
            self.dump_timeout_secs = (value > 0).then_some(value);
        }
        if let Some(value) = patch.reclaim_stale_lock {
            self.reclaim_stale_lock = value;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            retention_days: default_log_retention_days(),
        }
    }
}

impl LogConfig {
    fn merge(&mut self, patch: LogPatch) {
        if let Some(value) = patch.dir {
            self.dir = value;
        }
        if let Some(value) = patch.retention_days {
            self.retention_days = value;
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    postgres: Option<PostgresPatch>,
    backup: Option<BackupPatch>,
    log: Option<LogPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct PostgresPatch {
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    psql_bin: Option<PathBuf>,
    pg_dump_bin: Option<PathBuf>,
    exclude: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct BackupPatch {
    dir: Option<PathBuf>,
    retention_days: Option<u32>,
    lock_file: Option<PathBuf>,
    dump_timeout_secs: Option<u64>,
    reclaim_stale_lock: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LogPatch {
    dir: Option<PathBuf>,
    retention_days: Option<u32>,
}

/// Server connection parameters handed to `psql` and `pg_dump`.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Paths to the PostgreSQL client binaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgTools {
    pub psql: PathBuf,
    pub pg_dump: PathBuf,
}

impl Default for PgTools {
    fn default() -> Self {
        Self {
            psql: default_psql_bin(),
            pg_dump: default_pg_dump_bin(),
        }
    }
}

/// Immutable settings for one run, built once by [`Config::validate`].
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub connection: ConnectionParams,
    pub tools: PgTools,
    pub exclude: Vec<String>,
    pub backup_root: PathBuf,
    pub retention_days: u32,
    pub lock_path: PathBuf,
    pub reclaim_stale_lock: bool,
    pub dump_timeout: Option<Duration>,
    pub log_dir: PathBuf,
}

fn default_port() -> u16 {
    5432
}

fn default_psql_bin() -> PathBuf {
    PathBuf::from("psql")
}

fn default_pg_dump_bin() -> PathBuf {
    PathBuf::from("pg_dump")
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("./backups")
}

const fn default_retention_days() -> u32 {
    7
}

fn default_lock_file() -> PathBuf {
    PathBuf::from(".backup.lock")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

const fn default_log_retention_days() -> u32 {
    14
}

fn required<'a>(value: Option<&'a str>, key: &str) -> Result<&'a str> {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(BackupError::MissingConfig(key.to_string())),
    }
}

fn env_string<F>(env: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    env(key).filter(|value| !value.trim().is_empty())
}

fn env_bool<F>(env: &F, key: &str) -> Result<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = env_string(env, key) else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(BackupError::Config(format!("invalid {key}: {raw}"))),
    }
}

fn env_parse<T, F>(env: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = env_string(env, key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|err| BackupError::Config(format!("invalid {key}: {raw} ({err})")))
}

fn env_list<F>(env: &F, key: &str) -> Option<Vec<String>>
where
    F: Fn(&str) -> Option<String>,
{
    env_string(env, key).map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .collect()
    })
}
