use std::time::Duration;

use anyhow::Context;
use rusqlite::{Connection, OpenFlags};
use serde::Deserialize;

use crate::error::Result;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Environment variables with this prefix override file settings,
/// e.g. `CORMORANT_DB_PATH`.
pub const ENV_PREFIX: &str = "CORMORANT";

/// SQLite connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Path (or `file:` URI) of the SQLite database.
    ///
    /// Defaults to `:memory:`. Every call opens its own connection, so an
    /// in-memory database is discarded when the call returns; [`load`](Self::load)
    /// therefore requires the path to be set explicitly.
    pub db_path: String,
    /// Create the database file when it does not exist yet.
    pub create_if_missing: bool,
    /// How long a connection waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            db_path: ":memory:".to_string(),
            create_if_missing: true,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl SqliteConfig {
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }

    /// Reads settings from `file` (format picked by extension), then applies
    /// `CORMORANT_*` environment overrides. `db_path` must be present in one
    /// of them; other missing keys keep their defaults.
    pub fn load(file: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(file))
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()?;
        settings.get_string("db_path")?;
        Ok(settings.try_deserialize()?)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub(crate) fn open(&self) -> anyhow::Result<Connection> {
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        let connection = Connection::open_with_flags(&self.db_path, flags)
            .with_context(|| format!("opening sqlite database at {}", self.db_path))?;
        connection
            .busy_timeout(self.busy_timeout())
            .context("setting busy timeout")?;
        Ok(connection)
    }
}
