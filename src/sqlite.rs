//! Statement execution against SQLite.
//!
//! Every call opens its own connection and releases it before returning.
//! Writes run inside a transaction: commit on success, rollback and return
//! the error on failure. Selects keep the connection and cursor open only
//! for as long as the consumer closure runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rusqlite::functions::FunctionFlags;
use rusqlite::types::ToSql;
use rusqlite::{Connection, Rows};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::SqliteConfig;
use crate::entity::Entity;
use crate::error::{Operation, OrmError, Result};
use crate::hydrate::HydrationPlan;
use crate::registry::{EntityIdentity, Registry};
use crate::statement::{SqlQuery, StatementGenerator};

// VM instructions between cancellation checks.
const PROGRESS_INTERVAL: i32 = 1_000;

/// Opens connections for the engine.
pub trait Connector: Send + Sync {
    fn connect(&self) -> anyhow::Result<Connection>;
}

impl Connector for SqliteConfig {
    fn connect(&self) -> anyhow::Result<Connection> {
        self.open()
    }
}

impl<F> Connector for F
where
    F: Fn() -> anyhow::Result<Connection> + Send + Sync,
{
    fn connect(&self) -> anyhow::Result<Connection> {
        self()
    }
}

/// Cooperative cancellation flag shared with running statements.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-call cancellation and deadline.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    pub cancel: Option<CancelToken>,
    pub timeout: Option<Duration>,
}

impl ExecutionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    /// Interrupts statements on `connection` once cancelled or past the deadline.
    fn arm(&self, connection: &Connection) {
        if self.cancel.is_none() && self.timeout.is_none() {
            return;
        }
        let cancel = self.cancel.clone();
        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);
        connection.progress_handler(
            PROGRESS_INTERVAL,
            Some(move || {
                cancel.as_ref().is_some_and(CancelToken::is_cancelled)
                    || deadline.is_some_and(|deadline| Instant::now() >= deadline)
            }),
        );
    }
}

/// Registers `NEWID()` and `NEWSEQUENTIALID()` on `connection`.
pub fn register_key_functions(connection: &Connection) -> rusqlite::Result<()> {
    connection.create_scalar_function("NEWID", 0, FunctionFlags::SQLITE_UTF8, |_| {
        Ok(Uuid::new_v4().hyphenated().to_string())
    })?;
    connection.create_scalar_function("NEWSEQUENTIALID", 0, FunctionFlags::SQLITE_UTF8, |_| {
        Ok(Uuid::now_v7().hyphenated().to_string())
    })?;
    Ok(())
}

/// Lazily hydrated result rows of a select.
///
/// Forward-only; the first error ends the sequence.
pub struct Entities<'stmt, E> {
    rows: Rows<'stmt>,
    plan: HydrationPlan<E>,
    identity: EntityIdentity,
    finished: bool,
}

impl<E: Entity> Iterator for Entities<'_, E> {
    type Item = Result<E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.rows.next() {
            Ok(Some(row)) => {
                let entity = self.plan.hydrate(row);
                if entity.is_err() {
                    self.finished = true;
                }
                Some(entity)
            }
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(source) => {
                self.finished = true;
                Some(Err(OrmError::execution(&self.identity, Operation::Select, source)))
            }
        }
    }
}

/// Entry point for entity operations.
pub struct Database {
    registry: Arc<Registry>,
    connector: Box<dyn Connector>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// A database with its own, empty registry.
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self::with_registry(connector, Arc::new(Registry::new()))
    }

    /// A database sharing `registry` with other callers.
    pub fn with_registry(connector: impl Connector + 'static, registry: Arc<Registry>) -> Self {
        Self {
            registry,
            connector: Box::new(connector),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn statements(&self) -> StatementGenerator<'_> {
        StatementGenerator::new(&self.registry)
    }

    /// Whether a connection can be opened at all.
    pub fn can_connect(&self) -> bool {
        match self.connector.connect() {
            Ok(_) => true,
            Err(err) => {
                debug!(error = %err, "connectivity probe failed");
                false
            }
        }
    }

    pub fn insert<E: Entity>(&self, entity: &E) -> Result<usize> {
        self.insert_with(entity, &ExecutionOptions::default())
    }

    pub fn insert_with<E: Entity>(&self, entity: &E, options: &ExecutionOptions) -> Result<usize> {
        let query = self.statements().insert(entity)?;
        self.execute(&E::identity(), Operation::Insert, &query, options)
    }

    /// Returns the number of rows updated. Zero means the key was not found
    /// or, for entities with a row version, the row changed since it was read.
    pub fn update<E: Entity>(&self, entity: &E) -> Result<usize> {
        self.update_with(entity, &ExecutionOptions::default())
    }

    pub fn update_with<E: Entity>(&self, entity: &E, options: &ExecutionOptions) -> Result<usize> {
        let query = self.statements().update(entity)?;
        self.execute(&E::identity(), Operation::Update, &query, options)
    }

    pub fn delete<E: Entity>(&self, entity: &E) -> Result<usize> {
        self.delete_with(entity, &ExecutionOptions::default())
    }

    pub fn delete_with<E: Entity>(&self, entity: &E, options: &ExecutionOptions) -> Result<usize> {
        let query = self.statements().delete(entity)?;
        self.execute(&E::identity(), Operation::Delete, &query, options)
    }

    /// Runs `SELECT * FROM <table>` and hands the lazy row sequence to `consume`.
    ///
    /// The connection is closed when `consume` returns, whether or not it
    /// drained the sequence.
    pub fn select<E, R, F>(&self, consume: F) -> Result<R>
    where
        E: Entity,
        F: FnOnce(Entities<'_, E>) -> R,
    {
        self.select_with(&ExecutionOptions::default(), consume)
    }

    pub fn select_with<E, R, F>(&self, options: &ExecutionOptions, consume: F) -> Result<R>
    where
        E: Entity,
        F: FnOnce(Entities<'_, E>) -> R,
    {
        let identity = E::identity();
        let accessors = self
            .registry
            .register::<E>()
            .map_err(|err| err.during(Operation::Select))?;
        let query = self.statements().select_all(&identity);

        let connection = self.open(&identity, Operation::Select, options)?;
        let mut statement = connection
            .prepare(&query.statement)
            .map_err(|source| OrmError::execution(&identity, Operation::Select, source))?;
        let plan = HydrationPlan::new(&self.registry, accessors, statement.column_names());
        debug!(entity = %identity, sql = %query.statement, mapped = plan.mapped_columns(), "select");

        let rows = statement
            .query([])
            .map_err(|source| OrmError::execution(&identity, Operation::Select, source))?;
        Ok(consume(Entities {
            rows,
            plan,
            identity: identity.clone(),
            finished: false,
        }))
    }

    /// Collects every row; fails on the first row that cannot be read.
    pub fn select_all<E: Entity>(&self) -> Result<Vec<E>> {
        self.select::<E, _, _>(|rows| rows.collect::<Result<Vec<E>>>())?
    }

    pub fn select_all_with<E: Entity>(&self, options: &ExecutionOptions) -> Result<Vec<E>> {
        self.select_with::<E, _, _>(options, |rows| rows.collect::<Result<Vec<E>>>())?
    }

    fn open(
        &self,
        identity: &EntityIdentity,
        operation: Operation,
        options: &ExecutionOptions,
    ) -> Result<Connection> {
        if options.is_cancelled() {
            return Err(OrmError::Cancelled {
                entity: identity.clone(),
                operation,
            });
        }
        let connection = self
            .connector
            .connect()
            .map_err(|source| OrmError::Connection {
                entity: identity.clone(),
                operation,
                source,
            })?;
        register_key_functions(&connection).map_err(|source| OrmError::Connection {
            entity: identity.clone(),
            operation,
            source: source.into(),
        })?;
        options.arm(&connection);
        Ok(connection)
    }

    /// Executes one write statement in its own transaction.
    fn execute(
        &self,
        identity: &EntityIdentity,
        operation: Operation,
        query: &SqlQuery,
        options: &ExecutionOptions,
    ) -> Result<usize> {
        let mut connection = self.open(identity, operation, options)?;
        let transaction = connection
            .transaction()
            .map_err(|source| OrmError::execution(identity, operation, source))?;

        let bound: Vec<(&str, &dyn ToSql)> = query
            .params
            .values
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect();
        debug!(entity = %identity, %operation, sql = %query.statement, params = bound.len(), "executing");

        match transaction.execute(&query.statement, bound.as_slice()) {
            Ok(rows) => {
                transaction
                    .commit()
                    .map_err(|source| OrmError::execution(identity, operation, source))?;
                debug!(entity = %identity, %operation, rows, "committed");
                Ok(rows)
            }
            Err(source) => {
                // an interrupted statement must not get its rollback interrupted too
                transaction.progress_handler(0, None::<fn() -> bool>);
                if let Err(rollback) = transaction.rollback() {
                    warn!(entity = %identity, %operation, error = %rollback, "rollback failed");
                }
                warn!(entity = %identity, %operation, error = %source, "rolled back");
                Err(OrmError::execution(identity, operation, source))
            }
        }
    }
}
