use std::fmt;

use thiserror::Error;

use crate::registry::EntityIdentity;

/// The operation a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Select => "select",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum OrmError {
    /// Raised before any SQL is issued. `operation` is unset only when the
    /// registry is driven directly rather than through a [`Database`](crate::Database) call.
    #[error("configuration error for {entity}{}: {message}", during_clause(.operation))]
    Configuration {
        entity: EntityIdentity,
        operation: Option<Operation>,
        message: String,
    },
    #[error("{operation} on {entity} could not open a connection: {source:#}")]
    Connection {
        entity: EntityIdentity,
        operation: Operation,
        #[source]
        source: anyhow::Error,
    },
    #[error("{operation} on {entity} failed: {source}")]
    Execution {
        entity: EntityIdentity,
        operation: Operation,
        #[source]
        source: rusqlite::Error,
    },
    #[error("{operation} on {entity} was cancelled")]
    Cancelled {
        entity: EntityIdentity,
        operation: Operation,
    },
    #[error("{operation} on {entity} cannot hydrate field `{field}`: {message}")]
    Conversion {
        entity: EntityIdentity,
        operation: Operation,
        field: String,
        message: String,
    },
    #[error("settings error: {0}")]
    Settings(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, OrmError>;

fn during_clause(operation: &Option<Operation>) -> String {
    operation.map(|op| format!(" during {op}")).unwrap_or_default()
}

impl OrmError {
    pub(crate) fn configuration(entity: &EntityIdentity, message: impl Into<String>) -> Self {
        Self::Configuration {
            entity: entity.clone(),
            operation: None,
            message: message.into(),
        }
    }

    /// Attributes a configuration error to the operation that triggered it.
    /// Other variants already carry their operation and pass through unchanged.
    pub(crate) fn during(self, operation: Operation) -> Self {
        match self {
            Self::Configuration {
                entity,
                operation: None,
                message,
            } => Self::Configuration {
                entity,
                operation: Some(operation),
                message,
            },
            other => other,
        }
    }

    /// The operation that failed, when the failure happened inside one.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Self::Configuration { operation, .. } => *operation,
            Self::Connection { operation, .. }
            | Self::Execution { operation, .. }
            | Self::Cancelled { operation, .. }
            | Self::Conversion { operation, .. } => Some(*operation),
            Self::Settings(_) => None,
        }
    }

    /// Classifies a backend failure; an interrupted statement means our
    /// progress handler tripped, so it is reported as a cancellation.
    pub(crate) fn execution(
        entity: &EntityIdentity,
        operation: Operation,
        source: rusqlite::Error,
    ) -> Self {
        match &source {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::OperationInterrupted =>
            {
                Self::Cancelled {
                    entity: entity.clone(),
                    operation,
                }
            }
            _ => Self::Execution {
                entity: entity.clone(),
                operation,
                source,
            },
        }
    }

    /// The entity type the failure concerns, when there is one.
    pub fn entity(&self) -> Option<&EntityIdentity> {
        match self {
            Self::Configuration { entity, .. }
            | Self::Connection { entity, .. }
            | Self::Execution { entity, .. }
            | Self::Cancelled { entity, .. }
            | Self::Conversion { entity, .. } => Some(entity),
            Self::Settings(_) => None,
        }
    }
}
