//! SQL text and parameter generation.
//!
//! Templates:
//!
//! - `SELECT * FROM {table}`
//! - `INSERT INTO {table} ({columns}) VALUES ({values})`
//! - `UPDATE {table} SET {col}=@{col}, ... WHERE [{pk}] = @{pk}[ AND [{rv}] = @{rv}]`
//! - `DELETE FROM {table} WHERE [{pk}] = @{pk}[ AND [{rv}] = @{rv}]`
//!
//! Parameters are named `@{column}`. Backend-generated key values are
//! written into the SQL as function calls and never bound.

use crate::entity::{Entity, FieldSet};
use crate::error::{Operation, OrmError, Result};
use crate::registry::{EntityIdentity, FieldMapping, PrimaryKeyStrategy, Registry};
use crate::value::Value;

/// Named parameter bindings, in placeholder order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Params {
    pub values: Vec<(String, Value)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `@column = value`.
    pub fn with_value(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: &str, value: impl Into<Value>) {
        self.values.push((placeholder(column), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// SQL statement with its bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub statement: String,
    pub params: Params,
}

impl SqlQuery {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            params: Params::new(),
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }
}

fn placeholder(column: &str) -> String {
    format!("@{column}")
}

/// Resolved column plan for one entity type.
struct Columns {
    table: String,
    key: Option<FieldMapping>,
    version: Option<FieldMapping>,
}

impl Columns {
    fn is_key(&self, field: &str) -> bool {
        self.key.as_ref().is_some_and(|k| k.field == field)
    }

    fn is_version(&self, field: &str) -> bool {
        self.version.as_ref().is_some_and(|v| v.field == field)
    }

    fn require_key(&self, identity: &EntityIdentity, operation: Operation) -> Result<&FieldMapping> {
        self.key.as_ref().ok_or_else(|| {
            OrmError::configuration(identity, "no primary key is registered").during(operation)
        })
    }
}

/// Builds statements for registered entities.
#[derive(Debug, Clone, Copy)]
pub struct StatementGenerator<'r> {
    registry: &'r Registry,
}

impl<'r> StatementGenerator<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    fn columns(&self, identity: &EntityIdentity) -> Columns {
        Columns {
            table: self.registry.lookup_table(identity),
            key: self.registry.lookup_primary_key(identity),
            version: self.registry.lookup_row_version(identity),
        }
    }

    pub fn select_all(&self, identity: &EntityIdentity) -> SqlQuery {
        SqlQuery::new(format!("SELECT * FROM {}", self.registry.lookup_table(identity)))
    }

    pub fn insert<E: Entity>(&self, entity: &E) -> Result<SqlQuery> {
        let accessors = self
            .registry
            .register::<E>()
            .map_err(|err| err.during(Operation::Insert))?;
        Ok(self.insert_with(&E::identity(), &accessors, entity))
    }

    pub fn update<E: Entity>(&self, entity: &E) -> Result<SqlQuery> {
        self.registry
            .register::<E>()
            .and_then(|accessors| self.update_with(&E::identity(), &accessors, entity))
            .map_err(|err| err.during(Operation::Update))
    }

    pub fn delete<E: Entity>(&self, entity: &E) -> Result<SqlQuery> {
        self.registry
            .register::<E>()
            .and_then(|accessors| self.delete_with(&E::identity(), &accessors, entity))
            .map_err(|err| err.during(Operation::Delete))
    }

    fn insert_with<E>(&self, identity: &EntityIdentity, accessors: &FieldSet<E>, entity: &E) -> SqlQuery {
        let plan = self.columns(identity);
        let strategy = plan.key.as_ref().and_then(FieldMapping::strategy);

        let mut columns = Vec::new();
        let mut values = Vec::new();
        let mut params = Params::new();
        for field in accessors.iter() {
            let name = field.name();
            if plan.is_version(name) {
                continue;
            }
            let column = self.registry.column_for(identity, name);
            if plan.is_key(name) {
                if strategy == Some(PrimaryKeyStrategy::Identity) {
                    continue;
                }
                if let Some(generator) = strategy.and_then(PrimaryKeyStrategy::generator_sql) {
                    columns.push(column);
                    values.push(generator.to_string());
                    continue;
                }
            }
            values.push(placeholder(&column));
            params.push(&column, field.get(entity));
            columns.push(column);
        }

        SqlQuery::new(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            plan.table,
            columns.join(", "),
            values.join(", ")
        ))
        .with_params(params)
    }

    fn update_with<E>(&self, identity: &EntityIdentity, accessors: &FieldSet<E>, entity: &E) -> Result<SqlQuery> {
        let plan = self.columns(identity);
        let key = plan.require_key(identity, Operation::Update)?;

        let mut assignments = Vec::new();
        let mut params = Params::new();
        for field in accessors.iter() {
            let name = field.name();
            if plan.is_key(name) || plan.is_version(name) {
                continue;
            }
            let column = self.registry.column_for(identity, name);
            assignments.push(format!("{column}={}", placeholder(&column)));
            params.push(&column, field.get(entity));
        }
        if assignments.is_empty() {
            return Err(OrmError::configuration(
                identity,
                "update has no columns to set besides the key and row version",
            ));
        }

        let predicate = self.key_predicate(&plan, key, accessors, entity, &mut params)?;
        Ok(SqlQuery::new(format!(
            "UPDATE {} SET {} {}",
            plan.table,
            assignments.join(", "),
            predicate
        ))
        .with_params(params))
    }

    fn delete_with<E>(&self, identity: &EntityIdentity, accessors: &FieldSet<E>, entity: &E) -> Result<SqlQuery> {
        let plan = self.columns(identity);
        let key = plan.require_key(identity, Operation::Delete)?;
        let mut params = Params::new();
        let predicate = self.key_predicate(&plan, key, accessors, entity, &mut params)?;
        Ok(SqlQuery::new(format!("DELETE FROM {} {}", plan.table, predicate)).with_params(params))
    }

    /// `WHERE [pk] = @pk`, narrowed by the row version when one is mapped.
    fn key_predicate<E>(
        &self,
        plan: &Columns,
        key: &FieldMapping,
        accessors: &FieldSet<E>,
        entity: &E,
        params: &mut Params,
    ) -> Result<String> {
        let mut predicate = format!("WHERE [{}] = {}", key.column, placeholder(&key.column));
        params.push(&key.column, bound_value(key, accessors, entity)?);

        if let Some(version) = &plan.version {
            predicate.push_str(&format!(
                " AND [{}] = {}",
                version.column,
                placeholder(&version.column)
            ));
            params.push(&version.column, bound_value(version, accessors, entity)?);
        }
        Ok(predicate)
    }
}

fn bound_value<E>(mapping: &FieldMapping, accessors: &FieldSet<E>, entity: &E) -> Result<Value> {
    accessors
        .get(&mapping.field)
        .map(|field| field.get(entity))
        .ok_or_else(|| {
            OrmError::configuration(
                &mapping.identity,
                format!("no accessor named `{}` for column `{}`", mapping.field, mapping.column),
            )
        })
}
