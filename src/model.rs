//! The declarative mapping surface used from `Entity::describe`.
//!
//! ```
//! use cormorant::{ModelBuilder, PrimaryKeyStrategy};
//! # fn describe(model: &mut ModelBuilder) {
//! model.maps_to_table("Shippers");
//! model
//!     .maps_to_field("Id", "ShipperID")
//!     .as_primary_key(PrimaryKeyStrategy::Identity);
//! model.maps_to_field("CompanyName", "CompanyName");
//! # }
//! ```
//!
//! Declarations are collected first and applied to the registry in one pass
//! by [`ModelBuilder::commit`], so a bad declaration is rejected before any
//! of it is recorded.

use crate::entity::FieldSet;
use crate::error::{OrmError, Result};
use crate::registry::{EntityIdentity, FieldOptions, PrimaryKeyStrategy, Registry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDeclaration {
    field: String,
    column: String,
    options: FieldOptions,
}

impl FieldDeclaration {
    pub fn as_primary_key(&mut self, strategy: PrimaryKeyStrategy) -> &mut Self {
        self.options.primary_key = Some(strategy);
        self
    }

    pub fn as_row_version(&mut self) -> &mut Self {
        self.options.row_version = true;
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn options(&self) -> FieldOptions {
        self.options
    }
}

#[derive(Debug)]
pub struct ModelBuilder {
    identity: EntityIdentity,
    table: Option<String>,
    fields: Vec<FieldDeclaration>,
}

impl ModelBuilder {
    pub fn new(identity: EntityIdentity) -> Self {
        Self {
            identity,
            table: None,
            fields: Vec::new(),
        }
    }

    pub fn identity(&self) -> &EntityIdentity {
        &self.identity
    }

    pub fn maps_to_table(&mut self, table: impl Into<String>) -> &mut Self {
        self.table = Some(table.into());
        self
    }

    /// Maps the accessor named `field` onto `column`.
    pub fn maps_to_field(&mut self, field: &str, column: impl Into<String>) -> &mut FieldDeclaration {
        self.fields.push(FieldDeclaration {
            field: field.to_string(),
            column: column.into(),
            options: FieldOptions::default(),
        });
        let last = self.fields.len() - 1;
        &mut self.fields[last]
    }

    pub fn declarations(&self) -> &[FieldDeclaration] {
        &self.fields
    }

    /// Validates every declaration against the accessor table, then records
    /// the table and field mappings as one unit. Repeating a commit is
    /// harmless: the registry ignores mappings it already holds.
    pub fn commit<E>(&self, registry: &Registry, accessors: &FieldSet<E>) -> Result<()> {
        if let Some(unknown) = self
            .fields
            .iter()
            .find(|declaration| !accessors.contains(&declaration.field))
        {
            return Err(OrmError::configuration(
                &self.identity,
                format!(
                    "no accessor named `{}` to map onto column `{}`",
                    unknown.field, unknown.column
                ),
            ));
        }
        registry.register_model(&self.identity, self.table.as_deref(), &self.fields)
    }
}
