//! Row to entity conversion.

use std::sync::Arc;

use rusqlite::Row;

use crate::entity::{Entity, FieldSet};
use crate::error::{Operation, OrmError, Result};
use crate::registry::{EntityIdentity, Registry};
use crate::value::Value;

/// Column-to-accessor slots for one result shape, resolved once per query.
pub struct HydrationPlan<E> {
    identity: EntityIdentity,
    accessors: Arc<FieldSet<E>>,
    // indexed by column position; `None` columns are skipped
    slots: Vec<Option<usize>>,
}

impl<E: Entity> HydrationPlan<E> {
    pub fn new<'c>(
        registry: &Registry,
        accessors: Arc<FieldSet<E>>,
        columns: impl IntoIterator<Item = &'c str>,
    ) -> Self {
        let identity = E::identity();
        let slots = columns
            .into_iter()
            .map(|column| {
                let field = registry.field_for_column(&identity, column);
                accessors
                    .position(&field)
                    .filter(|&index| accessors.field_at(index).is_some_and(|f| f.is_writable()))
            })
            .collect();
        Self {
            identity,
            accessors,
            slots,
        }
    }

    /// Number of result columns that land in a field.
    pub fn mapped_columns(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Builds a fresh entity from `row`. Null columns leave the field at its default.
    pub fn hydrate(&self, row: &Row<'_>) -> Result<E> {
        let mut entity = E::default();
        for (column, slot) in self.slots.iter().enumerate() {
            let Some(field) = slot.and_then(|index| self.accessors.field_at(index)) else {
                continue;
            };
            let value = row
                .get_ref(column)
                .map(Value::from)
                .map_err(|source| OrmError::execution(&self.identity, Operation::Select, source))?;
            if value.is_null() {
                continue;
            }
            field
                .set(&mut entity, value)
                .map_err(|message| OrmError::Conversion {
                    entity: self.identity.clone(),
                    operation: Operation::Select,
                    field: field.name().to_string(),
                    message,
                })?;
        }
        Ok(entity)
    }
}
