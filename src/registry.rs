//! Mapping metadata shared by every operation.
//!
//! The registry is append-only: a table or field mapping, once recorded,
//! never changes. Writes are serialized behind a lock; reads take a shared
//! read lock. First-time registration of an entity type is single-writer:
//! one thread runs `Entity::describe`, concurrent callers wait and then see
//! the finished metadata.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bimap::BiMap;
use tracing::{debug, warn};

use crate::entity::{Entity, FieldSet};
use crate::error::{OrmError, Result};
use crate::model::{FieldDeclaration, ModelBuilder};

/// Stable name of an entity's shape, used as the registry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityIdentity(Arc<str>);

impl EntityIdentity {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn of<T: ?Sized>() -> Self {
        Self::new(type_name::<T>())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The unqualified type name: `app::model::Region<T>` becomes `Region`.
    pub fn bare_name(&self) -> &str {
        let path = self.0.split('<').next().unwrap_or(&self.0);
        path.rsplit("::").next().unwrap_or(path)
    }
}

impl fmt::Display for EntityIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a primary key value comes into being on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimaryKeyStrategy {
    /// Supplied by the caller and bound like any other column.
    #[default]
    Assigned,
    /// Assigned by the database; the column is left out of inserts.
    Identity,
    /// Random identifier produced by `NEWID()`.
    NewGuid,
    /// Time-ordered identifier produced by `NEWSEQUENTIALID()`.
    SequentialGuid,
}

impl PrimaryKeyStrategy {
    /// SQL emitted in place of a bound value, for strategies the backend fills in.
    pub fn generator_sql(self) -> Option<&'static str> {
        match self {
            PrimaryKeyStrategy::NewGuid => Some("NEWID()"),
            PrimaryKeyStrategy::SequentialGuid => Some("NEWSEQUENTIALID()"),
            PrimaryKeyStrategy::Assigned | PrimaryKeyStrategy::Identity => None,
        }
    }
}

/// Flags a field mapping is registered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldOptions {
    pub primary_key: Option<PrimaryKeyStrategy>,
    pub row_version: bool,
}

impl FieldOptions {
    pub fn primary_key(strategy: PrimaryKeyStrategy) -> Self {
        Self {
            primary_key: Some(strategy),
            row_version: false,
        }
    }

    pub fn row_version() -> Self {
        Self {
            primary_key: None,
            row_version: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub identity: EntityIdentity,
    pub field: String,
    pub column: String,
    pub primary_key: Option<PrimaryKeyStrategy>,
    pub row_version: bool,
}

impl FieldMapping {
    pub fn is_primary_key(&self) -> bool {
        self.primary_key.is_some()
    }

    pub fn strategy(&self) -> Option<PrimaryKeyStrategy> {
        self.primary_key
    }
}

#[derive(Default)]
struct RegistryState {
    tables: BiMap<EntityIdentity, String>,
    fields: HashMap<EntityIdentity, Vec<FieldMapping>>,
    primary_keys: HashMap<EntityIdentity, FieldMapping>,
    row_versions: HashMap<EntityIdentity, FieldMapping>,
    // one entry per initialized type; its presence is the "already registered" flag
    accessors: HashMap<EntityIdentity, Arc<dyn Any + Send + Sync>>,
}

impl RegistryState {
    fn mapping(&self, identity: &EntityIdentity, field: &str) -> Option<&FieldMapping> {
        self.fields
            .get(identity)
            .and_then(|fields| fields.iter().find(|m| m.field == field))
    }

    fn claim_table(&mut self, identity: &EntityIdentity, table: &str) -> bool {
        if self.tables.contains_left(identity) {
            return false;
        }
        if let Some(owner) = self.tables.get_by_right(table) {
            warn!(entity = %identity, table, owner = %owner, "table already claimed, mapping ignored");
            return false;
        }
        self.tables.insert(identity.clone(), table.to_string());
        debug!(entity = %identity, table, "table registered");
        true
    }

    // Callers have already checked for conflicts.
    fn record_field(
        &mut self,
        identity: &EntityIdentity,
        field: &str,
        column: &str,
        options: FieldOptions,
    ) -> FieldMapping {
        let mapping = FieldMapping {
            identity: identity.clone(),
            field: field.to_string(),
            column: column.to_string(),
            primary_key: options.primary_key,
            row_version: options.row_version,
        };
        if mapping.is_primary_key() {
            self.primary_keys.insert(identity.clone(), mapping.clone());
        }
        if mapping.row_version {
            self.row_versions.insert(identity.clone(), mapping.clone());
        }
        self.fields
            .entry(identity.clone())
            .or_default()
            .push(mapping.clone());
        debug!(entity = %identity, field, column, "field registered");
        mapping
    }
}

fn check_flags(identity: &EntityIdentity, field: &str, options: FieldOptions) -> Result<()> {
    if options.primary_key.is_some() && options.row_version {
        return Err(OrmError::configuration(
            identity,
            format!("field `{field}` cannot be both primary key and row version"),
        ));
    }
    Ok(())
}

fn second_key(identity: &EntityIdentity, field: &str, existing: &str) -> OrmError {
    OrmError::configuration(
        identity,
        format!("field `{field}` declared as primary key, but `{existing}` already is"),
    )
}

fn second_version(identity: &EntityIdentity, field: &str, existing: &str) -> OrmError {
    OrmError::configuration(
        identity,
        format!("field `{field}` declared as row version, but `{existing}` already is"),
    )
}

/// Process-lifetime store of table and field mappings, keyed by entity identity.
#[derive(Default)]
pub struct Registry {
    state: RwLock<RegistryState>,
    init: Mutex<()>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("Registry")
            .field("tables", &state.tables.len())
            .field("entities", &state.accessors.len())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // Mappings are append-only, so a panic mid-write cannot leave a
    // half-updated entry behind; recovering the guard is sound.
    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records `identity -> table` unless either side is already claimed.
    /// Returns whether the mapping was recorded.
    pub fn register_table(&self, identity: &EntityIdentity, table: &str) -> bool {
        self.write().claim_table(identity, table)
    }

    /// Appends a field mapping. Registering an already-mapped field returns
    /// the existing mapping unchanged.
    pub fn register_field(
        &self,
        identity: &EntityIdentity,
        field: &str,
        column: &str,
        options: FieldOptions,
    ) -> Result<FieldMapping> {
        check_flags(identity, field, options)?;

        let mut state = self.write();
        if let Some(existing) = state.mapping(identity, field) {
            return Ok(existing.clone());
        }
        if options.primary_key.is_some() {
            if let Some(key) = state.primary_keys.get(identity) {
                return Err(second_key(identity, field, &key.field));
            }
        }
        if options.row_version {
            if let Some(version) = state.row_versions.get(identity) {
                return Err(second_version(identity, field, &version.field));
            }
        }
        Ok(state.record_field(identity, field, column, options))
    }

    /// Applies a whole model declaration, or none of it.
    ///
    /// Every declaration is checked against the recorded mappings and against
    /// the earlier declarations before the table or any field is written.
    pub(crate) fn register_model(
        &self,
        identity: &EntityIdentity,
        table: Option<&str>,
        declarations: &[FieldDeclaration],
    ) -> Result<()> {
        let mut state = self.write();

        let mut key = state.primary_keys.get(identity).map(|m| m.field.clone());
        let mut version = state.row_versions.get(identity).map(|m| m.field.clone());
        let mut staged: Vec<&str> = Vec::new();
        for declaration in declarations {
            let field = declaration.field();
            let options = declaration.options();
            check_flags(identity, field, options)?;
            if state.mapping(identity, field).is_some() || staged.contains(&field) {
                continue;
            }
            staged.push(field);
            if options.primary_key.is_some() {
                if let Some(existing) = &key {
                    return Err(second_key(identity, field, existing));
                }
                key = Some(field.to_string());
            }
            if options.row_version {
                if let Some(existing) = &version {
                    return Err(second_version(identity, field, existing));
                }
                version = Some(field.to_string());
            }
        }

        if let Some(table) = table {
            state.claim_table(identity, table);
        }
        for declaration in declarations {
            if state.mapping(identity, declaration.field()).is_none() {
                state.record_field(
                    identity,
                    declaration.field(),
                    declaration.column(),
                    declaration.options(),
                );
            }
        }
        Ok(())
    }

    /// The mapped table, or the identity's bare type name when unmapped.
    pub fn lookup_table(&self, identity: &EntityIdentity) -> String {
        self.read()
            .tables
            .get_by_left(identity)
            .cloned()
            .unwrap_or_else(|| identity.bare_name().to_string())
    }

    /// Field mappings in registration order; empty when unmapped.
    pub fn lookup_fields(&self, identity: &EntityIdentity) -> Vec<FieldMapping> {
        self.read().fields.get(identity).cloned().unwrap_or_default()
    }

    pub fn lookup_primary_key(&self, identity: &EntityIdentity) -> Option<FieldMapping> {
        self.read().primary_keys.get(identity).cloned()
    }

    pub fn lookup_row_version(&self, identity: &EntityIdentity) -> Option<FieldMapping> {
        self.read().row_versions.get(identity).cloned()
    }

    /// Column a field is stored in; the field's own name when unmapped.
    pub fn column_for(&self, identity: &EntityIdentity, field: &str) -> String {
        self.read()
            .mapping(identity, field)
            .map_or_else(|| field.to_string(), |m| m.column.clone())
    }

    /// Field a column hydrates into; the column's own name when unmapped.
    pub fn field_for_column(&self, identity: &EntityIdentity, column: &str) -> String {
        self.read()
            .fields
            .get(identity)
            .and_then(|fields| fields.iter().find(|m| m.column == column))
            .map_or_else(|| column.to_string(), |m| m.field.clone())
    }

    pub fn is_registered(&self, identity: &EntityIdentity) -> bool {
        self.read().accessors.contains_key(identity)
    }

    /// Registers `E` on first use and returns its accessor table.
    ///
    /// Later calls return the stored table without touching the mappings,
    /// so calling this on every operation is cheap.
    pub fn register<E: Entity>(&self) -> Result<Arc<FieldSet<E>>> {
        let identity = E::identity();
        if let Some(accessors) = self.accessors::<E>(&identity)? {
            return Ok(accessors);
        }

        let _init = self.init.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(accessors) = self.accessors::<E>(&identity)? {
            return Ok(accessors);
        }

        let accessors = FieldSet::new(E::fields());
        let mut model = ModelBuilder::new(identity.clone());
        E::describe(&mut model);
        model.commit(self, &accessors)?;

        let accessors = Arc::new(accessors);
        self.write()
            .accessors
            .insert(identity.clone(), accessors.clone() as Arc<dyn Any + Send + Sync>);
        debug!(entity = %identity, fields = accessors.len(), "entity registered");
        Ok(accessors)
    }

    fn accessors<E: Entity>(&self, identity: &EntityIdentity) -> Result<Option<Arc<FieldSet<E>>>> {
        let Some(stored) = self.read().accessors.get(identity).cloned() else {
            return Ok(None);
        };
        stored.downcast::<FieldSet<E>>().map(Some).map_err(|_| {
            OrmError::configuration(
                identity,
                format!("identity already registered by a type other than {}", type_name::<E>()),
            )
        })
    }
}
