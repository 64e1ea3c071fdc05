//! Entity declarations.
//!
//! An entity states its persisted fields once, as a table of named
//! getter/setter pairs, and describes how those fields map onto a table.
//! Nothing is discovered at call time.

use std::fmt;

use crate::model::ModelBuilder;
use crate::registry::EntityIdentity;
use crate::value::{FromValue, Value};

type Getter<E> = Box<dyn Fn(&E) -> Value + Send + Sync>;
type Setter<E> = Box<dyn Fn(&mut E, Value) -> Result<(), String> + Send + Sync>;

/// A plain data type persisted to one table.
///
/// `Default` provides the fresh instance hydration writes into.
pub trait Entity: Default + 'static {
    /// Registry key for this type. Defaults to the fully-qualified type name.
    fn identity() -> EntityIdentity {
        EntityIdentity::of::<Self>()
    }

    /// The accessor table, in the order columns are written.
    fn fields() -> Vec<Field<Self>>;

    /// Declares the table and column mapping. Runs once per registry.
    fn describe(model: &mut ModelBuilder);
}

/// A named accessor for one entity field.
pub struct Field<E> {
    name: &'static str,
    get: Getter<E>,
    set: Option<Setter<E>>,
}

impl<E: 'static> Field<E> {
    pub fn new<T, G, S>(name: &'static str, get: G, set: S) -> Self
    where
        T: Into<Value> + FromValue,
        G: Fn(&E) -> T + Send + Sync + 'static,
        S: Fn(&mut E, T) + Send + Sync + 'static,
    {
        Self {
            name,
            get: Box::new(move |entity: &E| get(entity).into()),
            set: Some(Box::new(move |entity: &mut E, value: Value| {
                set(entity, T::from_value(value)?);
                Ok(())
            })),
        }
    }

    /// A field that is written but never hydrated.
    pub fn read_only<T, G>(name: &'static str, get: G) -> Self
    where
        T: Into<Value>,
        G: Fn(&E) -> T + Send + Sync + 'static,
    {
        Self {
            name,
            get: Box::new(move |entity: &E| get(entity).into()),
            set: None,
        }
    }
}

impl<E> Field<E> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, entity: &E) -> Value {
        (self.get)(entity)
    }

    pub fn is_writable(&self) -> bool {
        self.set.is_some()
    }

    /// Writes `value` into the field. Non-writable fields ignore the call.
    pub fn set(&self, entity: &mut E, value: Value) -> Result<(), String> {
        match &self.set {
            Some(set) => set(entity, value),
            None => Ok(()),
        }
    }
}

impl<E> fmt::Debug for Field<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("writable", &self.is_writable())
            .finish()
    }
}

/// The accessor table of one entity type, built once at registration.
#[derive(Debug)]
pub struct FieldSet<E> {
    fields: Vec<Field<E>>,
}

impl<E> FieldSet<E> {
    pub fn new(fields: Vec<Field<E>>) -> Self {
        Self { fields }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field<E>> {
        self.fields.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Field<E>> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    pub fn field_at(&self, index: usize) -> Option<&Field<E>> {
        self.fields.get(index)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Declares a read/write [`Field`] over a struct member.
///
/// ```
/// use cormorant::{field, Field};
///
/// #[derive(Default)]
/// struct Region {
///     id: i64,
/// }
///
/// let id: Field<Region> = field!(Region, "Id" => id);
/// assert_eq!(id.name(), "Id");
/// ```
#[macro_export]
macro_rules! field {
    ($entity:ty, $name:literal => $member:ident) => {
        $crate::Field::new(
            $name,
            |entity: &$entity| entity.$member.clone(),
            |entity: &mut $entity, value| entity.$member = value,
        )
    };
}
