//! Minimal object-relational mapping over SQLite.
//!
//! # Intention
//!
//! - Let a plain struct declare, once, how its fields map onto a table.
//! - Generate select, insert, update and delete statements from that mapping.
//! - Execute them transactionally and hydrate result rows back into structs.
//!
//! # Architectural Boundaries
//!
//! - Mapping metadata lives in an injectable [`Registry`]; there is no global state.
//! - Connections come from a [`Connector`]; building credentials is the caller's job.
//! - No filtering, joins, migrations, change tracking or pooling.
//!
//! # Example
//!
//! ```
//! use cormorant::{field, Database, Entity, Field, ModelBuilder, PrimaryKeyStrategy};
//!
//! #[derive(Debug, Default, Clone, PartialEq)]
//! struct Region {
//!     id: i64,
//!     description: String,
//! }
//!
//! impl Entity for Region {
//!     fn fields() -> Vec<Field<Self>> {
//!         vec![
//!             field!(Region, "Id" => id),
//!             field!(Region, "RegionDescription" => description),
//!         ]
//!     }
//!
//!     fn describe(model: &mut ModelBuilder) {
//!         model.maps_to_table("Region");
//!         model
//!             .maps_to_field("Id", "RegionID")
//!             .as_primary_key(PrimaryKeyStrategy::Assigned);
//!         model.maps_to_field("RegionDescription", "RegionDescription");
//!     }
//! }
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("northwind.db");
//! let path = path.to_str().unwrap().to_string();
//! rusqlite::Connection::open(&path)
//!     .unwrap()
//!     .execute_batch("CREATE TABLE Region (RegionID INTEGER PRIMARY KEY, RegionDescription TEXT);")
//!     .unwrap();
//!
//! let db = Database::new(cormorant::SqliteConfig::new(path));
//! db.insert(&Region { id: 1, description: "Eastern".into() }).unwrap();
//! let regions: Vec<Region> = db.select_all().unwrap();
//! assert_eq!(regions[0].description, "Eastern");
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod hydrate;
pub mod model;
pub mod registry;
pub mod sqlite;
pub mod statement;
pub mod value;

pub use config::SqliteConfig;
pub use entity::{Entity, Field, FieldSet};
pub use error::{Operation, OrmError, Result};
pub use model::{FieldDeclaration, ModelBuilder};
pub use registry::{EntityIdentity, FieldMapping, FieldOptions, PrimaryKeyStrategy, Registry};
pub use sqlite::{register_key_functions, CancelToken, Connector, Database, Entities, ExecutionOptions};
pub use statement::{Params, SqlQuery, StatementGenerator};
pub use value::{FromValue, Value};
