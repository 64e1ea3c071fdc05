#![allow(dead_code)]

use cormorant::{field, Database, Entity, Field, ModelBuilder, PrimaryKeyStrategy, SqliteConfig};
use rusqlite::{Connection, Result};
use tempfile::NamedTempFile;
use uuid::Uuid;

pub const SCHEMA: &str = r#"
    CREATE TABLE Shippers (
        ShipperID INTEGER PRIMARY KEY AUTOINCREMENT,
        CompanyName TEXT NOT NULL,
        Phone TEXT
    );
    CREATE TABLE Region (
        RegionID INTEGER PRIMARY KEY,
        RegionDescription TEXT,
        LegacyCode TEXT
    );
    CREATE TABLE Notes (
        NoteKey TEXT PRIMARY KEY,
        Comment TEXT
    );
    CREATE TABLE Tickets (
        TicketKey TEXT PRIMARY KEY,
        Title TEXT
    );
    CREATE TABLE Documents (
        Id INTEGER PRIMARY KEY,
        Title TEXT NOT NULL,
        Version INTEGER NOT NULL DEFAULT 1
    );
    CREATE TRIGGER Documents_version AFTER UPDATE OF Title ON Documents
    BEGIN
        UPDATE Documents SET Version = OLD.Version + 1 WHERE Id = NEW.Id;
    END;
    CREATE TABLE AuditLine (
        Message TEXT
    );
"#;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// File-backed so every connection the engine opens sees the same data.
pub fn create_temp_db() -> Result<(Database, NamedTempFile)> {
    init_tracing();
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_str().unwrap().to_string();
    let conn = Connection::open(&path)?;
    conn.execute_batch(SCHEMA)?;
    Ok((Database::new(SqliteConfig::new(path)), temp_file))
}

/// Another engine over the same file, with a registry of its own.
pub fn reopen(temp_file: &NamedTempFile) -> Database {
    Database::new(SqliteConfig::new(temp_file.path().to_str().unwrap()))
}

pub fn raw_connection(temp_file: &NamedTempFile) -> Connection {
    Connection::open(temp_file.path()).unwrap()
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Shippers {
    pub id: i64,
    pub company_name: String,
    pub phone: String,
}

impl Entity for Shippers {
    fn fields() -> Vec<Field<Self>> {
        vec![
            field!(Shippers, "Id" => id),
            field!(Shippers, "CompanyName" => company_name),
            field!(Shippers, "Phone" => phone),
        ]
    }

    fn describe(model: &mut ModelBuilder) {
        model.maps_to_table("Shippers");
        model
            .maps_to_field("Id", "ShipperID")
            .as_primary_key(PrimaryKeyStrategy::Identity);
        model.maps_to_field("CompanyName", "CompanyName");
        model.maps_to_field("Phone", "Phone");
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Region {
    pub id: i64,
    pub region_description: String,
}

impl Entity for Region {
    fn fields() -> Vec<Field<Self>> {
        vec![
            field!(Region, "Id" => id),
            field!(Region, "RegionDescription" => region_description),
        ]
    }

    fn describe(model: &mut ModelBuilder) {
        model.maps_to_table("Region");
        model
            .maps_to_field("Id", "RegionID")
            .as_primary_key(PrimaryKeyStrategy::Assigned);
        model.maps_to_field("RegionDescription", "RegionDescription");
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Note {
    pub key: Uuid,
    pub comment: String,
}

impl Entity for Note {
    fn fields() -> Vec<Field<Self>> {
        vec![
            field!(Note, "Key" => key),
            field!(Note, "Comment" => comment),
        ]
    }

    fn describe(model: &mut ModelBuilder) {
        model.maps_to_table("Notes");
        model
            .maps_to_field("Key", "NoteKey")
            .as_primary_key(PrimaryKeyStrategy::NewGuid);
        model.maps_to_field("Comment", "Comment");
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Ticket {
    pub key: Uuid,
    pub title: String,
}

impl Entity for Ticket {
    fn fields() -> Vec<Field<Self>> {
        vec![
            field!(Ticket, "Key" => key),
            field!(Ticket, "Title" => title),
        ]
    }

    fn describe(model: &mut ModelBuilder) {
        model.maps_to_table("Tickets");
        model
            .maps_to_field("Key", "TicketKey")
            .as_primary_key(PrimaryKeyStrategy::SequentialGuid);
        model.maps_to_field("Title", "Title");
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Document {
    pub id: i64,
    pub title: String,
    pub version: i64,
}

impl Entity for Document {
    fn fields() -> Vec<Field<Self>> {
        vec![
            field!(Document, "Id" => id),
            field!(Document, "Title" => title),
            field!(Document, "Version" => version),
        ]
    }

    fn describe(model: &mut ModelBuilder) {
        model.maps_to_table("Documents");
        model
            .maps_to_field("Id", "Id")
            .as_primary_key(PrimaryKeyStrategy::Assigned);
        model.maps_to_field("Title", "Title");
        model.maps_to_field("Version", "Version").as_row_version();
    }
}

/// No mapping at all: table and columns fall back to Rust-side names.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AuditLine {
    pub message: String,
}

impl Entity for AuditLine {
    fn fields() -> Vec<Field<Self>> {
        vec![field!(AuditLine, "Message" => message)]
    }

    fn describe(_model: &mut ModelBuilder) {}
}
