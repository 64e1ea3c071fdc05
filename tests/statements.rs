mod common;

use common::{AuditLine, Document, Note, Region, Shippers, Ticket};
use cormorant::{
    field, Entity, Field, ModelBuilder, OrmError, PrimaryKeyStrategy, Registry, StatementGenerator,
    Value,
};
use uuid::Uuid;

fn names(query: &cormorant::SqlQuery) -> Vec<&str> {
    query.params.names().collect()
}

#[test]
fn select_reads_the_whole_table() {
    let registry = Registry::new();
    registry.register::<Shippers>().unwrap();

    let query = StatementGenerator::new(&registry).select_all(&Shippers::identity());

    assert_eq!(query.statement, "SELECT * FROM Shippers");
    assert!(query.params.is_empty());
}

#[test]
fn identity_insert_omits_the_key_column() {
    let registry = Registry::new();
    let shipper = Shippers {
        id: 42,
        company_name: "Appfail".to_string(),
        phone: "2323242".to_string(),
    };

    let query = StatementGenerator::new(&registry).insert(&shipper).unwrap();

    assert_eq!(
        query.statement,
        "INSERT INTO Shippers (CompanyName, Phone) VALUES (@CompanyName, @Phone)"
    );
    assert_eq!(names(&query), ["@CompanyName", "@Phone"]);
    assert_eq!(
        query.params.get("@CompanyName"),
        Some(&Value::Text("Appfail".to_string()))
    );
    assert!(query.params.get("@ShipperID").is_none());
}

#[test]
fn guid_insert_calls_the_generator_in_sql() {
    let registry = Registry::new();
    let note = Note {
        key: Uuid::nil(),
        comment: "hello".to_string(),
    };

    let query = StatementGenerator::new(&registry).insert(&note).unwrap();

    assert_eq!(
        query.statement,
        "INSERT INTO Notes (NoteKey, Comment) VALUES (NEWID(), @Comment)"
    );
    assert_eq!(names(&query), ["@Comment"]);
    assert!(query
        .params
        .values
        .iter()
        .all(|(_, value)| *value != Value::Text("NEWID()".to_string())));
}

#[test]
fn sequential_guid_insert_calls_the_sequential_generator() {
    let registry = Registry::new();
    let ticket = Ticket {
        key: Uuid::nil(),
        title: "printer on fire".to_string(),
    };

    let query = StatementGenerator::new(&registry).insert(&ticket).unwrap();

    assert_eq!(
        query.statement,
        "INSERT INTO Tickets (TicketKey, Title) VALUES (NEWSEQUENTIALID(), @Title)"
    );
    assert_eq!(names(&query), ["@Title"]);
}

#[test]
fn assigned_key_is_bound_on_insert() {
    let registry = Registry::new();
    let region = Region {
        id: 1,
        region_description: "Eastern".to_string(),
    };

    let query = StatementGenerator::new(&registry).insert(&region).unwrap();

    assert_eq!(
        query.statement,
        "INSERT INTO Region (RegionID, RegionDescription) VALUES (@RegionID, @RegionDescription)"
    );
    assert_eq!(query.params.get("@RegionID"), Some(&Value::Integer(1)));
}

#[test]
fn row_version_is_never_inserted() {
    let registry = Registry::new();
    let document = Document {
        id: 7,
        title: "draft".to_string(),
        version: 3,
    };

    let query = StatementGenerator::new(&registry).insert(&document).unwrap();

    assert_eq!(
        query.statement,
        "INSERT INTO Documents (Id, Title) VALUES (@Id, @Title)"
    );
}

#[test]
fn update_sets_everything_but_the_key() {
    let registry = Registry::new();
    let shipper = Shippers {
        id: 7,
        company_name: "Speedy Express".to_string(),
        phone: "(503) 555-9831".to_string(),
    };

    let query = StatementGenerator::new(&registry).update(&shipper).unwrap();

    assert_eq!(
        query.statement,
        "UPDATE Shippers SET CompanyName=@CompanyName, Phone=@Phone WHERE [ShipperID] = @ShipperID"
    );
    assert_eq!(names(&query), ["@CompanyName", "@Phone", "@ShipperID"]);
    assert_eq!(query.params.get("@ShipperID"), Some(&Value::Integer(7)));
}

#[test]
fn update_checks_the_row_version() {
    let registry = Registry::new();
    let document = Document {
        id: 7,
        title: "final".to_string(),
        version: 3,
    };

    let query = StatementGenerator::new(&registry).update(&document).unwrap();

    assert_eq!(
        query.statement,
        "UPDATE Documents SET Title=@Title WHERE [Id] = @Id AND [Version] = @Version"
    );
    assert_eq!(names(&query), ["@Title", "@Id", "@Version"]);
    assert_eq!(query.params.get("@Version"), Some(&Value::Integer(3)));
}

#[test]
fn delete_uses_the_key_predicate() {
    let registry = Registry::new();
    let document = Document {
        id: 7,
        title: String::new(),
        version: 3,
    };

    let query = StatementGenerator::new(&registry).delete(&document).unwrap();

    assert_eq!(
        query.statement,
        "DELETE FROM Documents WHERE [Id] = @Id AND [Version] = @Version"
    );
    assert_eq!(names(&query), ["@Id", "@Version"]);
}

#[test]
fn unmapped_entity_uses_rust_names() {
    let registry = Registry::new();
    let line = AuditLine {
        message: "logged in".to_string(),
    };

    let generator = StatementGenerator::new(&registry);
    let insert = generator.insert(&line).unwrap();

    assert_eq!(
        insert.statement,
        "INSERT INTO AuditLine (Message) VALUES (@Message)"
    );
    assert_eq!(
        generator.select_all(&AuditLine::identity()).statement,
        "SELECT * FROM AuditLine"
    );
}

#[test]
fn update_and_delete_require_a_primary_key() {
    let registry = Registry::new();
    let line = AuditLine::default();
    let generator = StatementGenerator::new(&registry);

    let update = generator.update(&line).unwrap_err();
    let delete = generator.delete(&line).unwrap_err();

    assert!(matches!(update, OrmError::Configuration { .. }));
    assert!(update.to_string().contains("update"));
    assert!(matches!(delete, OrmError::Configuration { .. }));
}

#[derive(Debug, Default)]
struct KeyOnly {
    id: i64,
}

impl Entity for KeyOnly {
    fn fields() -> Vec<Field<Self>> {
        vec![field!(KeyOnly, "Id" => id)]
    }

    fn describe(model: &mut ModelBuilder) {
        model
            .maps_to_field("Id", "Id")
            .as_primary_key(PrimaryKeyStrategy::Identity);
    }
}

#[test]
fn update_with_nothing_to_set_is_rejected() {
    let registry = Registry::new();

    let err = StatementGenerator::new(&registry)
        .update(&KeyOnly { id: 1 })
        .unwrap_err();

    assert!(matches!(err, OrmError::Configuration { .. }));
}
