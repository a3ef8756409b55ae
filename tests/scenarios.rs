//! End-to-end scenarios on the multi-tenant fixture schema
//!
//! Every tenant-scoped entity is keyed by `(org, id)`, so each relationship
//! between them is a two-column foreign key.

use keystone::test_helpers::{tenant_schema, MemoryExecutor};
use keystone::{
    reference, Assignments, Filter, KeyTuple, RelationValue, SchemaGraph, Session,
};
use sea_query::Value;

fn seeded(graph: &SchemaGraph) -> Session<'_, MemoryExecutor> {
    let mut session = Session::new(graph, MemoryExecutor::new(graph));
    session
        .create("Organisation", Assignments::new().with("id", 1).with("name", "acme"))
        .unwrap();
    session
        .create(
            "User",
            Assignments::new()
                .with_relation("org", reference("Organisation", 1))
                .with("id", 1)
                .with("name", "ada"),
        )
        .unwrap();
    session.flush().unwrap();
    session
}

fn intake_form(owner: impl Into<RelationValue>) -> Assignments {
    Assignments::new()
        .with_relation("org", reference("Organisation", 1))
        .with("id", 10)
        .with("name", "intake")
        .with_relation("owner", owner)
}

#[test]
fn test_populated_form_matches_inserted_form() {
    let graph = tenant_schema();
    let mut session = seeded(&graph);
    session.create("Form", intake_form(None::<KeyTuple>)).unwrap();
    session
        .create(
            "FormSubmission",
            Assignments::new()
                .with_relation("org", reference("Organisation", 1))
                .with("id", 20)
                .with_relation("form", reference("Form", [1, 10])),
        )
        .unwrap();
    session.flush().unwrap();
    session.clear();

    let submission = session
        .find_by_key("FormSubmission", [1, 20], "form")
        .unwrap()
        .expect("submission 20 exists");
    let form = submission.related("form").expect("form is populated");
    assert_eq!(form.scalar("name"), Some(&Value::from("intake")));
    assert_eq!(form.scalar("id"), Some(&Value::Int(Some(10))));
}

#[test]
fn test_clearing_submission_form_nulls_both_columns() {
    let graph = tenant_schema();
    let mut session = seeded(&graph);
    session.create("Form", intake_form(None::<KeyTuple>)).unwrap();
    session
        .create(
            "FormSubmission",
            Assignments::new()
                .with_relation("org", reference("Organisation", 1))
                .with("id", 20)
                .with_relation("form", reference("Form", [1, 10])),
        )
        .unwrap();
    session.flush().unwrap();

    let mut submission = session
        .find_by_key("FormSubmission", [1, 20], ())
        .unwrap()
        .unwrap();
    submission.clear("form");
    session.persist(&submission).unwrap();
    assert_eq!(session.flush().unwrap().updated, 1);

    let row = &session.executor().rows("form_submission")[0];
    assert_eq!(row.get("form_org_id"), Some(&Value::Int(None)));
    assert_eq!(row.get("form_id"), Some(&Value::Int(None)));
    // the submission's own key is untouched
    assert_eq!(row.get("org_id"), Some(&Value::Int(Some(1))));
}

#[test]
fn test_insert_with_raw_owner_key_is_queryable() {
    let graph = tenant_schema();
    let mut session = seeded(&graph);
    session
        .insert("Form", &intake_form(KeyTuple::from([1, 1])))
        .unwrap();

    let forms = session
        .find("Form", &Filter::key("owner", [1, 1]), ())
        .unwrap();
    assert_eq!(forms.len(), 1);
    assert_eq!(
        forms[0].reference("owner").map(|r| r.key().clone()),
        Some(KeyTuple::from([1, 1]))
    );
}

#[test]
fn test_reference_and_raw_key_store_identical_rows() {
    let graph = tenant_schema();

    let mut by_key = seeded(&graph);
    by_key
        .insert("Form", &intake_form(KeyTuple::from([1, 1])))
        .unwrap();

    let mut by_reference = seeded(&graph);
    by_reference
        .insert("Form", &intake_form(reference("User", [1, 1])))
        .unwrap();

    let stored = by_reference.executor().rows("form");
    assert_eq!(stored, by_key.executor().rows("form"));
    assert_eq!(stored[0].get("owner_org_id"), Some(&Value::Int(Some(1))));
    assert_eq!(stored[0].get("owner_id"), Some(&Value::Int(Some(1))));
}

#[test]
fn test_insert_with_loaded_owner_matches_raw_key() {
    let graph = tenant_schema();

    let mut by_key = seeded(&graph);
    by_key
        .insert("Form", &intake_form(KeyTuple::from([1, 1])))
        .unwrap();

    let mut by_instance = seeded(&graph);
    by_instance.clear();
    let owner = by_instance
        .find_by_key("User", [1, 1], ())
        .unwrap()
        .expect("user 1 exists");
    // hydrated instances carry their org as a reference, not a loaded entity
    assert!(owner.reference("org").is_some());
    by_instance.insert("Form", &intake_form(owner)).unwrap();

    assert_eq!(
        by_instance.executor().rows("form"),
        by_key.executor().rows("form")
    );
}
