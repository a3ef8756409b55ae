//! Composite key behaviour through the public API

use keystone::test_helpers::{tenant_schema, MemoryExecutor};
use keystone::{
    apply_nullification, reference, resolve_foreign_key_columns, resolve_key_columns,
    Assignments, EntityInstance, Filter, KeyTuple, OrmError, Populate, QueryBuilder,
    RelationValue, SchemaGraph, Session, StorageErrorKind,
};
use sea_query::Value;

fn seeded(graph: &SchemaGraph) -> Session<'_, MemoryExecutor> {
    let mut session = Session::new(graph, MemoryExecutor::new(graph));
    session
        .create("Organisation", Assignments::new().with("id", 1))
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

fn tenant(id: i32) -> Assignments {
    Assignments::new()
        .with_relation("org", reference("Organisation", 1))
        .with("id", id)
}

#[test]
fn test_key_columns_follow_declared_order() {
    let graph = tenant_schema();
    let columns: Vec<_> = resolve_key_columns(&graph, "FormSubmission")
        .unwrap()
        .iter()
        .map(|k| (k.column.as_str(), k.path_string()))
        .collect();
    assert_eq!(
        columns,
        [("org_id", "org.id".to_string()), ("id", "id".to_string())]
    );

    let fk = resolve_foreign_key_columns(&graph, "FormSubmission", "form").unwrap();
    assert_eq!(fk.as_slice(), ["form_org_id", "form_id"]);
}

#[test]
fn test_four_shapes_build_identical_columns() {
    let graph = tenant_schema();
    let builder = QueryBuilder::new(&graph);
    let user = EntityInstance::new("User")
        .with_relation("org", reference("Organisation", 1))
        .with("id", 1);

    let shapes: Vec<RelationValue> = vec![
        reference("User", [1, 1]).into(),
        user.into(),
        RelationValue::key([1, 1]),
        RelationValue::key([1i64, 1i64]),
    ];
    let built: Vec<_> = shapes
        .into_iter()
        .map(|owner| {
            builder
                .build_insert("Form", &tenant(10).with("name", "intake").with_relation("owner", owner))
                .unwrap()
        })
        .collect();
    assert!(built.windows(2).all(|pair| pair[0] == pair[1]));

    let updates: Vec<_> = [
        RelationValue::from(reference("User", [1, 1])),
        RelationValue::key([1, 1]),
    ]
    .into_iter()
    .map(|owner| {
        builder
            .build_update("Form", &Assignments::new().with_relation("owner", owner))
            .unwrap()
    })
    .collect();
    assert_eq!(updates[0], updates[1]);
}

#[test]
fn test_clearing_twice_matches_clearing_once() {
    let graph = tenant_schema();
    let builder = QueryBuilder::new(&graph);
    let cleared = builder
        .build_update("Form", &Assignments::new().with_relation("owner", RelationValue::Null))
        .unwrap();
    assert_eq!(cleared, apply_nullification(&graph, "Form", "owner").unwrap());
    assert_eq!(
        apply_nullification(&graph, "Form", "owner").unwrap(),
        apply_nullification(&graph, "Form", "owner").unwrap()
    );
}

#[test]
fn test_round_trip_by_two_column_key() {
    let graph = tenant_schema();
    let mut session = seeded(&graph);
    session
        .insert("Form", &tenant(10).with("name", "intake"))
        .unwrap();

    let found = session
        .find_by_key("Form", [1, 10], Populate::None)
        .unwrap()
        .unwrap();
    assert_eq!(found.scalar("name"), Some(&Value::from("intake")));
    assert_eq!(
        found.reference("org").map(|r| r.key().clone()),
        Some(KeyTuple::from([1]))
    );
    assert!(session
        .find_by_key("Form", [2, 10], Populate::None)
        .unwrap()
        .is_none());
}

#[test]
fn test_find_through_nested_path_joins() {
    let graph = tenant_schema();
    let mut session = seeded(&graph);
    session
        .insert(
            "Form",
            &tenant(10)
                .with("name", "intake")
                .with_relation("owner", reference("User", [1, 1])),
        )
        .unwrap();
    session
        .insert("Form", &tenant(11).with("name", "orphan"))
        .unwrap();

    let owned = session
        .find("Form", &Filter::eq("owner.name", "ada"), ())
        .unwrap();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].scalar("id"), Some(&Value::Int(Some(10))));

    let unowned = session.find("Form", &Filter::is_null("owner"), ()).unwrap();
    assert_eq!(unowned.len(), 1);
    assert_eq!(unowned[0].scalar("id"), Some(&Value::Int(Some(11))));
}

#[test]
fn test_operation_errors() {
    let graph = tenant_schema();
    let mut session = seeded(&graph);

    assert!(matches!(
        session.insert("Form", &Assignments::new().with("id", 10)),
        Err(OrmError::UnresolvedKey { .. })
    ));
    assert!(matches!(
        session.insert(
            "Form",
            &tenant(10).with("name", "x").with_relation("owner", reference("User", [1]))
        ),
        Err(OrmError::ReferenceArity { expected: 2, actual: 1, .. })
    ));
    assert!(matches!(
        session.insert(
            "Form",
            &tenant(10).with("name", "x").with_relation("owner", reference("Form", [1, 1]))
        ),
        Err(OrmError::ReferenceTarget { .. })
    ));
    assert!(matches!(
        session.update("Form", [1, 10], &Assignments::new().with("id", 11)),
        Err(OrmError::ImmutableKey { .. })
    ));
    assert!(matches!(
        session.find("Form", &Filter::eq("owner.forms.owner.name", "ada"), ()),
        Err(OrmError::CyclicPath { .. })
    ));
    assert!(session.executor().rows("form").is_empty());
}

#[test]
fn test_storage_constraints_surface_unmodified() {
    let graph = tenant_schema();
    let mut session = seeded(&graph);
    session.insert("Form", &tenant(10).with("name", "a")).unwrap();

    let duplicate = session.insert("Form", &tenant(10).with("name", "b"));
    match duplicate {
        Err(OrmError::Storage(e)) => assert_eq!(e.kind, StorageErrorKind::ConstraintViolation),
        other => panic!("expected a storage error, got {other:?}"),
    }

    let dangling = session.insert(
        "Form",
        &tenant(11)
            .with("name", "c")
            .with_relation("owner", reference("User", [1, 99])),
    );
    assert!(matches!(dangling, Err(OrmError::Storage(_))));
}

#[test]
fn test_delete_applies_set_null_and_cascade() {
    let graph = tenant_schema();
    let mut session = seeded(&graph);
    session
        .insert(
            "Form",
            &tenant(10)
                .with("name", "intake")
                .with_relation("owner", reference("User", [1, 1])),
        )
        .unwrap();
    session
        .insert(
            "FormSubmission",
            &tenant(20).with_relation("form", reference("Form", [1, 10])),
        )
        .unwrap();
    session
        .insert(
            "Answer",
            &tenant(30)
                .with("value", "yes")
                .with_relation("submission", reference("FormSubmission", [1, 20])),
        )
        .unwrap();

    session.delete("Form", [1, 10]).unwrap();
    let submission = &session.executor().rows("form_submission")[0];
    assert_eq!(submission.get("form_org_id"), Some(&Value::Int(None)));
    assert_eq!(submission.get("form_id"), Some(&Value::Int(None)));

    session.delete("FormSubmission", [1, 20]).unwrap();
    assert!(session.executor().rows("answer").is_empty());

    session.delete("Organisation", [1]).unwrap();
    for table in ["user", "form", "form_submission"] {
        assert!(session.executor().rows(table).is_empty(), "{table} not cascaded");
    }
}

#[test]
fn test_deleting_owner_removes_orphaned_forms() {
    let graph = tenant_schema();
    let mut session = seeded(&graph);
    session
        .create(
            "User",
            Assignments::new()
                .with_relation("org", reference("Organisation", 1))
                .with("id", 2)
                .with("name", "grace"),
        )
        .unwrap();
    session.flush().unwrap();
    for (id, owner) in [(10, 1), (11, 2)] {
        session
            .insert(
                "Form",
                &tenant(id)
                    .with("name", "intake")
                    .with_relation("owner", reference("User", [1, owner])),
            )
            .unwrap();
    }
    session
        .insert(
            "FormSubmission",
            &tenant(20).with_relation("form", reference("Form", [1, 10])),
        )
        .unwrap();

    // Form.owner is SET NULL, but User.forms removes orphans
    assert_eq!(session.delete("User", [1, 1]).unwrap(), 1);
    let forms = session.executor().rows("form");
    assert_eq!(forms.len(), 1);
    assert_eq!(forms[0].get("id"), Some(&Value::Int(Some(11))));

    // the removed form's submissions still follow their own rule
    let submission = &session.executor().rows("form_submission")[0];
    assert_eq!(submission.get("form_id"), Some(&Value::Int(None)));
}
