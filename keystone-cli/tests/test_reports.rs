//! Tests for the CLI reports

use keystone::{Dialect, OrmConfig};
use keystone_cli::{check_report, columns_report, ddl_report, load_graph};
use std::io::Write;

const TENANT_JSON: &str = r#"
{
    "entities": [
        { "name": "Organisation", "fields": [{ "name": "id", "type": "integer", "primary": true }] },
        {
            "name": "Common",
            "abstract": true,
            "primary_key": ["org", "id"],
            "fields": [{ "name": "id", "type": "integer", "primary": true }],
            "relations": [
                { "name": "org", "kind": "many_to_one", "target": "Organisation", "primary": true, "on_delete": "cascade" }
            ]
        },
        {
            "name": "User",
            "extends": "Common",
            "fields": [{ "name": "name", "type": "text" }]
        },
        {
            "name": "Form",
            "extends": "Common",
            "fields": [{ "name": "name", "type": "text" }],
            "relations": [
                { "name": "owner", "kind": "many_to_one", "target": "User", "nullable": true, "on_delete": "set_null" }
            ]
        }
    ]
}"#;

fn description_file(json: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

#[test]
fn test_columns_report_shows_inherited_key_paths() {
    let file = description_file(TENANT_JSON);
    let graph = load_graph(Some(file.path()), &OrmConfig::default()).unwrap();
    let report = columns_report(&graph, Some("Form")).unwrap();

    assert!(report.starts_with("Form (form)\n"));
    assert!(report.contains("key  org_id  <- org.id (integer)"));
    assert!(report.contains("key  id      <- id (integer)"));
    assert!(report.contains("fk   owner -> User: owner_org_id, owner_id"));
}

#[test]
fn test_columns_report_unknown_entity() {
    let file = description_file(TENANT_JSON);
    let graph = load_graph(Some(file.path()), &OrmConfig::default()).unwrap();
    let err = columns_report(&graph, Some("Invoice")).unwrap_err();
    assert!(err.to_string().contains("Invoice"));
}

#[test]
fn test_check_report_lists_concrete_entities() {
    let file = description_file(TENANT_JSON);
    let graph = load_graph(Some(file.path()), &OrmConfig::default()).unwrap();
    let report = check_report(&graph).unwrap();

    assert_eq!(report.lines().count(), 3);
    assert!(report.contains("Organisation: 1-column key, depth 0"));
    assert!(report.contains("Form: 2-column key, depth 1, 5 column(s)"));
}

#[test]
fn test_ddl_report_orders_parents_first() {
    let file = description_file(TENANT_JSON);
    let graph = load_graph(Some(file.path()), &OrmConfig::default()).unwrap();
    let ddl = ddl_report(&graph, Dialect::Sqlite);

    let organisation = ddl.find(r#"CREATE TABLE IF NOT EXISTS "organisation""#).unwrap();
    let form = ddl.find(r#"CREATE TABLE IF NOT EXISTS "form""#).unwrap();
    assert!(organisation < form);
    assert_eq!(ddl.matches(";\n").count(), 3);
}

#[test]
fn test_invalid_descriptions_are_reported() {
    let file = description_file(
        r#"[{ "name": "Form", "fields": [{ "name": "name", "type": "text" }] }]"#,
    );
    let err = load_graph(Some(file.path()), &OrmConfig::default()).unwrap_err();
    assert!(format!("{err:#}").contains("no primary key components"));
}

#[test]
fn test_missing_file_setting() {
    let err = load_graph(None, &OrmConfig::default()).unwrap_err();
    assert!(err.to_string().contains("--file"));
}
