//! Table DDL, schema synchronization and nested transactions

mod common;

use rowkeeper::value::record;
use rowkeeper::{Column, ColumnType, OrmError, Query, Storage, Table};
use sea_query::Value;
use std::rc::Rc;

fn column_names(db: &Rc<rowkeeper::Database>, table: &str) -> Vec<String> {
    db.query(&format!("PRAGMA table_info(\"{}\")", table), &[])
        .expect("pragma")
        .iter()
        .map(|row| rowkeeper::value::as_string(row.get("name").expect("name")))
        .collect()
}

#[test]
fn test_create_is_idempotent_and_replace_drops_rows() {
    let db = common::database();
    let table = common::people(&db);
    table
        .insert(&record([("name", Value::from("kept"))]))
        .expect("insert");

    assert!(table.create(false).expect("create again"));
    assert_eq!(table.count_rows(&Query::all()).expect("count"), 1);

    assert!(table.create(true).expect("replace"));
    assert_eq!(table.count_rows(&Query::all()).expect("count"), 0);

    assert!(Table::drop(&table).expect("drop"));
    assert!(Table::drop(&table).expect("drop again"));
}

#[test]
fn test_synchronize_preserves_rows_across_rebuild() {
    let db = common::database();
    let old = Table::new(
        Rc::clone(&db),
        "items",
        vec![
            Column::new("id", ColumnType::Integer).primary_key().auto_increment(),
            Column::new("title", ColumnType::String),
            Column::new("price", ColumnType::String),
            Column::new("legacy", ColumnType::String).nullable(),
        ],
    );
    old.create(false).expect("create");
    old.insert(&record([
        ("title", Value::from("lamp")),
        ("price", Value::from("12")),
        ("legacy", Value::from("x")),
    ]))
    .expect("insert");

    let new = Table::new(
        Rc::clone(&db),
        "items",
        vec![
            Column::new("id", ColumnType::Integer).primary_key().auto_increment(),
            Column::new("title", ColumnType::String),
            Column::new("price", ColumnType::Integer),
            Column::new("stock", ColumnType::Integer),
        ],
    );
    assert!(new.synchronize().expect("synchronize"));

    assert_eq!(column_names(&db, "items"), vec!["id", "title", "price", "stock"]);
    let rows = new.select(&Query::all()).expect("rows");
    assert_eq!(
        rows,
        vec![record([
            ("id", Value::from(1i64)),
            ("title", Value::from("lamp")),
            ("price", Value::from(12i64)),
            ("stock", Value::from(0i64)),
        ])]
    );
    assert!(!db.in_transaction());
}

#[test]
fn test_synchronize_adds_columns_in_place() {
    let db = common::database();
    let table = common::people(&db);
    table
        .insert(&record([("name", Value::from("a"))]))
        .expect("insert");

    let wider = Table::new(
        Rc::clone(&db),
        "people",
        table
            .columns()
            .iter()
            .cloned()
            .chain([Column::new("email", ColumnType::String).nullable()])
            .collect(),
    );
    assert!(wider.synchronize().expect("synchronize"));
    assert_eq!(column_names(&db, "people"), vec!["id", "name", "age", "email"]);
    assert_eq!(wider.count_rows(&Query::all()).expect("count"), 1);
}

#[test]
fn test_nested_transactions_commit_once() {
    let db = common::database();
    let table = common::people(&db);

    db.begin_transaction().expect("outer");
    db.begin_transaction().expect("inner");
    table
        .insert(&record([("name", Value::from("t"))]))
        .expect("insert");
    db.commit().expect("inner commit");
    assert!(db.in_transaction());
    db.commit().expect("outer commit");
    assert!(!db.in_transaction());
    assert_eq!(table.count_rows(&Query::all()).expect("count"), 1);
}

#[test]
fn test_inner_rollback_poisons_outer_commit() {
    let db = common::database();
    let table = common::people(&db);

    let result = db.transaction(|db| {
        table.insert(&record([("name", Value::from("doomed"))]))?;
        db.transaction(|_| -> rowkeeper::Result<()> {
            Err(OrmError::InvalidConditions("inner failure".into()))
        })
        .ok();
        Ok(())
    });
    assert_eq!(result, Err(OrmError::RollbackOnly));
    assert!(!db.in_transaction());
    assert_eq!(table.count_rows(&Query::all()).expect("count"), 0);
}
