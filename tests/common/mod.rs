//! Shared fixtures for integration tests (in-memory SQLite)

#![allow(dead_code)]

use rowkeeper::config::DatabaseConfig;
use rowkeeper::{Column, ColumnType, Database, EventDispatcher, Model, Storage, Table};
use std::rc::Rc;

pub fn database() -> Rc<Database> {
    Database::connect(&DatabaseConfig::default()).expect("in-memory database")
}

/// `people(id, name, age?)` with an auto-increment key
pub fn people(db: &Rc<Database>) -> Rc<Table> {
    let table = Table::new(
        Rc::clone(db),
        "people",
        vec![
            Column::new("id", ColumnType::Integer).primary_key().auto_increment(),
            Column::new("name", ColumnType::String),
            Column::new("age", ColumnType::Integer).nullable(),
        ],
    );
    table.create(false).expect("create people");
    Rc::new(table)
}

pub fn model(table: &Rc<Table>, events: &Rc<EventDispatcher>) -> Model {
    let storage: Rc<dyn Storage> = Rc::clone(table) as Rc<dyn Storage>;
    Model::new(storage, Rc::clone(events))
}
