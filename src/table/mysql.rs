//! MySQL schema introspection and synchronization.
//!
//! MySQL alters columns in place, so each difference becomes its own
//! `ALTER TABLE` (ADD, MODIFY or DROP COLUMN). A changed key set is
//! replaced last with `DROP PRIMARY KEY, ADD PRIMARY KEY (...)`.

use super::{LiveColumn, Table};
use crate::error::Result;
use crate::executor::Dialect;
use crate::query::column::ColumnType;
use crate::table::Storage;
use crate::value;
use sea_query::Value;

fn table_exists(table: &Table) -> Result<bool> {
    let rows = table
        .database()
        .query("SHOW TABLES LIKE ?", &[Value::from(table.name())])?;
    Ok(!rows.is_empty())
}

pub(super) fn live_columns(table: &Table) -> Result<Vec<LiveColumn>> {
    if !table_exists(table)? {
        return Ok(Vec::new());
    }
    let sql = format!("SHOW COLUMNS FROM {}", table.escape_column(table.name()));
    let rows = table.database().query(&sql, &[])?;
    Ok(rows
        .iter()
        .map(|row| {
            let text = |key: &str| row.get(key).map(value::as_string).unwrap_or_default();
            LiveColumn {
                name: text("Field"),
                family: ColumnType::family_of_declared(&text("Type")),
                nullable: text("Null").eq_ignore_ascii_case("yes"),
                primary_key: text("Key").eq_ignore_ascii_case("pri"),
            }
        })
        .collect())
}

pub(super) fn synchronize(table: &Table) -> Result<bool> {
    let live = live_columns(table)?;
    if live.is_empty() {
        return table.create(false);
    }
    let diff = table.diff(&live);
    if diff.is_empty() {
        return Ok(true);
    }
    let db = table.database();

    for column in &diff.added {
        let mut def = column.to_column_def(Dialect::MySql, false);
        let stmt = sea_query::Table::alter()
            .table(table.name().to_string())
            .add_column(&mut def)
            .to_owned();
        db.execute(&build_for!(Dialect::MySql, stmt), &[])?;
    }
    for column in &diff.modified {
        let mut def = column.to_column_def(Dialect::MySql, false);
        let stmt = sea_query::Table::alter()
            .table(table.name().to_string())
            .modify_column(&mut def)
            .to_owned();
        db.execute(&build_for!(Dialect::MySql, stmt), &[])?;
    }
    for name in &diff.removed {
        let stmt = sea_query::Table::alter()
            .table(table.name().to_string())
            .drop_column(name.clone())
            .to_owned();
        db.execute(&build_for!(Dialect::MySql, stmt), &[])?;
    }

    if diff.primary_key_changed {
        let key: Vec<String> = table
            .primary_key()
            .iter()
            .map(|k| table.escape_column(k))
            .collect();
        let had_key = live.iter().any(|l| l.primary_key);
        let mut clauses = Vec::new();
        if had_key {
            clauses.push("DROP PRIMARY KEY".to_string());
        }
        if !key.is_empty() {
            clauses.push(format!("ADD PRIMARY KEY ({})", key.join(", ")));
        }
        if !clauses.is_empty() {
            let sql = format!(
                "ALTER TABLE {} {}",
                table.escape_column(table.name()),
                clauses.join(", ")
            );
            db.execute(&sql, &[])?;
        }
    }

    log::info!(
        "synchronized table {} (+{} ~{} -{})",
        table.name(),
        diff.added.len(),
        diff.modified.len(),
        diff.removed.len()
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use crate::database::Database;
    use crate::executor::Dialect;
    use crate::query::column::{Column, ColumnType};
    use crate::table::Table;
    use crate::testing::{row, RecordingExecutor};
    use sea_query::Value;
    use std::rc::Rc;

    fn show_column(field: &str, ty: &str, null: &str, key: &str) -> crate::executor::Row {
        row([
            ("Field", Value::from(field)),
            ("Type", Value::from(ty)),
            ("Null", Value::from(null)),
            ("Key", Value::from(key)),
            ("Default", Value::String(None)),
            ("Extra", Value::from("")),
        ])
    }

    #[test]
    fn test_synchronize_creates_when_missing() {
        let exec = RecordingExecutor::new(Dialect::MySql);
        let log = exec.log();
        let table = Table::new(
            Rc::new(Database::new(exec)),
            "items",
            vec![Column::new("id", ColumnType::Integer).primary_key()],
        );
        table.synchronize().expect("sync");
        let statements = log.statements();
        assert_eq!(statements[0], "SHOW TABLES LIKE ?");
        assert!(statements[1].starts_with("CREATE TABLE IF NOT EXISTS `items`"));
    }

    #[test]
    fn test_synchronize_emits_one_alter_per_change() {
        let exec = RecordingExecutor::new(Dialect::MySql);
        let log = exec.log();
        let responses = exec.responses();
        responses.push(vec![row([("Tables_in_app", Value::from("items"))])]);
        responses.push(vec![
            show_column("id", "bigint", "NO", "PRI"),
            show_column("title", "varchar(255)", "NO", ""),
            show_column("price", "text", "NO", ""),
            show_column("obsolete", "int", "YES", ""),
        ]);

        let table = Table::new(
            Rc::new(Database::new(exec)),
            "items",
            vec![
                Column::new("id", ColumnType::Integer).primary_key(),
                Column::new("title", ColumnType::String),
                Column::new("price", ColumnType::Float),
                Column::new("sku", ColumnType::String).primary_key(),
            ],
        );
        table.synchronize().expect("sync");

        let writes: Vec<String> = log.writes().into_iter().map(|s| s.sql).collect();
        assert_eq!(writes.len(), 4);
        assert!(writes[0].starts_with("ALTER TABLE `items` ADD COLUMN `sku`"));
        assert!(writes[1].starts_with("ALTER TABLE `items` MODIFY COLUMN `price` double"));
        assert_eq!(writes[2], "ALTER TABLE `items` DROP COLUMN `obsolete`");
        assert_eq!(
            writes[3],
            "ALTER TABLE `items` DROP PRIMARY KEY, ADD PRIMARY KEY (`id`, `sku`)"
        );
    }

    #[test]
    fn test_synchronize_noop_when_schema_matches() {
        let exec = RecordingExecutor::new(Dialect::MySql);
        let log = exec.log();
        let responses = exec.responses();
        responses.push(vec![row([("Tables_in_app", Value::from("items"))])]);
        responses.push(vec![show_column("id", "bigint unsigned", "NO", "PRI")]);

        let table = Table::new(
            Rc::new(Database::new(exec)),
            "items",
            vec![Column::new("id", ColumnType::Integer)
                .primary_key()
                .property("unsigned", "true")],
        );
        assert!(table.synchronize().expect("sync"));
        assert!(log.writes().is_empty());
    }
}
