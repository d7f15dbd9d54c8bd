//! SQLite schema introspection and synchronization.
//!
//! SQLite can add columns in place but cannot modify or drop them, nor
//! change a primary key. Those changes rebuild the table: a `{name}__sync`
//! copy is created from the declared columns, shared data is copied over,
//! the old table is dropped and the copy renamed, inside one transaction.

use super::{LiveColumn, Table};
use crate::error::Result;
use crate::executor::Dialect;
use crate::query::column::ColumnType;
use crate::table::Storage;
use crate::value;

pub(super) fn live_columns(table: &Table) -> Result<Vec<LiveColumn>> {
    let sql = format!("PRAGMA table_info({})", table.escape_column(table.name()));
    let rows = table.database().query(&sql, &[])?;
    Ok(rows
        .iter()
        .map(|row| LiveColumn {
            name: row.get("name").map(value::as_string).unwrap_or_default(),
            family: ColumnType::family_of_declared(
                &row.get("type").map(value::as_string).unwrap_or_default(),
            ),
            nullable: row.get("notnull").map(value::as_i64).unwrap_or(0) == 0,
            primary_key: row.get("pk").map(value::as_i64).unwrap_or(0) > 0,
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

    // ADD COLUMN cannot add a NOT NULL column without a default
    let additive = diff.modified.is_empty()
        && diff.removed.is_empty()
        && !diff.primary_key_changed
        && diff
            .added
            .iter()
            .all(|c| c.is_nullable() || c.get_default_value().is_some());

    if additive {
        for column in &diff.added {
            let mut def = column.to_column_def(Dialect::Sqlite, false);
            let stmt = sea_query::Table::alter()
                .table(table.name().to_string())
                .add_column(&mut def)
                .to_owned();
            let sql = build_for!(Dialect::Sqlite, stmt);
            table.database().execute(&sql, &[])?;
            log::debug!("added column {}.{}", table.name(), column.name());
        }
        return Ok(true);
    }

    log::info!(
        "rebuilding table {} (modified: {}, removed: {:?}, key changed: {})",
        table.name(),
        diff.modified.len(),
        diff.removed,
        diff.primary_key_changed
    );
    rebuild(table, &live)
}

fn rebuild(table: &Table, live: &[LiveColumn]) -> Result<bool> {
    let db = table.database();
    let temp = format!("{}__sync", table.name());

    let mut targets = Vec::new();
    let mut sources = Vec::new();
    for column in table.columns() {
        let escaped = table.escape_column(column.name());
        let zero = db.escape(&column.format(&value::null()));
        let present = live.iter().any(|l| l.name == column.name());
        let source = match (present, column.is_nullable()) {
            (true, true) => escaped.clone(),
            (true, false) => format!("COALESCE({}, {})", escaped, zero),
            (false, false) if column.get_default_value().is_none() => zero,
            _ => continue,
        };
        targets.push(escaped);
        sources.push(source);
    }

    db.transaction(|db| {
        let create = table.create_statement(&temp, false)?;
        db.execute(&build_for!(Dialect::Sqlite, create), &[])?;

        if !targets.is_empty() {
            let copy = format!(
                "INSERT INTO {} ({}) SELECT {} FROM {}",
                table.escape_column(&temp),
                targets.join(", "),
                sources.join(", "),
                table.escape_column(table.name())
            );
            db.execute(&copy, &[])?;
        }

        let drop = sea_query::Table::drop()
            .table(table.name().to_string())
            .to_owned();
        db.execute(&build_for!(Dialect::Sqlite, drop), &[])?;

        let rename = sea_query::Table::rename()
            .table(temp.clone(), table.name().to_string())
            .to_owned();
        db.execute(&build_for!(Dialect::Sqlite, rename), &[])?;
        Ok(true)
    })
}
