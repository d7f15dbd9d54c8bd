//! # Rowkeeper
//!
//! Row-based model persistence for SQLite and MySQL.
//!
//! A [`Table`] describes a relational table through its [`Column`]s and
//! serves the uniform [`Storage`] contract. A [`Model`] caches one row,
//! tracks which fields changed and buffers writes until they are needed.
//! Every change goes through an [`Operation`], whose `before`/`after`
//! events can be intercepted on an [`EventDispatcher`] and which can be
//! reverted later.
//!
//! ```
//! use std::rc::Rc;
//! use rowkeeper::{Column, ColumnType, Database, EventDispatcher, Model, Operation, Query, Table};
//! use rowkeeper::config::DatabaseConfig;
//! use rowkeeper::value::record;
//!
//! let db = Database::connect(&DatabaseConfig::default()).unwrap();
//! let notes = Rc::new(Table::new(db, "notes", vec![
//!     Column::new("id", ColumnType::Integer).primary_key().auto_increment(),
//!     Column::new("body", ColumnType::Text),
//! ]));
//! notes.create(false).unwrap();
//!
//! let events = Rc::new(EventDispatcher::new());
//! let mut note = Model::new(notes.clone(), events);
//! note.execute(Operation::create(record([("body", "first".into())])), None).unwrap();
//! note.execute_actions().unwrap();
//! assert_eq!(notes.count_rows(&Query::all()).unwrap(), 1);
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod executor;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod model;
pub mod operation;
pub mod query;
pub mod table;
pub mod testing;
pub mod transaction;
pub mod validation;
pub mod value;

#[cfg(feature = "tracing")]
mod tracing_helpers;

pub use config::RowkeeperConfig;
pub use database::Database;
pub use error::{OrmError, Result};
pub use events::{EventDispatcher, OperationEvent, Phase, Verb};
pub use executor::{Dialect, Executor, SqliteExecutor};
pub use model::{Id, Model, ModelBinder, ModelsList, Prototype, State};
pub use operation::{Action, Crud, Operation, OperationQueue, Outcome};
pub use query::column::{Column, ColumnType};
pub use query::condition::{Cond, Condition};
pub use query::{Filter, Query};
pub use table::{Storage, Table};
pub use validation::{ValidationErrors, Validator};
pub use value::Record;
