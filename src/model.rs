//! Row-backed models.
//!
//! A [`Model`] binds an identity, a cache of field values and a set of
//! dirty fields to a shared [`Storage`]. Changes arrive as
//! [`Operation`]s through [`Model::execute`], which moves the model through
//! its [`State`]s:
//!
//! ```text
//! Empty ──create──▶ Create ──flush──▶ Nop
//! Empty/Nop ──update──▶ Update ──flush──▶ Nop
//! any ──delete──▶ Empty
//! ```
//!
//! With buffering on (the default) the flush is deferred until the model's
//! id is needed or the model is dropped; with buffering off every
//! operation writes immediately.
//!
//! # Examples
//!
//! ```
//! use std::rc::Rc;
//! use rowkeeper::{Column, ColumnType, Database, EventDispatcher, Model, Operation, Table};
//! use rowkeeper::config::DatabaseConfig;
//! use rowkeeper::value::record;
//!
//! let db = Database::connect(&DatabaseConfig::default()).unwrap();
//! let table = Table::new(db, "posts", vec![
//!     Column::new("id", ColumnType::Integer).primary_key().auto_increment(),
//!     Column::new("title", ColumnType::String),
//! ]);
//! table.create(false).unwrap();
//!
//! let mut post = Model::new(Rc::new(table), Rc::new(EventDispatcher::new()));
//! post.execute(Operation::create(record([("title", "Hello".into())])), None).unwrap();
//! assert!(post.get_id().unwrap().is_some());
//! ```

pub mod binder;
pub mod id;
pub mod list;

pub use binder::ModelBinder;
pub use id::Id;
pub use list::{ModelsList, Prototype};

use crate::config::{ModelConfig, RowkeeperConfig};
use crate::error::{OrmError, Result};
use crate::events::EventDispatcher;
use crate::operation::{Crud, Operation, OperationQueue, Outcome};
use crate::query::{Columns, Filter, Query};
use crate::table::Storage;
use crate::validation::{ValidationErrors, Validator};
use crate::value::{self, Record};
use sea_query::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

/// Lifecycle state of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No pending write
    Empty,
    /// Fields staged for insert
    Create,
    /// Fields staged for update
    Update,
    /// Flushed
    Nop,
}

pub struct Model {
    storage: Rc<dyn Storage>,
    events: Rc<EventDispatcher>,
    id: Option<Id>,
    data: Record,
    changed: BTreeSet<String>,
    /// `None` until looked up
    exists: Option<bool>,
    state: State,
    buffering: bool,
    strict_revert: bool,
    errors: ValidationErrors,
    queue: OperationQueue,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("table", &self.storage.name())
            .field("id", &self.id)
            .field("state", &self.state)
            .field("data", &self.data)
            .field("changed", &self.changed)
            .field("exists", &self.exists)
            .finish()
    }
}

impl Model {
    pub fn new(storage: Rc<dyn Storage>, events: Rc<EventDispatcher>) -> Self {
        Self {
            storage,
            events,
            id: None,
            data: Record::new(),
            changed: BTreeSet::new(),
            exists: Some(false),
            state: State::Empty,
            buffering: ModelConfig::default().buffering,
            strict_revert: false,
            errors: ValidationErrors::new(),
            queue: OperationQueue::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<Id>) -> Self {
        self.set_id(Some(id.into()));
        self
    }

    /// Take buffering and revert strictness from the configuration
    pub fn with_config(mut self, config: &RowkeeperConfig) -> Self {
        self.buffering = config.model.buffering;
        self.strict_revert = config.operations.strict_revert;
        self
    }

    pub fn set_buffering(&mut self, buffering: bool) {
        self.buffering = buffering;
    }

    pub fn is_buffering(&self) -> bool {
        self.buffering
    }

    pub fn storage(&self) -> &Rc<dyn Storage> {
        &self.storage
    }

    pub fn events(&self) -> &Rc<EventDispatcher> {
        &self.events
    }

    /// Run an operation against this model
    ///
    /// With a validator, the operation's field data is validated first; on
    /// failure the errors are merged into [`errors`](Self::errors) and
    /// `Outcome::Done(false)` is returned without touching storage. An
    /// operation the model has no method for also yields `Done(false)`.
    pub fn execute(
        &mut self,
        operation: Operation,
        validator: Option<&dyn Validator>,
    ) -> Result<Outcome> {
        if let (Some(validator), Some(data)) = (validator, operation.action().data()) {
            if let Err(errors) = validator.validate(data) {
                log::debug!(
                    "{} on {} rejected by validation: {}",
                    operation.verb().as_str(),
                    self.storage.name(),
                    errors
                );
                self.errors.merge(errors);
                return Ok(Outcome::Done(false));
            }
        }

        let mut operation = if self.strict_revert {
            operation.with_strict_revert(true)
        } else {
            operation
        };
        let events = Rc::clone(&self.events);
        let outcome = operation.execute(self, &events)?;
        self.queue.push(operation);
        Ok(outcome.unwrap_or(Outcome::Done(false)))
    }

    /// Write staged changes to storage
    ///
    /// A create inserts the dirty fields plus any explicit id fields and
    /// adopts the generated id when none was given. An update writes only
    /// dirty fields and is a successful no-op when there are none.
    ///
    /// # Errors
    ///
    /// `MissingId` for an update on a model without a usable id, or the
    /// storage error.
    pub fn execute_actions(&mut self) -> Result<bool> {
        match self.state {
            State::Empty | State::Nop => Ok(true),
            State::Create => self.flush_create(),
            State::Update => self.flush_update(),
        }
    }

    fn flush_create(&mut self) -> Result<bool> {
        let mut values = self.dirty_values();
        let explicit = self.normalized_id();
        for (key, v) in &explicit {
            values.entry(key.clone()).or_insert_with(|| v.clone());
        }
        self.storage.insert(&values)?;

        let primary_key = self.storage.primary_key();
        if explicit.is_empty() {
            if let Some(id) = Id::from_fields(&self.data, &primary_key) {
                self.id = Some(id);
            } else if let Some(generated) = self.storage.last_insert_id() {
                if let [key] = primary_key.as_slice() {
                    self.data.insert(key.clone(), Value::from(generated));
                }
                self.id = Some(Id::Single(Value::from(generated)));
            }
        } else {
            for (key, v) in explicit {
                self.data.entry(key).or_insert(v);
            }
        }
        log::debug!("flushed create on {} with id {:?}", self.storage.name(), self.id);

        self.exists = self.id.as_ref().map(|_| true);
        self.changed.clear();
        self.state = State::Nop;
        Ok(true)
    }

    fn flush_update(&mut self) -> Result<bool> {
        let values = self.dirty_values();
        if values.is_empty() {
            self.state = State::Nop;
            return Ok(true);
        }
        let key = self.normalized_id();
        if key.is_empty() {
            return Err(OrmError::MissingId {
                table: self.storage.name().to_string(),
            });
        }
        self.storage.update(&Filter::from(key), &values)?;

        let primary_key = self.storage.primary_key();
        if primary_key.iter().any(|k| values.contains_key(k)) {
            if let Some(id) = Id::from_fields(&self.data, &primary_key) {
                self.id = Some(id);
            }
        }
        log::debug!(
            "flushed update on {} ({} fields)",
            self.storage.name(),
            values.len()
        );
        self.changed.clear();
        self.state = State::Nop;
        Ok(true)
    }

    fn dirty_values(&self) -> Record {
        self.changed
            .iter()
            .filter_map(|k| self.data.get(k).map(|v| (k.clone(), v.clone())))
            .collect()
    }

    fn flush_unless_buffered(&mut self) -> Result<()> {
        if !self.buffering {
            self.execute_actions()?;
        }
        Ok(())
    }

    /// Field values, fetching only the fields not cached yet
    ///
    /// `None` asks for every declared column.
    pub fn get_data(&mut self, fields: Option<&[String]>) -> Result<Record> {
        let wanted: Option<Vec<String>> = match fields {
            Some(list) => Some(list.to_vec()),
            None if self.storage.columns().is_empty() => None,
            None => Some(
                self.storage
                    .columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect(),
            ),
        };

        let fetch = match &wanted {
            Some(list) => {
                let missing: Vec<String> = list
                    .iter()
                    .filter(|f| !self.data.contains_key(*f))
                    .cloned()
                    .collect();
                (!missing.is_empty()).then_some(Columns::List(missing))
            }
            None => Some(Columns::All),
        };

        if let Some(columns) = fetch {
            if self.exists()? {
                let query = Query::new(Filter::from(self.normalized_id()))
                    .columns(columns)
                    .limit(1);
                if let Some(row) = self.storage.get(&query)?.into_iter().next() {
                    for (field, v) in row {
                        self.data.entry(field).or_insert(v);
                    }
                }
            }
        }

        Ok(match wanted {
            Some(list) => list
                .into_iter()
                .filter_map(|f| self.data.get(&f).cloned().map(|v| (f, v)))
                .collect(),
            None => self.data.clone(),
        })
    }

    /// Replace or extend the cached data without marking anything dirty
    pub fn set_data(&mut self, data: Record, merge: bool) {
        if merge {
            self.data.extend(data);
        } else {
            self.data = data;
            self.changed.retain(|k| self.data.contains_key(k));
        }
    }

    /// Whether the row exists; looked up once per id
    pub fn exists(&mut self) -> Result<bool> {
        if self.id.is_none() {
            return Ok(false);
        }
        if let Some(known) = self.exists {
            return Ok(known);
        }
        let key = self.normalized_id();
        let found = !key.is_empty() && self.storage.isset(&Query::new(Filter::from(key)))?;
        self.exists = Some(found);
        Ok(found)
    }

    /// The model's id, flushing a buffered create that still needs one
    pub fn get_id(&mut self) -> Result<Option<Id>> {
        if self.buffering
            && self.state == State::Create
            && self.id.is_none()
            && !self.data.is_empty()
        {
            self.execute_actions()?;
        }
        Ok(self.id.clone())
    }

    /// Set or clear the id; existence is re-checked on next use
    pub fn set_id(&mut self, id: Option<Id>) {
        let id = id.filter(|i| !i.is_null());
        self.exists = if id.is_none() { Some(false) } else { None };
        self.id = id;
    }

    /// The id as a `{key column: value}` map
    ///
    /// Values are formatted through the key columns. An id that does not
    /// fit the primary key is logged and yields an empty map.
    pub fn normalized_id(&self) -> Record {
        let Some(id) = &self.id else {
            return Record::new();
        };
        let primary_key = self.storage.primary_key();
        match id.normalize(&primary_key) {
            Some(map) => map
                .into_iter()
                .map(|(key, v)| {
                    let v = match self.storage.column(&key) {
                        Some(column) => column.format(&v),
                        None => v,
                    };
                    (key, v)
                })
                .collect(),
            None => {
                log::warn!(
                    "id {:?} does not match primary key {:?} of {}",
                    id,
                    primary_key,
                    self.storage.name()
                );
                Record::new()
            }
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn changed_fields(&self) -> Vec<String> {
        self.changed.iter().cloned().collect()
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    pub fn operations(&self) -> &OperationQueue {
        &self.queue
    }

    /// Undo the newest revertible operation
    pub fn revert_last(&mut self) -> Result<Option<Outcome>> {
        let mut queue = std::mem::take(&mut self.queue);
        let events = Rc::clone(&self.events);
        let result = queue.revert_last(self, &events);
        self.queue = queue;
        result
    }

    /// Undo every revertible operation, newest first
    pub fn revert_all(&mut self) -> Result<Vec<Outcome>> {
        let mut queue = std::mem::take(&mut self.queue);
        let events = Rc::clone(&self.events);
        let result = queue.revert_all(self, &events);
        self.queue = queue;
        result
    }

    /// Column name for this model's id in a join row: `{table}_{key}`
    ///
    /// # Errors
    ///
    /// `UnbindableModel` unless the primary key has exactly one column.
    pub fn binding_field_name(&self) -> Result<String> {
        match self.storage.primary_key().as_slice() {
            [key] => Ok(format!("{}_{}", self.storage.name(), key)),
            _ => Err(OrmError::UnbindableModel {
                table: self.storage.name().to_string(),
            }),
        }
    }

    /// Fresh model on the same storage and settings
    pub fn blank(&self) -> Model {
        let mut model = Model::new(Rc::clone(&self.storage), Rc::clone(&self.events));
        model.buffering = self.buffering;
        model.strict_revert = self.strict_revert;
        model
    }

    /// Load a fetched row as the model's clean state
    pub(crate) fn hydrate(&mut self, row: Record) {
        self.id = Id::from_fields(&row, &self.storage.primary_key());
        self.exists = Some(self.id.is_some());
        self.data = row;
        self.changed.clear();
        self.state = State::Nop;
    }
}

impl Crud for Model {
    fn target_name(&self) -> &str {
        self.storage.name()
    }

    fn create(&mut self, data: &Record) -> Result<Option<Outcome>> {
        self.state = State::Create;
        self.data = data.clone();
        self.changed = data.keys().cloned().collect();
        if self.id.is_some() {
            self.exists = None;
        }
        self.flush_unless_buffered()?;
        Ok(Some(Outcome::Done(true)))
    }

    fn read(&mut self, fields: Option<&[String]>) -> Result<Option<Outcome>> {
        Ok(Some(Outcome::Data(self.get_data(fields)?)))
    }

    fn update(&mut self, data: &Record) -> Result<Option<Outcome>> {
        if self.state != State::Create {
            if self.id.is_none() {
                return Err(OrmError::MissingId {
                    table: self.storage.name().to_string(),
                });
            }
            self.state = State::Update;
        }
        for (field, v) in data {
            let unchanged = self
                .data
                .get(field)
                .is_some_and(|current| value::same_value(current, v));
            if !unchanged {
                self.changed.insert(field.clone());
                self.data.insert(field.clone(), v.clone());
            }
        }
        self.flush_unless_buffered()?;
        Ok(Some(Outcome::Done(true)))
    }

    fn delete(&mut self) -> Result<Option<Outcome>> {
        let existed = self.exists()?;
        if existed {
            self.storage
                .unset(&Query::new(Filter::from(self.normalized_id())))?;
        }
        self.state = State::Empty;
        self.data.clear();
        self.changed.clear();
        self.set_id(None);
        Ok(Some(Outcome::Done(existed)))
    }

    fn supports_revert(&self) -> bool {
        true
    }

    fn snapshot(&mut self, fields: &[String]) -> Result<Option<Record>> {
        let data = if fields.is_empty() {
            self.get_data(None)?
        } else {
            self.get_data(Some(fields))?
        };
        Ok(Some(data))
    }
}

impl Drop for Model {
    fn drop(&mut self) {
        if matches!(self.state, State::Create | State::Update) {
            if let Err(e) = self.execute_actions() {
                log::warn!(
                    "failed to flush {} model on drop: {}",
                    self.storage.name(),
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::executor::Dialect;
    use crate::query::column::{Column, ColumnType};
    use crate::table::Table;
    use crate::testing::{row, RecordingExecutor, StatementLog};
    use crate::validation::{Rule, RuleSet};
    use crate::value::record;

    fn recorded() -> (Model, StatementLog, crate::testing::ResponseQueue) {
        let exec = RecordingExecutor::new(Dialect::Sqlite).with_insert_ids(1);
        let log = exec.log();
        let responses = exec.responses();
        let table = Table::new(
            Rc::new(Database::new(exec)),
            "people",
            vec![
                Column::new("id", ColumnType::Integer).primary_key().auto_increment(),
                Column::new("name", ColumnType::String),
                Column::new("age", ColumnType::Integer).nullable(),
            ],
        );
        let model = Model::new(Rc::new(table), Rc::new(EventDispatcher::new()));
        (model, log, responses)
    }

    fn person(name: &str) -> Record {
        record([("name", Value::from(name))])
    }

    #[test]
    fn test_buffered_create_waits_for_id() {
        let (mut model, log, _) = recorded();
        model
            .execute(Operation::create(person("Ann")), None)
            .expect("create");
        assert_eq!(model.state(), State::Create);
        assert!(log.writes().is_empty());

        let id = model.get_id().expect("id");
        assert_eq!(id, Some(Id::Single(Value::from(1i64))));
        assert_eq!(log.writes().len(), 1);
        assert_eq!(model.state(), State::Nop);
        assert!(model.exists().expect("exists"));
        assert!(log.reads().is_empty(), "exists is known after insert");
    }

    #[test]
    fn test_unbuffered_create_writes_immediately() {
        let (mut model, log, _) = recorded();
        model.set_buffering(false);
        model
            .execute(Operation::create(person("Ann")), None)
            .expect("create");
        assert_eq!(log.writes().len(), 1);
        assert_eq!(model.state(), State::Nop);
    }

    #[test]
    fn test_drop_flushes_staged_write() {
        let (mut model, log, _) = recorded();
        model
            .execute(Operation::create(person("Ann")), None)
            .expect("create");
        drop(model);
        let writes = log.writes();
        assert_eq!(writes.len(), 1);
        assert!(writes[0].sql.starts_with("INSERT INTO \"people\""));
    }

    #[test]
    fn test_update_marks_only_changed_fields() {
        let (model, log, _) = recorded();
        let mut model = model.with_id(3i64);
        model.set_data(record([("name", Value::from("Ann")), ("age", Value::from(30i64))]), true);

        model
            .execute(
                Operation::update(record([("name", Value::from("Ann")), ("age", Value::from(31i64))])),
                None,
            )
            .expect("update");
        assert_eq!(model.changed_fields(), vec!["age".to_string()]);

        model
            .execute(Operation::update(record([("age", Value::from(31i64))])), None)
            .expect("update");
        assert_eq!(model.changed_fields(), vec!["age".to_string()]);

        model.execute_actions().expect("flush");
        let writes = log.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].sql, "UPDATE \"people\" SET \"age\" = ? WHERE (\"id\" = ?)");
    }

    #[test]
    fn test_update_without_changes_is_noop() {
        let (model, log, _) = recorded();
        let mut model = model.with_id(3i64);
        model.set_data(person("Ann"), true);
        model
            .execute(Operation::update(person("Ann")), None)
            .expect("update");
        assert!(model.execute_actions().expect("flush"));
        assert!(log.writes().is_empty());
        assert_eq!(model.state(), State::Nop);
    }

    #[test]
    fn test_update_while_creating_stays_create() {
        let (mut model, log, _) = recorded();
        model
            .execute(Operation::create(person("Ann")), None)
            .expect("create");
        model
            .execute(Operation::update(record([("age", Value::from(5i64))])), None)
            .expect("update");
        assert_eq!(model.state(), State::Create);
        model.execute_actions().expect("flush");
        let writes = log.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].params.len(), 2);
    }

    #[test]
    fn test_update_without_id_fails() {
        let (mut model, _, _) = recorded();
        assert!(matches!(
            model.execute(Operation::update(person("x")), None),
            Err(OrmError::MissingId { .. })
        ));
    }

    #[test]
    fn test_exists_is_memoized_per_id() {
        let (mut model, log, responses) = recorded();
        model.set_id(None);
        assert!(!model.exists().expect("exists"));
        assert!(log.is_empty());

        model.set_id(Some(Id::from(7i64)));
        responses.push(vec![row([("1", Value::from(1i64))])]);
        assert!(model.exists().expect("exists"));
        assert!(model.exists().expect("exists"));
        assert_eq!(log.reads().len(), 1);

        model.set_id(Some(Id::from(8i64)));
        assert!(!model.exists().expect("exists"));
        assert_eq!(log.reads().len(), 2);
    }

    #[test]
    fn test_read_fetches_only_missing_fields() {
        let (model, log, responses) = recorded();
        let mut model = model.with_id(4i64);
        model.set_data(person("Ann"), true);
        responses.push(vec![row([("1", Value::from(1i64))])]);
        responses.push(vec![row([("id", Value::from(4i64)), ("age", Value::from(40i64))])]);

        let data = model
            .execute(Operation::read(None), None)
            .expect("read")
            .into_data()
            .expect("data");
        assert_eq!(data.get("age"), Some(&Value::from(40i64)));
        assert_eq!(data.get("name"), Some(&Value::from("Ann")));

        let select = &log.reads()[1];
        assert!(select.sql.starts_with("SELECT \"id\", \"age\" FROM"));
        assert!(model.changed_fields().is_empty());

        model.get_data(None).expect("cached");
        assert_eq!(log.reads().len(), 2);
    }

    #[test]
    fn test_validation_failure_keeps_storage_untouched() {
        let (mut model, log, _) = recorded();
        model.set_buffering(false);
        let rules = RuleSet::new().rule("name", Rule::Required);
        let outcome = model
            .execute(Operation::create(person("")), Some(&rules))
            .expect("execute");
        assert_eq!(outcome, Outcome::Done(false));
        assert_eq!(model.errors().form.get("name").map(String::as_str), Some("name is required"));
        assert!(log.is_empty());
        assert_eq!(model.state(), State::Empty);
    }

    #[test]
    fn test_config_enables_strict_revert() {
        let (model, log, _) = recorded();
        let config = RowkeeperConfig::from_toml(
            "[model]\nbuffering = false\n[operations]\nstrict_revert = true\n",
        )
        .expect("config");
        let mut model = model.with_config(&config).with_id(5i64);
        assert!(!model.is_buffering());

        let result = model.execute(Operation::update(person("Bo")).revertible(), None);
        assert!(matches!(result, Err(OrmError::NotRevertible(_))));
        assert!(log.writes().is_empty());
    }

    #[test]
    fn test_shape_mismatch_normalizes_to_empty() {
        let (model, _, _) = recorded();
        let model = model.with_id(vec![Value::from(1i64), Value::from(2i64)]);
        assert!(model.normalized_id().is_empty());
    }

    #[test]
    fn test_binding_field_name() {
        let (model, _, _) = recorded();
        assert_eq!(model.binding_field_name().expect("name"), "people_id");
    }

    #[test]
    fn test_delete_resets_to_empty() {
        let (model, log, responses) = recorded();
        let mut model = model.with_id(2i64);
        responses.push(vec![row([("1", Value::from(1i64))])]);
        let outcome = model.execute(Operation::delete(), None).expect("delete");
        assert_eq!(outcome, Outcome::Done(true));
        assert_eq!(model.state(), State::Empty);
        assert_eq!(model.get_id().expect("id"), None);
        assert_eq!(log.writes()[0].sql, "DELETE FROM \"people\" WHERE (\"id\" = ?)");
    }
}
