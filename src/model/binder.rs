//! Join rows composed from several models.
//!
//! A [`ModelBinder`] ties N models to a row of a join table. Each model
//! contributes one column, named by [`Model::binding_field_name`]; when the
//! same name appears more than once every occurrence is suffixed `_1`, `_2`,
//! and so on, in the order the models were given.

use super::{Id, Model};
use crate::error::{OrmError, Result};
use crate::query::{Filter, Query};
use crate::value::Record;
use std::collections::HashMap;

#[derive(Debug)]
pub struct ModelBinder {
    join: Model,
    models: Vec<Model>,
    names: Vec<String>,
}

impl ModelBinder {
    /// # Errors
    ///
    /// `UnbindableModel` if any model has a composite primary key.
    pub fn new(join: Model, models: Vec<Model>) -> Result<Self> {
        let base: Vec<String> = models
            .iter()
            .map(Model::binding_field_name)
            .collect::<Result<_>>()?;

        let mut totals: HashMap<&str, usize> = HashMap::new();
        for name in &base {
            *totals.entry(name.as_str()).or_default() += 1;
        }
        let mut seen: HashMap<&str, usize> = HashMap::new();
        let names = base
            .iter()
            .map(|name| {
                if totals[name.as_str()] > 1 {
                    let n = seen.entry(name.as_str()).or_default();
                    *n += 1;
                    format!("{}_{}", name, n)
                } else {
                    name.clone()
                }
            })
            .collect();

        Ok(Self {
            join,
            models,
            names,
        })
    }

    /// Join-row column names, one per model
    pub fn field_names(&self) -> &[String] {
        &self.names
    }

    /// `{binding field: model id}` for every model
    ///
    /// Buffered creates are flushed so their generated ids are available.
    ///
    /// # Errors
    ///
    /// `MissingId` if a model has no id, or `UnbindableModel` if an id is
    /// not a single value.
    pub fn binding_key(&mut self) -> Result<Record> {
        let mut key = Record::new();
        for (model, name) in self.models.iter_mut().zip(&self.names) {
            let table = model.storage().name().to_string();
            match model.get_id()? {
                Some(Id::Single(v)) => {
                    key.insert(name.clone(), v);
                }
                Some(Id::Positional(mut values)) if values.len() == 1 => {
                    key.insert(name.clone(), values.remove(0));
                }
                Some(_) => return Err(OrmError::UnbindableModel { table }),
                None => return Err(OrmError::MissingId { table }),
            }
        }
        Ok(key)
    }

    /// Write the join row, with `extra` as additional fields
    ///
    /// An existing row for the same key is updated with `extra`.
    pub fn bind(&mut self, extra: Record) -> Result<bool> {
        let key = self.binding_key()?;
        let mut values = key.clone();
        values.extend(extra);
        log::debug!(
            "binding {:?} in {}",
            self.names,
            self.join.storage().name()
        );
        self.join
            .storage()
            .set(&Query::new(Filter::from(key)), &values)
    }

    /// Remove the join row; `false` when there was none
    pub fn unbind(&mut self) -> Result<bool> {
        let key = self.binding_key()?;
        self.join.storage().unset(&Query::new(Filter::from(key)))
    }

    pub fn is_bound(&mut self) -> Result<bool> {
        let key = self.binding_key()?;
        self.join.storage().isset(&Query::new(Filter::from(key)))
    }

    pub fn model(&self, idx: usize) -> Option<&Model> {
        self.models.get(idx)
    }

    pub fn model_mut(&mut self, idx: usize) -> Option<&mut Model> {
        self.models.get_mut(idx)
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn join(&self) -> &Model {
        &self.join
    }
}
