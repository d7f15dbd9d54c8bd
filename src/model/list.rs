//! Paginated lists of models.

use super::Model;
use crate::error::Result;
use crate::query::Query;
use sea_query::Value;

/// How a list makes one model per row
pub enum Prototype {
    /// Blank copies of this model's storage and settings
    Clone(Model),
    Factory(Box<dyn Fn() -> Model>),
    /// Factory called with fixed arguments
    FactoryWith(Box<dyn Fn(&[Value]) -> Model>, Vec<Value>),
}

impl Prototype {
    pub fn instantiate(&self) -> Model {
        match self {
            Prototype::Clone(model) => model.blank(),
            Prototype::Factory(factory) => factory(),
            Prototype::FactoryWith(factory, args) => factory(args),
        }
    }
}

impl std::fmt::Debug for Prototype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Prototype::Clone(model) => f.debug_tuple("Clone").field(model).finish(),
            Prototype::Factory(_) => f.write_str("Factory"),
            Prototype::FactoryWith(_, args) => f.debug_tuple("FactoryWith").field(args).finish(),
        }
    }
}

/// Models matching a query, optionally one page at a time
#[derive(Debug)]
pub struct ModelsList {
    prototype: Prototype,
    query: Query,
    page: u64,
    on_page: Option<u64>,
    total: u64,
    models: Vec<Model>,
}

impl ModelsList {
    pub fn new(prototype: Prototype, query: Query) -> Self {
        Self {
            prototype,
            query,
            page: 1,
            on_page: None,
            total: 0,
            models: Vec::new(),
        }
    }

    /// Load one page of models, or all of them when `on_page` is `None`
    ///
    /// The page number is clamped into `1..=pages`, so an out-of-range page
    /// returns the nearest valid one instead of nothing.
    pub fn get_data(&mut self, page: i64, on_page: Option<u64>) -> Result<&[Model]> {
        let probe = self.prototype.instantiate();
        let storage = std::rc::Rc::clone(probe.storage());

        let query = match on_page.filter(|n| *n > 0) {
            Some(per_page) => {
                self.total = storage.count(&self.query.without_columns())?;
                let pages = self.total.div_ceil(per_page).max(1);
                self.page = page.clamp(1, pages as i64) as u64;
                self.on_page = Some(per_page);
                self.query.clone().range((self.page - 1) * per_page, per_page)
            }
            None => {
                self.page = 1;
                self.on_page = None;
                self.query.clone()
            }
        };

        let rows = storage.get(&query)?;
        if self.on_page.is_none() {
            self.total = rows.len() as u64;
        }
        log::debug!(
            "loaded {} of {} rows from {} (page {})",
            rows.len(),
            self.total,
            storage.name(),
            self.page
        );

        self.models = rows
            .into_iter()
            .map(|row| {
                let mut model = self.prototype.instantiate();
                model.hydrate(row);
                model
            })
            .collect();
        Ok(&self.models)
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn on_page(&self) -> Option<u64> {
        self.on_page
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn pages(&self) -> u64 {
        match self.on_page {
            Some(per_page) => self.total.div_ceil(per_page).max(1),
            None => 1,
        }
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn models_mut(&mut self) -> &mut [Model] {
        &mut self.models
    }

    pub fn into_models(self) -> Vec<Model> {
        self.models
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::database::Database;
    use crate::events::EventDispatcher;
    use crate::model::State;
    use crate::query::column::{Column, ColumnType};
    use crate::query::condition::Cond;
    use crate::table::Table;
    use crate::value::record;
    use std::rc::Rc;

    fn seeded() -> Model {
        let db = Database::connect(&DatabaseConfig::default()).expect("connect");
        let table = Table::new(
            db,
            "items",
            vec![
                Column::new("id", ColumnType::Integer).primary_key().auto_increment(),
                Column::new("kind", ColumnType::String),
            ],
        );
        table.create(false).expect("create");
        for kind in ["a", "a", "a", "b"] {
            table.insert(&record([("kind", Value::from(kind))])).expect("insert");
        }
        Model::new(Rc::new(table), Rc::new(EventDispatcher::new()))
    }

    #[test]
    fn test_page_clamping() {
        let mut list = ModelsList::new(Prototype::Clone(seeded()), Query::new(Cond::eq("kind", "a")));

        assert_eq!(list.get_data(1_000_000, Some(2)).expect("page").len(), 1);
        assert_eq!(list.page(), 2);
        assert_eq!(list.total(), 3);
        assert_eq!(list.pages(), 2);

        assert_eq!(list.get_data(-1_000_000, Some(2)).expect("page").len(), 2);
        assert_eq!(list.page(), 1);
    }

    #[test]
    fn test_unpaginated_loads_everything() {
        let mut list = ModelsList::new(Prototype::Clone(seeded()), Query::all());
        let models = list.get_data(5, None).expect("all");
        assert_eq!(models.len(), 4);
        assert!(models.iter().all(|m| m.state() == State::Nop));
        assert_eq!(list.total(), 4);
        assert_eq!(list.page(), 1);
    }

    #[test]
    fn test_empty_result_still_has_one_page() {
        let mut list = ModelsList::new(Prototype::Clone(seeded()), Query::new(Cond::eq("kind", "z")));
        assert!(list.get_data(3, Some(10)).expect("page").is_empty());
        assert_eq!(list.page(), 1);
        assert_eq!(list.pages(), 1);
    }

    #[test]
    fn test_factory_with_args() {
        let proto = seeded();
        let storage = Rc::clone(proto.storage());
        let events = Rc::clone(proto.events());
        let factory = move |args: &[Value]| {
            let mut model = Model::new(Rc::clone(&storage), Rc::clone(&events));
            model.set_buffering(args.first() == Some(&Value::Bool(Some(true))));
            model
        };
        let mut list = ModelsList::new(
            Prototype::FactoryWith(Box::new(factory), vec![Value::Bool(Some(false))]),
            Query::all(),
        );
        let models = list.get_data(1, Some(3)).expect("page");
        assert_eq!(models.len(), 3);
        assert!(!models[0].is_buffering());
    }

    #[test]
    fn test_hydrated_models_have_ids() {
        let mut list = ModelsList::new(Prototype::Clone(seeded()), Query::all());
        assert_eq!(list.get_data(1, Some(2)).expect("page").len(), 2);
        let first = &mut list.models_mut()[0];
        assert_eq!(first.get_id().expect("id"), Some(crate::model::Id::from(1i64)));
        assert!(first.exists().expect("exists"));
    }
}
