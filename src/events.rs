//! Before/after hooks around CRUD operations.
//!
//! An [`EventDispatcher`] is constructed explicitly and shared through
//! `Rc`. Listeners are registered per [`Phase`] and [`Verb`]; during
//! [`Operation::execute`](crate::operation::Operation::execute) they receive
//! an [`OperationEvent`] through which they can rewrite the operation's
//! arguments or supply its result.
//!
//! # Examples
//!
//! ```
//! use rowkeeper::events::{EventDispatcher, Phase, Verb};
//! use sea_query::Value;
//!
//! let events = EventDispatcher::new();
//! events.listen(Phase::Before, Verb::Create, |event| {
//!     if let Some(data) = event.data_mut() {
//!         data.insert("source".to_string(), Value::from("api"));
//!     }
//!     Ok(())
//! });
//! assert!(events.has_listeners(Phase::Before, Verb::Create));
//! ```

use crate::error::Result;
use crate::operation::{Action, Outcome};
use crate::query::column::DATETIME_FORMAT;
use crate::value::Record;
use sea_query::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Before,
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Create,
    Read,
    Update,
    Delete,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Create => "Create",
            Verb::Read => "Read",
            Verb::Update => "Update",
            Verb::Delete => "Delete",
        }
    }
}

/// Event name such as `beforeCreate` or `afterDelete`
pub fn event_name(phase: Phase, verb: Verb) -> String {
    let prefix = match phase {
        Phase::Before => "before",
        Phase::After => "after",
    };
    format!("{}{}", prefix, verb.as_str())
}

/// What a listener sees of a running operation
pub struct OperationEvent<'a> {
    phase: Phase,
    target: &'a str,
    action: &'a mut Action,
    result: &'a mut Option<Outcome>,
}

impl<'a> OperationEvent<'a> {
    pub(crate) fn new(
        phase: Phase,
        target: &'a str,
        action: &'a mut Action,
        result: &'a mut Option<Outcome>,
    ) -> Self {
        Self {
            phase,
            target,
            action,
            result,
        }
    }

    pub fn name(&self) -> String {
        event_name(self.phase, self.verb())
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn verb(&self) -> Verb {
        self.action.verb()
    }

    /// Name of the storage the operation runs against
    pub fn target(&self) -> &str {
        self.target
    }

    pub fn action(&self) -> &Action {
        self.action
    }

    pub fn action_mut(&mut self) -> &mut Action {
        self.action
    }

    /// Field data of a create or update
    pub fn data_mut(&mut self) -> Option<&mut Record> {
        self.action.data_mut()
    }

    pub fn result(&self) -> Option<&Outcome> {
        self.result.as_ref()
    }

    /// Set the result; in the before phase this skips the target call
    pub fn set_result(&mut self, outcome: Outcome) {
        *self.result = Some(outcome);
    }
}

type Listener = Rc<dyn Fn(&mut OperationEvent<'_>) -> Result<()>>;

/// Registry of operation listeners
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RefCell<HashMap<(Phase, Verb), Vec<Listener>>>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.borrow();
        let mut names: Vec<String> = listeners
            .iter()
            .map(|((phase, verb), l)| format!("{}({})", event_name(*phase, *verb), l.len()))
            .collect();
        names.sort();
        f.debug_struct("EventDispatcher")
            .field("listeners", &names)
            .finish()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; listeners run in registration order
    pub fn listen<F>(&self, phase: Phase, verb: Verb, listener: F)
    where
        F: Fn(&mut OperationEvent<'_>) -> Result<()> + 'static,
    {
        self.listeners
            .borrow_mut()
            .entry((phase, verb))
            .or_default()
            .push(Rc::new(listener));
    }

    pub fn has_listeners(&self, phase: Phase, verb: Verb) -> bool {
        self.listeners
            .borrow()
            .get(&(phase, verb))
            .is_some_and(|l| !l.is_empty())
    }

    pub fn clear(&self, phase: Phase, verb: Verb) {
        self.listeners.borrow_mut().remove(&(phase, verb));
    }

    /// Run every listener for the event's phase and verb
    ///
    /// Stops at the first listener error.
    pub fn dispatch(&self, event: &mut OperationEvent<'_>) -> Result<()> {
        // Listeners may register further listeners while running
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .get(&(event.phase(), event.verb()))
            .cloned()
            .unwrap_or_default();
        for listener in listeners {
            listener(event)?;
        }
        Ok(())
    }
}

/// Stamp `created_field` on create and `modified_field` on create and update
pub fn timestamps(dispatcher: &EventDispatcher, created_field: &str, modified_field: &str) {
    let created = created_field.to_string();
    let modified = modified_field.to_string();
    dispatcher.listen(Phase::Before, Verb::Create, move |event| {
        let now = now();
        if let Some(data) = event.data_mut() {
            data.entry(created.clone()).or_insert_with(|| now.clone());
            data.insert(modified.clone(), now);
        }
        Ok(())
    });

    let modified = modified_field.to_string();
    dispatcher.listen(Phase::Before, Verb::Update, move |event| {
        let now = now();
        if let Some(data) = event.data_mut() {
            data.insert(modified.clone(), now);
        }
        Ok(())
    });
}

fn now() -> Value {
    Value::from(chrono::Utc::now().format(DATETIME_FORMAT).to_string())
}
