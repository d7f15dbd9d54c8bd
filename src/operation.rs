//! Interceptable CRUD operations.
//!
//! An [`Operation`] wraps one [`Action`] and runs it against a [`Crud`]
//! target:
//!
//! 1. `before{Verb}` listeners run and may rewrite the arguments or set a
//!    result;
//! 2. if no result was set, the target's method for the verb is called;
//! 3. `after{Verb}` listeners run and may still replace the result.
//!
//! Operations marked revertible capture what they need to undo themselves
//! (a snapshot of the fields an update touches, or the full row a delete
//! removes). A create reverts to a delete, an update to an update with the
//! snapshot, a delete to a create with the snapshot.

use crate::error::{OrmError, Result};
use crate::events::{EventDispatcher, OperationEvent, Phase, Verb};
use crate::value::Record;

/// The verb and arguments of an operation
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Create(Record),
    /// Fields to read; `None` reads every field
    Read(Option<Vec<String>>),
    Update(Record),
    Delete,
}

impl Action {
    pub fn verb(&self) -> Verb {
        match self {
            Action::Create(_) => Verb::Create,
            Action::Read(_) => Verb::Read,
            Action::Update(_) => Verb::Update,
            Action::Delete => Verb::Delete,
        }
    }

    pub fn data(&self) -> Option<&Record> {
        match self {
            Action::Create(data) | Action::Update(data) => Some(data),
            _ => None,
        }
    }

    pub fn data_mut(&mut self) -> Option<&mut Record> {
        match self {
            Action::Create(data) | Action::Update(data) => Some(data),
            _ => None,
        }
    }
}

/// Result of an operation
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Done(bool),
    Data(Record),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        match self {
            Outcome::Done(ok) => *ok,
            Outcome::Data(_) => true,
        }
    }

    pub fn into_data(self) -> Option<Record> {
        match self {
            Outcome::Data(data) => Some(data),
            Outcome::Done(_) => None,
        }
    }
}

/// Target of operations: one method per verb
///
/// Each method defaults to `Ok(None)`, meaning the target lacks the
/// capability.
pub trait Crud {
    /// Name reported to listeners
    fn target_name(&self) -> &str;

    fn create(&mut self, _data: &Record) -> Result<Option<Outcome>> {
        Ok(None)
    }

    fn read(&mut self, _fields: Option<&[String]>) -> Result<Option<Outcome>> {
        Ok(None)
    }

    fn update(&mut self, _data: &Record) -> Result<Option<Outcome>> {
        Ok(None)
    }

    fn delete(&mut self) -> Result<Option<Outcome>> {
        Ok(None)
    }

    /// Whether operations against this target can be undone
    fn supports_revert(&self) -> bool {
        false
    }

    /// Current values of `fields`; an empty list means every field
    fn snapshot(&mut self, _fields: &[String]) -> Result<Option<Record>> {
        Ok(None)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    action: Action,
    can_queue: bool,
    can_revert: bool,
    strict_revert: bool,
    snapshot: Option<Record>,
    result: Option<Outcome>,
}

impl Operation {
    /// Reads are not queued; every other action is
    pub fn new(action: Action) -> Self {
        let can_queue = !matches!(action, Action::Read(_));
        Self {
            action,
            can_queue,
            can_revert: false,
            strict_revert: false,
            snapshot: None,
            result: None,
        }
    }

    pub fn create(data: Record) -> Self {
        Self::new(Action::Create(data))
    }

    pub fn read(fields: Option<Vec<String>>) -> Self {
        Self::new(Action::Read(fields))
    }

    pub fn update(data: Record) -> Self {
        Self::new(Action::Update(data))
    }

    pub fn delete() -> Self {
        Self::new(Action::Delete)
    }

    /// Request that the operation can be reverted later
    pub fn revertible(mut self) -> Self {
        self.can_revert = true;
        self
    }

    pub fn queued(mut self, can_queue: bool) -> Self {
        self.can_queue = can_queue;
        self
    }

    /// Fail with `NotRevertible` instead of dropping `can_revert`
    pub fn with_strict_revert(mut self, strict: bool) -> Self {
        self.strict_revert = strict;
        self
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn verb(&self) -> Verb {
        self.action.verb()
    }

    pub fn can_queue(&self) -> bool {
        self.can_queue
    }

    pub fn can_revert(&self) -> bool {
        self.can_revert
    }

    pub fn is_strict_revert(&self) -> bool {
        self.strict_revert
    }

    pub fn snapshot(&self) -> Option<&Record> {
        self.snapshot.as_ref()
    }

    pub fn result(&self) -> Option<&Outcome> {
        self.result.as_ref()
    }

    /// Run the operation against `target`
    ///
    /// Returns `Ok(None)` when neither a listener nor the target produced
    /// a result.
    ///
    /// # Errors
    ///
    /// Listener and target errors are passed through. With strict revert,
    /// `NotRevertible` if a requested revert cannot be prepared.
    pub fn execute(
        &mut self,
        target: &mut dyn Crud,
        events: &EventDispatcher,
    ) -> Result<Option<Outcome>> {
        let name = target.target_name().to_string();
        let mut result: Option<Outcome> = None;

        events.dispatch(&mut OperationEvent::new(
            Phase::Before,
            &name,
            &mut self.action,
            &mut result,
        ))?;

        if result.is_none() {
            if self.can_revert {
                self.capture(target)?;
            }
            result = match &self.action {
                Action::Create(data) => target.create(data)?,
                Action::Read(fields) => target.read(fields.as_deref())?,
                Action::Update(data) => target.update(data)?,
                Action::Delete => target.delete()?,
            };
        } else if self.can_revert {
            self.degrade("result supplied by a listener, nothing to undo")?;
        }

        events.dispatch(&mut OperationEvent::new(
            Phase::After,
            &name,
            &mut self.action,
            &mut result,
        ))?;

        self.result = result.clone();
        Ok(result)
    }

    /// Operation undoing this one
    ///
    /// # Errors
    ///
    /// `NotRevertible` if the operation was not revertible or has not run.
    pub fn inverse(&self) -> Result<Operation> {
        if !self.can_revert {
            return Err(OrmError::NotRevertible(format!(
                "{} was not executed as revertible",
                self.verb().as_str()
            )));
        }
        if self.result.is_none() {
            return Err(OrmError::NotRevertible(format!(
                "{} has not been executed",
                self.verb().as_str()
            )));
        }
        let snapshot = || {
            self.snapshot
                .clone()
                .ok_or_else(|| OrmError::NotRevertible("no snapshot captured".to_string()))
        };
        let inverse = match &self.action {
            Action::Create(_) => Operation::delete(),
            Action::Update(_) => Operation::update(snapshot()?),
            Action::Delete => Operation::create(snapshot()?),
            Action::Read(_) => {
                return Err(OrmError::NotRevertible("read has no inverse".to_string()))
            }
        };
        Ok(inverse.with_strict_revert(self.strict_revert))
    }

    /// Run the inverse of this operation against `target`
    pub fn revert(
        &self,
        target: &mut dyn Crud,
        events: &EventDispatcher,
    ) -> Result<Option<Outcome>> {
        self.inverse()?.execute(target, events)
    }

    fn capture(&mut self, target: &mut dyn Crud) -> Result<()> {
        if !target.supports_revert() {
            return self.degrade("target does not support revert");
        }
        let fields: Vec<String> = match &self.action {
            Action::Create(_) => return Ok(()),
            Action::Read(_) => return self.degrade("read has no inverse"),
            Action::Update(data) => data.keys().cloned().collect(),
            Action::Delete => Vec::new(),
        };
        match target.snapshot(&fields)? {
            Some(snapshot) if !snapshot.is_empty() => {
                self.snapshot = Some(snapshot);
                Ok(())
            }
            _ => self.degrade("no prior state to restore"),
        }
    }

    fn degrade(&mut self, reason: &str) -> Result<()> {
        if self.strict_revert {
            return Err(OrmError::NotRevertible(reason.to_string()));
        }
        log::debug!(
            "{} on revertible operation: {}, disabling revert",
            self.verb().as_str(),
            reason
        );
        self.can_revert = false;
        Ok(())
    }
}

/// Executed operations, newest last
#[derive(Debug, Default, Clone)]
pub struct OperationQueue {
    operations: Vec<Operation>,
}

impl OperationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep an executed operation
    ///
    /// Only queueable operations that can still be reverted are kept; the
    /// rest could never be used again.
    pub fn push(&mut self, operation: Operation) {
        if operation.can_queue() && operation.can_revert() {
            self.operations.push(operation);
        }
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn last(&self) -> Option<&Operation> {
        self.operations.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }

    pub fn clear(&mut self) {
        self.operations.clear();
    }

    /// Revert the newest revertible operation and drop it from the queue
    pub fn revert_last(
        &mut self,
        target: &mut dyn Crud,
        events: &EventDispatcher,
    ) -> Result<Option<Outcome>> {
        let Some(idx) = self.operations.iter().rposition(Operation::can_revert) else {
            return Ok(None);
        };
        let operation = self.operations.remove(idx);
        operation.revert(target, events)
    }

    /// Revert every revertible operation, newest first
    pub fn revert_all(
        &mut self,
        target: &mut dyn Crud,
        events: &EventDispatcher,
    ) -> Result<Vec<Outcome>> {
        let mut outcomes = Vec::new();
        while let Some(idx) = self.operations.iter().rposition(Operation::can_revert) {
            let operation = self.operations.remove(idx);
            if let Some(outcome) = operation.revert(target, events)? {
                outcomes.push(outcome);
            }
        }
        self.operations.clear();
        Ok(outcomes)
    }
}
