use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::controller::{FormError, FormResult};
use super::validation::{FieldBindings, Trigger, ValidationTicket};

/// Increases with every `register`, so a re-registered name gets a new id.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct FieldId(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum ErrorSource {
    Native,
    Custom,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FieldView {
    pub id: FieldId,
    pub name: String,
    pub value: String,
    pub initial_value: String,
    pub touched: bool,
    pub dirty: bool,
    pub error: Option<String>,
    pub validation_seq: ValidationTicket,
    pub pending_count: usize,
}

pub(super) struct FieldRecord {
    pub(super) id: FieldId,
    pub(super) name: String,
    pub(super) initial_value: String,
    pub(super) value: String,
    pub(super) touched: bool,
    pub(super) dirty: bool,
    pub(super) error: Option<(String, ErrorSource)>,
    pub(super) ticket: ValidationTicket,
    pub(super) in_flight: BTreeSet<ValidationTicket>,
    last_dispatch: Option<(Trigger, String)>,
    pub(super) bindings: FieldBindings,
}

impl FieldRecord {
    fn new(id: FieldId, name: String, initial_value: String, bindings: FieldBindings) -> Self {
        Self {
            id,
            name,
            value: initial_value.clone(),
            initial_value,
            touched: false,
            dirty: false,
            error: None,
            ticket: ValidationTicket(0),
            in_flight: BTreeSet::new(),
            last_dispatch: None,
            bindings,
        }
    }

    pub(super) fn set_value(&mut self, value: String) {
        self.dirty = value != self.initial_value;
        self.value = value;
    }

    pub(super) fn error_message(&self) -> Option<&str> {
        self.error
            .as_ref()
            .map(|(message, _)| message.as_str())
            .filter(|message| !message.is_empty())
    }

    pub(super) fn set_custom_error(&mut self, message: String) {
        self.error = (!message.is_empty()).then_some((message, ErrorSource::Custom));
    }

    // An empty native message never clears a custom error.
    pub(super) fn apply_native_message(&mut self, message: String) {
        if !message.is_empty() {
            self.error = Some((message, ErrorSource::Native));
        } else if matches!(self.error, Some((_, ErrorSource::Native))) {
            self.error = None;
        }
    }

    pub(super) fn bump_ticket(&mut self) -> ValidationTicket {
        self.ticket = ValidationTicket(self.ticket.0 + 1);
        self.last_dispatch = None;
        self.ticket
    }

    pub(super) fn begin_validation(&mut self, trigger: Trigger) -> ValidationTicket {
        let ticket = self.bump_ticket();
        self.in_flight.insert(ticket);
        self.last_dispatch = Some((trigger, self.value.clone()));
        ticket
    }

    pub(super) fn is_current_for(&self, trigger: Trigger) -> bool {
        self.last_dispatch
            .as_ref()
            .is_some_and(|(last, value)| *last == trigger && *value == self.value)
    }

    pub(super) fn is_validating(&self) -> bool {
        !self.in_flight.is_empty()
    }

    pub(super) fn restore_initial(&mut self) {
        self.bump_ticket();
        self.in_flight.clear();
        self.value = self.initial_value.clone();
        self.touched = false;
        self.dirty = false;
        self.error = None;
    }

    pub(super) fn view(&self) -> FieldView {
        FieldView {
            id: self.id,
            name: self.name.clone(),
            value: self.value.clone(),
            initial_value: self.initial_value.clone(),
            touched: self.touched,
            dirty: self.dirty,
            error: self.error_message().map(str::to_owned),
            validation_seq: self.ticket,
            pending_count: self.in_flight.len(),
        }
    }
}

#[derive(Default)]
pub(super) struct Registry {
    next_id: u64,
    ids: BTreeMap<String, FieldId>,
    records: BTreeMap<FieldId, FieldRecord>,
}

impl Registry {
    pub(super) fn register(
        &mut self,
        name: &str,
        initial_value: String,
        bindings: FieldBindings,
    ) -> FormResult<FieldId> {
        if self.ids.contains_key(name) {
            return Err(FormError::DuplicateField(name.to_owned()));
        }
        self.next_id += 1;
        let id = FieldId(self.next_id);
        self.ids.insert(name.to_owned(), id);
        self.records.insert(
            id,
            FieldRecord::new(id, name.to_owned(), initial_value, bindings),
        );
        Ok(id)
    }

    pub(super) fn unregister(&mut self, name: &str) -> FormResult<FieldRecord> {
        self.ids
            .remove(name)
            .and_then(|id| self.records.remove(&id))
            .ok_or_else(|| FormError::UnknownField(name.to_owned()))
    }

    pub(super) fn get(&self, name: &str) -> FormResult<&FieldRecord> {
        self.ids
            .get(name)
            .and_then(|id| self.records.get(id))
            .ok_or_else(|| FormError::UnknownField(name.to_owned()))
    }

    pub(super) fn get_mut(&mut self, name: &str) -> FormResult<&mut FieldRecord> {
        self.ids
            .get(name)
            .and_then(|id| self.records.get_mut(id))
            .ok_or_else(|| FormError::UnknownField(name.to_owned()))
    }

    /// Settling tasks may outlive the registration they were started for.
    pub(super) fn registered_mut(&mut self, name: &str, id: FieldId) -> Option<&mut FieldRecord> {
        self.records
            .get_mut(&id)
            .filter(|record| record.name == name)
    }

    pub(super) fn records_mut(&mut self) -> impl Iterator<Item = &mut FieldRecord> {
        self.records.values_mut()
    }

    pub(super) fn ordered(&self) -> impl Iterator<Item = &FieldRecord> {
        self.records.values()
    }

    pub(super) fn names(&self) -> Vec<String> {
        self.ordered().map(|record| record.name.clone()).collect()
    }

    pub(super) fn len(&self) -> usize {
        self.records.len()
    }
}
