use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::controller::{Submission, SubmitState};
use super::registry::Registry;

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FormState {
    pub revision: u64,
    pub values: BTreeMap<String, String>,
    pub errors: BTreeMap<String, String>,
    pub touched: BTreeMap<String, bool>,
    pub dirty: BTreeMap<String, bool>,
    pub validating: BTreeSet<String>,
    pub is_validating: bool,
    pub is_valid: bool,
    pub is_dirty: bool,
    pub is_touched: bool,
    pub first_error: Option<String>,
    pub submit_state: SubmitState,
    pub submit_count: u32,
}

impl FormState {
    pub fn error(&self, name: &str) -> Option<&str> {
        self.errors.get(name).map(String::as_str)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn is_field_validating(&self, name: &str) -> bool {
        self.validating.contains(name)
    }

    pub fn can_submit(&self) -> bool {
        self.is_valid && !self.is_validating
    }
}

pub(super) fn aggregate(registry: &Registry, submission: Submission, revision: u64) -> FormState {
    let mut state = FormState {
        revision,
        values: BTreeMap::new(),
        errors: BTreeMap::new(),
        touched: BTreeMap::new(),
        dirty: BTreeMap::new(),
        validating: BTreeSet::new(),
        is_validating: false,
        is_valid: true,
        is_dirty: false,
        is_touched: false,
        first_error: None,
        submit_state: submission.state,
        submit_count: submission.count,
    };

    for record in registry.ordered() {
        let name = record.name.as_str();
        state.values.insert(name.to_owned(), record.value.clone());
        state.touched.insert(name.to_owned(), record.touched);
        state.dirty.insert(name.to_owned(), record.dirty);
        state.is_touched |= record.touched;
        state.is_dirty |= record.dirty;
        if record.is_validating() {
            state.validating.insert(name.to_owned());
        }
        if let Some(message) = record.error_message() {
            state.errors.insert(name.to_owned(), message.to_owned());
            if state.first_error.is_none() {
                state.first_error = Some(name.to_owned());
            }
        }
    }

    state.is_validating = !state.validating.is_empty();
    state.is_valid = state.errors.is_empty();
    state
}
