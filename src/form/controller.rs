use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::task::Spawn;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use super::oracle::{ConstraintOracle, NoConstraints};
use super::registry::{FieldView, Registry};
use super::snapshot::{FormState, aggregate};
use super::validation::{FieldBindings, Trigger};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitState {
    Idle,
    Validating,
    Submitting,
    Succeeded,
    Failed,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormOptions {
    pub validate_on_mount: bool,
    pub skip_empty_async: bool,
    pub focus_first_error_on_submit: bool,
    /// Error shown for a rejected validation that produced no message.
    pub rejection_message: String,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            validate_on_mount: false,
            skip_empty_async: true,
            focus_first_error_on_submit: true,
            rejection_message: "validation failed".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FormError {
    #[error("field `{0}` is already registered")]
    DuplicateField(String),
    #[error("field `{0}` is not registered")]
    UnknownField(String),
    #[error("form state lock poisoned while {0}")]
    StatePoisoned(&'static str),
    #[error("invalid submit state transition: {from:?} -> {to:?}")]
    InvalidStateTransition { from: SubmitState, to: SubmitState },
    #[error("form submit is already in progress")]
    AlreadySubmitting,
    #[error("submit handler rejected the form: {0}")]
    SubmitRejected(String),
}

pub type FormResult<T> = Result<T, FormError>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SubscriptionId(pub u64);

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubmitBlocked {
    pub first_error: Option<String>,
    /// Fields with validations still in flight. Submit again once they settle.
    pub validating: Vec<String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SubmitOutcome {
    Submitted(FormState),
    Blocked(SubmitBlocked),
}

pub(super) type Listener = Arc<dyn Fn(&FormState) + Send + Sync>;
pub(super) type FocusHandler = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone, Copy, Debug)]
pub(super) struct Submission {
    pub(super) state: SubmitState,
    pub(super) count: u32,
}

pub(super) struct FormInner {
    pub(super) registry: Registry,
    pub(super) submission: Submission,
    revision: u64,
}

impl FormInner {
    pub(super) fn emission(&mut self) -> FormState {
        self.revision += 1;
        self.current()
    }

    pub(super) fn current(&self) -> FormState {
        aggregate(&self.registry, self.submission, self.revision)
    }
}

#[derive(Default)]
pub(super) struct Listeners {
    next_id: u64,
    entries: Vec<(SubscriptionId, Listener)>,
}

#[derive(Default)]
pub(super) struct Delivery {
    delivering: bool,
    last_revision: u64,
    queue: VecDeque<FormState>,
}

struct DeliveryTurn<'a> {
    delivery: &'a Mutex<Delivery>,
    finished: bool,
}

impl Drop for DeliveryTurn<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Ok(mut delivery) = self.delivery.lock() {
            delivery.delivering = false;
        }
    }
}

/// Validation and state engine for one form.
///
/// Clones share the same form. All writes go through one lock, and
/// validators and listeners are always called with the lock released.
#[derive(Clone)]
pub struct FormController {
    pub(super) options: Arc<FormOptions>,
    pub(super) state: Arc<RwLock<FormInner>>,
    pub(super) listeners: Arc<RwLock<Listeners>>,
    delivery: Arc<Mutex<Delivery>>,
    pub(super) focus_handlers: Arc<RwLock<BTreeMap<String, FocusHandler>>>,
    pub(super) oracle: Arc<dyn ConstraintOracle>,
    pub(super) spawner: Arc<dyn Spawn + Send + Sync>,
}

impl FormController {
    pub fn new(options: FormOptions, spawner: impl Spawn + Send + Sync + 'static) -> Self {
        Self {
            options: Arc::new(options),
            state: Arc::new(RwLock::new(FormInner {
                registry: Registry::default(),
                submission: Submission {
                    state: SubmitState::Idle,
                    count: 0,
                },
                revision: 0,
            })),
            listeners: Arc::new(RwLock::new(Listeners::default())),
            delivery: Arc::new(Mutex::new(Delivery::default())),
            focus_handlers: Arc::new(RwLock::new(BTreeMap::new())),
            oracle: Arc::new(NoConstraints),
            spawner: Arc::new(spawner),
        }
    }

    pub fn with_oracle(mut self, oracle: impl ConstraintOracle + 'static) -> Self {
        self.oracle = Arc::new(oracle);
        self
    }

    pub fn options(&self) -> &FormOptions {
        &self.options
    }

    pub fn register_field(
        &self,
        name: impl Into<String>,
        initial_value: impl Into<String>,
        bindings: FieldBindings,
    ) -> FormResult<()> {
        let name = name.into();
        let validate_on_mount =
            self.options.validate_on_mount && bindings.for_trigger(Trigger::Change).is_some();
        {
            let mut state = write_lock(&self.state, "registering field")?;
            let id = state
                .registry
                .register(&name, initial_value.into(), bindings)?;
            debug!(
                "registered field `{name}` as {} ({} fields)",
                id.0,
                state.registry.len()
            );
        }

        if validate_on_mount {
            self.dispatch(&name, None, Trigger::Change)?;
        }
        self.publish()
    }

    pub fn unregister_field(&self, name: &str) -> FormResult<()> {
        {
            let mut state = write_lock(&self.state, "unregistering field")?;
            let record = state.registry.unregister(name)?;
            debug!(
                "unregistered field `{name}` with {} validations in flight",
                record.in_flight.len()
            );
        }
        write_lock(&self.focus_handlers, "dropping focus handler")?.remove(name);
        self.publish()
    }

    pub fn field(&self, name: &str) -> FormResult<FieldView> {
        let state = read_lock(&self.state, "reading field")?;
        Ok(state.registry.get(name)?.view())
    }

    pub fn snapshot(&self) -> FormResult<FormState> {
        Ok(read_lock(&self.state, "creating form snapshot")?.current())
    }

    /// Listeners are called in subscription order and see revisions in
    /// increasing order. An emission made while another thread or a listener
    /// is delivering is handed over to that delivery, and a snapshot older than
    /// one already delivered is skipped.
    pub fn subscribe(
        &self,
        listener: impl Fn(&FormState) + Send + Sync + 'static,
    ) -> FormResult<SubscriptionId> {
        let mut listeners = write_lock(&self.listeners, "subscribing listener")?;
        listeners.next_id += 1;
        let id = SubscriptionId(listeners.next_id);
        listeners.entries.push((id, Arc::new(listener)));
        Ok(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> FormResult<bool> {
        let mut listeners = write_lock(&self.listeners, "unsubscribing listener")?;
        let before = listeners.entries.len();
        listeners.entries.retain(|(entry, _)| *entry != id);
        Ok(listeners.entries.len() != before)
    }

    /// Validates every field for submit and hands the snapshot to `handler`
    /// when nothing is invalid or pending.
    pub fn submit<F>(&self, handler: F) -> FormResult<SubmitOutcome>
    where
        F: FnOnce(&FormState) -> FormResult<()>,
    {
        let names = {
            let mut state = write_lock(&self.state, "preparing submit")?;
            if state.submission.state == SubmitState::Submitting {
                return Err(FormError::AlreadySubmitting);
            }
            transition_submit_state(&mut state.submission, SubmitState::Validating)?;
            state.submission.count = state.submission.count.saturating_add(1);
            state.registry.names()
        };

        for name in &names {
            match self.dispatch(name, None, Trigger::Submit) {
                Ok(()) | Err(FormError::UnknownField(_)) => {}
                Err(error) => return Err(error),
            }
        }

        let decided = {
            let mut state = write_lock(&self.state, "deciding submit")?;
            let next = if state.current().can_submit() {
                SubmitState::Submitting
            } else {
                SubmitState::Failed
            };
            transition_submit_state(&mut state.submission, next)?;
            state.emission()
        };
        self.emit(decided.clone())?;

        if decided.submit_state == SubmitState::Failed {
            let blocked = SubmitBlocked {
                first_error: decided.first_error.clone(),
                validating: decided.validating.iter().cloned().collect(),
            };
            debug!(
                "submit blocked: first error {:?}, validating {:?}",
                blocked.first_error, blocked.validating
            );
            if self.options.focus_first_error_on_submit {
                let _ = self.focus_first_error()?;
            }
            return Ok(SubmitOutcome::Blocked(blocked));
        }

        let submit_result = handler(&decided);

        let completed = {
            let mut state = write_lock(&self.state, "completing submit")?;
            if state.submission.state == SubmitState::Submitting {
                let next = if submit_result.is_ok() {
                    SubmitState::Succeeded
                } else {
                    SubmitState::Failed
                };
                transition_submit_state(&mut state.submission, next)?;
                Some(state.emission())
            } else {
                None
            }
        };
        match completed {
            Some(completed) => {
                debug!("submit finished with {:?}", completed.submit_state);
                self.emit(completed)?;
            }
            None => debug!("submit handler moved the form out of submitting"),
        }
        submit_result.map(|()| SubmitOutcome::Submitted(decided))
    }

    /// Restores every field to its initial value. In-flight validations are
    /// retired and can no longer write errors; no validator runs.
    pub fn reset(&self) -> FormResult<()> {
        let emission = {
            let mut state = write_lock(&self.state, "resetting form")?;
            for record in state.registry.records_mut() {
                record.restore_initial();
            }
            transition_submit_state(&mut state.submission, SubmitState::Idle)?;
            state.emission()
        };
        debug!("form reset ({} fields)", emission.values.len());
        self.emit(emission)
    }

    pub fn reset_field(&self, name: &str) -> FormResult<()> {
        {
            let mut state = write_lock(&self.state, "resetting field")?;
            state.registry.get_mut(name)?.restore_initial();
        }
        self.publish()
    }

    pub fn clear_errors(&self) -> FormResult<()> {
        {
            let mut state = write_lock(&self.state, "clearing all field errors")?;
            for record in state.registry.records_mut() {
                record.bump_ticket();
                record.in_flight.clear();
                record.error = None;
            }
        }
        self.publish()
    }

    pub fn clear_field_error(&self, name: &str) -> FormResult<()> {
        {
            let mut state = write_lock(&self.state, "clearing field error")?;
            let record = state.registry.get_mut(name)?;
            record.bump_ticket();
            record.in_flight.clear();
            record.error = None;
        }
        self.publish()
    }

    pub(super) fn publish(&self) -> FormResult<()> {
        let emission = write_lock(&self.state, "publishing form state")?.emission();
        self.emit(emission)
    }

    fn emit(&self, state: FormState) -> FormResult<()> {
        {
            let mut delivery = lock(&self.delivery, "queueing form state")?;
            delivery.queue.push_back(state);
            if delivery.delivering {
                return Ok(());
            }
            delivery.delivering = true;
        }

        let mut turn = DeliveryTurn {
            delivery: &self.delivery,
            finished: false,
        };
        loop {
            let next = {
                let mut delivery = lock(&self.delivery, "delivering form state")?;
                let Some(next) = delivery.queue.pop_front() else {
                    delivery.delivering = false;
                    turn.finished = true;
                    return Ok(());
                };
                if next.revision <= delivery.last_revision {
                    trace!(
                        "skipping revision {}, {} already delivered",
                        next.revision, delivery.last_revision
                    );
                    continue;
                }
                delivery.last_revision = next.revision;
                next
            };

            let listeners = read_lock(&self.listeners, "reading listeners")?
                .entries
                .iter()
                .map(|(_, listener)| listener.clone())
                .collect::<Vec<_>>();
            for listener in listeners {
                listener(&next);
            }
        }
    }
}

pub(super) fn transition_submit_state(
    submission: &mut Submission,
    next: SubmitState,
) -> FormResult<()> {
    let current = submission.state;
    if current == next {
        return Ok(());
    }

    let allowed = matches!(
        (current, next),
        (SubmitState::Idle, SubmitState::Validating)
            | (SubmitState::Validating, SubmitState::Submitting)
            | (SubmitState::Validating, SubmitState::Failed)
            | (SubmitState::Submitting, SubmitState::Succeeded)
            | (SubmitState::Submitting, SubmitState::Failed)
            | (SubmitState::Succeeded, SubmitState::Validating)
            | (SubmitState::Failed, SubmitState::Validating)
            | (_, SubmitState::Idle)
    );
    if !allowed {
        return Err(FormError::InvalidStateTransition {
            from: current,
            to: next,
        });
    }
    submission.state = next;
    Ok(())
}

fn lock<'a, T>(mutex: &'a Mutex<T>, context: &'static str) -> FormResult<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| FormError::StatePoisoned(context))
}

pub(super) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(super) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}
