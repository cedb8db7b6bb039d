use futures::task::SpawnExt;
use futures_timer::Delay;
use log::{debug, error, trace};

use super::controller::{FormController, FormResult, read_lock, write_lock};
use super::registry::FieldId;
use super::validation::{
    BoxedValidationFuture, Trigger, Validation, ValidationTicket, Validator, ValidatorKind,
};

#[derive(Clone, Debug)]
struct PendingValidation {
    name: String,
    field: FieldId,
    ticket: ValidationTicket,
}

enum Invocation {
    Debounced(String),
    Running(BoxedValidationFuture),
}

impl FormController {
    /// Forwards a raw input event. Updates the value, runs the validator bound
    /// to `trigger` and emits the new state. Validator failures end up in the
    /// emitted errors; only an unknown `name` is reported here.
    pub fn handle_trigger(
        &self,
        name: &str,
        value: impl Into<String>,
        trigger: Trigger,
    ) -> FormResult<()> {
        self.dispatch(name, Some(value.into()), trigger)?;
        self.publish()
    }

    pub(super) fn dispatch(
        &self,
        name: &str,
        input: Option<String>,
        trigger: Trigger,
    ) -> FormResult<()> {
        let native_message = self.oracle.native_validation_message(name);
        let revalidating = input.is_none();
        let planned = {
            let mut state = write_lock(&self.state, "dispatching trigger")?;
            let record = state.registry.get_mut(name)?;
            if let Some(value) = input {
                record.touched |= trigger.touches();
                record.set_value(value);
            }

            let bound = record.bindings.for_trigger(trigger).cloned();
            match bound {
                None => {
                    record.apply_native_message(native_message);
                    None
                }
                Some(validator)
                    if validator.kind() == ValidatorKind::Async
                        && record.value.is_empty()
                        && self.options.skip_empty_async =>
                {
                    record.bump_ticket();
                    record.set_custom_error(String::new());
                    None
                }
                Some(validator)
                    if revalidating
                        && trigger == Trigger::Submit
                        && validator.kind() == ValidatorKind::Async
                        && record.is_current_for(trigger) =>
                {
                    trace!("reusing submit validation {} of `{name}`", record.ticket.0);
                    None
                }
                Some(validator) => {
                    let ticket = record.begin_validation(trigger);
                    trace!("issued ticket {} for `{name}` on {trigger:?}", ticket.0);
                    let pending = PendingValidation {
                        name: name.to_owned(),
                        field: record.id,
                        ticket,
                    };
                    Some((pending, validator, record.value.clone()))
                }
            }
        };

        let Some((pending, validator, value)) = planned else {
            return Ok(());
        };
        if !validator.debounce_delay().is_zero() {
            self.spawn_validation(pending, validator, Invocation::Debounced(value));
            return Ok(());
        }
        match validator.invoke(&value) {
            Validation::Ready(message) => {
                let _ = self.retire(&pending, Some(message))?;
            }
            Validation::Deferred(future) => {
                self.spawn_validation(pending, validator, Invocation::Running(future));
            }
        }
        Ok(())
    }

    fn spawn_validation(
        &self,
        pending: PendingValidation,
        validator: Validator,
        invocation: Invocation,
    ) {
        debug!(
            "validating `{}` asynchronously with ticket {}",
            pending.name, pending.ticket.0
        );
        let controller = self.clone();
        let task_pending = pending.clone();
        let task = async move {
            let pending = task_pending;
            let future = match invocation {
                Invocation::Running(future) => future,
                Invocation::Debounced(value) => {
                    Delay::new(validator.debounce_delay()).await;
                    match controller.is_current(&pending) {
                        Ok(true) => {}
                        Ok(false) => {
                            controller.settle_from_task(&pending, None);
                            return;
                        }
                        Err(err) => {
                            error!("failed to check ticket for `{}`: {err}", pending.name);
                            return;
                        }
                    }
                    match validator.invoke(&value) {
                        Validation::Ready(message) => {
                            controller.settle_from_task(&pending, Some(message));
                            return;
                        }
                        Validation::Deferred(future) => future,
                    }
                }
            };

            let message = match future.await {
                Ok(message) => message,
                Err(failure) => {
                    validator.rejection_message(&failure, &controller.options.rejection_message)
                }
            };
            controller.settle_from_task(&pending, Some(message));
        };

        if let Err(err) = self.spawner.spawn(task) {
            error!("executor refused validation of `{}`: {err}", pending.name);
            let message = self.options.rejection_message.clone();
            self.settle_from_task(&pending, Some(message));
        }
    }

    fn settle_from_task(&self, pending: &PendingValidation, message: Option<String>) {
        let settled = self
            .retire(pending, message)
            .and_then(|changed| if changed { self.publish() } else { Ok(()) });
        if let Err(err) = settled {
            error!("failed to settle validation of `{}`: {err}", pending.name);
        }
    }

    fn is_current(&self, pending: &PendingValidation) -> FormResult<bool> {
        let state = read_lock(&self.state, "checking validation ticket")?;
        Ok(state
            .registry
            .get(&pending.name)
            .is_ok_and(|record| record.id == pending.field && record.ticket == pending.ticket))
    }

    fn retire(&self, pending: &PendingValidation, message: Option<String>) -> FormResult<bool> {
        let mut state = write_lock(&self.state, "settling validation")?;
        let Some(record) = state.registry.registered_mut(&pending.name, pending.field) else {
            trace!(
                "dropping ticket {} of unregistered field `{}`",
                pending.ticket.0, pending.name
            );
            return Ok(false);
        };

        let was_in_flight = record.in_flight.remove(&pending.ticket);
        if record.ticket != pending.ticket {
            trace!(
                "discarding stale ticket {} of `{}`, current is {}",
                pending.ticket.0, pending.name, record.ticket.0
            );
            return Ok(was_in_flight);
        }
        if let Some(message) = message {
            record.set_custom_error(message);
        }
        Ok(true)
    }
}
