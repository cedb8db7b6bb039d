use std::fmt::{self, Debug, Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Change,
    Blur,
    Submit,
}

impl Trigger {
    pub(super) fn touches(self) -> bool {
        matches!(self, Trigger::Change | Trigger::Blur)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct ValidationTicket(pub u64);

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{reason}")]
pub struct ValidatorFailure {
    reason: String,
}

impl ValidatorFailure {
    pub fn new(reason: impl Display) -> Self {
        Self {
            reason: reason.to_string(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

pub type BoxedValidationFuture =
    Pin<Box<dyn Future<Output = Result<String, ValidatorFailure>> + Send + 'static>>;

pub enum Validation {
    Ready(String),
    Deferred(BoxedValidationFuture),
}

impl Validation {
    pub fn deferred<Fut, E>(future: Fut) -> Self
    where
        Fut: Future<Output = Result<String, E>> + Send + 'static,
        E: Display,
    {
        Validation::Deferred(Box::pin(async move {
            future.await.map_err(ValidatorFailure::new)
        }))
    }
}

impl Debug for Validation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Validation::Ready(message) => f.debug_tuple("Ready").field(message).finish(),
            Validation::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidatorKind {
    Sync,
    /// May resolve later. Skipped for empty values when
    /// `FormOptions::skip_empty_async` is set.
    Async,
}

type ValidateFn = Arc<dyn Fn(&str) -> Validation + Send + Sync>;
type RejectionFn = Arc<dyn Fn(&ValidatorFailure) -> String + Send + Sync>;

/// A validator bound to one trigger of one field.
///
/// Rejections of deferred validators never reach the caller of
/// `handle_trigger`. They become the field error: the `on_rejection` mapping
/// when one is set, otherwise the rejection reason. An empty message in
/// either case falls back to `FormOptions::rejection_message`.
#[derive(Clone)]
pub struct Validator {
    kind: ValidatorKind,
    debounce: Duration,
    validate: ValidateFn,
    rejection: Option<RejectionFn>,
}

impl Validator {
    pub fn sync<F>(validate: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::with_kind(ValidatorKind::Sync, move |value| {
            Validation::Ready(validate(value))
        })
    }

    pub fn deferred<F, Fut, E>(validate: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, E>> + Send + 'static,
        E: Display,
    {
        Self::with_kind(ValidatorKind::Async, move |value| {
            Validation::deferred(validate(value.to_owned()))
        })
    }

    pub fn dynamic<F>(validate: F) -> Self
    where
        F: Fn(&str) -> Validation + Send + Sync + 'static,
    {
        Self::with_kind(ValidatorKind::Async, validate)
    }

    fn with_kind<F>(kind: ValidatorKind, validate: F) -> Self
    where
        F: Fn(&str) -> Validation + Send + Sync + 'static,
    {
        Self {
            kind,
            debounce: Duration::ZERO,
            validate: Arc::new(validate),
            rejection: None,
        }
    }

    /// Waits `delay` before invoking. An invocation superseded while waiting
    /// never runs.
    pub fn debounce(mut self, delay: Duration) -> Self {
        self.debounce = delay;
        self
    }

    pub fn on_rejection<F>(mut self, map: F) -> Self
    where
        F: Fn(&ValidatorFailure) -> String + Send + Sync + 'static,
    {
        self.rejection = Some(Arc::new(map));
        self
    }

    pub fn kind(&self) -> ValidatorKind {
        self.kind
    }

    pub(super) fn debounce_delay(&self) -> Duration {
        self.debounce
    }

    pub(super) fn invoke(&self, value: &str) -> Validation {
        (self.validate)(value)
    }

    pub(super) fn rejection_message(&self, failure: &ValidatorFailure, fallback: &str) -> String {
        let message = match &self.rejection {
            Some(map) => map(failure),
            None => failure.reason().to_owned(),
        };
        if message.is_empty() {
            log::warn!("validator rejected without a message; using the generic one");
            fallback.to_owned()
        } else {
            message
        }
    }
}

impl Debug for Validator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("kind", &self.kind)
            .field("debounce", &self.debounce)
            .field("maps_rejection", &self.rejection.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, Default)]
pub struct FieldBindings {
    change: Option<Validator>,
    blur: Option<Validator>,
    submit: Option<Validator>,
}

impl FieldBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_change(mut self, validator: Validator) -> Self {
        self.change = Some(validator);
        self
    }

    pub fn on_blur(mut self, validator: Validator) -> Self {
        self.blur = Some(validator);
        self
    }

    pub fn on_submit(mut self, validator: Validator) -> Self {
        self.submit = Some(validator);
        self
    }

    pub fn for_trigger(&self, trigger: Trigger) -> Option<&Validator> {
        match trigger {
            Trigger::Change => self.change.as_ref(),
            Trigger::Blur => self.blur.as_ref(),
            Trigger::Submit => self.submit.as_ref(),
        }
    }
}
