mod controller;
mod dispatch;
mod display;
mod oracle;
mod registry;
mod snapshot;
mod validation;


pub use controller::{
    FormController, FormError, FormOptions, FormResult, SubmitBlocked, SubmitOutcome, SubmitState,
    SubscriptionId,
};
pub use oracle::{ConstraintOracle, NoConstraints};
pub use registry::{FieldId, FieldView};
pub use snapshot::FormState;
pub use validation::{
    BoxedValidationFuture, FieldBindings, Trigger, Validation, ValidationTicket, Validator,
    ValidatorFailure, ValidatorKind,
};
