pub mod form;
pub mod prelude;

pub use form::{
    BoxedValidationFuture, ConstraintOracle, FieldBindings, FieldId, FieldView, FormController,
    FormError, FormOptions, FormResult, FormState, NoConstraints, SubmitBlocked, SubmitOutcome,
    SubmitState, SubscriptionId, Trigger, Validation, ValidationTicket, Validator,
    ValidatorFailure, ValidatorKind,
};
