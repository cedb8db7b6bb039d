pub use crate::form::{
    ConstraintOracle, FieldBindings, FormController, FormError, FormOptions, FormResult,
    FormState, SubmitOutcome, Trigger, Validation, Validator, ValidatorFailure,
};
