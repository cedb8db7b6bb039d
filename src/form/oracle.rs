/// Queried on every trigger and never cached. An empty string means the
/// native constraints have no complaint about the field.
pub trait ConstraintOracle: Send + Sync {
    fn native_validation_message(&self, name: &str) -> String;
}

impl<F> ConstraintOracle for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn native_validation_message(&self, name: &str) -> String {
        (self)(name)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoConstraints;

impl ConstraintOracle for NoConstraints {
    fn native_validation_message(&self, _name: &str) -> String {
        String::new()
    }
}
