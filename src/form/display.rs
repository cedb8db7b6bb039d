use std::sync::Arc;

use super::controller::{FormController, FormResult, read_lock, write_lock};

impl FormController {
    /// Error to show for `name`: hidden until the field is touched or a submit
    /// was attempted.
    pub fn visible_error(&self, name: &str) -> FormResult<Option<String>> {
        let state = read_lock(&self.state, "reading visible error")?;
        let record = state.registry.get(name)?;
        if !record.touched && state.submission.count == 0 {
            return Ok(None);
        }
        Ok(record.error_message().map(str::to_owned))
    }

    pub fn register_focus_handler(
        &self,
        name: &str,
        handler: impl Fn() + Send + Sync + 'static,
    ) -> FormResult<()> {
        read_lock(&self.state, "checking field for focus handler")?
            .registry
            .get(name)?;
        let mut handlers = write_lock(&self.focus_handlers, "registering focus handler")?;
        handlers.insert(name.to_owned(), Arc::new(handler));
        Ok(())
    }

    pub fn focus_first_error(&self) -> FormResult<bool> {
        let first_error = read_lock(&self.state, "reading first error")?
            .current()
            .first_error;
        let Some(name) = first_error else {
            return Ok(false);
        };
        let handler = read_lock(&self.focus_handlers, "reading focus handlers")?
            .get(&name)
            .cloned();
        if let Some(handler) = handler {
            handler();
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
