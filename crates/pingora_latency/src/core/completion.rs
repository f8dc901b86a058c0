use std::fmt;
use std::panic::AssertUnwindSafe;

type Hook = Box<dyn FnOnce() + Send + 'static>;

/// Observers that run once a response has been fully sent.
///
/// Hooks are fired at most once. Dropping the set without firing it discards
/// every hook silently, which is what happens when a response never makes it
/// onto the wire.
#[derive(Default)]
pub struct CompletionHooks {
    hooks: Vec<Hook>,
}

impl CompletionHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F>(&mut self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.hooks.push(Box::new(hook));
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every registered hook in registration order and empty the set.
    ///
    /// A panicking hook is reported and skipped; the remaining hooks still run.
    pub fn fire(&mut self) {
        for hook in self.hooks.drain(..) {
            if let Err(panic_info) = std::panic::catch_unwind(AssertUnwindSafe(hook)) {
                let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic".to_string()
                };
                tracing::error!("Panic caught in completion hook: {}", panic_msg);
            }
        }
    }
}

impl fmt::Debug for CompletionHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionHooks")
            .field("pending", &self.hooks.len())
            .finish()
    }
}
