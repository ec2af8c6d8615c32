use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared screen on/off flag.
///
/// Written by whatever observes display power events and read by the screen
/// monitor once per iteration. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct ScreenState {
    on: Arc<AtomicBool>,
}

impl ScreenState {
    pub fn new(on: bool) -> Self {
        Self {
            on: Arc::new(AtomicBool::new(on)),
        }
    }

    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::Relaxed)
    }

    pub fn set_on(&self, on: bool) {
        self.on.store(on, Ordering::Relaxed);
    }
}
