use calbook_core::{Calendar, EventStorage};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    calendar: Arc<Calendar<Arc<dyn EventStorage>>>,
}

impl AppState {
    pub fn new(storage: impl EventStorage + 'static) -> Self {
        let storage: Arc<dyn EventStorage> = Arc::new(storage);
        AppState {
            calendar: Arc::new(Calendar::new(storage)),
        }
    }

    pub fn calendar(&self) -> &Calendar<Arc<dyn EventStorage>> {
        &self.calendar
    }
}
