use async_trait::async_trait;
use calbook_broker::Handler;
use calbook_core::Event;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Delivers reminders by writing them to the log. Clones share the count.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier {
    delivered: Arc<AtomicU64>,
}

impl LogNotifier {
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

pub fn describe(event: &Event) -> String {
    format!(
        "notification for {}: {} at {}",
        event.user,
        event.title,
        event.start.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

#[async_trait]
impl Handler<Event> for LogNotifier {
    async fn handle(&self, event: Event) {
        info!(event_id = %event.id, user = %event.user, "{}", describe(&event));
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }
}
