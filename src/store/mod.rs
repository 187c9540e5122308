//! Event persistence.
//!
//! [`PersistHandler`] plugs an [`EventStore`] into a dispatch queue so every
//! event it sees is recorded, in the order the queue hands them out.

mod memory;

pub use memory::MemoryEventStore;

use crate::events::{Event, Seq};
use crate::handler::Handler;
use async_trait::async_trait;
use std::sync::Arc;

/// Store trait: append and reload dispatched events.
#[async_trait]
pub trait EventStore<P>: Send + Sync
where
    P: Send + Sync + 'static,
{
    /// Record one event.
    async fn append(&self, event: &Event<P>) -> crate::Result<()>;

    /// Events with `seq` greater than `after`, oldest first.
    async fn load_since(&self, after: Seq) -> crate::Result<Vec<Event<P>>>;

    async fn len(&self) -> crate::Result<usize>;

    async fn clear(&self) -> crate::Result<()>;
}

/// Alias for a shared store.
pub type SharedStore<P> = Arc<dyn EventStore<P>>;

/// Handler that appends every event it receives to a store.
pub struct PersistHandler<P>
where
    P: Send + Sync + 'static,
{
    store: SharedStore<P>,
}

impl<P> PersistHandler<P>
where
    P: Send + Sync + 'static,
{
    pub fn new(store: SharedStore<P>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<P> Handler<P> for PersistHandler<P>
where
    P: Send + Sync + 'static,
{
    async fn handle(&self, event: Arc<Event<P>>) -> anyhow::Result<()> {
        self.store.append(&event).await?;
        tracing::trace!(event = %event.name, seq = event.seq, "event persisted");
        Ok(())
    }

    fn name(&self) -> &str {
        "persist"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::events::{names, Named, WaEvent};
    use crate::EventDispatchQueue;

    #[tokio::test]
    async fn persist_handler_records_every_event_in_order() {
        let store = Arc::new(MemoryEventStore::<WaEvent>::new());
        let queue = EventDispatchQueue::<WaEvent>::new(QueueConfig::default()).unwrap();
        queue
            .register_catch_all(PersistHandler::<WaEvent>::new(store.clone()))
            .unwrap();

        queue.submit_named(WaEvent::CredsUpdate).unwrap();
        queue
            .submit_named(WaEvent::MessagingHistorySet {
                chats: 3,
                messages: 40,
                is_latest: true,
            })
            .unwrap();
        queue.wait_idle().await;

        let events = store.load_since(0).await.unwrap();
        let seen: Vec<&str> = events.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(seen, vec![names::CREDS_UPDATE, names::MESSAGING_HISTORY_SET]);
        assert_eq!(events[1].seq, 2);

        let tail = store.load_since(1).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].payload.event_name(), names::MESSAGING_HISTORY_SET);
        assert_eq!(store.len().await.unwrap(), 2);
    }
}
