use super::EventStore;
use crate::error::StoreError;
use crate::events::{Event, Seq};
use crate::Result;
use async_trait::async_trait;
use std::sync::RwLock;

/// In-memory event store (for testing or single-run; not persistent).
pub struct MemoryEventStore<P> {
    events: RwLock<Vec<Event<P>>>,
}

impl<P> MemoryEventStore<P> {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
        }
    }
}

impl<P> Default for MemoryEventStore<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<P> EventStore<P> for MemoryEventStore<P>
where
    P: Clone + Send + Sync + 'static,
{
    async fn append(&self, event: &Event<P>) -> Result<()> {
        self.events
            .write()
            .map_err(|e| StoreError::Append(e.to_string()))?
            .push(event.clone());
        Ok(())
    }

    async fn load_since(&self, after: Seq) -> Result<Vec<Event<P>>> {
        let events = self
            .events
            .read()
            .map_err(|e| StoreError::Load(e.to_string()))?;
        Ok(events.iter().filter(|e| e.seq > after).cloned().collect())
    }

    async fn len(&self) -> Result<usize> {
        let events = self
            .events
            .read()
            .map_err(|e| StoreError::Load(e.to_string()))?;
        Ok(events.len())
    }

    async fn clear(&self) -> Result<()> {
        self.events
            .write()
            .map_err(|e| StoreError::Clear(e.to_string()))?
            .clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::Arc;

    #[tokio::test]
    async fn memory_store_append_and_load() {
        let store = MemoryEventStore::new();
        for seq in 1..=3 {
            store
                .append(&Event::new("messages.upsert".into(), seq * 10, seq))
                .await
                .unwrap();
        }
        let all = store.load_since(0).await.unwrap();
        assert_eq!(all.iter().map(|e| e.payload).collect::<Vec<_>>(), vec![10, 20, 30]);
        let tail = store.load_since(2).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].seq, 3);
    }

    #[tokio::test]
    async fn memory_store_clear() {
        let store = MemoryEventStore::new();
        store
            .append(&Event::new("call".into(), "offer".to_string(), 1))
            .await
            .unwrap();
        assert_eq!(store.len().await.unwrap(), 1);
        store.clear().await.unwrap();
        assert_eq!(store.len().await.unwrap(), 0);
        assert!(store.load_since(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn poisoned_clear_names_the_operation() {
        let store = Arc::new(MemoryEventStore::<u32>::new());
        let poisoner = Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _events = poisoner.events.write().unwrap();
            panic!("writer crashed");
        })
        .join();

        let err = store.clear().await.unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::Clear(_))));
    }
}
