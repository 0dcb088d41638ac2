use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{db::EventStore, domain::EventRecord, errors::AppError};

#[derive(Clone, Default)]
pub struct MemoryEventStore {
    events: Arc<RwLock<Vec<EventRecord>>>,
}

impl MemoryEventStore {
    /// Inserted rows in arrival order.
    pub async fn events(&self) -> Vec<EventRecord> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn insert_event(&self, record: EventRecord) -> Result<(), AppError> {
        self.events.write().await.push(record);
        Ok(())
    }
}
