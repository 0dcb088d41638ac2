use async_trait::async_trait;

use crate::{domain::EventRecord, errors::AppError};

pub mod bigquery;
pub mod credentials;
pub mod memory;

/// Destination for tracked events. Each call writes exactly one row.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert_event(&self, record: EventRecord) -> Result<(), AppError>;
}
