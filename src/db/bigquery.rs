use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::{
        credentials::{AccessTokens, TokenSource},
        EventStore,
    },
    domain::{EventRecord, DATASET_ID, TABLE_ID},
    errors::AppError,
};

pub const DEFAULT_API_URL: &str = "https://bigquery.googleapis.com";

/// Streams rows into `analytics.events` through the `tabledata.insertAll` API.
#[derive(Clone)]
pub struct BigQueryEventStore {
    client: reqwest::Client,
    insert_url: String,
    tokens: Arc<AccessTokens>,
}

#[derive(Debug, Serialize)]
struct InsertAllRequest<'a> {
    rows: [InsertRow<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertRow<'a> {
    insert_id: Uuid,
    json: &'a EventRecord,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<serde_json::Value>,
}

impl BigQueryEventStore {
    pub fn new(
        client: reqwest::Client,
        api_url: &str,
        project_id: &str,
        tokens: TokenSource,
    ) -> Self {
        let insert_url = format!(
            "{}/bigquery/v2/projects/{project_id}/datasets/{DATASET_ID}/tables/{TABLE_ID}/insertAll",
            api_url.trim_end_matches('/'),
        );

        Self {
            client,
            insert_url,
            tokens: Arc::new(AccessTokens::new(tokens)),
        }
    }

    pub fn insert_url(&self) -> &str {
        &self.insert_url
    }
}

#[async_trait]
impl EventStore for BigQueryEventStore {
    async fn insert_event(&self, record: EventRecord) -> Result<(), AppError> {
        let token = self.tokens.access_token(&self.client).await?;

        // insertId is random per call, so client retries still land as separate rows.
        let request = InsertAllRequest {
            rows: [InsertRow {
                insert_id: Uuid::new_v4(),
                json: &record,
            }],
        };

        let response = self
            .client
            .post(&self.insert_url)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::StoreRejected {
                status: status.as_u16(),
                body,
            });
        }

        let outcome = response.json::<InsertAllResponse>().await?;
        if !outcome.insert_errors.is_empty() {
            return Err(AppError::InsertErrors(serde_json::Value::Array(
                outcome.insert_errors,
            )));
        }

        tracing::debug!(table = %TABLE_ID, dataset = %DATASET_ID, "event row inserted");
        Ok(())
    }
}
