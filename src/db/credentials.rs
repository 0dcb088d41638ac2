use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::RwLock;

use crate::errors::AppError;

pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

// Refresh this long before the metadata server says the token expires.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Where BigQuery bearer tokens come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    Static(String),
    /// Service account token served by the GCE metadata server.
    Metadata { url: String },
}

impl TokenSource {
    pub fn metadata_server() -> Self {
        Self::Metadata {
            url: METADATA_TOKEN_URL.to_owned(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Hands out bearer tokens, reusing a metadata-server token until it is close to expiry.
#[derive(Debug)]
pub struct AccessTokens {
    source: TokenSource,
    cached: RwLock<Option<CachedToken>>,
}

impl AccessTokens {
    pub fn new(source: TokenSource) -> Self {
        Self {
            source,
            cached: RwLock::new(None),
        }
    }

    pub async fn access_token(&self, client: &reqwest::Client) -> Result<String, AppError> {
        let url = match &self.source {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::Metadata { url } => url,
        };

        if let Some(token) = self.cached.read().await.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let mut cached = self.cached.write().await;
        // Another request may have refreshed while we waited for the lock.
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let fetched = fetch_metadata_token(client, url).await?;
        let lifetime = Duration::from_secs(fetched.expires_in).saturating_sub(EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            value: fetched.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });

        Ok(fetched.access_token)
    }
}

async fn fetch_metadata_token(
    client: &reqwest::Client,
    url: &str,
) -> Result<MetadataToken, AppError> {
    let response = client
        .get(url)
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .map_err(|err| AppError::Credentials(format!("metadata request failed: {err}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AppError::Credentials(format!(
            "metadata server returned {status}"
        )));
    }

    response
        .json::<MetadataToken>()
        .await
        .map_err(|err| AppError::Credentials(format!("parse metadata token: {err}")))
}
