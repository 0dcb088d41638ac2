use std::{env, error::Error, fmt, str::FromStr};

use crate::db::{bigquery::DEFAULT_API_URL, credentials::TokenSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    BigQuery,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bigquery" => Ok(Self::BigQuery),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown EVENT_STORE: {other}")),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BigQuery => "bigquery",
            Self::Memory => "memory",
        })
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub store: StoreBackend,
    pub project_id: Option<String>,
    pub bigquery_api_url: String,
    pub access_token: Option<String>,
}

const DEFAULT_PORT: &str = "8080";

impl AppConfig {
    pub fn from_env() -> Result<Self, Box<dyn Error + Send + Sync>> {
        let bind_addr = match optional_var("BIND_ADDR")? {
            Some(addr) => addr,
            None => {
                let port = optional_var("PORT")?.unwrap_or_else(|| DEFAULT_PORT.to_owned());
                format!("0.0.0.0:{port}")
            }
        };
        let store = match optional_var("EVENT_STORE")? {
            Some(raw) => raw.parse::<StoreBackend>()?,
            None => StoreBackend::BigQuery,
        };
        let project_id = match optional_var("GCP_PROJECT_ID")? {
            Some(project) => Some(project),
            None => optional_var("GOOGLE_CLOUD_PROJECT")?,
        };
        if store == StoreBackend::BigQuery && project_id.is_none() {
            return Err(
                "GCP_PROJECT_ID or GOOGLE_CLOUD_PROJECT must be set for the bigquery store".into(),
            );
        }
        let bigquery_api_url =
            optional_var("BIGQUERY_API_URL")?.unwrap_or_else(|| DEFAULT_API_URL.to_owned());
        let access_token =
            optional_var("BIGQUERY_ACCESS_TOKEN")?.filter(|token| !token.is_empty());

        Ok(Self {
            bind_addr,
            store,
            project_id,
            bigquery_api_url,
            access_token,
        })
    }

    pub fn token_source(&self) -> TokenSource {
        match &self.access_token {
            Some(token) => TokenSource::Static(token.clone()),
            None => TokenSource::metadata_server(),
        }
    }
}

fn optional_var(name: &str) -> Result<Option<String>, env::VarError> {
    match env::var(name) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err),
    }
}
