//! HTTP implementation of the backend data-access collaborator
//!
//! The cache store only sees the [`DataSource`] trait; this module provides
//! the shipped implementation against the admin backend's collection API,
//! which serves each named collection as a JSON array at
//! `{base_url}/{collection}`.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::cache::{DataSource, FetchError};
use crate::config::BackendConfig;

/// reqwest-backed collection fetcher
pub struct HttpDataSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDataSource {
    /// Build a client from backend configuration
    pub fn new(config: &BackendConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("luach/", env!("CARGO_PKG_VERSION")))
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.base_url, collection)
    }
}

#[async_trait]
impl DataSource for HttpDataSource {
    async fn list(&self, collection: &str) -> Result<Vec<Value>, FetchError> {
        let url = self.collection_url(collection);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                collection: collection.to_string(),
                status: status.as_u16(),
            });
        }

        let payload: Value = response.json().await?;
        match payload {
            Value::Array(records) => Ok(records),
            _ => Err(FetchError::InvalidPayload {
                collection: collection.to_string(),
            }),
        }
    }
}
