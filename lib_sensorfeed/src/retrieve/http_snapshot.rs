//! # HTTP Snapshot Fetcher
//!
//! Pulls the most recent reading from the backend's REST listing. The endpoint
//! returns readings newest-first; only the first one is used.

use async_trait::async_trait;

use crate::error::{FeedError, Result};
use crate::models::Reading;
use crate::retrieve::ky_http::ApiClient;
use crate::retrieve::SnapshotFetcher;

/// Listing path relative to the API base URL.
pub const SNAPSHOT_PATH: &str = "api/v1/sensors-readings/";

pub struct HttpSnapshotFetcher {
    client: ApiClient,
    sensor_id: Option<String>,
}

impl HttpSnapshotFetcher {
    /// `api_url` is the backend base address, e.g. `http://localhost:8000`.
    pub fn new(api_url: &str, max_retries: u32) -> Result<Self> {
        Ok(Self {
            client: ApiClient::new(api_url, max_retries)?,
            sensor_id: None,
        })
    }

    /// Restricts the snapshot to one sensor.
    pub fn for_sensor(mut self, sensor_id: impl Into<String>) -> Self {
        self.sensor_id = Some(sensor_id.into());
        self
    }

    fn path(&self) -> String {
        match &self.sensor_id {
            Some(sensor) => format!("{SNAPSHOT_PATH}?limit=1&sensor_id={}", urlencode(sensor)),
            None => format!("{SNAPSHOT_PATH}?limit=1"),
        }
    }
}

fn urlencode(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

#[async_trait]
impl SnapshotFetcher for HttpSnapshotFetcher {
    async fn fetch_latest(&self) -> Result<Option<Reading>> {
        let path = self.path();
        let response = self
            .client
            .get_json::<Vec<Reading>>(&path)
            .await?;

        if !response.success {
            return Err(FeedError::Snapshot(format!(
                "HTTP {} from {}: {}",
                response.status,
                path,
                response.error_body.unwrap_or_default()
            )));
        }

        Ok(response.data.and_then(|readings| readings.into_iter().next()))
    }
}
