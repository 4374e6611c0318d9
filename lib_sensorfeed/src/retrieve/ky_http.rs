//! # HTTP Retrieval Utilities
//!
//! A small asynchronous GET-JSON client around `reqwest`, with retry
//! middleware for transient failures.

use reqwest::{header::ACCEPT, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;

use crate::error::Result;

/// A standardized container for API responses.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The deserialized body on success.
    pub data: Option<T>,
    /// The raw body returned by the server when the request failed.
    pub error_body: Option<String>,
    pub status: u16,
    /// `true` for 2xx statuses.
    pub success: bool,
}

/// Asynchronous HTTP client bound to one base URL.
pub struct ApiClient {
    inner: ClientWithMiddleware,
    base_url: Url,
}

impl ApiClient {
    /// Creates a client that retries transient failures up to `max_retries`
    /// times with exponential backoff.
    ///
    /// `base_url` must be absolute. A trailing slash is added when missing so
    /// relative paths join below it rather than replacing its last segment.
    pub fn new(base_url: &str, max_retries: u32) -> Result<Self> {
        let mut url = Url::parse(base_url)?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
        let client = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner: client,
            base_url: url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// GETs `path` (relative to the base URL) and decodes a JSON body.
    ///
    /// Non-2xx answers are not errors: they come back with `success == false`
    /// and the raw body in `error_body`. Network and decoding failures are.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<ApiResponse<T>> {
        let full_url = self.base_url.join(path)?;
        let response = self
            .inner
            .get(full_url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let status = response.status();

        if status.is_success() {
            let data = response.json::<T>().await?;
            Ok(ApiResponse {
                data: Some(data),
                error_body: None,
                status: status.as_u16(),
                success: true,
            })
        } else {
            Ok(ApiResponse {
                data: None,
                error_body: response.text().await.ok(),
                status: status.as_u16(),
                success: false,
            })
        }
    }
}
