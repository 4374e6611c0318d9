//! # Data Retrieval Module
//!
//! Pull-based access to the backend's source of record. The feed only needs
//! one thing from it, the most recent reading, expressed by the
//! `SnapshotFetcher` trait. The HTTP implementation sits behind the
//! `retrieve` feature together with the generic `ApiClient` it is built on.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Reading;

/// Generic HTTP API client with retry middleware.
#[cfg(feature = "retrieve")]
pub mod ky_http;
/// Snapshot fetcher backed by the REST listing endpoint.
#[cfg(feature = "retrieve")]
pub mod http_snapshot;

#[cfg(feature = "retrieve")]
pub use http_snapshot::HttpSnapshotFetcher;

/// One-shot request for the newest reading.
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    /// `Ok(None)` means the source answered but holds no readings yet.
    async fn fetch_latest(&self) -> Result<Option<Reading>>;
}
