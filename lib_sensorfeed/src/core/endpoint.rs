//! # Endpoint Resolution
//!
//! Callers may hand the feed either a full `ws://` / `wss://` address or just
//! a path. Paths are resolved against an `Origin`, the server the client
//! considers "home": its transport security picks the scheme, its host and
//! port are reused as-is.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{FeedError, Result};

/// The execution context a relative endpoint is resolved against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    /// `true` when the origin is served over TLS.
    pub secure: bool,
    /// Host with optional port, e.g. `localhost:8000`.
    pub host: String,
}

impl Default for Origin {
    fn default() -> Self {
        Self {
            secure: false,
            host: "localhost:8000".to_string(),
        }
    }
}

impl Origin {
    /// Builds an origin from an `http(s)://host[:port]` address.
    pub fn from_url(address: &str) -> Result<Self> {
        let url = Url::parse(address)?;
        let host = url
            .host_str()
            .ok_or_else(|| FeedError::TransportConstruction(format!("origin {address} has no host")))?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        Ok(Self {
            secure: matches!(url.scheme(), "https" | "wss"),
            host,
        })
    }
}

/// Resolves the streaming address for `endpoint`.
///
/// Absolute streaming addresses are used as given. Anything else is treated as
/// a path on `origin`. Any parse failure is a transport-construction error.
pub fn resolve_endpoint(endpoint: &str, origin: &Origin) -> Result<Url> {
    let address = if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        endpoint.to_string()
    } else {
        let scheme = if origin.secure { "wss" } else { "ws" };
        let separator = if endpoint.starts_with('/') { "" } else { "/" };
        format!("{scheme}://{}{separator}{endpoint}", origin.host)
    };

    Url::parse(&address).map_err(|e| FeedError::TransportConstruction(format!("{address}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_address_is_kept() {
        let url = resolve_endpoint("wss://feed.example.com/ws/sensor-readings/", &Origin::default()).unwrap();
        assert_eq!(url.as_str(), "wss://feed.example.com/ws/sensor-readings/");
    }

    #[test]
    fn relative_path_follows_origin_security() {
        let insecure = Origin::from_url("http://localhost:8000").unwrap();
        let secure = Origin::from_url("https://sensors.example.com").unwrap();

        assert_eq!(
            resolve_endpoint("/ws/sensor-readings/", &insecure).unwrap().as_str(),
            "ws://localhost:8000/ws/sensor-readings/"
        );
        assert_eq!(
            resolve_endpoint("/ws/sensor-readings/", &secure).unwrap().as_str(),
            "wss://sensors.example.com/ws/sensor-readings/"
        );
    }

    #[test]
    fn path_without_leading_slash_is_joined() {
        let url = resolve_endpoint("ws/sensor-readings/", &Origin::default()).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8000/ws/sensor-readings/");
    }

    #[test]
    fn broken_address_is_a_construction_failure() {
        let err = resolve_endpoint("ws://", &Origin::default()).unwrap_err();
        assert!(matches!(err, FeedError::TransportConstruction(_)));
        assert_eq!(err.to_string(), "Failed to create WebSocket connection");

        let bad_host = Origin {
            secure: false,
            host: "exa mple".to_string(),
        };
        assert!(resolve_endpoint("/ws", &bad_host).is_err());
    }
}
