//! # Core Feed Engine
//!
//! Everything between "a caller wants sensor data" and "a reading is on
//! screen". The pieces, leaves first:
//!
//! - **`retry`**: the pure reconnection budget. Knows close codes, attempt
//!   counts and intervals, nothing else.
//!
//! - **`endpoint`**: turns an absolute `ws(s)://` address or a bare path into
//!   the address to dial, using the configured `Origin`.
//!
//! - **`transport`**: the `Connector` / `Transport` seam and its
//!   `tokio-tungstenite` implementation.
//!
//! - **`dispatcher`**: the replaceable handler cell. Callers swap handlers
//!   freely; the connection only ever sees the cell.
//!
//! - **`connection_manager`**: the state machine. One spawned task per
//!   session owns the transport and every transition.
//!
//! - **`precedence`**: the pure rule that picks one current reading out of
//!   live, persisted and snapshot data.
//!
//! - **`feed`**: `SensorFeed`, which wires all of the above to a store and a
//!   snapshot source.

/// Close-code classification and the bounded retry budget.
pub mod retry;
/// Streaming address resolution.
pub mod endpoint;
/// Transport abstraction and the WebSocket implementation.
pub mod transport;
/// Caller handler cell and event delivery.
pub mod dispatcher;
/// The single-connection state machine.
pub mod connection_manager;
/// Live > persisted > snapshot > none.
pub mod precedence;
/// Caller-facing wiring.
pub mod feed;

// --- Public API Re-exports ---
pub use connection_manager::{ConnectionManager, ConnectionState, ConnectionStatus, LiveReadingSink, OutboundPayload};
pub use dispatcher::{CallbackDispatcher, CloseEvent, Handlers};
pub use endpoint::{resolve_endpoint, Origin};
pub use feed::{FeedOptions, SensorFeed, STORE_TIMEOUT};
pub use precedence::{resolve, CurrentReading, PrecedenceState, Provenance};
pub use retry::{CloseDecision, RetryPolicy, RetryState};
pub use transport::{Connector, Transport, TransportEvent, TungsteniteConnector};
