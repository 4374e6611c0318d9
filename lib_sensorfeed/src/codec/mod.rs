//! # Frame Codec
//!
//! Turns raw inbound stream frames into typed readings. Decoding never touches
//! connection state: a frame either becomes a `Reading` or is discarded.

/// JSON text frame decoder with envelope unwrapping.
pub mod decoder;

pub use decoder::{decode_frame, DecodeError};
