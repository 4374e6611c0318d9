//! # Data Models
//!
//! Plain data types shared by every other module.

/// The sensor reading record.
pub mod reading;

pub use reading::Reading;
