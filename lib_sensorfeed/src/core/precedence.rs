//! # Data Precedence
//!
//! Three sources can supply "the current reading": the live stream, the value
//! persisted by a previous session, and a one-off pull from the snapshot
//! endpoint. The resolver picks exactly one, in a fixed order:
//!
//! 1. **live** once any live reading has arrived, for the rest of the session;
//! 2. **persisted** if one was loaded at startup;
//! 3. **snapshot** if the fetch completed with a reading;
//! 4. **none** otherwise.
//!
//! `PrecedenceState` is an immutable value. Every change produces a new state
//! and the current reading is recomputed from scratch by [`resolve`].

use serde::Serialize;

use crate::models::Reading;

/// Where the exposed reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Live,
    Persisted,
    Snapshot,
    None,
}

/// The single authoritative reading plus its provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentReading {
    pub reading: Option<Reading>,
    pub provenance: Provenance,
}

impl CurrentReading {
    pub fn none() -> Self {
        Self {
            reading: None,
            provenance: Provenance::None,
        }
    }
}

/// Raw inputs to the resolver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrecedenceState {
    live_reading: Option<Reading>,
    has_received_live: bool,
    persisted_reading: Option<Reading>,
    snapshot_reading: Option<Reading>,
    snapshot_fetch_attempted: bool,
}

impl PrecedenceState {
    /// Starting state for a session, seeded with whatever the store held.
    pub fn new(persisted_reading: Option<Reading>) -> Self {
        Self {
            persisted_reading,
            ..Self::default()
        }
    }

    /// Records a live reading. `has_received_live` never goes back to false.
    pub fn with_live(self, reading: Reading) -> Self {
        Self {
            live_reading: Some(reading),
            has_received_live: true,
            ..self
        }
    }

    /// Records a completed snapshot fetch. Ignored once live data exists.
    pub fn with_snapshot(self, reading: Option<Reading>) -> Self {
        if self.has_received_live {
            return self;
        }
        Self {
            snapshot_reading: reading,
            ..self
        }
    }

    pub fn with_snapshot_attempted(self) -> Self {
        Self {
            snapshot_fetch_attempted: true,
            ..self
        }
    }

    /// A snapshot fetch is allowed at most once and only before live data.
    pub fn should_fetch_snapshot(&self) -> bool {
        !self.snapshot_fetch_attempted && !self.has_received_live
    }

    pub fn has_received_live(&self) -> bool {
        self.has_received_live
    }
}

/// Picks the reading to expose.
pub fn resolve(state: &PrecedenceState) -> CurrentReading {
    if state.has_received_live {
        return CurrentReading {
            reading: state.live_reading.clone(),
            provenance: Provenance::Live,
        };
    }
    if let Some(reading) = &state.persisted_reading {
        return CurrentReading {
            reading: Some(reading.clone()),
            provenance: Provenance::Persisted,
        };
    }
    if let Some(reading) = &state.snapshot_reading {
        return CurrentReading {
            reading: Some(reading.clone()),
            provenance: Provenance::Snapshot,
        };
    }
    CurrentReading::none()
}
