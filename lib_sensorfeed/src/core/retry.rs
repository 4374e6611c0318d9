//! # Reconnect Policy
//!
//! Bounded, fixed-interval reconnection. The session task owns one
//! `RetryState` and asks it what to do every time the transport closes; the
//! answer is a `CloseDecision` the task acts on. Keeping the bookkeeping here
//! leaves the async loop with nothing to decide on its own.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Close code reserved for an intentional, orderly shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Reported when a peer sends a close frame without a status code.
pub const NO_STATUS_RECEIVED: u16 = 1005;
/// Reported locally when the connection drops without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_INTERVAL_MS: u64 = 3000;

/// How many times to reconnect and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval_ms: DEFAULT_INTERVAL_MS,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval_ms: interval.as_millis() as u64,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// What the session should do after a close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    /// Close code 1000: the peer or the caller meant it.
    Normal,
    /// Abnormal close, but the caller turned reconnection off.
    ReconnectDisabled,
    /// Schedule exactly one reconnect after `delay`. `attempt` is the new count.
    Retry { attempt: u32, delay: Duration },
    /// Budget spent after `attempts` retries.
    Exhausted { attempts: u32 },
}

/// Attempt counter for one activation.
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempt_count: u32,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempt_count: 0,
        }
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// A handshake succeeded.
    pub fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Classifies a close and, when a retry is due, consumes one attempt.
    pub fn on_close(&mut self, code: u16, reconnect_enabled: bool) -> CloseDecision {
        if code == NORMAL_CLOSURE {
            return CloseDecision::Normal;
        }
        if !reconnect_enabled {
            return CloseDecision::ReconnectDisabled;
        }
        if self.attempt_count >= self.policy.max_attempts {
            return CloseDecision::Exhausted {
                attempts: self.attempt_count,
            };
        }
        self.attempt_count += 1;
        CloseDecision::Retry {
            attempt: self.attempt_count,
            delay: self.policy.interval(),
        }
    }
}
