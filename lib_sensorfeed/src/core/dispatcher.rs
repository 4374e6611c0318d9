//! # Callback Dispatcher
//!
//! Delivers lifecycle and data events to whatever handlers the caller has
//! registered *right now*.
//!
//! The connection task never captures a handler. It holds a clone of the
//! `CallbackDispatcher`, which is only a shared pointer to a handler cell, and
//! every dispatch reads the cell at call time. Callers can therefore swap
//! handlers as often as they like without the connection noticing, and in
//! particular without a teardown/reconnect cycle.
//!
//! Handlers are cloned out of the cell before they run, so a handler is free
//! to replace handlers itself.

use std::fmt;
use std::sync::{Arc, RwLock};

use crate::core::retry::{ABNORMAL_CLOSURE, NORMAL_CLOSURE};
use crate::models::Reading;

/// Details of a transport closure, as handed to `on_close`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    pub code: u16,
    pub reason: String,
}

impl CloseEvent {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    pub fn normal(reason: impl Into<String>) -> Self {
        Self::new(NORMAL_CLOSURE, reason)
    }

    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self::new(ABNORMAL_CLOSURE, reason)
    }

    pub fn is_normal(&self) -> bool {
        self.code == NORMAL_CLOSURE
    }
}

pub type OpenHandler = Arc<dyn Fn() + Send + Sync>;
pub type CloseHandler = Arc<dyn Fn(&CloseEvent) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(&str) + Send + Sync>;
pub type MessageHandler = Arc<dyn Fn(&Reading) + Send + Sync>;

/// The set of caller-supplied handlers. Every slot is optional.
#[derive(Clone, Default)]
pub struct Handlers {
    pub on_open: Option<OpenHandler>,
    pub on_close: Option<CloseHandler>,
    pub on_error: Option<ErrorHandler>,
    pub on_message: Option<MessageHandler>,
}

impl Handlers {
    pub fn on_open(mut self, handler: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_open = Some(Arc::new(handler));
        self
    }

    pub fn on_close(mut self, handler: impl Fn(&CloseEvent) + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(handler));
        self
    }

    pub fn on_error(mut self, handler: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(handler));
        self
    }

    pub fn on_message(mut self, handler: impl Fn(&Reading) + Send + Sync + 'static) -> Self {
        self.on_message = Some(Arc::new(handler));
        self
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_message", &self.on_message.is_some())
            .finish()
    }
}

/// Shared, replaceable handler cell. Cloning shares the cell.
#[derive(Clone, Default, Debug)]
pub struct CallbackDispatcher {
    handlers: Arc<RwLock<Handlers>>,
}

impl CallbackDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handlers(handlers: Handlers) -> Self {
        Self {
            handlers: Arc::new(RwLock::new(handlers)),
        }
    }

    /// Swaps in a whole new handler set.
    pub fn replace(&self, handlers: Handlers) {
        *self.handlers.write().expect("Dispatcher lock poisoned") = handlers;
    }

    pub fn set_on_open(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.handlers.write().expect("Dispatcher lock poisoned").on_open = Some(Arc::new(handler));
    }

    pub fn set_on_close(&self, handler: impl Fn(&CloseEvent) + Send + Sync + 'static) {
        self.handlers.write().expect("Dispatcher lock poisoned").on_close = Some(Arc::new(handler));
    }

    pub fn set_on_error(&self, handler: impl Fn(&str) + Send + Sync + 'static) {
        self.handlers.write().expect("Dispatcher lock poisoned").on_error = Some(Arc::new(handler));
    }

    pub fn set_on_message(&self, handler: impl Fn(&Reading) + Send + Sync + 'static) {
        self.handlers.write().expect("Dispatcher lock poisoned").on_message = Some(Arc::new(handler));
    }

    pub fn dispatch_open(&self) {
        let handler = self.read().on_open.clone();
        if let Some(handler) = handler {
            handler();
        }
    }

    pub fn dispatch_close(&self, event: &CloseEvent) {
        let handler = self.read().on_close.clone();
        if let Some(handler) = handler {
            handler(event);
        }
    }

    pub fn dispatch_error(&self, message: &str) {
        let handler = self.read().on_error.clone();
        if let Some(handler) = handler {
            handler(message);
        }
    }

    pub fn dispatch_message(&self, reading: &Reading) {
        let handler = self.read().on_message.clone();
        if let Some(handler) = handler {
            handler(reading);
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Handlers> {
        self.handlers.read().expect("Dispatcher lock poisoned")
    }
}
