//! Event dispatch.
//!
//! Routes [`ClientEvent`]s to subscribers. Subscribers run in registration
//! order; a panicking subscriber is logged and skipped without affecting
//! delivery to the rest.

// ============================================================================
// Imports
// ============================================================================

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{trace, warn};

use crate::identifiers::SubscriptionId;
use crate::protocol::{ClientEvent, Diagnostic};

// ============================================================================
// Types
// ============================================================================

/// Event handler callback type.
pub type EventHandler = Arc<dyn Fn(&ClientEvent) + Send + Sync>;

// ============================================================================
// EventFilter
// ============================================================================

/// Selects which events a subscriber receives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventFilter {
    /// Transport opened.
    Open,
    /// Transport closed.
    Close,
    /// Server descriptor fetched.
    Info,
    /// Diagnostics.
    Diagnostic,
    /// Server event with exactly this name.
    Named(String),
    /// Every server event.
    AnyServer,
    /// Everything.
    Any,
}

impl EventFilter {
    /// Returns `true` if `event` passes this filter.
    #[must_use]
    pub fn matches(&self, event: &ClientEvent) -> bool {
        match (self, event) {
            (Self::Any, _) => true,
            (Self::Open, ClientEvent::Open) => true,
            (Self::Close, ClientEvent::Close(_)) => true,
            (Self::Info, ClientEvent::Info(_)) => true,
            (Self::Diagnostic, ClientEvent::Diagnostic(_)) => true,
            (Self::AnyServer, ClientEvent::Server(_)) => true,
            (Self::Named(name), ClientEvent::Server(server)) => *name == server.name,
            _ => false,
        }
    }
}

impl From<&str> for EventFilter {
    /// Maps lifecycle names to their typed filter and anything else to
    /// [`EventFilter::Named`]. `"*"` subscribes to everything.
    fn from(name: &str) -> Self {
        match name {
            "open" => Self::Open,
            "close" => Self::Close,
            "info" => Self::Info,
            "diagnostic" => Self::Diagnostic,
            "*" => Self::Any,
            other => Self::Named(other.to_string()),
        }
    }
}

// ============================================================================
// EventDispatcher
// ============================================================================

struct Subscriber {
    id: SubscriptionId,
    filter: EventFilter,
    handler: EventHandler,
}

/// Registry of event subscribers.
#[derive(Default)]
pub struct EventDispatcher {
    subscribers: RwLock<Vec<Subscriber>>,
}

impl EventDispatcher {
    /// Creates an empty dispatcher.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for events matching `filter`.
    pub fn subscribe<F>(&self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId::next();
        self.subscribers.write().push(Subscriber {
            id,
            filter,
            handler: Arc::new(handler),
        });
        id
    }

    /// Removes a subscription. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    /// Delivers `event` to every matching subscriber.
    ///
    /// Handlers are invoked outside the registry lock, so a handler may
    /// subscribe or unsubscribe. Returns the number of handlers that ran to
    /// completion.
    pub fn dispatch(&self, event: &ClientEvent) -> usize {
        let targets: Vec<(SubscriptionId, EventHandler)> = self
            .subscribers
            .read()
            .iter()
            .filter(|s| s.filter.matches(event))
            .map(|s| (s.id, Arc::clone(&s.handler)))
            .collect();

        let mut delivered = 0;
        for (id, handler) in targets {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!(subscription = %id, event = event.name(), "Event subscriber panicked"),
            }
        }

        trace!(event = event.name(), delivered, "Event dispatched");
        delivered
    }

    /// Reports a diagnostic to subscribers.
    #[inline]
    pub fn report(&self, diagnostic: Diagnostic) {
        self.dispatch(&ClientEvent::Diagnostic(diagnostic));
    }

    /// Returns the number of registered subscriptions.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Returns `true` if nobody is subscribed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
