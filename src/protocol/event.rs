//! Event message types.
//!
//! Two families of events reach subscribers:
//!
//! - **Server events**: unsolicited frames pushed by the server, shaped
//!   `{event, data, time}` and carrying no correlation id.
//! - **Lifecycle events**: produced locally by the client (`open`, `close`,
//!   `info`) plus diagnostics for frames that had to be discarded.
//!
//! Both are delivered as a single [`ClientEvent`] union.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ServerDescriptor;

// ============================================================================
// Close Codes
// ============================================================================

/// Close code for a deliberate local shutdown.
pub const CLOSE_CODE_NORMAL: u16 = 1000;

/// Close code used by the keepalive monitor.
pub const CLOSE_CODE_PING_TIMEOUT: u16 = 4000;

/// Close code reported when the socket ended without a close frame.
pub const CLOSE_CODE_ABNORMAL: u16 = 1006;

/// Close reason that marks a deliberate local close and suppresses reconnect.
pub const DELIBERATE_CLOSE_REASON: &str = "mfpclient-close";

/// Close reason used when the keepalive ping went unanswered.
pub const PING_TIMEOUT_REASON: &str = "mfpclient-pingtoolong";

// ============================================================================
// ServerEvent
// ============================================================================

/// An event pushed by the server.
///
/// # Format
///
/// ```json
/// {
///   "event": "instance_log",
///   "data": { ... },
///   "time": 1718000000000
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEvent {
    /// Event name.
    #[serde(rename = "event")]
    pub name: String,

    /// Event-specific data.
    #[serde(default)]
    pub data: Value,

    /// Server timestamp, if the server sent one.
    #[serde(default)]
    pub time: Option<i64>,
}

impl ServerEvent {
    /// Parses the event into a typed variant.
    #[must_use]
    pub fn parse(&self) -> ParsedEvent {
        match self.name.as_str() {
            "instance_log" => ParsedEvent::InstanceLog {
                data: self.data.clone(),
                time: self.time,
            },
            _ => ParsedEvent::Unknown {
                name: self.name.clone(),
                data: self.data.clone(),
            },
        }
    }
}

// ============================================================================
// ParsedEvent
// ============================================================================

/// Typed view over the known server event catalog.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedEvent {
    /// A log line emitted by a managed instance.
    InstanceLog {
        /// Log payload.
        data: Value,
        /// Server timestamp.
        time: Option<i64>,
    },

    /// Server-defined event outside the known catalog.
    Unknown {
        /// Event name.
        name: String,
        /// Event data.
        data: Value,
    },
}

// ============================================================================
// CloseEvent
// ============================================================================

/// Details of a transport close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    /// Whether a reconnect attempt will follow.
    pub reconnect: bool,
    /// WebSocket close code.
    pub code: u16,
    /// WebSocket close reason.
    pub reason: String,
    /// Whether the close handshake completed.
    pub was_clean: bool,
}

impl CloseEvent {
    /// Returns `true` if this close was a deliberate local shutdown.
    #[inline]
    #[must_use]
    pub fn is_deliberate(&self) -> bool {
        self.reason == DELIBERATE_CLOSE_REASON
    }

    /// Returns `true` if the keepalive monitor forced this close.
    #[inline]
    #[must_use]
    pub fn is_ping_timeout(&self) -> bool {
        self.code == CLOSE_CODE_PING_TIMEOUT && self.reason == PING_TIMEOUT_REASON
    }
}

// ============================================================================
// Diagnostic
// ============================================================================

/// Problems that do not belong to any single caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// An inbound frame was discarded.
    MalformedMessage {
        /// Raw frame text (binary frames are summarized).
        raw: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A response arrived for an id that is not outstanding.
    UnmatchedResponse {
        /// The id as sent by the server.
        id: String,
    },

    /// An automatic reconnect attempt failed.
    ReconnectFailed {
        /// Error description.
        error: String,
    },
}

// ============================================================================
// ClientEvent
// ============================================================================

/// Everything a subscriber can observe.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The transport opened.
    Open,
    /// The transport closed.
    Close(CloseEvent),
    /// A server descriptor was fetched during the handshake.
    Info(ServerDescriptor),
    /// A server-pushed event.
    Server(ServerEvent),
    /// A discarded frame or background failure.
    Diagnostic(Diagnostic),
}

impl ClientEvent {
    /// Returns the event name used for string-keyed subscriptions.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Open => "open",
            Self::Close(_) => "close",
            Self::Info(_) => "info",
            Self::Server(event) => &event.name,
            Self::Diagnostic(_) => "diagnostic",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
