//! WebSocket protocol message types.
//!
//! This module defines the frame format exchanged with the server over the
//! realtime channel, plus the handshake payloads.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `ActionRequest` | Client → Server | Run an action |
//! | `ActionResponse` | Server → Client | Correlated result |
//! | `ServerEvent` | Server → Client | Unsolicited notification |
//! | `ServerDescriptor` | Server → Client (HTTP) | Identity from `GET /info` |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `action` | Action name catalog |
//! | `descriptor` | Server descriptor |
//! | `event` | Server and lifecycle events, close codes |
//! | `frame` | Inbound frame classification |
//! | `request` | Request and response types |
//! | `retcode` | Return code classification |

// ============================================================================
// Submodules
// ============================================================================

/// Action name catalog.
pub mod action;

/// Server descriptor returned by the info endpoint.
pub mod descriptor;

/// Event message types.
pub mod event;

/// Inbound frame classification.
pub mod frame;

/// Request and Response message types.
pub mod request;

/// Return codes.
pub mod retcode;

// ============================================================================
// Re-exports
// ============================================================================

pub use action::Action;
pub use descriptor::ServerDescriptor;
pub use event::{
    CLOSE_CODE_ABNORMAL, CLOSE_CODE_NORMAL, CLOSE_CODE_PING_TIMEOUT, ClientEvent, CloseEvent,
    DELIBERATE_CLOSE_REASON, Diagnostic, PING_TIMEOUT_REASON, ParsedEvent, ServerEvent,
};
pub use frame::InboundMessage;
pub use request::{ActionRequest, ActionResponse, CorrelationField, ResponseStatus};
pub use retcode::Retcode;
