//! WebSocket transport layer.
//!
//! This module owns the realtime channel between the client and the
//! server, and the machinery layered on top of it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐                    ┌──────────────────┐
//! │  Client                      │                    │  MFP server      │
//! │                              │     WebSocket      │                  │
//! │  Connection ── Correlator    │◄──────────────────►│  /api/v{N}       │
//! │      │     └── Dispatcher    │   ?token=...       │                  │
//! │      └── KeepaliveHandle     │                    │                  │
//! └──────────────────────────────┘                    └──────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `dial` - Open the WebSocket (bounded by the connect timeout)
//! 2. `Connection::spawn` - Start the event loop
//! 3. `KeepaliveHandle::start` - Begin periodic pings
//! 4. `Connection::execute` - Correlated actions; events flow to the dispatcher
//! 5. `Connection::close` / `force_close` - Local close; the loop reports `TransportClosed`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | WebSocket connection and event loop |
//! | `correlator` | Pending action table |
//! | `dispatcher` | Event subscriptions |
//! | `keepalive` | Ping monitor |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and event loop.
pub mod connection;

/// Pending action table.
pub mod correlator;

/// Event subscriptions and delivery.
pub mod dispatcher;

/// Ping-based liveness monitor.
pub mod keepalive;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, TransportClosed, WsStream, dial};
pub use correlator::Correlator;
pub use dispatcher::{EventDispatcher, EventFilter, EventHandler};
pub use keepalive::{KeepaliveConfig, KeepaliveHandle};
