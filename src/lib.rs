//! MFP client - persistent WebSocket client for MFP servers.
//!
//! This library keeps one authenticated realtime connection to an MFP server
//! open and turns it into a request/response API plus an event stream.
//!
//! # Architecture
//!
//! The client follows a handshake-then-channel model:
//!
//! - **Handshake (HTTP)**: Trades credentials for a session token
//! - **Realtime channel (WebSocket)**: Carries correlated actions and
//!   server-pushed events
//!
//! Key design principles:
//!
//! - Each [`Client`] owns at most one live connection, its event loop and its
//!   keepalive monitor
//! - Actions carry a fresh UUID correlation id and resolve exactly once
//! - Unexpected closes reconnect automatically; deliberate closes do not
//! - Event-driven delivery (no polling)
//!
//! # Quick Start
//!
//! ```no_run
//! use mfp_client::{Action, Client, ClientConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ClientConfig::builder()
//!         .host("127.0.0.1")
//!         .port(23333)
//!         .login("admin", "secret")
//!         .build()?;
//!
//!     let client = Client::new(config)?;
//!     client.on("instance_log", |event| println!("{event:?}"));
//!     client.connect().await?;
//!
//!     let pong = client.execute_action(Action::Ping, None).await?;
//!     println!("ping: {}", pong.retcode);
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Connection manager, configuration, handshake |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire message types |
//! | [`transport`] | WebSocket transport layer |

// ============================================================================
// Modules
// ============================================================================

/// Connection manager and configuration.
///
/// Use [`ClientConfig::builder()`] to configure a [`Client`].
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Wire message types.
///
/// Action requests, responses, server events and close conventions.
pub mod protocol;

/// WebSocket transport layer.
///
/// Connection event loop, correlation table, dispatcher and keepalive.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{
    Client, ClientConfig, ClientConfigBuilder, ConnectionState, Credentials, Handshake,
    HandshakeContext, HandshakeOutcome, ReconnectPolicy,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ActionId, SubscriptionId};

// Protocol types
pub use protocol::{
    Action, ActionResponse, ClientEvent, CloseEvent, CorrelationField, Diagnostic, ParsedEvent,
    ResponseStatus, Retcode, ServerDescriptor, ServerEvent,
};

// Transport types
pub use transport::{EventFilter, KeepaliveConfig};
