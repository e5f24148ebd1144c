//! Client module.
//!
//! This module provides the main entry point: a persistent, self-healing
//! connection to an MFP server.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Client`] | Connection manager and action API |
//! | [`ClientConfig`] | Validated configuration |
//! | [`ClientConfigBuilder`] | Fluent configuration builder |
//! | [`Credentials`] | Login or token credentials |
//! | [`Handshake`] | Pre-connection token exchange |
//!
//! # Example
//!
//! ```no_run
//! use mfp_client::{Action, Client, ClientConfig, Result};
//!
//! # async fn example() -> Result<()> {
//! let config = ClientConfig::builder()
//!     .host("127.0.0.1")
//!     .port(23333)
//!     .login("admin", "secret")
//!     .build()?;
//!
//! let client = Client::new(config)?;
//! client.connect().await?;
//!
//! let info = client
//!     .execute_action(Action::GetFileInfo, Some(serde_json::json!({ "path": "/" })))
//!     .await?;
//! println!("{:?}", info.data);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Client configuration and builder.
pub mod config;

/// Connection manager.
pub mod core;

/// Handshake strategies.
pub mod handshake;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{ClientConfig, ClientConfigBuilder, Credentials, ReconnectPolicy};
pub use core::{Client, ConnectionState};
pub use handshake::{
    CredentialHandshake, FormLogin, Handshake, HandshakeContext, HandshakeOutcome, TokenInfo,
};
