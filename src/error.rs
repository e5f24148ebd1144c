//! Error types for the MFP client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use mfp_client::{Action, Client, Result};
//!
//! async fn example(client: &Client) -> Result<()> {
//!     let response = client.execute_action(Action::Ping, None).await?;
//!     response.into_result()?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Handshake | [`Error::Handshake`] |
//! | Connection | [`Error::ConnectTimeout`], [`Error::Transport`], [`Error::NotConnected`], [`Error::ConnectionLost`] |
//! | Actions | [`Error::ActionTimeout`], [`Error::ActionFailed`] |
//! | Protocol | [`Error::MalformedMessage`] |
//! | External | [`Error::Url`], [`Error::Json`], [`Error::WebSocket`], [`Error::Http`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::ActionId;
use crate::protocol::Retcode;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Handshake and action errors belong to the caller that triggered them.
/// Transport and malformed-message errors are absorbed by the connection and
/// only surface through `close` and diagnostic events.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Handshake Errors
    // ========================================================================
    /// Handshake failed.
    ///
    /// Returned when credentials are rejected, the server reports an
    /// incompatible API version, or the handshake request itself fails.
    /// Fatal to that connect attempt only.
    #[error("Handshake failed: {message}")]
    Handshake {
        /// Description of the handshake failure.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport did not open in time.
    #[error("Connect timeout after {timeout_ms}ms")]
    ConnectTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Socket-level failure, before or after open.
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    /// An action-requiring operation was invoked while not connected.
    #[error("Client not connected")]
    NotConnected,

    /// Outstanding request invalidated by a connection close.
    #[error("Connection lost")]
    ConnectionLost,

    // ========================================================================
    // Action Errors
    // ========================================================================
    /// No matching response arrived in time.
    #[error("Action {action_id} timed out after {timeout_ms}ms")]
    ActionTimeout {
        /// Correlation id of the timed-out action.
        action_id: ActionId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The server answered with an `error` status.
    ///
    /// Only produced by [`ActionResponse::into_result`](crate::ActionResponse::into_result).
    #[error("Action failed ({retcode}): {message}")]
    ActionFailed {
        /// Classified return code.
        retcode: Retcode,
        /// Message from the server.
        message: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Unparseable or unrecognized inbound frame.
    ///
    /// Never fatal; reported on the diagnostics channel and discarded.
    #[error("Malformed message: {message}")]
    MalformedMessage {
        /// Why the frame was rejected.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// URL construction error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a handshake error.
    #[inline]
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake {
            message: message.into(),
        }
    }

    /// Creates a connect timeout error.
    #[inline]
    pub fn connect_timeout(timeout_ms: u64) -> Self {
        Self::ConnectTimeout { timeout_ms }
    }

    /// Creates a transport error.
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates an action timeout error.
    #[inline]
    pub fn action_timeout(action_id: ActionId, timeout_ms: u64) -> Self {
        Self::ActionTimeout {
            action_id,
            timeout_ms,
        }
    }

    /// Creates an action failed error.
    #[inline]
    pub fn action_failed(retcode: Retcode, message: impl Into<String>) -> Self {
        Self::ActionFailed {
            retcode,
            message: message.into(),
        }
    }

    /// Creates a malformed message error.
    #[inline]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedMessage {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout { .. } | Self::ActionTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout { .. }
                | Self::Transport { .. }
                | Self::NotConnected
                | Self::ConnectionLost
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry, possibly after reconnecting.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout { .. }
                | Self::ActionTimeout { .. }
                | Self::ConnectionLost
                | Self::NotConnected
                | Self::Transport { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
