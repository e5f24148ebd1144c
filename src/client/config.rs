//! Client configuration and builder.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use mfp_client::{ClientConfig, ReconnectPolicy};
//!
//! # fn example() -> mfp_client::Result<()> {
//! let config = ClientConfig::builder()
//!     .host("panel.example.net")
//!     .port(8443)
//!     .secure(true)
//!     .login("admin", "hunter2")
//!     .reconnect_policy(ReconnectPolicy::Delayed(Duration::from_secs(5)))
//!     .build()?;
//!
//! assert_eq!(config.endpoint(), "admin@panel.example.net:8443");
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::protocol::CorrelationField;
use crate::transport::KeepaliveConfig;

// ============================================================================
// Constants
// ============================================================================

/// Default bound on opening the realtime channel.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on each handshake HTTP request.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default realtime API version.
pub const DEFAULT_API_VERSION: u32 = 1;

// ============================================================================
// Credentials
// ============================================================================

/// Credential material presented during the handshake.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Exchanged for a session token via `POST /login`.
    Login {
        /// Account name.
        username: String,
        /// Account password.
        password: String,
    },
    /// Pre-issued token, validated against `GET /info`.
    Token(String),
}

impl Credentials {
    /// Creates login credentials.
    #[inline]
    #[must_use]
    pub fn login(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Login {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Creates token credentials.
    #[inline]
    #[must_use]
    pub fn token(token: impl Into<String>) -> Self {
        Self::Token(token.into())
    }

    /// Correlation field the matching server generation expects.
    #[inline]
    #[must_use]
    pub const fn default_correlation_field(&self) -> CorrelationField {
        match self {
            Self::Login { .. } => CorrelationField::Echo,
            Self::Token(_) => CorrelationField::Id,
        }
    }

    /// Account name, if any.
    #[inline]
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Login { username, .. } => Some(username),
            Self::Token(_) => None,
        }
    }
}

// Secrets stay out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login { username, .. } => f
                .debug_struct("Login")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Token(_) => f.debug_tuple("Token").field(&"<redacted>").finish(),
        }
    }
}

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// When to reconnect after an unexpected close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectPolicy {
    /// Reconnect as soon as the close is observed.
    #[default]
    Immediate,
    /// Wait a fixed delay first.
    Delayed(Duration),
}

impl ReconnectPolicy {
    /// Delay before the reconnect attempt.
    #[inline]
    #[must_use]
    pub const fn delay(&self) -> Duration {
        match self {
            Self::Immediate => Duration::ZERO,
            Self::Delayed(delay) => *delay,
        }
    }
}

// ============================================================================
// ClientConfig
// ============================================================================

/// Validated client configuration.
///
/// Use [`ClientConfig::builder()`] to create one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Use `https`/`wss` instead of `http`/`ws`.
    pub secure: bool,
    /// Handshake credentials.
    pub credentials: Credentials,
    /// Realtime API version (`/api/v{N}`).
    pub api_version: u32,
    /// Reconnect after unexpected closes.
    pub reconnect: bool,
    /// Reconnect timing.
    pub reconnect_policy: ReconnectPolicy,
    /// Correlation id key on the wire.
    pub correlation_field: CorrelationField,
    /// Whether `correlation_field` was chosen explicitly rather than derived
    /// from the credentials.
    pub(crate) correlation_field_pinned: bool,
    /// Keepalive timing.
    pub keepalive: KeepaliveConfig,
    /// Bound on opening the realtime channel.
    pub connect_timeout: Duration,
    /// Bound on each handshake HTTP request.
    pub http_timeout: Duration,
}

impl ClientConfig {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Returns `user@host:port`, or `host:port` for token credentials.
    #[must_use]
    pub fn endpoint(&self) -> String {
        match self.credentials.username() {
            Some(username) => format!("{username}@{}:{}", self.host, self.port),
            None => format!("{}:{}", self.host, self.port),
        }
    }

    /// Replaces the credentials.
    ///
    /// Unless the correlation field was set explicitly, it follows the new
    /// credential kind.
    pub fn set_credentials(&mut self, credentials: Credentials) {
        if !self.correlation_field_pinned {
            self.correlation_field = credentials.default_correlation_field();
        }
        self.credentials = credentials;
    }

    /// Builds a handshake URL for `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if host and path do not form a valid URL.
    pub fn http_url(&self, path: &str) -> Result<Url> {
        let scheme = if self.secure { "https" } else { "http" };
        let base = Url::parse(&format!("{scheme}://{}:{}/", self.host, self.port))?;
        Ok(base.join(path)?)
    }

    /// Builds the realtime channel URL carrying `token`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if the host does not form a valid URL.
    pub fn ws_url(&self, token: &str) -> Result<Url> {
        let scheme = if self.secure { "wss" } else { "ws" };
        let mut url = Url::parse(&format!(
            "{scheme}://{}:{}/api/v{}",
            self.host, self.port, self.api_version
        ))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }
}

// ============================================================================
// ClientConfigBuilder
// ============================================================================

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    host: Option<String>,
    port: Option<u16>,
    secure: bool,
    credentials: Option<Credentials>,
    api_version: u32,
    reconnect: bool,
    reconnect_policy: ReconnectPolicy,
    correlation_field: Option<CorrelationField>,
    keepalive: KeepaliveConfig,
    connect_timeout: Duration,
    http_timeout: Duration,
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            secure: false,
            credentials: None,
            api_version: DEFAULT_API_VERSION,
            reconnect: true,
            reconnect_policy: ReconnectPolicy::default(),
            correlation_field: None,
            keepalive: KeepaliveConfig::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl ClientConfigBuilder {
    /// Creates a builder with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server host.
    #[inline]
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the server port.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Enables `https`/`wss`.
    #[inline]
    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Uses username/password credentials.
    #[inline]
    #[must_use]
    pub fn login(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::login(username, password));
        self
    }

    /// Uses a pre-issued token.
    #[inline]
    #[must_use]
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::token(token));
        self
    }

    /// Sets credentials directly.
    #[inline]
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the realtime API version.
    #[inline]
    #[must_use]
    pub fn api_version(mut self, version: u32) -> Self {
        self.api_version = version;
        self
    }

    /// Enables or disables automatic reconnect.
    #[inline]
    #[must_use]
    pub fn reconnect(mut self, enabled: bool) -> Self {
        self.reconnect = enabled;
        self
    }

    /// Sets reconnect timing.
    #[inline]
    #[must_use]
    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect_policy = policy;
        self
    }

    /// Overrides the correlation field convention.
    #[inline]
    #[must_use]
    pub fn correlation_field(mut self, field: CorrelationField) -> Self {
        self.correlation_field = Some(field);
        self
    }

    /// Sets the time between keepalive pings.
    #[inline]
    #[must_use]
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive.interval = interval;
        self
    }

    /// Sets the bound on each keepalive ping.
    #[inline]
    #[must_use]
    pub fn keepalive_timeout(mut self, timeout: Duration) -> Self {
        self.keepalive.timeout = timeout;
        self
    }

    /// Sets the bound on opening the realtime channel.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the bound on each handshake HTTP request.
    #[inline]
    #[must_use]
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Builds the configuration with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if host, port or credentials are missing
    /// - [`Error::Config`] if any duration is zero
    pub fn build(self) -> Result<ClientConfig> {
        let host = self.validate_host()?;
        let port = self.validate_port()?;
        let credentials = self.credentials.clone().ok_or_else(|| {
            Error::config(
                "Credentials are required. Use .login() or .token() to set them.\n\
                 Example: ClientConfig::builder().login(\"admin\", \"secret\")",
            )
        })?;
        self.validate_durations()?;

        Ok(ClientConfig {
            host,
            port,
            secure: self.secure,
            correlation_field: self
                .correlation_field
                .unwrap_or_else(|| credentials.default_correlation_field()),
            correlation_field_pinned: self.correlation_field.is_some(),
            credentials,
            api_version: self.api_version,
            reconnect: self.reconnect,
            reconnect_policy: self.reconnect_policy,
            keepalive: self.keepalive,
            connect_timeout: self.connect_timeout,
            http_timeout: self.http_timeout,
        })
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientConfigBuilder {
    fn validate_host(&self) -> Result<String> {
        let host = self.host.clone().unwrap_or_default();
        if host.trim().is_empty() {
            return Err(Error::config(
                "Server host is required. Use .host() to set it.\n\
                 Example: ClientConfig::builder().host(\"127.0.0.1\")",
            ));
        }
        Ok(host)
    }

    fn validate_port(&self) -> Result<u16> {
        match self.port {
            Some(0) => Err(Error::config("Server port must be non-zero")),
            Some(port) => Ok(port),
            None => Err(Error::config(
                "Server port is required. Use .port() to set it.",
            )),
        }
    }

    fn validate_durations(&self) -> Result<()> {
        let durations = [
            ("keepalive interval", self.keepalive.interval),
            ("keepalive timeout", self.keepalive.timeout),
            ("connect timeout", self.connect_timeout),
            ("HTTP timeout", self.http_timeout),
        ];

        match durations.iter().find(|(_, d)| d.is_zero()) {
            Some((name, _)) => Err(Error::config(format!("The {name} must be non-zero"))),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
