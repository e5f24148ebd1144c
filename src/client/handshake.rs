//! Pre-connection handshake.
//!
//! Before the realtime channel opens, the client trades its credentials for
//! a session token over plain HTTP. Two server generations exist:
//!
//! | Strategy | Credentials | Request |
//! |----------|-------------|---------|
//! | [`FormLogin`] | username/password | `POST /login` (form `usr`, `pwd`), body is the token |
//! | [`TokenInfo`] | pre-issued token | `GET /info?token=...`, JSON [`ServerDescriptor`] |
//!
//! [`CredentialHandshake`] picks the strategy from the configured credentials
//! and is what [`Client::new`](crate::Client::new) uses.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::ServerDescriptor;

use super::config::{ClientConfig, Credentials};

// ============================================================================
// Types
// ============================================================================

/// Inputs available to a handshake attempt.
#[derive(Debug, Clone, Copy)]
pub struct HandshakeContext<'a> {
    /// Shared HTTP client, already bounded by the configured HTTP timeout.
    pub http: &'a reqwest::Client,
    /// Current configuration, including credentials.
    pub config: &'a ClientConfig,
    /// Descriptor cached from an earlier handshake in this session.
    pub cached: Option<&'a ServerDescriptor>,
}

/// Result of a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeOutcome {
    /// Session token for the realtime channel URL.
    pub token: String,
    /// Freshly fetched descriptor, or `None` if nothing new was fetched.
    pub descriptor: Option<ServerDescriptor>,
}

impl HandshakeOutcome {
    /// Outcome carrying only a token.
    #[inline]
    #[must_use]
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            descriptor: None,
        }
    }
}

// ============================================================================
// Handshake Trait
// ============================================================================

/// Strategy that produces a session token before connecting.
///
/// Every failure must be reported as [`Error::Handshake`]; the client opens
/// no socket when the handshake fails.
#[async_trait]
pub trait Handshake: Send + Sync {
    /// Performs the handshake.
    async fn perform(&self, ctx: HandshakeContext<'_>) -> Result<HandshakeOutcome>;
}

// ============================================================================
// CredentialHandshake
// ============================================================================

/// Chooses [`FormLogin`] or [`TokenInfo`] from the configured credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialHandshake;

#[async_trait]
impl Handshake for CredentialHandshake {
    async fn perform(&self, ctx: HandshakeContext<'_>) -> Result<HandshakeOutcome> {
        match ctx.config.credentials {
            Credentials::Login { .. } => FormLogin.perform(ctx).await,
            Credentials::Token(_) => TokenInfo.perform(ctx).await,
        }
    }
}

// ============================================================================
// FormLogin
// ============================================================================

/// `POST /login` with form fields `usr` and `pwd`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormLogin;

#[async_trait]
impl Handshake for FormLogin {
    async fn perform(&self, ctx: HandshakeContext<'_>) -> Result<HandshakeOutcome> {
        let Credentials::Login { username, password } = &ctx.config.credentials else {
            return Err(Error::handshake(
                "Form login requires username/password credentials",
            ));
        };

        let url = ctx.config.http_url("/login")?;
        debug!(url = %url, username = %username, "Logging in");

        let response = ctx
            .http
            .post(url)
            .form(&[("usr", username.as_str()), ("pwd", password.as_str())])
            .send()
            .await
            .map_err(|e| Error::handshake(format!("Login request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::handshake(format!("Login rejected: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::handshake(format!("Failed to read login response: {e}")))?;

        let token = body.trim();
        if token.is_empty() {
            return Err(Error::handshake("Login returned an empty token"));
        }

        Ok(HandshakeOutcome::token(token))
    }
}

// ============================================================================
// TokenInfo
// ============================================================================

/// `GET /info` with a pre-issued token.
///
/// Skipped when a descriptor is already cached for the session.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenInfo;

#[async_trait]
impl Handshake for TokenInfo {
    async fn perform(&self, ctx: HandshakeContext<'_>) -> Result<HandshakeOutcome> {
        let Credentials::Token(token) = &ctx.config.credentials else {
            return Err(Error::handshake("Token handshake requires token credentials"));
        };

        if ctx.cached.is_some() {
            debug!("Server info cached, skipping fetch");
            return Ok(HandshakeOutcome::token(token.as_str()));
        }

        let mut url = ctx.config.http_url("/info")?;
        url.query_pairs_mut().append_pair("token", token);
        debug!(host = %ctx.config.host, port = ctx.config.port, "Fetching server info");

        let response = ctx
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::handshake(format!("Info request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::handshake(format!("Info rejected: HTTP {status}")));
        }

        let descriptor: ServerDescriptor = response
            .json()
            .await
            .map_err(|e| Error::handshake(format!("Invalid server info: {e}")))?;

        let expected = ctx.config.api_version;
        if !descriptor.supports(expected) {
            return Err(Error::handshake(format!(
                "Server {} speaks api_version {}, client requires {expected}",
                descriptor.name, descriptor.api_version
            )));
        }

        Ok(HandshakeOutcome {
            token: token.clone(),
            descriptor: Some(descriptor),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn login_config(server: &MockServer) -> ClientConfig {
        ClientConfig::builder()
            .host("127.0.0.1")
            .port(server.address().port())
            .login("admin", "pw")
            .build()
            .expect("valid config")
    }

    fn token_config(server: &MockServer, api_version: u32) -> ClientConfig {
        ClientConfig::builder()
            .host("127.0.0.1")
            .port(server.address().port())
            .token("tok-1")
            .api_version(api_version)
            .build()
            .expect("valid config")
    }

    fn descriptor(api_version: u32) -> ServerDescriptor {
        ServerDescriptor {
            name: "mfp".into(),
            version: "2.3.1".into(),
            api_version,
        }
    }

    async fn run(
        strategy: &dyn Handshake,
        config: &ClientConfig,
        cached: Option<&ServerDescriptor>,
    ) -> Result<HandshakeOutcome> {
        let http = reqwest::Client::new();
        strategy
            .perform(HandshakeContext {
                http: &http,
                config,
                cached,
            })
            .await
    }

    #[tokio::test]
    async fn test_form_login_returns_trimmed_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .and(body_string_contains("usr=admin"))
            .and(body_string_contains("pwd=pw"))
            .respond_with(ResponseTemplate::new(200).set_body_string("session-42\n"))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = run(&FormLogin, &login_config(&server), None)
            .await
            .expect("login");
        assert_eq!(outcome.token, "session-42");
        assert!(outcome.descriptor.is_none());
    }

    #[tokio::test]
    async fn test_form_login_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let err = run(&FormLogin, &login_config(&server), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Handshake { .. }));
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_form_login_empty_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_string("  "))
            .mount(&server)
            .await;

        let err = run(&FormLogin, &login_config(&server), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty token"));
    }

    #[tokio::test]
    async fn test_token_info_fetches_descriptor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/info"))
            .and(query_param("token", "tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "mfp",
                "version": "2.3.1",
                "api_version": 1
            })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = run(&TokenInfo, &token_config(&server, 1), None)
            .await
            .expect("info");
        assert_eq!(outcome.token, "tok-1");
        assert_eq!(outcome.descriptor, Some(descriptor(1)));
    }

    #[tokio::test]
    async fn test_token_info_api_version_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "mfp",
                "version": "3.0.0",
                "api_version": 2
            })))
            .mount(&server)
            .await;

        let err = run(&TokenInfo, &token_config(&server, 1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Handshake { .. }));
        assert!(err.to_string().contains("api_version 2"));
    }

    #[tokio::test]
    async fn test_token_info_invalid_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/info"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = run(&TokenInfo, &token_config(&server, 1), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid server info"));
    }

    #[tokio::test]
    async fn test_token_info_skips_fetch_when_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/info"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let cached = descriptor(1);
        let outcome = run(&TokenInfo, &token_config(&server, 1), Some(&cached))
            .await
            .expect("cached");
        assert_eq!(outcome, HandshakeOutcome::token("tok-1"));
    }

    #[tokio::test]
    async fn test_network_failure_is_handshake_error() {
        let config = ClientConfig::builder()
            .host("127.0.0.1")
            .port(1)
            .login("admin", "pw")
            .build()
            .expect("valid config");

        let err = run(&FormLogin, &config, None).await.unwrap_err();
        assert!(matches!(err, Error::Handshake { .. }));
    }

    #[tokio::test]
    async fn test_credential_handshake_dispatches_by_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_string("from-login"))
            .mount(&server)
            .await;

        let outcome = run(&CredentialHandshake, &login_config(&server), None)
            .await
            .expect("login");
        assert_eq!(outcome.token, "from-login");
    }

    #[tokio::test]
    async fn test_strategy_rejects_wrong_credentials() {
        let server = MockServer::start().await;
        let err = run(&TokenInfo, &login_config(&server), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Handshake { .. }));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }
}
