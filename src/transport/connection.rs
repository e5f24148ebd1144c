//! WebSocket connection and event loop.
//!
//! This module owns the realtime channel to the server, including
//! request/response correlation and event routing.
//!
//! # Event Loop
//!
//! The connection spawns a tokio task that handles:
//!
//! - Incoming frames from the server (responses, events)
//! - Outgoing action frames from the Rust API
//! - Request/response correlation by [`ActionId`]
//! - Local close initiation and the close handshake
//!
//! When the loop ends, every outstanding action is failed with
//! [`Error::ConnectionLost`] and a [`TransportClosed`] report is sent to the
//! owner.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::ActionId;
use crate::protocol::{
    Action, ActionRequest, ActionResponse, CLOSE_CODE_ABNORMAL, CLOSE_CODE_NORMAL, ClientEvent,
    CorrelationField, DELIBERATE_CLOSE_REASON, Diagnostic, InboundMessage,
};

use super::correlator::{Correlator, PendingGuard};
use super::dispatcher::EventDispatcher;

// ============================================================================
// Constants
// ============================================================================

/// How long a deliberate close waits for the server's close frame.
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound for flushing the final close frame.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_millis(500);

/// Close code reported when a close frame carried no status.
const CLOSE_CODE_NO_STATUS: u16 = 1005;

// ============================================================================
// Types
// ============================================================================

/// Client-side WebSocket stream, plain or TLS.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

// ============================================================================
// TransportClosed
// ============================================================================

/// How the transport ended.
///
/// For locally initiated closes, `code` and `reason` are the values this side
/// sent, so the owner can recognize its own sentinels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportClosed {
    /// Close code.
    pub code: u16,
    /// Close reason.
    pub reason: String,
    /// Whether the close handshake completed.
    pub was_clean: bool,
}

impl TransportClosed {
    pub(crate) fn abnormal() -> Self {
        Self {
            code: CLOSE_CODE_ABNORMAL,
            reason: String::new(),
            was_clean: false,
        }
    }
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Write an already-registered action frame.
    Send { id: ActionId, frame: String },
    /// Start a local close.
    ///
    /// A zero `grace` tears the socket down without waiting for the echo.
    Close {
        code: u16,
        reason: String,
        grace: Duration,
    },
}

// ============================================================================
// Dial
// ============================================================================

/// Opens the realtime channel.
///
/// # Errors
///
/// - [`Error::ConnectTimeout`] if the socket is not open within `connect_timeout`
/// - [`Error::Transport`] if the TCP connect or WebSocket upgrade fails
pub async fn dial(url: &Url, connect_timeout: Duration) -> Result<WsStream> {
    let (ws_stream, response) = timeout(connect_timeout, connect_async(url.as_str()))
        .await
        .map_err(|_| Error::connect_timeout(connect_timeout.as_millis() as u64))?
        .map_err(|e| Error::transport(format!("WebSocket connect failed: {e}")))?;

    debug!(status = %response.status(), "WebSocket upgrade completed");
    Ok(ws_stream)
}

// ============================================================================
// Connection
// ============================================================================

/// Live realtime channel.
///
/// Cheap to clone; all clones drive the same event loop. When the last
/// clone is dropped the loop closes the socket.
#[derive(Clone)]
pub struct Connection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Outstanding actions (shared with event loop).
    correlator: Arc<Correlator>,
    /// Cleared as soon as a close starts or the socket ends.
    open: Arc<AtomicBool>,
    /// Correlation id key for outgoing frames.
    field: CorrelationField,
}

impl Connection {
    /// Wraps an open WebSocket stream and spawns its event loop.
    ///
    /// Returns the connection and a receiver that fires once when the
    /// transport has closed and all pending actions have been failed.
    pub fn spawn(
        ws_stream: WsStream,
        field: CorrelationField,
        dispatcher: Arc<EventDispatcher>,
    ) -> (Self, oneshot::Receiver<TransportClosed>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = oneshot::channel();
        let correlator = Arc::new(Correlator::new());
        let open = Arc::new(AtomicBool::new(true));

        let event_loop = EventLoop {
            command_rx,
            correlator: Arc::clone(&correlator),
            dispatcher,
            open: Arc::clone(&open),
            field,
        };
        tokio::spawn(event_loop.run(ws_stream, closed_tx));

        let connection = Self {
            command_tx,
            correlator,
            open,
            field,
        };
        (connection, closed_rx)
    }

    /// Sends an action and waits for its response.
    ///
    /// With `action_timeout` set, the wait is bounded and the pending entry is
    /// removed before [`Error::ActionTimeout`] is returned.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the connection is not open
    /// - [`Error::ActionTimeout`] if the response does not arrive in time
    /// - [`Error::ConnectionLost`] if the connection closes first
    /// - [`Error::Transport`] if the frame could not be written
    pub async fn execute(
        &self,
        action: Action,
        params: Option<Value>,
        action_timeout: Option<Duration>,
    ) -> Result<ActionResponse> {
        if !self.is_open() {
            return Err(Error::NotConnected);
        }

        let (id, slot) = self.correlator.register()?;
        let _guard = PendingGuard::new(&self.correlator, id);

        let request = ActionRequest::new(id, action, params);
        let frame = request.to_frame(self.field)?;
        debug!(action_id = %id, action = %request.action, "Executing action");

        self.command_tx
            .send(ConnectionCommand::Send { id, frame })
            .map_err(|_| Error::ConnectionLost)?;

        let outcome = match action_timeout {
            Some(limit) => match timeout(limit, slot).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(action_id = %id, action = %request.action, timeout_ms = limit.as_millis() as u64, "Action timed out");
                    return Err(Error::action_timeout(id, limit.as_millis() as u64));
                }
            },
            None => slot.await,
        };

        outcome.map_err(|_| Error::ConnectionLost)?
    }

    /// Starts a graceful close, waiting briefly for the server's echo.
    pub fn close(&self, code: u16, reason: impl Into<String>) {
        self.send_close(code, reason.into(), CLOSE_HANDSHAKE_TIMEOUT);
    }

    /// Tears the socket down immediately after sending a close frame.
    ///
    /// Used when the peer is presumed dead.
    pub fn force_close(&self, code: u16, reason: impl Into<String>) {
        self.send_close(code, reason.into(), Duration::ZERO);
    }

    fn send_close(&self, code: u16, reason: String, grace: Duration) {
        self.open.store(false, Ordering::SeqCst);
        let _ = self
            .command_tx
            .send(ConnectionCommand::Close {
                code,
                reason,
                grace,
            });
    }

    /// Returns `true` while the socket is open and no close has started.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Returns the number of pending actions.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlator.len()
    }

    /// Returns `true` if `id` is still awaiting a response.
    #[inline]
    #[must_use]
    pub fn is_pending(&self, id: &ActionId) -> bool {
        self.correlator.contains(id)
    }
}

// ============================================================================
// EventLoop
// ============================================================================

/// State owned by the spawned event loop task.
struct EventLoop {
    command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
    correlator: Arc<Correlator>,
    dispatcher: Arc<EventDispatcher>,
    open: Arc<AtomicBool>,
    field: CorrelationField,
}

impl EventLoop {
    /// Event loop that handles WebSocket I/O.
    async fn run(mut self, ws_stream: WsStream, closed_tx: oneshot::Sender<TransportClosed>) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        let closed = self.pump(&mut ws_write, &mut ws_read).await;

        self.open.store(false, Ordering::SeqCst);
        let _ = timeout(CLOSE_FLUSH_TIMEOUT, ws_write.close()).await;

        // Fail all pending actions before anyone observes the close
        self.correlator.fail_all();

        debug!(code = closed.code, reason = %closed.reason, was_clean = closed.was_clean, "Event loop terminated");
        let _ = closed_tx.send(closed);
    }

    async fn pump(&mut self, ws_write: &mut WsWrite, ws_read: &mut WsRead) -> TransportClosed {
        // Local close in progress: (code, reason, deadline)
        let mut closing: Option<(u16, String, Instant)> = None;

        loop {
            let deadline = closing.as_ref().map(|(_, _, deadline)| *deadline);

            tokio::select! {
                // Incoming frames from server
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => self.handle_incoming_message(&text),

                        Some(Ok(Message::Binary(bytes))) => {
                            warn!(len = bytes.len(), "Discarding binary frame");
                            self.dispatcher.report(Diagnostic::MalformedMessage {
                                raw: format!("<{} binary bytes>", bytes.len()),
                                reason: "binary frames are not part of the protocol".into(),
                            });
                        }

                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "Close frame received");
                            return match closing.take() {
                                Some((code, reason, _)) => TransportClosed { code, reason, was_clean: true },
                                None => match frame {
                                    Some(frame) => TransportClosed {
                                        code: u16::from(frame.code),
                                        reason: frame.reason.as_str().to_string(),
                                        was_clean: true,
                                    },
                                    None => TransportClosed {
                                        code: CLOSE_CODE_NO_STATUS,
                                        reason: String::new(),
                                        was_clean: true,
                                    },
                                },
                            };
                        }

                        Some(Err(e)) => {
                            return match closing.take() {
                                Some((code, reason, _)) => {
                                    debug!(error = %e, "Socket ended during close handshake");
                                    TransportClosed { code, reason, was_clean: false }
                                }
                                None => {
                                    warn!(error = %e, "WebSocket error");
                                    TransportClosed::abnormal()
                                }
                            };
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            return match closing.take() {
                                Some((code, reason, _)) => TransportClosed { code, reason, was_clean: false },
                                None => TransportClosed::abnormal(),
                            };
                        }

                        // Ignore Ping, Pong, raw frames
                        Some(Ok(_)) => {}
                    }
                }

                // Commands from Rust API
                command = self.command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send { id, frame }) => {
                            if closing.is_some() {
                                self.correlator.fail(&id, Error::ConnectionLost);
                            } else if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                                self.correlator.fail(&id, Error::transport(e.to_string()));
                            } else {
                                trace!(action_id = %id, "Action frame sent");
                            }
                        }

                        Some(ConnectionCommand::Close { code, reason, grace }) => {
                            if closing.is_some() {
                                continue;
                            }
                            self.open.store(false, Ordering::SeqCst);

                            let frame = CloseFrame {
                                code: CloseCode::from(code),
                                reason: reason.clone().into(),
                            };
                            let sent = ws_write.send(Message::Close(Some(frame))).await;

                            if grace.is_zero() || sent.is_err() {
                                debug!(code, reason = %reason, "Transport torn down");
                                return TransportClosed { code, reason, was_clean: false };
                            }
                            debug!(code, reason = %reason, "Close handshake started");
                            closing = Some((code, reason, Instant::now() + grace));
                        }

                        None => {
                            debug!("Command channel closed");
                            let frame = CloseFrame {
                                code: CloseCode::from(CLOSE_CODE_NORMAL),
                                reason: DELIBERATE_CLOSE_REASON.into(),
                            };
                            let _ = ws_write.send(Message::Close(Some(frame))).await;
                            return TransportClosed {
                                code: CLOSE_CODE_NORMAL,
                                reason: DELIBERATE_CLOSE_REASON.into(),
                                was_clean: false,
                            };
                        }
                    }
                }

                // Server never echoed our close frame
                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some((code, reason, _)) = closing.take() {
                        warn!(code, reason = %reason, "Close handshake timed out");
                        return TransportClosed { code, reason, was_clean: false };
                    }
                }
            }
        }
    }

    /// Handles an incoming text frame from the server.
    fn handle_incoming_message(&self, text: &str) {
        match InboundMessage::parse(text, self.field) {
            Ok(InboundMessage::Event(event)) => {
                debug!(event = %event.name, "Event received");
                self.dispatcher.dispatch(&ClientEvent::Server(event));
            }

            Ok(InboundMessage::Response {
                id,
                raw_id,
                response,
            }) => {
                let matched = id.is_some_and(|id| self.correlator.resolve(&id, response));
                if !matched {
                    warn!(id = %raw_id, "Response for unknown request");
                    self.dispatcher
                        .report(Diagnostic::UnmatchedResponse { id: raw_id });
                }
            }

            Err(e) => {
                warn!(error = %e, text = %text, "Discarding inbound frame");
                self.dispatcher.report(Diagnostic::MalformedMessage {
                    raw: text.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use crate::protocol::{CLOSE_CODE_PING_TIMEOUT, PING_TIMEOUT_REASON};
    use crate::transport::dispatcher::EventFilter;
    use crate::transport::testing::{MockServer, Responder};

    async fn connect_to(
        server: &MockServer,
        field: CorrelationField,
    ) -> (
        Connection,
        oneshot::Receiver<TransportClosed>,
        Arc<EventDispatcher>,
    ) {
        let dispatcher = Arc::new(EventDispatcher::new());
        let ws = dial(&server.ws_url("tok"), Duration::from_secs(5))
            .await
            .expect("dial");
        let (connection, closed) = Connection::spawn(ws, field, Arc::clone(&dispatcher));
        (connection, closed, dispatcher)
    }

    #[tokio::test]
    async fn test_execute_matches_response() {
        let server = MockServer::start(Responder::ok()).await;
        let (connection, _closed, _) = connect_to(&server, CorrelationField::Id).await;

        let response = connection
            .execute(Action::GetFileInfo, Some(json!({"path": "/x"})), None)
            .await
            .expect("response");

        assert!(response.is_ok());
        assert_eq!(response.data["action"], "get_file_info");
        assert_eq!(connection.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_echo_field_convention() {
        let server = MockServer::start(Responder::ok()).await;
        let (connection, _closed, _) = connect_to(&server, CorrelationField::Echo).await;

        assert_ok!(connection.execute(Action::Ping, None, None).await);

        let received = server.received();
        assert_eq!(received.len(), 1);
        assert!(received[0].get("echo").is_some());
        assert!(received[0].get("id").is_none());
    }

    #[tokio::test]
    async fn test_concurrent_actions_resolve_out_of_order() {
        let server = MockServer::start(Responder::ok_reversed(4)).await;
        let (connection, _closed, _) = connect_to(&server, CorrelationField::Id).await;

        let calls = (0..4).map(|n| {
            let connection = connection.clone();
            async move {
                connection
                    .execute(Action::Custom(format!("job_{n}")), None, None)
                    .await
            }
        });
        let results = futures_util::future::join_all(calls).await;

        for (n, result) in results.into_iter().enumerate() {
            let response = result.expect("response");
            assert_eq!(response.data["action"], format!("job_{n}"));
        }
    }

    #[tokio::test]
    async fn test_action_timeout_removes_entry() {
        let server = MockServer::start(Responder::silent()).await;
        let (connection, _closed, _) = connect_to(&server, CorrelationField::Id).await;

        let err = connection
            .execute(Action::Ping, None, Some(Duration::from_millis(200)))
            .await
            .unwrap_err();

        match err {
            Error::ActionTimeout { action_id, timeout_ms } => {
                assert_eq!(timeout_ms, 200);
                assert!(!connection.is_pending(&action_id));
            }
            other => panic!("expected ActionTimeout, got {other:?}"),
        }
        assert_eq!(connection.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_close_fails_outstanding_actions() {
        let server = MockServer::start(Responder::silent()).await;
        let (connection, closed, _) = connect_to(&server, CorrelationField::Id).await;

        let calls: Vec<_> = (0..5)
            .map(|_| {
                let connection = connection.clone();
                tokio::spawn(async move { connection.execute(Action::Ping, None, None).await })
            })
            .collect();

        // Wait until every action is registered
        while connection.pending_count() < 5 {
            tokio::task::yield_now().await;
        }

        connection.close(CLOSE_CODE_NORMAL, DELIBERATE_CLOSE_REASON);
        let report = closed.await.expect("close report");
        assert_eq!(report.code, CLOSE_CODE_NORMAL);
        assert_eq!(report.reason, DELIBERATE_CLOSE_REASON);
        assert!(report.was_clean);

        for call in calls {
            let result = call.await.expect("join");
            assert!(matches!(result, Err(Error::ConnectionLost)));
        }
        assert_err!(connection.execute(Action::Ping, None, None).await);
    }

    #[tokio::test]
    async fn test_table_sealed_after_event_loop_exits() {
        let server = MockServer::start(Responder::silent()).await;
        let (connection, closed, _) = connect_to(&server, CorrelationField::Id).await;

        server.close_all(4001, "restart");
        closed.await.expect("close report");

        // A caller that passed the open check just before the loop ended
        let late = connection.correlator.register();
        assert!(matches!(late, Err(Error::ConnectionLost)));
        assert_eq!(connection.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_force_close_reports_local_reason() {
        let server = MockServer::start(Responder::silent()).await;
        let (connection, closed, _) = connect_to(&server, CorrelationField::Id).await;

        connection.force_close(CLOSE_CODE_PING_TIMEOUT, PING_TIMEOUT_REASON);
        assert!(!connection.is_open());

        let report = closed.await.expect("close report");
        assert_eq!(report.code, CLOSE_CODE_PING_TIMEOUT);
        assert_eq!(report.reason, PING_TIMEOUT_REASON);
        assert!(!report.was_clean);
    }

    #[tokio::test]
    async fn test_remote_close_is_reported() {
        let server = MockServer::start(Responder::ok()).await;
        let (_connection, closed, _) = connect_to(&server, CorrelationField::Id).await;

        server.wait_for_connections(1).await;
        server.close_all(4321, "maintenance");

        let report = closed.await.expect("close report");
        assert_eq!(report.code, 4321);
        assert_eq!(report.reason, "maintenance");
        assert!(report.was_clean);
    }

    #[tokio::test]
    async fn test_events_and_malformed_frames_are_dispatched() {
        let server = MockServer::start(Responder::ok()).await;
        let (connection, _closed, dispatcher) = connect_to(&server, CorrelationField::Id).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        dispatcher.subscribe(EventFilter::Any, move |event| sink.lock().push(event.clone()));

        server.wait_for_connections(1).await;
        server.push_text(r#"{"event":"instance_log","data":{"line":"a"},"time":1}"#);
        server.push_text("{not json");
        server.push_text(r#"{"event":"instance_log","data":{"line":"b"},"time":2}"#);
        server.push_text(r#"{"status":"ok","retcode":0,"id":"stale"}"#);

        // A round trip after the pushes guarantees they were processed
        assert_ok!(connection.execute(Action::Ping, None, None).await);

        let seen = seen.lock();
        assert_eq!(seen.len(), 4);
        assert!(matches!(&seen[0], ClientEvent::Server(e) if e.data["line"] == "a"));
        assert!(matches!(
            &seen[1],
            ClientEvent::Diagnostic(Diagnostic::MalformedMessage { .. })
        ));
        assert!(matches!(&seen[2], ClientEvent::Server(e) if e.data["line"] == "b"));
        assert!(matches!(
            &seen[3],
            ClientEvent::Diagnostic(Diagnostic::UnmatchedResponse { id }) if id == "stale"
        ));
        assert!(connection.is_open());
    }

    #[tokio::test]
    async fn test_dial_refused_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let url = Url::parse(&format!("ws://127.0.0.1:{port}/api/v1?token=x")).expect("url");
        let err = dial(&url, Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
    }

    #[test]
    fn test_constants() {
        assert_eq!(CLOSE_HANDSHAKE_TIMEOUT.as_secs(), 2);
        assert_eq!(CLOSE_CODE_NO_STATUS, 1005);
    }
}
