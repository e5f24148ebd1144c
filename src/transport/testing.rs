//! In-process WebSocket server that plays the remote end in tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use url::Url;

/// How the mock answers action frames.
#[derive(Debug, Clone)]
pub(crate) enum Responder {
    /// Answer every action with `ok`.
    Ok,
    /// Never answer.
    Silent,
    /// Answer everything except this action.
    Ignore(&'static str),
    /// Hold `n` requests, then answer them newest first.
    OkReversed(usize),
}

impl Responder {
    pub(crate) fn ok() -> Self {
        Self::Ok
    }

    pub(crate) fn silent() -> Self {
        Self::Silent
    }

    pub(crate) fn ignore(action: &'static str) -> Self {
        Self::Ignore(action)
    }

    pub(crate) fn ok_reversed(n: usize) -> Self {
        Self::OkReversed(n)
    }

    fn respond(&self, request: &Value, held: &mut Vec<Value>) -> Vec<String> {
        match self {
            Self::Ok => vec![reply_to(request)],
            Self::Silent => Vec::new(),
            Self::Ignore(action) if request["action"] == *action => Vec::new(),
            Self::Ignore(_) => vec![reply_to(request)],
            Self::OkReversed(n) => {
                held.push(request.clone());
                if held.len() < *n {
                    return Vec::new();
                }
                held.drain(..).rev().map(|r| reply_to(&r)).collect()
            }
        }
    }
}

/// Builds an `ok` response echoing the request's correlation field.
fn reply_to(request: &Value) -> String {
    let field = if request.get("echo").is_some() { "echo" } else { "id" };

    let mut reply = Map::new();
    reply.insert("status".into(), json!("ok"));
    reply.insert("retcode".into(), json!(0));
    reply.insert("data".into(), json!({ "action": request["action"] }));
    reply.insert("message".into(), json!(""));
    reply.insert(field.into(), request[field].clone());
    Value::Object(reply).to_string()
}

/// Mock realtime endpoint bound to a random local port.
pub(crate) struct MockServer {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    accepted_notify: Arc<Notify>,
    received: Arc<Mutex<Vec<Value>>>,
    close_frames: Arc<Mutex<Vec<(u16, String)>>>,
    paths: Arc<Mutex<Vec<String>>>,
    push_tx: broadcast::Sender<Message>,
    accept_task: JoinHandle<()>,
}

impl MockServer {
    pub(crate) async fn start(responder: Responder) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock");
        let addr = listener.local_addr().expect("mock addr");

        let accepted = Arc::new(AtomicUsize::new(0));
        let accepted_notify = Arc::new(Notify::new());
        let received = Arc::new(Mutex::new(Vec::new()));
        let close_frames = Arc::new(Mutex::new(Vec::new()));
        let paths = Arc::new(Mutex::new(Vec::new()));
        let (push_tx, _) = broadcast::channel(64);

        let accept_task = tokio::spawn({
            let accepted = Arc::clone(&accepted);
            let accepted_notify = Arc::clone(&accepted_notify);
            let received = Arc::clone(&received);
            let close_frames = Arc::clone(&close_frames);
            let paths = Arc::clone(&paths);
            let push_tx = push_tx.clone();

            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let push_rx = push_tx.subscribe();
                    let Some(ws) = upgrade(stream, &paths).await else {
                        continue;
                    };
                    accepted.fetch_add(1, Ordering::SeqCst);
                    accepted_notify.notify_waiters();
                    tokio::spawn(serve(
                        ws,
                        responder.clone(),
                        Arc::clone(&received),
                        Arc::clone(&close_frames),
                        push_rx,
                    ));
                }
            }
        });

        Self {
            addr,
            accepted,
            accepted_notify,
            received,
            close_frames,
            paths,
            push_tx,
            accept_task,
        }
    }

    pub(crate) fn port(&self) -> u16 {
        self.addr.port()
    }

    pub(crate) fn ws_url(&self, token: &str) -> Url {
        Url::parse(&format!("ws://{}/api/v1?token={token}", self.addr)).expect("mock url")
    }

    /// Number of completed WebSocket upgrades so far.
    pub(crate) fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub(crate) async fn wait_for_connections(&self, count: usize) {
        loop {
            let notified = self.accepted_notify.notified();
            if self.accepted() >= count {
                return;
            }
            notified.await;
        }
    }

    /// Every action frame received, across connections.
    pub(crate) fn received(&self) -> Vec<Value> {
        self.received.lock().clone()
    }

    /// Close frames received from clients, as `(code, reason)`.
    pub(crate) fn close_frames(&self) -> Vec<(u16, String)> {
        self.close_frames.lock().clone()
    }

    /// Request paths (with query) of every upgrade.
    pub(crate) fn paths(&self) -> Vec<String> {
        self.paths.lock().clone()
    }

    pub(crate) fn push_text(&self, text: &str) {
        let _ = self.push_tx.send(Message::Text(text.into()));
    }

    pub(crate) fn close_all(&self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.into(),
        };
        let _ = self.push_tx.send(Message::Close(Some(frame)));
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn upgrade(
    stream: TcpStream,
    paths: &Arc<Mutex<Vec<String>>>,
) -> Option<tokio_tungstenite::WebSocketStream<TcpStream>> {
    let paths = Arc::clone(paths);
    let callback = move |request: &Request, response: Response| {
        paths.lock().push(request.uri().to_string());
        Ok::<_, ErrorResponse>(response)
    };
    tokio_tungstenite::accept_hdr_async(stream, callback).await.ok()
}

async fn serve(
    ws: tokio_tungstenite::WebSocketStream<TcpStream>,
    responder: Responder,
    received: Arc<Mutex<Vec<Value>>>,
    close_frames: Arc<Mutex<Vec<(u16, String)>>>,
    mut push_rx: broadcast::Receiver<Message>,
) {
    let (mut write, mut read) = ws.split();
    let mut held = Vec::new();

    loop {
        tokio::select! {
            biased;

            pushed = push_rx.recv() => match pushed {
                Ok(message) => {
                    if write.send(message).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },

            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let Ok(request) = serde_json::from_str::<Value>(&text) else {
                        continue;
                    };
                    received.lock().push(request.clone());
                    for reply in responder.respond(&request, &mut held) {
                        if write.send(Message::Text(reply.into())).await.is_err() {
                            return;
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    if let Some(frame) = frame {
                        close_frames
                            .lock()
                            .push((u16::from(frame.code), frame.reason.as_str().to_string()));
                    }
                    let _ = write.close().await;
                    break;
                }
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }
}
