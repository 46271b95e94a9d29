//! WebSocket sync client.
//!
//! Mirrors the server's mutation pipeline on the client side:
//! committed actions are applied to the local scene through the shared
//! reducer immediately, then forwarded to the server, which relays
//! them to everyone else as `REMOTE_ACTION`. Because both sides run
//! the same reducer over the same action stream, replicas converge.
//!
//! The client holds local edits (reducer only, no send) until the
//! first `SYNC_STATE` arrives; sending before hydration would race the
//! snapshot. Dropped connections are retried with exponential backoff.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use forma_scene::{reducer, Action, MeshId, SceneState};

use crate::protocol::{ClientMessage, ServerMessage, UserInfo};

/// Base reconnect delay; doubles per failed attempt.
const RECONNECT_BASE_MS: u64 = 1_000;
/// Reconnect delay ceiling.
const RECONNECT_MAX_MS: u64 = 10_000;

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Reconnecting,
}

/// Events emitted to the embedding application.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Socket opened (hydration not yet received)
    Connected,
    /// Socket closed or lost
    Disconnected,
    /// Initial `SYNC_STATE` applied; edits flow to the server from here on
    StateSynced { client_id: Uuid },
    /// A remote action was applied to the local scene
    RemoteApplied { kind: String, author_id: Uuid },
    /// A mesh lock changed hands
    LockChanged {
        mesh_id: MeshId,
        holder: Option<(Uuid, String)>,
    },
    /// A collaborator joined
    PeerJoined(UserInfo),
    /// A collaborator left
    PeerLeft(Uuid),
    /// The server rejected one of our actions
    ServerError(String),
}

/// Delay before reconnect attempt `attempt` (zero-based).
pub fn reconnect_delay(attempt: u32) -> Duration {
    let exp = attempt.min(10);
    Duration::from_millis((RECONNECT_BASE_MS << exp).min(RECONNECT_MAX_MS))
}

/// Handles shared between the public client and its background tasks.
#[derive(Clone)]
struct ClientShared {
    scene: Arc<RwLock<SceneState>>,
    identity: Arc<RwLock<Option<UserInfo>>>,
    peers: Arc<RwLock<Vec<UserInfo>>>,
    state: Arc<RwLock<ConnectionState>>,
    initialized: Arc<AtomicBool>,
    outgoing: Arc<RwLock<Option<mpsc::UnboundedSender<String>>>>,
    event_tx: mpsc::UnboundedSender<SyncEvent>,
    shutdown: Arc<Notify>,
    closing: Arc<AtomicBool>,
}

/// The sync client.
///
/// Owns a local replica of the scene, keeps it converged with the
/// server, and exposes `commit` as the single entry point for edits.
pub struct SyncClient {
    server_url: String,
    shared: ClientShared,
    event_rx: Option<mpsc::UnboundedReceiver<SyncEvent>>,
}

impl SyncClient {
    /// Create a new sync client targeting `server_url`.
    pub fn new(server_url: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            server_url: server_url.into(),
            shared: ClientShared {
                scene: Arc::new(RwLock::new(SceneState::default())),
                identity: Arc::new(RwLock::new(None)),
                peers: Arc::new(RwLock::new(Vec::new())),
                state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
                initialized: Arc::new(AtomicBool::new(false)),
                outgoing: Arc::new(RwLock::new(None)),
                event_tx,
                shutdown: Arc::new(Notify::new()),
                closing: Arc::new(AtomicBool::new(false)),
            },
            event_rx: Some(event_rx),
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::UnboundedReceiver<SyncEvent>> {
        self.event_rx.take()
    }

    /// Spawn the connection supervisor.
    ///
    /// Attempts run strictly one at a time; the task lives until
    /// [`close`](Self::close) is called.
    pub fn start(&self) -> JoinHandle<()> {
        let url = self.server_url.clone();
        let shared = self.shared.clone();
        tokio::spawn(supervisor(url, shared))
    }

    /// Stop reconnecting and close the current connection, if any.
    pub fn close(&self) {
        self.shared.closing.store(true, Ordering::SeqCst);
        self.shared.shutdown.notify_waiters();
    }

    /// Apply an action locally and forward it to the server.
    ///
    /// The local reducer runs unconditionally so the UI stays
    /// responsive; the frame is only sent once the connection is open
    /// and the initial snapshot has been applied.
    pub async fn commit(&self, action: Action) {
        reducer::apply(&mut *self.shared.scene.write().await, &action);

        if *self.shared.state.read().await != ConnectionState::Open
            || !self.shared.initialized.load(Ordering::SeqCst)
        {
            log::debug!("holding {} locally; session not ready", action.kind());
            return;
        }

        match (ClientMessage::ClientAction { action }).encode() {
            Ok(frame) => {
                if let Some(tx) = self.shared.outgoing.read().await.as_ref() {
                    let _ = tx.send(frame);
                }
            }
            Err(e) => log::error!("failed to encode action: {e}"),
        }
    }

    /// Apply an action to the local replica without sending it.
    pub async fn dispatch_local(&self, action: Action) {
        reducer::apply(&mut *self.shared.scene.write().await, &action);
    }

    /// Snapshot of the local scene replica.
    pub async fn scene(&self) -> SceneState {
        self.shared.scene.read().await.clone()
    }

    /// Our server-assigned identity, once hydrated.
    pub async fn identity(&self) -> Option<UserInfo> {
        self.shared.identity.read().await.clone()
    }

    /// Everyone connected, including us.
    pub async fn peers(&self) -> Vec<UserInfo> {
        self.shared.peers.read().await.clone()
    }

    /// Current connection state.
    pub async fn connection_state(&self) -> ConnectionState {
        *self.shared.state.read().await
    }

    /// Whether the initial snapshot has been applied.
    pub fn is_initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::SeqCst)
    }

    /// Server URL this client targets.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}

/// Connect, serve the session, back off, repeat.
async fn supervisor(url: String, shared: ClientShared) {
    let mut attempt: u32 = 0;
    loop {
        if shared.closing.load(Ordering::SeqCst) {
            break;
        }

        *shared.state.write().await = if attempt == 0 {
            ConnectionState::Connecting
        } else {
            ConnectionState::Reconnecting
        };

        match tokio_tungstenite::connect_async(&url).await {
            Ok((ws_stream, _)) => {
                attempt = 0;
                run_connection(ws_stream, &shared).await;

                shared.initialized.store(false, Ordering::SeqCst);
                *shared.outgoing.write().await = None;
                *shared.state.write().await = ConnectionState::Disconnected;
                let _ = shared.event_tx.send(SyncEvent::Disconnected);
            }
            Err(e) => {
                log::warn!("connect to {url} failed: {e}");
                *shared.state.write().await = ConnectionState::Disconnected;
            }
        }

        if shared.closing.load(Ordering::SeqCst) {
            break;
        }

        let delay = reconnect_delay(attempt);
        attempt += 1;
        log::info!("reconnecting in {}ms (attempt {attempt})", delay.as_millis());
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shared.shutdown.notified() => break,
        }
    }
    *shared.state.write().await = ConnectionState::Disconnected;
}

/// Pump one open connection until it drops or shutdown is requested.
async fn run_connection<S>(ws_stream: tokio_tungstenite::WebSocketStream<S>, shared: &ClientShared)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    *shared.outgoing.write().await = Some(out_tx);
    *shared.state.write().await = ConnectionState::Open;
    let _ = shared.event_tx.send(SyncEvent::Connected);

    // Register for shutdown before entering the loop so a close() racing
    // the select arms is not lost.
    let shutdown = shared.shutdown.notified();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            inbound = ws_receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerMessage>(text.as_str()) {
                        Ok(msg) => handle_server_message(msg, shared).await,
                        Err(e) => log::warn!("undecodable server frame: {e}"),
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    if ws_sender.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    log::error!("websocket error: {e}");
                    break;
                }
                Some(Ok(_)) => {}
            },
            outbound = out_rx.recv() => match outbound {
                Some(frame) => {
                    if ws_sender.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            _ = &mut shutdown => {
                let _ = ws_sender.send(Message::Close(None)).await;
                break;
            }
        }
    }
}

/// Fold one server frame into the local replica.
async fn handle_server_message(msg: ServerMessage, shared: &ClientShared) {
    match msg {
        ServerMessage::SyncState {
            payload,
            client_id,
            user_info,
            all_users,
        } => {
            // The snapshot wins over any local speculation.
            *shared.scene.write().await = payload;
            *shared.identity.write().await = Some(user_info);
            *shared.peers.write().await = all_users;
            shared.initialized.store(true, Ordering::SeqCst);
            log::info!("hydrated as {client_id}");
            let _ = shared.event_tx.send(SyncEvent::StateSynced { client_id });
        }
        ServerMessage::RemoteAction {
            action, author_id, ..
        } => {
            reducer::apply(&mut *shared.scene.write().await, &action);
            let _ = shared.event_tx.send(SyncEvent::RemoteApplied {
                kind: action.kind().to_string(),
                author_id,
            });
        }
        ServerMessage::LockAcquired {
            mesh_id,
            client_id,
            user_name,
        } => {
            shared
                .scene
                .write()
                .await
                .set_mesh_lock(mesh_id, Some((client_id, user_name.clone())));
            let _ = shared.event_tx.send(SyncEvent::LockChanged {
                mesh_id,
                holder: Some((client_id, user_name)),
            });
        }
        ServerMessage::LockReleased { mesh_id } => {
            shared.scene.write().await.set_mesh_lock(mesh_id, None);
            let _ = shared.event_tx.send(SyncEvent::LockChanged {
                mesh_id,
                holder: None,
            });
        }
        ServerMessage::UserJoined { user } => {
            let mut peers = shared.peers.write().await;
            if !peers.iter().any(|u| u.client_id == user.client_id) {
                peers.push(user.clone());
            }
            drop(peers);
            let _ = shared.event_tx.send(SyncEvent::PeerJoined(user));
        }
        ServerMessage::UserLeft { client_id } => {
            shared
                .peers
                .write()
                .await
                .retain(|u| u.client_id != client_id);
            let _ = shared.event_tx.send(SyncEvent::PeerLeft(client_id));
        }
        ServerMessage::Error { message } => {
            log::warn!("server rejected action: {message}");
            let _ = shared.event_tx.send(SyncEvent::ServerError(message));
        }
    }
}
