//! WebSocket authority server.
//!
//! ```text
//! Client A ──┐
//!            ├── ServerState (one mutex: scene + locks + sessions)
//! Client B ──┘        │
//!                     ├── Broadcaster ──► per-connection writer tasks
//!                     └── SceneStore  ──► data/scene-state.json
//! ```
//!
//! Each accepted socket gets its own task: a `tokio::select!` loop over
//! the inbound stream and the session's outbound channel. All state
//! mutation happens inside `ServerState` methods while its mutex is
//! held, so per-connection order is preserved and cross-connection
//! processing is serialized.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use forma_scene::SceneState;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::{ServerState, SharedState};
use crate::storage::SceneStore;

/// How often the scene is flushed to disk while meshes exist.
pub const AUTOSAVE_INTERVAL: Duration = Duration::from_secs(30);

const DEFAULT_PORT: u16 = 8080;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: String,
    /// Snapshot file path; parent directories are created on demand.
    pub state_path: PathBuf,
    /// Autosave period.
    pub autosave_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            state_path: PathBuf::from("data/scene-state.json"),
            autosave_interval: AUTOSAVE_INTERVAL,
        }
    }
}

impl ServerConfig {
    /// Default configuration with the port taken from `PORT` when set.
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|raw| raw.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);
        Self {
            bind_addr: format!("0.0.0.0:{port}"),
            ..Self::default()
        }
    }
}

/// The collaborative scene server.
pub struct CollabServer {
    config: ServerConfig,
    state: SharedState,
    store: Arc<SceneStore>,
}

impl CollabServer {
    pub fn new(config: ServerConfig) -> Self {
        let store = Arc::new(SceneStore::new(config.state_path.clone()));
        Self {
            config,
            state: ServerState::new_shared(SceneState::default()),
            store,
        }
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    /// Run until a termination signal arrives.
    ///
    /// Loads the persisted snapshot (best effort), serves connections,
    /// autosaves on a timer, and flushes once more before returning.
    /// Failing to bind the listener is the only fatal error.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(scene) = self.store.load().await {
            self.state.lock().await.scene = scene;
        }

        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!(
            "collaborative scene server listening on ws://{}",
            self.config.bind_addr
        );
        log::info!(
            "autosave every {}s to {}",
            self.config.autosave_interval.as_secs(),
            self.store.path().display()
        );

        let autosave = tokio::spawn(autosave_loop(
            self.state.clone(),
            self.store.clone(),
            self.config.autosave_interval,
        ));

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let state = self.state.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, addr, state).await {
                                log::error!("connection error from {addr}: {e}");
                            }
                        });
                    }
                    Err(e) => log::error!("accept failed: {e}"),
                },
                _ = &mut shutdown => {
                    log::info!("shutting down");
                    break;
                }
            }
        }

        // Stop the timer, then flush synchronously before exit.
        autosave.abort();
        let snapshot = { self.state.lock().await.scene.clone() };
        if let Err(e) = self.store.save(&snapshot).await {
            log::error!("final save failed: {e}");
        }
        log::info!("server closed");
        Ok(())
    }
}

/// Periodic snapshot writer; skips empty scenes.
async fn autosave_loop(state: SharedState, store: Arc<SceneStore>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await; // the first tick fires immediately
    loop {
        ticker.tick().await;
        let snapshot = {
            let state = state.lock().await;
            if state.scene.meshes.is_empty() {
                None
            } else {
                Some(state.scene.clone())
            }
        };
        if let Some(scene) = snapshot {
            if let Err(e) = store.save(&scene).await {
                log::error!("autosave failed: {e}");
            }
        }
    }
}

/// Drive one client connection from handshake to cleanup.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: SharedState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // The session's outbound mailbox; SYNC_STATE lands here during connect
    // and is drained below in arrival order.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let info = { state.lock().await.connect(out_tx.clone()) };
    log::debug!("websocket established from {addr} for {}", info.name);

    loop {
        tokio::select! {
            inbound = ws_receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    match ClientMessage::decode(text.as_str()) {
                        Ok(ClientMessage::ClientAction { action }) => {
                            state
                                .lock()
                                .await
                                .handle_client_action(info.client_id, action);
                        }
                        Err(e) => {
                            log::warn!("bad frame from {}: {e}", info.name);
                            send_error(&out_tx, "Invalid message format");
                        }
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    log::warn!("binary frame from {}; protocol is JSON text", info.name);
                    send_error(&out_tx, "Invalid message format");
                }
                Some(Ok(Message::Ping(data))) => {
                    if ws_sender.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    log::error!("websocket error for {}: {e}", info.name);
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
                // Broadcaster side dropped; connection is being torn down.
                None => break,
            },
        }
    }

    state.lock().await.disconnect(info.client_id);
    Ok(())
}

fn send_error(tx: &mpsc::UnboundedSender<String>, message: &str) {
    if let Ok(frame) = ServerMessage::error(message).encode() {
        let _ = tx.send(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forma_scene::{Action, MeshData, ShapeKind};
    use std::collections::BTreeMap;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    #[test]
    fn test_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.state_path, PathBuf::from("data/scene-state.json"));
        assert_eq!(config.autosave_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_server_creation() {
        let server = CollabServer::new(ServerConfig::default());
        assert_eq!(server.bind_addr(), "0.0.0.0:8080");
    }

    fn cube(id: u64) -> MeshData {
        MeshData {
            id,
            shape: ShapeKind::Cube,
            position: [0.0; 3],
            rotation: [0.0; 3],
            scale: [1.0; 3],
            color: "#ff0000".to_string(),
            vertex_modifications: BTreeMap::new(),
            locked_by: None,
            locked_by_name: None,
        }
    }

    /// Ephemeral-port accept loop over `handle_connection`.
    async fn spawn_test_server() -> (SocketAddr, SharedState) {
        let state = ServerState::new_shared(SceneState::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept_state = state.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, peer)) = listener.accept().await else {
                    break;
                };
                let state = accept_state.clone();
                tokio::spawn(async move {
                    let _ = handle_connection(stream, peer, state).await;
                });
            }
        });
        (addr, state)
    }

    async fn next_message<S>(socket: &mut S) -> ServerMessage
    where
        S: StreamExt<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            let frame = socket.next().await.unwrap().unwrap();
            if let WsMessage::Text(text) = frame {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_connect_hydrates_then_relays_actions() {
        let (addr, state) = spawn_test_server().await;

        let (mut alice, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        let sync = next_message(&mut alice).await;
        let ServerMessage::SyncState { all_users, .. } = sync else {
            panic!("expected SYNC_STATE, got {sync:?}");
        };
        assert_eq!(all_users.len(), 1);

        let (mut bob, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        let ServerMessage::SyncState { all_users, .. } = next_message(&mut bob).await else {
            panic!("expected SYNC_STATE");
        };
        assert_eq!(all_users.len(), 2);

        // Alice is told about Bob.
        assert!(matches!(
            next_message(&mut alice).await,
            ServerMessage::UserJoined { .. }
        ));

        // Alice adds a mesh; Bob sees it as REMOTE_ACTION.
        let frame = ClientMessage::ClientAction {
            action: Action::AddMesh(cube(42)),
        }
        .encode()
        .unwrap();
        alice.send(WsMessage::Text(frame.into())).await.unwrap();

        match next_message(&mut bob).await {
            ServerMessage::RemoteAction { action, .. } => {
                assert!(matches!(action, Action::AddMesh(mesh) if mesh.id == 42));
            }
            other => panic!("expected REMOTE_ACTION, got {other:?}"),
        }
        assert_eq!(state.lock().await.scene.meshes.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_frame_gets_error_and_connection_survives() {
        let (addr, _state) = spawn_test_server().await;

        let (mut client, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        let _sync = next_message(&mut client).await;

        client
            .send(WsMessage::Text("this is not json".into()))
            .await
            .unwrap();
        match next_message(&mut client).await {
            ServerMessage::Error { message } => assert_eq!(message, "Invalid message format"),
            other => panic!("expected ERROR, got {other:?}"),
        }

        // Outbound-only kinds are equally illegal inbound.
        client
            .send(WsMessage::Text(
                r#"{"type":"USER_LEFT","clientId":"x"}"#.into(),
            ))
            .await
            .unwrap();
        assert!(matches!(
            next_message(&mut client).await,
            ServerMessage::Error { .. }
        ));

        // Still alive: a valid action round-trips.
        let frame = ClientMessage::ClientAction {
            action: Action::SelectMesh(1),
        }
        .encode()
        .unwrap();
        client.send(WsMessage::Text(frame.into())).await.unwrap();
        assert!(matches!(
            next_message(&mut client).await,
            ServerMessage::LockAcquired { mesh_id: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_disconnect_releases_locks_and_session() {
        let (addr, state) = spawn_test_server().await;

        let (mut alice, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        let _ = next_message(&mut alice).await;
        let frame = ClientMessage::ClientAction {
            action: Action::SelectMesh(7),
        }
        .encode()
        .unwrap();
        alice.send(WsMessage::Text(frame.into())).await.unwrap();
        let _ = next_message(&mut alice).await; // LOCK_ACQUIRED

        alice.close(None).await.unwrap();

        // Wait for the server task to run cleanup.
        for _ in 0..50 {
            if state.lock().await.session_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let state = state.lock().await;
        assert_eq!(state.session_count(), 0);
        assert_eq!(state.lock_holder(7), None);
    }
}
