//! The single authority over the shared scene.
//!
//! One `ServerState` owns the scene document, the lock table, the session
//! registry and the broadcast dispatcher, and its methods are the only
//! mutation entry points. The whole struct sits behind one mutex
//! ([`SharedState`]), so "check lock" and "apply reducer" can never
//! interleave across two connections.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use forma_scene::{reducer, Action, MeshId, SceneState};

use crate::broadcast::Broadcaster;
use crate::locks::{AcquireOutcome, LockTable};
use crate::protocol::{ServerMessage, UserInfo};
use crate::session::SessionRegistry;

/// Handle shared between the accept loop, connection tasks and the
/// persistence timer.
pub type SharedState = Arc<Mutex<ServerState>>;

pub struct ServerState {
    pub scene: SceneState,
    locks: LockTable,
    registry: SessionRegistry,
    broadcaster: Broadcaster,
}

impl ServerState {
    pub fn new(scene: SceneState) -> Self {
        Self {
            scene,
            locks: LockTable::new(),
            registry: SessionRegistry::new(),
            broadcaster: Broadcaster::new(),
        }
    }

    pub fn new_shared(scene: SceneState) -> SharedState {
        Arc::new(Mutex::new(Self::new(scene)))
    }

    /// Register a new connection: allocate an identity, hydrate it with
    /// SYNC_STATE, and announce it to everyone else.
    pub fn connect(&mut self, sender: mpsc::UnboundedSender<String>) -> UserInfo {
        let client_id = Uuid::new_v4();
        let info = UserInfo::generate(client_id);

        self.registry.insert(info.clone());
        self.broadcaster.register(client_id, sender);

        let sync = ServerMessage::SyncState {
            payload: self.snapshot_with_locks(),
            client_id,
            user_info: info.clone(),
            all_users: self.registry.users(),
        };
        self.broadcaster.send_to(client_id, &sync);
        self.broadcaster
            .broadcast_except(client_id, &ServerMessage::UserJoined { user: info.clone() });

        log::info!(
            "{} connected ({}) - total: {}",
            info.name,
            short(client_id),
            self.registry.len()
        );
        info
    }

    /// Tear down a connection: locks go first (with their LOCK_RELEASED
    /// broadcasts), USER_LEFT last.
    pub fn disconnect(&mut self, client_id: Uuid) {
        let session = self.registry.remove(client_id);
        self.broadcaster.unregister(client_id);
        self.release_all_locks(client_id);
        self.broadcaster
            .broadcast_all(&ServerMessage::UserLeft { client_id });

        match session {
            Some(session) => log::info!("{} disconnected", session.info.name),
            None => log::info!("{} disconnected", short(client_id)),
        }
    }

    /// Validate, lock-shuffle, reduce, and relay one client action.
    pub fn handle_client_action(&mut self, author_id: Uuid, action: Action) {
        // 1. Reject edits against someone else's lock.
        if let Some(mesh_id) = action.lock_target() {
            if let Some(holder) = self.locks.holder(mesh_id) {
                if holder != author_id {
                    let holder_name = self
                        .registry
                        .display_name(holder)
                        .unwrap_or("another user")
                        .to_string();
                    log::warn!(
                        "blocked {} from {} on mesh {mesh_id} (locked by {holder_name})",
                        action.kind(),
                        short(author_id)
                    );
                    self.broadcaster.send_to(
                        author_id,
                        &ServerMessage::error(format!(
                            "Mesh {mesh_id} is locked by {holder_name}"
                        )),
                    );
                    return;
                }
            }
        }

        // 2. Implicit lock transitions, decided against the pre-action state.
        match &action {
            Action::SelectMesh(mesh_id) => {
                let previous = self.scene.selected_ids.clone();
                for id in previous {
                    if self.locks.holder(id) == Some(author_id) {
                        self.release_lock(id, author_id);
                    }
                }
                self.acquire_lock(*mesh_id, author_id);
            }
            Action::MultiSelect(mesh_id) => {
                // Toggling against the current selection: already selected
                // means the client is deselecting.
                if self.scene.selected_ids.contains(mesh_id) {
                    self.release_lock(*mesh_id, author_id);
                } else {
                    self.acquire_lock(*mesh_id, author_id);
                }
            }
            Action::ClearSelection | Action::ResetScene => {
                self.release_all_locks(author_id);
            }
            Action::RemoveMesh(mesh_id) => {
                if self.locks.holder(*mesh_id) == Some(author_id) {
                    self.release_lock(*mesh_id, author_id);
                }
            }
            Action::DeleteSelectedMeshes(payload) => {
                let targets = payload
                    .clone()
                    .unwrap_or_else(|| self.scene.selected_ids.clone());
                for mesh_id in targets {
                    if self.locks.holder(mesh_id) == Some(author_id) {
                        self.release_lock(mesh_id, author_id);
                    }
                }
            }
            _ => {}
        }

        // 3. Apply to the authoritative scene.
        reducer::apply(&mut self.scene, &action);

        // 4. Relay to peers; selections stay local to their author.
        if !action.is_local_only() {
            log::debug!("relaying {} from {}", action.kind(), short(author_id));
            self.broadcaster
                .broadcast_except(author_id, &ServerMessage::remote_action(action, author_id));
        }
    }

    /// Take a mesh lock and tell everyone, the acquirer included, so every
    /// replica converges on the same lock fields. Conflicts are a logged
    /// no-op; the pre-check in `handle_client_action` is what surfaces
    /// errors to callers.
    fn acquire_lock(&mut self, mesh_id: MeshId, client_id: Uuid) {
        match self.locks.acquire(mesh_id, client_id) {
            AcquireOutcome::Conflict(holder) => {
                log::warn!(
                    "mesh {mesh_id} already locked by {}",
                    self.registry.display_name(holder).unwrap_or("unknown")
                );
            }
            AcquireOutcome::Acquired | AcquireOutcome::AlreadyHeld => {
                let user_name = self
                    .registry
                    .display_name(client_id)
                    .unwrap_or("Unknown User")
                    .to_string();
                self.scene
                    .set_mesh_lock(mesh_id, Some((client_id, user_name.clone())));
                self.broadcaster.broadcast_all(&ServerMessage::LockAcquired {
                    mesh_id,
                    client_id,
                    user_name,
                });
            }
        }
    }

    fn release_lock(&mut self, mesh_id: MeshId, client_id: Uuid) {
        if self.locks.release(mesh_id, client_id) {
            self.scene.set_mesh_lock(mesh_id, None);
            self.broadcaster
                .broadcast_all(&ServerMessage::LockReleased { mesh_id });
        }
    }

    fn release_all_locks(&mut self, client_id: Uuid) {
        let released = self.locks.release_all(client_id);
        if released.is_empty() {
            return;
        }
        for mesh_id in &released {
            self.scene.set_mesh_lock(*mesh_id, None);
            self.broadcaster
                .broadcast_all(&ServerMessage::LockReleased { mesh_id: *mesh_id });
        }
        let who = self
            .registry
            .display_name(client_id)
            .map(str::to_string)
            .unwrap_or_else(|| short(client_id));
        log::info!("released {} locks for {who}", released.len());
    }

    /// Scene copy with lock fields recomputed from the live table, for
    /// SYNC_STATE hydration.
    pub fn snapshot_with_locks(&self) -> SceneState {
        let mut snapshot = self.scene.clone();
        for mesh in &mut snapshot.meshes {
            match self.locks.holder(mesh.id) {
                Some(holder) => {
                    mesh.locked_by = Some(holder);
                    mesh.locked_by_name =
                        self.registry.display_name(holder).map(str::to_string);
                }
                None => {
                    mesh.locked_by = None;
                    mesh.locked_by_name = None;
                }
            }
        }
        snapshot
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    pub fn lock_holder(&self, mesh_id: MeshId) -> Option<Uuid> {
        self.locks.holder(mesh_id)
    }
}

fn short(id: Uuid) -> String {
    id.to_string()[..8].to_string()
}
