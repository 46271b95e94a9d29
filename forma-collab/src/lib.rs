//! # forma-collab — Real-time collaboration layer for Forma
//!
//! WebSocket-based multiplayer scene editing with server-authoritative
//! mesh locks. No merge algebra: the server serializes all mutations,
//! rejects updates against meshes locked by someone else, and relays
//! accepted actions so every replica runs the same reducer over the
//! same stream.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     WebSocket      ┌──────────────┐
//! │ SyncClient  │ ◄─────────────────► │ CollabServer │
//! │ (per user)  │     JSON frames     │ (authority)  │
//! └──────┬──────┘                     └──────┬───────┘
//!        │                                   │
//!        ▼                                   ▼
//! ┌─────────────┐                     ┌──────────────┐
//! │ SceneState  │                     │ ServerState  │
//! │ (replica)   │                     │ scene+locks  │
//! └─────────────┘                     └──────┬───────┘
//!                                            │
//!                                    ┌───────┴───────┐
//!                                    │  Broadcaster  │
//!                                    │   (fan-out)   │
//!                                    └───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — JSON wire protocol (`type`-tagged frames)
//! - [`session`] — Connected users and generated identities
//! - [`locks`] — Exclusive per-mesh lock table
//! - [`broadcast`] — Per-connection fan-out
//! - [`state`] — The authoritative state machine
//! - [`server`] — WebSocket server and process lifecycle
//! - [`storage`] — JSON snapshot persistence
//! - [`client`] — Sync client with reconnect backoff

pub mod broadcast;
pub mod client;
pub mod locks;
pub mod protocol;
pub mod server;
pub mod session;
pub mod state;
pub mod storage;

// Re-exports for convenience
pub use broadcast::{BroadcastStats, Broadcaster};
pub use client::{reconnect_delay, ConnectionState, SyncClient, SyncEvent};
pub use locks::{AcquireOutcome, LockTable};
pub use protocol::{ClientMessage, ProtocolError, ServerMessage, UserInfo};
pub use server::{CollabServer, ServerConfig, AUTOSAVE_INTERVAL};
pub use session::{Session, SessionRegistry};
pub use state::{ServerState, SharedState};
pub use storage::{SceneStore, StoreError};
