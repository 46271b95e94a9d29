//! # forma-scene — shared scene document for Forma
//!
//! The canonical data model for the collaborative 3D editor: meshes,
//! selection, edit mode, lights, grid, and the closed [`Action`] union
//! that describes every mutation. Server and clients both apply actions
//! through the same [`reducer`], which is what makes optimistic local
//! edits converge with the authoritative copy.
//!
//! ```text
//! Action ──► reducer::apply(&mut SceneState, &Action) ──► SceneState'
//! ```
//!
//! ## Modules
//!
//! - [`scene`] — `SceneState`, `MeshData` and friends (wire-compatible JSON)
//! - [`action`] — the tagged action union (`{"type": ..., "payload": ...}`)
//! - [`reducer`] — one branch per action kind; unknown kinds are identity

pub mod action;
pub mod reducer;
pub mod scene;

pub use action::{
    Action, MeshProperty, PropertyValue, UpdateMeshPayload, UpdateVertexPayload,
    UpdateVerticesPayload, VertexUpdate,
};
pub use scene::{
    CameraState, EditModeState, ElementKind, GridSettings, LightData, LightKind, MeshData,
    MeshId, SceneMode, SceneState, SelectedElement, ShapeKind,
};
