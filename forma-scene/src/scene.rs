//! Scene document types.
//!
//! Field names follow the JSON wire format (camelCase keys, `"type"` for
//! the shape discriminator) so the same structs serialize straight into
//! SYNC_STATE payloads and the persisted snapshot file.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::Action;

/// Scene-unique mesh identifier (clients allocate these, typically from a
/// millisecond timestamp).
pub type MeshId = u64;

/// Primitive shape catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Cube,
    Sphere,
    Cylinder,
    Circle,
    Square,
}

/// A single mesh in the scene.
///
/// `locked_by` / `locked_by_name` are a read-only projection of the lock
/// table; only the lock manager writes them (via [`SceneState::set_mesh_lock`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshData {
    pub id: MeshId,
    #[serde(rename = "type")]
    pub shape: ShapeKind,
    pub position: [f32; 3],
    pub rotation: [f32; 3],
    pub scale: [f32; 3],
    pub color: String,
    /// Sparse per-vertex displacement overrides, keyed by vertex index.
    #[serde(default)]
    pub vertex_modifications: BTreeMap<u32, [f32; 3]>,
    #[serde(default)]
    pub locked_by: Option<Uuid>,
    #[serde(default)]
    pub locked_by_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraState {
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub fov: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneMode {
    Object,
    Edit,
}

/// Sub-object selection granularity in edit mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Vertex,
    Edge,
    Face,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedElement {
    pub mesh_id: MeshId,
    pub element_index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditModeState {
    pub selection_type: ElementKind,
    pub selected_elements: Vec<SelectedElement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSettings {
    pub visible: bool,
    pub size: f32,
    pub divisions: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightKind {
    Directional,
    Point,
    Ambient,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightData {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: LightKind,
    pub color: String,
    pub intensity: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<[f32; 3]>,
}

/// The single shared mutable document.
///
/// Created once at process start (possibly from a persisted snapshot) and
/// mutated only through [`crate::reducer::apply`], except for the lock
/// projection fields which the lock manager owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneState {
    pub meshes: Vec<MeshData>,
    pub selected_ids: Vec<MeshId>,
    pub camera: CameraState,
    pub mode: SceneMode,
    pub edit_mode: EditModeState,
    pub history: Vec<Action>,
    pub grid: GridSettings,
    pub lights: Vec<LightData>,
}

impl Default for SceneState {
    fn default() -> Self {
        Self {
            meshes: Vec::new(),
            selected_ids: Vec::new(),
            camera: CameraState {
                position: [5.0, 5.0, 5.0],
                target: [0.0, 0.0, 0.0],
                fov: 60.0,
            },
            mode: SceneMode::Object,
            edit_mode: EditModeState {
                selection_type: ElementKind::Vertex,
                selected_elements: Vec::new(),
            },
            history: Vec::new(),
            grid: GridSettings {
                visible: true,
                size: 10.0,
                divisions: 10,
            },
            lights: vec![LightData {
                id: 1,
                kind: LightKind::Directional,
                color: "#ffffff".to_string(),
                intensity: 0.8,
                position: Some([2.0, 5.0, 3.0]),
            }],
        }
    }
}

impl SceneState {
    /// Find a mesh by id.
    pub fn mesh(&self, id: MeshId) -> Option<&MeshData> {
        self.meshes.iter().find(|m| m.id == id)
    }

    /// Find a mesh by id, mutably.
    pub fn mesh_mut(&mut self, id: MeshId) -> Option<&mut MeshData> {
        self.meshes.iter_mut().find(|m| m.id == id)
    }

    /// Write the denormalized lock projection onto a mesh.
    ///
    /// Single mutation entry point for `lockedBy`/`lockedByName`; the lock
    /// manager calls this on the server, lock-event handling on the client.
    /// No-op when the mesh no longer exists (a lock can outlive its mesh
    /// briefly during delete races).
    pub fn set_mesh_lock(&mut self, id: MeshId, owner: Option<(Uuid, String)>) {
        if let Some(mesh) = self.mesh_mut(id) {
            match owner {
                Some((client_id, name)) => {
                    mesh.locked_by = Some(client_id);
                    mesh.locked_by_name = Some(name);
                }
                None => {
                    mesh.locked_by = None;
                    mesh.locked_by_name = None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(id: MeshId) -> MeshData {
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

    #[test]
    fn test_default_scene() {
        let scene = SceneState::default();
        assert!(scene.meshes.is_empty());
        assert!(scene.selected_ids.is_empty());
        assert_eq!(scene.mode, SceneMode::Object);
        assert_eq!(scene.edit_mode.selection_type, ElementKind::Vertex);
        assert_eq!(scene.camera.fov, 60.0);
        assert_eq!(scene.grid.divisions, 10);
        assert_eq!(scene.lights.len(), 1);
        assert_eq!(scene.lights[0].kind, LightKind::Directional);
    }

    #[test]
    fn test_set_mesh_lock() {
        let mut scene = SceneState::default();
        scene.meshes.push(cube(5));

        let owner = Uuid::new_v4();
        scene.set_mesh_lock(5, Some((owner, "Brave Fox".to_string())));
        assert_eq!(scene.mesh(5).unwrap().locked_by, Some(owner));
        assert_eq!(
            scene.mesh(5).unwrap().locked_by_name.as_deref(),
            Some("Brave Fox")
        );

        scene.set_mesh_lock(5, None);
        assert!(scene.mesh(5).unwrap().locked_by.is_none());
        assert!(scene.mesh(5).unwrap().locked_by_name.is_none());
    }

    #[test]
    fn test_set_mesh_lock_missing_mesh_is_noop() {
        let mut scene = SceneState::default();
        scene.set_mesh_lock(42, Some((Uuid::new_v4(), "x".to_string())));
        assert!(scene.meshes.is_empty());
    }

    #[test]
    fn test_wire_keys_are_camel_case() {
        let mut scene = SceneState::default();
        let mut mesh = cube(7);
        mesh.vertex_modifications.insert(3, [0.1, 0.2, 0.3]);
        scene.meshes.push(mesh);

        let value = serde_json::to_value(&scene).unwrap();
        assert!(value.get("selectedIds").is_some());
        assert!(value.get("editMode").is_some());
        assert!(value["editMode"].get("selectionType").is_some());

        let mesh = &value["meshes"][0];
        assert_eq!(mesh["type"], "cube");
        assert!(mesh.get("vertexModifications").is_some());
        assert_eq!(mesh["vertexModifications"]["3"][2], 0.3);
        assert!(mesh["lockedBy"].is_null());
    }

    #[test]
    fn test_scene_roundtrip() {
        let mut scene = SceneState::default();
        scene.meshes.push(cube(1));
        scene.selected_ids.push(1);
        scene.mode = SceneMode::Edit;

        let json = serde_json::to_string(&scene).unwrap();
        let back: SceneState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, scene);
    }

    #[test]
    fn test_mesh_defaults_on_sparse_input() {
        // Clients may omit vertexModifications and lock fields entirely.
        let mesh: MeshData = serde_json::from_str(
            r##"{"id":9,"type":"sphere","position":[0,0,0],"rotation":[0,0,0],"scale":[1,1,1],"color":"#00ff00"}"##,
        )
        .unwrap();
        assert_eq!(mesh.shape, ShapeKind::Sphere);
        assert!(mesh.vertex_modifications.is_empty());
        assert!(mesh.locked_by.is_none());
    }
}
