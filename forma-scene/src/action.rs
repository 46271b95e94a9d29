//! The closed action union.
//!
//! Wire form is `{ "type": "SOME_KIND", "payload": ... }` with the payload
//! shape determined by the kind (`payload` omitted for kinds that carry
//! none). The serde impls are hand-written over that envelope so that
//! unknown kinds deserialize into [`Action::Other`] instead of failing —
//! the reducer treats those as identity but the server still relays them.

use serde::de::Error as DeError;
use serde::ser::{Error as SerError, SerializeMap};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::scene::{MeshData, MeshId, SceneMode, SelectedElement};

/// Which mesh property an UPDATE_MESH touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshProperty {
    Position,
    Rotation,
    Scale,
    Color,
}

/// UPDATE_MESH value: a 3-vector for transforms, a string for color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Vector([f32; 3]),
    Color(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMeshPayload {
    pub id: MeshId,
    pub property: MeshProperty,
    pub values: PropertyValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVertexPayload {
    pub mesh_id: MeshId,
    pub vertex_index: u32,
    pub new_position: [f32; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VertexUpdate {
    pub vertex_index: u32,
    pub new_position: [f32; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVerticesPayload {
    pub mesh_id: MeshId,
    pub updates: Vec<VertexUpdate>,
}

/// Every scene mutation, one variant per wire kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    AddMesh(MeshData),
    RemoveMesh(MeshId),
    /// Payload is optional on the wire; when absent the server falls back
    /// to its own current selection.
    DeleteSelectedMeshes(Option<Vec<MeshId>>),
    SelectMesh(MeshId),
    MultiSelect(MeshId),
    ClearSelection,
    UpdateMesh(UpdateMeshPayload),
    UpdateVertexPosition(UpdateVertexPayload),
    UpdateMultipleVertices(UpdateVerticesPayload),
    SetMode(SceneMode),
    SelectEditElement(SelectedElement),
    MultiSelectEditElement(SelectedElement),
    ClearEditElementSelection,
    ResetScene,
    /// Unrecognized kind, carried verbatim so it can be relayed.
    Other { kind: String, payload: Value },
}

impl Action {
    /// Wire tag for this action.
    pub fn kind(&self) -> &str {
        match self {
            Action::AddMesh(_) => "ADD_MESH",
            Action::RemoveMesh(_) => "REMOVE_MESH",
            Action::DeleteSelectedMeshes(_) => "DELETE_SELECTED_MESHES",
            Action::SelectMesh(_) => "SELECT_MESH",
            Action::MultiSelect(_) => "MULTI_SELECT",
            Action::ClearSelection => "CLEAR_SELECTION",
            Action::UpdateMesh(_) => "UPDATE_MESH",
            Action::UpdateVertexPosition(_) => "UPDATE_VERTEX_POSITION",
            Action::UpdateMultipleVertices(_) => "UPDATE_MULTIPLE_VERTICES",
            Action::SetMode(_) => "SET_MODE",
            Action::SelectEditElement(_) => "SELECT_EDIT_ELEMENT",
            Action::MultiSelectEditElement(_) => "MULTI_SELECT_EDIT_ELEMENT",
            Action::ClearEditElementSelection => "CLEAR_EDIT_ELEMENT_SELECTION",
            Action::ResetScene => "RESET_SCENE",
            Action::Other { kind, .. } => kind,
        }
    }

    /// Selection/mode actions are per-client view state: applied locally on
    /// the server but never relayed to peers.
    pub fn is_local_only(&self) -> bool {
        matches!(
            self,
            Action::SelectMesh(_)
                | Action::MultiSelect(_)
                | Action::ClearSelection
                | Action::SelectEditElement(_)
                | Action::MultiSelectEditElement(_)
                | Action::ClearEditElementSelection
                | Action::SetMode(_)
        )
    }

    /// The mesh this action needs an exclusive lock on, if any.
    pub fn lock_target(&self) -> Option<MeshId> {
        match self {
            Action::UpdateMesh(p) => Some(p.id),
            Action::UpdateVertexPosition(p) => Some(p.mesh_id),
            Action::UpdateMultipleVertices(p) => Some(p.mesh_id),
            Action::RemoveMesh(id) => Some(*id),
            _ => None,
        }
    }

    fn from_parts(kind: String, payload: Value) -> Result<Self, String> {
        fn parse<T: serde::de::DeserializeOwned>(kind: &str, payload: Value) -> Result<T, String> {
            serde_json::from_value(payload).map_err(|e| format!("{kind}: invalid payload: {e}"))
        }

        Ok(match kind.as_str() {
            "ADD_MESH" => Action::AddMesh(parse(&kind, payload)?),
            "REMOVE_MESH" => Action::RemoveMesh(parse(&kind, payload)?),
            "DELETE_SELECTED_MESHES" => match payload {
                Value::Null => Action::DeleteSelectedMeshes(None),
                Value::Number(_) => {
                    Action::DeleteSelectedMeshes(Some(vec![parse(&kind, payload)?]))
                }
                other => Action::DeleteSelectedMeshes(Some(parse(&kind, other)?)),
            },
            "SELECT_MESH" => Action::SelectMesh(parse(&kind, payload)?),
            "MULTI_SELECT" => Action::MultiSelect(parse(&kind, payload)?),
            "CLEAR_SELECTION" => Action::ClearSelection,
            "UPDATE_MESH" => Action::UpdateMesh(parse(&kind, payload)?),
            "UPDATE_VERTEX_POSITION" => Action::UpdateVertexPosition(parse(&kind, payload)?),
            "UPDATE_MULTIPLE_VERTICES" => Action::UpdateMultipleVertices(parse(&kind, payload)?),
            "SET_MODE" => Action::SetMode(parse(&kind, payload)?),
            "SELECT_EDIT_ELEMENT" => Action::SelectEditElement(parse(&kind, payload)?),
            "MULTI_SELECT_EDIT_ELEMENT" => Action::MultiSelectEditElement(parse(&kind, payload)?),
            // CLEAR_EDIT_SELECTION is a legacy alias some clients still send.
            "CLEAR_EDIT_ELEMENT_SELECTION" | "CLEAR_EDIT_SELECTION" => {
                Action::ClearEditElementSelection
            }
            "RESET_SCENE" => Action::ResetScene,
            _ => Action::Other { kind, payload },
        })
    }

    fn payload_value(&self) -> Result<Option<Value>, serde_json::Error> {
        Ok(match self {
            Action::AddMesh(m) => Some(serde_json::to_value(m)?),
            Action::RemoveMesh(id) => Some(Value::from(*id)),
            Action::DeleteSelectedMeshes(ids) => match ids {
                Some(ids) => Some(serde_json::to_value(ids)?),
                None => None,
            },
            Action::SelectMesh(id) | Action::MultiSelect(id) => Some(Value::from(*id)),
            Action::ClearSelection => None,
            Action::UpdateMesh(p) => Some(serde_json::to_value(p)?),
            Action::UpdateVertexPosition(p) => Some(serde_json::to_value(p)?),
            Action::UpdateMultipleVertices(p) => Some(serde_json::to_value(p)?),
            Action::SetMode(mode) => Some(serde_json::to_value(mode)?),
            Action::SelectEditElement(el) | Action::MultiSelectEditElement(el) => {
                Some(serde_json::to_value(el)?)
            }
            Action::ClearEditElementSelection => None,
            Action::ResetScene => None,
            Action::Other { payload, .. } => {
                if payload.is_null() {
                    None
                } else {
                    Some(payload.clone())
                }
            }
        })
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let payload = self.payload_value().map_err(S::Error::custom)?;
        let len = if payload.is_some() { 2 } else { 1 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("type", self.kind())?;
        if let Some(payload) = &payload {
            map.serialize_entry("payload", payload)?;
        }
        map.end()
    }
}

#[derive(Deserialize)]
struct RawAction {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawAction::deserialize(deserializer)?;
        Action::from_parts(raw.kind, raw.payload).map_err(D::Error::custom)
    }
}
