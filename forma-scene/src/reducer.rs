//! The action processor: one branch per action kind.
//!
//! Server and clients run the same transform, so a REMOTE_ACTION replayed
//! on a client produces the byte-identical scene the authority holds.
//! Mutating kinds are appended to `history`; selection kinds are not.
//! Unknown kinds are identity.

use crate::action::{Action, MeshProperty, PropertyValue};
use crate::scene::{SceneMode, SceneState};

/// Apply `action` to `state`.
pub fn apply(state: &mut SceneState, action: &Action) {
    match action {
        Action::AddMesh(mesh) => {
            let mut mesh = mesh.clone();
            // Fresh meshes never inherit modifications or a lock.
            mesh.vertex_modifications.clear();
            mesh.locked_by = None;
            mesh.locked_by_name = None;
            state.meshes.push(mesh);
            state.history.push(action.clone());
        }

        Action::RemoveMesh(id) => {
            state.meshes.retain(|m| m.id != *id);
            state.selected_ids.retain(|s| s != id);
            state
                .edit_mode
                .selected_elements
                .retain(|el| el.mesh_id != *id);
            state.history.push(action.clone());
        }

        Action::DeleteSelectedMeshes(_) => {
            // The payload only matters for lock release; the reducer always
            // deletes the current selection.
            let doomed = state.selected_ids.clone();
            state.meshes.retain(|m| !doomed.contains(&m.id));
            state.selected_ids.clear();
            state
                .edit_mode
                .selected_elements
                .retain(|el| !doomed.contains(&el.mesh_id));
            state.history.push(action.clone());
        }

        Action::SelectMesh(id) => {
            state.selected_ids = vec![*id];
            state.edit_mode.selected_elements.clear();
        }

        Action::MultiSelect(id) => {
            if let Some(pos) = state.selected_ids.iter().position(|s| s == id) {
                state.selected_ids.remove(pos);
            } else {
                state.selected_ids.push(*id);
            }
            let selected = state.selected_ids.clone();
            state
                .edit_mode
                .selected_elements
                .retain(|el| selected.contains(&el.mesh_id));
        }

        Action::ClearSelection => {
            state.selected_ids.clear();
            state.edit_mode.selected_elements.clear();
        }

        Action::UpdateMesh(p) => {
            if let Some(mesh) = state.mesh_mut(p.id) {
                match (&p.property, &p.values) {
                    (MeshProperty::Position, PropertyValue::Vector(v)) => mesh.position = *v,
                    (MeshProperty::Rotation, PropertyValue::Vector(v)) => mesh.rotation = *v,
                    (MeshProperty::Scale, PropertyValue::Vector(v)) => mesh.scale = *v,
                    (MeshProperty::Color, PropertyValue::Color(c)) => mesh.color = c.clone(),
                    (property, values) => {
                        log::warn!(
                            "UPDATE_MESH on {}: value {:?} does not fit property {:?}",
                            p.id,
                            values,
                            property
                        );
                    }
                }
            }
            state.history.push(action.clone());
        }

        Action::UpdateVertexPosition(p) => {
            if let Some(mesh) = state.mesh_mut(p.mesh_id) {
                mesh.vertex_modifications
                    .insert(p.vertex_index, p.new_position);
            }
            state.history.push(action.clone());
        }

        Action::UpdateMultipleVertices(p) => {
            if let Some(mesh) = state.mesh_mut(p.mesh_id) {
                for update in &p.updates {
                    mesh.vertex_modifications
                        .insert(update.vertex_index, update.new_position);
                }
            }
            state.history.push(action.clone());
        }

        Action::SetMode(mode) => {
            state.mode = *mode;
            if *mode != SceneMode::Edit {
                state.edit_mode.selected_elements.clear();
            }
        }

        Action::SelectEditElement(el) => {
            state.edit_mode.selected_elements = vec![*el];
        }

        Action::MultiSelectEditElement(el) => {
            let elements = &mut state.edit_mode.selected_elements;
            if let Some(pos) = elements.iter().position(|e| e == el) {
                elements.remove(pos);
            } else {
                elements.push(*el);
            }
        }

        Action::ClearEditElementSelection => {
            state.edit_mode.selected_elements.clear();
        }

        Action::ResetScene => {
            *state = SceneState::default();
        }

        Action::Other { kind, .. } => {
            log::debug!("ignoring unknown action kind {kind}");
        }
    }
}
