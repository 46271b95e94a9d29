//! Whole-file JSON snapshot persistence.
//!
//! The scene is small enough that the durable format is simply the
//! serialized `SceneState`, rewritten in full: serialize to a sibling
//! `.tmp` file, then rename over the target so readers never observe a
//! torn write. Load failures fall back to the default scene; save
//! failures are logged and the next cycle tries again.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::sync::Mutex;

use forma_scene::SceneState;

/// Storage errors.
#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Serde(serde_json::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Serde(e) => write!(f, "JSON error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serde(e)
    }
}

/// Durable store for the scene snapshot.
pub struct SceneStore {
    path: PathBuf,
    /// Serializes the autosave timer against the shutdown flush.
    write_gate: Mutex<()>,
}

impl SceneStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_gate: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Best-effort load. Missing file is a normal first boot; a corrupt or
    /// unreadable file is logged and treated the same way.
    pub async fn load(&self) -> Option<SceneState> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("no persisted scene at {}, starting fresh", self.path.display());
                return None;
            }
            Err(e) => {
                log::error!("failed to read {}: {e}", self.path.display());
                return None;
            }
        };
        match serde_json::from_slice::<SceneState>(&data) {
            Ok(scene) => {
                log::info!(
                    "loaded persisted scene from {} ({} meshes)",
                    self.path.display(),
                    scene.meshes.len()
                );
                Some(scene)
            }
            Err(e) => {
                log::error!("persisted scene at {} is invalid: {e}", self.path.display());
                None
            }
        }
    }

    /// Atomically persist the full scene.
    pub async fn save(&self, scene: &SceneState) -> Result<(), StoreError> {
        let _gate = self.write_gate.lock().await;

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).await?;
        }

        let json = serde_json::to_vec_pretty(scene)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &json).await?;
        fs::rename(&tmp, &self.path).await?;

        log::debug!(
            "saved scene to {} ({} bytes)",
            self.path.display(),
            json.len()
        );
        Ok(())
    }
}
