// Worker metadata resolved from its manifest (e.g. package.json).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::SpawnError;

const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerManifest {
    pub path: PathBuf,
    pub name: String,
    pub version: String,
}

#[derive(Deserialize)]
struct RawManifest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

impl WorkerManifest {
    /// Reads `<worker_path>/<manifest_file>`. Missing `name`/`version` default to
    /// `"unknown"`; a missing directory, missing file or malformed JSON fails.
    pub fn resolve(worker_path: &Path, manifest_file: &str) -> Result<Self, SpawnError> {
        if !worker_path.is_dir() {
            return Err(SpawnError::InvalidWorkerPath(worker_path.to_path_buf()));
        }
        let manifest_path = worker_path.join(manifest_file);
        if !manifest_path.is_file() {
            return Err(SpawnError::ManifestMissing(manifest_path));
        }
        let content = std::fs::read_to_string(&manifest_path).map_err(|source| {
            SpawnError::ManifestUnreadable {
                path: manifest_path.clone(),
                source,
            }
        })?;
        let raw: RawManifest =
            serde_json::from_str(&content).map_err(|source| SpawnError::ManifestInvalid {
                path: manifest_path.clone(),
                source,
            })?;

        Ok(Self {
            path: worker_path.to_path_buf(),
            name: raw.name.unwrap_or_else(|| UNKNOWN.into()),
            version: raw.version.unwrap_or_else(|| UNKNOWN.into()),
        })
    }
}
