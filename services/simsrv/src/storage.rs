//! Device configuration persistence
//!
//! Devices and templates are stored as one JSON file per configuration,
//! keyed by file name, in two sibling directories under the data root.

use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::device::DeviceConfig;
use crate::error::{Result, SimSrvError};

/// Which collection a stored configuration belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Device,
    Template,
}

impl DeviceKind {
    pub fn dir_name(&self) -> &'static str {
        match self {
            DeviceKind::Device => "devices",
            DeviceKind::Template => "templates",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Device => "device",
            DeviceKind::Template => "template",
        }
    }
}

/// Persistence collaborator consumed by the device manager
#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn load(&self, kind: DeviceKind, file_name: &str) -> Result<DeviceConfig>;
    async fn save(&self, kind: DeviceKind, file_name: &str, config: &DeviceConfig) -> Result<()>;
    async fn delete(&self, kind: DeviceKind, file_name: &str) -> Result<()>;
    async fn list(&self, kind: DeviceKind) -> Result<Vec<String>>;
}

/// JSON-file-per-device store
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for kind in [DeviceKind::Device, DeviceKind::Template] {
            fs::create_dir_all(root.join(kind.dir_name()))?;
        }
        Ok(Self { root })
    }

    fn path(&self, kind: DeviceKind, file_name: &str) -> PathBuf {
        self.root
            .join(kind.dir_name())
            .join(format!("{file_name}.json"))
    }
}

#[async_trait]
impl DeviceStore for JsonFileStore {
    async fn load(&self, kind: DeviceKind, file_name: &str) -> Result<DeviceConfig> {
        let path = self.path(kind, file_name);
        let content = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SimSrvError::DeviceNotFound(file_name.to_string())
            } else {
                SimSrvError::Io(e)
            }
        })?;

        serde_json::from_str(&content).map_err(|e| {
            SimSrvError::Parse(format!(
                "{} '{file_name}': {e}",
                kind.as_str()
            ))
        })
    }

    async fn save(&self, kind: DeviceKind, file_name: &str, config: &DeviceConfig) -> Result<()> {
        let path = self.path(kind, file_name);
        let content = serde_json::to_string_pretty(config)?;

        // write-then-rename keeps a crash from leaving a torn file behind
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    async fn delete(&self, kind: DeviceKind, file_name: &str) -> Result<()> {
        fs::remove_file(self.path(kind, file_name)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SimSrvError::DeviceNotFound(file_name.to_string())
            } else {
                SimSrvError::Io(e)
            }
        })
    }

    async fn list(&self, kind: DeviceKind) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.root.join(kind.dir_name()))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
