use std::fs;
use std::path::PathBuf;

use once_cell::sync::OnceCell;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use dbd_core::error::Result;

use crate::types::{PluginDescriptor, PluginType};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnapConfig {
    #[serde(default)]
    pub backup: Vec<Value>,
    #[serde(default)]
    pub clean: Vec<Value>,
}

/// Snapshot-configuration plugin: declares which component paths get
/// backed up and which get cleaned when snapshotting. The flag file's
/// content hash identifies the configuration across runs.
#[derive(Debug)]
pub struct SnapConfigPlugin {
    descriptor: PluginDescriptor,
    config: OnceCell<SnapConfig>,
    content_hash: OnceCell<String>,
}

impl SnapConfigPlugin {
    pub fn new(descriptor: PluginDescriptor) -> Self {
        SnapConfigPlugin {
            descriptor,
            config: OnceCell::new(),
            content_hash: OnceCell::new(),
        }
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn config_path(&self) -> PathBuf {
        self.descriptor
            .path
            .join(PluginType::SnapConfig.flag_file().as_ref())
    }

    pub fn config(&self) -> Result<&SnapConfig> {
        self.config.get_or_try_init(|| {
            let raw = fs::read_to_string(self.config_path())?;
            Ok(serde_yaml_ng::from_str(&raw)?)
        })
    }

    pub fn backup(&self) -> Result<&[Value]> {
        Ok(&self.config()?.backup)
    }

    pub fn clean(&self) -> Result<&[Value]> {
        Ok(&self.config()?.clean)
    }

    /// Hex SHA-256 of the flag file, computed once.
    pub fn content_hash(&self) -> Result<&str> {
        self.content_hash
            .get_or_try_init(|| {
                let bytes = fs::read(self.config_path())?;
                let digest = Sha256::digest(&bytes);
                Ok(format!("{:x}", digest))
            })
            .map(String::as_str)
    }
}
