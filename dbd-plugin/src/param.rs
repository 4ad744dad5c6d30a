use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use serde_json::Value;
use tracing::warn;

use dbd_config::item::{ConfigItem, ParamSpec};
use dbd_core::error::Result;

use crate::types::{PluginDescriptor, PluginType};

/// Parameter-declaration plugin: one `parameter.yaml` per component
/// version, parsed once and cached for the descriptor's lifetime.
///
/// Individual malformed item declarations are skipped with a warning so a
/// single bad entry cannot take the whole component's parameter table
/// down with it.
#[derive(Debug)]
pub struct ParamPlugin {
    descriptor: PluginDescriptor,
    params: OnceCell<IndexMap<String, ConfigItem>>,
}

impl ParamPlugin {
    pub fn new(descriptor: PluginDescriptor) -> Self {
        ParamPlugin {
            descriptor,
            params: OnceCell::new(),
        }
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn params_path(&self) -> PathBuf {
        self.descriptor
            .path
            .join(PluginType::Param.flag_file().as_ref())
    }

    /// The declared parameter table, in declaration order.
    pub fn params(&self) -> Result<&IndexMap<String, ConfigItem>> {
        self.params.get_or_try_init(|| {
            let path = self.params_path();
            let raw = fs::read_to_string(&path)?;
            let specs: Vec<serde_yaml_ng::Value> = serde_yaml_ng::from_str(&raw)?;

            let mut items = IndexMap::new();
            for spec in specs {
                let parsed: std::result::Result<ParamSpec, _> = serde_yaml_ng::from_value(spec);
                match parsed.map_err(Into::into).and_then(ConfigItem::from_spec) {
                    Ok(item) => {
                        items.insert(item.name.clone(), item);
                    }
                    Err(e) => {
                        warn!("{}: skipping parameter declaration: {}", self.descriptor, e);
                    }
                }
            }
            Ok(items)
        })
    }

    pub fn get(&self, name: &str) -> Result<Option<&ConfigItem>> {
        Ok(self.params()?.get(name))
    }

    /// Items whose change forces a redeploy.
    pub fn redeploy_params(&self) -> Result<Vec<&ConfigItem>> {
        Ok(self
            .params()?
            .values()
            .filter(|item| item.need_redeploy)
            .collect())
    }

    /// Items whose change forces a restart.
    pub fn restart_params(&self) -> Result<Vec<&ConfigItem>> {
        Ok(self
            .params()?
            .values()
            .filter(|item| item.need_restart)
            .collect())
    }

    /// Items carrying a post-startup modify limit.
    pub fn modify_limit_params(&self) -> Result<Vec<&ConfigItem>> {
        Ok(self
            .params()?
            .values()
            .filter(|item| item.has_modify_limit())
            .collect())
    }

    /// Declared defaults, raw (not normalized).
    pub fn params_default(&self) -> Result<HashMap<String, Option<Value>>> {
        Ok(self
            .params()?
            .values()
            .map(|item| (item.name.clone(), item.default.clone()))
            .collect())
    }
}
