use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::discovery::ComponentPluginLoader;
use crate::types::{Plugin, PluginType};
use crate::version::Version;

/// Façade over per-component loaders.
///
/// Loaders are created lazily per (plugin type, component) and cached for
/// the manager's lifetime; a parallel cache keyed by (script name,
/// component) serves dynamically named script stages. Neither cache is
/// ever evicted. Own one `PluginManager` per process and pass it around;
/// the caches are deliberate long-lived state, not hidden globals.
pub struct PluginManager {
    plugins_root: PathBuf,
    dev_mode: bool,
    loaders: HashMap<(PluginType, String), ComponentPluginLoader>,
    script_loaders: HashMap<(String, String), ComponentPluginLoader>,
}

impl PluginManager {
    pub fn new(plugins_root: impl Into<PathBuf>, dev_mode: bool) -> Self {
        PluginManager {
            plugins_root: plugins_root.into(),
            dev_mode,
            loaders: HashMap::new(),
            script_loaders: HashMap::new(),
        }
    }

    pub fn plugins_root(&self) -> &PathBuf {
        &self.plugins_root
    }

    /// Best match for one of the registered plugin types. Script types go
    /// through [`Self::best_script_plugin`] so their loaders land in the
    /// script cache.
    pub fn best_plugin(
        &mut self,
        plugin_type: PluginType,
        component_name: &str,
        version: &Version,
    ) -> Option<Arc<Plugin>> {
        if let PluginType::Script(name) = &plugin_type {
            let name = name.clone();
            return self.best_script_plugin(&name, component_name, version);
        }

        let key = (plugin_type.clone(), component_name.to_string());
        let component_dir = self.plugins_root.join(component_name);
        let dev_mode = self.dev_mode;
        let loader = self
            .loaders
            .entry(key)
            .or_insert_with(|| ComponentPluginLoader::new(component_dir, plugin_type, dev_mode));
        loader.best_plugin(version)
    }

    /// Best match for a dynamically named script stage. A new stage needs
    /// nothing beyond its flag file in the plugin repository; no type is
    /// registered anywhere in the core.
    pub fn best_script_plugin(
        &mut self,
        script_name: &str,
        component_name: &str,
        version: &Version,
    ) -> Option<Arc<Plugin>> {
        let key = (script_name.to_string(), component_name.to_string());
        let component_dir = self.plugins_root.join(component_name);
        let dev_mode = self.dev_mode;
        let loader = self.script_loaders.entry(key).or_insert_with(|| {
            ComponentPluginLoader::new(
                component_dir,
                PluginType::Script(script_name.to_string()),
                dev_mode,
            )
        });
        loader.best_plugin(version)
    }
}
