//! Per-component plugin discovery and best-version selection.
//!
//! Layout contract: `<plugins_root>/<component>/<version>/<flag-file>`.
//! Directory names are version strings; anything that fails the version
//! grammar is excluded from candidacy.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::install::InstallPlugin;
use crate::param::ParamPlugin;
use crate::script::ScriptPlugin;
use crate::snap::SnapConfigPlugin;
use crate::types::{Plugin, PluginDescriptor, PluginType};
use crate::version::Version;

/// Discovers on-disk plugin units for one (component, plugin type) pair.
///
/// The descriptor cache is keyed by flag-file path and only ever grows;
/// it is never invalidated within a process lifetime. That trades
/// staleness for simplicity: plugin directories change on `update`, which
/// restarts the process.
pub struct ComponentPluginLoader {
    path: PathBuf,
    component_name: String,
    plugin_type: PluginType,
    dev_mode: bool,
    plugins: HashMap<PathBuf, Arc<Plugin>>,
}

impl ComponentPluginLoader {
    pub fn new(component_dir: impl Into<PathBuf>, plugin_type: PluginType, dev_mode: bool) -> Self {
        let path = component_dir.into();
        let component_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        ComponentPluginLoader {
            path,
            component_name,
            plugin_type,
            dev_mode,
            plugins: HashMap::new(),
        }
    }

    pub fn component_name(&self) -> &str {
        &self.component_name
    }

    /// Scans the component directory and returns every currently known
    /// plugin, newly discovered ones included.
    pub fn list_plugins(&mut self) -> Vec<Arc<Plugin>> {
        let flag_file = self.plugin_type.flag_file().into_owned();
        let mut plugins = Vec::new();

        let entries = match fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(_) => return plugins,
        };
        let mut version_dirs: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        version_dirs.sort();

        for dir in version_dirs {
            let flag_path = dir.join(&flag_file);
            if !flag_path.exists() {
                continue;
            }
            if let Some(plugin) = self.plugins.get(&flag_path) {
                plugins.push(plugin.clone());
                continue;
            }
            let version = match parse_version_dir(&dir) {
                Some(version) => version,
                None => {
                    debug!(
                        "{}: skipping non-version directory {:?}",
                        self.component_name, dir
                    );
                    continue;
                }
            };
            let descriptor = PluginDescriptor::new(
                self.component_name.clone(),
                self.plugin_type.clone(),
                version,
                dir,
                self.dev_mode,
            );
            let plugin = Arc::new(self.build_plugin(descriptor));
            self.plugins.insert(flag_path, plugin.clone());
            plugins.push(plugin);
        }
        plugins
    }

    /// Best candidate for a requested version: an exact match wins
    /// outright; otherwise the maximum among strictly older candidates.
    /// Never falls forward to a newer version.
    pub fn best_plugin(&mut self, version: &Version) -> Option<Arc<Plugin>> {
        let mut candidates = Vec::new();
        for plugin in self.list_plugins() {
            if plugin.version() == version {
                return Some(plugin);
            }
            if plugin.version() < version {
                candidates.push(plugin);
            }
        }
        candidates.into_iter().max_by(|a, b| a.version().cmp(b.version()))
    }

    fn build_plugin(&self, descriptor: PluginDescriptor) -> Plugin {
        match &self.plugin_type {
            PluginType::Param => Plugin::Param(ParamPlugin::new(descriptor)),
            PluginType::Install => Plugin::Install(InstallPlugin::new(descriptor)),
            PluginType::SnapConfig => Plugin::SnapConfig(SnapConfigPlugin::new(descriptor)),
            PluginType::Start | PluginType::Script(_) => {
                Plugin::Script(ScriptPlugin::new(descriptor))
            }
        }
    }
}

fn parse_version_dir(dir: &Path) -> Option<Version> {
    let name = dir.file_name()?.to_str()?;
    Version::parse(name).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_plugin_dir(root: &Path, component: &str, version: &str, flag: &str) {
        let dir = root.join(component).join(version);
        fs::create_dir_all(&dir).expect("should create plugin dir");
        fs::write(dir.join(flag), b"").expect("should create flag file");
    }

    fn loader(root: &Path, component: &str, plugin_type: PluginType) -> ComponentPluginLoader {
        ComponentPluginLoader::new(root.join(component), plugin_type, false)
    }

    #[test]
    fn test_list_plugins_finds_flagged_versions() {
        let root = TempDir::new().unwrap();
        create_plugin_dir(root.path(), "oceanbase-ce", "1.0.0", "start.so");
        create_plugin_dir(root.path(), "oceanbase-ce", "2.0.0", "start.so");
        // Param flag only; invisible to a Start loader.
        create_plugin_dir(root.path(), "oceanbase-ce", "3.0.0", "parameter.yaml");

        let mut loader = loader(root.path(), "oceanbase-ce", PluginType::Start);
        let plugins = loader.list_plugins();
        assert_eq!(plugins.len(), 2);
        for plugin in &plugins {
            assert_eq!(plugin.component_name(), "oceanbase-ce");
        }
    }

    #[test]
    fn test_cache_reuses_descriptors() {
        let root = TempDir::new().unwrap();
        create_plugin_dir(root.path(), "obagent", "1.0.0", "parameter.yaml");

        let mut loader = loader(root.path(), "obagent", PluginType::Param);
        let first = loader.list_plugins();
        let second = loader.list_plugins();
        assert!(Arc::ptr_eq(&first[0], &second[0]));

        // Cache grows monotonically as new versions appear on disk.
        create_plugin_dir(root.path(), "obagent", "2.0.0", "parameter.yaml");
        assert_eq!(loader.list_plugins().len(), 2);
    }

    #[test]
    fn test_non_version_directories_excluded() {
        let root = TempDir::new().unwrap();
        create_plugin_dir(root.path(), "obagent", "1.0.0", "parameter.yaml");
        create_plugin_dir(root.path(), "obagent", "draft", "parameter.yaml");

        let mut loader = loader(root.path(), "obagent", PluginType::Param);
        assert_eq!(loader.list_plugins().len(), 1);
    }

    #[test]
    fn test_best_plugin_selection() {
        let root = TempDir::new().unwrap();
        for version in ["1.0.0", "2.0.0", "3.0.0"] {
            create_plugin_dir(root.path(), "oceanbase-ce", version, "start.so");
        }
        let mut loader = loader(root.path(), "oceanbase-ce", PluginType::Start);

        // Exact match wins.
        let exact = loader.best_plugin(&Version::parse("2.0.0").unwrap()).unwrap();
        assert_eq!(exact.version(), &Version::parse("2.0.0").unwrap());

        // Otherwise the greatest strictly-older candidate.
        let best = loader.best_plugin(&Version::parse("2.5.0").unwrap()).unwrap();
        assert_eq!(best.version(), &Version::parse("2.0.0").unwrap());

        // Never a newer version than requested.
        assert!(loader.best_plugin(&Version::parse("0.5.0").unwrap()).is_none());
    }

    #[test]
    fn test_missing_component_directory() {
        let root = TempDir::new().unwrap();
        let mut loader = loader(root.path(), "nonexistent", PluginType::Start);
        assert!(loader.list_plugins().is_empty());
        assert!(loader.best_plugin(&Version::parse("1.0.0").unwrap()).is_none());
    }
}
