use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

use serde_json::Value;

use dbd_core::remote::Server;

use crate::install::InstallPlugin;
use crate::param::ParamPlugin;
use crate::script::ScriptPlugin;
use crate::snap::SnapConfigPlugin;
use crate::version::Version;

/// Plugin type discriminator. Script stages are value-parameterized by
/// their name: a new pipeline stage is a new flag file on disk, never a
/// new variant here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PluginType {
    Start,
    Param,
    Install,
    SnapConfig,
    Script(String),
}

impl PluginType {
    /// The marker file whose presence identifies a version directory as
    /// holding a plugin of this type.
    pub fn flag_file(&self) -> Cow<'static, str> {
        match self {
            PluginType::Start => Cow::Borrowed("start.so"),
            PluginType::Param => Cow::Borrowed("parameter.yaml"),
            PluginType::Install => Cow::Borrowed("file_map.yaml"),
            PluginType::SnapConfig => Cow::Borrowed("snap_config.yaml"),
            PluginType::Script(name) => Cow::Owned(format!("{}.so", name)),
        }
    }

    /// Entry-point name for the script plugin family, `None` for the
    /// declarative types.
    pub fn script_name(&self) -> Option<&str> {
        match self {
            PluginType::Start => Some("start"),
            PluginType::Script(name) => Some(name),
            _ => None,
        }
    }
}

impl Display for PluginType {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            PluginType::Start => write!(f, "start"),
            PluginType::Param => write!(f, "param"),
            PluginType::Install => write!(f, "install"),
            PluginType::SnapConfig => write!(f, "snap_config"),
            PluginType::Script(name) => write!(f, "{}", name),
        }
    }
}

/// One discovered plugin unit. Identity is (component, type, path);
/// everything else is immutable after construction.
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    pub component_name: String,
    pub plugin_type: PluginType,
    pub version: Version,
    pub path: PathBuf,
    pub dev_mode: bool,
}

impl PluginDescriptor {
    pub fn new(
        component_name: impl Into<String>,
        plugin_type: PluginType,
        version: Version,
        path: PathBuf,
        dev_mode: bool,
    ) -> Self {
        PluginDescriptor {
            component_name: component_name.into(),
            plugin_type,
            version,
            path,
            dev_mode,
        }
    }
}

impl Display for PluginDescriptor {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}",
            self.component_name, self.plugin_type, self.version
        )
    }
}

/// A loaded plugin of any type, as handed out by the loaders.
#[derive(Debug)]
pub enum Plugin {
    Script(ScriptPlugin),
    Param(ParamPlugin),
    Install(InstallPlugin),
    SnapConfig(SnapConfigPlugin),
}

impl Plugin {
    pub fn descriptor(&self) -> &PluginDescriptor {
        match self {
            Plugin::Script(p) => p.descriptor(),
            Plugin::Param(p) => p.descriptor(),
            Plugin::Install(p) => p.descriptor(),
            Plugin::SnapConfig(p) => p.descriptor(),
        }
    }

    pub fn component_name(&self) -> &str {
        &self.descriptor().component_name
    }

    pub fn version(&self) -> &Version {
        &self.descriptor().version
    }

    pub fn as_script(&self) -> Option<&ScriptPlugin> {
        match self {
            Plugin::Script(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_param(&self) -> Option<&ParamPlugin> {
        match self {
            Plugin::Param(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_install(&self) -> Option<&InstallPlugin> {
        match self {
            Plugin::Install(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_snap_config(&self) -> Option<&SnapConfigPlugin> {
        match self {
            Plugin::SnapConfig(p) => Some(p),
            _ => None,
        }
    }
}

/// An installed, versioned software package backing a component. Field
/// values feed `$var` substitution in install file maps.
#[derive(Debug, Clone)]
pub struct Repository {
    pub name: String,
    pub version: Version,
    pub release: Option<String>,
    pub arch: Option<String>,
    pub md5: Option<String>,
}

impl Repository {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Repository {
            name: name.into(),
            version,
            release: None,
            arch: None,
            md5: None,
        }
    }
}

/// Shared cluster configuration visible to every plugin in a run:
/// global key/values with optional per-server overrides.
#[derive(Debug, Clone, Default)]
pub struct ClusterConfig {
    pub name: String,
    pub servers: Vec<Server>,
    pub global: HashMap<String, Value>,
    pub server_overrides: HashMap<Server, HashMap<String, Value>>,
}

impl ClusterConfig {
    pub fn get_global(&self, key: &str) -> Option<&Value> {
        self.global.get(key)
    }

    /// Per-server override first, then the global value.
    pub fn get_server(&self, server: &Server, key: &str) -> Option<&Value> {
        self.server_overrides
            .get(server)
            .and_then(|overrides| overrides.get(key))
            .or_else(|| self.global.get(key))
    }
}
