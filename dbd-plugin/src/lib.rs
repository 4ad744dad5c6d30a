pub mod context;
pub mod discovery;
pub mod install;
pub mod manager;
pub mod param;
pub mod script;
pub mod snap;
pub mod types;
pub mod version;

pub use context::{Namespace, PluginContext, PluginReturn, EXCEPTION_KEY, RUN_RESULT_VAR};
pub use discovery::ComponentPluginLoader;
pub use install::{FileItem, FileItemType, InstallMethod, InstallPlugin};
pub use manager::PluginManager;
pub use param::ParamPlugin;
pub use script::{
    PluginInput, RegistryScriptEngine, ScriptArgs, ScriptEngine, ScriptFn, ScriptPlugin,
};
pub use snap::SnapConfigPlugin;
pub use types::{ClusterConfig, Plugin, PluginDescriptor, PluginType, Repository};
pub use version::Version;
