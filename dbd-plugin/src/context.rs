//! Per-invocation plugin state: the namespace variable store, typed
//! return values, and the context object handed to every entry point.
//!
//! The pipeline runs one plugin at a time, so namespace access is
//! temporally exclusive; the locks below exist because a plugin body may
//! touch its context from fanned-out worker threads.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use serde_json::Value;

use dbd_core::executor::ConcurrentExecutor;
use dbd_core::remote::Server;
use dbd_core::reporter::Reporter;

use crate::script::ScriptClient;
use crate::types::{ClusterConfig, Repository};

/// Reserved kwarg under which a captured fault travels in a failed return.
pub const EXCEPTION_KEY: &str = "exception";

/// Reserved namespace variable holding the per-stage audit map:
/// `run_result[<script_name>] = {result, time}` for every invocation.
pub const RUN_RESULT_VAR: &str = "run_result";

/// The sole channel by which one pipeline stage hands results to the
/// next. Truthiness is the success flag.
#[derive(Debug, Clone, Default)]
pub struct PluginReturn {
    success: bool,
    args: Vec<Value>,
    kwargs: HashMap<String, Value>,
}

impl PluginReturn {
    pub fn new(success: bool, args: Vec<Value>, kwargs: HashMap<String, Value>) -> Self {
        PluginReturn {
            success,
            args,
            kwargs,
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn kwargs(&self) -> &HashMap<String, Value> {
        &self.kwargs
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.kwargs.get(key)
    }
}

/// A named scope of shared variables plus one return slot per plugin
/// name. Several namespaces coexist per pipeline run; cross-namespace
/// reads go through the explicit selectors on [`PluginContext`].
#[derive(Debug)]
pub struct Namespace {
    name: String,
    variables: RwLock<HashMap<String, Value>>,
    returns: RwLock<HashMap<String, Option<PluginReturn>>>,
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Namespace {
            name: name.into(),
            variables: RwLock::new(HashMap::new()),
            returns: RwLock::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_variable(&self, name: &str) -> Option<Value> {
        self.variables
            .read()
            .expect("namespace variables poisoned")
            .get(name)
            .cloned()
    }

    pub fn set_variable(&self, name: impl Into<String>, value: Value) {
        self.variables
            .write()
            .expect("namespace variables poisoned")
            .insert(name.into(), value);
    }

    /// Snapshot of all variables, used to seed entry-point kwargs.
    pub fn variables(&self) -> HashMap<String, Value> {
        self.variables
            .read()
            .expect("namespace variables poisoned")
            .clone()
    }

    pub fn get_return(&self, plugin_name: &str) -> Option<PluginReturn> {
        self.returns
            .read()
            .expect("namespace returns poisoned")
            .get(plugin_name)
            .and_then(|slot| slot.clone())
    }

    pub fn set_return(&self, plugin_name: impl Into<String>, ret: PluginReturn) {
        self.returns
            .write()
            .expect("namespace returns poisoned")
            .insert(plugin_name.into(), Some(ret));
    }

    /// Empties a plugin's slot ahead of a fresh invocation so a stale
    /// result can never satisfy the current one.
    pub fn clear_return(&self, plugin_name: impl Into<String>) {
        self.returns
            .write()
            .expect("namespace returns poisoned")
            .insert(plugin_name.into(), None);
    }
}

/// Everything a plugin entry point sees. Built fresh per invocation and
/// dropped when it completes; the recorded return outlives it in the
/// namespace.
pub struct PluginContext {
    plugin_name: String,
    namespace: Arc<Namespace>,
    namespaces: HashMap<String, Arc<Namespace>>,
    pub deploy_name: String,
    pub repositories: Vec<Repository>,
    pub components: Vec<String>,
    pub clients: BTreeMap<Server, ScriptClient>,
    pub cluster_config: ClusterConfig,
    pub cmds: Vec<String>,
    pub options: HashMap<String, Value>,
    pub dev_mode: bool,
    pub stdio: Reporter,
    pub executor: ConcurrentExecutor,
}

impl PluginContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        plugin_name: String,
        namespace: Arc<Namespace>,
        namespaces: HashMap<String, Arc<Namespace>>,
        deploy_name: String,
        repositories: Vec<Repository>,
        components: Vec<String>,
        clients: BTreeMap<Server, ScriptClient>,
        cluster_config: ClusterConfig,
        cmds: Vec<String>,
        options: HashMap<String, Value>,
        dev_mode: bool,
        stdio: Reporter,
        executor: ConcurrentExecutor,
    ) -> Self {
        PluginContext {
            plugin_name,
            namespace,
            namespaces,
            deploy_name,
            repositories,
            components,
            clients,
            cluster_config,
            cmds,
            options,
            dev_mode,
            stdio,
            executor,
        }
    }

    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    pub fn namespace(&self) -> &Arc<Namespace> {
        &self.namespace
    }

    /// Two-level lookup: explicit namespace selector, then variable name.
    /// A missing namespace or variable both come back as `None`.
    pub fn get_variable(&self, name: &str, spacename: Option<&str>) -> Option<Value> {
        self.select_namespace(spacename)?.get_variable(name)
    }

    pub fn set_variable(&self, name: impl Into<String>, value: Value) {
        self.namespace.set_variable(name, value);
    }

    /// Reads a recorded return; defaults to this plugin's own slot in the
    /// active namespace.
    pub fn get_return(
        &self,
        plugin_name: Option<&str>,
        spacename: Option<&str>,
    ) -> Option<PluginReturn> {
        let namespace = self.select_namespace(spacename)?;
        namespace.get_return(plugin_name.unwrap_or(&self.plugin_name))
    }

    pub fn return_true(&self) {
        self.record_return(true, Vec::new(), HashMap::new());
    }

    pub fn return_true_with(&self, args: Vec<Value>, kwargs: HashMap<String, Value>) {
        self.record_return(true, args, kwargs);
    }

    pub fn return_false(&self) {
        self.record_return(false, Vec::new(), HashMap::new());
    }

    pub fn return_false_with(&self, args: Vec<Value>, kwargs: HashMap<String, Value>) {
        self.record_return(false, args, kwargs);
    }

    fn record_return(&self, success: bool, args: Vec<Value>, kwargs: HashMap<String, Value>) {
        self.namespace
            .set_return(&self.plugin_name, PluginReturn::new(success, args, kwargs));
    }

    fn select_namespace(&self, spacename: Option<&str>) -> Option<&Arc<Namespace>> {
        match spacename {
            Some(name) => self.namespaces.get(name),
            None => Some(&self.namespace),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plugin_return_truthiness() {
        assert!(!PluginReturn::default().success());
        let ret = PluginReturn::new(true, vec![json!(1)], HashMap::new());
        assert!(ret.success());
        assert_eq!(ret.args(), &[json!(1)]);
    }

    #[test]
    fn test_namespace_variables() {
        let ns = Namespace::new("deploy");
        assert_eq!(ns.get_variable("port"), None);
        ns.set_variable("port", json!(2881));
        assert_eq!(ns.get_variable("port"), Some(json!(2881)));

        let snapshot = ns.variables();
        assert_eq!(snapshot.get("port"), Some(&json!(2881)));
    }

    #[test]
    fn test_namespace_return_slots() {
        let ns = Namespace::new("deploy");
        assert!(ns.get_return("start").is_none());

        ns.set_return("start", PluginReturn::new(true, Vec::new(), HashMap::new()));
        assert!(ns.get_return("start").unwrap().success());

        // Cleared slot reads as absent, not as the stale value.
        ns.clear_return("start");
        assert!(ns.get_return("start").is_none());
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let a = Namespace::new("stage-a");
        let b = Namespace::new("stage-b");
        a.set_variable("key", json!("from-a"));
        assert_eq!(b.get_variable("key"), None);
        assert_eq!(a.get_variable("key"), Some(json!("from-a")));
    }
}
