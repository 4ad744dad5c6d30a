//! Script plugin family: versioned entry points loaded from plugin
//! directories and invoked through a fault-capturing wrapper.
//!
//! Loading goes through the narrow [`ScriptEngine`] seam so nothing else
//! in the core depends on the mechanism. [`RegistryScriptEngine`] serves
//! embedders that compile their stages in; the `native-plugins` feature
//! adds a libloading-backed engine for shared-library stages.

use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tracing::error;

use dbd_core::error::{DbdError, Result};
use dbd_core::executor::ConcurrentExecutor;
use dbd_core::remote::{CommandResult, RemoteClient, Server};
use dbd_core::reporter::Reporter;

use crate::context::{Namespace, PluginContext, PluginReturn, EXCEPTION_KEY, RUN_RESULT_VAR};
use crate::types::{ClusterConfig, PluginDescriptor, Repository};

/// Positional and keyword-style arguments handed to an entry point. The
/// kwargs are the active namespace's variables merged under the caller's
/// overrides (overrides win on collision).
#[derive(Debug, Clone, Default)]
pub struct ScriptArgs {
    pub args: Vec<Value>,
    pub kwargs: HashMap<String, Value>,
}

impl ScriptArgs {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.kwargs.get(key)
    }
}

/// A resolved, invokable script entry point.
pub type ScriptFn = Arc<dyn Fn(&PluginContext, &ScriptArgs) -> anyhow::Result<()> + Send + Sync>;

/// Loading seam for script entry points. `load` resolves the executable
/// unit behind a descriptor; `release` drops one caller's registration so
/// an engine that holds process-wide state can unload on last use.
pub trait ScriptEngine: Send + Sync {
    fn load(&self, descriptor: &PluginDescriptor, entry: &str) -> Result<ScriptFn>;

    fn release(&self, _descriptor: &PluginDescriptor, _entry: &str) {}
}

/// In-process engine: stages registered as callables, resolved per
/// (component, script name) and memoized per version on first use. New
/// pipeline stages still mean a new flag file on disk; only the code body
/// lives here, discovery and version selection are unchanged.
#[derive(Default)]
pub struct RegistryScriptEngine {
    handlers: RwLock<HashMap<(String, String), ScriptFn>>,
    resolved: RwLock<HashMap<(String, String, String), ScriptFn>>,
}

impl RegistryScriptEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, component: &str, entry: &str, f: F)
    where
        F: Fn(&PluginContext, &ScriptArgs) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .expect("script registry poisoned")
            .insert((component.to_string(), entry.to_string()), Arc::new(f));
    }
}

impl ScriptEngine for RegistryScriptEngine {
    fn load(&self, descriptor: &PluginDescriptor, entry: &str) -> Result<ScriptFn> {
        let key = (
            descriptor.component_name.clone(),
            entry.to_string(),
            descriptor.version.to_string(),
        );
        if let Some(f) = self
            .resolved
            .read()
            .expect("script registry poisoned")
            .get(&key)
        {
            return Ok(f.clone());
        }

        let f = self
            .handlers
            .read()
            .expect("script registry poisoned")
            .get(&(descriptor.component_name.clone(), entry.to_string()))
            .cloned()
            .ok_or_else(|| {
                DbdError::Script(format!(
                    "no handler registered for {}/{}",
                    descriptor.component_name, entry
                ))
            })?;
        self.resolved
            .write()
            .expect("script registry poisoned")
            .insert(key, f.clone());
        Ok(f)
    }
}

/// Remote-client view handed to plugin bodies: every call carries the
/// invocation's muted reporter unless the caller supplies its own.
#[derive(Clone)]
pub struct ScriptClient {
    inner: Arc<dyn RemoteClient>,
    reporter: Reporter,
}

impl ScriptClient {
    pub(crate) fn new(inner: Arc<dyn RemoteClient>, reporter: Reporter) -> Self {
        ScriptClient { inner, reporter }
    }

    pub fn execute_command(&self, cmd: &str, timeout: Option<Duration>) -> Result<CommandResult> {
        self.inner.execute_command(cmd, timeout, &self.reporter)
    }

    /// Caller-supplied reporter wins over the injected one.
    pub fn execute_command_with(
        &self,
        cmd: &str,
        timeout: Option<Duration>,
        reporter: &Reporter,
    ) -> Result<CommandResult> {
        self.inner.execute_command(cmd, timeout, reporter)
    }

    pub fn inner(&self) -> &Arc<dyn RemoteClient> {
        &self.inner
    }
}

/// Everything the caller supplies for one invocation. The wrapper turns
/// this into a fresh [`PluginContext`].
pub struct PluginInput {
    pub namespace: Arc<Namespace>,
    pub namespaces: HashMap<String, Arc<Namespace>>,
    pub deploy_name: String,
    pub repositories: Vec<Repository>,
    pub components: Vec<String>,
    pub clients: BTreeMap<Server, Arc<dyn RemoteClient>>,
    pub cluster_config: ClusterConfig,
    pub cmds: Vec<String>,
    pub options: HashMap<String, Value>,
    pub reporter: Reporter,
    pub args: Vec<Value>,
    pub kwargs: HashMap<String, Value>,
}

impl PluginInput {
    pub fn new(namespace: Arc<Namespace>) -> Self {
        let mut namespaces = HashMap::new();
        namespaces.insert(namespace.name().to_string(), namespace.clone());
        PluginInput {
            namespace,
            namespaces,
            deploy_name: String::new(),
            repositories: Vec::new(),
            components: Vec::new(),
            clients: BTreeMap::new(),
            cluster_config: ClusterConfig::default(),
            cmds: Vec::new(),
            options: HashMap::new(),
            reporter: Reporter::new(),
            args: Vec::new(),
            kwargs: HashMap::new(),
        }
    }
}

/// A discovered script-stage plugin. `exec` drives the invocation state
/// machine: resolve the entry, build the context, run, capture faults into
/// the typed return, audit, release.
#[derive(Debug)]
pub struct ScriptPlugin {
    descriptor: PluginDescriptor,
    entry_name: String,
}

impl ScriptPlugin {
    pub fn new(descriptor: PluginDescriptor) -> Self {
        let entry_name = descriptor
            .plugin_type
            .script_name()
            .unwrap_or("start")
            .to_string();
        ScriptPlugin {
            descriptor,
            entry_name,
        }
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    pub fn entry_name(&self) -> &str {
        &self.entry_name
    }

    /// Invokes the plugin. Faults never propagate: every path degrades to
    /// a typed return and leaves one `run_result[<entry>]` audit record in
    /// the namespace.
    pub fn exec(&self, engine: &dyn ScriptEngine, input: PluginInput) -> PluginReturn {
        let PluginInput {
            namespace,
            namespaces,
            deploy_name,
            repositories,
            components,
            clients,
            cluster_config,
            cmds,
            options,
            reporter,
            args,
            kwargs,
        } = input;

        // CREATED -> IMPORTED
        let loaded = engine.load(&self.descriptor, &self.entry_name);
        let sub_reporter = reporter.sub();
        let decorated: BTreeMap<Server, ScriptClient> = clients
            .into_iter()
            .map(|(server, client)| (server, ScriptClient::new(client, sub_reporter.clone())))
            .collect();

        let ctx = PluginContext::new(
            self.entry_name.clone(),
            namespace.clone(),
            namespaces,
            deploy_name,
            repositories,
            components,
            decorated,
            cluster_config,
            cmds,
            options,
            self.descriptor.dev_mode,
            sub_reporter,
            ConcurrentExecutor::default(),
        );
        namespace.clear_return(&self.entry_name);

        // IMPORTED -> RUNNING
        let mut merged = namespace.variables();
        merged.extend(kwargs);
        let script_args = ScriptArgs {
            args,
            kwargs: merged,
        };

        let start = Instant::now();
        let mut run_ok = true;
        match loaded {
            Ok(entry) => {
                match panic::catch_unwind(AssertUnwindSafe(|| entry(&ctx, &script_args))) {
                    Ok(Ok(())) => {
                        // No explicit result and no recorded return is a
                        // failure, not a silent success.
                        if ctx.get_return(None, None).is_none() {
                            run_ok = false;
                            ctx.return_false();
                        }
                    }
                    Ok(Err(e)) => {
                        run_ok = false;
                        self.capture_fault(&ctx, &reporter, &e.to_string());
                    }
                    Err(payload) => {
                        run_ok = false;
                        self.capture_fault(&ctx, &reporter, &panic_message(&*payload));
                    }
                }
            }
            Err(e) => {
                run_ok = false;
                self.capture_fault(&ctx, &reporter, &e.to_string());
            }
        }
        let elapsed = start.elapsed().as_secs_f64();

        // RUNNING -> RETURNED: audit record, success or failure.
        let mut run_result = ctx
            .get_variable(RUN_RESULT_VAR, None)
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();
        run_result.insert(
            self.entry_name.clone(),
            json!({ "result": run_ok, "time": elapsed }),
        );
        ctx.set_variable(RUN_RESULT_VAR, Value::Object(run_result));

        let ret = ctx.get_return(None, None).unwrap_or_default();

        // RETURNED -> CLEANED_UP
        drop(ctx);
        engine.release(&self.descriptor, &self.entry_name);
        ret
    }

    fn capture_fault(&self, ctx: &PluginContext, reporter: &Reporter, message: &str) {
        let mut kwargs = HashMap::new();
        kwargs.insert(EXCEPTION_KEY.to_string(), json!(message));
        ctx.return_false_with(Vec::new(), kwargs);
        let diagnostic = format!("{} RuntimeError: {}", self.descriptor, message);
        reporter.exception(&diagnostic);
        error!("{}", diagnostic);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "plugin panicked".to_string()
    }
}

#[cfg(feature = "native-plugins")]
pub mod native {
    //! Shared-library script engine. A stage directory holds
    //! `<entry>.so` exposing [`PLUGIN_ENTRY_SYMBOL`]; libraries are
    //! reference-counted and unloaded when the last caller releases.

    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    use libloading::Library;

    use dbd_core::error::{DbdError, Result};

    use super::{ScriptArgs, ScriptEngine, ScriptFn};
    use crate::context::PluginContext;
    use crate::types::PluginDescriptor;

    /// Implemented by the object a plugin library's entry function hands
    /// back.
    pub trait ScriptEntry: Send + Sync {
        fn call(&self, ctx: &PluginContext, args: &ScriptArgs) -> anyhow::Result<()>;
    }

    pub type PluginEntryFn = unsafe extern "C" fn() -> Box<dyn ScriptEntry>;

    pub const PLUGIN_ENTRY_SYMBOL: &[u8] = b"dbd_plugin_entry";

    struct LoadedLibrary {
        library: Arc<Library>,
        refcount: usize,
    }

    #[derive(Default)]
    pub struct NativeScriptEngine {
        libraries: Mutex<HashMap<PathBuf, LoadedLibrary>>,
    }

    impl NativeScriptEngine {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl ScriptEngine for NativeScriptEngine {
        fn load(&self, descriptor: &PluginDescriptor, entry: &str) -> Result<ScriptFn> {
            let path = descriptor.path.join(format!("{}.so", entry));
            let mut libraries = self.libraries.lock().expect("library table poisoned");

            let library = match libraries.get_mut(&path) {
                Some(loaded) => {
                    loaded.refcount += 1;
                    loaded.library.clone()
                }
                None => {
                    let library = unsafe { Library::new(&path) }
                        .map_err(|e| DbdError::Script(format!("{}: {}", path.display(), e)))?;
                    let library = Arc::new(library);
                    libraries.insert(
                        path.clone(),
                        LoadedLibrary {
                            library: library.clone(),
                            refcount: 1,
                        },
                    );
                    library
                }
            };
            drop(libraries);

            let constructor = unsafe {
                *library
                    .get::<PluginEntryFn>(PLUGIN_ENTRY_SYMBOL)
                    .map_err(|e| DbdError::Script(format!("{}: {}", path.display(), e)))?
            };
            let instance = unsafe { constructor() };

            // The closure keeps the library mapped for as long as any
            // caller still holds the resolved entry.
            let keep_alive = library;
            Ok(Arc::new(move |ctx, args| {
                let _mapped = &keep_alive;
                instance.call(ctx, args)
            }))
        }

        fn release(&self, descriptor: &PluginDescriptor, entry: &str) {
            let path = descriptor.path.join(format!("{}.so", entry));
            let mut libraries = self.libraries.lock().expect("library table poisoned");
            if let Some(loaded) = libraries.get_mut(&path) {
                loaded.refcount -= 1;
                if loaded.refcount == 0 {
                    libraries.remove(&path);
                }
            }
        }
    }

}
