use std::fs;
use std::path::Path;

use tempfile::TempDir;

use dbd_plugin::{PluginManager, PluginType, Version};

fn create_plugin_dir(root: &Path, component: &str, version: &str, flags: &[&str]) {
    let dir = root.join(component).join(version);
    fs::create_dir_all(&dir).expect("should create plugin dir");
    for flag in flags {
        fs::write(dir.join(flag), b"").expect("should create flag file");
    }
}

fn v(s: &str) -> Version {
    Version::parse(s).expect("should parse version")
}

#[test]
fn test_resolution_across_components_and_types() -> anyhow::Result<()> {
    let root = TempDir::new()?;
    create_plugin_dir(
        root.path(),
        "oceanbase-ce",
        "4.0.0.0",
        &["start.so", "parameter.yaml", "file_map.yaml"],
    );
    create_plugin_dir(root.path(), "oceanbase-ce", "4.2.2.0", &["start.so"]);
    create_plugin_dir(root.path(), "obagent", "1.3.0", &["parameter.yaml"]);

    let mut manager = PluginManager::new(root.path(), false);

    // Exact version resolves to itself.
    let start = manager
        .best_plugin(PluginType::Start, "oceanbase-ce", &v("4.2.2.0"))
        .expect("should find start plugin");
    assert_eq!(start.version(), &v("4.2.2.0"));

    // A newer running component falls back to the best older plugin.
    let start = manager
        .best_plugin(PluginType::Start, "oceanbase-ce", &v("4.3.0.0"))
        .expect("should fall back");
    assert_eq!(start.version(), &v("4.2.2.0"));

    // Declarative types resolve independently of the script family.
    let param = manager
        .best_plugin(PluginType::Param, "oceanbase-ce", &v("4.1.0.0"))
        .expect("should find param plugin");
    assert_eq!(param.version(), &v("4.0.0.0"));
    assert!(param.as_param().is_some());

    // Components never see each other's plugins.
    assert!(manager
        .best_plugin(PluginType::Param, "obagent", &v("1.0.0"))
        .is_none());
    let agent_param = manager
        .best_plugin(PluginType::Param, "obagent", &v("1.3.0"))
        .expect("should find obagent param");
    assert_eq!(agent_param.component_name(), "obagent");
    Ok(())
}

#[test]
fn test_older_request_than_any_plugin_is_not_found() -> anyhow::Result<()> {
    let root = TempDir::new()?;
    for version in ["1.0.0", "2.0.0", "3.0.0"] {
        create_plugin_dir(root.path(), "ob-configserver", version, &["start.so"]);
    }

    let mut manager = PluginManager::new(root.path(), false);
    assert!(manager
        .best_plugin(PluginType::Start, "ob-configserver", &v("0.5.0"))
        .is_none());

    let best = manager
        .best_plugin(PluginType::Start, "ob-configserver", &v("2.5.0"))
        .expect("should find 2.0.0");
    assert_eq!(best.version(), &v("2.0.0"));
    Ok(())
}

#[test]
fn test_new_stage_is_just_a_file_on_disk() -> anyhow::Result<()> {
    let root = TempDir::new()?;
    create_plugin_dir(root.path(), "tpcc", "5.7", &["run_test.so"]);

    let mut manager = PluginManager::new(root.path(), false);
    let plugin = manager
        .best_script_plugin("run_test", "tpcc", &v("5.7"))
        .expect("should resolve dynamic stage");
    let script = plugin.as_script().expect("should be a script plugin");
    assert_eq!(script.entry_name(), "run_test");
    assert_eq!(
        script.descriptor().plugin_type,
        PluginType::Script("run_test".to_string())
    );

    // Unknown stages stay unknown.
    assert!(manager
        .best_script_plugin("no_such_stage", "tpcc", &v("5.7"))
        .is_none());
    Ok(())
}

#[test]
fn test_param_plugin_content_loads_through_manager() -> anyhow::Result<()> {
    let root = TempDir::new()?;
    let dir = root.path().join("oceanbase-ce").join("4.0.0.0");
    fs::create_dir_all(&dir)?;
    fs::write(
        dir.join("parameter.yaml"),
        r#"
- name: memory_limit
  type: CAPACITY
  default: 8G
  min_value: 1G
- name: cpu_count
  type: INT
  default: 0
"#,
    )?;

    let mut manager = PluginManager::new(root.path(), false);
    let plugin = manager
        .best_plugin(PluginType::Param, "oceanbase-ce", &v("4.0.0.0"))
        .expect("should resolve param plugin");
    let param = plugin.as_param().expect("should be a param plugin");

    let params = param.params().expect("should parse parameter.yaml");
    assert_eq!(params.len(), 2);
    assert!(params
        .get("memory_limit")
        .unwrap()
        .check_value(&serde_json::json!("2048M"))
        .is_ok());
    assert!(params
        .get("memory_limit")
        .unwrap()
        .check_value(&serde_json::json!("512M"))
        .is_err());
    Ok(())
}
