use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use dbd_core::error::Result;

use crate::types::{PluginDescriptor, PluginType, Repository};

static VAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$(\w+)").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileItemType {
    File,
    Dir,
    Bin,
}

impl FileItemType {
    fn from_decl(decl: Option<&str>) -> FileItemType {
        match decl.map(str::to_uppercase).as_deref() {
            Some("DIR") => FileItemType::Dir,
            Some("BIN") => FileItemType::Bin,
            _ => FileItemType::File,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMethod {
    Any,
    Cp,
}

impl InstallMethod {
    fn from_decl(decl: Option<&str>) -> InstallMethod {
        match decl.map(str::to_uppercase).as_deref() {
            Some("CP") => InstallMethod::Cp,
            _ => InstallMethod::Any,
        }
    }
}

/// One resolved file-map entry: where a packaged file comes from and
/// where it lands on the target host.
#[derive(Debug, Clone)]
pub struct FileItem {
    pub src_path: String,
    pub target_path: String,
    pub item_type: FileItemType,
    pub install_method: InstallMethod,
}

#[derive(Debug, Clone, Deserialize)]
struct FileMapEntry {
    src_path: String,
    #[serde(default)]
    target_path: Option<String>,
    #[serde(default, rename = "type")]
    item_type: Option<String>,
    #[serde(default)]
    install_method: Option<String>,
}

/// Install plugin: maps package contents to target paths via
/// `file_map.yaml`. Source paths may reference package metadata as
/// `$name`, `$version`, `$release`, `$arch`, `$md5`; rendered maps are
/// cached per package identity.
#[derive(Debug)]
pub struct InstallPlugin {
    descriptor: PluginDescriptor,
    entries: OnceCell<Vec<FileMapEntry>>,
    rendered: Mutex<HashMap<String, Arc<Vec<FileItem>>>>,
}

impl InstallPlugin {
    pub fn new(descriptor: PluginDescriptor) -> Self {
        InstallPlugin {
            descriptor,
            entries: OnceCell::new(),
            rendered: Mutex::new(HashMap::new()),
        }
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn file_map_path(&self) -> PathBuf {
        self.descriptor
            .path
            .join(PluginType::Install.flag_file().as_ref())
    }

    /// Replaces `$var` references from `vars`; unknown names are left
    /// verbatim. Variable names are matched case-insensitively.
    pub fn var_replace(input: &str, vars: &HashMap<String, String>) -> String {
        VAR_RE
            .replace_all(input, |caps: &regex::Captures| {
                let name = caps[1].to_lowercase();
                vars.get(&name)
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    fn entries(&self) -> Result<&Vec<FileMapEntry>> {
        self.entries.get_or_try_init(|| {
            let raw = fs::read_to_string(self.file_map_path())?;
            let entries: Vec<FileMapEntry> = serde_yaml_ng::from_str(&raw)?;
            Ok(entries)
        })
    }

    fn package_vars(repository: &Repository) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), repository.name.clone());
        vars.insert("version".to_string(), repository.version.to_string());
        if let Some(release) = &repository.release {
            vars.insert("release".to_string(), release.clone());
        }
        if let Some(arch) = &repository.arch {
            vars.insert("arch".to_string(), arch.clone());
        }
        if let Some(md5) = &repository.md5 {
            vars.insert("md5".to_string(), md5.clone());
        }
        vars
    }

    /// The file map rendered against one package's metadata.
    pub fn file_map(&self, repository: &Repository) -> Result<Arc<Vec<FileItem>>> {
        let vars = Self::package_vars(repository);
        let mut key: Vec<_> = vars.iter().collect();
        key.sort();
        let key = format!("{:?}", key);

        if let Some(rendered) = self
            .rendered
            .lock()
            .expect("file map cache poisoned")
            .get(&key)
        {
            return Ok(rendered.clone());
        }

        let mut items = Vec::new();
        for entry in self.entries()? {
            let mut src = entry.src_path.clone();
            // Package-relative paths: "/home/admin/bin" and "bin" both
            // become "./..." rooted at the package top.
            if !src.starts_with('.') {
                src = format!("./{}", src.trim_start_matches('/'));
            }
            let src = Self::var_replace(&src, &vars);
            let target = entry
                .target_path
                .clone()
                .unwrap_or_else(|| src.clone());
            items.push(FileItem {
                src_path: src,
                target_path: target,
                item_type: FileItemType::from_decl(entry.item_type.as_deref()),
                install_method: InstallMethod::from_decl(entry.install_method.as_deref()),
            });
        }
        debug!(
            "{}: rendered {} file map entries for {}",
            self.descriptor,
            items.len(),
            repository.name
        );

        let items = Arc::new(items);
        self.rendered
            .lock()
            .expect("file map cache poisoned")
            .insert(key, items.clone());
        Ok(items)
    }

    /// Flat list view of [`Self::file_map`].
    pub fn file_list(&self, repository: &Repository) -> Result<Vec<FileItem>> {
        Ok(self.file_map(repository)?.as_ref().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;
    use tempfile::TempDir;

    const FILE_MAP_YAML: &str = r#"
- src_path: /home/admin/oceanbase-$version/bin/observer
  target_path: bin/observer
  type: BIN
- src_path: etc
  target_path: etc
  type: DIR
  install_method: cp
- src_path: ./lib/libaio.so
"#;

    fn plugin(dir: &TempDir) -> InstallPlugin {
        fs::write(dir.path().join("file_map.yaml"), FILE_MAP_YAML).expect("should write");
        InstallPlugin::new(PluginDescriptor::new(
            "oceanbase-ce",
            PluginType::Install,
            Version::parse("4.2.2.0").unwrap(),
            dir.path().to_path_buf(),
            false,
        ))
    }

    fn repo() -> Repository {
        Repository::new("oceanbase-ce", Version::parse("4.2.2.0").unwrap())
    }

    #[test]
    fn test_var_replace() {
        let mut vars = HashMap::new();
        vars.insert("version".to_string(), "4.2.2.0".to_string());
        assert_eq!(
            InstallPlugin::var_replace("pkg-$version/bin", &vars),
            "pkg-4.2.2.0/bin"
        );
        // Unknown vars stay verbatim; matching ignores case.
        assert_eq!(
            InstallPlugin::var_replace("$unknown/$VERSION", &vars),
            "$unknown/4.2.2.0"
        );
    }

    #[test]
    fn test_file_map_normalizes_and_renders() {
        let dir = TempDir::new().unwrap();
        let plugin = plugin(&dir);

        let items = plugin.file_map(&repo()).expect("should render file map");
        assert_eq!(items.len(), 3);

        assert_eq!(items[0].src_path, "./home/admin/oceanbase-4.2.2.0/bin/observer");
        assert_eq!(items[0].target_path, "bin/observer");
        assert_eq!(items[0].item_type, FileItemType::Bin);
        assert_eq!(items[0].install_method, InstallMethod::Any);

        assert_eq!(items[1].src_path, "./etc");
        assert_eq!(items[1].item_type, FileItemType::Dir);
        assert_eq!(items[1].install_method, InstallMethod::Cp);

        // Already-relative paths and defaulted targets pass through.
        assert_eq!(items[2].src_path, "./lib/libaio.so");
        assert_eq!(items[2].target_path, "./lib/libaio.so");
        assert_eq!(items[2].item_type, FileItemType::File);
    }

    #[test]
    fn test_rendered_map_cached_per_package() {
        let dir = TempDir::new().unwrap();
        let plugin = plugin(&dir);

        let first = plugin.file_map(&repo()).unwrap();
        let second = plugin.file_map(&repo()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let other = Repository::new("oceanbase-ce", Version::parse("4.3.0.0").unwrap());
        let third = plugin.file_map(&other).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third[0].src_path, "./home/admin/oceanbase-4.3.0.0/bin/observer");
    }
}
