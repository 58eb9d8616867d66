use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use loom_core::{BuildFlavor, ModuleParam};
use serde::{Deserialize, Serialize};

use crate::error::LoadError;

/// Manifest location relative to the working directory.
pub const DEFAULT_MANIFEST: &str = "etc/modules.toml";

/// The list of components a host may load.
///
/// ```toml
/// remote = false
///
/// [[modules]]
/// path = "components/orders.so"
/// name = "orders"
/// service_key = "orders.v1"
/// run = true
/// after_load_wait_ms = 500
/// [modules.args]
/// config = "etc/orders.toml"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Forward every call over the network; no local dispatch.
    #[serde(default)]
    pub remote: bool,
    #[serde(default)]
    pub modules: Vec<ModuleEntry>,
}

/// One loadable component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleEntry {
    /// Base path of the build; the host-specific artifact sits next to it.
    pub path: PathBuf,
    pub name: String,
    #[serde(default)]
    pub service_key: String,
    #[serde(default)]
    pub kind: ModuleKind,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
    /// Start the component's service loop after loading.
    #[serde(default)]
    pub run: bool,
    /// Defer loading until the component is first referenced.
    #[serde(default)]
    pub lazy: bool,
    /// Settle delay after starting the service loop.
    #[serde(default)]
    pub after_load_wait_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    /// C-ABI shared library.
    #[default]
    Native,
    /// Rust-ABI plugin built by the host's compiler release.
    Plugin,
}

impl ModuleKind {
    pub fn flavor(self) -> BuildFlavor {
        match self {
            ModuleKind::Native => BuildFlavor::Native,
            ModuleKind::Plugin => BuildFlavor::HostPlugin,
        }
    }
}

impl ModuleEntry {
    pub fn after_load_wait(&self) -> Option<Duration> {
        (self.after_load_wait_ms > 0).then(|| Duration::from_millis(self.after_load_wait_ms))
    }

    /// Parameters passed to the component's initializer.
    pub fn param(&self) -> ModuleParam {
        ModuleParam::new(self.name.clone(), self.args.clone())
    }

    /// Path of the build matching this host.
    pub fn artifact_path(&self) -> PathBuf {
        loom_core::artifact_path(&self.path, self.kind.flavor())
    }
}

impl Manifest {
    pub fn from_toml(content: &str) -> Result<Self, LoadError> {
        let manifest: Manifest =
            toml::from_str(content).map_err(|e| LoadError::Manifest(e.to_string()))?;

        let mut seen = HashSet::new();
        for entry in &manifest.modules {
            if entry.name.is_empty() {
                return Err(LoadError::Manifest(format!(
                    "module at {} has no name",
                    entry.path.display()
                )));
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(LoadError::DuplicateModule(entry.name.clone()));
            }
        }
        Ok(manifest)
    }

    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load the manifest a host should run with.
    ///
    /// With an explicit path only that file is considered; otherwise
    /// [`DEFAULT_MANIFEST`] and then `~/.config/loom/modules.toml`. A missing
    /// manifest yields an empty one; a manifest that exists but does not
    /// parse is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, LoadError> {
        let candidates = match explicit {
            Some(path) => vec![path.to_path_buf()],
            None => default_locations(),
        };

        match candidates.into_iter().find(|p| p.exists()) {
            Some(path) => {
                tracing::info!(path = %path.display(), "Loading module manifest");
                Self::from_file(&path)
            }
            None => {
                tracing::warn!("No module manifest found, starting without components");
                Ok(Self::default())
            }
        }
    }

    pub fn entry(&self, name: &str) -> Option<&ModuleEntry> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Entries loaded at startup, in manifest order.
    pub fn eager(&self) -> impl Iterator<Item = &ModuleEntry> {
        self.modules.iter().filter(|m| !m.lazy)
    }
}

fn default_locations() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(DEFAULT_MANIFEST)];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config").join("loom").join("modules.toml"));
    }
    paths
}
