//! Locating the platform-specific build of a component.

use std::env::consts::{ARCH, DLL_EXTENSION, OS};
use std::path::{Path, PathBuf};

/// Release of the compiler that built this host, e.g. `1.85.0`.
pub const RUSTC_VERSION: &str = env!("LOOM_RUSTC_VERSION");

/// Which kind of build a manifest path refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildFlavor {
    /// C-ABI shared library; any compiler.
    Native,
    /// Rust-ABI plugin; must come from the host's exact compiler release.
    HostPlugin,
}

/// File name of the build matching this host.
///
/// The extension of `file_name` is replaced: `orders.so` becomes
/// `orders_linux_x86_64.so` for a native build and
/// `orders_linux_x86_64_1.85.0.so` for a host plugin.
pub fn artifact_name(file_name: &str, flavor: BuildFlavor) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    match flavor {
        BuildFlavor::Native => format!("{stem}_{OS}_{ARCH}.{DLL_EXTENSION}"),
        BuildFlavor::HostPlugin => format!("{stem}_{OS}_{ARCH}_{RUSTC_VERSION}.{DLL_EXTENSION}"),
    }
}

/// Sibling path of `module_path` naming the build for this host.
pub fn artifact_path(module_path: &Path, flavor: BuildFlavor) -> PathBuf {
    let file_name = module_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    module_path.with_file_name(artifact_name(file_name, flavor))
}

/// Path handed to the platform loader.
///
/// An existing path is canonicalized. A missing relative path is retried next
/// to the running executable. Anything else is returned unchanged so the
/// platform's own search rules (e.g. `LD_LIBRARY_PATH`) still apply.
pub fn resolve_library_path(path: &Path) -> PathBuf {
    if path.exists() {
        return path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    }

    if path.is_relative() {
        let beside_exe = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(path)));
        if let Some(candidate) = beside_exe.filter(|c| c.exists()) {
            tracing::debug!(path = %candidate.display(), "Using library next to executable");
            return candidate.canonicalize().unwrap_or(candidate);
        }
    }

    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_artifact_carries_os_and_arch() {
        let name = artifact_name("orders.so", BuildFlavor::Native);
        assert_eq!(name, format!("orders_{OS}_{ARCH}.{DLL_EXTENSION}"));
    }

    #[test]
    fn plugin_artifact_carries_compiler_release() {
        let name = artifact_name("orders.so", BuildFlavor::HostPlugin);
        assert!(name.starts_with(&format!("orders_{OS}_{ARCH}_")));
        assert!(name.contains(RUSTC_VERSION));
    }

    #[test]
    fn artifact_path_stays_in_the_same_directory() {
        let path = artifact_path(Path::new("components/v1/orders.so"), BuildFlavor::Native);
        assert_eq!(path.parent(), Some(Path::new("components/v1")));
    }

    #[test]
    fn existing_path_is_canonicalized() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("liborders.so");
        std::fs::write(&lib, b"").unwrap();

        let resolved = resolve_library_path(&lib);
        assert!(resolved.is_absolute());
        assert_eq!(resolved, lib.canonicalize().unwrap());
    }

    #[test]
    fn unknown_bare_name_is_left_for_the_platform_search() {
        let resolved = resolve_library_path(Path::new("libdefinitely_not_here.so"));
        assert_eq!(resolved, PathBuf::from("libdefinitely_not_here.so"));
    }
}
