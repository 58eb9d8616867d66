use std::collections::HashMap;
use std::path::{Path, PathBuf};

use libloading::Library;
use parking_lot::Mutex;

use crate::dispatch::{CallDiscipline, CallResult, SymbolAddr};
use crate::error::NativeError;
use crate::platform::resolve_library_path;

/// Exported name of the optional call trampoline.
///
/// A library exporting it receives every call as `(target, argc, args...)`
/// and performs the variadic dispatch itself.
pub const TRAMPOLINE_SYMBOL: &str = "MyTxd";

struct Loaded {
    library: Library,
    /// symbol name → address; only successful lookups are remembered
    symbols: HashMap<String, SymbolAddr>,
}

/// An opened platform shared library.
///
/// Opening never fails outright: a library that could not be opened is still
/// returned and reports its error through [`DynamicLibrary::ensure_loaded`]
/// and every lookup. Symbols resolve lazily and successful lookups are
/// memoized; failed lookups are retried on the next request.
pub struct DynamicLibrary {
    path: PathBuf,
    inner: Mutex<Option<Loaded>>,
    load_error: Option<String>,
    discipline: CallDiscipline,
}

impl DynamicLibrary {
    /// Open `path` with global symbol visibility.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let requested = path.as_ref().to_path_buf();
        let resolved = resolve_library_path(&requested);

        // SAFETY: running a library's initializers is inherent to loading a
        // component; manifests only name trusted builds.
        match unsafe { open_global(&resolved) } {
            Ok(library) => {
                let mut lib = Self {
                    path: requested,
                    inner: Mutex::new(Some(Loaded {
                        library,
                        symbols: HashMap::new(),
                    })),
                    load_error: None,
                    discipline: CallDiscipline::Direct,
                };
                if let Ok(trampoline) = lib.resolve(TRAMPOLINE_SYMBOL) {
                    tracing::debug!(
                        library = %lib.path.display(),
                        "Library provides a call trampoline"
                    );
                    lib.discipline = CallDiscipline::Trampoline(trampoline);
                }
                lib
            }
            Err(e) => {
                tracing::warn!(library = %resolved.display(), error = %e, "Failed to open library");
                Self {
                    path: requested,
                    inner: Mutex::new(None),
                    load_error: Some(e.to_string()),
                    discipline: CallDiscipline::Direct,
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The terminal open error, if the library never loaded.
    pub fn ensure_loaded(&self) -> Result<(), NativeError> {
        match &self.load_error {
            Some(reason) => Err(NativeError::Open {
                path: self.path.clone(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.lock().is_some()
    }

    pub fn has_trampoline(&self) -> bool {
        matches!(self.discipline, CallDiscipline::Trampoline(_))
    }

    pub fn discipline(&self) -> CallDiscipline {
        self.discipline
    }

    /// Look up an exported symbol.
    pub fn resolve(&self, symbol: &str) -> Result<SymbolAddr, NativeError> {
        let mut guard = self.inner.lock();
        let Some(loaded) = guard.as_mut() else {
            return Err(NativeError::NotLoaded {
                path: self.path.clone(),
                reason: self
                    .load_error
                    .clone()
                    .unwrap_or_else(|| "library closed".into()),
            });
        };

        if let Some(addr) = loaded.symbols.get(symbol) {
            return Ok(*addr);
        }

        // SAFETY: the symbol is read as an opaque address and never
        // dereferenced here.
        let raw = unsafe { loaded.library.get::<*const ()>(symbol.as_bytes()) }
            .ok()
            .map(|sym| *sym as usize)
            .unwrap_or(0);

        let addr = SymbolAddr::new(raw).ok_or_else(|| NativeError::SymbolNotFound {
            library: self.path.display().to_string(),
            symbol: symbol.to_string(),
        })?;
        loaded.symbols.insert(symbol.to_string(), addr);
        Ok(addr)
    }

    /// Resolve `symbol` and call it with `args`.
    ///
    /// # Safety
    ///
    /// The exported function must take exactly `args.len()` pointer-sized
    /// integer arguments under the C ABI, return an integer no wider than 64
    /// bits, and must not outlive the library.
    pub unsafe fn call(&self, symbol: &str, args: &[usize]) -> Result<CallResult, NativeError> {
        let target = self.resolve(symbol)?;
        // SAFETY: forwarded from the caller's contract.
        unsafe { self.discipline.call(symbol, target, args) }
    }

    /// Call an address that belongs to this library.
    ///
    /// # Safety
    ///
    /// Same contract as [`DynamicLibrary::call`].
    pub unsafe fn call_address(
        &self,
        target: SymbolAddr,
        args: &[usize],
    ) -> Result<CallResult, NativeError> {
        unsafe { self.discipline.call("<address>", target, args) }
    }

    /// Release the library. A no-op for libraries that never opened.
    ///
    /// Addresses resolved earlier must not be called afterwards.
    pub fn close(&self) {
        if let Some(loaded) = self.inner.lock().take() {
            if let Err(e) = loaded.library.close() {
                tracing::warn!(
                    library = %self.path.display(),
                    error = %e,
                    "Failed to close library"
                );
            }
        }
    }
}

impl std::fmt::Debug for DynamicLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicLibrary")
            .field("path", &self.path)
            .field("loaded", &self.is_loaded())
            .field("discipline", &self.discipline)
            .finish()
    }
}

#[cfg(unix)]
unsafe fn open_global(path: &Path) -> Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_GLOBAL, RTLD_LAZY};
    unsafe { UnixLibrary::open(Some(path), RTLD_LAZY | RTLD_GLOBAL) }.map(Library::from)
}

#[cfg(windows)]
unsafe fn open_global(path: &Path) -> Result<Library, libloading::Error> {
    // Windows exports are process-visible once loaded.
    unsafe { Library::new(path) }
}
