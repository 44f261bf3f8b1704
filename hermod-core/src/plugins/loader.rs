//! Module loader - turns a file on disk into a list of plugin descriptors
//!
//! A module is a native shared object built with
//! [`hermod_plugin_api::export_plugins!`]. The loader checks the binary
//! header first, so a stray text file in the plugin directory is rejected
//! without ever being handed to the dynamic linker.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hermod_plugin_api::{API_VERSION, PluginDescriptor};
use libloading::Library;

use super::error::LoaderError;

/// How loading failures are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Explicit single-module load: every failure is reported
    Strict,
    /// Directory scan: modules that are not plugins are skipped
    Permissive,
}

/// A module whose plugin types have been discovered but not instantiated
pub struct LoadedModule {
    id: String,
    path: Option<PathBuf>,
    descriptors: Vec<PluginDescriptor>,
    library: Option<Arc<Library>>,
}

impl LoadedModule {
    /// Module for plugins linked into the current binary
    pub fn from_descriptors(id: impl Into<String>, descriptors: Vec<PluginDescriptor>) -> Self {
        Self {
            id: id.into(),
            path: None,
            descriptors,
            library: None,
        }
    }

    /// Identity used for duplicate detection: the canonical path for
    /// modules read from disk
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn descriptors(&self) -> &[PluginDescriptor] {
        &self.descriptors
    }

    pub(crate) fn library(&self) -> Option<Arc<Library>> {
        self.library.clone()
    }
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("id", &self.id)
            .field("descriptors", &self.descriptors)
            .field("dynamic", &self.library.is_some())
            .finish()
    }
}

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
const MACH_O_MAGIC: [[u8; 4]; 5] = [
    [0xfe, 0xed, 0xfa, 0xce],
    [0xfe, 0xed, 0xfa, 0xcf],
    [0xce, 0xfa, 0xed, 0xfe],
    [0xcf, 0xfa, 0xed, 0xfe],
    // fat / universal binary
    [0xca, 0xfe, 0xba, 0xbe],
];
const PE_MAGIC: [u8; 2] = *b"MZ";

/// Reads modules from disk
pub struct ModuleLoader;

impl ModuleLoader {
    /// Load a module and list its plugin types
    pub fn load(path: &Path) -> Result<LoadedModule, LoaderError> {
        if !path.exists() {
            return Err(LoaderError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        check_header(path)?;

        // SAFETY: Loading native code runs its initialisers with full host
        // privileges. Modules are trusted by being placed in the plugin
        // directory or named explicitly by the operator.
        let library = unsafe { Library::new(path) }
            .map_err(|e| LoaderError::not_a_module(path, e.to_string()))?;

        let descriptors = {
            // SAFETY: Signature matches the one generated by `export_plugins!`.
            let api_version_fn: libloading::Symbol<extern "C" fn() -> u32> =
                unsafe { library.get(b"_hermod_plugin_api_version") }
                    .map_err(|_| LoaderError::not_a_module(path, "no plugin API version export"))?;

            let found = api_version_fn();
            if found != API_VERSION {
                return Err(LoaderError::ApiVersionMismatch {
                    expected: API_VERSION,
                    found,
                });
            }

            // SAFETY: As above. The returned pointer comes from `Box::into_raw`
            // in the module and ownership passes to us.
            let descriptors_fn: libloading::Symbol<extern "C" fn() -> *mut Vec<PluginDescriptor>> =
                unsafe { library.get(b"_hermod_plugin_descriptors") }
                    .map_err(|_| LoaderError::not_a_module(path, "no plugin descriptor export"))?;

            let raw = descriptors_fn();
            if raw.is_null() {
                Vec::new()
            } else {
                *unsafe { Box::from_raw(raw) }
            }
        };

        if descriptors.is_empty() {
            return Err(LoaderError::NotAPlugin {
                path: path.to_path_buf(),
            });
        }

        let id = std::fs::canonicalize(path)
            .unwrap_or_else(|_| path.to_path_buf())
            .display()
            .to_string();

        tracing::debug!(
            module = %path.display(),
            plugins = descriptors.len(),
            "Module loaded"
        );

        Ok(LoadedModule {
            id,
            path: Some(path.to_path_buf()),
            descriptors,
            library: Some(Arc::new(library)),
        })
    }

    /// Candidate module files in `dir`, sorted by name. A missing directory
    /// yields nothing.
    pub fn scan_dir(dir: &Path) -> Result<Vec<PathBuf>, LoaderError> {
        if !dir.exists() {
            tracing::debug!(dir = %dir.display(), "Plugin directory does not exist");
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                found.push(path);
            }
        }
        found.sort();
        Ok(found)
    }

    /// Load every module in `dir`, logging and skipping the ones that fail
    pub fn load_dir(dir: &Path) -> Result<Vec<LoadedModule>, LoaderError> {
        let mut modules = Vec::new();
        for path in Self::scan_dir(dir)? {
            match Self::load(&path) {
                Ok(module) => modules.push(module),
                Err(e) if e.is_ignorable_in(LoadMode::Permissive) => {
                    tracing::debug!(module = %path.display(), error = %e, "Skipping non-plugin file");
                }
                Err(e) => {
                    tracing::warn!(module = %path.display(), error = %e, "Failed to load module");
                }
            }
        }
        Ok(modules)
    }
}

fn check_header(path: &Path) -> Result<(), LoaderError> {
    let mut header = [0u8; 4];
    File::open(path)
        .and_then(|mut file| file.read_exact(&mut header))
        .map_err(|e| LoaderError::not_a_module(path, format!("unreadable header: {e}")))?;

    let recognised = header == ELF_MAGIC
        || MACH_O_MAGIC.contains(&header)
        || header[..2] == PE_MAGIC;

    if recognised {
        Ok(())
    } else {
        Err(LoaderError::not_a_module(path, "not a native shared object"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_missing_file() {
        let err = ModuleLoader::load(Path::new("/nonexistent/hermod/module.so")).unwrap_err();
        assert!(matches!(err, LoaderError::FileNotFound { .. }));
    }

    #[test]
    fn test_text_file_is_not_a_module() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "plugin.so", b"just some text pretending to be a library");

        let err = ModuleLoader::load(&path).unwrap_err();
        assert!(matches!(err, LoaderError::NotAModule { .. }));
    }

    #[test]
    fn test_short_file_is_not_a_module() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "tiny.so", b"MZ");

        let err = ModuleLoader::load(&path).unwrap_err();
        assert!(matches!(err, LoaderError::NotAModule { .. }));
    }

    #[test]
    fn test_header_check_ignores_extension() {
        let dir = TempDir::new().unwrap();
        let elf = write(&dir, "notes.txt", &[0x7f, b'E', b'L', b'F', 2, 1, 1, 0]);
        let macho = write(&dir, "a.bin", &[0xcf, 0xfa, 0xed, 0xfe, 0, 0]);
        let pe = write(&dir, "b.dat", b"MZ\x90\x00");
        let text = write(&dir, "c.so", b"#!/bin/sh\n");

        assert!(check_header(&elf).is_ok());
        assert!(check_header(&macho).is_ok());
        assert!(check_header(&pe).is_ok());
        assert!(check_header(&text).is_err());
    }

    #[test]
    fn test_truncated_elf_is_not_a_module() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "broken.so", &[0x7f, b'E', b'L', b'F', 0, 0, 0, 0]);

        let err = ModuleLoader::load(&path).unwrap_err();
        assert!(matches!(err, LoaderError::NotAModule { .. }));
    }

    #[test]
    fn test_scan_dir_sorted_files_only() {
        let dir = TempDir::new().unwrap();
        write(&dir, "b.so", b"x");
        write(&dir, "a.so", b"x");
        std::fs::create_dir(dir.path().join("subdir")).unwrap();

        let found = ModuleLoader::scan_dir(dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.so", "b.so"]);
    }

    #[test]
    fn test_scan_missing_dir_is_empty() {
        let found = ModuleLoader::scan_dir(Path::new("/nonexistent/hermod/plugins")).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_load_dir_skips_junk() {
        let dir = TempDir::new().unwrap();
        write(&dir, "readme.md", b"# plugins go here");
        write(&dir, "fake.so", &[0x7f, b'E', b'L', b'F']);

        let modules = ModuleLoader::load_dir(dir.path()).unwrap();
        assert!(modules.is_empty());
    }

    #[test]
    fn test_from_descriptors_has_no_library() {
        let module = LoadedModule::from_descriptors("builtin", Vec::new());
        assert_eq!(module.id(), "builtin");
        assert!(module.path().is_none());
        assert!(module.library().is_none());
    }
}
