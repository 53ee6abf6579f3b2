use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{MdxBundlerError, Result};
use crate::text::{normalize_path, resolve_against};

/// File name the document body is served under inside the base directory.
pub const ENTRY_FILE_NAME: &str = "_mdx_bundler_entry_point.mdx";

/// Name of the single file the host writes in written-output mode.
pub const ENTRY_OUTPUT_NAME: &str = "_mdx_bundler_entry_point.js";

/// Directory used when the caller does not name one. It does not exist, so
/// only virtual files and packages can be resolved from it.
pub const FAKE_DIR_NAME: &str = "__mdx_bundler_fake_dir__";

/// In-memory source files addressed by normalised absolute path.
///
/// Built once per bundling invocation and shared read-only with every
/// resolve and load callback of that build.
#[derive(Debug, Clone)]
pub struct VirtualFileRegistry {
    base_dir: PathBuf,
    entry_path: PathBuf,
    files: BTreeMap<PathBuf, String>,
}

impl VirtualFileRegistry {
    /// Registers `entry_source` under [`ENTRY_FILE_NAME`] and every caller
    /// file under `base_dir`.
    ///
    /// Two relative paths that normalise to the same location (or onto the
    /// entry file) are rejected instead of silently overwriting each other.
    pub fn build<I, K, V>(base_dir: &Path, entry_source: &str, files: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let base_dir = normalize_path(base_dir);
        let entry_path = base_dir.join(ENTRY_FILE_NAME);

        let mut registry = BTreeMap::new();
        registry.insert(entry_path.clone(), entry_source.to_string());

        for (relative, source) in files {
            let path = resolve_against(&base_dir, relative.as_ref());
            if registry.contains_key(&path) {
                return Err(MdxBundlerError::PathCollision { path });
            }
            registry.insert(path, source.into());
        }

        log::debug!(
            "Registered {} virtual file(s) under {}",
            registry.len(),
            base_dir.display()
        );

        Ok(Self {
            base_dir,
            entry_path,
            files: registry,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn entry_path(&self) -> &Path {
        &self.entry_path
    }

    pub fn get(&self, path: &Path) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
