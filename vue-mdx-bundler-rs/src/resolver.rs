//! Resolution of import specifiers against the virtual file registry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::registry::VirtualFileRegistry;
use crate::text::{resolve_against, with_appended_extension};

/// Extensions appended, in order, when a specifier names a virtual file
/// without its extension. The first hit wins.
pub const CANDIDATE_EXTENSIONS: [&str; 6] = [".js", ".ts", ".jsx", ".tsx", ".json", ".mdx"];

/// Outcome of resolving one specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The specifier names a file in the registry.
    Virtual(PathBuf),
    /// Not a virtual file; the host's own resolution applies.
    Deferred,
}

/// Resolves specifiers to virtual files. Holds only an immutable registry
/// snapshot, so it can serve concurrent, out-of-order requests.
#[derive(Debug, Clone)]
pub struct ModuleResolver {
    registry: Arc<VirtualFileRegistry>,
}

impl ModuleResolver {
    pub fn new(registry: Arc<VirtualFileRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &VirtualFileRegistry {
        &self.registry
    }

    /// Resolves `specifier` as imported from `importer`.
    ///
    /// The entry path always resolves to the in-memory document, even when a
    /// file of the same name exists on disk. An empty importer resolves
    /// relative to the registry's base directory.
    pub fn resolve(&self, specifier: &str, importer: &Path) -> Resolution {
        let entry = self.registry.entry_path();
        if Path::new(specifier) == entry {
            return Resolution::Virtual(entry.to_path_buf());
        }

        let importer_dir = match importer.parent() {
            Some(dir) if !importer.as_os_str().is_empty() => dir,
            _ => self.registry.base_dir(),
        };
        let module_path = resolve_against(importer_dir, specifier);

        if self.registry.contains(&module_path) {
            return Resolution::Virtual(module_path);
        }

        let mut candidates = CANDIDATE_EXTENSIONS
            .iter()
            .map(|ext| with_appended_extension(&module_path, ext))
            .filter(|candidate| self.registry.contains(candidate));

        match candidates.next() {
            Some(first) => {
                let others: Vec<_> = candidates.collect();
                if !others.is_empty() {
                    log::debug!(
                        "Ambiguous import {specifier:?} from {}: using {} over {:?}",
                        importer.display(),
                        first.display(),
                        others
                    );
                }
                Resolution::Virtual(first)
            }
            None => Resolution::Deferred,
        }
    }
}
