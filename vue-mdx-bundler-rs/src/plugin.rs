//! The contract between this crate and a host bundler.
//!
//! A host bundler builds the module graph itself. For every import it asks
//! the configured plugins, in order, to resolve the specifier; the first
//! plugin returning `Some` wins, and when all of them defer the host applies
//! its own resolution. Loading works the same way. Hooks for unrelated
//! modules may run concurrently and in any order, so plugins must not keep
//! per-build mutable state.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::{MdxBundlerError, Result};
use crate::loader::Loader;

/// Future returned by plugin hooks and host builds.
pub type PluginFuture<'a, T> = BoxFuture<'a, anyhow::Result<T>>;

/// Opaque value a resolve hook attaches to a path for its own load hook.
pub type PluginData = serde_json::Value;

/// Namespace of paths that live on the filesystem.
pub const FILE_NAMESPACE: &str = "file";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveKind {
    EntryPoint,
    ImportStatement,
}

/// Input to a resolve hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveArgs {
    /// The specifier exactly as written in the importing module.
    pub path: String,
    /// Path of the importing module; empty for entry points.
    pub importer: PathBuf,
    pub namespace: String,
    pub kind: ResolveKind,
}

impl ResolveArgs {
    pub fn entry_point(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            importer: PathBuf::new(),
            namespace: FILE_NAMESPACE.to_string(),
            kind: ResolveKind::EntryPoint,
        }
    }

    pub fn import(path: impl Into<String>, importer: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            importer: importer.into(),
            namespace: FILE_NAMESPACE.to_string(),
            kind: ResolveKind::ImportStatement,
        }
    }
}

/// Output of a resolve hook that claimed a specifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolveResult {
    pub path: PathBuf,
    /// Defaults to [`FILE_NAMESPACE`] when unset.
    pub namespace: Option<String>,
    /// Leave the import in the output untouched.
    pub external: bool,
    pub plugin_data: Option<PluginData>,
}

impl ResolveResult {
    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or(FILE_NAMESPACE)
    }
}

/// Input to a load hook.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadArgs {
    pub path: PathBuf,
    pub namespace: String,
    pub plugin_data: Option<PluginData>,
}

impl LoadArgs {
    /// Load arguments for a path a resolve hook just produced.
    pub fn from_resolved(resolved: &ResolveResult) -> Self {
        Self {
            path: resolved.path.clone(),
            namespace: resolved.namespace().to_string(),
            plugin_data: resolved.plugin_data.clone(),
        }
    }
}

/// Output of a load hook that claimed a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadResult {
    pub contents: String,
    pub loader: Loader,
    /// Directory imports inside `contents` resolve from, when not the
    /// directory of the loaded path.
    pub resolve_dir: Option<PathBuf>,
}

/// A participant in the host bundler's resolve/load protocol.
///
/// Both hooks default to deferring, so a plugin only implements the side it
/// cares about.
pub trait BundlerPlugin: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn on_resolve<'a>(
        &'a self,
        _args: &'a ResolveArgs,
        _build: &'a BuildOptions,
    ) -> PluginFuture<'a, Option<ResolveResult>> {
        Box::pin(async { Ok(None) })
    }

    fn on_load<'a>(
        &'a self,
        _args: &'a LoadArgs,
        _build: &'a BuildOptions,
    ) -> PluginFuture<'a, Option<LoadResult>> {
        Box::pin(async { Ok(None) })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    /// Immediately invoked function assigning the entry exports to
    /// `global_name`.
    #[default]
    Iife,
    Cjs,
    Esm,
}

/// The complete configuration handed to [`HostBundler::build`].
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub entry_points: Vec<PathBuf>,
    pub bundle: bool,
    /// `Some(false)` keeps output in memory; `Some(true)` writes to `outdir`.
    pub write: Option<bool>,
    pub outdir: Option<PathBuf>,
    pub format: Format,
    pub global_name: Option<String>,
    pub minify: bool,
    /// Expressions replaced by the given JavaScript literal text.
    pub define: BTreeMap<String, String>,
    /// Loader overrides keyed by extension including the dot, e.g. `.png`.
    pub loader: BTreeMap<String, Loader>,
    pub plugins: Vec<Arc<dyn BundlerPlugin>>,
}

impl BuildOptions {
    /// The declared loader for `extension` (without the dot), if any.
    pub fn loader_override(&self, extension: &str) -> Option<Loader> {
        self.loader.get(&format!(".{extension}")).copied()
    }
}

/// Where the host puts its output, decided before the build starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    InMemory,
    Written { outdir: PathBuf },
}

impl OutputMode {
    /// Validates the output fields of `options`. Exactly one mode must be
    /// selected: `write: false`, or `write: true` together with `outdir`.
    pub fn from_options(options: &BuildOptions) -> Result<Self> {
        match (options.write, &options.outdir) {
            (Some(false), _) => Ok(OutputMode::InMemory),
            (Some(true), Some(outdir)) => Ok(OutputMode::Written {
                outdir: outdir.clone(),
            }),
            _ => Err(MdxBundlerError::Configuration(
                "You must either specify `write: false` or `write: true` and `outdir` in the build options"
                    .to_string(),
            )),
        }
    }
}

/// One file produced by the host bundler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

/// What the host returns from a build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOutput {
    /// Present when the build kept its output in memory.
    pub output_files: Option<Vec<OutputFile>>,
}

/// A bundler that drives [`BundlerPlugin`] hooks over a module graph.
pub trait HostBundler: Send + Sync {
    fn build<'a>(&'a self, options: &'a BuildOptions) -> PluginFuture<'a, BuildOutput>;
}
