//! The plugins the orchestrator hands to the host bundler, in chain order:
//! global externals, node-style resolution, the virtual module plugin and
//! the markup fallback for documents found on disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::compiler::{CompileOptions, MarkupCompiler, VFile};
use crate::error::MdxBundlerError;
use crate::loader::Loader;
use crate::plugin::{
    BuildOptions, BundlerPlugin, LoadArgs, LoadResult, PluginFuture, ResolveArgs, ResolveKind,
    ResolveResult, FILE_NAMESPACE,
};
use crate::resolver::{ModuleResolver, Resolution};
use crate::text::{extension_of, is_path_specifier, resolve_against, with_appended_extension};
use crate::transform::{ContentTransformPipeline, MARKUP_EXTENSION};

pub const GLOBAL_EXTERNALS_NAMESPACE: &str = "global-externals";

/// The framework root module, always provided as a global.
pub const FRAMEWORK_MODULE: &str = "vue";

/// Extensions the node-style resolver tries on disk.
pub const NODE_RESOLVE_EXTENSIONS: [&str; 4] = [".js", ".ts", ".jsx", ".tsx"];

/// Key of the plugin data marking a path as served from memory.
const IN_MEMORY_KEY: &str = "inMemory";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    #[default]
    Esm,
    Cjs,
}

/// How an externalised module maps onto its global variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInfo {
    pub var_name: String,
    #[serde(rename = "type", default)]
    pub module_type: ModuleType,
    /// Names re-exported from the global. Without them an ESM module is
    /// exposed as a CommonJS value, like a CJS one.
    #[serde(default)]
    pub named_exports: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub default_export: bool,
}

fn default_true() -> bool {
    true
}

impl ModuleInfo {
    pub fn cjs(var_name: impl Into<String>) -> Self {
        Self {
            var_name: var_name.into(),
            module_type: ModuleType::Cjs,
            named_exports: None,
            default_export: true,
        }
    }

    pub fn esm(var_name: impl Into<String>) -> Self {
        Self {
            var_name: var_name.into(),
            module_type: ModuleType::Esm,
            named_exports: None,
            default_export: true,
        }
    }

    /// Source of the module standing in for the external import.
    pub fn module_source(&self) -> String {
        let var_name = &self.var_name;
        match (&self.module_type, &self.named_exports) {
            (ModuleType::Esm, Some(names)) => {
                let mut lines = Vec::with_capacity(names.len() + 1);
                if self.default_export {
                    lines.push(format!("export default {var_name};"));
                }
                for name in names {
                    lines.push(format!("export const {name} = {var_name}.{name};"));
                }
                lines.join("\n")
            }
            _ => format!("module.exports = {var_name};"),
        }
    }
}

/// A caller's global declaration: either just the variable name, or a full
/// [`ModuleInfo`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GlobalSpec {
    VarName(String),
    Module(ModuleInfo),
}

impl From<&str> for GlobalSpec {
    fn from(var_name: &str) -> Self {
        GlobalSpec::VarName(var_name.to_string())
    }
}

impl From<ModuleInfo> for GlobalSpec {
    fn from(info: ModuleInfo) -> Self {
        GlobalSpec::Module(info)
    }
}

impl GlobalSpec {
    pub fn into_module_info(self) -> ModuleInfo {
        match self {
            GlobalSpec::VarName(var_name) => ModuleInfo::esm(var_name),
            GlobalSpec::Module(info) => info,
        }
    }
}

/// Replaces imports of declared modules with references to globals, so
/// their code never enters the bundle.
#[derive(Debug, Clone)]
pub struct GlobalExternalsPlugin {
    modules: BTreeMap<String, ModuleInfo>,
}

impl GlobalExternalsPlugin {
    /// Declares `globals` plus the framework root module, which always maps
    /// to the CommonJS global `vue`.
    pub fn new(globals: &BTreeMap<String, GlobalSpec>) -> Self {
        let mut modules: BTreeMap<String, ModuleInfo> = globals
            .iter()
            .map(|(name, spec)| (name.clone(), spec.clone().into_module_info()))
            .collect();
        modules.insert(FRAMEWORK_MODULE.to_string(), ModuleInfo::cjs(FRAMEWORK_MODULE));
        Self { modules }
    }

    pub fn modules(&self) -> &BTreeMap<String, ModuleInfo> {
        &self.modules
    }
}

impl BundlerPlugin for GlobalExternalsPlugin {
    fn name(&self) -> &str {
        "global-externals"
    }

    fn on_resolve<'a>(
        &'a self,
        args: &'a ResolveArgs,
        _build: &'a BuildOptions,
    ) -> PluginFuture<'a, Option<ResolveResult>> {
        let resolved = self.modules.contains_key(&args.path).then(|| ResolveResult {
            path: PathBuf::from(&args.path),
            namespace: Some(GLOBAL_EXTERNALS_NAMESPACE.to_string()),
            ..Default::default()
        });
        Box::pin(async move { Ok(resolved) })
    }

    fn on_load<'a>(
        &'a self,
        args: &'a LoadArgs,
        _build: &'a BuildOptions,
    ) -> PluginFuture<'a, Option<LoadResult>> {
        let loaded = if args.namespace == GLOBAL_EXTERNALS_NAMESPACE {
            args.path
                .to_str()
                .and_then(|name| self.modules.get(name))
                .map(|info| LoadResult {
                    contents: info.module_source(),
                    loader: Loader::Js,
                    resolve_dir: None,
                })
        } else {
            None
        };
        Box::pin(async move { Ok(loaded) })
    }
}

/// Node-style resolution of on-disk files and `node_modules` packages,
/// probing extra extensions the host would not try by itself.
#[derive(Debug, Clone)]
pub struct NodeResolvePlugin {
    extensions: Vec<String>,
}

impl Default for NodeResolvePlugin {
    fn default() -> Self {
        Self::new(NODE_RESOLVE_EXTENSIONS)
    }
}

impl NodeResolvePlugin {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extensions: extensions.into_iter().map(Into::into).collect(),
        }
    }

    /// Resolves `specifier` from `importer` on disk, or `None` when nothing
    /// matches.
    pub async fn resolve_on_disk(&self, specifier: &str, importer: &Path) -> Option<PathBuf> {
        let importer_dir = importer.parent()?;
        if is_path_specifier(specifier) {
            let candidate = resolve_against(importer_dir, specifier);
            return self.resolve_file_or_index(&candidate).await;
        }

        let (package, subpath) = split_package_specifier(specifier)?;
        for dir in importer_dir.ancestors() {
            let package_dir = dir.join("node_modules").join(package);
            if !is_dir(&package_dir).await {
                continue;
            }
            let found = match subpath {
                Some(subpath) => {
                    self.resolve_file_or_index(&resolve_against(&package_dir, subpath))
                        .await
                }
                None => self.resolve_package(&package_dir).await,
            };
            if found.is_some() {
                return found;
            }
        }
        None
    }

    async fn resolve_file_or_index(&self, path: &Path) -> Option<PathBuf> {
        match self.resolve_file(path).await {
            Some(found) => Some(found),
            None => self.resolve_index(path).await,
        }
    }

    /// `path` itself when it is a file with a listed extension, else the
    /// first listed extension that exists appended to it.
    async fn resolve_file(&self, path: &Path) -> Option<PathBuf> {
        let claims_extension = extension_of(path).is_some_and(|ext| {
            self.extensions
                .iter()
                .any(|listed| listed.trim_start_matches('.') == ext)
        });
        if claims_extension && is_file(path).await {
            return Some(path.to_path_buf());
        }
        for ext in &self.extensions {
            let candidate = with_appended_extension(path, ext);
            if is_file(&candidate).await {
                return Some(candidate);
            }
        }
        None
    }

    async fn resolve_index(&self, dir: &Path) -> Option<PathBuf> {
        if !is_dir(dir).await {
            return None;
        }
        self.resolve_file(&dir.join("index")).await
    }

    async fn resolve_package(&self, package_dir: &Path) -> Option<PathBuf> {
        let manifest = tokio::fs::read_to_string(package_dir.join("package.json"))
            .await
            .ok()
            .and_then(|text| serde_json::from_str::<serde_json::Value>(&text).ok());

        let entry = manifest.as_ref().and_then(|manifest| {
            ["module", "main"]
                .iter()
                .find_map(|field| manifest.get(*field).and_then(|value| value.as_str()))
        });

        if let Some(entry) = entry {
            let candidate = resolve_against(package_dir, entry);
            if is_file(&candidate).await {
                return Some(candidate);
            }
            if let Some(found) = self.resolve_file_or_index(&candidate).await {
                return Some(found);
            }
        }
        self.resolve_index(package_dir).await
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|metadata| metadata.is_file())
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|metadata| metadata.is_dir())
}

/// Splits `@scope/name/sub/path` into `@scope/name` and `sub/path`.
fn split_package_specifier(specifier: &str) -> Option<(&str, Option<&str>)> {
    if specifier.is_empty() {
        return None;
    }
    let name_segments = if specifier.starts_with('@') { 2 } else { 1 };
    match specifier
        .match_indices('/')
        .nth(name_segments - 1)
        .map(|(idx, _)| idx)
    {
        Some(idx) => Some((&specifier[..idx], Some(&specifier[idx + 1..]))),
        None => Some((specifier, None)),
    }
}

impl BundlerPlugin for NodeResolvePlugin {
    fn name(&self) -> &str {
        "node-resolve"
    }

    fn on_resolve<'a>(
        &'a self,
        args: &'a ResolveArgs,
        _build: &'a BuildOptions,
    ) -> PluginFuture<'a, Option<ResolveResult>> {
        Box::pin(async move {
            // entry points belong to the virtual module plugin
            if args.kind == ResolveKind::EntryPoint || args.namespace != FILE_NAMESPACE {
                return Ok(None);
            }
            Ok(self
                .resolve_on_disk(&args.path, &args.importer)
                .await
                .map(|path| ResolveResult {
                    path,
                    ..Default::default()
                }))
        })
    }
}

/// Serves the registry's files: resolution through [`ModuleResolver`],
/// loading through [`ContentTransformPipeline`].
#[derive(Debug)]
pub struct VirtualModulePlugin {
    resolver: ModuleResolver,
    pipeline: ContentTransformPipeline,
}

impl VirtualModulePlugin {
    pub fn new(resolver: ModuleResolver, pipeline: ContentTransformPipeline) -> Self {
        Self { resolver, pipeline }
    }

    fn is_in_memory(args: &LoadArgs) -> bool {
        args.plugin_data
            .as_ref()
            .and_then(|data| data.get(IN_MEMORY_KEY))
            .and_then(|flag| flag.as_bool())
            .unwrap_or(false)
    }
}

impl BundlerPlugin for VirtualModulePlugin {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn on_resolve<'a>(
        &'a self,
        args: &'a ResolveArgs,
        _build: &'a BuildOptions,
    ) -> PluginFuture<'a, Option<ResolveResult>> {
        let resolved = match self.resolver.resolve(&args.path, &args.importer) {
            Resolution::Virtual(path) => Some(ResolveResult {
                path,
                plugin_data: Some(json!({ IN_MEMORY_KEY: true })),
                ..Default::default()
            }),
            Resolution::Deferred => None,
        };
        Box::pin(async move { Ok(resolved) })
    }

    fn on_load<'a>(
        &'a self,
        args: &'a LoadArgs,
        build: &'a BuildOptions,
    ) -> PluginFuture<'a, Option<LoadResult>> {
        Box::pin(async move {
            if !Self::is_in_memory(args) {
                return Ok(None);
            }
            let loaded = self.pipeline.load(&args.path, build).await?;
            Ok(Some(loaded))
        })
    }
}

/// Compiles markup documents that were not served from memory, i.e. ones
/// imported from real packages or directories on disk.
#[derive(Clone)]
pub struct MarkupFallbackPlugin {
    compiler: Arc<dyn MarkupCompiler>,
    options: CompileOptions,
}

impl std::fmt::Debug for MarkupFallbackPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkupFallbackPlugin")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl MarkupFallbackPlugin {
    /// Uses the compiler's defaults with the automatic JSX runtime imported
    /// from the framework.
    pub fn new(compiler: Arc<dyn MarkupCompiler>) -> Self {
        Self::with_options(
            compiler,
            CompileOptions {
                jsx_import_source: Some(FRAMEWORK_MODULE.to_string()),
                ..Default::default()
            },
        )
    }

    pub fn with_options(compiler: Arc<dyn MarkupCompiler>, options: CompileOptions) -> Self {
        Self { compiler, options }
    }
}

impl BundlerPlugin for MarkupFallbackPlugin {
    fn name(&self) -> &str {
        "mdx"
    }

    fn on_load<'a>(
        &'a self,
        args: &'a LoadArgs,
        _build: &'a BuildOptions,
    ) -> PluginFuture<'a, Option<LoadResult>> {
        Box::pin(async move {
            if args.namespace != FILE_NAMESPACE
                || extension_of(&args.path) != Some(MARKUP_EXTENSION)
                || VirtualModulePlugin::is_in_memory(args)
            {
                return Ok(None);
            }
            let contents = tokio::fs::read_to_string(&args.path).await?;
            let file = VFile::new(&args.path, contents);
            let code = self
                .compiler
                .compile(&file, &self.options)
                .await
                .map_err(|source| MdxBundlerError::Compile {
                    path: args.path.clone(),
                    source,
                })?;
            Ok(Some(LoadResult {
                contents: code,
                loader: Loader::Js,
                resolve_dir: args.path.parent().map(Path::to_path_buf),
            }))
        })
    }
}
