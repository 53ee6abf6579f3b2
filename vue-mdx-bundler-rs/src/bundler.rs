use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::compiler::{CodeGenerator, CompileOptions, MarkupCompiler, MdxjsCompiler, VFile};
use crate::error::{MdxBundlerError, Result};
use crate::frontmatter::extract_frontmatter;
use crate::output::{ComponentBundle, OutputPackager, GLOBAL_NAME};
use crate::plugin::{BuildOptions, BundlerPlugin, Format, HostBundler, OutputMode};
use crate::plugins::{
    GlobalExternalsPlugin, GlobalSpec, MarkupFallbackPlugin, NodeResolvePlugin,
    VirtualModulePlugin,
};
use crate::registry::{VirtualFileRegistry, FAKE_DIR_NAME};
use crate::resolver::ModuleResolver;
use crate::transform::{CompileOptionsHook, ContentTransformPipeline};

/// Expression replaced at build time by the configured environment name.
pub const NODE_ENV_EXPRESSION: &str = "process.env.NODE_ENV";

pub const DEFAULT_NODE_ENV: &str = "production";

const BUNDLER_BINARY_WARNING: &str = "mdx-bundler warning: the host bundler may be unable to find its binary; if the build fails, point the bundler at its binary explicitly";

/// Caller hook receiving the assembled build configuration and returning
/// the configuration to build with.
pub type BuildOptionsHook = Arc<dyn Fn(BuildOptions) -> BuildOptions + Send + Sync>;

/// Per-call options of [`MdxBundler::bundle`].
#[derive(Clone, Default)]
pub struct BundleMdxOptions {
    /// Auxiliary sources keyed by path relative to `cwd`.
    pub files: BTreeMap<String, String>,
    /// Directory the document is considered to live in. Real files and
    /// packages are resolved from here alongside the virtual ones.
    pub cwd: Option<PathBuf>,
    /// Modules provided as globals instead of being bundled.
    pub globals: BTreeMap<String, GlobalSpec>,
    /// Replace Vue's `resolveComponent` with a function returning the name.
    pub mock_resolve_component: bool,
    pub compile_options: Option<CompileOptionsHook>,
    pub build_options: Option<BuildOptionsHook>,
    /// Value of `process.env.NODE_ENV` in the bundle.
    pub node_env: Option<String>,
    /// Log a warning that the host bundler binary may be missing.
    pub warn_bundler_binary: bool,
}

impl std::fmt::Debug for BundleMdxOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleMdxOptions")
            .field("files", &self.files.keys().collect::<Vec<_>>())
            .field("cwd", &self.cwd)
            .field("globals", &self.globals)
            .field("mock_resolve_component", &self.mock_resolve_component)
            .field("compile_options", &self.compile_options.is_some())
            .field("build_options", &self.build_options.is_some())
            .field("node_env", &self.node_env)
            .field("warn_bundler_binary", &self.warn_bundler_binary)
            .finish()
    }
}

impl BundleMdxOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, source: impl Into<String>) -> Self {
        self.files.insert(path.into(), source.into());
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_global(mut self, module: impl Into<String>, spec: impl Into<GlobalSpec>) -> Self {
        self.globals.insert(module.into(), spec.into());
        self
    }

    pub fn with_mock_resolve_component(mut self, mock: bool) -> Self {
        self.mock_resolve_component = mock;
        self
    }

    pub fn with_compile_options<F>(mut self, hook: F) -> Self
    where
        F: Fn(&VFile, CompileOptions) -> CompileOptions + Send + Sync + 'static,
    {
        self.compile_options = Some(Arc::new(hook));
        self
    }

    pub fn with_build_options<F>(mut self, hook: F) -> Self
    where
        F: Fn(BuildOptions) -> BuildOptions + Send + Sync + 'static,
    {
        self.build_options = Some(Arc::new(hook));
        self
    }

    pub fn with_node_env(mut self, node_env: impl Into<String>) -> Self {
        self.node_env = Some(node_env.into());
        self
    }

    pub fn with_warn_bundler_binary(mut self, warn: bool) -> Self {
        self.warn_bundler_binary = warn;
        self
    }
}

/// Bundles markup documents into self-contained Vue component code.
///
/// The collaborators are injected once and shared by every call; each call
/// builds its own registry and plugin chain, so concurrent calls do not
/// interact.
#[derive(Clone)]
pub struct MdxBundler {
    host: Arc<dyn HostBundler>,
    compiler: Arc<dyn MarkupCompiler>,
    generator: Arc<dyn CodeGenerator>,
}

impl MdxBundler {
    /// Creates a bundler using [`MdxjsCompiler`] for markup.
    pub fn new(host: Arc<dyn HostBundler>, generator: Arc<dyn CodeGenerator>) -> Self {
        Self {
            host,
            compiler: Arc::new(MdxjsCompiler),
            generator,
        }
    }

    pub fn with_compiler(mut self, compiler: Arc<dyn MarkupCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    /// Assembles the configuration for one build over `registry`, before the
    /// caller's build options hook is applied.
    pub fn build_options(
        &self,
        registry: Arc<VirtualFileRegistry>,
        options: &BundleMdxOptions,
    ) -> BuildOptions {
        let node_env = options.node_env.as_deref().unwrap_or(DEFAULT_NODE_ENV);
        let mut define = BTreeMap::new();
        define.insert(
            NODE_ENV_EXPRESSION.to_string(),
            serde_json::Value::from(node_env).to_string(),
        );

        let pipeline = ContentTransformPipeline::new(
            registry.clone(),
            self.compiler.clone(),
            self.generator.clone(),
        )
        .with_compile_options(options.compile_options.clone())
        .with_mock_resolve_component(options.mock_resolve_component);

        let externals: Arc<dyn BundlerPlugin> =
            Arc::new(GlobalExternalsPlugin::new(&options.globals));
        let node_resolve: Arc<dyn BundlerPlugin> = Arc::new(NodeResolvePlugin::default());
        let entry_path = registry.entry_path().to_path_buf();
        let in_memory: Arc<dyn BundlerPlugin> = Arc::new(VirtualModulePlugin::new(
            ModuleResolver::new(registry),
            pipeline,
        ));
        // Only reached for markup the virtual module plugin did not claim,
        // i.e. documents imported from disk or packages.
        let markup_fallback: Arc<dyn BundlerPlugin> =
            Arc::new(MarkupFallbackPlugin::new(self.compiler.clone()));
        let plugins = vec![externals, node_resolve, in_memory, markup_fallback];

        BuildOptions {
            entry_points: vec![entry_path],
            bundle: true,
            write: Some(false),
            outdir: None,
            format: Format::Iife,
            global_name: Some(GLOBAL_NAME.to_string()),
            minify: true,
            define,
            loader: BTreeMap::new(),
            plugins,
        }
    }

    /// Bundles `source` and the auxiliary files in `options` into a
    /// [`ComponentBundle`].
    ///
    /// The host bundler runs exactly once. Output is all or nothing: any
    /// failure, including cleanup of a written output file, fails the call.
    pub async fn bundle(&self, source: &str, options: BundleMdxOptions) -> Result<ComponentBundle> {
        if options.warn_bundler_binary {
            log::warn!("{BUNDLER_BINARY_WARNING}");
        }

        let base_dir = match &options.cwd {
            Some(cwd) if cwd.is_absolute() => cwd.clone(),
            Some(cwd) => std::env::current_dir()?.join(cwd),
            None => std::env::current_dir()?.join(FAKE_DIR_NAME),
        };
        let registry = Arc::new(VirtualFileRegistry::build(
            &base_dir,
            source,
            &options.files,
        )?);
        // Rejected before the host runs; reported against the entry document.
        let frontmatter = extract_frontmatter(source)
            .map_err(|source| MdxBundlerError::Compile {
                path: registry.entry_path().to_path_buf(),
                source,
            })?
            .data;

        let mut build_options = self.build_options(registry, &options);
        if let Some(hook) = &options.build_options {
            build_options = hook(build_options);
        }
        let mode = OutputMode::from_options(&build_options)?;

        log::debug!(
            "Bundling {} with {} plugin(s) ({mode:?})",
            base_dir.display(),
            build_options.plugins.len()
        );
        let output = self
            .host
            .build(&build_options)
            .await
            .map_err(MdxBundlerError::from_host)?;

        OutputPackager::new(mode).package(output, frontmatter).await
    }
}
