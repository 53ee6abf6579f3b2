//! The load side of the virtual module plugin.
//!
//! Markup documents are lowered in three steps: the markup compiler produces
//! JSX, the code generator turns the JSX into Vue render code, and, when
//! requested, [`mock_resolve_component`] stubs out Vue's runtime component
//! lookup. Every other virtual file is passed through untouched.

use std::path::Path;
use std::sync::Arc;

use regex::Regex;

use crate::compiler::{CodeGenerator, CompileOptions, MarkupCompiler, VFile, VUE_JSX_PLUGIN};
use crate::error::{MdxBundlerError, Result};
use crate::loader::Loader;
use crate::plugin::{BuildOptions, LoadResult};
use crate::registry::VirtualFileRegistry;
use crate::text::extension_of;

/// Extension of documents that go through the markup compiler.
pub const MARKUP_EXTENSION: &str = "mdx";

/// Extension assumed for virtual files named without one.
pub const DEFAULT_EXTENSION: &str = "jsx";

/// Phrase the code generator ends a compiled document with.
pub const DEFAULT_EXPORT_STATEMENT: &str = "export default MDXContent;";

/// Local stand-in for Vue's `resolveComponent`: hands the name back, leaving
/// the component lookup to whoever renders the result.
pub const MOCK_RESOLVE_COMPONENT: &str = "function _resolveComponent(name){ return name }";

lazy_static! {
    // The import specifier emitted by the Vue JSX plugin, with its separator.
    static ref RESOLVE_COMPONENT_IMPORT_RE: Regex =
        Regex::new(r"\bresolveComponent as _resolveComponent\b\s*,?\s*").unwrap();
}

/// Caller hook receiving the baseline compile options for a document and
/// returning the options to compile it with.
pub type CompileOptionsHook = Arc<dyn Fn(&VFile, CompileOptions) -> CompileOptions + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileKind {
    Markup,
    Other { extension: String },
}

impl FileKind {
    pub fn of(path: &Path) -> Self {
        match extension_of(path) {
            Some(MARKUP_EXTENSION) => FileKind::Markup,
            Some(extension) => FileKind::Other {
                extension: extension.to_string(),
            },
            None => FileKind::Other {
                extension: DEFAULT_EXTENSION.to_string(),
            },
        }
    }
}

/// Turns virtual files into load results.
///
/// Holds only shared, immutable state; one instance serves every load of a
/// build, concurrently if the host wants.
pub struct ContentTransformPipeline {
    registry: Arc<VirtualFileRegistry>,
    compiler: Arc<dyn MarkupCompiler>,
    generator: Arc<dyn CodeGenerator>,
    compile_options: Option<CompileOptionsHook>,
    mock_resolve_component: bool,
}

impl std::fmt::Debug for ContentTransformPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentTransformPipeline")
            .field("files", &self.registry.len())
            .field("mock_resolve_component", &self.mock_resolve_component)
            .finish_non_exhaustive()
    }
}

impl ContentTransformPipeline {
    pub fn new(
        registry: Arc<VirtualFileRegistry>,
        compiler: Arc<dyn MarkupCompiler>,
        generator: Arc<dyn CodeGenerator>,
    ) -> Self {
        Self {
            registry,
            compiler,
            generator,
            compile_options: None,
            mock_resolve_component: false,
        }
    }

    pub fn with_compile_options(mut self, hook: Option<CompileOptionsHook>) -> Self {
        self.compile_options = hook;
        self
    }

    pub fn with_mock_resolve_component(mut self, mock: bool) -> Self {
        self.mock_resolve_component = mock;
        self
    }

    /// Loads a path the resolver marked virtual.
    ///
    /// Loader overrides are read from `build`, the options the host is
    /// running with.
    pub async fn load(&self, path: &Path, build: &BuildOptions) -> Result<LoadResult> {
        let contents = self.registry.get(path).ok_or_else(|| {
            MdxBundlerError::Configuration(format!(
                "`{}` was resolved as virtual but is not registered",
                path.display()
            ))
        })?;

        match FileKind::of(path) {
            FileKind::Markup => self.load_markup(path, contents).await,
            FileKind::Other { extension } => {
                let loader = match build.loader_override(&extension) {
                    Some(loader) => loader,
                    None => extension.parse::<Loader>()?,
                };
                Ok(LoadResult {
                    contents: contents.to_string(),
                    loader,
                    resolve_dir: None,
                })
            }
        }
    }

    async fn load_markup(&self, path: &Path, contents: &str) -> Result<LoadResult> {
        let file = VFile::new(path, contents);
        let baseline = CompileOptions::baseline();
        let options = match &self.compile_options {
            Some(hook) => hook(&file, baseline),
            None => baseline,
        };

        log::debug!("Compiling {}", path.display());
        let jsx = self
            .compiler
            .compile(&file, &options)
            .await
            .map_err(|source| MdxBundlerError::Compile {
                path: path.to_path_buf(),
                source,
            })?;

        let plugins = [VUE_JSX_PLUGIN.to_string()];
        let mut code = self
            .generator
            .generate(path, &jsx, &plugins)
            .await
            .map_err(|source| MdxBundlerError::Transform {
                path: path.to_path_buf(),
                source,
            })?;

        if self.mock_resolve_component {
            code = mock_resolve_component(&code);
        }

        Ok(LoadResult {
            contents: code,
            loader: Loader::Jsx,
            resolve_dir: None,
        })
    }
}

/// Replaces the `resolveComponent` runtime import with a local function of
/// the same name that returns its argument.
///
/// This is a text rewrite keyed on the Vue JSX plugin's output: an import
/// specifier `resolveComponent as _resolveComponent` and a closing
/// `export default MDXContent;`. A generator emitting a different shape
/// needs a different rewrite.
pub fn mock_resolve_component(code: &str) -> String {
    let without_import = RESOLVE_COMPONENT_IMPORT_RE.replace(code, "");
    if !without_import.contains(DEFAULT_EXPORT_STATEMENT) {
        log::warn!(
            "Generated code has no `{DEFAULT_EXPORT_STATEMENT}`; resolveComponent was not mocked"
        );
        return without_import.into_owned();
    }
    without_import.replacen(
        DEFAULT_EXPORT_STATEMENT,
        &format!("{MOCK_RESOLVE_COMPONENT} {DEFAULT_EXPORT_STATEMENT}"),
        1,
    )
}
