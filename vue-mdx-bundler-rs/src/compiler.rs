//! Capabilities that lower a markup document into framework code.
//!
//! [`MarkupCompiler`] turns a document into intermediate component syntax
//! (JSX) and [`CodeGenerator`] turns that JSX into a framework-native render
//! function. Both are injected once when an [`MdxBundler`](crate::MdxBundler)
//! is created. [`MdxjsCompiler`] is the stock markup compiler.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail};
use regex::Regex;

use crate::frontmatter::{extract_frontmatter, split_frontmatter, Frontmatter};
use crate::plugin::PluginFuture;

/// Name of the value the compiled document exports its frontmatter under.
pub const FRONTMATTER_EXPORT_NAME: &str = "frontmatter";

/// Plugin selector for the Vue JSX code generator.
pub const VUE_JSX_PLUGIN: &str = "@vue/babel-plugin-jsx";

lazy_static! {
    static ref IDENTIFIER_RE: Regex = Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap();
}

/// A document handed to the markup compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VFile {
    pub path: PathBuf,
    pub contents: String,
}

impl VFile {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }
}

/// A caller-supplied text transform run by the markup compiler.
pub trait SourcePlugin: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn transform(&self, file: &VFile, source: String) -> anyhow::Result<String>;
}

/// Plugins applied to the document before it is compiled.
#[derive(Debug, Clone)]
pub enum RemarkPlugin {
    /// Recognise a leading `---` block and keep it out of the rendered body.
    Frontmatter,
    /// Export the recognised block as a named value of the compiled module.
    MdxFrontmatter { name: String },
    Custom(Arc<dyn SourcePlugin>),
}

/// Configuration of one markup compilation.
///
/// Callers extend [`CompileOptions::baseline`] by appending to the plugin
/// lists; replacing the lists drops the frontmatter handling.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Keep JSX in the output instead of lowering it to function calls.
    pub jsx: bool,
    /// Package the automatic JSX runtime is imported from when `jsx` is
    /// off; the compiler's default applies when unset.
    pub jsx_import_source: Option<String>,
    pub development: bool,
    pub remark_plugins: Vec<RemarkPlugin>,
    /// Text transforms applied to the compiled module.
    pub recma_plugins: Vec<Arc<dyn SourcePlugin>>,
}

impl CompileOptions {
    /// Options every virtual document is compiled with before the caller's
    /// hook runs.
    pub fn baseline() -> Self {
        Self {
            jsx: true,
            jsx_import_source: None,
            development: false,
            remark_plugins: vec![
                RemarkPlugin::Frontmatter,
                RemarkPlugin::MdxFrontmatter {
                    name: FRONTMATTER_EXPORT_NAME.to_string(),
                },
            ],
            recma_plugins: vec![],
        }
    }
}

/// Compiles a markup document into intermediate component syntax.
pub trait MarkupCompiler: Send + Sync {
    fn compile<'a>(&'a self, file: &'a VFile, options: &'a CompileOptions)
        -> PluginFuture<'a, String>;
}

/// Turns intermediate component syntax into framework render code.
pub trait CodeGenerator: Send + Sync {
    fn generate<'a>(
        &'a self,
        path: &'a Path,
        source: &'a str,
        plugins: &'a [String],
    ) -> PluginFuture<'a, String>;
}

/// [`MarkupCompiler`] backed by the `mdxjs` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct MdxjsCompiler;

impl MdxjsCompiler {
    /// Compiles synchronously; the async trait method delegates here.
    pub fn compile_document(&self, file: &VFile, options: &CompileOptions) -> anyhow::Result<String> {
        let recognise_frontmatter = options
            .remark_plugins
            .iter()
            .any(|plugin| matches!(plugin, RemarkPlugin::Frontmatter));

        let frontmatter = if recognise_frontmatter && split_frontmatter(&file.contents).is_some() {
            Some(extract_frontmatter(&file.contents)?.data)
        } else {
            None
        };

        let mut source = file.contents.clone();
        let mut exports = Vec::new();
        for plugin in &options.remark_plugins {
            match plugin {
                RemarkPlugin::Frontmatter => source = blank_frontmatter(&source),
                RemarkPlugin::MdxFrontmatter { name } => {
                    if !IDENTIFIER_RE.is_match(name) {
                        bail!("`{name}` is not a valid export name for frontmatter");
                    }
                    if let Some(data) = &frontmatter {
                        exports.push(frontmatter_export(name, data)?);
                    }
                }
                RemarkPlugin::Custom(plugin) => {
                    log::trace!("Applying remark plugin {}", plugin.name());
                    source = plugin.transform(file, source)?;
                }
            }
        }

        let mdx_options = mdxjs::Options {
            jsx: options.jsx,
            jsx_import_source: options.jsx_import_source.clone(),
            development: options.development,
            filepath: Some(file.path.to_string_lossy().into_owned()),
            ..Default::default()
        };
        let mut code = mdxjs::compile(&source, &mdx_options).map_err(|message| {
            anyhow!("{}: {}", file.path.display(), message)
        })?;

        for export in exports {
            code.push('\n');
            code.push_str(&export);
        }

        for plugin in &options.recma_plugins {
            log::trace!("Applying recma plugin {}", plugin.name());
            code = plugin.transform(file, code)?;
        }
        Ok(code)
    }
}

impl MarkupCompiler for MdxjsCompiler {
    fn compile<'a>(
        &'a self,
        file: &'a VFile,
        options: &'a CompileOptions,
    ) -> PluginFuture<'a, String> {
        Box::pin(async move { self.compile_document(file, options) })
    }
}

/// Replaces the header block with blank lines so positions in compiler
/// diagnostics still match the original document.
fn blank_frontmatter(source: &str) -> String {
    match split_frontmatter(source) {
        Some(block) => {
            let mut blanked = "\n".repeat(block.line_count);
            blanked.push_str(block.body);
            blanked
        }
        None => source.to_string(),
    }
}

fn frontmatter_export(name: &str, data: &Frontmatter) -> anyhow::Result<String> {
    let json = serde_json::to_string(data)?;
    Ok(format!("export const {name} = {json};"))
}
