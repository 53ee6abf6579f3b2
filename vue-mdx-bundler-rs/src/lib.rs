// Allow uninlined format args for cleaner bail!/anyhow! macros
#![allow(clippy::uninlined_format_args)]
#![doc = include_str!("../README.md")]

pub mod bundler;
pub mod compiler;
pub mod error;
pub mod frontmatter;
pub mod loader;
pub mod output;
pub mod plugin;
pub mod plugins;
pub mod registry;
pub mod resolver;
pub mod text;
pub mod transform;

#[macro_use]
extern crate lazy_static;

pub use anyhow;
pub use bundler::{BundleMdxOptions, MdxBundler};
pub use compiler::{CodeGenerator, CompileOptions, MarkupCompiler, MdxjsCompiler, VFile};
pub use error::{MdxBundlerError, Result};
pub use frontmatter::Frontmatter;
pub use loader::Loader;
pub use output::ComponentBundle;
pub use plugin::{BuildOptions, BundlerPlugin, HostBundler};
pub use plugins::{GlobalSpec, ModuleInfo};
pub use serde_json;
