//! A small host bundler and code generator for driving the bundler end to
//! end without a JavaScript toolchain.
//!
//! The host walks the module graph through the configured plugins the same
//! way a real bundler does, but leaves module contents untransformed and
//! simply concatenates them, so tests can assert on what ended up in the
//! bundle and which modules were visited.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use futures::future::join_all;
use regex::Regex;

use vue_mdx_bundler_rs::compiler::{CodeGenerator, CompileOptions, MarkupCompiler, VFile};
use vue_mdx_bundler_rs::frontmatter::split_frontmatter;
use vue_mdx_bundler_rs::plugin::{
    BuildOptions, BuildOutput, HostBundler, LoadArgs, LoadResult, OutputFile, PluginFuture,
    ResolveArgs, ResolveResult, FILE_NAMESPACE,
};
use vue_mdx_bundler_rs::registry::ENTRY_OUTPUT_NAME;
use vue_mdx_bundler_rs::text::resolve_against;
use vue_mdx_bundler_rs::Loader;

lazy_static::lazy_static! {
    static ref IMPORT_RE: Regex = Regex::new(
        r#"(?m)^\s*(?:(?:import|export)\b[^;\n]*?\bfrom\s*|import\s*)["']([^"']+)["']"#
    )
    .unwrap();
    static ref NAMED_IMPORT_RE: Regex =
        Regex::new(r#"(?m)^\s*import\s*\{([^}]*)\}\s*from\s*["']([^"']+)["'];?"#).unwrap();
    static ref DEFAULT_IMPORT_RE: Regex =
        Regex::new(r#"(?m)^\s*import\s+([A-Za-z_$][\w$]*)\s+from\s*["']([^"']+)["'];?"#)
            .unwrap();
    static ref EXPORT_DEFAULT_FUNCTION_RE: Regex =
        Regex::new(r"\bexport default function\s+([A-Za-z_$][\w$]*)").unwrap();
    static ref EXPORT_DEFAULT_RE: Regex =
        Regex::new(r"\bexport default ([A-Za-z_$][\w$]*);").unwrap();
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A module the host visited, keyed the way the host dedupes modules.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleId {
    pub namespace: String,
    pub path: PathBuf,
}

impl ModuleId {
    fn from_resolved(resolved: &ResolveResult) -> Self {
        Self {
            namespace: resolved.namespace().to_string(),
            path: resolved.path.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeHostBundler {
    loaded: Mutex<Vec<ModuleId>>,
    builds: Mutex<Vec<BuildSummary>>,
}

/// What a build was asked to do, captured for assertions.
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub entry_points: Vec<PathBuf>,
    pub plugins: Vec<String>,
    pub write: Option<bool>,
    pub outdir: Option<PathBuf>,
    pub global_name: Option<String>,
    pub define: Vec<(String, String)>,
}

impl FakeHostBundler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn loaded(&self) -> Vec<ModuleId> {
        self.loaded.lock().unwrap().clone()
    }

    pub fn loaded_in(&self, namespace: &str) -> Vec<PathBuf> {
        self.loaded()
            .into_iter()
            .filter(|id| id.namespace == namespace)
            .map(|id| id.path)
            .collect()
    }

    pub fn builds(&self) -> Vec<BuildSummary> {
        self.builds.lock().unwrap().clone()
    }

    async fn resolve(
        &self,
        args: &ResolveArgs,
        options: &BuildOptions,
    ) -> anyhow::Result<ResolveResult> {
        for plugin in &options.plugins {
            if let Some(resolved) = plugin.on_resolve(args, options).await? {
                return Ok(resolved);
            }
        }
        default_resolve(args).ok_or_else(|| {
            anyhow!(
                "Could not resolve {:?} from {}",
                args.path,
                args.importer.display()
            )
        })
    }

    async fn load(&self, args: &LoadArgs, options: &BuildOptions) -> anyhow::Result<LoadResult> {
        for plugin in &options.plugins {
            if let Some(loaded) = plugin.on_load(args, options).await? {
                return Ok(loaded);
            }
        }
        if args.namespace != FILE_NAMESPACE {
            return Err(anyhow!(
                "No loader for {}:{}",
                args.namespace,
                args.path.display()
            ));
        }
        let contents = tokio::fs::read_to_string(&args.path).await?;
        Ok(LoadResult {
            contents,
            loader: Loader::Default,
            resolve_dir: None,
        })
    }

    async fn bundle(&self, options: &BuildOptions) -> anyhow::Result<String> {
        let mut seen = HashSet::new();
        let mut chunks = Vec::new();
        let mut pending: Vec<ResolveArgs> = options
            .entry_points
            .iter()
            .map(|entry| ResolveArgs::entry_point(entry.to_string_lossy()))
            .collect();

        while let Some(args) = pending.pop() {
            let resolved = self.resolve(&args, options).await?;
            if resolved.external {
                continue;
            }
            let id = ModuleId::from_resolved(&resolved);
            if !seen.insert(id.clone()) {
                continue;
            }

            let loaded = self.load(&LoadArgs::from_resolved(&resolved), options).await?;
            self.loaded.lock().unwrap().push(id.clone());

            let importer = match &loaded.resolve_dir {
                Some(dir) => dir.join(resolved.path.file_name().unwrap_or_default()),
                None => resolved.path.clone(),
            };
            for captures in IMPORT_RE.captures_iter(&loaded.contents) {
                pending.push(ResolveArgs::import(&captures[1], importer.clone()));
            }

            let mut contents = loaded.contents;
            for (expression, value) in &options.define {
                contents = contents.replace(expression.as_str(), value);
            }
            chunks.push(format!(
                "// {}:{}\n{}",
                id.namespace,
                id.path.display(),
                contents
            ));
        }

        let global_name = options.global_name.as_deref().unwrap_or("module");
        Ok(format!(
            "var {global_name}=(()=>{{\n{}\n}})();",
            chunks.join("\n")
        ))
    }
}

/// Exact files on disk, relative to the importer or under `node_modules`.
/// Packages that are not installed stay external imports.
fn default_resolve(args: &ResolveArgs) -> Option<ResolveResult> {
    let importer_dir = args.importer.parent().unwrap_or(Path::new("/"));
    if args.path.starts_with('.') || args.path.starts_with('/') {
        return Some(resolve_against(importer_dir, &args.path))
            .filter(|path| path.is_file())
            .map(|path| ResolveResult {
                path,
                ..Default::default()
            });
    }
    let installed = importer_dir
        .ancestors()
        .map(|dir| dir.join("node_modules").join(&args.path))
        .find(|path| path.is_file());
    Some(match installed {
        Some(path) => ResolveResult {
            path,
            ..Default::default()
        },
        None => ResolveResult {
            path: PathBuf::from(&args.path),
            external: true,
            ..Default::default()
        },
    })
}

impl HostBundler for FakeHostBundler {
    fn build<'a>(&'a self, options: &'a BuildOptions) -> PluginFuture<'a, BuildOutput> {
        Box::pin(async move {
            self.builds.lock().unwrap().push(BuildSummary {
                entry_points: options.entry_points.clone(),
                plugins: options
                    .plugins
                    .iter()
                    .map(|plugin| plugin.name().to_string())
                    .collect(),
                write: options.write,
                outdir: options.outdir.clone(),
                global_name: options.global_name.clone(),
                define: options
                    .define
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            });

            let code = self.bundle(options).await?;
            let out_name = Path::new(ENTRY_OUTPUT_NAME);
            match (options.write, &options.outdir) {
                (Some(true), Some(outdir)) => {
                    tokio::fs::create_dir_all(outdir).await?;
                    tokio::fs::write(outdir.join(out_name), code).await?;
                    Ok(BuildOutput { output_files: None })
                }
                _ => Ok(BuildOutput {
                    output_files: Some(vec![OutputFile {
                        path: options.outdir.clone().unwrap_or_default().join(out_name),
                        contents: code.into_bytes(),
                    }]),
                }),
            }
        })
    }
}

/// Resolves then loads every specifier at once, the way a host with a
/// parallel graph walk would.
pub async fn resolve_and_load_all(
    options: &BuildOptions,
    requests: Vec<ResolveArgs>,
) -> Vec<anyhow::Result<LoadResult>> {
    let host = FakeHostBundler::default();
    join_all(requests.iter().map(|args| {
        let host = &host;
        async move {
            let resolved = host.resolve(args, options).await?;
            host.load(&LoadArgs::from_resolved(&resolved), options).await
        }
    }))
    .await
}

/// Stands in for the Vue JSX plugin: keeps the compiled module's imports and
/// body, and adds the runtime import the real plugin emits.
#[derive(Debug, Default)]
pub struct VueJsxGenerator {
    calls: Mutex<Vec<(PathBuf, Vec<String>)>>,
}

impl VueJsxGenerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<(PathBuf, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl CodeGenerator for VueJsxGenerator {
    fn generate<'a>(
        &'a self,
        path: &'a Path,
        source: &'a str,
        plugins: &'a [String],
    ) -> PluginFuture<'a, String> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap()
                .push((path.to_path_buf(), plugins.to_vec()));
            Ok(format!(
                "import {{ createVNode as _createVNode, resolveComponent as _resolveComponent, Fragment as _Fragment }} from \"vue\";\n{}",
                source.trim_end()
            ))
        })
    }
}

/// A code generator that rejects everything.
#[derive(Debug, Default)]
pub struct RejectingGenerator;

impl CodeGenerator for RejectingGenerator {
    fn generate<'a>(
        &'a self,
        _path: &'a Path,
        _source: &'a str,
        _plugins: &'a [String],
    ) -> PluginFuture<'a, String> {
        Box::pin(async { Err(anyhow!("Unexpected token in generated JSX")) })
    }
}

/// Host that emits code a JavaScript engine can run: every module becomes a
/// function in a CommonJS-style registry and the entry's exports are the
/// bundle's value. Only the import and export forms the test compiler and
/// generator emit are understood.
#[derive(Debug, Default)]
pub struct ScriptHostBundler {
    inner: FakeHostBundler,
}

impl ScriptHostBundler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    async fn bundle(&self, options: &BuildOptions) -> anyhow::Result<String> {
        let entry_point = options
            .entry_points
            .first()
            .ok_or_else(|| anyhow!("no entry point"))?;
        let entry = self
            .inner
            .resolve(
                &ResolveArgs::entry_point(entry_point.to_string_lossy()),
                options,
            )
            .await?;
        let entry_key = module_key(&entry);

        let mut seen = HashSet::new();
        let mut modules = Vec::new();
        let mut pending = vec![entry];
        while let Some(resolved) = pending.pop() {
            let key = module_key(&resolved);
            if !seen.insert(key.clone()) {
                continue;
            }
            let loaded = self
                .inner
                .load(&LoadArgs::from_resolved(&resolved), options)
                .await?;
            let importer = match &loaded.resolve_dir {
                Some(dir) => dir.join(resolved.path.file_name().unwrap_or_default()),
                None => resolved.path.clone(),
            };

            let specifiers: Vec<String> = IMPORT_RE
                .captures_iter(&loaded.contents)
                .map(|captures| captures[1].to_string())
                .collect();
            let mut keys = HashMap::new();
            for specifier in specifiers {
                let dependency = self
                    .inner
                    .resolve(&ResolveArgs::import(&specifier, importer.clone()), options)
                    .await?;
                if dependency.external {
                    return Err(anyhow!("{specifier:?} was left external"));
                }
                keys.insert(specifier, module_key(&dependency));
                pending.push(dependency);
            }

            let mut contents = loaded.contents;
            for (expression, value) in &options.define {
                contents = contents.replace(expression.as_str(), value);
            }
            modules.push(format!(
                "{}: function (module, exports) {{\n{}\n}},",
                serde_json::to_string(&key)?,
                lower_module(&contents, &keys)
            ));
        }

        let global_name = options.global_name.as_deref().unwrap_or("module");
        Ok(format!(
            r#"var {global_name}=(()=>{{
const __modules = {{
{}
}};
const __cache = {{}};
function __require(key) {{
  if (!(key in __cache)) {{
    const module = {{ exports: {{}} }};
    __cache[key] = module;
    __modules[key](module, module.exports);
  }}
  return __cache[key].exports;
}}
function __default(m) {{ return m && m.__esModule ? m.default : m; }}
return __require({});
}})();"#,
            modules.join("\n"),
            serde_json::to_string(&entry_key)?
        ))
    }
}

fn module_key(resolved: &ResolveResult) -> String {
    format!("{}:{}", resolved.namespace(), resolved.path.display())
}

/// Rewrites ESM imports and default exports into registry lookups.
fn lower_module(code: &str, keys: &HashMap<String, String>) -> String {
    let require = |specifier: &str| {
        let key = keys.get(specifier).map(String::as_str).unwrap_or(specifier);
        format!("__require({})", serde_json::Value::from(key))
    };
    let code = NAMED_IMPORT_RE.replace_all(code, |captures: &regex::Captures| {
        let bindings = captures[1].replace(" as ", ": ");
        format!("const {{{bindings}}} = {};", require(&captures[2]))
    });
    let code = DEFAULT_IMPORT_RE.replace_all(&code, |captures: &regex::Captures| {
        format!(
            "const {} = __default({});",
            &captures[1],
            require(&captures[2])
        )
    });
    let code = EXPORT_DEFAULT_FUNCTION_RE.replace_all(
        &code,
        "exports.__esModule = true; exports.default = $1; function $1",
    );
    EXPORT_DEFAULT_RE
        .replace_all(&code, "exports.__esModule = true; exports.default = $1;")
        .into_owned()
}

impl HostBundler for ScriptHostBundler {
    fn build<'a>(&'a self, options: &'a BuildOptions) -> PluginFuture<'a, BuildOutput> {
        Box::pin(async move {
            let code = self.bundle(options).await?;
            Ok(BuildOutput {
                output_files: Some(vec![OutputFile {
                    path: options
                        .outdir
                        .clone()
                        .unwrap_or_default()
                        .join(ENTRY_OUTPUT_NAME),
                    contents: code.into_bytes(),
                }]),
            })
        })
    }
}

/// Stands in for the markup compiler with the render code the Vue JSX
/// plugin would end up producing. Understands `import` lines, `# ` headings,
/// self-closing `<Component/>` tags and plain paragraphs.
///
/// Imported components are referenced directly; any other tag goes through
/// `_resolveComponent`, like a globally registered Vue component.
#[derive(Debug, Default)]
pub struct RenderCompiler;

impl RenderCompiler {
    fn render(&self, file: &VFile) -> anyhow::Result<String> {
        let body = match split_frontmatter(&file.contents) {
            Some(block) => block.body,
            None => file.contents.as_str(),
        };

        let mut imports = Vec::new();
        let mut imported = Vec::new();
        let mut children = Vec::new();
        for line in body.lines().map(str::trim).filter(|line| !line.is_empty()) {
            if let Some(rest) = line.strip_prefix("import ") {
                if let Some(name) = rest.split_whitespace().next() {
                    imported.push(name.to_string());
                }
                imports.push(line.to_string());
            } else if let Some(text) = line.strip_prefix("# ") {
                children.push(format!(
                    "_createVNode(\"h1\", null, [{}])",
                    serde_json::to_string(text)?
                ));
            } else if let Some(name) = line
                .strip_prefix('<')
                .and_then(|rest| rest.strip_suffix("/>"))
                .map(str::trim)
            {
                let component = if imported.iter().any(|import| import == name) {
                    name.to_string()
                } else {
                    format!("_resolveComponent({})", serde_json::to_string(name)?)
                };
                children.push(format!("_createVNode({component}, null, null)"));
            } else {
                children.push(format!(
                    "_createVNode(\"p\", null, [{}])",
                    serde_json::to_string(line)?
                ));
            }
        }

        Ok(format!(
            "{}\nfunction _createMdxContent(props) {{\n  return _createVNode(_Fragment, null, [{}]);\n}}\nfunction MDXContent(props = {{}}) {{\n  return _createMdxContent(props);\n}}\nexport default MDXContent;\n",
            imports.join("\n"),
            children.join(", ")
        ))
    }
}

impl MarkupCompiler for RenderCompiler {
    fn compile<'a>(
        &'a self,
        file: &'a VFile,
        _options: &'a CompileOptions,
    ) -> PluginFuture<'a, String> {
        Box::pin(async move { self.render(file) })
    }
}

/// A minimal `vue` global and a `render` function turning the vnodes it
/// creates into HTML-ish text. Components are plain functions returning
/// vnodes; a `resolveComponent` call reaching this runtime throws.
pub const VUE_RUNTIME: &str = r##"
const vue = {
  Fragment: "#fragment",
  createVNode(type, props, children) { return { type, children }; },
  resolveComponent(name) { throw new Error("resolveComponent(" + name + ") reached the runtime"); },
};
function render(node) {
  if (node == null) return "";
  if (typeof node === "string") return node;
  if (Array.isArray(node)) return node.map(render).join("");
  if (typeof node.type === "function") return render(node.type());
  if (node.type === vue.Fragment) return render(node.children);
  return "<" + node.type + ">" + render(node.children) + "</" + node.type + ">";
}
"##;

/// Script evaluating bundle `code` as a function body with `vue` in scope
/// and rendering the component it returns.
pub fn render_script(code: &str) -> String {
    format!(
        "{VUE_RUNTIME}\nconst Component = new Function(\"vue\", {})(vue);\nrender(Component())",
        serde_json::Value::from(code)
    )
}

/// Runs `script` in a fresh V8 isolate and returns its completion value as
/// a string.
pub fn evaluate(script: String) -> anyhow::Result<String> {
    let mut runtime = deno_core::JsRuntime::new(deno_core::RuntimeOptions::default());
    let result = runtime
        .execute_script("<anon>", script)
        .map_err(|err| anyhow!("{err}"))?;
    deno_core::scope!(scope, &mut runtime);
    let local = deno_core::v8::Local::new(scope, result);
    Ok(local.to_rust_string_lossy(scope))
}
