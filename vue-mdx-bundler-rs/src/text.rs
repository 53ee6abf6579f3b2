//! Text and path utilities shared by the resolver and the transform pipeline.

use std::path::{Component, Path, PathBuf};

/// Strips the UTF-8 BOM (byte order mark) from the beginning of text if present.
pub fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{FEFF}').unwrap_or(text)
}

/// Lexically normalises a path: `.` segments are dropped and `..` segments pop
/// their parent. The filesystem is never consulted, so virtual paths that do
/// not exist on disk normalise the same way real ones do.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                // `..` above the root stays at the root
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            Component::Normal(segment) => normalized.push(segment),
        }
    }
    normalized
}

/// Joins `specifier` onto `base` and normalises the result. An absolute
/// specifier replaces the base entirely.
pub fn resolve_against(base: &Path, specifier: &str) -> PathBuf {
    normalize_path(&base.join(specifier))
}

/// Returns the extension of `path` without the leading dot, or `None` when
/// the file name carries no extension.
pub fn extension_of(path: &Path) -> Option<&str> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
}

/// Appends `.ext` to the full path, keeping any dots already in the file name.
pub fn with_appended_extension(path: &Path, ext: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(ext);
    PathBuf::from(raw)
}

/// True for `./x`, `../x` and absolute specifiers, which name files rather
/// than packages.
pub fn is_path_specifier(specifier: &str) -> bool {
    specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier == "."
        || specifier == ".."
        || Path::new(specifier).is_absolute()
}
