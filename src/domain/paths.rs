//! Mapping between compiled file locations and logical content paths.

use std::path::{Component, Path};

/// Derive the rooted node path for a compiled file.
///
/// `compiled/posts/news.js` under root `compiled` becomes `/posts/news`.
/// Returns `None` when the file has no usable name.
pub fn node_path(root: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(root).unwrap_or(file);
    let mut parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    let last = parts.pop()?;
    parts.push(file_stem(Path::new(&last))?);
    Some(format!("/{}", parts.join("/")))
}

/// File name without its final extension.
pub fn file_stem(file: &Path) -> Option<String> {
    file.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
}

/// Non-empty `/`-separated segments of a logical path.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// Rooted paths of every proper ancestor, shallowest first.
///
/// `/a/b/c` yields `/a` and `/a/b`.
pub fn ancestors(path: &str) -> Vec<String> {
    let parts: Vec<&str> = segments(path).collect();
    (1..parts.len())
        .map(|depth| format!("/{}", parts[..depth].join("/")))
        .collect()
}
