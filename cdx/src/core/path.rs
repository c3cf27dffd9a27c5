//! Lexical path normalization for change reconciliation.
//!
//! Agent-reported paths may be absolute or relative to the working directory,
//! while `git status` reports paths relative to the repository root. Both are
//! mapped to one comparable form before de-duplication. No filesystem access
//! happens here.

use std::path::{Component, Path, PathBuf};

/// Normalize a reported change path for comparison and output.
///
/// Relative paths are resolved against `base`. The result is `/`-separated and
/// relative to `repo_root` when it lies inside it, absolute otherwise.
pub fn normalize_change_path(path: &str, base: &Path, repo_root: &Path) -> String {
    let reported = if cfg!(windows) {
        path.replace('\\', "/")
    } else {
        path.to_string()
    };
    let reported = Path::new(&reported);
    let absolute = if reported.is_absolute() {
        lexical_clean(reported)
    } else {
        lexical_clean(&base.join(reported))
    };
    relative_to_root(&absolute, repo_root).unwrap_or_else(|| absolute.display().to_string())
}

/// Render `path` relative to `repo_root` with `/` separators, if it lies inside.
pub fn relative_to_root(path: &Path, repo_root: &Path) -> Option<String> {
    let path = lexical_clean(path);
    let root = lexical_clean(repo_root);
    let relative = path.strip_prefix(&root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Drop `.` components and resolve `..` against preceding normal components.
fn lexical_clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(
                    cleaned.components().next_back(),
                    Some(Component::Normal(_))
                ) && cleaned.pop();
                if !popped && !cleaned.has_root() {
                    cleaned.push("..");
                }
            }
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                cleaned.push(component.as_os_str());
            }
        }
    }
    cleaned
}
