//! Lexical path arithmetic.
//!
//! Nothing here touches the filesystem; callers pass absolute paths when
//! they want stable results.

use std::path::{Component, Path, PathBuf};

/// Removes `.` components and folds `..` into the preceding component.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(
                    normalized.components().next_back(),
                    Some(Component::Normal(_))
                ) {
                    normalized.pop();
                } else if !normalized.has_root() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Expresses `target` relative to the directory `base`.
///
/// Falls back to `target` unchanged when the two paths share no root, e.g.
/// one is relative and the other absolute.
#[must_use]
pub fn relative_path(base: &Path, target: &Path) -> PathBuf {
    let base = normalize(base);
    let target = normalize(target);

    if base.has_root() != target.has_root() {
        return target;
    }

    let base_parts: Vec<Component<'_>> = base.components().collect();
    let target_parts: Vec<Component<'_>> = target.components().collect();

    let common = base_parts
        .iter()
        .zip(&target_parts)
        .take_while(|(a, b)| a == b)
        .count();

    if base.has_root() && common == 0 {
        return target;
    }

    let mut relative = PathBuf::new();
    for _ in &base_parts[common..] {
        relative.push("..");
    }
    for part in &target_parts[common..] {
        relative.push(part.as_os_str());
    }

    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    relative
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("a/../../b")), PathBuf::from("../b"));
        assert_eq!(normalize(Path::new("/../a")), PathBuf::from("/a"));
    }

    #[test]
    fn test_relative_sibling_trees() {
        assert_eq!(
            relative_path(Path::new("/work/shop/.edgesite/stack"), Path::new("/work/shop/www/index.html")),
            PathBuf::from("../../www/index.html")
        );
    }

    #[test]
    fn test_relative_is_independent_of_checkout_location() {
        let first = relative_path(Path::new("/home/a/site/.edgesite/stack"), Path::new("/home/a/site/www/x.css"));
        let second = relative_path(Path::new("/runner/build/.edgesite/stack"), Path::new("/runner/build/www/x.css"));
        assert_eq!(first, second);
    }

    #[test]
    fn test_relative_nested_and_same() {
        assert_eq!(
            relative_path(Path::new("/srv"), Path::new("/srv/www/a.html")),
            PathBuf::from("www/a.html")
        );
        assert_eq!(relative_path(Path::new("/srv"), Path::new("/srv")), PathBuf::from("."));
        assert_eq!(
            relative_path(Path::new("relative"), Path::new("/abs/a.html")),
            PathBuf::from("/abs/a.html")
        );
    }
}
