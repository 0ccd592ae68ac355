use std::path::{Component, Path, PathBuf};

/// Normalize a path by resolving `.` and `..` components without filesystem access.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if !components.is_empty() {
                    components.pop();
                }
            }
            Component::CurDir => {}
            c => components.push(c),
        }
    }
    components.iter().collect()
}

/// Join two paths, handling absolute second path.
pub fn join_path(base: &Path, relative: &Path) -> PathBuf {
    if relative.is_absolute() {
        relative.to_path_buf()
    } else {
        base.join(relative)
    }
}

/// The UTF-8 components of `path` below `base`, compared lexically.
///
/// Returns `None` if `path` is not strictly below `base`, if `path` contains a
/// `..` component, or if any remaining component is not valid UTF-8.
pub fn relative_components(base: &Path, path: &Path) -> Option<Vec<String>> {
    if path.components().any(|c| c == Component::ParentDir) {
        return None;
    }
    let base = normalize_path(base);
    let path = normalize_path(path);
    let rest = path.strip_prefix(&base).ok()?;

    let mut out = Vec::new();
    for component in rest.components() {
        match component {
            Component::Normal(name) => out.push(name.to_str()?.to_string()),
            _ => return None,
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// The last non-empty component of a slash-separated path string.
///
/// Trailing separators and `.` are ignored. Returns `None` for empty or
/// root-only input and when the path ends in `..`.
pub fn final_component(path: &str) -> Option<&str> {
    match Path::new(path).components().next_back()? {
        Component::Normal(name) => name.to_str(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize_path(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
    }

    #[test]
    fn test_join_absolute() {
        assert_eq!(
            join_path(Path::new("/base"), Path::new("/absolute")),
            PathBuf::from("/absolute")
        );
    }

    #[test]
    fn test_join_relative() {
        assert_eq!(
            join_path(Path::new("/base"), Path::new("relative")),
            PathBuf::from("/base/relative")
        );
    }

    #[test]
    fn test_relative_components() {
        assert_eq!(
            relative_components(Path::new("/runtime-mnt/"), Path::new("/runtime-mnt/a/b/c")),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
        assert_eq!(
            relative_components(Path::new("/runtime-mnt"), Path::new("/runtime-mnt/./a//b")),
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_relative_components_outside_base() {
        assert_eq!(relative_components(Path::new("/runtime-mnt"), Path::new("/runtime-mnt")), None);
        assert_eq!(relative_components(Path::new("/runtime-mnt"), Path::new("/other/a")), None);
        // A sibling sharing a string prefix is not below the base.
        assert_eq!(relative_components(Path::new("/runtime-mnt"), Path::new("/runtime-mnt2/a")), None);
        assert_eq!(
            relative_components(Path::new("/runtime-mnt"), Path::new("/runtime-mnt/a/../../etc")),
            None
        );
    }

    #[test]
    fn test_final_component() {
        assert_eq!(final_component("/runtime-mnt/juicefs/default/jfsdemo"), Some("jfsdemo"));
        assert_eq!(final_component("/runtime-mnt/juicefs/default/jfsdemo/"), Some("jfsdemo"));
        assert_eq!(final_component("/runtime-mnt/jfsdemo//"), Some("jfsdemo"));
        assert_eq!(final_component("jfsdemo"), Some("jfsdemo"));
        assert_eq!(final_component("/"), None);
        assert_eq!(final_component(""), None);
        assert_eq!(final_component("/a/.."), None);
    }
}
