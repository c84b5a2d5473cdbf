//! Lexical path confinement checks

use std::path::{Component, Path, PathBuf};

/// Resolve `.` and `..` without touching the filesystem
///
/// `..` at the root stays at the root, matching how the kernel resolves it.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// Whether `raw` stays inside one of `allowed` once resolved against `base`
pub(crate) fn is_path_allowed(raw: &str, base: &Path, allowed: &[PathBuf]) -> bool {
    let candidate = Path::new(raw);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    };
    let resolved = normalize(&joined);

    allowed
        .iter()
        .any(|root| resolved.starts_with(normalize(root)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_parent_components() {
        assert_eq!(
            normalize(Path::new("/home/pi/code/../code/./a.txt")),
            PathBuf::from("/home/pi/code/a.txt")
        );
        assert_eq!(normalize(Path::new("/../etc")), PathBuf::from("/etc"));
    }

    #[test]
    fn test_relative_paths_resolve_against_base() {
        let base = Path::new("/home/pi/code");
        let allowed = vec![PathBuf::from("/home/pi/code")];
        assert!(is_path_allowed("data/out.txt", base, &allowed));
        assert!(!is_path_allowed("../secrets.txt", base, &allowed));
        assert!(!is_path_allowed("/etc/passwd", base, &allowed));
        assert!(is_path_allowed("/home/pi/code/log.txt", base, &allowed));
    }

    #[test]
    fn test_sibling_prefix_is_not_inside() {
        let allowed = vec![PathBuf::from("/home/pi/code")];
        assert!(!is_path_allowed(
            "/home/pi/code-other/x",
            Path::new("/"),
            &allowed
        ));
    }
}
