use packops_core::paths;
use std::path::{Path, PathBuf};

/// Resolve the packops root directory.
///
/// Priority:
/// 1. `--root` flag / `PACKOPS_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.packops/`
/// 3. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_marked_ancestor(&cwd).unwrap_or(cwd)
}

fn find_marked_ancestor(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| paths::packops_dir(dir).is_dir())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        let result = resolve_root(Some(dir.path()));
        assert_eq!(result, dir.path());
    }

    #[test]
    fn finds_packops_dir_above_start() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".packops")).unwrap();
        let subdir = dir.path().join("pack-crm/data");
        std::fs::create_dir_all(&subdir).unwrap();

        assert_eq!(find_marked_ancestor(&subdir).as_deref(), Some(dir.path()));
    }

    #[test]
    fn unmarked_tree_has_no_root() {
        let dir = TempDir::new().unwrap();
        assert!(find_marked_ancestor(dir.path()).is_none());
    }
}
