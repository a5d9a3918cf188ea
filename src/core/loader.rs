//! CK-010: Recipe path resolution and the filesystem seam.

use std::io;
use std::path::{Component, Path, PathBuf};

/// File name used when an include target names a directory.
pub const DEFAULT_RECIPE: &str = "default.yml";

/// Extension every recipe path carries.
pub const RECIPE_EXTENSION: &str = ".yml";

/// Filesystem access needed to locate and read recipes.
pub trait RecipeLoader {
    fn is_dir(&self, path: &Path) -> bool;
    fn exists(&self, path: &Path) -> bool;
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

/// The local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl RecipeLoader for LocalFs {
    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// Make `target` absolute against `base`, expanding a leading `~` and
/// folding `.`/`..` lexically. The result need not exist.
pub fn expand_path(target: &str, base: &Path) -> PathBuf {
    let joined = match target.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => {
            let home = std::env::var_os("HOME").map(PathBuf::from);
            match home {
                Some(home) => home.join(rest.trim_start_matches('/')),
                None => base.join(target),
            }
        }
        _ => base.join(target),
    };
    normalize(&joined)
}

/// Fold `.` and `..` components lexically. The result need not exist.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve an `include_recipe` target relative to `base_dir`.
///
/// A directory resolves to its `default.yml`; a path without the `.yml`
/// suffix gets one appended.
pub fn resolve_recipe_path(loader: &dyn RecipeLoader, target: &str, base_dir: &Path) -> PathBuf {
    let mut path = expand_path(target, base_dir);
    if loader.is_dir(&path) {
        path.push(DEFAULT_RECIPE);
    }
    if !path.as_os_str().to_string_lossy().ends_with(RECIPE_EXTENSION) {
        let mut raw = path.into_os_string();
        raw.push(RECIPE_EXTENSION);
        path = PathBuf::from(raw);
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ck010_expand_relative() {
        let p = expand_path("../base/users", Path::new("/srv/recipes/web"));
        assert_eq!(p, PathBuf::from("/srv/recipes/base/users"));
    }

    #[test]
    fn test_ck010_expand_absolute_ignores_base() {
        let p = expand_path("/opt/recipes/./db", Path::new("/srv/recipes"));
        assert_eq!(p, PathBuf::from("/opt/recipes/db"));
    }

    #[test]
    fn test_ck010_expand_parent_past_root() {
        let p = expand_path("../../../../x", Path::new("/srv"));
        assert_eq!(p, PathBuf::from("/x"));
    }

    #[cfg(unix)]
    #[test]
    fn test_ck010_normalize_keeps_non_utf8_bytes() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;
        let name = OsStr::from_bytes(b"caf\xe9.yml");
        let p = normalize(&Path::new("/srv/recipes/./web/..").join(name));
        assert_eq!(p, Path::new("/srv/recipes").join(name));
    }

    #[test]
    fn test_ck010_appends_extension() {
        let dir = tempfile::tempdir().unwrap();
        let p = resolve_recipe_path(&LocalFs, "nginx", dir.path());
        assert_eq!(p, dir.path().join("nginx.yml"));
    }

    #[test]
    fn test_ck010_keeps_existing_extension() {
        let dir = tempfile::tempdir().unwrap();
        let p = resolve_recipe_path(&LocalFs, "nginx.yml", dir.path());
        assert_eq!(p, dir.path().join("nginx.yml"));
    }

    #[test]
    fn test_ck010_other_extension_gets_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let p = resolve_recipe_path(&LocalFs, "nginx.yaml", dir.path());
        assert_eq!(p, dir.path().join("nginx.yaml.yml"));
    }

    #[test]
    fn test_ck010_directory_resolves_to_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("web")).unwrap();
        let p = resolve_recipe_path(&LocalFs, "web", dir.path());
        assert_eq!(p, dir.path().join("web").join("default.yml"));
    }

    #[test]
    fn test_ck010_local_fs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.yml");
        assert!(!LocalFs.exists(&path));
        std::fs::write(&path, "[]").unwrap();
        assert!(LocalFs.exists(&path));
        assert!(!LocalFs.is_dir(&path));
        assert_eq!(LocalFs.read_to_string(&path).unwrap(), "[]");
    }
}
