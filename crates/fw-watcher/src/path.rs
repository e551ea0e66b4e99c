//! Translation of absolute paths into root-relative operation paths.
//!
//! Operation paths are slash-separated and start with `/`, which stands for
//! the watched root itself. The root's absolute prefix never appears in them.

use std::path::PathBuf;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};

use crate::error::WatchError;

/// Expresses `path` relative to `root`.
///
/// # Errors
///
/// Returns [`WatchError::PathTranslation`] if `path` is not `root` or below it.
///
/// # Examples
///
/// ```
/// use fw_watcher::path::relative_path;
/// use camino::Utf8Path;
///
/// let root = Utf8Path::new("/srv/data");
/// assert_eq!(relative_path(Utf8Path::new("/srv/data"), root).unwrap(), "/");
/// assert_eq!(
///     relative_path(Utf8Path::new("/srv/data/a/b.txt"), root).unwrap(),
///     "/a/b.txt"
/// );
/// assert!(relative_path(Utf8Path::new("/srv/other"), root).is_err());
/// ```
pub fn relative_path(path: &Utf8Path, root: &Utf8Path) -> Result<String, WatchError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| WatchError::PathTranslation {
            path: path.to_owned(),
            root: root.to_owned(),
        })?;

    let mut translated = String::with_capacity(relative.as_str().len() + 1);
    for component in relative.components() {
        match component {
            Utf8Component::Normal(name) => {
                translated.push('/');
                translated.push_str(name);
            }
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir | Utf8Component::RootDir | Utf8Component::Prefix(_) => {
                return Err(WatchError::PathTranslation {
                    path: path.to_owned(),
                    root: root.to_owned(),
                });
            }
        }
    }

    if translated.is_empty() {
        translated.push('/');
    }
    Ok(translated)
}

/// Converts a path reported by `notify` into a UTF-8 path.
pub fn utf8_path(path: PathBuf) -> Result<Utf8PathBuf, WatchError> {
    Utf8PathBuf::try_from(path).map_err(|e| WatchError::NonUtf8Path(e.into_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_path() {
        let root = Utf8Path::new("/watched");
        assert_eq!(
            relative_path(Utf8Path::new("/watched/a/b/c"), root).unwrap(),
            "/a/b/c"
        );
    }

    #[test]
    fn test_root_maps_to_slash() {
        let root = Utf8Path::new("/watched");
        assert_eq!(relative_path(root, root).unwrap(), "/");
    }

    #[test]
    fn test_sibling_with_common_prefix_is_rejected() {
        let root = Utf8Path::new("/watched");
        let err = relative_path(Utf8Path::new("/watched-other/file"), root).unwrap_err();
        assert!(matches!(err, WatchError::PathTranslation { .. }));
    }

    #[test]
    fn test_parent_components_are_rejected() {
        let root = Utf8Path::new("/watched");
        assert!(relative_path(Utf8Path::new("/watched/../etc/passwd"), root).is_err());
    }

    #[test]
    fn test_never_contains_root_prefix() {
        let root = Utf8Path::new("/srv/watched");
        let translated = relative_path(Utf8Path::new("/srv/watched/srv/watched"), root).unwrap();
        assert_eq!(translated, "/srv/watched");
    }

    #[test]
    fn test_utf8_path_conversion() {
        let converted = utf8_path(PathBuf::from("/tmp/file.txt")).unwrap();
        assert_eq!(converted.as_str(), "/tmp/file.txt");
    }
}
