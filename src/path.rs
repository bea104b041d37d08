use std::{path::{Path, PathBuf}, ffi::OsStr};

use itertools::Itertools;

/// Careful, this drops any empty segments, regardless whether at the
/// beginning, end or in the middle.
pub fn path_segments<'s>(s: &'s str) -> impl Iterator<Item = &'s str>
{
    s.split('/').filter(|s| !s.is_empty())
}

/// The canonical form used as route key: segments joined by `/`,
/// without leading or trailing slash (`""` for the root).
pub fn route_key(path: &str) -> String {
    path_segments(path).join("/")
}

/// The view name for a request path, if it is usable as a relative
/// file path: no `.` or `..` segments, no backslashes, not empty.
pub fn view_name_for_path(path: &str) -> Option<String> {
    let mut segments = Vec::new();
    for s in path_segments(path) {
        if s == "." || s == ".." || s.contains('\\') || s.contains('\0') {
            return None;
        }
        segments.push(s);
    }
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

pub fn path_append<P: AsRef<Path>>(base: &Path, rel: &P) -> PathBuf {
    let mut p = PathBuf::from(base);
    p.push(rel);
    p
}

// Allocation-less way to compare the extension for Path values
pub fn extension_eq<P: AsRef<Path> + ?Sized,
                    E: AsRef<OsStr> + ?Sized>(
    path: &P, ext: &E
) -> bool {
    let p: &Path = path.as_ref();
    let ext: &OsStr = ext.as_ref();
    p.extension() == Some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_route_key() {
        assert_eq!(route_key("/"), "");
        assert_eq!(route_key("//a/b/"), "a/b");
    }

    #[test]
    fn t_view_name_for_path() {
        assert_eq!(view_name_for_path("/about"), Some("about".into()));
        assert_eq!(view_name_for_path("/docs/intro/"), Some("docs/intro".into()));
        assert_eq!(view_name_for_path("/"), None);
        assert_eq!(view_name_for_path("/a/../etc/passwd"), None);
        assert_eq!(view_name_for_path("/./a"), None);
    }

    #[test]
    fn t_extension_eq() {
        assert!(extension_eq("foo.html", "html"));
        assert!(!extension_eq("foo.htm", "html"));
        assert!(!extension_eq("foo", "html"));
    }
}
