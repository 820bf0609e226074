//! Path and key normalization.

/// Normalizes a `/`-separated path.
///
/// Empty and `.` segments are dropped and `..` pops the previous segment
/// (never above the root). A leading `/` is preserved, a trailing one is not.
///
/// ```
/// use tabstore_storage::normalize_path;
///
/// assert_eq!(normalize_path("resources//a/./b/../c"), "resources/a/c");
/// assert_eq!(normalize_path("/x/../../y"), "/y");
/// ```
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }
    let joined = segments.join("/");
    if absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Joins path segments and normalizes the result.
#[must_use]
pub fn join_segments<S: AsRef<str>>(segments: &[S]) -> String {
    let joined = segments
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("/");
    normalize_path(&joined)
}

/// Normalizes `name` as a path relative to an engine root.
///
/// Leading separators and `..` segments that would escape the root are removed.
#[must_use]
pub fn relative_path(name: &str) -> String {
    let normalized = normalize_path(&format!("/{name}"));
    normalized.trim_start_matches('/').to_string()
}
