use crate::CoordinationError;
use crate::Result;

pub const ROOT: &str = "/";

/// Reject anything that is not an absolute, slash-delimited node path.
///
/// `/` is the root; every other path starts with `/`, has no trailing `/`
/// and no empty segments.
pub fn validate_path(path: &str) -> Result<()> {
    if path == ROOT {
        return Ok(());
    }
    if !path.starts_with('/') || path.ends_with('/') || path.contains("//") {
        return Err(CoordinationError::InvalidPath(path.to_string()).into());
    }
    if path.split('/').skip(1).any(|segment| segment == "." || segment == "..") {
        return Err(CoordinationError::InvalidPath(path.to_string()).into());
    }
    Ok(())
}

/// Qualify a child name under `parent`.
pub fn join_path(
    parent: &str,
    child: &str,
) -> String {
    if parent == ROOT {
        format!("/{child}")
    } else {
        format!("{parent}/{child}")
    }
}

/// `None` for the root.
pub fn parent_path(path: &str) -> Option<&str> {
    if path == ROOT {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT),
        Some(i) => Some(&path[..i]),
        None => None,
    }
}

pub fn node_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[i + 1..],
        None => path,
    }
}

/// Every proper ancestor of `path` from the root's first child down,
/// excluding the root and `path` itself.
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut end = 0;
    while let Some(i) = path[end + 1..].find('/') {
        end += i + 1;
        out.push(&path[..end]);
    }
    out
}
