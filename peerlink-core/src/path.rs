//! Destination path containment.
//!
//! File names arrive over the network and must never resolve outside
//! the designated root directory. Rejection happens before any
//! filesystem write.

use crate::error::CoreError;
use std::path::{Component, Path, PathBuf};

/// Resolves `name` to a path under `root`, rejecting any input that
/// would escape it.
///
/// Rejected outright: NUL bytes, absolute paths, `..` components, and
/// platform prefixes. The surviving relative path is joined onto the
/// canonicalized root; if the joined path already exists it is
/// canonicalized too (symlinks inside the root must not point out of
/// it) and re-checked against the root.
pub fn resolve_under_root(root: &Path, name: &str) -> Result<PathBuf, CoreError> {
    let violation = || CoreError::PathViolation {
        name: name.to_string(),
    };

    if name.is_empty() || name.contains('\0') {
        return Err(violation());
    }

    let mut relative = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => relative.push(part),
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(violation());
            }
        }
    }
    if relative.as_os_str().is_empty() {
        return Err(violation());
    }

    let root = root.canonicalize()?;
    let joined = root.join(&relative);

    let resolved = if joined.exists() {
        joined.canonicalize()?
    } else {
        joined
    };

    if !resolved.starts_with(&root) {
        return Err(violation());
    }
    Ok(resolved)
}
