//! Path normalisation for backend-relative paths.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Normalises a backend-relative path and rejects anything that would leave
/// the backend root.
///
/// `.` and empty segments are dropped, `..` pops the previous segment, and a
/// leading `/` is treated as the root rather than the filesystem root. The
/// empty path is valid and means the root itself.
///
/// > **Note:** This does **not** normalise backslashes or non-UTF8 bytes.
/// >           Null bytes are explicitly rejected.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use depot_storage::validate_path;
/// assert_eq!(validate_path("com/acme/lib").unwrap(), Path::new("com/acme/lib"));
/// assert_eq!(validate_path("com/./acme//lib/").unwrap(), Path::new("com/acme/lib"));
/// assert_eq!(validate_path("").unwrap(), Path::new(""));
/// assert!(validate_path("../other-repository").is_err());
/// assert!(validate_path("com/../../etc").is_err());
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
                }
            },
        }
    }
    Ok(components.into_iter().collect())
}
