//! Stable path hashing.
//!
//! Cache file names and [`AnimationKey`](crate::assets::AnimationKey) source
//! hashes are derived from asset-relative paths, so they must not depend on
//! the host platform's separator or on process-randomized hashers.

use std::path::{Component, Path};

/// FNV-1a hash algorithm.
pub fn fnv1a_hash(data: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut hash = FNV_OFFSET;
    for byte in data {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Render a relative path with `/` separators, dropping `.` components.
///
/// Backslashes inside a component are treated as separators too, since asset
/// packs authored on Windows sometimes ship manifests with them.
pub fn normalize_relative(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => {
                for piece in part.to_string_lossy().split('\\') {
                    if !piece.is_empty() {
                        parts.push(piece.to_string());
                    }
                }
            }
            Component::ParentDir => parts.push("..".to_string()),
            _ => {}
        }
    }
    parts.join("/")
}

/// Hash of a relative path, independent of separator style.
pub fn path_hash(path: &Path) -> u64 {
    fnv1a_hash(normalize_relative(path).as_bytes())
}

/// Deterministic file-system-safe name for a relative path.
///
/// # Example
/// ```
/// use deskpet::hash::path_to_hash;
/// use std::path::Path;
///
/// let name = path_to_hash(Path::new("Happy/Touch_Head/A"));
/// assert_eq!(name.len(), 16);
/// assert_eq!(name, path_to_hash(Path::new("Happy\\Touch_Head\\A")));
/// ```
pub fn path_to_hash(path: &Path) -> String {
    format!("{:016x}", path_hash(path))
}
