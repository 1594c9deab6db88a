//! Path hardening for the disk segment cache
//!
//! Schema, cube and table names end up as directory names. They come from
//! schema definitions, so they are encoded before they touch the
//! filesystem and can never name a parent directory or contain a separator.
//!
//! ```rust
//! use starcache::security::encode_path_component;
//!
//! assert_eq!(encode_path_component("Sales 2024"), "Sales%202024");
//! assert_eq!(encode_path_component("../etc"), "..%2Fetc");
//! assert_eq!(encode_path_component(".."), "%2E%2E");
//! ```

use std::fmt::Write;
use std::path::{Component, Path, PathBuf};

/// Percent-encode a name for use as a single path component
///
/// Keeps `[A-Za-z0-9_.-]` and encodes every other byte as `%XX`. The names
/// `.` and `..` and the empty name are encoded as a whole.
pub fn encode_path_component(name: &str) -> String {
    if name.is_empty() {
        return "%00".to_string();
    }
    if name == "." || name == ".." {
        return "%2E".repeat(name.len());
    }
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'.' | b'-') {
            out.push(byte as char);
        } else {
            // Writing to a String cannot fail
            let _ = write!(out, "%{:02X}", byte);
        }
    }
    out
}

/// Validate a configured cache root directory
///
/// Rejects null bytes, `..` components, Unicode dot look-alikes, and roots
/// that are symlinks.
pub fn validate_cache_root(path: impl AsRef<Path>) -> Result<PathBuf, String> {
    let path = path.as_ref();
    let path_str = path.to_string_lossy();

    if path_str.is_empty() {
        return Err("Cache root is empty".to_string());
    }

    if path_str.contains('\0') {
        return Err("Path contains null byte".to_string());
    }

    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(format!(
            "Path traversal detected: path contains '..' - {:?}",
            path
        ));
    }

    // Unicode look-alikes for '.' sequences
    if path_str.contains('\u{2024}') || path_str.contains('\u{2025}') || path_str.contains('\u{2026}')
    {
        return Err("Path contains suspicious Unicode characters".to_string());
    }

    if path.is_symlink() {
        return Err(format!(
            "Symlink detected: {:?} - symlinked cache roots are not allowed",
            path
        ));
    }

    Ok(path.to_path_buf())
}
