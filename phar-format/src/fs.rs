//! Filesystem helpers for turning file metadata into entry attributes.

/// Permission bits recorded for a file.
///
/// On Unix: the low nine mode bits
/// Elsewhere: 0o644, or 0o444 when read-only
#[cfg(unix)]
pub fn permissions(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;

    meta.permissions().mode() & 0o777
}

#[cfg(not(unix))]
pub fn permissions(meta: &std::fs::Metadata) -> u32 {
    if meta.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}
