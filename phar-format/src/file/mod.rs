pub(crate) mod meta;
#[cfg(feature = "reader")]
pub mod reader;
#[cfg(feature = "writer")]
pub mod writer;

pub use self::meta::PharMetadata;

/// The token the PHP runtime stops parsing at.
pub const HALT_TOKEN: &[u8] = b"__HALT_COMPILER();";

/// What every stub written by this library ends with, before the line break.
pub const HALT_MARKER: &[u8] = b"__HALT_COMPILER(); ?>";

/// The stub used when none is provided.
pub const DEFAULT_STUB: &[u8] = b"<?php __HALT_COMPILER(); ?>";

/// Returns the length of the stub in `bytes`: everything up to and including
/// the first occurrence of `pattern` plus the line break that follows it.
pub(crate) fn stub_length(bytes: &[u8], pattern: &[u8]) -> Option<u64> {
    if pattern.is_empty() {
        return None;
    }

    let end = twoway::find_bytes(bytes, pattern)? + pattern.len();
    let rest = &bytes[end..];
    let newline = if rest.starts_with(b"\r\n") {
        2
    } else if rest.starts_with(b"\n") {
        1
    } else {
        0
    };

    Some((end + newline) as u64)
}

/// Cuts `stub` right after the halt token and appends the canonical ending.
pub(crate) fn normalize_stub(stub: &[u8]) -> Option<Vec<u8>> {
    let pos = twoway::find_bytes(stub, HALT_TOKEN)?;
    let mut out = Vec::with_capacity(pos + HALT_TOKEN.len() + 5);
    out.extend_from_slice(&stub[..pos + HALT_TOKEN.len()]);
    out.extend_from_slice(b" ?>\r\n");
    Some(out)
}
