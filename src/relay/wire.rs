//! Fragment to SSE wire framing.
//!
//! Every fragment becomes one `data: <line>` event line per line of text,
//! followed by exactly one blank terminator line. Line breaks inside model
//! output never reach the wire unframed: `\n`, `\r\n` and a lone `\r` all
//! start a new `data:` line.

use bytes::{BufMut, Bytes, BytesMut};

/// Field prefix of every payload line.
pub const DATA_PREFIX: &str = "data: ";

/// Split a fragment on any SSE line terminator.
///
/// A trailing terminator yields a trailing empty line, so the client's
/// reassembly (joining data lines with `\n`) reproduces the break.
pub fn payload_lines(fragment: &str) -> Vec<&str> {
    let bytes = fragment.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                lines.push(&fragment[start..i]);
                i += 1;
                start = i;
            }
            b'\r' => {
                lines.push(&fragment[start..i]);
                i += if bytes.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
                start = i;
            }
            _ => i += 1,
        }
    }

    lines.push(&fragment[start..]);
    lines
}

/// Frame one fragment as a complete event.
///
/// Returns `None` for an empty fragment: nothing is written for it.
pub fn frame_fragment(fragment: &str) -> Option<Bytes> {
    if fragment.is_empty() {
        return None;
    }

    let lines = payload_lines(fragment);
    let capacity = fragment.len() + lines.len() * (DATA_PREFIX.len() + 1) + 1;
    let mut buf = BytesMut::with_capacity(capacity);

    for line in lines {
        buf.put_slice(DATA_PREFIX.as_bytes());
        buf.put_slice(line.as_bytes());
        buf.put_u8(b'\n');
    }
    buf.put_u8(b'\n');

    Some(buf.freeze())
}
