//! Line framing shared by every instrument family.
//!
//! All supported instruments speak short ASCII lines. Cordis boards, the
//! Fluke meters, and the SureFlow terminate with `\r`; the PACE1000 uses
//! `\r\n`. Some families also expect a leading terminator to wake the
//! command parser, so two encoders are provided.

use bytes::{BufMut, BytesMut};
use instrlib_core::types::Terminator;

/// Upper bound on buffered reply bytes. Replies are well under 100 bytes;
/// anything past this is line noise.
pub const MAX_FRAME: usize = 4096;

/// Result of attempting to decode one line from a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeResult {
    /// A complete line was decoded.
    Frame {
        /// Line content with the terminator removed.
        text: String,
        /// Number of bytes consumed from the input buffer.
        consumed: usize,
    },

    /// A terminator was found but the line is not valid UTF-8.
    Malformed(usize),

    /// The buffer does not yet contain a terminator. More data is needed.
    Incomplete,
}

/// Decode the first `terminator`-delimited line in `buf`.
pub fn decode_frame(buf: &[u8], terminator: Terminator) -> DecodeResult {
    let term = terminator.as_bytes();
    let term_pos = match buf.windows(term.len()).position(|w| w == term) {
        Some(pos) => pos,
        None => return DecodeResult::Incomplete,
    };

    let consumed = term_pos + term.len();
    match std::str::from_utf8(&buf[..term_pos]) {
        Ok(text) => DecodeResult::Frame {
            text: text.to_string(),
            consumed,
        },
        Err(_) => DecodeResult::Malformed(consumed),
    }
}

/// Encode `body` followed by the terminator (`?SN\r`).
pub fn encode_line(body: &str, terminator: Terminator) -> Vec<u8> {
    let term = terminator.as_bytes();
    let mut buf = BytesMut::with_capacity(body.len() + term.len());
    buf.put_slice(body.as_bytes());
    buf.put_slice(term);
    buf.to_vec()
}

/// Encode `body` wrapped in terminators (`\rMEAS:VOLT:DC?\r`).
pub fn encode_wrapped(body: &str, terminator: Terminator) -> Vec<u8> {
    let term = terminator.as_bytes();
    let mut buf = BytesMut::with_capacity(body.len() + 2 * term.len());
    buf.put_slice(term);
    buf.put_slice(body.as_bytes());
    buf.put_slice(term);
    buf.to_vec()
}
