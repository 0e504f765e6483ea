//! Cordis board text-protocol encoder/decoder.
//!
//! Cordis flow controllers and external sensor boards speak a line-oriented
//! ASCII protocol terminated with `\r`.
//!
//! # Command format
//!
//! ```text
//! ?<KEYWORD>\r            query
//! <KEYWORD>: <value>\r    set
//! ```
//!
//! # Response format
//!
//! Query replies echo the keyword, optionally followed by `:` and a single
//! space, then the value (`SN 12345`, `CZERO: 10`). Set replies echo the set
//! frame; the set succeeded when the echoed text before the first `:` is the
//! keyword itself.
//!
//! One model, the CS-5090, answers `CUTOFF` queries with a fixed-width
//! prefix instead of an echoed keyword. That exception is carried as a
//! [`ReplyRule`] from the variant tables in [`crate::models`].

use instrlib_core::types::Terminator;
use instrlib_text_io::protocol::encode_line;

/// Line terminator used by every Cordis board.
pub const TERMINATOR: Terminator = Terminator::Cr;

/// How the value is recovered from a query reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyRule {
    /// Strip the echoed keyword, an optional `:`, and one optional space.
    EchoedKeyword,
    /// Drop a fixed number of leading characters.
    FixedPrefix(usize),
}

/// The parts of a set echo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetEcho {
    /// Text before the first `:`, trimmed. The whole line when there is no `:`.
    pub prefix: String,
    /// Text after the first `:` with one leading space removed.
    pub value: String,
}

impl SetEcho {
    /// Whether the board echoed `keyword` back.
    pub fn accepted(&self, keyword: &str) -> bool {
        self.prefix == keyword
    }
}

/// Encode a query frame.
///
/// # Example
///
/// ```
/// use instrlib_cordis::protocol::format_query;
///
/// assert_eq!(format_query("SN"), b"?SN\r");
/// ```
pub fn format_query(keyword: &str) -> Vec<u8> {
    encode_line(&format!("?{keyword}"), TERMINATOR)
}

/// Encode a set frame.
///
/// # Example
///
/// ```
/// use instrlib_cordis::protocol::format_set;
///
/// assert_eq!(format_set("CZERO", "10"), b"CZERO: 10\r");
/// ```
pub fn format_set(keyword: &str, value: &str) -> Vec<u8> {
    encode_line(&format!("{keyword}: {value}"), TERMINATOR)
}

/// Encode a bare command (`SAVE`, `AUTOC`).
pub fn format_command(keyword: &str) -> Vec<u8> {
    encode_line(keyword, TERMINATOR)
}

/// Recover the value from a query reply line.
///
/// A trailing `\r` is tolerated so raw buffers can be passed directly.
pub fn parse_query_reply(keyword: &str, line: &str, rule: ReplyRule) -> String {
    let line = line.strip_suffix('\r').unwrap_or(line);
    match rule {
        ReplyRule::FixedPrefix(n) => line.get(n..).unwrap_or_default().to_string(),
        ReplyRule::EchoedKeyword => {
            let rest = line.strip_prefix(keyword).unwrap_or(line);
            let rest = rest.strip_prefix(':').unwrap_or(rest);
            rest.strip_prefix(' ').unwrap_or(rest).to_string()
        }
    }
}

/// Split a set echo into its prefix and value.
pub fn parse_set_echo(line: &str) -> SetEcho {
    let line = line.strip_suffix('\r').unwrap_or(line);
    match line.split_once(':') {
        Some((prefix, value)) => SetEcho {
            prefix: prefix.trim().to_string(),
            value: value.strip_prefix(' ').unwrap_or(value).to_string(),
        },
        None => SetEcho {
            prefix: line.trim().to_string(),
            value: String::new(),
        },
    }
}
