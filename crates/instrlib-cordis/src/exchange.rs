//! Query and set exchanges shared by the controller and sensor facades.
//!
//! Neither helper returns an error. A failed query yields an error marker
//! (`error: Timeout`) and a failed set yields [`SetOutcome::Rejected`], so
//! callers can store the result in their snapshot unconditionally.

use tracing::{debug, trace};

use instrlib_core::helpers::error_marker;
use instrlib_text_io::Channel;

use crate::protocol::{self, ReplyRule};

/// Result of a set exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// The board echoed the keyword.
    Accepted,
    /// Anything else: wrong echo, empty echo, timeout, broken channel.
    Rejected,
}

impl SetOutcome {
    /// Whether the set was accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, SetOutcome::Accepted)
    }
}

/// Query `keyword` and decode the reply with `rule`.
pub(crate) async fn query(channel: &Channel, keyword: &str, rule: ReplyRule) -> String {
    match channel.exchange(protocol::format_query(keyword)).await {
        Ok(line) => {
            let value = protocol::parse_query_reply(keyword, &line, rule);
            trace!(port = %channel.port(), keyword, value = %value, "query");
            value
        }
        Err(e) => {
            debug!(port = %channel.port(), keyword, error = %e, "query failed");
            error_marker(&e)
        }
    }
}

/// Send a prompted set frame and judge the echo.
///
/// Returns the outcome and the text to cache: the echoed value on success,
/// the whole echo or an error marker otherwise.
pub(crate) async fn set(channel: &Channel, keyword: &str, value: &str) -> (SetOutcome, String) {
    match channel
        .prompted_exchange(protocol::format_set(keyword, value))
        .await
    {
        Ok(line) => {
            let echo = protocol::parse_set_echo(&line);
            if echo.accepted(keyword) {
                trace!(port = %channel.port(), keyword, value, "set accepted");
                (SetOutcome::Accepted, echo.value)
            } else {
                debug!(port = %channel.port(), keyword, echo = %line, "set rejected");
                (SetOutcome::Rejected, line)
            }
        }
        Err(e) => {
            debug!(port = %channel.port(), keyword, error = %e, "set failed");
            (SetOutcome::Rejected, error_marker(&e))
        }
    }
}

/// Send a bare command and return its one-line reply.
pub(crate) async fn command(channel: &Channel, frame: Vec<u8>) -> instrlib_core::Result<String> {
    let reply = channel.exchange(frame).await?;
    debug!(port = %channel.port(), reply = %reply, "command");
    Ok(reply)
}
