//! Error types for instrlib.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Discovery failures, exchange failures
//! and connection failures are all captured here.
//!
//! Most variants are recoverable. Only [`Error::WriteFailure`] (and the
//! [`Error::NotConnected`] state it leaves behind) marks a channel as
//! permanently broken; re-discovery is then up to the caller.

/// The error type for all instrlib operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The probed port answered with a different signature, or not at all.
    ///
    /// Non-fatal: a discovery sweep moves on to the next candidate.
    #[error("no matching instrument")]
    NotMatched,

    /// The port's advisory lock is already held elsewhere.
    ///
    /// Non-fatal: a discovery sweep moves on to the next candidate.
    #[error("port lock unavailable: {0}")]
    LockUnavailable(String),

    /// No terminator arrived before the exchange deadline.
    #[error("timeout waiting for response")]
    Timeout,

    /// A response arrived but did not end with the expected terminator,
    /// or could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The requested telemetry or operation does not exist on this model.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Writing to the underlying connection failed; the connection is
    /// considered broken.
    #[error("write failure: {0}")]
    WriteFailure(String),

    /// A transport-level error while opening or configuring a port.
    #[error("transport error: {0}")]
    Transport(String),

    /// An invalid parameter was passed to an instrument command.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The channel is closed or was degraded by an earlier write failure.
    #[error("not connected")]
    NotConnected,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error leaves the channel permanently unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::WriteFailure(_) | Error::NotConnected)
    }

    /// Short variant name, used when an error is recorded as a telemetry
    /// sentinel (`error: Timeout`).
    pub fn kind_name(&self) -> &'static str {
        match self {
            Error::NotMatched => "NotMatched",
            Error::LockUnavailable(_) => "LockUnavailable",
            Error::Timeout => "Timeout",
            Error::Malformed(_) => "Malformed",
            Error::Unsupported(_) => "Unsupported",
            Error::WriteFailure(_) => "WriteFailure",
            Error::Transport(_) => "Transport",
            Error::InvalidParameter(_) => "InvalidParameter",
            Error::NotConnected => "NotConnected",
            Error::Io(_) => "Io",
        }
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_not_matched() {
        assert_eq!(Error::NotMatched.to_string(), "no matching instrument");
    }

    #[test]
    fn error_display_lock_unavailable() {
        let e = Error::LockUnavailable("/dev/ttyUSB0".into());
        assert_eq!(e.to_string(), "port lock unavailable: /dev/ttyUSB0");
    }

    #[test]
    fn error_display_timeout() {
        assert_eq!(Error::Timeout.to_string(), "timeout waiting for response");
    }

    #[test]
    fn error_display_malformed() {
        let e = Error::Malformed("missing terminator".into());
        assert_eq!(e.to_string(), "malformed response: missing terminator");
    }

    #[test]
    fn error_display_write_failure() {
        let e = Error::WriteFailure("broken pipe".into());
        assert_eq!(e.to_string(), "write failure: broken pipe");
    }

    #[test]
    fn only_write_failure_and_not_connected_are_fatal() {
        assert!(Error::WriteFailure("x".into()).is_fatal());
        assert!(Error::NotConnected.is_fatal());
        assert!(!Error::Timeout.is_fatal());
        assert!(!Error::Malformed("x".into()).is_fatal());
        assert!(!Error::NotMatched.is_fatal());
        assert!(!Error::LockUnavailable("x".into()).is_fatal());
        assert!(!Error::Unsupported("x".into()).is_fatal());
    }

    #[test]
    fn kind_names() {
        assert_eq!(Error::Timeout.kind_name(), "Timeout");
        assert_eq!(Error::Malformed(String::new()).kind_name(), "Malformed");
        assert_eq!(Error::NotConnected.kind_name(), "NotConnected");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
