//! Mock transport for deterministic testing of instrument drivers.
//!
//! [`MockTransport`] implements the [`Transport`] trait in one of two modes:
//!
//! - **strict** ([`MockTransport::new`]): pre-loaded request/response pairs
//!   are consumed in order and any other send is an error;
//! - **responder** ([`MockTransport::responder`]): a reusable table maps
//!   requests to replies, and unknown requests are met with silence, the
//!   way a real instrument ignores a foreign identify frame.
//!
//! Every clear, send, and read is recorded in a shared [`MockLog`] that
//! stays readable after the transport has been boxed and moved into a
//! channel.
//!
//! # Example
//!
//! ```
//! use instrlib_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! // When the driver sends this request, return this response.
//! mock.expect(b"?SN\r", b"SN 12345\r");
//! let log = mock.log();
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use instrlib_core::error::{Error, Result};
use instrlib_core::transport::Transport;

/// A pre-loaded request/response pair for the mock transport.
#[derive(Debug, Clone)]
struct Expectation {
    /// The exact bytes we expect to be sent.
    request: Vec<u8>,
    /// The bytes to return when the matching request is received.
    response: Vec<u8>,
}

/// One recorded interaction with a [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    /// Input and output buffers were cleared.
    Cleared,
    /// Bytes passed to `send()`.
    Sent(Vec<u8>),
    /// Bytes handed out by `receive()`.
    Received(Vec<u8>),
}

/// Shared record of everything a [`MockTransport`] saw.
#[derive(Debug, Clone, Default)]
pub struct MockLog {
    events: Arc<Mutex<Vec<MockEvent>>>,
}

impl MockLog {
    fn push(&self, event: MockEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    /// All recorded events, oldest first.
    pub fn events(&self) -> Vec<MockEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Every frame passed to `send()`, oldest first.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                MockEvent::Sent(bytes) => Some(bytes),
                _ => None,
            })
            .collect()
    }

    /// Number of buffer clears.
    pub fn clear_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, MockEvent::Cleared))
            .count()
    }

    /// Whether every send was immediately preceded by a buffer clear.
    pub fn every_send_cleared_first(&self) -> bool {
        let events = self.events();
        events.iter().enumerate().all(|(i, e)| match e {
            MockEvent::Sent(_) => i > 0 && events[i - 1] == MockEvent::Cleared,
            _ => true,
        })
    }
}

/// A mock [`Transport`] for testing drivers without hardware.
///
/// In strict mode, expectations are consumed in order: `send()` must match
/// the next expectation and its response is returned by the following
/// `receive()` calls. In responder mode, `send()` looks the request up in
/// the reply table; a miss leaves nothing to read.
///
/// `clear_buffers()` discards any response still pending, so stale bytes
/// injected with [`inject_stale`](MockTransport::inject_stale) never reach
/// a driver that clears before sending.
#[derive(Debug)]
pub struct MockTransport {
    /// Ordered queue of expected request/response pairs (strict mode).
    expectations: VecDeque<Expectation>,
    /// Reusable reply table (responder mode).
    replies: Vec<Expectation>,
    /// Whether the transport answers from `replies` instead of `expectations`.
    responder: bool,
    /// The response data pending for the next `receive()` call.
    pending_response: Option<Vec<u8>>,
    /// Cursor into the pending response (how many bytes have been read so far).
    response_cursor: usize,
    /// Whether the transport is "connected".
    connected: bool,
    /// Whether `send()` fails with a write failure.
    fail_writes: bool,
    /// Delay before `receive()` hands out bytes.
    latency: Duration,
    /// Shared interaction log.
    log: MockLog,
}

impl MockTransport {
    /// Create a strict mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            expectations: VecDeque::new(),
            replies: Vec::new(),
            responder: false,
            pending_response: None,
            response_cursor: 0,
            connected: true,
            fail_writes: false,
            latency: Duration::ZERO,
            log: MockLog::default(),
        }
    }

    /// Create a responder-mode mock transport in the connected state.
    pub fn responder() -> Self {
        MockTransport {
            responder: true,
            ..Self::new()
        }
    }

    /// Add an expected request/response pair (strict mode).
    ///
    /// When `send()` is called with data matching `request`, the subsequent
    /// `receive()` call will return `response`.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Answer `request` with `response` every time it is sent (responder mode).
    ///
    /// Later entries for the same request take precedence.
    pub fn reply(&mut self, request: &[u8], response: &[u8]) -> &mut Self {
        self.replies.insert(
            0,
            Expectation {
                request: request.to_vec(),
                response: response.to_vec(),
            },
        );
        self
    }

    /// Leave `bytes` waiting in the input buffer, as if the instrument had
    /// sent something nobody asked for.
    pub fn inject_stale(&mut self, bytes: &[u8]) {
        self.pending_response = Some(bytes.to_vec());
        self.response_cursor = 0;
    }

    /// Make every subsequent `send()` fail with a write failure.
    pub fn fail_writes(&mut self) {
        self.fail_writes = true;
    }

    /// Delay every `receive()` that returns data by `latency`.
    pub fn set_latency(&mut self, latency: Duration) {
        self.latency = latency;
    }

    /// A handle to this transport's interaction log.
    pub fn log(&self) -> MockLog {
        self.log.clone()
    }

    /// Return all data that has been sent through this transport.
    ///
    /// Each element is the byte slice from one `send()` call.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.log.sent()
    }

    /// Return the number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.expectations.len()
    }

    /// Set the connected state of the mock transport.
    ///
    /// When set to `false`, subsequent calls will return
    /// [`Error::NotConnected`].
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        if self.fail_writes {
            return Err(Error::WriteFailure("simulated write failure".into()));
        }

        self.log.push(MockEvent::Sent(data.to_vec()));

        if self.responder {
            self.pending_response = self
                .replies
                .iter()
                .find(|r| r.request == data)
                .map(|r| r.response.clone());
            self.response_cursor = 0;
            if self.pending_response.is_none() {
                tracing::trace!(data = ?String::from_utf8_lossy(data), "mock responder ignoring request");
            }
            return Ok(());
        }

        match self.expectations.pop_front() {
            Some(expectation) if data == expectation.request.as_slice() => {
                self.pending_response = Some(expectation.response);
                self.response_cursor = 0;
                Ok(())
            }
            Some(expectation) => Err(Error::Transport(format!(
                "unexpected send data: expected {:?}, got {:?}",
                String::from_utf8_lossy(&expectation.request),
                String::from_utf8_lossy(data)
            ))),
            None => Err(Error::Transport(
                "no more expectations in mock transport".into(),
            )),
        }
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        let Some(ref response) = self.pending_response else {
            return Err(Error::Timeout);
        };

        let remaining = &response[self.response_cursor..];
        if remaining.is_empty() {
            self.pending_response = None;
            self.response_cursor = 0;
            return Err(Error::Timeout);
        }

        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.log.push(MockEvent::Received(remaining[..n].to_vec()));
        self.response_cursor += n;
        if self.response_cursor >= response.len() {
            // All response bytes consumed; clear for next exchange.
            self.pending_response = None;
            self.response_cursor = 0;
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(n)
    }

    async fn clear_buffers(&mut self) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        self.log.push(MockEvent::Cleared);
        self.pending_response = None;
        self.response_cursor = 0;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.pending_response = None;
        self.response_cursor = 0;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
