//! The per-instrument channel: one IO task that owns the transport.
//!
//! A [`Channel`] binds one open connection to one port for a facade's
//! lifetime. A single tokio task owns the transport exclusively and runs
//! requests one at a time, so two callers can never interleave bytes on the
//! wire. Concurrent callers simply queue on the request channel.
//!
//! Every exchange follows the same discipline:
//!
//! 1. clear pending input and output,
//! 2. write the frame,
//! 3. read until the terminator or the exchange timeout.
//!
//! Nothing is retried and a failed exchange does not tear the channel down.
//! The exception is a write failure: the channel is then marked broken and
//! every later request fails with [`Error::NotConnected`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use instrlib_core::error::{Error, Result};
use instrlib_core::lock::LockGuard;
use instrlib_core::transport::Transport;
use instrlib_core::types::Terminator;

use crate::protocol::{self, DecodeResult, MAX_FRAME};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Framing and timing for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Reply terminator.
    pub terminator: Terminator,
    /// Deadline for a single reply.
    pub exchange_timeout: Duration,
    /// How long to swallow prompt text after the bare terminator that
    /// precedes a prompted exchange.
    pub prompt_drain_timeout: Duration,
}

impl ChannelConfig {
    /// Config whose prompt drain window equals the exchange timeout.
    pub fn new(terminator: Terminator, exchange_timeout: Duration) -> Self {
        ChannelConfig {
            terminator,
            exchange_timeout,
            prompt_drain_timeout: exchange_timeout,
        }
    }
}

/// A request sent from a facade to the IO task.
pub enum Request {
    /// Clear, send `frame`, read one reply line.
    Exchange {
        frame: Vec<u8>,
        reply: oneshot::Sender<Result<String>>,
    },
    /// Clear, send a bare terminator, drain the prompt, then exchange `frame`.
    PromptedExchange {
        frame: Vec<u8>,
        reply: oneshot::Sender<Result<String>>,
    },
    /// Clear and send `frame` without waiting for a reply.
    Send {
        frame: Vec<u8>,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Clear pending input and output.
    Reset { reply: oneshot::Sender<Result<()>> },
    /// Graceful shutdown; returns the transport.
    Shutdown {
        reply: oneshot::Sender<Box<dyn Transport>>,
    },
}

/// Handle to a channel's IO task. Stored inside each device facade.
pub struct Channel {
    tx: mpsc::Sender<Request>,
    healthy: Arc<AtomicBool>,
    port: String,
    config: ChannelConfig,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    /// Advisory lock on the port, released when the channel is dropped.
    _lock: Option<LockGuard>,
}

impl Channel {
    /// Spawn the IO task for `transport`, already open on `port`.
    pub fn spawn(
        transport: Box<dyn Transport>,
        port: impl Into<String>,
        config: ChannelConfig,
    ) -> Channel {
        let port = port.into();
        let (tx, rx) = mpsc::channel::<Request>(32);
        let healthy = Arc::new(AtomicBool::new(transport.is_connected()));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(io_loop(
            transport,
            config,
            healthy.clone(),
            rx,
            cancel.clone(),
            port.clone(),
        ));

        debug!(port = %port, terminator = ?config.terminator, "channel started");

        Channel {
            tx,
            healthy,
            port,
            config,
            cancel,
            task,
            _lock: None,
        }
    }

    /// Keep `guard` alive for as long as this channel.
    pub fn with_lock(mut self, guard: LockGuard) -> Self {
        self._lock = Some(guard);
        self
    }

    /// Port this channel is bound to.
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Framing and timing of this channel.
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Whether the channel can still carry exchanges.
    pub fn is_connected(&self) -> bool {
        self.healthy.load(Ordering::SeqCst) && !self.tx.is_closed()
    }

    /// Send `frame` and return the reply line, terminator stripped.
    pub async fn exchange(&self, frame: Vec<u8>) -> Result<String> {
        self.request(|reply| Request::Exchange { frame, reply }).await
    }

    /// Send a bare terminator, discard whatever prompt text comes back, then
    /// send `frame` and return the reply line.
    pub async fn prompted_exchange(&self, frame: Vec<u8>) -> Result<String> {
        self.request(|reply| Request::PromptedExchange { frame, reply })
            .await
    }

    /// Send `frame` without reading a reply.
    pub async fn send(&self, frame: Vec<u8>) -> Result<()> {
        self.request(|reply| Request::Send { frame, reply }).await
    }

    /// Discard pending input and output.
    pub async fn reset(&self) -> Result<()> {
        self.request(|reply| Request::Reset { reply }).await
    }

    /// Stop the IO task. The transport is closed and every later request
    /// fails with [`Error::NotConnected`].
    pub fn close(&self) {
        self.healthy.store(false, Ordering::SeqCst);
        self.cancel.cancel();
    }

    /// Shut down the IO task and recover the transport.
    pub async fn shutdown(self) -> Result<Box<dyn Transport>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self.tx.send(Request::Shutdown { reply: reply_tx }).await;
        let transport = reply_rx.await.map_err(|_| Error::NotConnected)?;
        let _ = self.task.await;
        Ok(transport)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> Request,
    ) -> Result<T> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| Error::NotConnected)?;
        // The IO task bounds every exchange by its own deadlines.
        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::NotConnected),
        }
    }
}

// ---------------------------------------------------------------------------
// IO Loop
// ---------------------------------------------------------------------------

async fn io_loop(
    mut transport: Box<dyn Transport>,
    config: ChannelConfig,
    healthy: Arc<AtomicBool>,
    mut rx: mpsc::Receiver<Request>,
    cancel: CancellationToken,
    port: String,
) {
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!(port = %port, "channel cancelled");
                break;
            }

            req = rx.recv() => {
                match req {
                    Some(Request::Shutdown { reply }) => {
                        debug!(port = %port, "channel shutdown requested");
                        let _ = reply.send(transport);
                        return;
                    }
                    Some(req) => handle_request(req, &mut *transport, &config, &healthy, &port).await,
                    None => {
                        debug!(port = %port, "channel handle dropped, exiting IO task");
                        break;
                    }
                }
            }
        }
    }

    healthy.store(false, Ordering::SeqCst);
    let _ = transport.close().await;
}

/// Dispatch a single request on the transport.
async fn handle_request(
    req: Request,
    transport: &mut dyn Transport,
    config: &ChannelConfig,
    healthy: &AtomicBool,
    port: &str,
) {
    let up = healthy.load(Ordering::SeqCst);
    match req {
        Request::Exchange { frame, reply } => {
            let result = if up {
                exchange_once(transport, &frame, config.terminator, config.exchange_timeout)
                    .await
            } else {
                Err(Error::NotConnected)
            };
            let _ = reply.send(track(result, healthy, port));
        }
        Request::PromptedExchange { frame, reply } => {
            let result = if up {
                prompted_exchange_once(transport, &frame, config).await
            } else {
                Err(Error::NotConnected)
            };
            let _ = reply.send(track(result, healthy, port));
        }
        Request::Send { frame, reply } => {
            let result = if up {
                send_once(transport, &frame).await
            } else {
                Err(Error::NotConnected)
            };
            let _ = reply.send(track(result, healthy, port));
        }
        Request::Reset { reply } => {
            let result = if up {
                transport.clear_buffers().await
            } else {
                Err(Error::NotConnected)
            };
            let _ = reply.send(track(result, healthy, port));
        }
        Request::Shutdown { .. } => unreachable!("Shutdown handled in io_loop"),
    }
}

/// Mark the channel broken when `result` carries a fatal error.
fn track<T>(result: Result<T>, healthy: &AtomicBool, port: &str) -> Result<T> {
    if let Err(e) = &result {
        if e.is_fatal() && healthy.swap(false, Ordering::SeqCst) {
            tracing::warn!(port = %port, error = %e, "channel broken");
        }
    }
    result
}

// ---------------------------------------------------------------------------
// Exchange primitives
// ---------------------------------------------------------------------------

/// Clear the buffers and write `frame`.
pub async fn send_once(transport: &mut dyn Transport, frame: &[u8]) -> Result<()> {
    transport.clear_buffers().await?;
    transport.send(frame).await
}

/// Clear, write `frame`, and read one reply line.
///
/// Used by the IO task and by the discovery sweep, which exchanges on a
/// transient transport before any channel exists.
pub async fn exchange_once(
    transport: &mut dyn Transport,
    frame: &[u8],
    terminator: Terminator,
    timeout: Duration,
) -> Result<String> {
    send_once(transport, frame).await?;
    let reply = read_frame(transport, terminator, timeout).await?;
    tracing::trace!(
        frame = %String::from_utf8_lossy(frame).escape_debug(),
        reply = %reply,
        "exchange"
    );
    Ok(reply)
}

/// Send a bare terminator, drain the prompt, then exchange `frame`.
pub async fn prompted_exchange_once(
    transport: &mut dyn Transport,
    frame: &[u8],
    config: &ChannelConfig,
) -> Result<String> {
    send_once(transport, config.terminator.as_bytes()).await?;
    let drained = drain(transport, config.prompt_drain_timeout).await?;
    tracing::trace!(bytes = drained, "drained prompt");
    exchange_once(
        transport,
        frame,
        config.terminator,
        config.exchange_timeout,
    )
    .await
}

/// Read until `terminator` or `timeout`.
///
/// Returns [`Error::Timeout`] when nothing arrived and [`Error::Malformed`]
/// when bytes arrived without a terminator or are not valid UTF-8.
pub async fn read_frame(
    transport: &mut dyn Transport,
    terminator: Terminator,
    timeout: Duration,
) -> Result<String> {
    let deadline = Instant::now() + timeout;
    let mut chunk = [0u8; 256];
    let mut buf = Vec::new();

    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }

        match transport.receive(&mut chunk, deadline - now).await {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                match protocol::decode_frame(&buf, terminator) {
                    DecodeResult::Frame { text, .. } => return Ok(text),
                    DecodeResult::Malformed(_) => {
                        return Err(Error::Malformed("reply is not valid UTF-8".into()));
                    }
                    DecodeResult::Incomplete if buf.len() > MAX_FRAME => {
                        tracing::warn!(len = buf.len(), "reply buffer overflow");
                        return Err(Error::Malformed(format!(
                            "no terminator within {MAX_FRAME} bytes"
                        )));
                    }
                    DecodeResult::Incomplete => {}
                }
            }
            Err(Error::Timeout) => break,
            Err(e) => return Err(e),
        }
    }

    if buf.is_empty() {
        Err(Error::Timeout)
    } else {
        Err(Error::Malformed(format!(
            "missing terminator: {:?}",
            String::from_utf8_lossy(&buf)
        )))
    }
}

/// Swallow everything that arrives within `window`. Returns the byte count.
async fn drain(transport: &mut dyn Transport, window: Duration) -> Result<usize> {
    let deadline = Instant::now() + window;
    let mut chunk = [0u8; 256];
    let mut drained = 0;

    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        match transport.receive(&mut chunk, deadline - now).await {
            Ok(0) => break,
            Ok(n) => drained += n,
            Err(Error::Timeout) => break,
            Err(e) => return Err(e),
        }
    }

    Ok(drained)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use instrlib_test_harness::{MockEvent, MockTransport};

    fn test_config() -> ChannelConfig {
        ChannelConfig::new(Terminator::Cr, Duration::from_millis(200))
    }

    // =======================================================================
    // Primitive tests
    // =======================================================================

    #[tokio::test]
    async fn read_frame_crlf() {
        let mut mock = MockTransport::new();
        mock.expect(b"\r\n:UNIT:PRES?\r\n", b":UNIT:PRES PSI\r\n");
        let reply = exchange_once(
            &mut mock,
            b"\r\n:UNIT:PRES?\r\n",
            Terminator::CrLf,
            Duration::from_millis(100),
        )
        .await
        .unwrap();
        assert_eq!(reply, ":UNIT:PRES PSI");
    }

    #[tokio::test]
    async fn read_frame_silence_is_timeout() {
        let mut mock = MockTransport::new();
        mock.expect(b"?SN\r", b"");
        let result = exchange_once(&mut mock, b"?SN\r", Terminator::Cr, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn read_frame_without_terminator_is_malformed() {
        let mut mock = MockTransport::new();
        mock.expect(b"?SN\r", b"SN 123");
        let result = exchange_once(&mut mock, b"?SN\r", Terminator::Cr, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(Error::Malformed(_))));
    }

    #[tokio::test]
    async fn read_frame_overflow_is_malformed() {
        let mut mock = MockTransport::new();
        mock.expect(b"?SN\r", &vec![b'A'; MAX_FRAME + 10]);
        let result = exchange_once(&mut mock, b"?SN\r", Terminator::Cr, Duration::from_millis(500)).await;
        assert!(matches!(result, Err(Error::Malformed(_))));
    }

    // =======================================================================
    // Channel tests
    // =======================================================================

    #[tokio::test]
    async fn channel_exchange_returns_reply() {
        let mut mock = MockTransport::new();
        mock.expect(b"?SN\r", b"SN 12345\r");
        let log = mock.log();

        let channel = Channel::spawn(Box::new(mock), "/dev/ttyUSB0", test_config());
        let reply = channel.exchange(b"?SN\r".to_vec()).await.unwrap();
        assert_eq!(reply, "SN 12345");
        assert!(log.every_send_cleared_first());
        assert_eq!(channel.port(), "/dev/ttyUSB0");

        let _ = channel.shutdown().await;
    }

    #[tokio::test]
    async fn channel_discards_stale_input_before_send() {
        let mut mock = MockTransport::new();
        mock.inject_stale(b"STAT: C:9.9  S:9.9  E:9.9\r");
        mock.expect(b"?SN\r", b"SN 777\r");

        let channel = Channel::spawn(Box::new(mock), "p", test_config());
        assert_eq!(channel.exchange(b"?SN\r".to_vec()).await.unwrap(), "SN 777");
    }

    #[tokio::test]
    async fn channel_timeout_does_not_degrade() {
        let mut mock = MockTransport::new();
        mock.expect(b"?SN\r", b"");
        mock.expect(b"?SN\r", b"SN 1\r");

        let channel = Channel::spawn(Box::new(mock), "p", test_config());
        let first = channel.exchange(b"?SN\r".to_vec()).await;
        assert!(matches!(first, Err(Error::Timeout)));
        assert!(channel.is_connected());

        let second = channel.exchange(b"?SN\r".to_vec()).await.unwrap();
        assert_eq!(second, "SN 1");
    }

    #[tokio::test]
    async fn channel_prompted_exchange_drains_prompt() {
        let mut mock = MockTransport::new();
        mock.expect(b"\r", b"\r\nCordis> ");
        mock.expect(b"CZERO: 10\r", b"CZERO: 10\r");
        let log = mock.log();

        let channel = Channel::spawn(Box::new(mock), "p", test_config());
        let reply = channel
            .prompted_exchange(b"CZERO: 10\r".to_vec())
            .await
            .unwrap();
        assert_eq!(reply, "CZERO: 10");
        assert_eq!(log.sent(), vec![b"\r".to_vec(), b"CZERO: 10\r".to_vec()]);
        assert!(log.every_send_cleared_first());
    }

    #[tokio::test]
    async fn channel_send_does_not_read() {
        let mut mock = MockTransport::new();
        mock.expect(b"\rSYST:REM\r", b"");
        let log = mock.log();

        let channel = Channel::spawn(Box::new(mock), "p", test_config());
        channel.send(b"\rSYST:REM\r".to_vec()).await.unwrap();
        assert!(!log
            .events()
            .iter()
            .any(|e| matches!(e, MockEvent::Received(_))));
    }

    #[tokio::test]
    async fn channel_write_failure_is_permanent() {
        let mut mock = MockTransport::new();
        mock.fail_writes();

        let channel = Channel::spawn(Box::new(mock), "p", test_config());
        let first = channel.exchange(b"?SN\r".to_vec()).await;
        assert!(matches!(first, Err(Error::WriteFailure(_))));
        assert!(!channel.is_connected());

        let second = channel.exchange(b"?SN\r".to_vec()).await;
        assert!(matches!(second, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn channel_reset_clears() {
        let mock = MockTransport::new();
        let log = mock.log();
        let channel = Channel::spawn(Box::new(mock), "p", test_config());
        channel.reset().await.unwrap();
        assert_eq!(log.clear_count(), 1);
    }

    #[tokio::test]
    async fn channel_close_refuses_requests() {
        let mock = MockTransport::new();
        let channel = Channel::spawn(Box::new(mock), "p", test_config());
        channel.close();
        assert!(!channel.is_connected());
        let result = channel.exchange(b"?SN\r".to_vec()).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn channel_shutdown_recovers_transport() {
        let mock = MockTransport::new();
        let channel = Channel::spawn(Box::new(mock), "p", test_config());
        let transport = channel.shutdown().await.unwrap();
        assert!(transport.is_connected());
    }

    #[tokio::test]
    async fn concurrent_callers_never_interleave() {
        let mut mock = MockTransport::responder();
        for i in 0..8 {
            mock.reply(
                format!("?K{i}\r").as_bytes(),
                format!("K{i} value-{i}\r").as_bytes(),
            );
        }
        mock.set_latency(Duration::from_millis(5));
        let log = mock.log();

        let channel = Arc::new(Channel::spawn(Box::new(mock), "p", test_config()));
        let mut handles = Vec::new();
        for i in 0..8 {
            let channel = channel.clone();
            handles.push(tokio::spawn(async move {
                let reply = channel
                    .exchange(format!("?K{i}\r").into_bytes())
                    .await
                    .unwrap();
                assert_eq!(reply, format!("K{i} value-{i}"));
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        // Each exchange is a clear, a send, then its whole reply.
        let events = log.events();
        assert_eq!(events.len(), 8 * 3);
        for exchange in events.chunks(3) {
            assert_eq!(exchange[0], MockEvent::Cleared);
            let MockEvent::Sent(sent) = &exchange[1] else {
                panic!("expected send, got {exchange:?}");
            };
            let MockEvent::Received(received) = &exchange[2] else {
                panic!("expected reply, got {exchange:?}");
            };
            let key = &sent[1..sent.len() - 1];
            assert!(received.starts_with(key));
        }
    }
}
