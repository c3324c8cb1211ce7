//! The connection engine (spec §4.E `ProcessLoop`) and the callback
//! arbitrator (spec §4.F): a half-duplex mutual-exclusion protocol that
//! lets either peer drive a blocking REST-style call over the shared
//! socket without interleaving frames.
//!
//! The reference implementation runs one OS thread per connection; we
//! generalize that to one `tokio` task per connection (spec §9's own
//! suggested redesign), with the socket's read/write halves guarded by a
//! single `tokio::sync::Mutex` that realizes lock `L`.

use crate::codec::{FrameReader, FrameWriter};
use crate::config::ConnectionConfig;
use crate::context::{HeadToken, RequestContext, ResponseContext, RestPayload, StatusCode};
use crate::error::Error;
use crate::frame::{Frame, OpCode};
use crate::protocol::Protocol;
use crate::utils::monotonic_ms;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, Mutex};

/// Budget the background loop spends trying to acquire `L` on each tick
/// before giving up and retrying later; kept short so a call in progress
/// doesn't stall heartbeats for long.
const LOOP_LOCK_BUDGET_MS: u64 = 5;

/// Outcome of a single `process_one` tick.
#[derive(Debug, PartialEq, Eq)]
pub enum ProcessResult {
    /// Nothing was ready; caller should back off.
    None,
    /// A ping or pong was handled.
    Heartbeat,
    /// A request or answer frame was fully handled.
    Done,
    /// The peer closed the connection.
    Closed,
}

/// How `notify_callback` should behave (spec §4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyMode {
    /// Send the request and block until the matching answer arrives (or
    /// `answer_timeout_ms` elapses).
    BlockWithAnswer,
    /// Send the request and block only long enough to flush it.
    BlockWithoutAnswer,
    /// Queue the request and return immediately; it is flushed by the
    /// background loop's drain-before-send step.
    NonBlockWithoutAnswer,
}

/// A request handler supplied by the server side: given an inbound
/// request, produce the answer to send back.
pub type RequestHandler =
    dyn Fn(RequestContext) -> Pin<Box<dyn Future<Output = ResponseContext> + Send>> + Send + Sync;

/// An unsolicited push handler supplied by the client side (spec §4.G
/// `on_push`): invoked whenever a frame arrives that isn't an answer to
/// one of our own in-flight calls.
pub type PushHandler = dyn Fn(RequestContext) + Send + Sync;

struct Socket<R, W> {
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
}

/// Marks one acquirer of lock `L` as in flight for as long as it's held in
/// scope (spec §3/§4.F: `tries_in_flight` is "used by destructor to wait
/// out acquirers"). Covers the whole attempt-and-hold window, not just the
/// moment the lock is taken, so `close`'s wait-for-zero can't race past an
/// acquirer that's still using the socket.
struct TriesGuard<'a>(&'a AtomicUsize);

impl<'a> TriesGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        TriesGuard(counter)
    }
}

impl Drop for TriesGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One accepted/connected WebSocket, wrapped with the REST arbitration
/// machinery. `R`/`W` are the split halves of the underlying transport;
/// TLS, if any, is the caller's concern (spec: the socket abstraction is
/// out of scope here).
pub struct Connection<R, W> {
    socket: Mutex<Socket<R, W>>,
    pending: Mutex<std::collections::VecDeque<Frame>>,
    waiting_answer: Mutex<Option<oneshot::Sender<Frame>>>,
    tries_in_flight: AtomicUsize,
    last_ping_ticks: AtomicU64,
    closing: AtomicBool,
    config: ConnectionConfig,
    protocol: Protocol,
    request_handler: Option<Box<RequestHandler>>,
    push_handler: Option<Box<PushHandler>>,
}

impl<R, W> Connection<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W, config: ConnectionConfig, protocol: Protocol) -> Self {
        let frame_reader = FrameReader::new(reader, config.websocket.clone());
        let frame_writer = FrameWriter::new(writer, config.mask_outgoing);
        Connection {
            socket: Mutex::new(Socket {
                reader: frame_reader,
                writer: frame_writer,
            }),
            pending: Mutex::new(std::collections::VecDeque::new()),
            waiting_answer: Mutex::new(None),
            tries_in_flight: AtomicUsize::new(0),
            last_ping_ticks: AtomicU64::new(monotonic_ms()),
            closing: AtomicBool::new(false),
            config,
            protocol,
            request_handler: None,
            push_handler: None,
        }
    }

    pub fn with_request_handler(mut self, handler: Box<RequestHandler>) -> Self {
        self.request_handler = Some(handler);
        self
    }

    pub fn with_push_handler(mut self, handler: Box<PushHandler>) -> Self {
        self.push_handler = Some(handler);
        self
    }

    /// Queues a frame for the background loop to flush on its next tick,
    /// without taking part in the request/answer arbitration at all.
    pub async fn queue_push(&self, frame: Frame) {
        self.pending.lock().await.push_back(frame);
    }

    /// Writes out anything queued by `queue_push`. Must be called with `L`
    /// already held (spec §4.F's drain-before-send invariant): no call may
    /// write its own frame before any previously queued pushes have gone
    /// out, so the peer never sees them interleaved out of order.
    async fn drain_pending_locked(&self, socket: &mut Socket<R, W>) -> Result<(), Error> {
        let mut pending = self.pending.lock().await;
        let mut drained_any = false;
        while let Some(frame) = pending.pop_front() {
            socket.writer.write_frame(frame).await?;
            drained_any = true;
        }
        if drained_any {
            self.last_ping_ticks.store(monotonic_ms(), Ordering::Relaxed);
        }
        Ok(())
    }

    /// Looks at the next inbound frame with zero wait (a "peek"): if one
    /// isn't immediately available, returns `Ok(None)` rather than
    /// blocking the caller, who may be holding `L` on behalf of another
    /// in-flight call.
    async fn peek_frame(&self, socket: &mut Socket<R, W>) -> Result<Option<Frame>, Error> {
        match tokio::time::timeout(Duration::ZERO, socket.reader.read_message()).await {
            Ok(result) => Ok(Some(result?)),
            Err(_elapsed) => Ok(None),
        }
    }

    async fn maybe_heartbeat_locked(&self, socket: &mut Socket<R, W>) -> Result<ProcessResult, Error> {
        if self.config.heartbeat_ms == 0 {
            return Ok(ProcessResult::None);
        }
        let elapsed = monotonic_ms().saturating_sub(self.last_ping_ticks.load(Ordering::Relaxed));
        if elapsed < self.config.heartbeat_ms {
            return Ok(ProcessResult::None);
        }

        socket.writer.write_frame(Frame::ping(Vec::new())).await?;
        self.last_ping_ticks.store(monotonic_ms(), Ordering::Relaxed);
        Ok(ProcessResult::Heartbeat)
    }

    /// Dispatches a single already-peeked frame. Shared by the background
    /// loop and by `notify_callback`'s own wait, both of which call it
    /// while already holding `L` (spec §4.F: the blocking call "drives the
    /// same read path the background loop would have used").
    async fn dispatch_locked(
        &self,
        socket: &mut Socket<R, W>,
        frame: Frame,
    ) -> Result<ProcessResult, Error> {
        match frame.opcode {
            OpCode::Ping => {
                socket.writer.write_frame(Frame::pong(frame.payload)).await?;
                Ok(ProcessResult::Heartbeat)
            }
            OpCode::Pong => Ok(ProcessResult::Heartbeat),
            OpCode::Close => {
                if !self.closing.swap(true, Ordering::Relaxed) {
                    let _ = socket.writer.write_frame(Frame::close()).await;
                }
                Ok(ProcessResult::Closed)
            }
            OpCode::Text | OpCode::Binary => self.dispatch_rest_locked(socket, frame).await,
            OpCode::Continuation | OpCode::Reserved(_) => Ok(ProcessResult::None),
        }
    }

    async fn dispatch_rest_locked(
        &self,
        socket: &mut Socket<R, W>,
        frame: Frame,
    ) -> Result<ProcessResult, Error> {
        let codec = match self.protocol.codec() {
            Some(codec) => codec,
            None => return Ok(ProcessResult::None),
        };

        if let Some(payload) = codec.decode(&frame, HeadToken::Answer)? {
            if let RestPayload::Answer(_) = &payload {
                let mut waiting = self.waiting_answer.lock().await;
                if let Some(sender) = waiting.take() {
                    let _ = sender.send(frame);
                    return Ok(ProcessResult::Done);
                }
            }
        }

        if let Some(RestPayload::Request(request)) = codec.decode(&frame, HeadToken::Request)? {
            let no_answer = request.no_answer;
            let response = match &self.request_handler {
                Some(handler) => handler(request.clone()).await,
                None => ResponseContext::new(StatusCode::NOT_FOUND),
            };
            if let Some(push_handler) = &self.push_handler {
                push_handler(request);
            }
            if !no_answer {
                let answer = codec.encode_answer(&response)?;
                socket.writer.write_frame(answer).await?;
            }
            return Ok(ProcessResult::Done);
        }

        // Neither head token matched (or the envelope was malformed in a
        // recoverable way); spec §4.B: silently dropped.
        Ok(ProcessResult::None)
    }

    /// One tick of the background `ProcessLoop`: acquire `L` with a short
    /// budget, drain pending pushes, peek at most one inbound frame, and
    /// run the heartbeat check.
    pub async fn process_one(&self) -> Result<ProcessResult, Error> {
        let _tries = TriesGuard::enter(&self.tries_in_flight);
        let mut socket = match tokio::time::timeout(
            Duration::from_millis(LOOP_LOCK_BUDGET_MS),
            self.socket.lock(),
        )
        .await
        {
            Ok(guard) => guard,
            Err(_elapsed) => return Ok(ProcessResult::None),
        };

        self.drain_pending_locked(&mut socket).await?;

        if let Some(frame) = self.peek_frame(&mut socket).await? {
            return self.dispatch_locked(&mut socket, frame).await;
        }

        self.maybe_heartbeat_locked(&mut socket).await
    }

    /// Backoff table for the idle loop (spec §4.E): the longer we've gone
    /// without anything to do, the longer we sleep before checking again,
    /// capped by `loop_delay_ms` when the caller set one.
    fn idle_delay_ms(idle_elapsed_ms: u64, cap: Option<u64>) -> u64 {
        let raw = match idle_elapsed_ms {
            0..=200 => 1,
            201..=500 => 5,
            501..=2000 => 50,
            2001..=5000 => 100,
            _ => 500,
        };
        match cap {
            Some(cap) => raw.min(cap),
            None => raw,
        }
    }

    /// Runs the engine until the connection closes or a fatal error is hit.
    pub async fn run(&self) -> Result<(), Error> {
        let mut idle_elapsed_ms: u64 = 0;
        loop {
            match self.process_one().await {
                Ok(ProcessResult::Closed) => {
                    log::debug!("connection closed");
                    return Ok(());
                }
                Ok(ProcessResult::None) => {
                    let delay = Self::idle_delay_ms(idle_elapsed_ms, self.config.loop_delay_ms);
                    idle_elapsed_ms = idle_elapsed_ms.saturating_add(delay);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Ok(_) => {
                    idle_elapsed_ms = 0;
                }
                Err(err) => {
                    log::warn!("connection engine error: {err}");
                    return Err(err);
                }
            }
        }
    }

    /// The callback arbitrator's entry point (spec §4.F): sends `request`
    /// under lock `L`, then — depending on `mode` — either returns
    /// immediately or blocks until the matching answer arrives.
    pub async fn notify_callback(
        &self,
        request: RequestContext,
        mode: NotifyMode,
    ) -> Result<Option<ResponseContext>, Error> {
        let codec = self.protocol.codec().ok_or(Error::NoMatchingProtocol)?;

        if mode == NotifyMode::NonBlockWithoutAnswer {
            let frame = codec.encode_request(&request)?;
            self.pending.lock().await.push_back(frame);
            return Ok(None);
        }

        let _tries = TriesGuard::enter(&self.tries_in_flight);
        let mut socket = match tokio::time::timeout(
            Duration::from_millis(self.config.acquire_timeout_ms),
            self.socket.lock(),
        )
        .await
        {
            Ok(guard) => guard,
            Err(_elapsed) => return Err(Error::NotFound),
        };

        self.drain_pending_locked(&mut socket).await?;
        let frame = codec.encode_request(&request)?;
        socket.writer.write_frame(frame).await?;

        if mode == NotifyMode::BlockWithoutAnswer {
            return Ok(None);
        }

        let (tx, mut rx) = oneshot::channel();
        *self.waiting_answer.lock().await = Some(tx);

        let deadline = tokio::time::Instant::now() + Duration::from_millis(self.config.answer_timeout_ms);

        // Drives the same read path the background loop would have used,
        // while still holding `L`, until our own answer shows up or we
        // time out (spec §4.F).
        let answer_frame = loop {
            match rx.try_recv() {
                Ok(frame) => break frame,
                Err(oneshot::error::TryRecvError::Closed) => return Err(Error::WebSocketClosed),
                Err(oneshot::error::TryRecvError::Empty) => {}
            }

            if tokio::time::Instant::now() >= deadline {
                *self.waiting_answer.lock().await = None;
                return Err(Error::AnswerTimeout);
            }

            match self.peek_frame(&mut socket).await? {
                Some(frame) => {
                    if self.dispatch_locked(&mut socket, frame).await? == ProcessResult::Closed {
                        // A Close observed mid-wait short-circuits the call
                        // (spec §4.F): the peer is gone, so there's no point
                        // spinning out the rest of the answer timeout.
                        *self.waiting_answer.lock().await = None;
                        return Ok(Some(ResponseContext::new(StatusCode::WEBSOCKET_CLOSED)));
                    }
                }
                None => tokio::time::sleep(Duration::from_millis(1)).await,
            }
        };

        match codec.decode(&answer_frame, HeadToken::Answer)? {
            Some(RestPayload::Answer(response)) => Ok(Some(response)),
            _ => Err(Error::HeadTokenMismatch { expected: "answer" }),
        }
    }

    /// The destructor's drain (spec §4.F): waits until `tries_in_flight`
    /// reaches zero — so no acquirer is mid-use of lock `L` — before taking
    /// it itself, sends a Close frame, and makes a best-effort, bounded
    /// attempt to read the peer's own Close echo back before giving up the
    /// socket, so a cooperative peer's final bytes aren't just left on the
    /// wire.
    pub async fn close(&self) -> Result<(), Error> {
        while self.tries_in_flight.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let _tries = TriesGuard::enter(&self.tries_in_flight);

        let mut socket = self.socket.lock().await;
        if !self.closing.swap(true, Ordering::Relaxed) {
            socket.writer.write_frame(Frame::close()).await?;
        }
        let _ = tokio::time::timeout(Duration::from_secs(1), socket.reader.read_raw_frame()).await;
        Ok(())
    }
}
