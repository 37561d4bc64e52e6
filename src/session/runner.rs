//! Per-connection session driving the change detector.
//!
//! A session runs two loops over one client connection. The inbound loop
//! only reads: it watches for pongs and enforces the read deadline. The
//! outbound loop only writes: it polls the target file and sends deltas,
//! error text, and heartbeat pings. Whichever loop hits a fatal condition
//! cancels the shared token, and the other stops on its next wakeup.

use std::fmt::Display;
use std::sync::Arc;

use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::error::{EndReason, TransportError};
use super::text::Utf8Carry;
use super::timings::SessionTimings;
use crate::tail::{Cursor, DeltaSource, TailError};

/// Remembers the last error reported to the client.
///
/// Identical errors on consecutive polls are reported once.
#[derive(Debug, Default)]
pub struct ErrorMemory {
    last: Option<String>,
}

impl ErrorMemory {
    /// Record a poll error.
    ///
    /// Returns the text to send, or `None` when it repeats the last report.
    pub fn report(&mut self, err: &TailError) -> Option<String> {
        let text = err.to_string();
        if self.last.as_deref() == Some(text.as_str()) {
            return None;
        }
        self.last = Some(text.clone());
        Some(text)
    }

    /// Forget the last error after a successful poll.
    pub fn clear(&mut self) {
        self.last = None;
    }

    /// The last reported error text, if any.
    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.last.as_deref()
    }
}

/// Outcome of a finished session.
#[derive(Debug, Clone)]
pub struct SessionEnd {
    /// Session identifier.
    pub id: Uuid,
    /// Why the session ended.
    pub reason: EndReason,
    /// Cursor after the last delta delivered.
    pub cursor: Cursor,
}

/// One client connection following the target file.
pub struct Session {
    /// Session identifier, used in log fields.
    id: Uuid,
    /// Where deltas come from.
    source: Arc<dyn DeltaSource>,
    /// Cursor the client resumes from.
    cursor: Cursor,
    /// Timers and limits.
    timings: SessionTimings,
    /// Cancelled when either loop stops.
    done: CancellationToken,
    /// Client address, for logging.
    peer: Option<String>,
}

impl Session {
    /// Create a session starting at `cursor`.
    #[must_use]
    pub fn new(source: Arc<dyn DeltaSource>, cursor: Cursor, timings: SessionTimings) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            cursor,
            timings,
            done: CancellationToken::new(),
            peer: None,
        }
    }

    /// Tie this session to a parent shutdown token.
    #[must_use]
    pub fn with_cancellation(mut self, parent: &CancellationToken) -> Self {
        self.done = parent.child_token();
        self
    }

    /// Set the client address reported in logs.
    #[must_use]
    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = Some(peer.into());
        self
    }

    /// Get the session identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get the starting cursor.
    #[must_use]
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Run both loops until the connection ends.
    ///
    /// The outbound loop is spawned as its own task; the inbound loop runs
    /// on the caller's task. Returns once both have stopped.
    pub async fn run<S, R, E>(self, sink: S, stream: R) -> SessionEnd
    where
        S: Sink<Message> + Send + Unpin + 'static,
        S::Error: Display + Send,
        R: Stream<Item = Result<Message, E>> + Send + Unpin,
        E: Display,
    {
        let Self {
            id,
            source,
            cursor,
            timings,
            done,
            peer,
        } = self;

        tracing::info!(
            session_id = %id,
            peer = peer.as_deref().unwrap_or("unknown"),
            mod_time = %chrono::DateTime::<chrono::Utc>::from(cursor.mod_time_as_system_time()),
            offset = cursor.offset,
            "Connection established"
        );

        let outbound = Outbound {
            id,
            source,
            cursor,
            timings,
            errors: ErrorMemory::default(),
            carry: Utf8Carry::default(),
        };
        let writer = tokio::spawn(outbound.run(sink, done.clone()));

        let inbound_reason = read_loop(stream, &timings, &done).await;
        done.cancel();

        let (outbound_reason, final_cursor) = match writer.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(session_id = %id, error = %e, "Outbound task failed");
                (None, cursor)
            }
        };

        let reason = inbound_reason
            .or(outbound_reason)
            .unwrap_or(EndReason::Shutdown);

        tracing::info!(
            session_id = %id,
            reason = %reason,
            offset = final_cursor.offset,
            "Session ended"
        );

        SessionEnd {
            id,
            reason,
            cursor: final_cursor,
        }
    }
}

fn frame_len(message: &Message) -> usize {
    match message {
        Message::Text(text) => text.len(),
        Message::Binary(data) | Message::Ping(data) | Message::Pong(data) => data.len(),
        Message::Close(_) => 0,
    }
}

/// Inbound loop. Returns `None` when stopped by the shared token.
async fn read_loop<R, E>(
    mut stream: R,
    timings: &SessionTimings,
    done: &CancellationToken,
) -> Option<EndReason>
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let mut deadline = Instant::now() + timings.pong_wait;
    loop {
        let frame = tokio::select! {
            biased;
            () = done.cancelled() => return None,
            () = tokio::time::sleep_until(deadline) => {
                return Some(TransportError::ReadTimeout.into());
            }
            frame = stream.next() => frame,
        };

        let message = match frame {
            Some(Ok(message)) => message,
            Some(Err(e)) => return Some(TransportError::Read(e.to_string()).into()),
            None => return Some(TransportError::Closed.into()),
        };

        let size = frame_len(&message);
        if size > timings.max_message_size {
            return Some(
                TransportError::MessageTooLarge {
                    size,
                    limit: timings.max_message_size,
                }
                .into(),
            );
        }

        match message {
            Message::Pong(_) => deadline = Instant::now() + timings.pong_wait,
            Message::Close(_) => return Some(EndReason::ClientClosed),
            _ => {}
        }
    }
}

/// State owned by the outbound loop.
struct Outbound {
    id: Uuid,
    source: Arc<dyn DeltaSource>,
    cursor: Cursor,
    timings: SessionTimings,
    errors: ErrorMemory,
    /// Partial character left over from the previous delta.
    carry: Utf8Carry,
}

impl Outbound {
    async fn run<S>(mut self, mut sink: S, done: CancellationToken) -> (Option<EndReason>, Cursor)
    where
        S: Sink<Message> + Unpin,
        S::Error: Display,
    {
        let start = Instant::now();
        let mut poll = interval_at(start + self.timings.poll_interval, self.timings.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ping = interval_at(start + self.timings.ping_interval, self.timings.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            let result = tokio::select! {
                biased;
                () = done.cancelled() => break None,
                _ = ping.tick() => self.send(&mut sink, Message::Ping(Vec::new())).await,
                _ = poll.tick() => self.poll_and_send(&mut sink).await,
            };
            if let Err(e) = result {
                break Some(EndReason::from(e));
            }
        };

        done.cancel();
        let _ = timeout(self.timings.write_wait, sink.close()).await;
        (reason, self.cursor)
    }

    async fn poll_and_send<S>(&mut self, sink: &mut S) -> Result<(), TransportError>
    where
        S: Sink<Message> + Unpin,
        S::Error: Display,
    {
        match self.source.poll(self.cursor).await {
            Ok(delta) => {
                self.errors.clear();
                if !delta.is_empty() {
                    // A delta that does not start where the last one ended
                    // was read from a rewound file.
                    let start = delta.cursor.offset.saturating_sub(delta.bytes.len() as u64);
                    if start != self.cursor.offset {
                        self.carry.reset();
                    }
                    let text = self.carry.decode(&delta.bytes);
                    if !text.is_empty() {
                        self.send(sink, Message::Text(text)).await?;
                    }
                    tracing::debug!(
                        session_id = %self.id,
                        bytes = delta.bytes.len(),
                        held = self.carry.pending(),
                        offset = delta.cursor.offset,
                        "Sent delta"
                    );
                }
                self.cursor = delta.cursor;
            }
            Err(e) => {
                if let Some(text) = self.errors.report(&e) {
                    tracing::warn!(
                        session_id = %self.id,
                        kind = e.kind(),
                        error = %e,
                        "Poll failed"
                    );
                    self.send(sink, Message::Text(text)).await?;
                }
            }
        }
        Ok(())
    }

    async fn send<S>(&self, sink: &mut S, message: Message) -> Result<(), TransportError>
    where
        S: Sink<Message> + Unpin,
        S::Error: Display,
    {
        match timeout(self.timings.write_wait, sink.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TransportError::Write(e.to_string())),
            Err(_) => Err(TransportError::WriteTimeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;
    use tokio_stream::wrappers::ReceiverStream;
    use tokio_util::sync::PollSender;

    use crate::tail::Delta;

    /// Replays scripted poll results, then reports "unchanged" forever.
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<Delta, TailError>>>,
        seen: Mutex<Vec<Cursor>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Delta, TailError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                seen: Mutex::default(),
            })
        }

        fn seen(&self) -> Vec<Cursor> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeltaSource for ScriptedSource {
        async fn poll(&self, cursor: Cursor) -> Result<Delta, TailError> {
            self.seen.lock().unwrap().push(cursor);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Delta::empty(cursor)))
        }
    }

    fn delta(text: &str, cursor: Cursor) -> Result<Delta, TailError> {
        Ok(Delta {
            bytes: text.as_bytes().to_vec(),
            cursor,
        })
    }

    fn raw(bytes: &[u8], cursor: Cursor) -> Result<Delta, TailError> {
        Ok(Delta {
            bytes: bytes.to_vec(),
            cursor,
        })
    }

    fn missing() -> Result<Delta, TailError> {
        Err(TailError::FileUnavailable {
            path: PathBuf::from("/var/log/app.log"),
            source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
        })
    }

    struct Harness {
        incoming: mpsc::Sender<Result<Message, io::Error>>,
        outgoing: mpsc::Receiver<Message>,
        handle: JoinHandle<SessionEnd>,
    }

    fn start(source: Arc<ScriptedSource>, cursor: Cursor, capacity: usize) -> Harness {
        start_session(Session::new(source, cursor, SessionTimings::default()), capacity)
    }

    fn start_session(session: Session, capacity: usize) -> Harness {
        let (in_tx, in_rx) = mpsc::channel(16);
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let handle = tokio::spawn(session.run(PollSender::new(out_tx), ReceiverStream::new(in_rx)));
        Harness {
            incoming: in_tx,
            outgoing: out_rx,
            handle,
        }
    }

    async fn next_text(harness: &mut Harness) -> String {
        let message = timeout(Duration::from_secs(5), harness.outgoing.recv())
            .await
            .expect("no frame within 5s")
            .expect("connection closed");
        match message {
            Message::Text(text) => text,
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn test_error_memory_suppresses_repeats() {
        let mut memory = ErrorMemory::default();
        let Err(err) = missing() else { unreachable!() };

        assert!(memory.report(&err).is_some());
        assert!(memory.report(&err).is_none());
        assert_eq!(memory.last(), Some(err.to_string().as_str()));

        memory.clear();
        assert!(memory.last().is_none());
        assert!(memory.report(&err).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delta_sent_and_cursor_advanced() {
        let start_cursor = Cursor::new(10, 6);
        let next = Cursor::new(20, 12);
        let source = ScriptedSource::new(vec![delta("world\n", next)]);
        let mut harness = start(source.clone(), start_cursor, 8);

        assert_eq!(next_text(&mut harness).await, "world\n");

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let seen = source.seen();
        assert_eq!(seen[0], start_cursor);
        assert_eq!(seen[1], next);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_delta_sends_nothing() {
        let source = ScriptedSource::new(vec![]);
        let mut harness = start(source.clone(), Cursor::start(), 8);

        let result = timeout(Duration::from_secs(5), harness.outgoing.recv()).await;
        assert!(result.is_err(), "idle file should produce no frames");
        assert!(source.seen().len() >= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_error_reported_once() {
        let cursor = Cursor::new(10, 6);
        let after = Cursor::new(20, 7);
        let source = ScriptedSource::new(vec![
            missing(),
            missing(),
            missing(),
            delta("x", after),
            missing(),
        ]);
        let mut harness = start(source.clone(), cursor, 8);
        let Err(err) = missing() else { unreachable!() };
        let error_text = err.to_string();

        assert_eq!(next_text(&mut harness).await, error_text);
        assert_eq!(next_text(&mut harness).await, "x");
        assert_eq!(next_text(&mut harness).await, error_text);

        let extra = timeout(Duration::from_secs(3), harness.outgoing.recv()).await;
        assert!(extra.is_err(), "no further frames expected");

        // Errors leave the cursor untouched.
        let seen = source.seen();
        assert_eq!(&seen[..4], &[cursor, cursor, cursor, cursor]);
        assert_eq!(seen[4], after);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_keeps_idle_session_open() {
        let mut harness = start(ScriptedSource::new(vec![]), Cursor::start(), 8);

        for _ in 0..4 {
            let message = timeout(Duration::from_secs(55), harness.outgoing.recv())
                .await
                .expect("heartbeat within one period")
                .expect("connection open");
            assert!(matches!(message, Message::Ping(ref data) if data.is_empty()));
            harness
                .incoming
                .send(Ok(Message::Pong(Vec::new())))
                .await
                .unwrap();
        }

        assert!(!harness.handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_pong_closes_session() {
        let mut harness = start(ScriptedSource::new(vec![]), Cursor::start(), 8);

        let message = harness.outgoing.recv().await.unwrap();
        assert!(matches!(message, Message::Ping(_)));

        let end = timeout(Duration::from_secs(10), &mut harness.handle)
            .await
            .expect("session should end at the read deadline")
            .unwrap();
        assert_eq!(end.reason, EndReason::Transport(TransportError::ReadTimeout));
        assert!(harness.outgoing.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_frames_do_not_extend_deadline() {
        let mut harness = start(ScriptedSource::new(vec![]), Cursor::start(), 8);

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_secs(10)).await;
            harness
                .incoming
                .send(Ok(Message::Text("hi".to_string())))
                .await
                .unwrap();
        }

        let end = timeout(Duration::from_secs(15), &mut harness.handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(end.reason, EndReason::Transport(TransportError::ReadTimeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_consumer_is_dropped() {
        let source = ScriptedSource::new(vec![
            delta("a", Cursor::new(1, 1)),
            delta("b", Cursor::new(2, 2)),
        ]);
        // Room for one frame; nobody reads.
        let mut harness = start(source, Cursor::start(), 1);

        let end = timeout(Duration::from_secs(30), &mut harness.handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(end.reason, EndReason::Transport(TransportError::WriteTimeout));
        assert_eq!(end.cursor, Cursor::new(1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_frame_closes_session() {
        let mut harness = start(ScriptedSource::new(vec![]), Cursor::start(), 8);

        harness
            .incoming
            .send(Ok(Message::Text("x".repeat(513))))
            .await
            .unwrap();

        let end = (&mut harness.handle).await.unwrap();
        assert_eq!(
            end.reason,
            EndReason::Transport(TransportError::MessageTooLarge {
                size: 513,
                limit: 512
            })
        );
        assert!(harness.outgoing.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_close_stops_both_loops() {
        let mut harness = start(ScriptedSource::new(vec![]), Cursor::new(3, 4), 8);

        harness.incoming.send(Ok(Message::Close(None))).await.unwrap();

        let end = (&mut harness.handle).await.unwrap();
        assert_eq!(end.reason, EndReason::ClientClosed);
        assert_eq!(end.cursor, Cursor::new(3, 4));
        assert!(harness.outgoing.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_error_ends_session() {
        let mut harness = start(ScriptedSource::new(vec![]), Cursor::start(), 8);

        harness
            .incoming
            .send(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")))
            .await
            .unwrap();

        let end = (&mut harness.handle).await.unwrap();
        assert_eq!(
            end.reason,
            EndReason::Transport(TransportError::Read("reset".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_token_stops_session() {
        let shutdown = CancellationToken::new();
        let session = Session::new(
            ScriptedSource::new(vec![]),
            Cursor::start(),
            SessionTimings::default(),
        )
        .with_cancellation(&shutdown)
        .with_peer("127.0.0.1");
        let mut harness = start_session(session, 8);

        tokio::time::sleep(Duration::from_secs(2)).await;
        shutdown.cancel();

        let end = (&mut harness.handle).await.unwrap();
        assert_eq!(end.reason, EndReason::Shutdown);
        assert!(harness.outgoing.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_character_split_across_polls_is_sent_whole() {
        let source = ScriptedSource::new(vec![
            raw(b"caf\xC3", Cursor::new(1, 4)),
            raw(b"\xA9\n", Cursor::new(2, 6)),
        ]);
        let mut harness = start(source.clone(), Cursor::start(), 8);

        assert_eq!(next_text(&mut harness).await, "caf");
        assert_eq!(next_text(&mut harness).await, "\u{e9}\n");

        // The cursor still counts raw bytes.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(source.seen()[2], Cursor::new(2, 6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lone_partial_character_sends_nothing_until_completed() {
        let source = ScriptedSource::new(vec![
            raw(b"\xE2\x82", Cursor::new(1, 2)),
            Ok(Delta::empty(Cursor::new(1, 2))),
            raw(b"\xAC", Cursor::new(2, 3)),
        ]);
        let mut harness = start(source, Cursor::start(), 8);

        assert_eq!(next_text(&mut harness).await, "\u{20ac}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rewound_file_drops_partial_character() {
        let source = ScriptedSource::new(vec![
            raw(b"ab\xC3", Cursor::new(1, 3)),
            // Truncated and rewritten: read again from offset 0.
            raw(b"new\n", Cursor::new(2, 4)),
        ]);
        let mut harness = start(source, Cursor::start(), 8);

        assert_eq!(next_text(&mut harness).await, "ab");
        assert_eq!(next_text(&mut harness).await, "new\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_error_ends_session() {
        let source = ScriptedSource::new(vec![delta("lost\n", Cursor::new(1, 5))]);
        let Harness {
            incoming,
            outgoing,
            mut handle,
        } = start(source, Cursor::start(), 8);
        // The peer is gone; every send fails immediately.
        drop(outgoing);

        let end = timeout(Duration::from_secs(5), &mut handle)
            .await
            .expect("session should end on the first failed write")
            .unwrap();
        assert!(
            matches!(end.reason, EndReason::Transport(TransportError::Write(_))),
            "unexpected reason {:?}",
            end.reason
        );
        // The delta was never delivered.
        assert_eq!(end.cursor, Cursor::start());
        // The inbound loop stopped too and released its stream.
        assert!(incoming.is_closed());
    }
}
