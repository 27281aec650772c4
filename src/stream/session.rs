//! One streamed translation: upstream bytes in, `data:` frames out.

use std::time::Instant;

use axum::response::Response;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use smallvec::SmallVec;

use crate::protocol::cohere::UpstreamRecord;

use super::chunk::ChunkContext;
use super::decode::ChunkDecoder;
use super::delta::extract_delta;
use super::recover::RecordRecoverer;
use super::sse::{encode_chunk_frame, sse_ok_response};

/// Lifecycle of a [`StreamSession`]. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Headers may not have been sent yet; no upstream bytes seen.
    Open,
    Streaming,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Upstream signalled end of stream; the terminal frame was written.
    Completed,
    /// Reading the upstream body failed mid-stream.
    UpstreamError,
    /// The caller went away before the upstream finished.
    Cancelled,
}

#[derive(Debug, Default, Clone, Copy)]
struct SessionStats {
    chunks: usize,
    records: usize,
    frames: usize,
}

type CloseHook = Box<dyn FnOnce(CloseReason) + Send>;

/// State for one end-to-end streamed translation.
///
/// Owns the decode carry, the record remainder and the chunk context, so a
/// session is strictly per request and never shared. The span current at
/// construction is re-entered for every log the session writes, since the body
/// is polled after the handler's span has been exited.
pub struct StreamSession {
    ctx: ChunkContext,
    decoder: ChunkDecoder,
    recoverer: RecordRecoverer,
    records: Vec<UpstreamRecord>,
    state: SessionState,
    close_reason: Option<CloseReason>,
    stats: SessionStats,
    started: Instant,
    span: tracing::Span,
    close_hook: Option<CloseHook>,
}

impl StreamSession {
    #[must_use]
    pub fn new(ctx: ChunkContext, max_pending_bytes: usize) -> Self {
        Self {
            ctx,
            decoder: ChunkDecoder::new(),
            recoverer: RecordRecoverer::new(max_pending_bytes),
            records: Vec::with_capacity(4),
            state: SessionState::Open,
            close_reason: None,
            stats: SessionStats::default(),
            started: Instant::now(),
            span: tracing::Span::current(),
            close_hook: None,
        }
    }

    /// Run `hook` once with the reason the session closed, cancellation included.
    #[must_use]
    pub fn on_close(mut self, hook: impl FnOnce(CloseReason) + Send + 'static) -> Self {
        self.close_hook = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    #[must_use]
    pub fn context(&self) -> &ChunkContext {
        &self.ctx
    }

    /// Frames written so far, terminal included.
    #[must_use]
    pub fn frames_written(&self) -> usize {
        self.stats.frames
    }

    /// Feed one upstream read and append the frames it completes to `out`.
    pub fn on_chunk(&mut self, raw: &[u8], out: &mut Vec<Bytes>) {
        if self.state == SessionState::Closed {
            return;
        }
        let span = self.span.clone();
        let _entered = span.enter();
        self.state = SessionState::Streaming;
        self.stats.chunks += 1;
        let text = self.decoder.decode(raw);
        self.emit_text(&text, out);
    }

    /// Upstream reached end of stream: flush, then write the single terminal frame.
    ///
    /// Returns `false` (writing nothing) if the session was already closed.
    pub fn finish(&mut self, out: &mut Vec<Bytes>) -> bool {
        if self.state == SessionState::Closed {
            return false;
        }
        let span = self.span.clone();
        let _entered = span.enter();

        let tail = self.decoder.finish();
        self.emit_text(&tail, out);
        let leftover = self.recoverer.take_pending();
        if !leftover.trim().is_empty() {
            tracing::warn!(
                model = self.ctx.model(),
                pending_bytes = leftover.len(),
                "upstream stream ended inside an incomplete record"
            );
        }

        match encode_chunk_frame(&self.ctx.wrap_terminal()) {
            Ok(frame) => {
                self.stats.frames += 1;
                out.push(frame);
            }
            Err(err) => tracing::error!(error = %err, "failed to encode terminal chunk"),
        }
        self.close(CloseReason::Completed);
        true
    }

    /// Close without a terminal frame.
    pub fn abort(&mut self, reason: CloseReason) {
        if self.state != SessionState::Closed {
            self.close(reason);
        }
    }

    fn emit_text(&mut self, text: &str, out: &mut Vec<Bytes>) {
        let Self {
            ctx,
            recoverer,
            records,
            stats,
            ..
        } = self;

        recoverer.push_into(text, records);
        for record in records.drain(..) {
            stats.records += 1;
            if record.is_finished() {
                tracing::debug!(
                    model = ctx.model(),
                    finish_reason = record.finish_reason().unwrap_or("unknown"),
                    "upstream reported end of generation"
                );
            }
            let Some(delta) = extract_delta(&record) else {
                continue;
            };
            match encode_chunk_frame(&ctx.wrap(&delta)) {
                Ok(frame) => {
                    stats.frames += 1;
                    out.push(frame);
                }
                Err(err) => tracing::error!(error = %err, "failed to encode stream chunk"),
            }
        }
    }

    fn close(&mut self, reason: CloseReason) {
        let _entered = self.span.enter();
        self.state = SessionState::Closed;
        self.close_reason = Some(reason);
        let elapsed_ms = self.started.elapsed().as_millis();
        if reason == CloseReason::Completed {
            tracing::info!(
                model = self.ctx.model(),
                chunks = self.stats.chunks,
                records = self.stats.records,
                frames = self.stats.frames,
                elapsed_ms,
                "stream completed"
            );
        } else {
            tracing::warn!(
                model = self.ctx.model(),
                reason = ?reason,
                chunks = self.stats.chunks,
                frames = self.stats.frames,
                discarded_bytes = self.recoverer.discarded(),
                elapsed_ms,
                "stream closed early"
            );
        }
        if let Some(hook) = self.close_hook.take() {
            hook(reason);
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        // Dropped while still open: hyper released the body because the caller left.
        if self.state != SessionState::Closed {
            self.close(CloseReason::Cancelled);
        }
    }
}

struct PendingBytes {
    chunks: SmallVec<[Bytes; 8]>,
    head: usize,
}

impl PendingBytes {
    #[inline]
    fn new() -> Self {
        Self {
            chunks: SmallVec::new(),
            head: 0,
        }
    }

    #[inline]
    fn pop_front(&mut self) -> Option<Bytes> {
        if self.head >= self.chunks.len() {
            return None;
        }
        let chunk = std::mem::take(&mut self.chunks[self.head]);
        self.head += 1;
        if self.head == self.chunks.len() {
            self.chunks.clear();
            self.head = 0;
        }
        Some(chunk)
    }

    #[inline]
    fn extend_from_frames(&mut self, frames: &mut Vec<Bytes>) {
        if frames.is_empty() {
            return;
        }
        self.chunks.reserve(frames.len());
        self.chunks.extend(frames.drain(..));
    }
}

/// Drive `session` over an upstream byte stream, yielding outgoing frames in
/// arrival order.
///
/// The stream ends after the terminal frame on upstream end-of-stream, or
/// without it on an upstream read error. Dropping the returned stream drops the
/// upstream body and the session with it.
pub fn session_frame_stream<S, E>(
    byte_stream: S,
    session: StreamSession,
) -> impl Stream<Item = Bytes> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Debug + Send + 'static,
{
    futures_util::stream::unfold(
        (
            Box::pin(byte_stream),
            session,
            Vec::<Bytes>::with_capacity(8),
            PendingBytes::new(),
            false,
        ),
        |(mut upstream, mut session, mut frames, mut pending, mut done)| async move {
            loop {
                if let Some(frame) = pending.pop_front() {
                    return Some((frame, (upstream, session, frames, pending, done)));
                }
                if done {
                    return None;
                }
                match upstream.as_mut().next().await {
                    Some(Ok(chunk)) => session.on_chunk(&chunk, &mut frames),
                    Some(Err(err)) => {
                        session.span().in_scope(|| {
                            tracing::warn!(
                                model = session.context().model(),
                                error = ?err,
                                "upstream stream failed"
                            );
                        });
                        session.abort(CloseReason::UpstreamError);
                        done = true;
                    }
                    None => {
                        session.finish(&mut frames);
                        done = true;
                    }
                }
                pending.extend_from_frames(&mut frames);
            }
        },
    )
}

/// Build the event-stream response for one session.
pub fn build_stream_response<S, E>(byte_stream: S, session: StreamSession) -> Response
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Debug + Send + 'static,
{
    let frames = session_frame_stream(byte_stream, session);
    sse_ok_response(axum::body::Body::from_stream(
        frames.map(Ok::<Bytes, std::convert::Infallible>),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_json(frame: &Bytes) -> serde_json::Value {
        let text = std::str::from_utf8(frame).unwrap();
        let body = text
            .strip_prefix("data: ")
            .and_then(|rest| rest.strip_suffix("\n\n"))
            .unwrap();
        serde_json::from_str(body).unwrap()
    }

    fn session() -> StreamSession {
        StreamSession::new(ChunkContext::with_created("command-r", 42), 1024)
    }

    #[test]
    fn test_state_machine_open_streaming_closed() {
        let mut session = session();
        let mut out = Vec::new();
        assert_eq!(session.state(), SessionState::Open);
        session.on_chunk(br#"{"text":"a"}"#, &mut out);
        assert_eq!(session.state(), SessionState::Streaming);
        assert!(session.finish(&mut out));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.close_reason(), Some(CloseReason::Completed));
    }

    #[test]
    fn test_terminal_frame_written_exactly_once() {
        let mut session = session();
        let mut out = Vec::new();
        assert!(session.finish(&mut out));
        assert!(!session.finish(&mut out));
        assert_eq!(out.len(), 1);
        assert_eq!(frame_json(&out[0])["choices"][0]["finish_reason"], "stop");
    }

    #[test]
    fn test_no_frames_for_absent_or_empty_deltas() {
        let mut session = session();
        let mut out = Vec::new();
        session.on_chunk(
            br#"{"event_type":"stream-start","generation_id":"g"}{"text":""}{"error":null}"#,
            &mut out,
        );
        assert!(out.is_empty());
        assert_eq!(session.frames_written(), 0);
    }

    #[test]
    fn test_closed_session_ignores_further_input() {
        let mut session = session();
        let mut out = Vec::new();
        session.abort(CloseReason::UpstreamError);
        session.on_chunk(br#"{"text":"late"}"#, &mut out);
        assert!(!session.finish(&mut out));
        assert!(out.is_empty());
        assert_eq!(session.close_reason(), Some(CloseReason::UpstreamError));
    }

    #[test]
    fn test_split_record_across_reads() {
        let mut session = session();
        let mut out = Vec::new();
        session.on_chunk(br#"{"text":"Hel"#, &mut out);
        assert!(out.is_empty());
        session.on_chunk(br#"lo"}{"text":" world"}"#, &mut out);
        session.finish(&mut out);

        let frames: Vec<_> = out.iter().map(frame_json).collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0]["choices"][0]["delta"]["content"], "Hello");
        assert_eq!(frames[1]["choices"][0]["delta"]["content"], " world");
        assert!(frames[0]["choices"][0]["finish_reason"].is_null());
        assert_eq!(frames[2]["choices"][0]["finish_reason"], "stop");
        for frame in &frames {
            assert_eq!(frame["created"], 42);
            assert_eq!(frame["model"], "command-r");
        }
    }

    #[test]
    fn test_error_record_surfaces_as_content() {
        let mut session = session();
        let mut out = Vec::new();
        session.on_chunk(br#"{"error":"rate limited"}"#, &mut out);
        assert_eq!(
            frame_json(&out[0])["choices"][0]["delta"]["content"],
            "rate limited"
        );
    }

    #[test]
    fn test_dropping_open_session_reports_cancelled_once() {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut session = session().on_close(move |reason| {
            let _ = tx.send(reason);
        });
        let mut out = Vec::new();
        session.on_chunk(br#"{"text":"a"}"#, &mut out);
        drop(session);
        assert_eq!(rx.try_recv(), Ok(CloseReason::Cancelled));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropping_finished_session_reports_only_completion() {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut session = session().on_close(move |reason| {
            let _ = tx.send(reason);
        });
        session.finish(&mut Vec::new());
        drop(session);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![CloseReason::Completed]);
    }

    #[test]
    fn test_session_keeps_the_span_it_was_created_in() {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(std::io::sink)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("chat", request_id = "r-1");
            let session = span.in_scope(session);
            assert!(span.id().is_some());
            assert_eq!(session.span().id(), span.id());
            assert_eq!(
                session.span().metadata().map(|meta| meta.name()),
                Some("chat")
            );
        });
    }

    #[tokio::test]
    async fn test_frame_stream_completes_with_terminal() {
        let upstream = futures_util::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(br#"{"text":"a"}"#)),
            Ok(Bytes::from_static(b"\n")),
            Ok(Bytes::from_static(br#"{"text":"b"}"#)),
        ]);
        let frames: Vec<Bytes> = session_frame_stream(upstream, session()).collect().await;
        let frames: Vec<_> = frames.iter().map(frame_json).collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0]["choices"][0]["delta"]["content"], "a");
        assert_eq!(frames[1]["choices"][0]["delta"]["content"], "b");
        assert_eq!(frames[2]["choices"][0]["finish_reason"], "stop");
    }

    #[tokio::test]
    async fn test_frame_stream_upstream_error_has_no_terminal() {
        let upstream = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(br#"{"text":"a"}"#)),
            Err(std::io::Error::other("connection reset")),
            Ok(Bytes::from_static(br#"{"text":"never"}"#)),
        ]);
        let frames: Vec<Bytes> = session_frame_stream(upstream, session()).collect().await;
        assert_eq!(frames.len(), 1);
        assert!(frame_json(&frames[0])["choices"][0]["finish_reason"].is_null());
    }
}
