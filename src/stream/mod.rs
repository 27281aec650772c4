//! Upstream byte stream to OpenAI chat-completion chunks.
//!
//! Bytes are decoded to text ([`decode`]), complete JSON records are recovered
//! from the text ([`recover`]), each record yields at most one text delta
//! ([`delta`]), and deltas are wrapped in chunk envelopes ([`chunk`]) that are
//! framed as server-sent events ([`sse`]). [`session`] drives this per request;
//! [`buffered`] does the same over a whole body for non-streaming callers.

pub mod buffered;
pub mod chunk;
pub mod decode;
pub mod delta;
pub mod recover;
pub mod session;
pub mod sse;

pub use buffered::{build_completion_response, collect_content};
pub use chunk::ChunkContext;
pub use decode::{decode_bytes, ChunkDecoder, DecodedText};
pub use delta::extract_delta;
pub use recover::{scan_records, RecordRecoverer, ScanOutcome};
pub use session::{
    build_stream_response, session_frame_stream, CloseReason, SessionState, StreamSession,
};
pub use sse::{encode_chunk_frame, sse_ok_response};
