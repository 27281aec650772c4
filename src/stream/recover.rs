//! Recovery of complete JSON objects from text that may hold fragments or
//! several objects back to back.
//!
//! Every closing brace is a candidate end of the object that starts at the
//! current boundary. A candidate that parses moves the boundary past it; one
//! that does not (an inner brace, or a brace inside a string) is skipped and the
//! scan moves on to the next brace.

use memchr::{memchr, memchr_iter};

use crate::protocol::cohere::UpstreamRecord;

/// Records recovered by a single call-scoped scan.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub records: Vec<UpstreamRecord>,
    /// Byte offset up to which the input is no longer needed.
    pub consumed: usize,
}

/// Call-scoped recovery: scan `text` once and report how much of it was used.
///
/// Whatever follows `consumed` (typically an object whose closing brace has not
/// arrived yet) is left to the caller. Feeding only the next read on its own
/// loses that fragment; [`RecordRecoverer`] keeps it instead.
#[must_use]
pub fn scan_records(text: &str) -> ScanOutcome {
    let mut records = Vec::new();
    let (consumed, _) = scan_span(text, 0, &mut records);
    ScanOutcome { records, consumed }
}

/// Offset of the next `{` at or after `from`, or the end of `text`.
///
/// Nothing before an opening brace can start a record, so it is safe to drop.
#[inline]
fn next_object_start(text: &str, from: usize) -> usize {
    memchr(b'{', &text.as_bytes()[from..]).map_or(text.len(), |rel| from + rel)
}

/// Returns `(boundary, scanned_to)`. Braces before `scan_start` have already been
/// tried against the current boundary and are not retried.
fn scan_span(text: &str, scan_start: usize, out: &mut Vec<UpstreamRecord>) -> (usize, usize) {
    let mut boundary = next_object_start(text, 0);
    let scan_start = scan_start.max(boundary);
    let bytes = text.as_bytes();

    for rel in memchr_iter(b'}', &bytes[scan_start..]) {
        let brace = scan_start + rel;
        if brace < boundary {
            continue;
        }
        if let Ok(record) = serde_json::from_str::<UpstreamRecord>(&text[boundary..=brace]) {
            out.push(record);
            boundary = next_object_start(text, brace + 1);
        }
    }

    (boundary, text.len())
}

/// Session-scoped recovery: keeps the unconsumed remainder between reads so an
/// object split across network chunks is recovered once it is complete.
#[derive(Debug)]
pub struct RecordRecoverer {
    buffer: String,
    scanned: usize,
    max_pending: usize,
    discarded: usize,
}

impl RecordRecoverer {
    #[must_use]
    pub fn new(max_pending: usize) -> Self {
        Self {
            buffer: String::new(),
            scanned: 0,
            max_pending: max_pending.max(1),
            discarded: 0,
        }
    }

    /// Append decoded text and return every record it completes, in order.
    pub fn push(&mut self, text: &str) -> Vec<UpstreamRecord> {
        let mut out = Vec::new();
        self.push_into(text, &mut out);
        out
    }

    /// Append decoded text and push completed records into `out`.
    pub fn push_into(&mut self, text: &str, out: &mut Vec<UpstreamRecord>) {
        if text.is_empty() {
            return;
        }
        self.buffer.push_str(text);

        let (boundary, scanned_to) = scan_span(&self.buffer, self.scanned, out);
        if boundary == self.buffer.len() {
            self.buffer.clear();
            self.scanned = 0;
        } else {
            self.buffer.drain(..boundary);
            self.scanned = scanned_to - boundary;
        }

        if self.buffer.len() > self.max_pending {
            tracing::warn!(
                pending_bytes = self.buffer.len(),
                max_pending = self.max_pending,
                "discarding unparseable upstream remainder"
            );
            self.discarded += self.buffer.len();
            self.buffer.clear();
            self.scanned = 0;
        }
    }

    /// Text retained for the next read (an incomplete object, if any).
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Bytes thrown away because the remainder outgrew `max_pending`.
    #[must_use]
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Drop and return whatever never completed.
    pub fn take_pending(&mut self) -> String {
        self.scanned = 0;
        std::mem::take(&mut self.buffer)
    }
}
