//! Byte-to-text decoding for upstream chunks of uncertain encoding.

use std::borrow::Cow;

use chardetng::EncodingDetector;
use encoding_rs::{
    DecoderResult, Encoding, BIG5, EUC_JP, EUC_KR, GB18030, SHIFT_JIS, UTF_16BE, UTF_16LE, UTF_8,
};

/// Encodings attempted in order before falling back to detection.
///
/// Single-byte legacy encodings accept every byte sequence, so they are left to the
/// detector instead of being listed here. The UTF-16 entries accept nearly any
/// even-length input too, so [`decode_bytes`] only tries them on input that
/// [`looks_like_utf16`].
#[must_use]
pub fn decode_priority() -> [&'static Encoding; 8] {
    [UTF_8, GB18030, BIG5, SHIFT_JIS, EUC_JP, EUC_KR, UTF_16LE, UTF_16BE]
}

/// Text decoded from one chunk, with the encoding that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedText<'a> {
    pub text: Cow<'a, str>,
    pub encoding: &'static Encoding,
    /// Set when the detector path dropped undecodable byte runs.
    pub lossy: bool,
}

impl DecodedText<'_> {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Decode `bytes` with the first encoding in [`decode_priority`] that accepts
/// the whole input, or with the detector's best guess otherwise.
///
/// Never fails: the detector path drops malformed sequences rather than
/// substituting them.
#[must_use]
pub fn decode_bytes(bytes: &[u8]) -> DecodedText<'_> {
    if bytes.is_empty() {
        return DecodedText {
            text: Cow::Borrowed(""),
            encoding: UTF_8,
            lossy: false,
        };
    }

    let utf16_plausible = looks_like_utf16(bytes);
    let mut candidates = decode_priority()
        .into_iter()
        .filter(|encoding| utf16_plausible || !is_utf16(encoding));
    if let Some(decoded) = candidates.find_map(|encoding| {
        encoding
            .decode_without_bom_handling_and_without_replacement(bytes)
            .map(|text| DecodedText {
                text,
                encoding,
                lossy: false,
            })
    }) {
        return decoded;
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let guessed = detector.guess(None, true);
    let (text, dropped) = decode_dropping_malformed(guessed, bytes);
    tracing::debug!(
        encoding = guessed.name(),
        input_len = bytes.len(),
        dropped,
        "upstream chunk matched no listed encoding; decoded with detected encoding"
    );
    DecodedText {
        text: Cow::Owned(text),
        encoding: guessed,
        lossy: dropped > 0,
    }
}

/// A UTF-16 byte order mark, or any NUL byte. Text of the JSON stream never
/// carries NUL in an ASCII-compatible encoding.
#[must_use]
pub fn looks_like_utf16(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0xFF, 0xFE])
        || bytes.starts_with(&[0xFE, 0xFF])
        || memchr::memchr(0, bytes).is_some()
}

#[inline]
fn is_utf16(encoding: &&'static Encoding) -> bool {
    *encoding == UTF_16LE || *encoding == UTF_16BE
}

fn decode_dropping_malformed(encoding: &'static Encoding, bytes: &[u8]) -> (String, usize) {
    let mut decoder = encoding.new_decoder_without_bom_handling();
    let capacity = decoder
        .max_utf8_buffer_length_without_replacement(bytes.len())
        .unwrap_or(bytes.len().saturating_mul(3));
    let mut out = String::with_capacity(capacity);
    let mut src = bytes;
    let mut dropped = 0;
    loop {
        let (result, read) = decoder.decode_to_string_without_replacement(src, &mut out, true);
        src = &src[read..];
        match result {
            DecoderResult::InputEmpty => break,
            DecoderResult::Malformed(_, _) => dropped += 1,
            DecoderResult::OutputFull => out.reserve(src.len().saturating_mul(3).max(16)),
        }
    }
    (out, dropped)
}

/// Session-scoped decoder that holds back a UTF-8 character torn by a read boundary.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    carry: Vec<u8>,
}

impl ChunkDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one raw chunk, prefixed by any bytes carried from the previous one.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let joined;
        let input: &[u8] = if self.carry.is_empty() {
            chunk
        } else {
            self.carry.extend_from_slice(chunk);
            joined = std::mem::take(&mut self.carry);
            &joined
        };

        let complete = match std::str::from_utf8(input) {
            Ok(text) => return text.to_owned(),
            // Only an incomplete sequence at the very end is carried; real
            // malformations go through the fallback chain.
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(_) => input.len(),
        };

        self.carry.extend_from_slice(&input[complete..]);
        decode_bytes(&input[..complete]).text.into_owned()
    }

    /// Decode whatever is still carried at end of stream.
    pub fn finish(&mut self) -> String {
        if self.carry.is_empty() {
            return String::new();
        }
        let carry = std::mem::take(&mut self.carry);
        decode_bytes(&carry).text.into_owned()
    }

    #[must_use]
    pub fn has_carry(&self) -> bool {
        !self.carry.is_empty()
    }
}
