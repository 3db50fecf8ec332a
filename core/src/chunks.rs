//! Ordered accumulation of response body fragments.
//!
//! # Design
//! A request either keeps every fragment as raw bytes or decodes every
//! fragment to text, depending on whether an `Encoding` was configured. The
//! choice is made once at construction so a single request never mixes the
//! two representations. Text decoding is streaming: a UTF-8 sequence split
//! across two fragments is held back until the rest of it arrives.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::OptionsError;
use crate::parse::Payload;

/// One response body fragment as delivered to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Binary(Bytes),
    Text(String),
}

impl Chunk {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Chunk::Binary(bytes) => bytes,
            Chunk::Text(text) => text.as_bytes(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_text_lossy(&self) -> Cow<'_, str> {
        match self {
            Chunk::Binary(bytes) => String::from_utf8_lossy(bytes),
            Chunk::Text(text) => Cow::Borrowed(text),
        }
    }
}

/// Text encoding applied to response fragments as they arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[serde(alias = "utf-8", alias = "UTF-8")]
    Utf8,
    #[serde(alias = "latin-1", alias = "iso-8859-1")]
    Latin1,
}

impl FromStr for Encoding {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            "latin1" | "latin-1" | "iso-8859-1" => Ok(Encoding::Latin1),
            other => Err(OptionsError::InvalidOptions(format!("unknown encoding `{other}`"))),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::Utf8 => f.write_str("utf8"),
            Encoding::Latin1 => f.write_str("latin1"),
        }
    }
}

/// Incremental decoder that carries an incomplete trailing sequence over to
/// the next call.
#[derive(Debug)]
struct TextDecoder {
    encoding: Encoding,
    pending: Vec<u8>,
}

impl TextDecoder {
    fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            pending: Vec::new(),
        }
    }

    fn decode(&mut self, input: &[u8]) -> String {
        match self.encoding {
            Encoding::Latin1 => input.iter().map(|&b| char::from(b)).collect(),
            Encoding::Utf8 => self.decode_utf8(input),
        }
    }

    fn decode_utf8(&mut self, input: &[u8]) -> String {
        self.pending.extend_from_slice(input);

        let mut out = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[bad..];
                        }
                        // Incomplete sequence at the end; wait for more input.
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        let consumed = self.pending.len() - rest.len();
        self.pending.drain(..consumed);
        out
    }

    /// Flush whatever is held back. A truncated sequence at end of stream
    /// becomes a single replacement character.
    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        self.pending.clear();
        Some(char::REPLACEMENT_CHARACTER.to_string())
    }
}

/// Append-only fragment store for one response.
#[derive(Debug)]
pub struct ChunkAccumulator {
    chunks: Vec<Chunk>,
    decoder: Option<TextDecoder>,
    sealed: bool,
}

impl ChunkAccumulator {
    /// Fragments stay binary when `encoding` is `None`.
    pub fn new(encoding: Option<Encoding>) -> Self {
        Self {
            chunks: Vec::new(),
            decoder: encoding.map(TextDecoder::new),
            sealed: false,
        }
    }

    /// Append one fragment and return it as stored. Returns `None` once
    /// sealed, or when the fragment only contained the start of a split
    /// UTF-8 sequence.
    pub fn push(&mut self, fragment: Bytes) -> Option<&Chunk> {
        if self.sealed {
            return None;
        }
        let chunk = match &mut self.decoder {
            Some(decoder) => {
                let text = decoder.decode(&fragment);
                if text.is_empty() {
                    return None;
                }
                Chunk::Text(text)
            }
            None => Chunk::Binary(fragment),
        };
        self.chunks.push(chunk);
        self.chunks.last()
    }

    /// Freeze the sequence. Any bytes the decoder held back are flushed as a
    /// final chunk, which is returned so it can be published.
    pub fn seal(&mut self) -> Option<&Chunk> {
        if self.sealed {
            return None;
        }
        self.sealed = true;
        let tail = self.decoder.as_mut().and_then(TextDecoder::finish)?;
        self.chunks.push(Chunk::Text(tail));
        self.chunks.last()
    }

    /// Freeze the sequence without flushing held-back bytes.
    pub(crate) fn discard_pending(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn is_text(&self) -> bool {
        self.decoder.is_some()
    }

    /// Join all fragments into one payload of the request's representation.
    pub fn assemble(&self) -> Payload {
        if self.is_text() {
            let mut text = String::with_capacity(self.total_len());
            for chunk in &self.chunks {
                text.push_str(&chunk.to_text_lossy());
            }
            return Payload::Text(text);
        }

        // Avoid a copy for the common single-fragment body.
        if let [Chunk::Binary(only)] = self.chunks.as_slice() {
            return Payload::Binary(only.clone());
        }
        let mut buf = BytesMut::with_capacity(self.total_len());
        for chunk in &self.chunks {
            buf.extend_from_slice(chunk.as_bytes());
        }
        Payload::Binary(buf.freeze())
    }

    fn total_len(&self) -> usize {
        self.chunks.iter().map(Chunk::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_fragments_join_in_order() {
        let mut acc = ChunkAccumulator::new(None);
        acc.push(Bytes::from_static(b"{\"ok\""));
        acc.push(Bytes::from_static(b":true}"));
        acc.seal();
        assert_eq!(acc.chunks().len(), 2);
        assert_eq!(acc.assemble(), Payload::Binary(Bytes::from_static(b"{\"ok\":true}")));
    }

    #[test]
    fn empty_binary_body_assembles_to_empty_bytes() {
        let acc = ChunkAccumulator::new(None);
        assert_eq!(acc.assemble(), Payload::Binary(Bytes::new()));
    }

    #[test]
    fn text_fragments_join_as_string() {
        let mut acc = ChunkAccumulator::new(Some(Encoding::Utf8));
        let first = acc.push(Bytes::from_static(b"hello ")).cloned();
        assert_eq!(first, Some(Chunk::Text("hello ".to_string())));
        acc.push(Bytes::from_static(b"world"));
        assert_eq!(acc.assemble(), Payload::Text("hello world".to_string()));
    }

    #[test]
    fn split_utf8_sequence_is_held_back() {
        // "é" is 0xC3 0xA9.
        let mut acc = ChunkAccumulator::new(Some(Encoding::Utf8));
        assert_eq!(acc.push(Bytes::from_static(b"caf\xC3")).cloned(), Some(Chunk::Text("caf".into())));
        assert!(acc.push(Bytes::from_static(b"")).is_none());
        assert_eq!(acc.push(Bytes::from_static(b"\xA9!")).cloned(), Some(Chunk::Text("é!".into())));
        assert!(acc.seal().is_none());
        assert_eq!(acc.assemble(), Payload::Text("café!".to_string()));
    }

    #[test]
    fn lone_lead_byte_fragment_produces_no_chunk() {
        let mut acc = ChunkAccumulator::new(Some(Encoding::Utf8));
        assert!(acc.push(Bytes::from_static(b"\xE2\x82")).is_none());
        assert_eq!(acc.push(Bytes::from_static(b"\xAC")).cloned(), Some(Chunk::Text("€".into())));
        assert_eq!(acc.chunks().len(), 1);
    }

    #[test]
    fn truncated_sequence_at_end_becomes_replacement() {
        let mut acc = ChunkAccumulator::new(Some(Encoding::Utf8));
        acc.push(Bytes::from_static(b"ab\xC3"));
        let tail = acc.seal().cloned();
        assert_eq!(tail, Some(Chunk::Text("\u{FFFD}".into())));
        assert_eq!(acc.assemble(), Payload::Text("ab\u{FFFD}".to_string()));
    }

    #[test]
    fn invalid_bytes_are_replaced_inline() {
        let mut acc = ChunkAccumulator::new(Some(Encoding::Utf8));
        acc.push(Bytes::from_static(b"a\xFFb"));
        assert_eq!(acc.assemble(), Payload::Text("a\u{FFFD}b".to_string()));
    }

    #[test]
    fn latin1_maps_bytes_to_code_points() {
        let mut acc = ChunkAccumulator::new(Some(Encoding::Latin1));
        acc.push(Bytes::from_static(b"caf\xE9"));
        assert_eq!(acc.assemble(), Payload::Text("café".to_string()));
    }

    #[test]
    fn sealed_accumulator_ignores_pushes() {
        let mut acc = ChunkAccumulator::new(None);
        acc.push(Bytes::from_static(b"one"));
        acc.seal();
        assert!(acc.push(Bytes::from_static(b"two")).is_none());
        assert!(acc.is_sealed());
        assert_eq!(acc.chunks().len(), 1);
    }

    #[test]
    fn encoding_parses_common_spellings() {
        assert_eq!("UTF-8".parse::<Encoding>().unwrap(), Encoding::Utf8);
        assert_eq!("iso-8859-1".parse::<Encoding>().unwrap(), Encoding::Latin1);
        assert!("ebcdic".parse::<Encoding>().is_err());
        let from_json: Encoding = serde_json::from_str(r#""utf-8""#).unwrap();
        assert_eq!(from_json, Encoding::Utf8);
    }
}
