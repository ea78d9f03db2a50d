//! Streaming decode of received bytes into display text.
//!
//! Text mode keeps an `encoding_rs` decoder alive between chunks so that a
//! multi-byte character split across two reads still decodes. Hex mode is
//! independent of the encoding and only has to keep lines bounded.

use encoding_rs::{CoderResult, Decoder, Encoding, UTF_8};

use crate::buffer::to_hex_spaced;

/// Hex bytes written before a line break is forced
pub const HEX_BREAK_THRESHOLD: usize = 5000;

/// Stateful decoder for the receive view
pub struct StreamDecoder {
    encoding: &'static Encoding,
    decoder: Decoder,
    /// Last raw byte fed in, `None` after a reset
    last_byte: Option<u8>,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::with_encoding(UTF_8)
    }
}

impl StreamDecoder {
    pub fn new(label: &str) -> Result<Self, EncodingError> {
        Ok(Self::with_encoding(lookup(label)?))
    }

    fn with_encoding(encoding: &'static Encoding) -> Self {
        Self {
            encoding,
            decoder: encoding.new_decoder_without_bom_handling(),
            last_byte: None,
        }
    }

    pub fn encoding_name(&self) -> &'static str {
        self.encoding.name()
    }

    /// Switch encoding. An unknown label leaves the current one in effect.
    pub fn set_encoding(&mut self, label: &str) -> Result<(), EncodingError> {
        let encoding = lookup(label)?;
        *self = Self::with_encoding(encoding);
        Ok(())
    }

    /// Drop any partial sequence and forget the last byte
    pub fn reset(&mut self) {
        self.decoder = self.encoding.new_decoder_without_bom_handling();
        self.last_byte = None;
    }

    pub fn last_byte(&self) -> Option<u8> {
        self.last_byte
    }

    /// Decode the next chunk of the stream.
    ///
    /// A `\n` that completes a `\r\n` split across chunks is left out of the
    /// text, the `\r` already produced the line break.
    pub fn decode_increment(&mut self, bytes: &[u8]) -> String {
        let Some(&last) = bytes.last() else {
            return String::new();
        };

        let input = if self.last_byte == Some(b'\r') && bytes[0] == b'\n' {
            &bytes[1..]
        } else {
            bytes
        };
        self.last_byte = Some(last);

        let mut text = String::with_capacity(
            self.decoder
                .max_utf8_buffer_length(input.len())
                .unwrap_or(input.len() * 3),
        );
        let mut src = input;
        loop {
            let (result, read, _) = self.decoder.decode_to_string(src, &mut text, false);
            src = &src[read..];
            match result {
                CoderResult::InputEmpty => break,
                CoderResult::OutputFull => text.reserve(src.len() * 3 + 16),
            }
        }
        normalize_newlines(&text)
    }

    /// Decode a complete byte sequence without touching the stream state
    pub fn decode_complete(&self, bytes: &[u8]) -> String {
        let (text, _) = self.encoding.decode_without_bom_handling(bytes);
        normalize_newlines(&text)
    }

    /// Encode outgoing text with the active encoding
    pub fn encode(&self, text: &str) -> Vec<u8> {
        let (bytes, _, _) = self.encoding.encode(text);
        bytes.into_owned()
    }
}

fn lookup(label: &str) -> Result<&'static Encoding, EncodingError> {
    Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| EncodingError::Unknown(label.to_string()))
}

/// Turn `\r\n` and lone `\r` into `\n`
fn normalize_newlines(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Hex renderer for the receive view that breaks overlong lines
#[derive(Debug, Default)]
pub struct HexFormatter {
    counter: usize,
}

impl HexFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, bytes: &[u8]) -> String {
        let mut out = to_hex_spaced(bytes);
        self.counter += bytes.len();
        if self.counter > HEX_BREAK_THRESHOLD {
            out.push('\n');
            self.counter = 0;
        }
        out
    }

    pub fn reset(&mut self) {
        self.counter = 0;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    Unknown(String),
}

impl std::fmt::Display for EncodingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodingError::Unknown(name) => write!(f, "{} is not a valid encoding", name),
        }
    }
}

impl std::error::Error for EncodingError {}
