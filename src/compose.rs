//! Composition of outgoing messages.

use crate::buffer::parse_hex;
use crate::decode::StreamDecoder;

/// What gets appended to every typed message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuffixKind {
    /// User text, encoded with the active encoding
    Text,
    /// User hex bytes
    Hex,
    #[default]
    CrLf,
    Lf,
}

impl SuffixKind {
    const ALL: [SuffixKind; 4] = [SuffixKind::Text, SuffixKind::Hex, SuffixKind::CrLf, SuffixKind::Lf];

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|k| *k == self).unwrap_or(2)
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Whether the user supplies the suffix content
    pub fn takes_context(self) -> bool {
        matches!(self, SuffixKind::Text | SuffixKind::Hex)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Suffix {
    pub enabled: bool,
    pub kind: SuffixKind,
    pub context: String,
}

impl Suffix {
    pub fn bytes(&self, decoder: &StreamDecoder) -> Vec<u8> {
        if !self.enabled {
            return Vec::new();
        }
        match self.kind {
            SuffixKind::Text => decoder.encode(&self.context),
            SuffixKind::Hex => parse_hex(&self.context),
            SuffixKind::CrLf => b"\r\n".to_vec(),
            SuffixKind::Lf => b"\n".to_vec(),
        }
    }
}

/// Build the bytes for a typed message: the input in text or hex form,
/// followed by the suffix.
pub fn compose(input: &str, hex: bool, suffix: &Suffix, decoder: &StreamDecoder) -> Vec<u8> {
    let mut data = if hex {
        parse_hex(input)
    } else {
        decoder.encode(input)
    };
    data.extend(suffix.bytes(decoder));
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crlf() -> Suffix {
        Suffix {
            enabled: true,
            kind: SuffixKind::CrLf,
            context: String::new(),
        }
    }

    #[test]
    fn test_hex_input() {
        let decoder = StreamDecoder::default();
        let data = compose("48 65 6C 6C 6F", true, &Suffix::default(), &decoder);
        assert_eq!(data, vec![0x48, 0x65, 0x6c, 0x6c, 0x6f]);
    }

    #[test]
    fn test_crlf_suffix_in_both_modes() {
        let decoder = StreamDecoder::default();
        assert_eq!(compose("hi", false, &crlf(), &decoder), b"hi\r\n");
        assert_eq!(compose("68 69", true, &crlf(), &decoder), b"hi\r\n");
        assert_eq!(compose("", false, &crlf(), &decoder), b"\r\n");
    }

    #[test]
    fn test_disabled_suffix_adds_nothing() {
        let decoder = StreamDecoder::default();
        let suffix = Suffix {
            enabled: false,
            ..crlf()
        };
        assert_eq!(compose("x", false, &suffix, &decoder), b"x");
    }

    #[test]
    fn test_text_and_hex_suffix() {
        let decoder = StreamDecoder::default();
        let text = Suffix {
            enabled: true,
            kind: SuffixKind::Text,
            context: ";END".to_string(),
        };
        assert_eq!(compose("A", false, &text, &decoder), b"A;END");

        let hex = Suffix {
            enabled: true,
            kind: SuffixKind::Hex,
            context: "FF 00".to_string(),
        };
        assert_eq!(compose("A", false, &hex, &decoder), vec![b'A', 0xff, 0x00]);

        let lf = Suffix {
            enabled: true,
            kind: SuffixKind::Lf,
            context: "ignored".to_string(),
        };
        assert_eq!(compose("A", false, &lf, &decoder), b"A\n");
    }

    #[test]
    fn test_text_input_uses_encoding() {
        let decoder = StreamDecoder::new("GBK").unwrap();
        assert_eq!(compose("中", false, &Suffix::default(), &decoder), vec![0xd6, 0xd0]);
    }

    #[test]
    fn test_suffix_index() {
        assert_eq!(SuffixKind::from_index(2), Some(SuffixKind::CrLf));
        assert_eq!(SuffixKind::Lf.index(), 3);
        assert!(SuffixKind::Hex.takes_context());
        assert!(!SuffixKind::CrLf.takes_context());
    }
}
