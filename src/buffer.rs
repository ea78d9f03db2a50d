//! Append-only byte stores for received and sent data, plus hex helpers.

/// Append-only byte buffer. Its length is the Rx/Tx counter shown to the user.
#[derive(Debug, Default, Clone)]
pub struct RawBuffer {
    data: Vec<u8>,
}

impl RawBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn last(&self) -> Option<u8> {
        self.data.last().copied()
    }
}

/// Render bytes as lowercase hex pairs, each followed by a space
pub fn to_hex_spaced(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for b in bytes {
        out.push_str(&hex::encode([*b]));
        out.push(' ');
    }
    out
}

/// Parse hex text leniently.
///
/// Characters that are not hex digits are skipped, so separators and line
/// breaks are fine. With an odd digit count the first digit forms a byte on
/// its own (`"123"` is `01 23`).
pub fn parse_hex(text: &str) -> Vec<u8> {
    let mut digits: String = text.chars().filter(char::is_ascii_hexdigit).collect();
    if digits.len() % 2 == 1 {
        digits.insert(0, '0');
    }
    // Only hex digits remain, so decoding cannot fail
    hex::decode(&digits).unwrap_or_default()
}

/// True if `text` holds nothing but hex digits and whitespace
pub fn is_hex_text(text: &str) -> bool {
    text.chars().all(|c| c.is_ascii_hexdigit() || c.is_whitespace())
}
