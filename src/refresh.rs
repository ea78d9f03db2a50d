//! Batching of received bytes between UI refresh ticks.

/// Bytes received since the last refresh tick
#[derive(Debug, Default)]
pub struct PendingUi {
    buf: Vec<u8>,
}

impl PendingUi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Take everything buffered, leaving the buffer empty
    pub fn drain(&mut self) -> Option<Vec<u8>> {
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }

    pub fn discard(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_empties() {
        let mut pending = PendingUi::new();
        assert!(pending.drain().is_none());

        pending.push(b"ab");
        pending.push(b"cd");
        assert_eq!(pending.len(), 4);
        assert_eq!(pending.drain().unwrap(), b"abcd");
        assert!(pending.is_empty());
        assert!(pending.drain().is_none());
    }

    #[test]
    fn test_discard() {
        let mut pending = PendingUi::new();
        pending.push(&[1, 2, 3]);
        pending.discard();
        assert!(pending.is_empty());
    }
}
