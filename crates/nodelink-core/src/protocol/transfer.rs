//! File transfer reassembly

use super::codec::hex_projection;

/// Raw bytes received for one requested file
///
/// The protocol has no end-of-file marker for binary transfers, so the buffer
/// simply grows until the caller decides the transfer is over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTransferBuffer {
    filename: Option<String>,
    bytes: Vec<u8>,
    chunks: usize,
}

impl FileTransferBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop any received bytes and start over for `filename`
    pub fn reset(&mut self, filename: Option<String>) {
        self.filename = filename;
        self.bytes.clear();
        self.chunks = 0;
    }

    pub fn append(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
        self.chunks += 1;
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of notifications appended since the last reset
    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    /// Uppercase hex view of the whole buffer
    pub fn hex(&self) -> String {
        hex_projection(&self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_concatenates() {
        let mut buffer = FileTransferBuffer::new();
        buffer.append(&[0xDE, 0xAD]);
        buffer.append(&[0xBE, 0xEF]);
        buffer.append(&[0x01]);

        assert_eq!(buffer.as_bytes(), &[0xDE, 0xAD, 0xBE, 0xEF, 0x01]);
        assert_eq!(buffer.hex(), "DEADBEEF01");
        assert_eq!(buffer.chunk_count(), 3);
    }

    #[test]
    fn test_reset_discards_partial_transfer() {
        let mut buffer = FileTransferBuffer::new();
        buffer.reset(Some("a.txt".to_string()));
        buffer.append(&[1, 2, 3]);

        buffer.reset(Some("b.txt".to_string()));
        assert!(buffer.is_empty());
        assert_eq!(buffer.chunk_count(), 0);
        assert_eq!(buffer.filename(), Some("b.txt"));
    }
}
