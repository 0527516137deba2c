//! Transfer counters

use serde::Serialize;

/// What one transfer did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferStats {
    /// Bytes written to the local file
    pub bytes_transferred: u64,
    /// Successful read calls
    pub chunks_count: u32,
    /// Failed or empty reads and failed part attempts
    pub retries_count: u32,
    /// Parts downloaded (0 for a direct transfer)
    pub parts_count: u32,
}

impl TransferStats {
    pub(crate) fn absorb(&mut self, other: &TransferStats) {
        self.bytes_transferred += other.bytes_transferred;
        self.chunks_count += other.chunks_count;
        self.retries_count += other.retries_count;
        self.parts_count += other.parts_count;
    }
}
