use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const MIB: usize = 1024 * 1024;

/// Payloads at or above this size go through the multipart protocol.
pub const DEFAULT_MULTIPART_THRESHOLD: usize = 50 * MIB;
pub const DEFAULT_CHUNK_SIZE: usize = 10 * MIB;
pub const DEFAULT_CONCURRENCY: usize = 20;
/// One initial attempt plus one retry.
pub const DEFAULT_ATTEMPTS: u32 = 2;

/// Process-wide transfer settings handed to the upload coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadOptions {
    /// Width of the worker pool and upper bound on in-flight remote calls.
    pub concurrency: usize,
    pub multipart_threshold: usize,
    pub chunk_size: usize,
    pub attempts: u32,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
            attempts: DEFAULT_ATTEMPTS,
        }
    }
}

impl UploadOptions {
    /// Clamp values that would stall the pipeline (zero workers, zero-sized chunks).
    pub fn normalized(mut self) -> Self {
        self.concurrency = self.concurrency.max(1);
        // an empty payload must never open a multipart session
        self.multipart_threshold = self.multipart_threshold.max(1);
        self.chunk_size = self.chunk_size.max(1);
        self.attempts = self.attempts.max(1);
        self
    }

    pub fn trace_loaded(&self) {
        info!(
            concurrency = self.concurrency,
            multipart_threshold = self.multipart_threshold,
            chunk_size = self.chunk_size,
            attempts = self.attempts,
            "Loaded UploadOptions"
        );
        debug!(?self, "UploadOptions loaded (full debug)");
    }
}
