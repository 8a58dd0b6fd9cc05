use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use hardtar_fs::StagedFile;

use crate::error::{Error, Result};
use crate::policy::Policy;
use crate::session::CancelToken;

/// Payload copy chunk size; budgets are re-checked after every chunk.
const COPY_CHUNK: usize = 64 * 1024;

/// Decoded bytes to produce before the ratio check arms. Tiny archives have
/// proportionally huge headers and would trip the ratio spuriously.
const RATIO_WARMUP_BYTES: u64 = 1024 * 1024;

/// In-memory ceiling for spooled non-seekable inputs before spilling to disk.
const SPOOL_MEMORY_LIMIT: usize = 8 * 1024 * 1024;

/// Pipeline phases. Transitions are linear in the driver; the state is kept
/// for logging and post-mortem inspection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Open,
    ReadHeader,
    CopyPayload,
    CommitLinks,
    Aborting,
    Closed,
}

/// Live counters for one extraction, shared across nesting levels.
///
/// Invariants re-checked at every chunk boundary: per-member and total byte
/// budgets against bytes actually written, and the decoded/compressed ratio
/// once past warmup.
pub struct ExtractionState {
    pub files_seen: u32,
    pub bytes_written: u64,
    compressed: Arc<AtomicU64>,
    phase: Phase,
}

impl ExtractionState {
    pub fn new(compressed: Arc<AtomicU64>) -> Self {
        Self {
            files_seen: 0,
            bytes_written: 0,
            compressed,
            phase: Phase::Idle,
        }
    }

    pub fn compressed_bytes_read(&self) -> u64 {
        self.compressed.load(Ordering::Relaxed)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: Phase) {
        debug!(from = ?self.phase, to = ?phase, "extraction phase");
        self.phase = phase;
    }

    /// Count one accepted member against `max_files`.
    pub fn count_member(&mut self, policy: &Policy) -> Result<()> {
        self.files_seen += 1;
        if self.files_seen > policy.max_files {
            return Err(Error::MaxFilesExceeded {
                limit: policy.max_files,
            });
        }
        Ok(())
    }

    fn check_budgets(&self, policy: &Policy, member_bytes: u64, path: &str) -> Result<()> {
        if member_bytes > policy.max_file_size {
            return Err(Error::FileTooLarge {
                path: path.to_string(),
                limit: policy.max_file_size,
                observed: member_bytes,
            });
        }
        if self.bytes_written > policy.max_total_size {
            return Err(Error::TotalSizeExceeded {
                limit: policy.max_total_size,
                observed: self.bytes_written,
            });
        }
        if self.bytes_written >= RATIO_WARMUP_BYTES {
            let compressed = self.compressed_bytes_read();
            if compressed > 0 {
                let ratio = self.bytes_written as f64 / compressed as f64;
                if ratio > policy.max_ratio {
                    return Err(Error::RatioExceeded {
                        limit: policy.max_ratio,
                        observed: ratio,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Stream one member's payload into its staging handle in bounded chunks.
///
/// Returns the number of bytes actually written; that count, never the
/// header's declared size, is what every limit was checked against.
pub fn copy_payload<R: Read>(
    payload: &mut R,
    staged: &mut StagedFile,
    state: &mut ExtractionState,
    policy: &Policy,
    cancel: &CancelToken,
    path: &str,
) -> Result<u64> {
    let mut member_bytes = 0u64;
    let mut buf = vec![0u8; COPY_CHUNK];

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let n = payload.read(&mut buf).map_err(|e| Error::MalformedArchive {
            reason: format!("stream error while reading '{path}': {e}"),
        })?;
        if n == 0 {
            break;
        }

        staged.write_all(&buf[..n])?;
        member_bytes += n as u64;
        state.bytes_written += n as u64;
        state.check_budgets(policy, member_bytes, path)?;
    }

    Ok(member_bytes)
}

/// Buffer a non-seekable input into a spooled temp file, bounded by
/// `max_total_size` (an input larger than everything the policy would ever
/// let us write is hostile by definition).
pub fn spool_stream<R: Read>(mut reader: R, max_total_size: u64) -> Result<tempfile::SpooledTempFile> {
    let mut spool = tempfile::spooled_tempfile(SPOOL_MEMORY_LIMIT);
    let mut total = 0u64;
    let mut buf = vec![0u8; COPY_CHUNK];

    loop {
        let n = reader.read(&mut buf).map_err(|e| Error::ArchiveOpen {
            reason: format!("cannot buffer input stream: {e}"),
        })?;
        if n == 0 {
            break;
        }
        total += n as u64;
        if total > max_total_size {
            return Err(Error::TotalSizeExceeded {
                limit: max_total_size,
                observed: total,
            });
        }
        spool.write_all(&buf[..n]).map_err(|e| Error::ArchiveOpen {
            reason: format!("cannot buffer input stream: {e}"),
        })?;
    }

    spool.seek(SeekFrom::Start(0)).map_err(|e| Error::ArchiveOpen {
        reason: format!("cannot rewind buffered stream: {e}"),
    })?;
    Ok(spool)
}
