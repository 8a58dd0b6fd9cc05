use crate::error::{Error, Result};

/// How symlink members are handled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SymlinkPolicy {
    /// Any symlink member fails the extraction.
    #[default]
    Reject,
    /// Symlink members are skipped, with an event.
    Ignore,
    /// Symlinks whose entire target chain stays inside the destination root
    /// are created, deferred until after all regular content is staged.
    ResolveInternal,
}

/// How hardlink members are handled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HardlinkPolicy {
    /// Any hardlink member fails the extraction.
    #[default]
    Reject,
    /// Hardlinks are permitted only when the target is already committed
    /// inside the destination root. Forward references fail.
    Internal,
}

/// How GNU sparse members are handled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SparsePolicy {
    /// Any sparse member fails the extraction.
    #[default]
    Reject,
    /// Sparse members are written out densely, holes zero-filled. Size
    /// budgets apply to the dense size.
    Materialise,
}

/// Immutable extraction limits and member-type policies.
///
/// Built once per extraction and never mutated; nested extractions share the
/// same policy and the same live counters.
#[derive(Clone, Debug)]
pub struct Policy {
    /// Maximum decompressed size per member, in bytes.
    pub max_file_size: u64,
    /// Maximum cumulative decompressed size, in bytes.
    pub max_total_size: u64,
    /// Maximum number of accepted members.
    pub max_files: u32,
    /// Maximum decoded/compressed ratio, checked past a warmup threshold.
    pub max_ratio: f64,
    /// Maximum number of extraction levels for nested archives.
    pub max_nesting_depth: u8,
    pub symlink_policy: SymlinkPolicy,
    pub hardlink_policy: HardlinkPolicy,
    pub sparse_policy: SparsePolicy,
    /// Strip setuid/setgid/sticky bits from member modes.
    pub strip_special_bits: bool,
    /// Additionally strip write bits from member modes.
    pub strip_write_bits: bool,
    /// Keep archived uid/gid instead of the process's effective ids.
    pub preserve_ownership: bool,
    /// Clamp mtimes to [0, 2^32 - 1]; absent values become 0.
    pub clamp_timestamps: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            max_file_size: 1 << 30,
            max_total_size: 5 << 30,
            max_files: 10_000,
            max_ratio: 200.0,
            max_nesting_depth: 3,
            symlink_policy: SymlinkPolicy::default(),
            hardlink_policy: HardlinkPolicy::default(),
            sparse_policy: SparsePolicy::default(),
            strip_special_bits: true,
            strip_write_bits: false,
            preserve_ownership: false,
            clamp_timestamps: true,
        }
    }
}

impl Policy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn max_total_size(mut self, bytes: u64) -> Self {
        self.max_total_size = bytes;
        self
    }

    pub fn max_files(mut self, count: u32) -> Self {
        self.max_files = count;
        self
    }

    pub fn max_ratio(mut self, ratio: f64) -> Self {
        self.max_ratio = ratio;
        self
    }

    pub fn max_nesting_depth(mut self, depth: u8) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    pub fn symlink_policy(mut self, policy: SymlinkPolicy) -> Self {
        self.symlink_policy = policy;
        self
    }

    pub fn hardlink_policy(mut self, policy: HardlinkPolicy) -> Self {
        self.hardlink_policy = policy;
        self
    }

    pub fn sparse_policy(mut self, policy: SparsePolicy) -> Self {
        self.sparse_policy = policy;
        self
    }

    pub fn strip_special_bits(mut self, strip: bool) -> Self {
        self.strip_special_bits = strip;
        self
    }

    pub fn strip_write_bits(mut self, strip: bool) -> Self {
        self.strip_write_bits = strip;
        self
    }

    pub fn preserve_ownership(mut self, preserve: bool) -> Self {
        self.preserve_ownership = preserve;
        self
    }

    pub fn clamp_timestamps(mut self, clamp: bool) -> Self {
        self.clamp_timestamps = clamp;
        self
    }

    /// Reject invalid limit combinations.
    pub fn validate(&self) -> Result<()> {
        if !self.max_ratio.is_finite() || self.max_ratio < 1.0 {
            return Err(Error::Policy {
                reason: format!("max_ratio must be a finite value >= 1.0, got {}", self.max_ratio),
            });
        }
        if self.max_file_size == 0 {
            return Err(Error::Policy {
                reason: "max_file_size must be positive".into(),
            });
        }
        if self.max_total_size == 0 {
            return Err(Error::Policy {
                reason: "max_total_size must be positive".into(),
            });
        }
        if self.max_files == 0 {
            return Err(Error::Policy {
                reason: "max_files must be positive".into(),
            });
        }
        Ok(())
    }
}
