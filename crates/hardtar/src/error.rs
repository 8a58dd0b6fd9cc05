use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unsafe member path '{path}': {reason}")]
    UnsafePath { path: String, reason: String },

    #[error("forbidden member type ({type_name}): '{path}'")]
    ForbiddenType {
        path: String,
        type_name: &'static str,
    },

    #[error("member '{path}' exceeds max_file_size ({limit}): {observed} bytes")]
    FileTooLarge {
        path: String,
        limit: u64,
        observed: u64,
    },

    #[error("cumulative extraction exceeds max_total_size ({limit}): {observed} bytes")]
    TotalSizeExceeded { limit: u64, observed: u64 },

    #[error("archive contains more than {limit} members")]
    MaxFilesExceeded { limit: u32 },

    #[error("decompression ratio ({observed:.1}:1) exceeds max_ratio ({limit:.1}:1)")]
    RatioExceeded { limit: f64, observed: f64 },

    #[error("symlink member rejected by policy: '{path}'")]
    SymlinkPolicy { path: String },

    #[error("hardlink member rejected by policy: '{path}': {reason}")]
    HardlinkPolicy { path: String, reason: String },

    #[error("sparse member rejected by policy: '{path}'")]
    SparsePolicy { path: String },

    #[error("link target escapes extraction root: '{path}' -> '{target}': {reason}")]
    LinkEscape {
        path: String,
        target: String,
        reason: String,
    },

    #[error("atomic write failed for {path}: {source}")]
    AtomicWrite {
        path: PathBuf,
        source: hardtar_fs::Error,
    },

    #[error("sandbox failure at {path}: {reason}")]
    Sandbox { path: PathBuf, reason: String },

    #[error("unsupported archive format")]
    UnsupportedFormat,

    #[error("cannot open archive: {reason}")]
    ArchiveOpen { reason: String },

    #[error("malformed archive: {reason}")]
    MalformedArchive { reason: String },

    #[error("invalid policy: {reason}")]
    Policy { reason: String },

    #[error("extraction cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<hardtar_fs::Error> for Error {
    fn from(e: hardtar_fs::Error) -> Self {
        let path = match &e {
            hardtar_fs::Error::Write { path, .. }
            | hardtar_fs::Error::Read { path, .. }
            | hardtar_fs::Error::Link { path, .. }
            | hardtar_fs::Error::AlreadyExists { path }
            | hardtar_fs::Error::NoParent { path } => path.clone(),
            hardtar_fs::Error::SymlinkNotSupported => PathBuf::new(),
        };
        Self::AtomicWrite { path, source: e }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
