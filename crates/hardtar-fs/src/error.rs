use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("destination already exists: {path}")]
    AlreadyExists { path: PathBuf },

    #[error("no parent directory for {path}")]
    NoParent { path: PathBuf },

    #[error("failed to create link {path}: {source}")]
    Link { path: PathBuf, source: io::Error },

    #[error("symlinks not supported on this platform")]
    SymlinkNotSupported,
}

pub type Result<T> = std::result::Result<T, Error>;
