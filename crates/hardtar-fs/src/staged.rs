use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// A file being written next to its final destination.
///
/// The temp file is created with an unpredictable name and exclusive-create
/// semantics in the same directory as `dest`, so the final `persist` is a
/// same-filesystem rename. Dropping an unpersisted `StagedFile` removes the
/// temp file.
pub struct StagedFile {
    inner: Option<tempfile::NamedTempFile>,
    dest: PathBuf,
}

impl StagedFile {
    pub fn create(dest: &Path) -> Result<Self> {
        let parent = dest.parent().filter(|p| !p.as_os_str().is_empty()).ok_or(
            Error::NoParent {
                path: dest.to_path_buf(),
            },
        )?;

        let file_name = dest.file_name().unwrap_or_default().to_string_lossy();
        let prefix = format!(".{file_name}.");

        let inner = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".hardtar")
            .rand_bytes(8)
            .tempfile_in(parent)
            .map_err(|e| Error::Write {
                path: dest.to_path_buf(),
                source: e,
            })?;

        Ok(Self {
            inner: Some(inner),
            dest: dest.to_path_buf(),
        })
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Path of the temp file while staged.
    pub fn staging_path(&self) -> &Path {
        self.inner.as_ref().expect("staged file already persisted").path()
    }

    pub fn set_mode(&self, mode: u32) -> Result<()> {
        crate::meta::apply_mode(self.staging_path(), mode)
    }

    pub fn set_mtime(&self, mtime: u64) -> Result<()> {
        crate::meta::apply_mtime(self.staging_path(), mtime)
    }

    pub fn set_ownership(&self, uid: u32, gid: u32) -> Result<()> {
        crate::meta::apply_ownership(self.staging_path(), uid, gid)
    }

    /// Rename the temp file onto the destination.
    ///
    /// This is the single point at which the content becomes visible under
    /// its final name. An existing regular file at the destination is
    /// replaced atomically.
    pub fn persist(mut self) -> Result<()> {
        let inner = self.inner.take().expect("staged file already persisted");
        inner.persist(&self.dest).map_err(|e| Error::Write {
            path: self.dest.clone(),
            source: e.error,
        })?;
        Ok(())
    }
}

impl Write for StagedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner
            .as_mut()
            .expect("staged file already persisted")
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner
            .as_mut()
            .expect("staged file already persisted")
            .flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn persist_moves_content_to_dest() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.txt");

        let mut staged = StagedFile::create(&dest).unwrap();
        staged.write_all(b"payload").unwrap();
        staged.persist().unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
    }

    #[test]
    fn drop_removes_temp_file() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.txt");

        {
            let mut staged = StagedFile::create(&dest).unwrap();
            staged.write_all(b"payload").unwrap();
        }

        assert!(!dest.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn persist_replaces_existing_file() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.txt");
        std::fs::write(&dest, b"old").unwrap();

        let mut staged = StagedFile::create(&dest).unwrap();
        staged.write_all(b"new").unwrap();
        staged.persist().unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
    }

    #[test]
    fn temp_file_is_hidden_sibling() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.txt");

        let staged = StagedFile::create(&dest).unwrap();
        let name = staged
            .staging_path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        assert!(name.starts_with(".out.txt."));
        assert!(name.ends_with(".hardtar"));
        assert_eq!(staged.staging_path().parent(), dest.parent());
    }

    #[cfg(unix)]
    #[test]
    fn mode_applied_before_persist_survives_rename() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("bin");

        let mut staged = StagedFile::create(&dest).unwrap();
        staged.write_all(b"#!/bin/sh\n").unwrap();
        staged.set_mode(0o755).unwrap();
        staged.persist().unwrap();

        let mode = std::fs::metadata(&dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
