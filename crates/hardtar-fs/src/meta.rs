use std::path::Path;

use crate::error::{Error, Result};

/// Apply Unix mode bits. No-op on platforms without mode bits.
pub fn apply_mode(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|e| {
            Error::Write {
                path: path.to_path_buf(),
                source: e,
            }
        })?;
    }
    #[cfg(not(unix))]
    let _ = (path, mode);
    Ok(())
}

/// Set the modification time to `mtime` seconds past the epoch.
pub fn apply_mtime(path: &Path, mtime: u64) -> Result<()> {
    let ft = filetime::FileTime::from_unix_time(mtime as i64, 0);
    filetime::set_file_mtime(path, ft).map_err(|e| Error::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Set the modification time of a symlink itself, without following it.
pub fn apply_symlink_mtime(path: &Path, mtime: u64) -> Result<()> {
    let ft = filetime::FileTime::from_unix_time(mtime as i64, 0);
    filetime::set_symlink_file_times(path, ft, ft).map_err(|e| Error::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Change owner and group. No-op on platforms without Unix ownership.
pub fn apply_ownership(path: &Path, uid: u32, gid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use nix::unistd::{chown, Gid, Uid};
        chown(path, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid))).map_err(|e| {
            Error::Write {
                path: path.to_path_buf(),
                source: std::io::Error::from_raw_os_error(e as i32),
            }
        })?;
    }
    #[cfg(not(unix))]
    let _ = (path, uid, gid);
    Ok(())
}

/// The effective uid/gid of the current process.
pub fn effective_ids() -> (u32, u32) {
    #[cfg(unix)]
    {
        use nix::unistd::{getegid, geteuid};
        (geteuid().as_raw(), getegid().as_raw())
    }
    #[cfg(not(unix))]
    {
        (0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[cfg(unix)]
    #[test]
    fn apply_mode_sets_bits() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, "x").unwrap();

        apply_mode(&path, 0o600).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn apply_mtime_sets_timestamp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, "x").unwrap();

        apply_mtime(&path, 1_000_000).unwrap();
        let meta = std::fs::metadata(&path).unwrap();
        let mtime = filetime::FileTime::from_last_modification_time(&meta);
        assert_eq!(mtime.unix_seconds(), 1_000_000);
    }

    #[cfg(unix)]
    #[test]
    fn effective_ids_match_process() {
        let (uid, _gid) = effective_ids();
        assert_eq!(uid, nix::unistd::geteuid().as_raw());
    }
}
