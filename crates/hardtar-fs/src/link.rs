use std::fs;
use std::io;
use std::path::Path;

use crate::error::{Error, Result};

/// How a hardlink request was satisfied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked,
    Copied,
}

/// Create a symlink at `link` pointing at `target`.
///
/// The destination must not pre-exist; the kernel primitive itself fails
/// with `AlreadyExists` otherwise, which is surfaced as such.
pub fn atomic_symlink(target: &Path, link: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link).map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                Error::AlreadyExists {
                    path: link.to_path_buf(),
                }
            } else {
                Error::Link {
                    path: link.to_path_buf(),
                    source: e,
                }
            }
        })
    }

    #[cfg(not(unix))]
    {
        let _ = (target, link);
        Err(Error::SymlinkNotSupported)
    }
}

/// Create a hardlink from `dest` to `src`, copying the content instead when
/// the filesystem refuses the link (cross-device, or no hardlink support).
pub fn hardlink_or_copy(src: &Path, dest: &Path) -> Result<LinkOutcome> {
    match fs::hard_link(src, dest) {
        Ok(()) => Ok(LinkOutcome::Linked),
        Err(e) if link_unsupported(&e) => {
            fs::copy(src, dest).map_err(|e| Error::Write {
                path: dest.to_path_buf(),
                source: e,
            })?;
            Ok(LinkOutcome::Copied)
        }
        Err(e) => Err(Error::Link {
            path: dest.to_path_buf(),
            source: e,
        }),
    }
}

fn link_unsupported(e: &io::Error) -> bool {
    // EXDEV is not mapped to a stable ErrorKind on all toolchains.
    e.kind() == io::ErrorKind::Unsupported || e.raw_os_error() == Some(18)
}
