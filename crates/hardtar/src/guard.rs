use unicode_normalization::UnicodeNormalization;

use crate::error::{Error, Result};
use crate::header::{MemberHeader, MemberType};
use crate::policy::{HardlinkPolicy, Policy, SparsePolicy, SymlinkPolicy};

/// Conservative cross-platform limit on member name length.
const MAX_NAME_LEN: usize = 4096;

/// Declared sizes at or above 2^63 are crafted headers, not files.
const MAX_DECLARED_SIZE: u64 = i64::MAX as u64;

/// An accepted member, normalized and sanitised, ready for the sandbox.
#[derive(Clone, Debug)]
pub struct ResolvedMember {
    /// Canonical destination path, relative, forward-slash separated.
    pub rel_path: String,
    pub kind: ResolvedKind,
    pub mode: Option<u32>,
    pub uid: u32,
    pub gid: u32,
    pub mtime: u64,
    /// Fields adjusted during sanitation, for event reporting.
    pub clamps: Vec<&'static str>,
}

#[derive(Clone, Debug)]
pub enum ResolvedKind {
    File {
        /// Sparse member downgraded to a dense regular file.
        sparse: bool,
    },
    Directory,
    /// Raw relative target; resolved against the staged tree at commit time.
    Symlink { target: String },
    /// Canonical relative target; must already be committed at commit time.
    Hardlink { target: String },
}

/// Per-member validation outcome.
#[derive(Clone, Debug)]
pub enum Verdict {
    Accept(ResolvedMember),
    Skip { reason: &'static str },
}

/// Stateless per-member validator. Never touches the filesystem; the only
/// ambient inputs are the process's effective ids, captured at construction.
pub struct Guard {
    euid: u32,
    egid: u32,
}

impl Guard {
    pub fn new() -> Self {
        let (euid, egid) = hardtar_fs::effective_ids();
        Self { euid, egid }
    }

    /// Decide whether one member is acceptable under `policy`.
    ///
    /// Rejections come back as errors; the caller turns them into events and
    /// aborts. `Skip` is only produced for ignored symlinks and for
    /// directory members that name the destination root itself.
    pub fn check(&self, header: &MemberHeader, policy: &Policy) -> Result<Verdict> {
        let kind = match self.type_disposition(header, policy)? {
            TypeDisposition::Extract(kind) => kind,
            TypeDisposition::Skip { reason } => return Ok(Verdict::Skip { reason }),
        };

        let rel_path = match canonicalize_name(&header.raw_name, &header.name)? {
            Some(path) => path,
            // A member that cleans to the empty path names the root itself.
            None if matches!(kind, ResolvedKind::Directory) => {
                return Ok(Verdict::Skip {
                    reason: "member names the destination root",
                })
            }
            None => {
                return Err(Error::UnsafePath {
                    path: header.name.clone(),
                    reason: "member name resolves to the empty path".to_string(),
                })
            }
        };

        if header.declared_size >= MAX_DECLARED_SIZE {
            return Err(Error::MalformedArchive {
                reason: format!(
                    "declared size {} for '{rel_path}' exceeds 2^63",
                    header.declared_size
                ),
            });
        }
        if matches!(kind, ResolvedKind::File { .. }) && header.declared_size > policy.max_file_size
        {
            return Err(Error::FileTooLarge {
                path: rel_path,
                limit: policy.max_file_size,
                observed: header.declared_size,
            });
        }

        let mut clamps = Vec::new();
        let mode = header.mode.map(|m| sanitise_mode(m, policy, &mut clamps));
        let (uid, gid) = self.sanitise_ownership(header, policy);
        let mtime = sanitise_mtime(header.mtime, policy, &mut clamps);

        Ok(Verdict::Accept(ResolvedMember {
            rel_path,
            kind,
            mode,
            uid,
            gid,
            mtime,
            clamps,
        }))
    }

    fn type_disposition(
        &self,
        header: &MemberHeader,
        policy: &Policy,
    ) -> Result<TypeDisposition> {
        match header.kind {
            MemberType::Regular => Ok(TypeDisposition::Extract(ResolvedKind::File {
                sparse: false,
            })),
            MemberType::Directory => Ok(TypeDisposition::Extract(ResolvedKind::Directory)),
            MemberType::Sparse => match policy.sparse_policy {
                SparsePolicy::Reject => Err(Error::SparsePolicy {
                    path: header.name.clone(),
                }),
                SparsePolicy::Materialise => {
                    Ok(TypeDisposition::Extract(ResolvedKind::File { sparse: true }))
                }
            },
            MemberType::Symlink => match policy.symlink_policy {
                SymlinkPolicy::Reject => Err(Error::SymlinkPolicy {
                    path: header.name.clone(),
                }),
                SymlinkPolicy::Ignore => Ok(TypeDisposition::Skip {
                    reason: "symlink skipped by policy",
                }),
                SymlinkPolicy::ResolveInternal => {
                    let target = link_target(header)?;
                    Ok(TypeDisposition::Extract(ResolvedKind::Symlink { target }))
                }
            },
            MemberType::Hardlink => match policy.hardlink_policy {
                HardlinkPolicy::Reject => Err(Error::HardlinkPolicy {
                    path: header.name.clone(),
                    reason: "policy rejects hardlink members".to_string(),
                }),
                HardlinkPolicy::Internal => {
                    let raw = link_target(header)?;
                    let target = canonicalize_name(raw.as_bytes(), &raw)
                        .ok()
                        .flatten()
                        .ok_or_else(|| Error::LinkEscape {
                            path: header.name.clone(),
                            target: raw.clone(),
                            reason: "hardlink target is not a clean relative path".to_string(),
                        })?;
                    Ok(TypeDisposition::Extract(ResolvedKind::Hardlink { target }))
                }
            },
            MemberType::CharDevice | MemberType::BlockDevice | MemberType::Fifo
            | MemberType::Unknown => Err(Error::ForbiddenType {
                path: header.name.clone(),
                type_name: header.kind.name(),
            }),
        }
    }

    fn sanitise_ownership(&self, header: &MemberHeader, policy: &Policy) -> (u32, u32) {
        if policy.preserve_ownership {
            let uid = header
                .uid
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(self.euid);
            let gid = header
                .gid
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(self.egid);
            (uid, gid)
        } else {
            (self.euid, self.egid)
        }
    }
}

impl Default for Guard {
    fn default() -> Self {
        Self::new()
    }
}

enum TypeDisposition {
    Extract(ResolvedKind),
    Skip { reason: &'static str },
}

fn link_target(header: &MemberHeader) -> Result<String> {
    let target = header
        .link_target
        .clone()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::MalformedArchive {
            reason: format!("link member '{}' has no target", header.name),
        })?;
    if target.contains('\0') {
        return Err(Error::UnsafePath {
            path: header.name.clone(),
            reason: "NUL byte in link target".to_string(),
        });
    }
    Ok(target)
}

/// Normalize a member name into a canonical relative path.
///
/// Pipeline: NUL check on the raw bytes, Unicode NFC, backslash separators
/// folded to the forward-slash archive convention, absolute paths and drive
/// letters rejected, `.` and empty components dropped, any `..` rejected.
/// Returns `None` when nothing remains after cleaning.
fn canonicalize_name(raw: &[u8], display: &str) -> Result<Option<String>> {
    if raw.contains(&0) {
        return Err(Error::UnsafePath {
            path: display.to_string(),
            reason: "NUL byte in member name".to_string(),
        });
    }

    let normalized: String = display.nfc().collect();
    let normalized = normalized.replace('\\', "/");

    if normalized.starts_with('/') {
        return Err(Error::UnsafePath {
            path: display.to_string(),
            reason: "absolute path".to_string(),
        });
    }
    let mut chars = normalized.chars();
    if let (Some(first), Some(':')) = (chars.next(), chars.next()) {
        if first.is_ascii_alphabetic() {
            return Err(Error::UnsafePath {
                path: display.to_string(),
                reason: "absolute path (drive letter)".to_string(),
            });
        }
    }

    let mut parts = Vec::new();
    for part in normalized.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                return Err(Error::UnsafePath {
                    path: display.to_string(),
                    reason: "path traversal component '..'".to_string(),
                })
            }
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return Ok(None);
    }

    let joined = parts.join("/");
    if joined.len() > MAX_NAME_LEN {
        return Err(Error::UnsafePath {
            path: display.chars().take(256).collect(),
            reason: format!("member name length exceeds {MAX_NAME_LEN}"),
        });
    }

    Ok(Some(joined))
}

fn sanitise_mode(mode: u32, policy: &Policy, clamps: &mut Vec<&'static str>) -> u32 {
    let mut out = mode;
    if policy.strip_special_bits && out & 0o7000 != 0 {
        out &= !0o7000;
        clamps.push("special_bits_stripped");
    }
    if policy.strip_write_bits && out & 0o222 != 0 {
        out &= !0o222;
        clamps.push("write_bits_stripped");
    }
    out
}

fn sanitise_mtime(mtime: Option<u64>, policy: &Policy, clamps: &mut Vec<&'static str>) -> u64 {
    let raw = mtime.unwrap_or(0);
    if !policy.clamp_timestamps {
        return raw;
    }
    let max = u64::from(u32::MAX);
    if raw > max {
        clamps.push("timestamp_clamped");
        max
    } else {
        raw
    }
}
