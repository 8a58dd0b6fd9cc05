use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use hardtar_fs::{atomic_symlink, hardlink_or_copy, LinkOutcome, StagedFile};

use crate::error::{Error, Result};
use crate::events::EventSink;

/// Upper bound on symlink chain length when resolving targets.
const MAX_LINK_HOPS: usize = 40;

/// Mode for intermediate directories the sandbox creates on its own.
const PARENT_DIR_MODE: u32 = 0o755;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkKind {
    Symlink,
    Hardlink,
}

/// A deferred link, queued during the member pass and created at commit.
#[derive(Clone, Debug)]
pub struct LinkSpec {
    pub kind: LinkKind,
    pub dest_rel: String,
    /// Raw relative target for symlinks, canonical relative for hardlinks.
    pub target: String,
    pub mode: Option<u32>,
    pub mtime: u64,
    /// Number of members declared before this link, for forward-reference
    /// detection on hardlinks.
    declared_before: usize,
}

/// Materialization layer confined to one canonical destination root.
///
/// Every path the sandbox creates is recorded in insertion order; on any
/// fatal error the whole session unwinds in reverse so no partial member
/// stays observable. Dropping an uncommitted sandbox rolls back.
pub struct Sandbox {
    root: PathBuf,
    /// Paths created by this session, insertion order.
    created: Vec<PathBuf>,
    /// Destination paths of declared members, for forward-reference checks.
    declared: Vec<PathBuf>,
    links: Vec<LinkSpec>,
    /// Directory metadata deferred until after all files are written.
    dir_meta: Vec<DirMeta>,
    created_root: bool,
    committed: bool,
}

struct DirMeta {
    path: PathBuf,
    mode: Option<u32>,
    mtime: u64,
    owner: Option<(u32, u32)>,
}

impl Sandbox {
    /// Resolve `dest` to an absolute, symlink-free canonical root, creating
    /// it if needed.
    pub fn new(dest: &Path) -> Result<Self> {
        let created_root = !dest.exists();
        fs::create_dir_all(dest).map_err(|e| Error::Sandbox {
            path: dest.to_path_buf(),
            reason: format!("cannot create destination root: {e}"),
        })?;
        let root = dest.canonicalize().map_err(|e| Error::Sandbox {
            path: dest.to_path_buf(),
            reason: format!("cannot canonicalize destination root: {e}"),
        })?;

        Ok(Self {
            root,
            created: Vec::new(),
            declared: Vec::new(),
            links: Vec::new(),
            dir_meta: Vec::new(),
            created_root,
            committed: false,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join a canonical relative path to the root and verify the join does
    /// not pass through a symlink or leave the root.
    fn confined_path(&self, rel: &str) -> Result<PathBuf> {
        let full = self.root.join(rel);

        let mut probe = self.root.clone();
        for comp in Path::new(rel).components() {
            probe.push(comp);
            match fs::symlink_metadata(&probe) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    return Err(Error::UnsafePath {
                        path: rel.to_string(),
                        reason: "member path passes through an existing symlink".to_string(),
                    });
                }
                Ok(_) => {}
                // First missing component; nothing below it exists yet.
                Err(_) => break,
            }
        }

        // Canonicalize the deepest existing ancestor and re-check containment.
        let mut ancestor = full.clone();
        while !ancestor.exists() {
            match ancestor.parent() {
                Some(p) => ancestor = p.to_path_buf(),
                None => break,
            }
        }
        let canon = ancestor.canonicalize().map_err(|e| Error::Sandbox {
            path: ancestor.clone(),
            reason: format!("cannot resolve existing ancestor: {e}"),
        })?;
        if canon != self.root && !canon.starts_with(&self.root) {
            return Err(Error::UnsafePath {
                path: rel.to_string(),
                reason: "resolved path escapes the destination root".to_string(),
            });
        }

        Ok(full)
    }

    fn create_parents(&mut self, full: &Path) -> Result<()> {
        let Some(parent) = full.parent() else {
            return Ok(());
        };
        let mut missing = Vec::new();
        let mut cursor = parent.to_path_buf();
        while cursor != self.root && !cursor.exists() {
            missing.push(cursor.clone());
            match cursor.parent() {
                Some(p) => cursor = p.to_path_buf(),
                None => break,
            }
        }
        for dir in missing.into_iter().rev() {
            fs::create_dir(&dir).map_err(|e| Error::Sandbox {
                path: dir.clone(),
                reason: format!("cannot create parent directory: {e}"),
            })?;
            hardtar_fs::apply_mode(&dir, PARENT_DIR_MODE)?;
            self.created.push(dir);
        }
        Ok(())
    }

    /// Create a directory member (idempotent for already-present dirs) and
    /// queue its metadata for the deferred pass.
    pub fn make_dir(
        &mut self,
        rel: &str,
        mode: Option<u32>,
        mtime: u64,
        owner: Option<(u32, u32)>,
    ) -> Result<()> {
        let full = self.confined_path(rel)?;

        match fs::symlink_metadata(&full) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(Error::Sandbox {
                    path: full,
                    reason: "directory member collides with an existing non-directory"
                        .to_string(),
                })
            }
            Err(_) => {
                self.create_parents(&full)?;
                fs::create_dir(&full).map_err(|e| Error::Sandbox {
                    path: full.clone(),
                    reason: format!("cannot create directory: {e}"),
                })?;
                self.created.push(full.clone());
            }
        }

        self.dir_meta.push(DirMeta {
            path: full.clone(),
            mode,
            mtime,
            owner,
        });
        self.declared.push(full);
        Ok(())
    }

    /// Create a tracked directory without member metadata, for nested
    /// extraction destinations.
    pub fn ensure_dir(&mut self, rel: &str) -> Result<PathBuf> {
        let full = self.confined_path(rel)?;
        match fs::symlink_metadata(&full) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(Error::Sandbox {
                    path: full,
                    reason: "nested destination collides with an existing non-directory"
                        .to_string(),
                })
            }
            Err(_) => {
                self.create_parents(&full)?;
                fs::create_dir(&full).map_err(|e| Error::Sandbox {
                    path: full.clone(),
                    reason: format!("cannot create directory: {e}"),
                })?;
                self.created.push(full.clone());
            }
        }
        Ok(full)
    }

    /// Open a staging handle for a regular-file member.
    ///
    /// An existing symlink at the destination is treated as an attack; an
    /// existing directory is an error; an existing regular file will be
    /// replaced atomically at persist.
    pub fn stage_file(&mut self, rel: &str) -> Result<StagedFile> {
        let full = self.confined_path(rel)?;

        match fs::symlink_metadata(&full) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(Error::UnsafePath {
                    path: rel.to_string(),
                    reason: "existing symlink at destination path".to_string(),
                })
            }
            Ok(meta) if meta.is_dir() => {
                return Err(Error::Sandbox {
                    path: full,
                    reason: "file member collides with an existing directory".to_string(),
                })
            }
            _ => {}
        }

        self.create_parents(&full)?;
        StagedFile::create(&full).map_err(Error::from)
    }

    /// Apply sanitised metadata to the staged temp file, then rename it into
    /// place. Ownership first, mode after (chown may clear special bits),
    /// mtime last.
    pub fn commit_file(
        &mut self,
        staged: StagedFile,
        mode: Option<u32>,
        mtime: u64,
        owner: Option<(u32, u32)>,
    ) -> Result<()> {
        let dest = staged.dest().to_path_buf();

        if let Some((uid, gid)) = owner {
            if let Err(e) = staged.set_ownership(uid, gid) {
                debug!(path = %dest.display(), error = %e, "chown on staged file failed");
            }
        }
        if let Some(mode) = mode {
            staged.set_mode(mode)?;
        }
        staged.set_mtime(mtime)?;
        staged.persist()?;

        self.created.push(dest.clone());
        self.declared.push(dest);
        Ok(())
    }

    /// Queue a link member for post-extraction creation.
    pub fn defer_link(
        &mut self,
        kind: LinkKind,
        dest_rel: String,
        target: String,
        mode: Option<u32>,
        mtime: u64,
    ) {
        let declared_before = self.declared.len();
        let dest_full = self.root.join(&dest_rel);
        self.links.push(LinkSpec {
            kind,
            dest_rel,
            target,
            mode,
            mtime,
            declared_before,
        });
        self.declared.push(dest_full);
    }

    /// Create all deferred links: hardlinks first, then symlinks, each class
    /// in archive-declaration order, every target re-verified on disk.
    pub fn commit_links(&mut self, sink: &mut EventSink<'_>) -> Result<()> {
        let links = std::mem::take(&mut self.links);

        for spec in links.iter().filter(|s| s.kind == LinkKind::Hardlink) {
            self.commit_hardlink(spec, sink)?;
        }
        for spec in links.iter().filter(|s| s.kind == LinkKind::Symlink) {
            self.commit_symlink(spec)?;
        }
        Ok(())
    }

    fn commit_hardlink(&mut self, spec: &LinkSpec, sink: &mut EventSink<'_>) -> Result<()> {
        let dest_full = self.confined_path(&spec.dest_rel)?;
        let target_full = self.confined_path(&spec.target)?;

        // Forward references: the target must have been declared before the
        // link appeared in the stream.
        let seen_earlier = self.declared[..spec.declared_before]
            .iter()
            .any(|p| *p == target_full);
        if !seen_earlier {
            return Err(Error::HardlinkPolicy {
                path: spec.dest_rel.clone(),
                reason: format!("target '{}' is a forward reference", spec.target),
            });
        }

        match fs::symlink_metadata(&target_full) {
            Ok(meta) if meta.file_type().is_file() => {}
            Ok(_) => {
                return Err(Error::HardlinkPolicy {
                    path: spec.dest_rel.clone(),
                    reason: format!("target '{}' is not a regular file", spec.target),
                })
            }
            Err(_) => {
                return Err(Error::HardlinkPolicy {
                    path: spec.dest_rel.clone(),
                    reason: format!("target '{}' does not exist on disk", spec.target),
                })
            }
        }

        self.create_parents(&dest_full)?;
        match hardlink_or_copy(&target_full, &dest_full)? {
            LinkOutcome::Linked => {}
            LinkOutcome::Copied => {
                // The copy is a fresh inode; give it the member's metadata.
                if let Some(mode) = spec.mode {
                    hardtar_fs::apply_mode(&dest_full, mode)?;
                }
                hardtar_fs::apply_mtime(&dest_full, spec.mtime)?;
                sink.emit(
                    "hardlink_fallback",
                    Some(&spec.dest_rel),
                    [("target", spec.target.clone())],
                );
            }
        }
        self.created.push(dest_full);
        Ok(())
    }

    fn commit_symlink(&mut self, spec: &LinkSpec) -> Result<()> {
        let dest_full = self.confined_path(&spec.dest_rel)?;
        let link_parent = dest_full
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        self.resolve_link_target(&link_parent, &spec.target)
            .map_err(|reason| Error::LinkEscape {
                path: spec.dest_rel.clone(),
                target: spec.target.clone(),
                reason,
            })?;

        self.create_parents(&dest_full)?;
        atomic_symlink(Path::new(&spec.target), &dest_full)?;
        self.created.push(dest_full.clone());

        if let Err(e) = hardtar_fs::apply_symlink_mtime(&dest_full, spec.mtime) {
            debug!(path = %dest_full.display(), error = %e, "symlink mtime not applied");
        }

        // Re-read and re-validate: a racing mutator may have swapped the
        // link between creation and now.
        let reread = fs::read_link(&dest_full).map_err(|e| Error::Sandbox {
            path: dest_full.clone(),
            reason: format!("cannot re-read created symlink: {e}"),
        })?;
        let reread_str = reread.to_string_lossy().into_owned();
        if let Err(reason) = self.resolve_link_target(&link_parent, &reread_str) {
            let _ = fs::remove_file(&dest_full);
            return Err(Error::LinkEscape {
                path: spec.dest_rel.clone(),
                target: reread_str,
                reason: format!("re-validation after creation failed: {reason}"),
            });
        }
        Ok(())
    }

    /// Resolve every component of `target` against the staged tree, following
    /// intermediate symlinks up to `MAX_LINK_HOPS`, and require the result to
    /// stay strictly inside the root.
    fn resolve_link_target(&self, start_dir: &Path, target: &str) -> std::result::Result<PathBuf, String> {
        if target.starts_with('/') || target.starts_with('\\') {
            return Err("absolute link target".to_string());
        }

        let mut hops = 0usize;
        let mut cur = start_dir.to_path_buf();
        let mut pending: VecDeque<String> =
            target.replace('\\', "/").split('/').map(str::to_string).collect();

        while let Some(comp) = pending.pop_front() {
            match comp.as_str() {
                "" | "." => continue,
                ".." => {
                    if cur == self.root {
                        return Err("target escapes the destination root".to_string());
                    }
                    cur.pop();
                    if !cur.starts_with(&self.root) {
                        return Err("target escapes the destination root".to_string());
                    }
                }
                name => {
                    cur.push(name);
                    if let Ok(meta) = fs::symlink_metadata(&cur) {
                        if meta.file_type().is_symlink() {
                            hops += 1;
                            if hops > MAX_LINK_HOPS {
                                return Err(format!(
                                    "symlink chain exceeds {MAX_LINK_HOPS} hops"
                                ));
                            }
                            let next = fs::read_link(&cur)
                                .map_err(|e| format!("unreadable link in chain: {e}"))?;
                            if next.is_absolute() {
                                return Err("absolute link target in chain".to_string());
                            }
                            cur.pop();
                            let next = next.to_string_lossy().replace('\\', "/");
                            for part in next.split('/').rev() {
                                pending.push_front(part.to_string());
                            }
                        }
                    }
                }
            }
        }

        if cur == self.root {
            return Err("target resolves to the destination root itself".to_string());
        }
        if !cur.starts_with(&self.root) {
            return Err("target escapes the destination root".to_string());
        }
        Ok(cur)
    }

    /// Deferred directory metadata pass, children before parents so a
    /// read-only parent cannot block its contents.
    pub fn apply_dir_metadata(&mut self) {
        for meta in std::mem::take(&mut self.dir_meta).into_iter().rev() {
            if let Some((uid, gid)) = meta.owner {
                if let Err(e) = hardtar_fs::apply_ownership(&meta.path, uid, gid) {
                    debug!(path = %meta.path.display(), error = %e, "chown on directory failed");
                }
            }
            if let Some(mode) = meta.mode {
                if let Err(e) = hardtar_fs::apply_mode(&meta.path, mode) {
                    debug!(path = %meta.path.display(), error = %e, "chmod on directory failed");
                }
            }
            if let Err(e) = hardtar_fs::apply_mtime(&meta.path, meta.mtime) {
                debug!(path = %meta.path.display(), error = %e, "mtime on directory failed");
            }
        }
    }

    /// Adopt a committed child sandbox's creations, so a later failure in
    /// this session still unwinds them.
    pub fn absorb(&mut self, mut child: Sandbox) {
        child.committed = true;
        self.created.append(&mut child.created);
    }

    pub fn mark_committed(&mut self) {
        self.committed = true;
    }

    /// Remove every path this session created, newest first. Secondary
    /// errors are reported and never mask the primary failure.
    pub fn rollback(&mut self, sink: Option<&mut EventSink<'_>>) {
        if self.committed {
            return;
        }
        self.committed = true;

        let mut sink = sink;
        for path in self.created.drain(..).rev() {
            let result = match fs::symlink_metadata(&path) {
                Ok(meta) if meta.is_dir() => fs::remove_dir(&path),
                Ok(_) => fs::remove_file(&path),
                Err(_) => continue,
            };
            if let Err(e) = result {
                warn!(path = %path.display(), error = %e, "rollback could not remove path");
                if let Some(sink) = sink.as_mut() {
                    sink.emit(
                        "rollback_error",
                        None,
                        [("path", path.display().to_string()), ("error", e.to_string())],
                    );
                }
            }
        }

        if self.created_root {
            let _ = fs::remove_dir(&self.root);
        }
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn sink() -> EventSink<'static> {
        EventSink::new(None, "test".to_string())
    }

    fn write_member(sandbox: &mut Sandbox, rel: &str, content: &[u8]) {
        let mut staged = sandbox.stage_file(rel).unwrap();
        staged.write_all(content).unwrap();
        sandbox.commit_file(staged, Some(0o644), 0, None).unwrap();
    }

    #[test]
    fn file_members_are_written_atomically() {
        let dir = tempdir().unwrap();
        let mut sandbox = Sandbox::new(dir.path()).unwrap();
        write_member(&mut sandbox, "a/b/file.txt", b"content");
        sandbox.mark_committed();

        assert_eq!(
            std::fs::read(dir.path().join("a/b/file.txt")).unwrap(),
            b"content"
        );
    }

    #[test]
    fn rollback_removes_everything_in_reverse() {
        let dir = tempdir().unwrap();
        let mut sandbox = Sandbox::new(dir.path()).unwrap();
        write_member(&mut sandbox, "a/one.txt", b"1");
        write_member(&mut sandbox, "a/b/two.txt", b"2");

        sandbox.rollback(Some(&mut sink()));

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn drop_of_uncommitted_sandbox_rolls_back() {
        let dir = tempdir().unwrap();
        {
            let mut sandbox = Sandbox::new(dir.path()).unwrap();
            write_member(&mut sandbox, "file.txt", b"x");
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn existing_symlink_at_destination_is_an_attack() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let mut sandbox = Sandbox::new(dir.path()).unwrap();
        let result = sandbox.stage_file("link");
        assert!(matches!(result, Err(Error::UnsafePath { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn member_path_through_symlink_dir_is_an_attack() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("sub")).unwrap();

        let mut sandbox = Sandbox::new(dir.path()).unwrap();
        let result = sandbox.stage_file("sub/file.txt");
        assert!(matches!(result, Err(Error::UnsafePath { .. })));
    }

    #[test]
    fn file_member_colliding_with_directory_is_an_error() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("occupied")).unwrap();

        let mut sandbox = Sandbox::new(dir.path()).unwrap();
        let result = sandbox.stage_file("occupied");
        assert!(matches!(result, Err(Error::Sandbox { .. })));
    }

    #[test]
    fn existing_file_is_replaced_atomically() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("f"), b"old").unwrap();

        let mut sandbox = Sandbox::new(dir.path()).unwrap();
        write_member(&mut sandbox, "f", b"new");
        sandbox.mark_committed();

        assert_eq!(std::fs::read(dir.path().join("f")).unwrap(), b"new");
    }

    #[cfg(unix)]
    #[test]
    fn hardlink_commit_links_to_committed_target() {
        let dir = tempdir().unwrap();
        let mut sandbox = Sandbox::new(dir.path()).unwrap();
        write_member(&mut sandbox, "data.bin", b"payload");
        sandbox.defer_link(
            LinkKind::Hardlink,
            "copy.bin".to_string(),
            "data.bin".to_string(),
            None,
            0,
        );

        sandbox.commit_links(&mut sink()).unwrap();
        sandbox.mark_committed();

        assert_eq!(std::fs::read(dir.path().join("copy.bin")).unwrap(), b"payload");
    }

    #[test]
    fn hardlink_forward_reference_is_rejected() {
        let dir = tempdir().unwrap();
        let mut sandbox = Sandbox::new(dir.path()).unwrap();
        // Link declared before its target member.
        sandbox.defer_link(
            LinkKind::Hardlink,
            "early.bin".to_string(),
            "late.bin".to_string(),
            None,
            0,
        );
        write_member(&mut sandbox, "late.bin", b"payload");

        let result = sandbox.commit_links(&mut sink());
        assert!(matches!(result, Err(Error::HardlinkPolicy { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn internal_symlink_commits_and_resolves() {
        let dir = tempdir().unwrap();
        let mut sandbox = Sandbox::new(dir.path()).unwrap();
        write_member(&mut sandbox, "b/file.txt", b"x");
        sandbox.defer_link(
            LinkKind::Symlink,
            "a/link".to_string(),
            "../b/file.txt".to_string(),
            None,
            0,
        );

        sandbox.commit_links(&mut sink()).unwrap();
        sandbox.mark_committed();

        let link = dir.path().join("a/link");
        assert!(link.is_symlink());
        assert_eq!(std::fs::read(&link).unwrap(), b"x");
    }

    #[cfg(unix)]
    #[test]
    fn escaping_symlink_is_rejected_at_commit() {
        let dir = tempdir().unwrap();
        let mut sandbox = Sandbox::new(dir.path()).unwrap();
        write_member(&mut sandbox, "a/file.txt", b"x");
        sandbox.defer_link(
            LinkKind::Symlink,
            "a/link".to_string(),
            "../../outside".to_string(),
            None,
            0,
        );

        let result = sandbox.commit_links(&mut sink());
        assert!(matches!(result, Err(Error::LinkEscape { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn absolute_symlink_target_is_rejected() {
        let dir = tempdir().unwrap();
        let mut sandbox = Sandbox::new(dir.path()).unwrap();
        sandbox.defer_link(
            LinkKind::Symlink,
            "link".to_string(),
            "/etc/passwd".to_string(),
            None,
            0,
        );

        let result = sandbox.commit_links(&mut sink());
        assert!(matches!(result, Err(Error::LinkEscape { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_chain_cycle_is_bounded() {
        let dir = tempdir().unwrap();
        let mut sandbox = Sandbox::new(dir.path()).unwrap();
        // a -> b and b -> a form a cycle once both exist.
        std::os::unix::fs::symlink("b", dir.path().join("a")).unwrap();
        std::os::unix::fs::symlink("a", dir.path().join("b")).unwrap();
        sandbox.defer_link(
            LinkKind::Symlink,
            "c".to_string(),
            "a".to_string(),
            None,
            0,
        );

        let result = sandbox.commit_links(&mut sink());
        assert!(matches!(result, Err(Error::LinkEscape { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn deferred_dir_metadata_is_applied_children_first() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let mut sandbox = Sandbox::new(dir.path()).unwrap();
        sandbox.make_dir("outer", Some(0o555), 42, None).unwrap();
        sandbox
            .make_dir("outer/inner", Some(0o750), 42, None)
            .unwrap();
        write_member(&mut sandbox, "outer/inner/f", b"x");
        sandbox.apply_dir_metadata();
        sandbox.mark_committed();

        let outer = std::fs::metadata(dir.path().join("outer")).unwrap();
        let inner = std::fs::metadata(dir.path().join("outer/inner")).unwrap();
        assert_eq!(outer.permissions().mode() & 0o777, 0o555);
        assert_eq!(inner.permissions().mode() & 0o777, 0o750);

        // Restore writability so the tempdir can clean up.
        std::fs::set_permissions(
            dir.path().join("outer"),
            std::fs::Permissions::from_mode(0o755),
        )
        .unwrap();
    }

    #[test]
    fn rollback_removes_created_destination_root() {
        let base = tempdir().unwrap();
        let dest = base.path().join("fresh");
        let mut sandbox = Sandbox::new(&dest).unwrap();
        write_member(&mut sandbox, "f", b"x");

        sandbox.rollback(Some(&mut sink()));
        assert!(!dest.exists());
    }
}
