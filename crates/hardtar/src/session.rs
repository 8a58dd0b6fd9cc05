use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::codec::{CountingReader, Decoder};
use crate::detect::{detect_transport, Transport};
use crate::error::{Error, Result};
use crate::events::{EventSink, SecurityEvent};
use crate::guard::{Guard, ResolvedKind, Verdict};
use crate::header::MemberHeader;
use crate::nesting;
use crate::policy::Policy;
use crate::sandbox::{LinkKind, Sandbox};
use crate::streamer::{self, ExtractionState, Phase};

/// How much of the archive feeds the correlation hash.
const HASH_PREFIX_BYTES: usize = 64 * 1024;

trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// Cooperative cancellation handle, checked at every chunk boundary.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One hardened extraction pipeline over one archive.
///
/// Construction detects the transport and hashes the archive prefix but
/// never touches the destination; `extract_all` runs the full
/// guard/streamer/sandbox pipeline and either commits everything or leaves
/// the destination exactly as it was.
pub struct ExtractSession {
    policy: Policy,
    source: Option<Box<dyn ReadSeek>>,
    transport: Transport,
    archive_hash: String,
    compressed: Arc<AtomicU64>,
    cancel: CancelToken,
}

impl ExtractSession {
    /// Open an archive file. Fails `ArchiveOpen` if it cannot be read and
    /// `UnsupportedFormat` if the magic bytes match no known transport.
    pub fn open(path: impl AsRef<Path>, policy: Policy) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| Error::ArchiveOpen {
            reason: format!("cannot open '{}': {e}", path.as_ref().display()),
        })?;
        Self::from_reader(file, policy)
    }

    /// Open an archive from a seekable reader.
    pub fn from_reader<R: Read + Seek + 'static>(reader: R, policy: Policy) -> Result<Self> {
        Self::with_shared(
            Box::new(reader),
            policy,
            Arc::new(AtomicU64::new(0)),
            CancelToken::default(),
        )
    }

    /// Open an archive from a non-seekable stream. The stream is buffered
    /// into a spooled temp file, bounded by `max_total_size`.
    pub fn from_stream<R: Read>(reader: R, policy: Policy) -> Result<Self> {
        policy.validate()?;
        let spool = streamer::spool_stream(reader, policy.max_total_size)?;
        Self::from_reader(spool, policy)
    }

    fn with_shared(
        mut source: Box<dyn ReadSeek>,
        policy: Policy,
        compressed: Arc<AtomicU64>,
        cancel: CancelToken,
    ) -> Result<Self> {
        policy.validate()?;
        let (transport, archive_hash) = probe(source.as_mut())?;
        Ok(Self {
            policy,
            source: Some(source),
            transport,
            archive_hash,
            compressed,
            cancel,
        })
    }

    /// Correlation token: sha-256 of the archive's first 64 KiB, shortened.
    pub fn archive_hash(&self) -> &str {
        &self.archive_hash
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Canonical names of the members the guard would accept, in archive
    /// order. Headers only; nothing is written.
    pub fn names(&mut self) -> Result<Vec<String>> {
        self.policy.validate()?;
        let guard = Guard::new();
        let mut archive = self.open_archive()?;
        let mut names = Vec::new();

        let outcome: Result<()> = (|| {
            let entries = archive.entries().map_err(|e| Error::MalformedArchive {
                reason: e.to_string(),
            })?;
            for entry in entries {
                let mut entry = entry.map_err(|e| Error::MalformedArchive {
                    reason: e.to_string(),
                })?;
                let Ok(header) = MemberHeader::from_entry(&mut entry) else {
                    continue;
                };
                match guard.check(&header, &self.policy) {
                    Ok(Verdict::Accept(member)) => names.push(member.rel_path),
                    Ok(Verdict::Skip { .. }) => {}
                    Err(e) => {
                        debug!(member = %header.name, error = %e, "member rejected during listing");
                    }
                }
            }
            Ok(())
        })();

        self.reclaim(archive);
        outcome?;
        Ok(names)
    }

    /// Run the full pipeline into `destination`.
    ///
    /// `on_event` receives every security event, synchronously, between
    /// chunks. On any error the destination is restored to its prior state.
    pub fn extract_all(
        &mut self,
        destination: impl AsRef<Path>,
        on_event: Option<&dyn Fn(&SecurityEvent)>,
    ) -> Result<()> {
        self.policy.validate()?;
        // A prior names() pass already pulled compressed bytes through the
        // counter; the ratio must see only this extraction's reads.
        self.compressed.store(0, Ordering::Relaxed);
        let mut state = ExtractionState::new(self.compressed.clone());
        state.set_phase(Phase::Open);

        let result = self.extract_level(destination.as_ref(), &mut state, on_event, 1, None);
        match &result {
            Ok(()) => state.set_phase(Phase::Closed),
            Err(_) => {
                state.set_phase(Phase::Aborting);
                state.set_phase(Phase::Closed);
            }
        }
        result
    }

    /// Idempotent; releases the archive reader.
    pub fn close(&mut self) {
        self.source = None;
    }

    fn extract_level(
        &mut self,
        dest: &Path,
        state: &mut ExtractionState,
        on_event: Option<&dyn Fn(&SecurityEvent)>,
        depth: u8,
        parent: Option<&mut Sandbox>,
    ) -> Result<()> {
        let mut sink = EventSink::new(on_event, self.archive_hash.clone());
        let mut sandbox = Sandbox::new(dest)?;

        let outcome: Result<()> = (|| {
            let candidates = self.run_members(&mut sandbox, state, &mut sink)?;
            state.set_phase(Phase::CommitLinks);
            sandbox.commit_links(&mut sink).map_err(|e| {
                sink.emit_error(&e, None);
                e
            })?;
            sandbox.apply_dir_metadata();
            self.descend(candidates, &mut sandbox, state, on_event, depth, &mut sink)?;
            Ok(())
        })();

        match outcome {
            Ok(()) => {
                match parent {
                    Some(p) => p.absorb(sandbox),
                    None => sandbox.mark_committed(),
                }
                Ok(())
            }
            Err(e) => {
                sandbox.rollback(Some(&mut sink));
                Err(e)
            }
        }
    }

    /// One pass over the members: guard, count, stage. Returns candidate
    /// nested archives as (canonical name, on-disk path).
    fn run_members(
        &mut self,
        sandbox: &mut Sandbox,
        state: &mut ExtractionState,
        sink: &mut EventSink<'_>,
    ) -> Result<Vec<(String, PathBuf)>> {
        let guard = Guard::new();
        let mut archive = self.open_archive()?;
        let mut candidates = Vec::new();

        let outcome: Result<()> = (|| {
            let entries = archive.entries().map_err(|e| Error::MalformedArchive {
                reason: e.to_string(),
            })?;
            for entry in entries {
                state.set_phase(Phase::ReadHeader);
                let mut entry = entry.map_err(|e| Error::MalformedArchive {
                    reason: e.to_string(),
                })?;

                let header = match MemberHeader::from_entry(&mut entry) {
                    Ok(h) => h,
                    Err(e) => {
                        sink.emit_error(&e, None);
                        return Err(e);
                    }
                };

                let member = match guard.check(&header, &self.policy) {
                    Ok(Verdict::Accept(m)) => m,
                    Ok(Verdict::Skip { reason }) => {
                        sink.emit(
                            "member_skipped",
                            Some(&header.name),
                            [("reason", reason.to_string())],
                        );
                        continue;
                    }
                    Err(e) => {
                        sink.emit_error(&e, Some(&header.name));
                        return Err(e);
                    }
                };

                state.count_member(&self.policy).map_err(|e| {
                    sink.emit_error(&e, Some(&member.rel_path));
                    e
                })?;

                if !member.clamps.is_empty() {
                    sink.emit(
                        "metadata_sanitised",
                        Some(&member.rel_path),
                        member.clamps.iter().map(|c| (*c, "true".to_string())),
                    );
                }

                let owner = self
                    .policy
                    .preserve_ownership
                    .then_some((member.uid, member.gid));

                match &member.kind {
                    ResolvedKind::Directory => {
                        sandbox
                            .make_dir(&member.rel_path, member.mode, member.mtime, owner)
                            .map_err(|e| {
                                sink.emit_error(&e, Some(&member.rel_path));
                                e
                            })?;
                    }
                    ResolvedKind::File { .. } => {
                        state.set_phase(Phase::CopyPayload);
                        let mut staged =
                            sandbox.stage_file(&member.rel_path).map_err(|e| {
                                sink.emit_error(&e, Some(&member.rel_path));
                                e
                            })?;
                        let written = streamer::copy_payload(
                            &mut entry,
                            &mut staged,
                            state,
                            &self.policy,
                            &self.cancel,
                            &member.rel_path,
                        )
                        .map_err(|e| {
                            sink.emit_error(&e, Some(&member.rel_path));
                            e
                        })?;

                        // Header said one thing, the stream said another;
                        // the written count is what the budgets saw.
                        if written != header.declared_size {
                            sink.emit(
                                "header_size_mismatch",
                                Some(&member.rel_path),
                                [
                                    ("declared", header.declared_size.to_string()),
                                    ("written", written.to_string()),
                                ],
                            );
                        }

                        sandbox
                            .commit_file(staged, member.mode, member.mtime, owner)
                            .map_err(|e| {
                                sink.emit_error(&e, Some(&member.rel_path));
                                e
                            })?;

                        if nesting::archive_extension(&member.rel_path).is_some() {
                            candidates.push((
                                member.rel_path.clone(),
                                sandbox.root().join(&member.rel_path),
                            ));
                        }
                    }
                    ResolvedKind::Symlink { target } => {
                        sandbox.defer_link(
                            LinkKind::Symlink,
                            member.rel_path.clone(),
                            target.clone(),
                            member.mode,
                            member.mtime,
                        );
                    }
                    ResolvedKind::Hardlink { target } => {
                        sandbox.defer_link(
                            LinkKind::Hardlink,
                            member.rel_path.clone(),
                            target.clone(),
                            member.mode,
                            member.mtime,
                        );
                    }
                }
            }
            Ok(())
        })();

        self.reclaim(archive);
        outcome?;
        Ok(candidates)
    }

    /// Nesting controller: recurse into just-extracted archives while the
    /// level budget allows, sharing policy and counters.
    fn descend(
        &mut self,
        candidates: Vec<(String, PathBuf)>,
        sandbox: &mut Sandbox,
        state: &mut ExtractionState,
        on_event: Option<&dyn Fn(&SecurityEvent)>,
        depth: u8,
        sink: &mut EventSink<'_>,
    ) -> Result<()> {
        for (rel, full) in candidates {
            if depth >= self.policy.max_nesting_depth {
                sink.emit(
                    "nesting_depth_reached",
                    Some(&rel),
                    [("depth", depth.to_string())],
                );
                continue;
            }

            let file_name = rel.rsplit('/').next().unwrap_or(&rel);
            let dir_name = nesting::nested_dir_name(file_name);
            let nested_rel = match rel.rsplit_once('/') {
                Some((parent_dir, _)) => format!("{parent_dir}/{dir_name}"),
                None => dir_name,
            };
            let nested_dest = sandbox.ensure_dir(&nested_rel)?;

            debug!(archive = %rel, depth = depth + 1, "descending into nested archive");
            let mut nested = Self::open_nested(
                &full,
                self.policy.clone(),
                self.compressed.clone(),
                self.cancel.clone(),
            )?;
            nested.extract_level(&nested_dest, state, on_event, depth + 1, Some(&mut *sandbox))?;
        }
        Ok(())
    }

    fn open_nested(
        path: &Path,
        policy: Policy,
        compressed: Arc<AtomicU64>,
        cancel: CancelToken,
    ) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::ArchiveOpen {
            reason: format!("cannot open nested archive '{}': {e}", path.display()),
        })?;
        Self::with_shared(Box::new(file), policy, compressed, cancel)
    }

    fn open_archive(
        &mut self,
    ) -> Result<tar::Archive<Decoder<CountingReader<Box<dyn ReadSeek>>>>> {
        let mut source = self.source.take().ok_or_else(|| Error::ArchiveOpen {
            reason: "session is closed".to_string(),
        })?;
        source.seek(SeekFrom::Start(0)).map_err(|e| Error::ArchiveOpen {
            reason: format!("cannot rewind archive: {e}"),
        })?;
        let counting = CountingReader::new(source, self.compressed.clone());
        Ok(tar::Archive::new(Decoder::new(counting, self.transport)))
    }

    fn reclaim(&mut self, archive: tar::Archive<Decoder<CountingReader<Box<dyn ReadSeek>>>>) {
        self.source = Some(archive.into_inner().into_inner().into_inner());
    }
}

fn probe(source: &mut dyn ReadSeek) -> Result<(Transport, String)> {
    source.seek(SeekFrom::Start(0)).map_err(|e| Error::ArchiveOpen {
        reason: format!("cannot rewind input: {e}"),
    })?;

    let mut buf = vec![0u8; HASH_PREFIX_BYTES];
    let mut filled = 0;
    loop {
        let n = source.read(&mut buf[filled..]).map_err(|e| Error::ArchiveOpen {
            reason: format!("cannot read archive prefix: {e}"),
        })?;
        if n == 0 {
            break;
        }
        filled += n;
        if filled == buf.len() {
            break;
        }
    }
    buf.truncate(filled);

    if buf.is_empty() {
        return Err(Error::ArchiveOpen {
            reason: "empty input".to_string(),
        });
    }

    let digest = format!("{:x}", Sha256::digest(&buf));
    let archive_hash = digest[..16].to_string();

    let transport = detect_transport(&buf).ok_or(Error::UnsupportedFormat)?;

    source.seek(SeekFrom::Start(0)).map_err(|e| Error::ArchiveOpen {
        reason: format!("cannot rewind input: {e}"),
    })?;

    Ok((transport, archive_hash))
}
