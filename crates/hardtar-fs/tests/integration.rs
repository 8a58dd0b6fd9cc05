use std::io::Write;

use hardtar_fs::{hardlink_or_copy, LinkOutcome, StagedFile};
use tempfile::tempdir;

#[test]
fn staged_write_then_link_round_trip() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("data.bin");

    let mut staged = StagedFile::create(&target).unwrap();
    staged.write_all(b"payload bytes").unwrap();
    staged.set_mtime(1_600_000_000).unwrap();
    staged.persist().unwrap();

    let alias = dir.path().join("alias.bin");
    let outcome = hardlink_or_copy(&target, &alias).unwrap();
    assert_eq!(outcome, LinkOutcome::Linked);
    assert_eq!(std::fs::read(&alias).unwrap(), b"payload bytes");

    #[cfg(unix)]
    {
        let link = dir.path().join("link");
        hardtar_fs::atomic_symlink(std::path::Path::new("data.bin"), &link).unwrap();
        assert_eq!(std::fs::read(&link).unwrap(), b"payload bytes");
    }
}

#[test]
fn aborted_staging_leaves_no_trace() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("never.bin");

    {
        let mut staged = StagedFile::create(&target).unwrap();
        staged.write_all(b"half a member").unwrap();
        // Dropped without persist, as extraction rollback does.
    }

    assert!(!target.exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
