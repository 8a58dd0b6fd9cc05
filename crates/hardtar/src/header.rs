use std::io::Read;

use crate::error::{Error, Result};

/// Member type, decoded from the TAR type flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberType {
    Regular,
    Directory,
    Symlink,
    Hardlink,
    CharDevice,
    BlockDevice,
    Fifo,
    Sparse,
    Unknown,
}

impl MemberType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Regular => "regular file",
            Self::Directory => "directory",
            Self::Symlink => "symlink",
            Self::Hardlink => "hardlink",
            Self::CharDevice => "character device",
            Self::BlockDevice => "block device",
            Self::Fifo => "FIFO",
            Self::Sparse => "sparse file",
            Self::Unknown => "unknown",
        }
    }
}

/// Everything the guard needs to know about one member, harvested from the
/// archive reader before any payload byte is consumed.
///
/// GNU long-name continuations and PAX `path`/`linkpath` overrides are
/// already folded into `raw_name` and `link_target` by the tar reader.
#[derive(Clone, Debug)]
pub struct MemberHeader {
    pub raw_name: Vec<u8>,
    pub name: String,
    pub kind: MemberType,
    /// Header-declared logical size. Never trusted as authoritative; budget
    /// checks run against bytes actually produced.
    pub declared_size: u64,
    pub mode: Option<u32>,
    pub uid: Option<u64>,
    pub gid: Option<u64>,
    pub mtime: Option<u64>,
    pub link_target: Option<String>,
    pub has_pax: bool,
}

impl MemberHeader {
    pub(crate) fn from_entry<R: Read>(entry: &mut tar::Entry<'_, R>) -> Result<Self> {
        let raw_name = entry.path_bytes().into_owned();
        let name = decode_name(&raw_name)?;

        let header = entry.header();
        let entry_type = header.entry_type();

        let declared_size = header.size().map_err(|e| Error::MalformedArchive {
            reason: format!("unreadable size field for '{name}': {e}"),
        })?;
        let mode = header.mode().ok();
        let uid = header.uid().ok();
        let gid = header.gid().ok();
        let mtime = header.mtime().ok();

        let link_target = match entry.link_name_bytes() {
            Some(bytes) => Some(decode_name(&bytes)?),
            None => None,
        };

        let mut kind = if entry_type.is_gnu_sparse() {
            MemberType::Sparse
        } else if entry_type.is_dir() {
            MemberType::Directory
        } else if entry_type.is_symlink() {
            MemberType::Symlink
        } else if entry_type.is_hard_link() {
            MemberType::Hardlink
        } else if entry_type.is_file() {
            MemberType::Regular
        } else if entry_type.is_character_special() {
            MemberType::CharDevice
        } else if entry_type.is_block_special() {
            MemberType::BlockDevice
        } else if entry_type.is_fifo() {
            MemberType::Fifo
        } else {
            MemberType::Unknown
        };

        // PAX-annotated sparse members carry REGTYPE; the annotation wins.
        let mut has_pax = false;
        if let Ok(Some(extensions)) = entry.pax_extensions() {
            has_pax = true;
            for ext in extensions {
                let Ok(ext) = ext else { continue };
                if let Ok(key) = ext.key() {
                    if key.starts_with("GNU.sparse.") && kind == MemberType::Regular {
                        kind = MemberType::Sparse;
                    }
                }
            }
        }

        Ok(Self {
            raw_name,
            name,
            kind,
            declared_size,
            mode,
            uid,
            gid,
            mtime,
            link_target,
            has_pax,
        })
    }
}

fn decode_name(raw: &[u8]) -> Result<String> {
    match std::str::from_utf8(raw) {
        Ok(s) => Ok(s.to_string()),
        Err(_) => Err(Error::UnsafePath {
            path: String::from_utf8_lossy(raw).into_owned(),
            reason: "member name is not valid UTF-8".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn archive_with_header(header: tar::Header, payload: &[u8]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        builder.append(&header, payload).unwrap();
        builder.into_inner().unwrap()
    }

    fn first_header(data: Vec<u8>) -> Result<MemberHeader> {
        let mut archive = tar::Archive::new(Cursor::new(data));
        let mut entries = archive.entries().unwrap();
        let mut entry = entries.next().unwrap().unwrap();
        MemberHeader::from_entry(&mut entry)
    }

    #[test]
    fn regular_file_header() {
        let mut header = tar::Header::new_gnu();
        header.set_path("dir/file.txt").unwrap();
        header.set_size(4);
        header.set_mode(0o644);
        header.set_mtime(1_700_000_000);
        header.set_cksum();

        let member = first_header(archive_with_header(header, b"data")).unwrap();
        assert_eq!(member.name, "dir/file.txt");
        assert_eq!(member.kind, MemberType::Regular);
        assert_eq!(member.declared_size, 4);
        assert_eq!(member.mode, Some(0o644));
        assert_eq!(member.mtime, Some(1_700_000_000));
        assert!(member.link_target.is_none());
    }

    #[test]
    fn symlink_header_carries_target() {
        let mut header = tar::Header::new_gnu();
        header.set_path("link").unwrap();
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_link_name("target/file").unwrap();
        header.set_size(0);
        header.set_cksum();

        let member = first_header(archive_with_header(header, b"")).unwrap();
        assert_eq!(member.kind, MemberType::Symlink);
        assert_eq!(member.link_target.as_deref(), Some("target/file"));
    }

    #[test]
    fn device_header_maps_to_char_device() {
        let mut header = tar::Header::new_gnu();
        header.set_path("dev/tty0").unwrap();
        header.set_entry_type(tar::EntryType::Char);
        header.set_size(0);
        header.set_cksum();

        let member = first_header(archive_with_header(header, b"")).unwrap();
        assert_eq!(member.kind, MemberType::CharDevice);
    }

    #[test]
    fn fifo_header_maps_to_fifo() {
        let mut header = tar::Header::new_gnu();
        header.set_path("pipe").unwrap();
        header.set_entry_type(tar::EntryType::Fifo);
        header.set_size(0);
        header.set_cksum();

        let member = first_header(archive_with_header(header, b"")).unwrap();
        assert_eq!(member.kind, MemberType::Fifo);
    }

    #[test]
    fn long_gnu_name_is_reassembled() {
        let long = "deep/".repeat(60) + "file.txt";
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(1);
        header.set_cksum();
        builder.append_data(&mut header, &long, &b"x"[..]).unwrap();

        let member = first_header(builder.into_inner().unwrap()).unwrap();
        assert_eq!(member.name, long);
    }
}
