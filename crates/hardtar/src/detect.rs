/// Compression transport wrapping the TAR stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    None,
    Gzip,
    Bzip2,
    Xz,
}

/// Detect the transport from the first bytes of the input.
///
/// An uncompressed input must carry the ustar magic at offset 257 (POSIX
/// `ustar\0` or the GNU `ustar ` spelling); anything else is unsupported.
pub fn detect_transport(data: &[u8]) -> Option<Transport> {
    match data {
        [0x1F, 0x8B, ..] => Some(Transport::Gzip),
        [0x42, 0x5A, 0x68, ..] => Some(Transport::Bzip2),
        [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00, ..] => Some(Transport::Xz),
        _ => {
            if is_tar_header(data) {
                Some(Transport::None)
            } else {
                None
            }
        }
    }
}

fn is_tar_header(data: &[u8]) -> bool {
    data.len() >= 512 && data[257..262] == *b"ustar"
}
