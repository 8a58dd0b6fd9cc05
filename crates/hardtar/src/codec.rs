use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::detect::Transport;

/// Reader that adds every byte it hands out to a shared counter.
///
/// Wrapped around the compressed source so the decoded/compressed ratio can
/// be evaluated against bytes actually pulled off the transport.
pub struct CountingReader<R> {
    inner: R,
    count: Arc<AtomicU64>,
}

impl<R: Read> CountingReader<R> {
    pub fn new(inner: R, count: Arc<AtomicU64>) -> Self {
        Self { inner, count }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// Decoder wrapper for the supported transports.
pub enum Decoder<R: Read> {
    Passthrough(R),
    Gzip(Box<flate2::read::GzDecoder<R>>),
    Bzip2(Box<bzip2::read::BzDecoder<R>>),
    Xz(Box<xz2::read::XzDecoder<R>>),
}

impl<R: Read> Decoder<R> {
    pub fn new(reader: R, transport: Transport) -> Self {
        match transport {
            Transport::None => Self::Passthrough(reader),
            Transport::Gzip => Self::Gzip(Box::new(flate2::read::GzDecoder::new(reader))),
            Transport::Bzip2 => Self::Bzip2(Box::new(bzip2::read::BzDecoder::new(reader))),
            Transport::Xz => Self::Xz(Box::new(xz2::read::XzDecoder::new(reader))),
        }
    }

    pub fn into_inner(self) -> R {
        match self {
            Self::Passthrough(r) => r,
            Self::Gzip(d) => (*d).into_inner(),
            Self::Bzip2(d) => (*d).into_inner(),
            Self::Xz(d) => (*d).into_inner(),
        }
    }
}

impl<R: Read> Read for Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Passthrough(r) => r.read(buf),
            Self::Gzip(d) => d.read(buf),
            Self::Bzip2(d) => d.read(buf),
            Self::Xz(d) => d.read(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    #[test]
    fn counting_reader_tracks_bytes() {
        let count = Arc::new(AtomicU64::new(0));
        let mut reader = CountingReader::new(Cursor::new(vec![0u8; 1000]), count.clone());

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();

        assert_eq!(out.len(), 1000);
        assert_eq!(count.load(Ordering::Relaxed), 1000);
    }

    #[test]
    fn gzip_roundtrip_counts_compressed_bytes() {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&[0u8; 4096]).unwrap();
        let compressed = encoder.finish().unwrap();
        let compressed_len = compressed.len() as u64;

        let count = Arc::new(AtomicU64::new(0));
        let counting = CountingReader::new(Cursor::new(compressed), count.clone());
        let mut decoder = Decoder::new(counting, Transport::Gzip);

        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();

        assert_eq!(out.len(), 4096);
        assert_eq!(count.load(Ordering::Relaxed), compressed_len);
    }

    #[test]
    fn bzip2_roundtrip() {
        let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        encoder.write_all(b"hello bzip2").unwrap();
        let compressed = encoder.finish().unwrap();

        let mut decoder = Decoder::new(Cursor::new(compressed), Transport::Bzip2);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello bzip2");
    }

    #[test]
    fn xz_roundtrip() {
        let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
        encoder.write_all(b"hello xz").unwrap();
        let compressed = encoder.finish().unwrap();

        let mut decoder = Decoder::new(Cursor::new(compressed), Transport::Xz);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello xz");
    }

    #[test]
    fn into_inner_returns_the_source() {
        let decoder = Decoder::new(Cursor::new(vec![1, 2, 3]), Transport::None);
        let cursor = decoder.into_inner();
        assert_eq!(cursor.into_inner(), vec![1, 2, 3]);
    }
}
