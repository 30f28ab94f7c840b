//! The compressed artifact and its on-disk container.
//!
//! A stream compresses into two buffers, the timestamp bits and the value
//! bytes. Neither records the column count, so it travels alongside them.
//!
//! Container layout, all integers big-endian:
//!
//! | field        | size                         |
//! |--------------|------------------------------|
//! | magic `XWIN` | 4 bytes                      |
//! | version      | 1 byte                       |
//! | columns      | u32                          |
//! | rows         | u64                          |
//! | bit length   | u64                          |
//! | byte length  | u64                          |
//! | words        | `ceil(bit length / 64)` × u64 |
//! | bytes        | byte length                  |

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::bitpacker::BitPacker;
use crate::constants::{ANCHOR_BITS, FIRST_DELTA_BITS};

pub const MAGIC: &[u8; 4] = b"XWIN";
pub const FORMAT_VERSION: u8 = 1;

/// Largest column count a container may declare. Each column costs the
/// decoder one history window.
pub const MAX_COLUMNS: u32 = 1 << 16;

/// Shortest bit stream a decoder can open: the anchor plus one 32-bit field.
pub const MIN_STREAM_BITS: u64 = (ANCHOR_BITS + FIRST_DELTA_BITS) as u64;

/// Errors raised while reading or writing an artifact container.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("not an artifact container (bad magic {0:02x?})")]
    BadMagic([u8; 4]),

    #[error("unsupported container version {0}")]
    UnsupportedVersion(u8),

    #[error("too many columns: {0} (at most {MAX_COLUMNS})")]
    TooManyColumns(u64),

    #[error("timestamp stream of {0} bits is shorter than {MIN_STREAM_BITS}")]
    StreamTooShort(u64),
}

/// Everything a decoder needs to rebuild a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedArtifact {
    /// Frozen timestamp bits, trailer included.
    pub bits: BitPacker,
    /// Value bytes.
    pub bytes: Vec<u8>,
    /// Number of values per row.
    pub columns: usize,
    /// Number of rows encoded.
    pub rows: u64,
}

impl CompressedArtifact {
    /// Size of the two buffers in bits, as reported by the encoder.
    pub fn compressed_bit_size(&self) -> u64 {
        self.bits.len_bits() + 8 * self.bytes.len() as u64
    }

    /// Writes the container to `w`. Only the stored words are written, not
    /// the read position of `bits`.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<(), ArtifactError> {
        let columns = u32::try_from(self.columns)
            .ok()
            .filter(|&c| c <= MAX_COLUMNS)
            .ok_or(ArtifactError::TooManyColumns(self.columns as u64))?;

        w.write_all(MAGIC)?;
        w.write_u8(FORMAT_VERSION)?;
        w.write_u32::<BigEndian>(columns)?;
        w.write_u64::<BigEndian>(self.rows)?;
        w.write_u64::<BigEndian>(self.bits.len_bits())?;
        w.write_u64::<BigEndian>(self.bytes.len() as u64)?;
        for &word in self.bits.words() {
            w.write_u64::<BigEndian>(word)?;
        }
        w.write_all(&self.bytes)?;
        Ok(())
    }

    /// Reads a container from `r`. A short read surfaces as an
    /// [`io::ErrorKind::UnexpectedEof`] wrapped in [`ArtifactError::Io`].
    ///
    /// Section buffers grow with the data actually read, never with the
    /// lengths the header claims.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self, ArtifactError> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(ArtifactError::BadMagic(magic));
        }
        let version = r.read_u8()?;
        if version != FORMAT_VERSION {
            return Err(ArtifactError::UnsupportedVersion(version));
        }

        let columns = r.read_u32::<BigEndian>()?;
        if columns > MAX_COLUMNS {
            return Err(ArtifactError::TooManyColumns(u64::from(columns)));
        }
        let rows = r.read_u64::<BigEndian>()?;
        let len_bits = r.read_u64::<BigEndian>()?;
        if len_bits < MIN_STREAM_BITS {
            return Err(ArtifactError::StreamTooShort(len_bits));
        }
        let byte_len = r.read_u64::<BigEndian>()?;

        let raw = read_section(r, len_bits.div_ceil(64) * 8)?;
        let words = raw.chunks_exact(8).map(BigEndian::read_u64).collect();
        let bytes = read_section(r, byte_len)?;

        Ok(Self {
            bits: BitPacker::from_words(words, len_bits),
            bytes,
            columns: columns as usize,
            rows,
        })
    }

    /// Serializes the container into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ArtifactError> {
        let mut out = Vec::with_capacity(33 + self.bits.words().len() * 8 + self.bytes.len());
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Parses a container from a byte slice.
    pub fn from_bytes(mut data: &[u8]) -> Result<Self, ArtifactError> {
        Self::read_from(&mut data)
    }
}

/// Reads exactly `len` bytes.
fn read_section<R: Read>(r: &mut R, len: u64) -> Result<Vec<u8>, ArtifactError> {
    let mut buf = Vec::new();
    r.by_ref().take(len).read_to_end(&mut buf)?;
    if (buf.len() as u64) < len {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Decoder;
    use crate::encoder::Encoder;

    /// A header with no sections after it.
    fn header(columns: u32, len_bits: u64, byte_len: u64) -> Vec<u8> {
        let mut out = MAGIC.to_vec();
        out.write_u8(FORMAT_VERSION).unwrap();
        out.write_u32::<BigEndian>(columns).unwrap();
        out.write_u64::<BigEndian>(0).unwrap();
        out.write_u64::<BigEndian>(len_bits).unwrap();
        out.write_u64::<BigEndian>(byte_len).unwrap();
        out
    }

    fn sample() -> CompressedArtifact {
        let mut enc = Encoder::new(0);
        for i in 0..20 {
            enc.add_row(i * 10, &[i as f64, 3.25, f64::NAN]);
        }
        enc.into_artifact()
    }

    #[test]
    fn test_container_round_trip() {
        let artifact = sample();
        let data = artifact.to_bytes().unwrap();
        assert_eq!(&data[..4], MAGIC);
        let back = CompressedArtifact::from_bytes(&data).unwrap();
        assert_eq!(back, artifact);
        assert_eq!(back.columns, 3);
        assert_eq!(back.rows, 20);
    }

    #[test]
    fn test_bad_magic() {
        let mut data = sample().to_bytes().unwrap();
        data[0] = b'Y';
        assert!(matches!(
            CompressedArtifact::from_bytes(&data),
            Err(ArtifactError::BadMagic(_))
        ));
    }

    #[test]
    fn test_bad_version() {
        let mut data = sample().to_bytes().unwrap();
        data[4] = 9;
        assert!(matches!(
            CompressedArtifact::from_bytes(&data),
            Err(ArtifactError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_truncated_container() {
        let data = sample().to_bytes().unwrap();
        let err = CompressedArtifact::from_bytes(&data[..data.len() - 1]).unwrap_err();
        match err {
            ArtifactError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_error_display() {
        let err = ArtifactError::UnsupportedVersion(3);
        assert!(err.to_string().contains("version 3"));
        let err = ArtifactError::BadMagic(*b"ABCD");
        assert!(err.to_string().contains("bad magic"));
    }

    #[test]
    fn test_huge_lengths_fail_without_allocating() {
        let err = CompressedArtifact::from_bytes(&header(1, 1 << 43, 0)).unwrap_err();
        assert!(matches!(err, ArtifactError::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));

        let mut data = header(1, 197, u64::MAX);
        data.extend_from_slice(&[0xFF; 32]);
        let err = CompressedArtifact::from_bytes(&data).unwrap_err();
        assert!(matches!(err, ArtifactError::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn test_short_stream_rejected() {
        for len_bits in [0, 63, MIN_STREAM_BITS - 1] {
            let mut data = header(1, len_bits, 0);
            data.extend_from_slice(&[0; 16]);
            assert!(matches!(
                CompressedArtifact::from_bytes(&data),
                Err(ArtifactError::StreamTooShort(n)) if n == len_bits
            ));
        }
    }

    #[test]
    fn test_too_many_columns_rejected() {
        let data = header(MAX_COLUMNS + 1, 197, 0);
        assert!(matches!(
            CompressedArtifact::from_bytes(&data),
            Err(ArtifactError::TooManyColumns(n)) if n == u64::from(MAX_COLUMNS) + 1
        ));

        let mut artifact = sample();
        artifact.columns = MAX_COLUMNS as usize + 1;
        assert!(matches!(
            artifact.to_bytes(),
            Err(ArtifactError::TooManyColumns(_))
        ));
    }

    #[test]
    fn test_minimal_stream_opens_a_decoder() {
        // Anchor plus a 32-bit end marker: no rows, no panic.
        let mut data = header(2, MIN_STREAM_BITS, 0);
        data.write_u64::<BigEndian>(7).unwrap();
        data.write_u64::<BigEndian>(0xFFFF_FFFF_0000_0000).unwrap();
        let artifact = CompressedArtifact::from_bytes(&data).unwrap();
        let mut decoder = Decoder::from_artifact(artifact);
        assert_eq!(decoder.anchor(), 7);
        assert_eq!(decoder.advance(), Ok(false));
    }
}
