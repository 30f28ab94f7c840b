use log::{debug, warn};
use thiserror::Error;

use crate::artifact::CompressedArtifact;
use crate::bitpacker::BitPacker;
use crate::constants::*;
use crate::encoder::Row;
use crate::window::HistoryWindow;

/// Errors raised when a stream ends early or carries codes the encoder
/// never writes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The timestamp bits ran out before the end-of-stream marker.
    #[error("timestamp stream truncated after {rows} rows ({remaining} bits left)")]
    TruncatedBits { rows: u64, remaining: u64 },

    /// The value bytes ran out in the middle of a row.
    #[error("value bytes exhausted at offset {offset} in row {row}")]
    TruncatedBytes { row: u64, offset: usize },

    /// A back-reference points past the populated part of a window.
    #[error("row {row}, column {column}: offset {offset} beyond window of {len} values")]
    BadReference {
        row: u64,
        column: usize,
        offset: usize,
        len: usize,
    },

    /// An XOR info byte whose length and trailing byte count do not fit a
    /// 64-bit value.
    #[error("row {row}, column {column}: invalid XOR info byte {info:#04x}")]
    BadXorInfo { row: u64, column: usize, info: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    First,
    Subsequent,
    Finished,
}

/// The multi-column decompressor.
///
/// Rebuilds rows one at a time from a compressed artifact, mirroring the
/// encoder's history windows so back-references resolve to the same values.
/// Decoding is forward-only: once the end of the stream is reached, or an
/// error is reported, the decoder stays exhausted.
///
/// # Example
/// ```
/// use xorwin::{Decoder, Encoder};
///
/// let mut encoder = Encoder::new(0);
/// encoder.add_row(0, &[12.0, 7.5]);
/// encoder.add_row(60, &[12.5, 7.5]);
/// let artifact = encoder.into_artifact();
///
/// let mut decoder = Decoder::from_artifact(artifact);
/// assert_eq!(decoder.advance(), Ok(true));
/// assert_eq!(decoder.timestamp(), 0);
/// assert_eq!(decoder.advance(), Ok(true));
/// assert_eq!(decoder.values(), &[12.5, 7.5]);
/// assert_eq!(decoder.advance(), Ok(false));
/// ```
#[derive(Debug)]
pub struct Decoder {
    bits: BitPacker,
    bytes: Vec<u8>,
    /// Read position in `bytes`.
    cursor: usize,
    windows: Vec<HistoryWindow>,
    anchor: i64,
    delta: i64,
    timestamp: i64,
    values: Vec<f64>,
    /// Row being decoded; swapped into `values` once complete.
    pending: Vec<f64>,
    /// Rows decoded so far.
    rows: u64,
    state: State,
}

impl Decoder {
    /// Creates a decoder over frozen timestamp bits and value bytes for a
    /// stream of `columns` values per row. Reads the anchor immediately.
    ///
    /// # Panics
    ///
    /// Panics if `bits` is not frozen or is too short to hold the anchor.
    pub fn new(mut bits: BitPacker, bytes: Vec<u8>, columns: usize) -> Self {
        let anchor = bits.read(ANCHOR_BITS) as i64;
        Self {
            bits,
            bytes,
            cursor: 0,
            windows: vec![HistoryWindow::new(); columns],
            anchor,
            delta: 0,
            timestamp: anchor,
            values: vec![0.0; columns],
            pending: vec![0.0; columns],
            rows: 0,
            state: State::First,
        }
    }

    /// Creates a decoder that takes ownership of an artifact's buffers.
    pub fn from_artifact(artifact: CompressedArtifact) -> Self {
        Self::new(artifact.bits, artifact.bytes, artifact.columns)
    }

    /// Decodes every row of `artifact`.
    pub fn decode_all(artifact: &CompressedArtifact) -> Result<Vec<Row>, DecodeError> {
        Self::from_artifact(artifact.clone()).collect()
    }

    /// Decodes the next row into [`timestamp`](Decoder::timestamp) and
    /// [`values`](Decoder::values).
    ///
    /// Returns `Ok(false)` at the end of the stream. On `Ok(false)` or an
    /// error the last fully decoded row stays in place.
    pub fn advance(&mut self) -> Result<bool, DecodeError> {
        let decoded = match self.state {
            State::First => self.read_first(),
            State::Subsequent => self.read_subsequent(),
            State::Finished => return Ok(false),
        };
        match decoded {
            Ok(true) => {
                self.state = State::Subsequent;
                self.rows += 1;
                Ok(true)
            }
            Ok(false) => {
                self.state = State::Finished;
                debug!("decoder reached end of stream after {} rows", self.rows);
                Ok(false)
            }
            Err(e) => {
                self.state = State::Finished;
                warn!("decoding stopped: {e}");
                Err(e)
            }
        }
    }

    /// Timestamp of the most recently decoded row.
    #[inline]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Values of the most recently decoded row.
    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// The most recently decoded row, copied out.
    pub fn row(&self) -> Row {
        Row::new(self.timestamp, self.values.clone())
    }

    pub fn anchor(&self) -> i64 {
        self.anchor
    }

    pub fn columns(&self) -> usize {
        self.windows.len()
    }

    /// Number of rows decoded so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Returns `true` once the end of the stream or an error has been reached.
    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }

    // ── internal helpers ───────────────────────────────────────────────

    fn read_first(&mut self) -> Result<bool, DecodeError> {
        if self.bits.size() < u64::from(FIRST_DELTA_BITS) {
            return Err(DecodeError::TruncatedBits {
                rows: 0,
                remaining: self.bits.size(),
            });
        }
        let raw = self.bits.read(FIRST_DELTA_BITS);
        if raw == END_OF_STREAM {
            return Ok(false);
        }
        let first_delta = i64::from(raw as u32 as i32);

        for i in 0..self.windows.len() {
            let v = self.read_bytes(8)?;
            self.windows[i].add(v);
            self.pending[i] = f64::from_bits(v);
        }
        self.commit(first_delta, self.anchor.wrapping_add(first_delta));
        Ok(true)
    }

    fn read_subsequent(&mut self) -> Result<bool, DecodeError> {
        let Some(dod) = self.read_delta_of_delta()? else {
            return Ok(false);
        };
        let delta = self.delta.wrapping_add(dod);
        let timestamp = self.timestamp.wrapping_add(delta);
        self.read_values()?;
        self.commit(delta, timestamp);
        Ok(true)
    }

    /// Publishes a fully decoded row.
    fn commit(&mut self, delta: i64, timestamp: i64) {
        self.delta = delta;
        self.timestamp = timestamp;
        std::mem::swap(&mut self.values, &mut self.pending);
    }

    /// Reads one bucket-coded delta-of-delta, or `None` at the end marker.
    fn read_delta_of_delta(&mut self) -> Result<Option<i64>, DecodeError> {
        // Every encoded row is followed by at least the trailer.
        if self.bits.size() < TRAILER_BITS {
            return Err(DecodeError::TruncatedBits {
                rows: self.rows,
                remaining: self.bits.size(),
            });
        }

        let width = match self.bits.read_run_length(BUCKET_PREFIX_MAX_BITS) {
            PREFIX_ZERO => return Ok(Some(0)),
            PREFIX_7 => 7,
            PREFIX_9 => 9,
            PREFIX_12 => 12,
            _ => ESCAPE_PAYLOAD_BITS,
        };
        let payload = self.bits.read(width);
        if width == ESCAPE_PAYLOAD_BITS && payload == END_OF_STREAM {
            return Ok(None);
        }
        Ok(Some(zigzag_decode(payload)))
    }

    fn read_values(&mut self) -> Result<(), DecodeError> {
        for i in 0..self.windows.len() {
            let head = self.read_byte()?;
            let v = if head < XOR_FLAG {
                self.window_entry(i, usize::from(head))?
            } else if head == RAW_ESCAPE {
                self.read_bytes(8)?
            } else {
                let offset = usize::from(head & OFFSET_MASK);
                let info = self.read_byte()?;
                let trail = u32::from(info >> 4);
                let len = usize::from(info & 0x0F);
                if len == 0 || len + trail as usize > 8 {
                    return Err(DecodeError::BadXorInfo {
                        row: self.rows,
                        column: i,
                        info,
                    });
                }
                let xor = self.read_bytes(len)? << (trail * 8);
                xor ^ self.window_entry(i, offset)?
            };
            self.windows[i].add(v);
            self.pending[i] = f64::from_bits(v);
        }
        Ok(())
    }

    fn window_entry(&self, column: usize, offset: usize) -> Result<u64, DecodeError> {
        let window = &self.windows[column];
        if offset < window.len() {
            Ok(window.at(offset))
        } else {
            Err(DecodeError::BadReference {
                row: self.rows,
                column,
                offset,
                len: window.len(),
            })
        }
    }

    #[inline]
    fn read_byte(&mut self) -> Result<u8, DecodeError> {
        let &b = self
            .bytes
            .get(self.cursor)
            .ok_or(DecodeError::TruncatedBytes {
                row: self.rows,
                offset: self.cursor,
            })?;
        self.cursor += 1;
        Ok(b)
    }

    /// Reads `n` bytes (at most 8) as a big-endian integer.
    fn read_bytes(&mut self, n: usize) -> Result<u64, DecodeError> {
        let mut v = 0u64;
        for _ in 0..n {
            v = (v << 8) | u64::from(self.read_byte()?);
        }
        Ok(v)
    }
}

impl Iterator for Decoder {
    type Item = Result<Row, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(true) => Some(Ok(self.row())),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Inverse of the encoder's zigzag mapping.
#[inline]
pub(crate) fn zigzag_decode(u: u64) -> i64 {
    ((u >> 1) as i64) ^ -((u & 1) as i64)
}
