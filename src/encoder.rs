use log::debug;

use crate::artifact::CompressedArtifact;
use crate::bitpacker::BitPacker;
use crate::constants::*;
use crate::window::{shared_zero_bytes, HistoryWindow};

/// One row of a columnar time series: an integer timestamp and one `f64`
/// per column.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub timestamp: i64,
    pub values: Vec<f64>,
}

impl Row {
    /// Creates a new `Row`.
    pub fn new(timestamp: i64, values: Vec<f64>) -> Self {
        Self { timestamp, values }
    }

    /// Compares two rows bit-for-bit, treating any two NaNs as equal.
    pub fn same_bits(&self, other: &Row) -> bool {
        self.timestamp == other.timestamp
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(a, b)| value_bits(*a) == value_bits(*b))
    }
}

/// The multi-column compressor.
///
/// - **Timestamps** go into a [`BitPacker`] as delta-of-delta prefix codes.
/// - **Values** go into a byte buffer, each one either a back-reference into
///   its column's [`HistoryWindow`], a truncated XOR against the most similar
///   window entry, or a verbatim escape.
///
/// # Example
/// ```
/// use xorwin::Encoder;
///
/// let mut encoder = Encoder::new(1_000);
/// encoder.add_row(1_000, &[1.5, 20.0]);
/// encoder.add_row(1_060, &[1.5, 20.5]);
/// encoder.finish();
///
/// let artifact = encoder.into_artifact();
/// assert_eq!(artifact.columns, 2);
/// ```
#[derive(Debug)]
pub struct Encoder {
    bits: BitPacker,
    bytes: Vec<u8>,
    /// One window per column, allocated on the first row.
    windows: Vec<HistoryWindow>,
    anchor: i64,
    last_timestamp: i64,
    last_delta: i64,
    /// Number of rows encoded so far.
    rows: u64,
    finished: bool,
}

impl Encoder {
    /// Creates an encoder whose first row is stored relative to `anchor`.
    pub fn new(anchor: i64) -> Self {
        Self::with_capacity(anchor, 0)
    }

    /// Creates an encoder with `byte_capacity` bytes pre-allocated for the
    /// value buffer.
    pub fn with_capacity(anchor: i64, byte_capacity: usize) -> Self {
        let mut bits = BitPacker::with_capacity(byte_capacity / 32 + 4);
        bits.append(anchor as u64, ANCHOR_BITS);
        Self {
            bits,
            bytes: Vec::with_capacity(byte_capacity),
            windows: Vec::new(),
            anchor,
            last_timestamp: anchor,
            last_delta: 0,
            rows: 0,
            finished: false,
        }
    }

    /// Encodes one row.
    ///
    /// Every row must have as many values as the first one. The first row's
    /// timestamp must lie within a signed 32-bit distance of the anchor
    /// (excluding -1, which marks the end of the stream). Likewise a
    /// delta-of-delta of `i32::MIN` cannot be stored.
    ///
    /// # Panics
    ///
    /// Panics after [`finish`](Encoder::finish) or on a column count mismatch.
    pub fn add_row(&mut self, timestamp: i64, values: &[f64]) {
        assert!(!self.finished, "cannot add rows after finish()");

        if self.rows == 0 {
            self.write_first(timestamp, values);
        } else {
            assert_eq!(
                values.len(),
                self.windows.len(),
                "row {} has {} columns, stream has {}",
                self.rows,
                values.len(),
                self.windows.len()
            );
            self.write_timestamp(timestamp);
            self.write_values(values);
        }
        self.rows += 1;
    }

    /// Appends the end-of-stream trailer. Calling it twice is a no-op.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.bits.close();
        self.finished = true;
        debug!(
            "encoder finished: {} rows x {} columns, {} timestamp bits, {} value bytes",
            self.rows,
            self.windows.len(),
            self.bits.len_bits(),
            self.bytes.len()
        );
    }

    /// Returns `true` once [`finish`](Encoder::finish) has been called.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Read-only view of the timestamp bits and the value bytes.
    pub fn export(&self) -> (&BitPacker, &[u8]) {
        (&self.bits, &self.bytes)
    }

    /// Finishes the stream if needed and hands over its buffers.
    pub fn into_artifact(mut self) -> CompressedArtifact {
        self.finish();
        CompressedArtifact {
            columns: self.windows.len(),
            rows: self.rows,
            bits: self.bits,
            bytes: self.bytes,
        }
    }

    /// Total compressed size in bits: timestamp bits plus value bytes.
    pub fn compressed_bit_size(&self) -> u64 {
        self.bits.len_bits() + 8 * self.bytes.len() as u64
    }

    /// Returns the number of rows encoded so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Number of columns, fixed by the first row (0 before it).
    pub fn columns(&self) -> usize {
        self.windows.len()
    }

    /// The anchor timestamp this stream was opened with.
    pub fn anchor(&self) -> i64 {
        self.anchor
    }

    // ── internal helpers ───────────────────────────────────────────────

    fn write_first(&mut self, timestamp: i64, values: &[f64]) {
        self.windows = vec![HistoryWindow::new(); values.len()];

        let delta = timestamp.wrapping_sub(self.anchor);
        debug_assert!(
            i32::try_from(delta).is_ok() && delta != -1,
            "first delta {delta} out of range"
        );
        self.bits.append(u64::from(delta as u32), FIRST_DELTA_BITS);

        for (window, &v) in self.windows.iter_mut().zip(values) {
            let raw = value_bits(v);
            self.bytes.extend_from_slice(&raw.to_be_bytes());
            window.add(raw);
        }

        self.last_delta = delta;
        self.last_timestamp = timestamp;
    }

    /// Encodes a delta-of-delta with the zigzag bucket scheme:
    ///
    /// | dod == 0          | `0`                  | 1 bit   |
    /// | zigzag len 1..=7  | `10` + 7 bits        | 9 bits  |
    /// | zigzag len 8..=9  | `110` + 9 bits       | 12 bits |
    /// | zigzag len 10..=12| `1110` + 12 bits     | 16 bits |
    /// | otherwise         | `1111` + 32 bits     | 36 bits |
    fn write_timestamp(&mut self, timestamp: i64) {
        let delta = timestamp.wrapping_sub(self.last_timestamp);
        let dod = delta.wrapping_sub(self.last_delta);

        if dod == 0 {
            self.bits.append(0, 1);
        } else {
            let u = zigzag_encode(dod);
            match 64 - u.leading_zeros() {
                1..=7 => self.bits.append(u | BUCKET_7_MASK, BUCKET_7_WIDTH),
                8..=9 => self.bits.append(u | BUCKET_9_MASK, BUCKET_9_WIDTH),
                10..=12 => self.bits.append(u | BUCKET_12_MASK, BUCKET_12_WIDTH),
                _ => {
                    debug_assert!(
                        u64::from(u as u32) != END_OF_STREAM,
                        "delta-of-delta {dod} collides with the end-of-stream marker"
                    );
                    self.bits.append(ESCAPE_PREFIX, ESCAPE_PREFIX_BITS);
                    self.bits.append(u64::from(u as u32), ESCAPE_PAYLOAD_BITS);
                }
            }
        }

        self.last_delta = delta;
        self.last_timestamp = timestamp;
    }

    /// Windowed XOR compression, one column at a time:
    ///
    /// 1. Exact hit in the window: one byte holding the offset.
    /// 2. A window entry shares at least two zero bytes of XOR:
    ///    `offset | 0x80`, then `(trailing bytes << 4) | length`, then the
    ///    significant XOR bytes.
    /// 3. Otherwise: `0xFF` followed by the raw 8 bytes.
    fn write_values(&mut self, values: &[f64]) {
        for (window, &v) in self.windows.iter_mut().zip(values) {
            let raw = value_bits(v);

            if let Some(offset) = window.contains(raw) {
                self.bytes.push(offset as u8);
            } else {
                let (offset, candidate) = window.best_candidate(raw);
                let xor = candidate ^ raw;

                if shared_zero_bytes(xor) > 1 {
                    let lead = xor.leading_zeros() / 8;
                    let trail = xor.trailing_zeros() / 8;
                    let len = 8 - lead - trail;

                    self.bytes.push(offset as u8 | XOR_FLAG);
                    self.bytes.push(((trail << 4) | len) as u8);
                    let significant = (xor >> (trail * 8)).to_be_bytes();
                    self.bytes
                        .extend_from_slice(&significant[(8 - len) as usize..]);
                } else {
                    self.bytes.push(RAW_ESCAPE);
                    self.bytes.extend_from_slice(&raw.to_be_bytes());
                }
            }

            window.add(raw);
        }
    }
}

/// Raw bits of `v`, with every NaN collapsed to one canonical pattern.
#[inline]
pub fn value_bits(v: f64) -> u64 {
    if v.is_nan() {
        NAN_SENTINEL
    } else {
        v.to_bits()
    }
}

/// Maps signed to unsigned so small magnitudes of either sign stay small.
#[inline]
pub(crate) fn zigzag_encode(v: i64) -> u64 {
    ((v >> 63) ^ (v << 1)) as u64
}
