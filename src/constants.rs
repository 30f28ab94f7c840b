//! Format constants shared by the encoder and decoder.
//!
//! Changing any of these changes the wire format.

/// Number of past values remembered per column. Offsets into the window fit
/// in the low seven bits of a header byte.
pub const WINDOW_CAPACITY: usize = 127;

/// Canonical bit pattern stored for every NaN, whatever its payload.
pub const NAN_SENTINEL: u64 = 0x7FF8_0000_0000_0000;

/// Width of the raw anchor timestamp at the head of the bit stream.
pub const ANCHOR_BITS: u32 = 64;

/// Width of the first row's delta from the anchor.
pub const FIRST_DELTA_BITS: u32 = 32;

/// Value of a 32-bit field that marks the end of the stream, both for the
/// first-row delta and for the escape bucket payload.
pub const END_OF_STREAM: u64 = 0xFFFF_FFFF;

// ── Timestamp buckets ──────────────────────────────────────────────────

/// Longest prefix read when selecting a delta-of-delta bucket.
pub const BUCKET_PREFIX_MAX_BITS: u32 = 4;

/// `10` prefix followed by a 7-bit payload, pre-shifted into position.
pub const BUCKET_7_MASK: u64 = 0b10 << 7;
/// Total width of the 7-bit bucket, prefix included.
pub const BUCKET_7_WIDTH: u32 = 9;

/// `110` prefix followed by a 9-bit payload.
pub const BUCKET_9_MASK: u64 = 0b110 << 9;
pub const BUCKET_9_WIDTH: u32 = 12;

/// `1110` prefix followed by a 12-bit payload.
pub const BUCKET_12_MASK: u64 = 0b1110 << 12;
pub const BUCKET_12_WIDTH: u32 = 16;

/// `1111` prefix, written on its own ahead of a 32-bit payload.
pub const ESCAPE_PREFIX: u64 = 0b1111;
pub const ESCAPE_PREFIX_BITS: u32 = 4;
pub const ESCAPE_PAYLOAD_BITS: u32 = 32;

/// Prefix values as accumulated by `BitPacker::read_run_length(4)`.
pub const PREFIX_ZERO: u64 = 0b0;
pub const PREFIX_7: u64 = 0b10;
pub const PREFIX_9: u64 = 0b110;
pub const PREFIX_12: u64 = 0b1110;

// ── Stream trailer ─────────────────────────────────────────────────────

/// Bits appended by `BitPacker::close`: the escape prefix, two all-ones
/// words and a single clear bit.
pub const TRAILER_BITS: u64 = ESCAPE_PREFIX_BITS as u64 + 64 + 64 + 1;

// ── Value header bytes ─────────────────────────────────────────────────

/// Set on a header byte when the value is an XOR against a window entry.
pub const XOR_FLAG: u8 = 0x80;

/// Header byte for a value stored verbatim.
pub const RAW_ESCAPE: u8 = 0xFF;

/// Mask extracting the window offset from an XOR header byte.
pub const OFFSET_MASK: u8 = 0x7F;
