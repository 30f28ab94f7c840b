use crate::constants::{ESCAPE_PREFIX, ESCAPE_PREFIX_BITS};

/// An ordered bit buffer backed by 64-bit words, packed MSB-first.
///
/// A `BitPacker` starts in write mode, where fields are appended at the
/// tail. [`close`](BitPacker::close) appends the stream trailer and freezes
/// it into read mode, where the same fields are consumed from the head in
/// the order they were written.
///
/// Misuse (writing after freezing, reading before it, reading past the end)
/// is a caller bug and panics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitPacker {
    words: Vec<u64>,
    /// Total number of bits stored.
    len_bits: u64,
    /// Read cursor, as an absolute bit index. Only meaningful once frozen.
    pos: u64,
    frozen: bool,
}

impl BitPacker {
    /// Creates an empty packer in write mode.
    pub fn new() -> Self {
        Self {
            words: Vec::new(),
            len_bits: 0,
            pos: 0,
            frozen: false,
        }
    }

    /// Creates an empty packer with room for `words` 64-bit words.
    pub fn with_capacity(words: usize) -> Self {
        Self {
            words: Vec::with_capacity(words),
            ..Self::new()
        }
    }

    /// Rebuilds a frozen packer from a serialized word array and the number
    /// of valid bits it holds. The read cursor starts at the first bit.
    pub fn from_words(words: Vec<u64>, len_bits: u64) -> Self {
        assert!(
            len_bits <= words.len() as u64 * 64,
            "bit length {len_bits} exceeds {} words",
            words.len()
        );
        Self {
            words,
            len_bits,
            pos: 0,
            frozen: true,
        }
    }

    /// Returns `true` once [`close`](BitPacker::close) has been called.
    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Remaining bits in read mode, total written bits in write mode.
    #[inline]
    pub fn size(&self) -> u64 {
        if self.frozen {
            self.len_bits - self.pos
        } else {
            self.len_bits
        }
    }

    /// Total number of bits stored, regardless of mode.
    #[inline]
    pub fn len_bits(&self) -> u64 {
        self.len_bits
    }

    /// The backing word array. The last word is left-aligned when the bit
    /// count is not a multiple of 64.
    #[inline]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Appends the low `width` bits of `bits`.
    ///
    /// # Panics
    ///
    /// Panics if the packer is frozen, if `width` is outside `1..=64`, or if
    /// `bits` has set bits at or above position `width`.
    pub fn append(&mut self, bits: u64, width: u32) {
        assert!(!self.frozen, "cannot append to a frozen bit packer");
        assert!((1..=64).contains(&width), "invalid field width {width}");
        assert!(
            width == 64 || bits >> width == 0,
            "value {bits:#x} does not fit in {width} bits"
        );

        let used = (self.len_bits % 64) as u32;
        if used == 0 {
            self.words.push(0);
        }
        let free = 64 - used;
        // A word is always present here.
        let tail = self.words.len() - 1;

        if width <= free {
            self.words[tail] |= bits << (free - width);
        } else {
            let spill = width - free;
            self.words[tail] |= bits >> spill;
            self.words.push(bits << (64 - spill));
        }
        self.len_bits += u64::from(width);
    }

    /// Appends the end-of-stream trailer and switches to read mode, with the
    /// cursor on the first bit.
    ///
    /// The trailer is the escape prefix, two all-ones words and a clear bit,
    /// so a decoder taking the escape branch sees an all-ones 32-bit payload
    /// whatever the alignment.
    pub fn close(&mut self) {
        self.append(ESCAPE_PREFIX, ESCAPE_PREFIX_BITS);
        self.append(u64::MAX, 64);
        self.append(u64::MAX, 64);
        self.append(0, 1);
        self.frozen = true;
        self.pos = 0;
    }

    /// Consumes the next `width` bits.
    ///
    /// # Panics
    ///
    /// Panics if the packer is not frozen, if `width` is outside `1..=64`,
    /// or if fewer than `width` bits remain.
    pub fn read(&mut self, width: u32) -> u64 {
        assert!(self.frozen, "cannot read from a bit packer in write mode");
        assert!((1..=64).contains(&width), "invalid field width {width}");
        assert!(
            u64::from(width) <= self.size(),
            "read of {width} bits with only {} remaining",
            self.size()
        );

        let idx = (self.pos / 64) as usize;
        let offset = (self.pos % 64) as u32;
        let avail = 64 - offset;

        let value = if width <= avail {
            (self.words[idx] << offset) >> (64 - width)
        } else {
            // Crosses into the next word; offset > 0 so avail < 64.
            let spill = width - avail;
            let head = self.words[idx] & ((1u64 << avail) - 1);
            let tail = self.words[idx + 1] >> (64 - spill);
            (head << spill) | tail
        };
        self.pos += u64::from(width);
        value
    }

    /// Reads single bits until a clear bit is seen or `max_bits` bits have
    /// been consumed, returning them accumulated MSB-first.
    ///
    /// This decodes the unary bucket prefix: `0`, `10`, `110`, `1110`, `1111`.
    pub fn read_run_length(&mut self, max_bits: u32) -> u64 {
        let mut bit = self.read(1);
        let mut result = bit;
        let mut left = max_bits - 1;
        while bit != 0 && left > 0 {
            bit = self.read(1);
            result = (result << 1) | bit;
            left -= 1;
        }
        result
    }
}

impl Default for BitPacker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::TRAILER_BITS;

    #[test]
    fn test_append_and_read_fields() {
        let mut bp = BitPacker::new();
        bp.append(0b1, 1);
        bp.append(0b0, 1);
        bp.append(0b11010, 5);
        bp.append(0xFF, 8);
        assert_eq!(bp.size(), 15);
        bp.close();

        assert_eq!(bp.read(1), 1);
        assert_eq!(bp.read(1), 0);
        assert_eq!(bp.read(5), 0b11010);
        assert_eq!(bp.read(8), 0xFF);
        assert_eq!(bp.size(), TRAILER_BITS);
    }

    #[test]
    fn test_64_bit_value() {
        let mut bp = BitPacker::new();
        let val: u64 = 0xDEAD_BEEF_CAFE_BABE;
        bp.append(val, 64);
        assert_eq!(bp.words(), &[val]);
        bp.close();
        assert_eq!(bp.read(64), val);
    }

    #[test]
    fn test_field_crossing_word_boundary() {
        let mut bp = BitPacker::new();
        bp.append(0x1F, 5);
        bp.append(0xDEAD_BEEF_CAFE_BABE, 64);
        bp.append(0x3, 2);
        assert_eq!(bp.words().len(), 2);
        bp.close();

        assert_eq!(bp.read(5), 0x1F);
        assert_eq!(bp.read(64), 0xDEAD_BEEF_CAFE_BABE);
        assert_eq!(bp.read(2), 0x3);
    }

    #[test]
    fn test_read_split_differently_than_written() {
        let mut bp = BitPacker::new();
        bp.append(0xABCD, 16);
        bp.close();
        assert_eq!(bp.read(4), 0xA);
        assert_eq!(bp.read(8), 0xBC);
        assert_eq!(bp.read(4), 0xD);
    }

    #[test]
    fn test_trailer_reads_as_escape_and_all_ones() {
        for lead in 0..64u32 {
            let mut bp = BitPacker::new();
            if lead > 0 {
                bp.append(0, lead);
            }
            bp.close();
            if lead > 0 {
                bp.read(lead);
            }
            assert_eq!(bp.read_run_length(4), 0b1111);
            assert_eq!(bp.read(32), 0xFFFF_FFFF);
        }
    }

    #[test]
    fn test_size_tracks_mode() {
        let mut bp = BitPacker::new();
        bp.append(0x7, 3);
        assert_eq!(bp.size(), 3);
        bp.close();
        assert_eq!(bp.size(), 3 + TRAILER_BITS);
        bp.read(3);
        assert_eq!(bp.size(), TRAILER_BITS);
        assert_eq!(bp.len_bits(), 3 + TRAILER_BITS);
    }

    #[test]
    fn test_read_run_length() {
        let mut bp = BitPacker::new();
        bp.append(0b0, 1);
        bp.append(0b10, 2);
        bp.append(0b110, 3);
        bp.append(0b1110, 4);
        bp.append(0b1111, 4);
        bp.close();
        assert_eq!(bp.read_run_length(4), 0b0);
        assert_eq!(bp.read_run_length(4), 0b10);
        assert_eq!(bp.read_run_length(4), 0b110);
        assert_eq!(bp.read_run_length(4), 0b1110);
        assert_eq!(bp.read_run_length(4), 0b1111);
    }

    #[test]
    fn test_from_words() {
        let mut bp = BitPacker::new();
        bp.append(0x2A, 7);
        bp.append(0x1234_5678, 32);
        bp.close();

        let mut copy = BitPacker::from_words(bp.words().to_vec(), bp.len_bits());
        assert!(copy.is_frozen());
        assert_eq!(copy.read(7), 0x2A);
        assert_eq!(copy.read(32), 0x1234_5678);
    }

    #[test]
    #[should_panic(expected = "does not fit")]
    fn test_append_rejects_wide_value() {
        let mut bp = BitPacker::new();
        bp.append(0b100, 2);
    }

    #[test]
    #[should_panic(expected = "frozen")]
    fn test_append_after_close_panics() {
        let mut bp = BitPacker::new();
        bp.close();
        bp.append(1, 1);
    }

    #[test]
    #[should_panic(expected = "write mode")]
    fn test_read_before_close_panics() {
        let mut bp = BitPacker::new();
        bp.append(1, 1);
        bp.read(1);
    }

    #[test]
    #[should_panic(expected = "remaining")]
    fn test_read_past_end_panics() {
        let mut bp = BitPacker::from_words(vec![0], 10);
        bp.read(11);
    }
}
