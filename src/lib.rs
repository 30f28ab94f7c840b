//! # xorwin
//!
//! Lossless compression for columnar time series: rows of one integer
//! timestamp and a fixed number of `f64` values.
//!
//! ## Algorithm overview
//!
//! - **Timestamps** are stored as *delta-of-delta* values. The second
//!   difference is zigzag-mapped and written with a unary bucket prefix
//!   (`0`, `10`, `110`, `1110`, `1111`), so regularly sampled series cost a
//!   single bit per row.
//!
//! - **Values** are compared against a per-column history of the last 127
//!   values. An exact repeat is written as a one-byte back-reference. A
//!   near match is XORed against the most similar entry and only the
//!   non-zero middle bytes are kept. Anything else is stored verbatim.
//!
//! Timestamps go into a bit-packed word stream, values into a byte stream.
//! Both, together with the column count, form a [`CompressedArtifact`].
//!
//! ## Example
//!
//! ```rust
//! use xorwin::{Decoder, Encoder, Row};
//!
//! // Compress
//! let mut encoder = Encoder::new(1_000);
//! encoder.add_row(1_000, &[1.5, f64::NAN]);
//! encoder.add_row(1_001, &[1.5, 2.5]);
//! encoder.add_row(1_002, &[1.5, 2.5]);
//! encoder.finish();
//! println!("{} bits", encoder.compressed_bit_size());
//!
//! let artifact = encoder.into_artifact();
//!
//! // Decompress
//! let rows = Decoder::decode_all(&artifact).unwrap();
//! assert_eq!(rows.len(), 3);
//! assert!(rows[0].values[1].is_nan());
//! assert_eq!(rows[2], Row::new(1_002, vec![1.5, 2.5]));
//! ```
//!
//! ## Lazy iteration
//!
//! `Decoder` is an iterator over decoded rows, so large artifacts can be
//! walked without collecting them. Truncated or corrupt input surfaces as a
//! [`DecodeError`] item, after which the iterator ends:
//!
//! ```rust
//! # use xorwin::{Decoder, Encoder};
//! # let mut encoder = Encoder::new(0);
//! # encoder.add_row(0, &[12.0]);
//! # encoder.add_row(60, &[12.5]);
//! # let artifact = encoder.into_artifact();
//! for row in Decoder::from_artifact(artifact) {
//!     let row = row?;
//!     println!("{}: {:?}", row.timestamp, row.values);
//! }
//! # Ok::<(), xorwin::DecodeError>(())
//! ```

pub mod artifact;
pub mod bitpacker;
pub mod constants;
pub mod decoder;
pub mod encoder;
pub mod ingest;
pub mod window;

// Re-export primary types at the crate root.
pub use artifact::{ArtifactError, CompressedArtifact};
pub use bitpacker::BitPacker;
pub use decoder::{DecodeError, Decoder};
pub use encoder::{value_bits, Encoder, Row};
pub use ingest::{load_csv, IngestError, Table};
pub use window::HistoryWindow;
