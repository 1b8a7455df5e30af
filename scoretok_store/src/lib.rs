// scoretok_store — append-only record files of 16-bit integers.
//
// Every corpus artifact that holds token ids (the raw ingest output and the
// BPE-compressed rewrite) is stored in this format: a flat sequence of
// unsigned 16-bit big-endian integers with no header or footer. Any element
// index is a valid read boundary, so readers address the file by element
// offset rather than byte offset.
//
// Module overview:
// - `record.rs`:   Free functions over a path — append, full/bounded/exact
//                  reads, random windows, sentinel-seeking scans, counting.
// - `segments.rs`: `DocumentSegments`, a sequential iterator that carves a
//                  store into per-document runs by repeated sentinel scans.
// - `appender.rs`: `SharedAppender`, the single coordinator that serializes
//                  appends from parallel workers behind one mutex.
// - `error.rs`:    `StoreError` (encoding, short reads, IO).
//
// Design decisions:
// - **Values are `u32` at the API surface.** Token ids are `u32` throughout
//   the workspace; narrowing to `u16` happens only here, so an out-of-range
//   id surfaces as `StoreError::Encoding` instead of silent truncation.
// - **Encode before open.** A batch is fully encoded before the file is
//   touched, so a bad value never leaves a partial write behind.
// - **Element-aligned sentinel search.** Scans decode each buffer into ints
//   before searching, so a sentinel can never be matched at an odd byte offset
//   or missed across a buffer boundary.

pub mod appender;
pub mod error;
pub mod record;
pub mod segments;

pub use appender::{AppendStats, SharedAppender};
pub use error::{Result, StoreError};
pub use record::{
    INT_SIZE, SentinelScan, append_ints, count_ints, decode_ints, encode_ints, read_all_ints,
    read_exact_ints, read_random_ints, read_until_sentinel, read_up_to_ints,
};
pub use segments::DocumentSegments;
