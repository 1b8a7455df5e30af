// Record file primitives.
//
// A record file is nothing but 2-byte big-endian unsigned integers laid end
// to end. All offsets and counts in this module are in elements, not bytes:
// `offset = 3` skips the first three integers.
//
// Reads come in three flavors that differ only in how they treat a short
// file: `read_exact_ints` fails with `InsufficientData`, `read_up_to_ints`
// returns whatever is left, and `read_until_sentinel` stops at a marker value
// instead of a count. The latter reads in fixed 4096-byte buffers so that a
// multi-gigabyte corpus can be walked one document at a time.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use rand::Rng;

use crate::error::{Result, StoreError};

/// Size of one stored integer in bytes.
pub const INT_SIZE: u64 = 2;

/// Buffer size used by `read_until_sentinel`. Must stay a multiple of
/// `INT_SIZE` so buffers always end on an element boundary.
const SCAN_CHUNK_BYTES: usize = 4096;

/// Result of a sentinel-seeking scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelScan {
    /// Every int between the starting offset and the sentinel (exclusive), or
    /// every remaining int when the sentinel was not found.
    pub ints: Vec<u32>,
    /// Absolute element index of the sentinel, `None` if the scan hit EOF.
    pub sentinel_index: Option<u64>,
}

/// Encode a batch of values into their on-disk bytes.
///
/// Fails on the first value that does not fit in 16 bits; nothing is
/// returned for the values before it.
pub fn encode_ints(ints: &[u32]) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(ints.len() * INT_SIZE as usize);
    for (index, &value) in ints.iter().enumerate() {
        let narrow = u16::try_from(value).map_err(|_| StoreError::Encoding { value, index })?;
        bytes.extend_from_slice(&narrow.to_be_bytes());
    }
    Ok(bytes)
}

/// Decode on-disk bytes into values. A trailing odd byte is ignored.
pub fn decode_ints(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(INT_SIZE as usize)
        .map(|pair| u32::from(u16::from_be_bytes([pair[0], pair[1]])))
        .collect()
}

/// Append `ints` to the file at `path`, creating it and its parent
/// directories if needed.
pub fn append_ints(path: &Path, ints: &[u32]) -> Result<()> {
    let bytes = encode_ints(ints)?;
    append_encoded(path, &bytes)
}

/// Append already-encoded bytes. Shared with `SharedAppender`, which encodes
/// outside its lock.
pub(crate) fn append_encoded(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(bytes)?;
    Ok(())
}

/// Read the whole file.
pub fn read_all_ints(path: &Path) -> Result<Vec<u32>> {
    let bytes = fs::read(path)?;
    Ok(decode_ints(&bytes))
}

/// Read exactly `n` ints starting at element `offset`.
///
/// Returns `InsufficientData` if fewer than `n` ints remain.
pub fn read_exact_ints(path: &Path, n: usize, offset: u64) -> Result<Vec<u32>> {
    let bytes = read_window(path, n, offset)?;
    let available = bytes.len() as u64 / INT_SIZE;
    if available < n as u64 {
        return Err(StoreError::InsufficientData {
            requested: n,
            offset,
            available,
        });
    }
    Ok(decode_ints(&bytes))
}

/// Read up to `n` ints starting at element `offset`. Never fails on a short
/// file; an offset past the end yields an empty vector.
pub fn read_up_to_ints(path: &Path, n: usize, offset: u64) -> Result<Vec<u32>> {
    let bytes = read_window(path, n, offset)?;
    Ok(decode_ints(&bytes))
}

/// Read `n` ints from a uniformly random offset in `[0, end - n]`.
///
/// `end` bounds the window (defaults to the file length in ints), which lets
/// callers sample from a prefix such as a training split.
pub fn read_random_ints<R: Rng + ?Sized>(
    path: &Path,
    n: usize,
    end: Option<u64>,
    rng: &mut R,
) -> Result<Vec<u32>> {
    let end = match end {
        Some(end) => end,
        None => count_ints(path)?,
    };
    let wanted = n as u64;
    if wanted > end {
        return Err(StoreError::InsufficientData {
            requested: n,
            offset: 0,
            available: end,
        });
    }
    let offset = rng.random_range(0..=end - wanted);
    read_exact_ints(path, n, offset)
}

/// Scan forward from `offset` until `sentinel` is found.
///
/// Returns the ints before the sentinel and the sentinel's absolute element
/// index, or every remaining int and `None` when the file ends first.
pub fn read_until_sentinel(path: &Path, sentinel: u32, offset: u64) -> Result<SentinelScan> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset * INT_SIZE))?;

    let mut ints = Vec::new();
    let mut index = offset;
    let mut buf = vec![0u8; SCAN_CHUNK_BYTES];

    loop {
        let filled = fill_buffer(&mut file, &mut buf)?;
        let chunk = decode_ints(&buf[..filled]);

        if let Some(pos) = chunk.iter().position(|&value| value == sentinel) {
            ints.extend_from_slice(&chunk[..pos]);
            return Ok(SentinelScan {
                ints,
                sentinel_index: Some(index + pos as u64),
            });
        }

        ints.extend_from_slice(&chunk);
        index += chunk.len() as u64;

        if filled < buf.len() {
            break;
        }
    }

    Ok(SentinelScan {
        ints,
        sentinel_index: None,
    })
}

/// Number of ints in the file (`size_in_bytes / 2`).
pub fn count_ints(path: &Path) -> Result<u64> {
    Ok(fs::metadata(path)?.len() / INT_SIZE)
}

/// Read at most `n` ints worth of bytes starting at element `offset`.
fn read_window(path: &Path, n: usize, offset: u64) -> Result<Vec<u8>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset * INT_SIZE))?;
    let mut bytes = Vec::with_capacity(n.saturating_mul(INT_SIZE as usize).min(1 << 20));
    file.take(n as u64 * INT_SIZE).read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Fill `buf` from `reader`, stopping early only at EOF. Returns the number
/// of bytes read.
fn fill_buffer<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let read = reader.read(&mut buf[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}
