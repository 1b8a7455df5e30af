// Per-document iteration over a record file.
//
// A corpus store is a concatenation of documents, each terminated by the
// document-end sentinel. `DocumentSegments` walks the file front to back with
// repeated `read_until_sentinel` calls, yielding the ints between sentinels.
// The sentinel itself is never part of a yielded segment. Empty segments
// (two adjacent sentinels, or a sentinel at offset 0) are skipped, and a
// non-empty tail after the last sentinel is yielded as a final segment.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::record::read_until_sentinel;

/// Sequential iterator over the sentinel-delimited documents of a store.
///
/// Each item is a `Result` because every step performs file IO. After an
/// error the iterator is fused and yields `None`.
#[derive(Debug)]
pub struct DocumentSegments {
    path: PathBuf,
    sentinel: u32,
    offset: u64,
    done: bool,
}

impl DocumentSegments {
    pub fn new(path: &Path, sentinel: u32) -> Self {
        Self {
            path: path.to_path_buf(),
            sentinel,
            offset: 0,
            done: false,
        }
    }

    /// Element offset of the next unread int.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl Iterator for DocumentSegments {
    type Item = Result<Vec<u32>>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let scan = match read_until_sentinel(&self.path, self.sentinel, self.offset) {
                Ok(scan) => scan,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            match scan.sentinel_index {
                Some(index) => self.offset = index + 1,
                None => self.done = true,
            }
            if !scan.ints.is_empty() {
                return Some(Ok(scan.ints));
            }
        }
        None
    }
}
