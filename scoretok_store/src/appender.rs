// Serialized appends from parallel workers.
//
// During the BPE rewrite many worker threads each produce a complete
// compressed document and need to land it in one output store. A document
// must be written as a single contiguous run: interleaving two workers'
// bytes would corrupt both documents. `SharedAppender` is the one place that
// touches the output file while workers are running.
//
// Encoding happens before the lock is taken, so the critical section is
// only the open + write. Order between documents is whatever order workers
// reach the lock in; callers that need a deterministic order must enforce it
// themselves.
//
// A poisoned mutex (a worker panicked while holding it) is recovered rather
// than propagated. The write inside the lock either finished or returned an
// IO error before the panic, so the file is still consistent at a document
// boundary.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use log::warn;

use crate::error::Result;
use crate::record::{INT_SIZE, append_encoded, encode_ints};

/// Running totals of what has been appended through a `SharedAppender`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendStats {
    /// Number of successful `append` calls.
    pub batches: u64,
    /// Total ints written.
    pub ints: u64,
}

/// Mutex-guarded writer for one record file, safe to share across threads.
#[derive(Debug)]
pub struct SharedAppender {
    path: PathBuf,
    stats: Mutex<AppendStats>,
}

impl SharedAppender {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            stats: Mutex::new(AppendStats::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one batch as a contiguous run.
    pub fn append(&self, ints: &[u32]) -> Result<()> {
        let bytes = encode_ints(ints)?;
        let mut stats = self.stats.lock().unwrap_or_else(|poisoned| {
            warn!("recovering append lock for {}", self.path.display());
            poisoned.into_inner()
        });
        append_encoded(&self.path, &bytes)?;
        stats.batches += 1;
        stats.ints += bytes.len() as u64 / INT_SIZE;
        Ok(())
    }

    /// Snapshot of the totals so far.
    pub fn stats(&self) -> AppendStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::read_all_ints;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn concurrent_batches_stay_contiguous() {
        let dir = tempfile::tempdir().unwrap();
        let appender = Arc::new(SharedAppender::new(&dir.path().join("out.bin")));

        let handles: Vec<_> = (0..8u32)
            .map(|worker| {
                let appender = Arc::clone(&appender);
                thread::spawn(move || {
                    for _ in 0..25 {
                        // Each batch is worker id repeated, closed by 999.
                        let mut batch = vec![worker; 50];
                        batch.push(999);
                        appender.append(&batch).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let ints = read_all_ints(appender.path()).unwrap();
        assert_eq!(ints.len(), 8 * 25 * 51);
        for batch in ints.chunks(51) {
            assert_eq!(batch[50], 999);
            assert!(batch[..50].iter().all(|&v| v == batch[0]));
        }
        assert_eq!(
            appender.stats(),
            AppendStats {
                batches: 200,
                ints: 200 * 51
            }
        );
    }

    #[test]
    fn failed_encoding_leaves_file_and_stats_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let appender = SharedAppender::new(&dir.path().join("out.bin"));
        appender.append(&[1, 2]).unwrap();
        assert!(appender.append(&[3, 70_000]).is_err());
        assert_eq!(read_all_ints(appender.path()).unwrap(), vec![1, 2]);
        assert_eq!(appender.stats().batches, 1);
    }
}
