// BPE engine — vocabulary growth and the parallel corpus rewrite.
//
// Two phases, run back to back by `run_bpe`:
//
// 1. **Growth** (`grow_vocabulary`), single-threaded over an in-memory window
//    of at most `token_budget` ints read from the front of the raw store. Each
//    round counts adjacent pairs, picks the most frequent, records
//    `(pair → next_id)`, and rewrites the window in place.
// 2. **Rewrite** (`rewrite_corpus`), parallel over the whole raw store. One
//    scanner carves the store into documents; workers apply the finished
//    merge list to each document and append it, sentinel-terminated, through
//    a `SharedAppender`.
//
// Counting rules that the merge list depends on bit for bit:
//
// - Pairs touching the sentinel are never counted, and skipping them does not
//   advance the dedup history.
// - A pair equal to the previous pair is skipped unless the pair before that
//   was also equal. In a run `a a a a` the pair `(a, a)` counts twice, matching
//   the two non-overlapping merges the run actually yields.
// - The winner is the first pair whose running count strictly exceeds the
//   best so far. Ties therefore go to the pair that reached the count first in
//   scan order, not to the lexicographically smaller pair.
//
// Growth ends early when the best count is 1 (nothing repeats, so merging
// cannot shorten the corpus) or when no countable pair is left.
//
// The rewrite does not preserve document order when `parallelism > 1`.
// Documents that were appended before a failure stay on disk; `run_bpe`
// refuses to start against a destination that already holds data so a rerun
// never mixes passes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info, warn};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use scoretok_store::{DocumentSegments, SharedAppender, count_ints, read_up_to_ints};

use crate::encoder::MergeEncoder;
use crate::error::{Error, Result};
use crate::merge_tree::MergeTree;
use crate::types::{MAX_VOCAB_SIZE, Merge, TokenId, TokenPair};
use crate::vocab::BaseVocab;

/// Default growth window: 2³¹ ints (8 GiB in memory as `u32`).
pub const DEFAULT_TOKEN_BUDGET: usize = 1 << 31;

/// Options for one BPE run.
#[derive(Clone, Debug)]
pub struct BpeOptions {
    /// Raw record store to read.
    pub source: PathBuf,
    /// Compressed record store to write. Must be absent or empty.
    pub destination: PathBuf,
    /// Maximum number of ints loaded for growth.
    pub token_budget: usize,
    /// Desired vocabulary size including base tokens. At most 65536.
    pub target_vocab_size: usize,
    /// Worker count for the rewrite. `1` rewrites sequentially, in order.
    pub parallelism: usize,
    pub show_progress: bool,
}

impl BpeOptions {
    pub fn new(source: &Path, destination: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            token_budget: DEFAULT_TOKEN_BUDGET,
            target_vocab_size: MAX_VOCAB_SIZE,
            parallelism: std::thread::available_parallelism().map_or(1, |n| n.get()),
            show_progress: false,
        }
    }
}

/// Why growth stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The vocabulary reached the target size.
    TargetReached,
    /// The most frequent pair occurs only once.
    NoRepeatedPair,
    /// The window has no pair that may be counted.
    NoCountablePair,
}

/// Output of `grow_vocabulary`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Growth {
    /// Merges in creation order; ids are contiguous from the base size.
    pub merges: Vec<Merge>,
    pub stop_reason: StopReason,
    /// Length of the window after the last merge.
    pub final_len: usize,
}

/// Totals reported by `rewrite_corpus`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RewriteStats {
    /// Documents appended, sentinel included in each.
    pub documents: u64,
    /// Ints read from the source store.
    pub ints_in: u64,
    /// Ints written to the destination store.
    pub ints_out: u64,
}

// ---------------------------------------------------------------------------
// Growth
// ---------------------------------------------------------------------------

/// Find the pair to merge next: `(pair, count)` of the first pair to reach
/// the highest count, or `None` if no pair can be counted.
pub fn most_frequent_pair(seq: &[TokenId], sentinel: TokenId) -> Option<(TokenPair, u32)> {
    let mut counts: FxHashMap<TokenPair, u32> = FxHashMap::default();
    let mut best: Option<(TokenPair, u32)> = None;
    let mut prev: Option<TokenPair> = None;
    let mut prev_prev: Option<TokenPair> = None;

    for window in seq.windows(2) {
        let pair = (window[0], window[1]);
        if pair.0 == sentinel || pair.1 == sentinel {
            continue;
        }

        let repeat = prev == Some(pair) && prev_prev != Some(pair);
        prev_prev = prev;
        prev = Some(pair);
        if repeat {
            continue;
        }

        let count = counts.entry(pair).or_insert(0);
        *count += 1;
        if best.is_none_or(|(_, top)| *count > top) {
            best = Some((pair, *count));
        }
    }
    best
}

/// Replace every non-overlapping left-to-right occurrence of `pair` with `id`.
pub fn apply_merge(seq: &[TokenId], pair: TokenPair, id: TokenId) -> Vec<TokenId> {
    let mut out = Vec::with_capacity(seq.len());
    let mut i = 0;
    while i < seq.len() {
        if i + 1 < seq.len() && seq[i] == pair.0 && seq[i + 1] == pair.1 {
            out.push(id);
            i += 2;
        } else {
            out.push(seq[i]);
            i += 1;
        }
    }
    out
}

/// Grow a merge list over `window` until the vocabulary holds
/// `target_vocab_size` ids or nothing repeats.
pub fn grow_vocabulary(
    window: Vec<TokenId>,
    base_size: usize,
    sentinel: TokenId,
    target_vocab_size: usize,
    progress: &ProgressBar,
) -> Growth {
    let wanted = target_vocab_size.saturating_sub(base_size);
    info!(
        "growing vocabulary: base size {base_size}, target {target_vocab_size}, \
         {wanted} merges wanted over {} ints",
        window.len()
    );

    let mut seq = window;
    let mut merges = Vec::with_capacity(wanted);
    let mut stop_reason = StopReason::TargetReached;

    for round in 0..wanted {
        let Some((pair, count)) = most_frequent_pair(&seq, sentinel) else {
            stop_reason = StopReason::NoCountablePair;
            break;
        };
        if count <= 1 {
            stop_reason = StopReason::NoRepeatedPair;
            break;
        }

        let id = (base_size + round) as TokenId;
        seq = apply_merge(&seq, pair, id);
        merges.push((pair, id));
        progress.inc(1);
        debug!("merge {pair:?} -> {id} (count {count}, window now {})", seq.len());
    }

    match stop_reason {
        StopReason::TargetReached => info!("reached target size with {} merges", merges.len()),
        _ => info!(
            "no more pairs to merge ({stop_reason:?}); stopping at {} ids",
            base_size + merges.len()
        ),
    }

    Growth {
        merges,
        stop_reason,
        final_len: seq.len(),
    }
}

// ---------------------------------------------------------------------------
// Rewrite
// ---------------------------------------------------------------------------

/// Rewrite every document of `source` with `merges` and append the results to
/// `destination`.
///
/// Returns the first task error encountered; documents written before it
/// remain in the destination.
pub fn rewrite_corpus(
    source: &Path,
    destination: &Path,
    merges: &[Merge],
    sentinel: TokenId,
    parallelism: usize,
    progress: &ProgressBar,
) -> Result<RewriteStats> {
    let encoder = MergeEncoder::new(merges);
    let appender = SharedAppender::new(destination);
    let mut segments = DocumentSegments::new(source, sentinel);

    let task = |segment: scoretok_store::Result<Vec<TokenId>>| -> Result<()> {
        let doc = segment?;
        let mut compressed = encoder.encode(&doc);
        compressed.push(sentinel);
        appender.append(&compressed)?;
        progress.inc(doc.len() as u64 + 1);
        Ok(())
    };

    info!(
        "rewriting {} with {} merges on {parallelism} worker(s)",
        source.display(),
        encoder.len()
    );
    let outcome = if parallelism <= 1 {
        segments.try_for_each(task)
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(parallelism)
            .build()?;
        pool.install(|| segments.par_bridge().try_for_each(task))
    };

    let written = appender.stats();
    if let Err(e) = outcome {
        warn!(
            "rewrite failed after {} documents; {} holds partial output",
            written.batches,
            destination.display()
        );
        return Err(e);
    }

    let stats = RewriteStats {
        documents: written.batches,
        ints_in: count_ints(source)?,
        ints_out: written.ints,
    };
    info!(
        "rewrote {} documents: {} -> {} ints",
        stats.documents, stats.ints_in, stats.ints_out
    );
    Ok(stats)
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Grow a vocabulary over `options.source`, rewrite the corpus into
/// `options.destination`, and return the resulting merge tree.
pub fn run_bpe(options: &BpeOptions, vocab: BaseVocab) -> Result<(MergeTree, RewriteStats)> {
    if options.target_vocab_size > MAX_VOCAB_SIZE {
        return Err(Error::Config(format!(
            "target vocabulary size {} exceeds {MAX_VOCAB_SIZE}",
            options.target_vocab_size
        )));
    }
    if options.destination.exists() && count_ints(&options.destination)? > 0 {
        return Err(Error::DestinationNotEmpty(options.destination.clone()));
    }

    let window = read_up_to_ints(&options.source, options.token_budget, 0)?;
    let wanted = options.target_vocab_size.saturating_sub(vocab.len()) as u64;
    let growth_bar = progress_bar(options.show_progress, wanted, "growing vocabulary")?;
    let growth = grow_vocabulary(
        window,
        vocab.len(),
        vocab.sentinel(),
        options.target_vocab_size,
        &growth_bar,
    );
    growth_bar.finish_and_clear();

    let tree = MergeTree::new(vocab, growth.merges)?;

    let total = count_ints(&options.source)?;
    let rewrite_bar = progress_bar(options.show_progress, total, "rewriting corpus")?;
    let stats = rewrite_corpus(
        &options.source,
        &options.destination,
        tree.merges(),
        tree.sentinel(),
        options.parallelism,
        &rewrite_bar,
    )?;
    rewrite_bar.finish_and_clear();

    Ok((tree, stats))
}

/// Check that expanding `compressed` through `tree` reproduces `raw`.
pub fn verify_round_trip(tree: &MergeTree, raw: &[TokenId], compressed: &[TokenId]) -> Result<bool> {
    Ok(tree.expand_all(compressed)? == raw)
}

/// A progress bar with the shared template, hidden when `enabled` is false.
pub fn progress_bar(enabled: bool, len: u64, message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    if !enabled {
        pb.set_draw_target(ProgressDrawTarget::hidden());
        return Ok(pb);
    }
    let style =
        ProgressStyle::default_bar().template("[{elapsed_precise}] {msg:<20!} {wide_bar} {pos}/{len}")?;
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_secs(1));
    Ok(pb)
}
