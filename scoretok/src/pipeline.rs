// Pipeline stages — the work behind each `scoretok` subcommand.
//
// `prepare` runs the offline half end to end: read tokenized documents,
// assign base ids, ingest them into the raw store while collecting bigram
// tables, grow the vocabulary, rewrite the corpus, and persist the merge
// tree. `render` replays a token sequence through a decode session and writes
// the reconstructed document; `sample` does the same for a seeded stand-in
// model. `inspect` summarizes saved artifacts.
//
// Each stage takes a validated `PipelineConfig`; none reads the environment
// or the command line directly.

use std::io::Write;
use std::path::Path;

use log::{info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use scoretok_store::{DocumentSegments, count_ints};

use crate::bigram::BigramTables;
use crate::bpe::{progress_bar, run_bpe};
use crate::config::PipelineConfig;
use crate::corpus::{ingest_documents, read_documents};
use crate::decode::{DecodeReport, DecodeSession, FollowerSampler, ReplaySource};
use crate::error::{Error, Result};
use crate::indent::IndentTable;
use crate::interpreter::FileSnapshot;
use crate::merge_tree::MergeTree;
use crate::types::TokenId;
use crate::vocab::BaseVocab;

/// Totals from `prepare`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrepReport {
    pub documents: u64,
    pub base_size: usize,
    pub vocab_size: usize,
    pub raw_ints: u64,
    pub compressed_ints: u64,
}

impl PrepReport {
    /// Compressed length over raw length.
    pub fn ratio(&self) -> f64 {
        if self.raw_ints == 0 {
            return 1.0;
        }
        self.compressed_ints as f64 / self.raw_ints as f64
    }
}

/// Build every artifact from the tokenized documents.
pub fn prepare(config: &PipelineConfig) -> Result<PrepReport> {
    let docs = read_documents(&config.documents_path())?;
    let vocab = BaseVocab::from_documents(docs.iter().map(Vec::as_slice))?;
    info!("base vocabulary: {} tokens", vocab.len());
    let base_size = vocab.len();

    let bar = progress_bar(config.show_progress, docs.len() as u64, "ingesting documents")?;
    let (tables, ingest) = ingest_documents(
        &docs,
        &vocab,
        &config.raw_store_path(),
        config.worker_count(),
        &bar,
    )?;
    bar.finish_and_clear();
    drop(docs);
    tables.save_to(&config.tok2tok_path(), &config.tag2tag_path())?;

    let (tree, rewrite) = run_bpe(&config.bpe_options(), vocab)?;
    tree.save(&config.tokens_path())?;

    let report = PrepReport {
        documents: ingest.documents,
        base_size,
        vocab_size: tree.size(),
        raw_ints: rewrite.ints_in,
        compressed_ints: rewrite.ints_out,
    };
    info!(
        "prepared {} documents: vocabulary {} -> {}, {} ints -> {} ({:.3})",
        report.documents,
        report.base_size,
        report.vocab_size,
        report.raw_ints,
        report.compressed_ints,
        report.ratio()
    );
    Ok(report)
}

/// Token ids of the `index`-th document of the compressed store, sentinel
/// appended.
pub fn compressed_document(config: &PipelineConfig, index: usize) -> Result<Vec<TokenId>> {
    let tree = MergeTree::load(&config.tokens_path())?;
    let path = config.compressed_store_path();
    let mut doc = DocumentSegments::new(&path, tree.sentinel())
        .nth(index)
        .ok_or_else(|| Error::Config(format!("{} has no document {index}", path.display())))??;
    doc.push(tree.sentinel());
    Ok(doc)
}

/// Read a JSON array of token ids.
pub fn read_token_file(path: &Path) -> Result<Vec<TokenId>> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Replay `tokens` through a validator and interpreter, streaming markup to
/// `out`.
///
/// A leading start token (or a composite that begins with it) seeds the
/// session; otherwise the session starts from the bare start token and every
/// id is replayed.
pub fn render<W: Write>(config: &PipelineConfig, tokens: &[TokenId], out: W) -> Result<DecodeReport> {
    let (tree, tables, indents) = load_decode_artifacts(config)?;

    let bare_start = tree.start_token().ok_or(Error::MissingStartToken)?;
    let (start, rest) = match tokens.split_first() {
        Some((&first, rest))
            if first == bare_start || tree.start_variants().contains(&first) =>
        {
            (first, rest)
        }
        _ => (bare_start, tokens),
    };

    let mut session = DecodeSession::with_start(&tree, &tables, &indents, start, out)?;
    if let Some(path) = config.live_output_path() {
        session = session.with_live_sink(FileSnapshot::new(&path));
    }
    let mut source = ReplaySource::new(rest.to_vec());
    let report = session.run(&mut source, config.decode_limits())?;
    if !report.rejections.is_empty() {
        warn!(
            "{} of {} tokens were rejected and skipped",
            report.rejections.len(),
            tokens.len()
        );
    }
    Ok(report)
}

/// Decode a fresh document from a seeded `FollowerSampler`, streaming markup
/// to `out`.
pub fn sample<W: Write>(config: &PipelineConfig, seed: u64, out: W) -> Result<DecodeReport> {
    let (tree, tables, indents) = load_decode_artifacts(config)?;
    let mut session = DecodeSession::new(&tree, &tables, &indents, out)?;
    if let Some(path) = config.live_output_path() {
        session = session.with_live_sink(FileSnapshot::new(&path));
    }
    let mut sampler = FollowerSampler::new(&tree, &tables, StdRng::seed_from_u64(seed));
    session.run(&mut sampler, config.decode_limits())
}

fn load_decode_artifacts(config: &PipelineConfig) -> Result<(MergeTree, BigramTables, IndentTable)> {
    let tree = MergeTree::load(&config.tokens_path())?;
    let tables = BigramTables::load_from(&config.tok2tok_path(), &config.tag2tag_path())?;
    let indents = match config.indent_table_path() {
        Some(path) => IndentTable::load(&path)?,
        None => IndentTable::musicxml(),
    };
    Ok((tree, tables, indents))
}

/// Summary of saved artifacts.
#[derive(Clone, Debug, PartialEq)]
pub struct InspectReport {
    pub base_size: usize,
    pub vocab_size: usize,
    pub sentinel: TokenId,
    pub start_token: Option<TokenId>,
    pub start_variants: usize,
    pub tok2tok_edges: usize,
    pub tag2tag_edges: usize,
    /// `None` when the store does not exist.
    pub raw_ints: Option<u64>,
    pub compressed_ints: Option<u64>,
    /// The last merges, newest first, rendered as text.
    pub recent_merges: Vec<(TokenId, String)>,
}

/// Summarize the merge tree, bigram tables and stores.
pub fn inspect(config: &PipelineConfig, recent: usize) -> Result<InspectReport> {
    let tree = MergeTree::load(&config.tokens_path())?;
    let tables = BigramTables::load_from(&config.tok2tok_path(), &config.tag2tag_path())?;
    let store_len = |path: &Path| -> Result<Option<u64>> {
        if path.exists() {
            Ok(Some(count_ints(path)?))
        } else {
            Ok(None)
        }
    };

    let recent_merges = tree
        .merges()
        .iter()
        .rev()
        .take(recent)
        .map(|&(_, id)| Ok((id, tree.render(id)?)))
        .collect::<Result<Vec<_>>>()?;

    Ok(InspectReport {
        base_size: tree.base_size(),
        vocab_size: tree.size(),
        sentinel: tree.sentinel(),
        start_token: tree.start_token(),
        start_variants: tree.start_variants().len(),
        tok2tok_edges: tables.tok2tok.edge_count(),
        tag2tag_edges: tables.tag2tag.edge_count(),
        raw_ints: store_len(&config.raw_store_path())?,
        compressed_ints: store_len(&config.compressed_store_path())?,
        recent_merges,
    })
}
