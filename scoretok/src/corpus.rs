// Corpus ingest — tokenized documents into the raw store and bigram tables.
//
// Input is the external tokenizer's output: one JSON array of token strings
// per line, one line per document. Ingest assigns base ids (see
// `BaseVocab::from_documents`), then works through the documents in batches.
// Within a batch a rayon pool encodes each document and builds its bigram
// tables; the encoded documents are then appended sentinel-terminated in
// input order and the tables folded into the running pair.
//
// The raw store therefore matches input order regardless of worker count.
// Growth breaks count ties by position in the window, so this keeps the merge
// list a function of the input alone.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use indicatif::ProgressBar;
use log::info;
use rayon::prelude::*;
use scoretok_store::{append_ints, count_ints};

use crate::bigram::BigramTables;
use crate::error::{Error, Result};
use crate::types::TokenId;
use crate::vocab::BaseVocab;

/// Documents encoded per parallel batch before their appends.
const INGEST_BATCH: usize = 1024;

/// Totals reported by `ingest_documents`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub documents: u64,
    /// Ints written, sentinels included.
    pub ints: u64,
}

/// Read a JSON-lines document file. Blank lines are skipped.
pub fn read_documents(path: &Path) -> Result<Vec<Vec<String>>> {
    let reader = BufReader::new(File::open(path)?);
    let mut docs = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: Vec<String> = serde_json::from_str(&line).map_err(|e| {
            Error::invalid("document file", format!("line {}: {e}", index + 1))
        })?;
        docs.push(doc);
    }
    info!("read {} documents from {}", docs.len(), path.display());
    Ok(docs)
}

/// Encode `docs` into the raw store at `raw_path`, in order, and build their
/// bigram tables. The store must be absent or empty.
pub fn ingest_documents(
    docs: &[Vec<String>],
    vocab: &BaseVocab,
    raw_path: &Path,
    parallelism: usize,
    progress: &ProgressBar,
) -> Result<(BigramTables, IngestStats)> {
    if raw_path.exists() && count_ints(raw_path)? > 0 {
        return Err(Error::DestinationNotEmpty(raw_path.to_path_buf()));
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(parallelism.max(1))
        .build()?;
    let encode = |doc: &Vec<String>| -> Result<(Vec<TokenId>, BigramTables)> {
        let ids = vocab.encode_document(doc)?;
        let tables = BigramTables::from_document(&ids, vocab);
        Ok((ids, tables))
    };

    let mut tables = BigramTables::new();
    let mut stats = IngestStats::default();
    for batch in docs.chunks(INGEST_BATCH) {
        let encoded: Vec<(Vec<TokenId>, BigramTables)> =
            pool.install(|| batch.par_iter().map(encode).collect::<Result<_>>())?;
        for (ids, doc_tables) in encoded {
            append_ints(raw_path, &ids)?;
            stats.documents += 1;
            stats.ints += ids.len() as u64;
            tables.merge(doc_tables);
        }
        progress.inc(batch.len() as u64);
    }

    info!(
        "ingested {} documents ({} ints); tok2tok has {} edges, tag2tag {}",
        stats.documents,
        stats.ints,
        tables.tok2tok.edge_count(),
        tables.tag2tag.edge_count()
    );
    Ok((tables, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scoretok_store::{DocumentSegments, read_all_ints};
    use std::fs;

    fn docs() -> Vec<Vec<String>> {
        [
            vec!["<score-partwise>", "<part>", "<measure>", "<note>"],
            vec!["<score-partwise>", "<part>", "<measure>"],
            vec!["<score-partwise>", "<work>", "<work-title>", "Air"],
        ]
        .into_iter()
        .map(|doc| doc.into_iter().map(String::from).collect())
        .collect()
    }

    #[test]
    fn reads_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.jsonl");
        fs::write(&path, "[\"<a>\", \"x\"]\n\n[\"<b>\"]\n").unwrap();
        let docs = read_documents(&path).unwrap();
        assert_eq!(docs, vec![vec!["<a>", "x"], vec!["<b>"]]);

        fs::write(&path, "[\"<a>\"]\n{\"not\": \"a list\"}\n").unwrap();
        let err = read_documents(&path).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn ingest_writes_documents_in_order_with_their_bigrams() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw.bin");
        let docs = docs();
        let vocab = BaseVocab::from_documents(docs.iter().map(Vec::as_slice)).unwrap();

        let (tables, stats) =
            ingest_documents(&docs, &vocab, &raw, 3, &ProgressBar::hidden()).unwrap();
        assert_eq!(stats.documents, 3);
        assert_eq!(stats.ints, 5 + 4 + 5);
        assert_eq!(read_all_ints(&raw).unwrap().len(), 14);

        let stored: Vec<Vec<u32>> = DocumentSegments::new(&raw, vocab.sentinel())
            .map(|doc| doc.unwrap())
            .collect();
        let expected: Vec<Vec<u32>> = docs
            .iter()
            .map(|doc| doc.iter().map(|t| vocab.id(t).unwrap()).collect())
            .collect();
        assert_eq!(stored, expected);

        let id = |t: &str| vocab.id(t).unwrap();
        assert!(tables.tok2tok.allows(id("<score-partwise>"), id("<part>")));
        assert!(tables.tok2tok.allows(id("<score-partwise>"), id("<work>")));
        assert!(tables.tok2tok.allows(id("<measure>"), vocab.sentinel()));
        assert!(tables.tok2tok.allows(id("Air"), vocab.sentinel()));
        assert!(tables.tag2tag.allows(id("<work>"), id("<work-title>")));
        assert!(!tables.tag2tag.allows(id("<work-title>"), vocab.sentinel()));
    }

    #[test]
    fn unknown_text_fails_ingest() {
        let dir = tempfile::tempdir().unwrap();
        let docs = docs();
        let vocab = BaseVocab::from_documents(docs[..1].iter().map(Vec::as_slice)).unwrap();
        let result = ingest_documents(
            &docs,
            &vocab,
            &dir.path().join("raw.bin"),
            2,
            &ProgressBar::hidden(),
        );
        assert!(matches!(result, Err(Error::UnknownText(_))));
    }

    #[test]
    fn refuses_to_append_to_an_existing_store() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw.bin");
        scoretok_store::append_ints(&raw, &[1]).unwrap();
        let docs = docs();
        let vocab = BaseVocab::from_documents(docs.iter().map(Vec::as_slice)).unwrap();
        assert!(matches!(
            ingest_documents(&docs, &vocab, &raw, 1, &ProgressBar::hidden()),
            Err(Error::DestinationNotEmpty(_))
        ));
    }
}
