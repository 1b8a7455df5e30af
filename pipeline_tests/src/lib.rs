// Test support for end-to-end pipeline tests.
//
// Provides a seeded generator of tokenized MusicXML documents shaped like the
// external tokenizer's output, a scratch `Workspace` holding a config and its
// data directory, and a nesting checker for reconstructed markup.
//
// Everything goes through the same public API the `scoretok` binary uses;
// nothing here reaches into crate internals.
//
// See also: `tests/full_pipeline.rs` for the scenarios.

use std::fs;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scoretok::PipelineConfig;
use tempfile::TempDir;

const STEPS: &[&str] = &["C", "D", "E", "F", "G", "A", "B"];
const OCTAVES: &[&str] = &["3", "4", "5"];
const DURATIONS: &[(&str, &str)] = &[("1", "quarter"), ("2", "half"), ("4", "whole")];
const FIFTHS: &[&str] = &["-1", "0", "1", "2"];

/// `count` documents from a fixed seed. The same arguments always produce
/// the same documents.
pub fn synthetic_documents(count: usize, seed: u64) -> Vec<Vec<String>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count).map(|_| synthetic_document(&mut rng)).collect()
}

fn synthetic_document(rng: &mut StdRng) -> Vec<String> {
    let mut doc = vec!["<score-partwise>", "<part>"];
    for measure in 0..rng.random_range(1..=4) {
        doc.push("<measure>");
        if measure == 0 {
            doc.extend(["<attributes>", "<divisions>", "1", "<key>", "<fifths>"]);
            doc.push(pick(rng, FIFTHS));
            doc.extend([
                "<time>",
                "<beats>",
                "4",
                "<beat-type>",
                "4",
                "<clef>",
                "<sign>",
                "G",
                "<line>",
                "2",
            ]);
        }
        for note in 0..rng.random_range(1..=4) {
            doc.push("<note>");
            if rng.random_bool(0.2) {
                doc.push("<rest />");
            } else {
                if note > 0 && rng.random_bool(0.2) {
                    doc.push("<chord />");
                }
                doc.extend(["<pitch>", "<step>", pick(rng, STEPS), "<octave>"]);
                doc.push(pick(rng, OCTAVES));
            }
            let (duration, kind) = DURATIONS[rng.random_range(0..DURATIONS.len())];
            doc.extend(["<duration>", duration, "<type>", kind]);
        }
    }
    doc.into_iter().map(String::from).collect()
}

fn pick(rng: &mut StdRng, choices: &[&'static str]) -> &'static str {
    choices[rng.random_range(0..choices.len())]
}

/// A scratch data directory with a config pointing into it.
pub struct Workspace {
    dir: TempDir,
    pub config: PipelineConfig,
}

impl Workspace {
    /// Write `docs` as the document file of a fresh workspace.
    pub fn new(docs: &[Vec<String>], target_vocab_size: usize, parallelism: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            data_root: dir.path().to_path_buf(),
            target_vocab_size,
            parallelism,
            show_progress: false,
            ..PipelineConfig::default()
        };
        write_documents(&config.documents_path(), docs);
        Self { dir, config }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}

/// Write documents as JSON lines.
pub fn write_documents(path: &Path, docs: &[Vec<String>]) {
    let lines: Vec<String> = docs
        .iter()
        .map(|doc| serde_json::to_string(doc).unwrap())
        .collect();
    fs::write(path, lines.join("\n")).unwrap();
}

/// Check that every element in `markup` is closed in order. Returns the
/// number of elements opened (self-closing ones included).
pub fn check_nesting(markup: &str) -> Result<usize, String> {
    let mut stack: Vec<&str> = Vec::new();
    let mut elements = 0;
    let mut rest = markup;
    while let Some(open) = rest.find('<') {
        let close = rest[open..]
            .find('>')
            .ok_or_else(|| format!("unterminated tag at {:?}", &rest[open..]))?;
        let tag = &rest[open + 1..open + close];
        rest = &rest[open + close + 1..];

        if tag.starts_with('?') || tag.starts_with('!') {
            continue;
        }
        if let Some(name) = tag.strip_prefix('/') {
            match stack.pop() {
                Some(top) if top == name => {}
                other => return Err(format!("</{name}> closes {other:?}")),
            }
            continue;
        }
        elements += 1;
        if !tag.ends_with('/') {
            stack.push(tag.split(' ').next().unwrap_or(tag));
        }
    }
    if stack.is_empty() {
        Ok(elements)
    } else {
        Err(format!("unclosed elements: {stack:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_is_seeded() {
        assert_eq!(synthetic_documents(5, 3), synthetic_documents(5, 3));
        assert_ne!(synthetic_documents(5, 3), synthetic_documents(5, 4));
        for doc in synthetic_documents(20, 9) {
            assert_eq!(doc[0], "<score-partwise>");
            assert!(doc.iter().any(|t| t == "<note>"));
        }
    }

    #[test]
    fn nesting_checker() {
        assert_eq!(check_nesting("<?xml?><a><b x=\"1\">t</b><c /></a>"), Ok(3));
        assert!(check_nesting("<a><b></a></b>").is_err());
        assert!(check_nesting("<a><b></b>").is_err());
    }
}
