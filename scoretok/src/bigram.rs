// Bigram tables — which base token may follow which.
//
// Built once over the raw corpus and read-only afterwards:
//
// - `tok2tok[a]` holds every base id seen directly after `a`.
// - `tag2tag[t]` holds every tag id seen as the next tag after tag `t`, with
//   any text tokens in between ignored.
//
// The sentinel is a plain token for `tok2tok` (so "may this token end a
// document?" is answerable) but is not a tag, so it never enters `tag2tag`.
//
// Ingest workers each build a local `BigramTables` per document and the
// coordinator folds them with `merge`; set union makes the fold order
// irrelevant.
//
// On disk each table is a JSON object with stringified id keys:
// `{"12": [3, 40, 41], ...}`. `BTreeMap`/`BTreeSet` keep the files stable
// across runs.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::TokenId;
use crate::vocab::BaseVocab;

pub const TOK2TOK_FILE: &str = "tok2tok.json";
pub const TAG2TAG_FILE: &str = "tag2tag.json";

/// Successor sets keyed by predecessor id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FollowerTable(BTreeMap<TokenId, BTreeSet<TokenId>>);

impl FollowerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, before: TokenId, after: TokenId) {
        self.0.entry(before).or_default().insert(after);
    }

    /// True if `after` was observed following `before`. A predecessor with no
    /// row has no allowed successors.
    pub fn allows(&self, before: TokenId, after: TokenId) -> bool {
        self.0.get(&before).is_some_and(|set| set.contains(&after))
    }

    pub fn followers(&self, before: TokenId) -> Option<&BTreeSet<TokenId>> {
        self.0.get(&before)
    }

    /// Number of predecessor rows.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of (before, after) edges.
    pub fn edge_count(&self) -> usize {
        self.0.values().map(BTreeSet::len).sum()
    }

    pub fn merge(&mut self, other: FollowerTable) {
        for (before, afters) in other.0 {
            self.0.entry(before).or_default().extend(afters);
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

/// The pair of tables the validator checks against.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BigramTables {
    pub tok2tok: FollowerTable,
    pub tag2tag: FollowerTable,
}

impl BigramTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build tables for a single raw document (sentinel included).
    pub fn from_document(doc: &[TokenId], vocab: &BaseVocab) -> Self {
        let mut tables = Self::new();
        tables.observe(doc, vocab);
        tables
    }

    /// Record every adjacent pair of `doc`, and every adjacent pair of its
    /// tag tokens.
    pub fn observe(&mut self, doc: &[TokenId], vocab: &BaseVocab) {
        for pair in doc.windows(2) {
            self.tok2tok.insert(pair[0], pair[1]);
        }
        let mut last_tag: Option<TokenId> = None;
        for &id in doc.iter().filter(|&&id| vocab.is_tag(id)) {
            if let Some(prev) = last_tag {
                self.tag2tag.insert(prev, id);
            }
            last_tag = Some(id);
        }
    }

    pub fn merge(&mut self, other: BigramTables) {
        self.tok2tok.merge(other.tok2tok);
        self.tag2tag.merge(other.tag2tag);
    }

    /// Save as `tok2tok.json` and `tag2tag.json` under `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        self.save_to(&dir.join(TOK2TOK_FILE), &dir.join(TAG2TAG_FILE))
    }

    pub fn save_to(&self, tok2tok: &Path, tag2tag: &Path) -> Result<()> {
        self.tok2tok.save(tok2tok)?;
        self.tag2tag.save(tag2tag)
    }

    /// Load `tok2tok.json` and `tag2tag.json` from `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        Self::load_from(&dir.join(TOK2TOK_FILE), &dir.join(TAG2TAG_FILE))
    }

    pub fn load_from(tok2tok: &Path, tag2tag: &Path) -> Result<Self> {
        Ok(Self {
            tok2tok: FollowerTable::load(tok2tok)?,
            tag2tag: FollowerTable::load(tag2tag)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn vocab() -> BaseVocab {
        // 0 <measure>, 1 <note>, 2 C, 3 <end>, 4 <step>
        let stoi = [
            ("<measure>", 0),
            ("<note>", 1),
            ("C", 2),
            ("<end>", 3),
            ("<step>", 4),
        ]
        .into_iter()
        .map(|(s, i)| (s.to_string(), i))
        .collect();
        BaseVocab::from_stoi(stoi).unwrap()
    }

    #[test]
    fn observes_token_and_tag_successors() {
        let v = vocab();
        // <measure> <note> <step> C <note> <step> C <end>
        let tables = BigramTables::from_document(&[0, 1, 4, 2, 1, 4, 2, 3], &v);

        assert!(tables.tok2tok.allows(0, 1));
        assert!(tables.tok2tok.allows(2, 1));
        assert!(tables.tok2tok.allows(2, 3));
        assert!(!tables.tok2tok.allows(0, 4));

        // Text between <step> and <note> is skipped for tag2tag.
        assert!(tables.tag2tag.allows(4, 1));
        assert!(tables.tag2tag.allows(1, 4));
        assert!(tables.tag2tag.allows(0, 1));
        assert!(!tables.tag2tag.allows(2, 1));
        // The sentinel is never a tag.
        assert!(tables.tag2tag.followers(3).is_none());
        assert!(!tables.tag2tag.allows(4, 3));
    }

    #[test]
    fn merge_is_a_union() {
        let v = vocab();
        let mut a = BigramTables::from_document(&[0, 1, 3], &v);
        let b = BigramTables::from_document(&[0, 4, 3], &v);
        a.merge(b);
        assert_eq!(
            a.tok2tok.followers(0).unwrap().iter().copied().collect::<Vec<_>>(),
            vec![1, 4]
        );
        assert_eq!(a.tok2tok.edge_count(), 4);
    }

    #[test]
    fn missing_rows_allow_nothing() {
        let table = FollowerTable::new();
        assert!(!table.allows(7, 7));
    }

    #[test]
    fn persists_with_string_keys() {
        let dir = tempfile::tempdir().unwrap();
        let v = vocab();
        let tables = BigramTables::from_document(&[0, 1, 4, 2, 3], &v);
        tables.save(dir.path()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join(TOK2TOK_FILE)).unwrap())
                .unwrap();
        assert_eq!(raw["0"], serde_json::json!([1]));

        let loaded = BigramTables::load(dir.path()).unwrap();
        assert_eq!(loaded, tables);
    }

    #[test]
    fn malformed_tables_fail_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TOK2TOK_FILE);
        fs::write(&path, r#"{"zero": [1]}"#).unwrap();
        assert!(matches!(FollowerTable::load(&path), Err(Error::Json(_))));
    }
}
