// Merge tree — expands any vocabulary id back to its base tokens.
//
// A merge list of `((left, right), id)` entries over a base vocabulary forms a
// forest: every composite id has exactly two children, both with smaller ids.
// The inverse map is stored as a flat `Vec<TokenPair>` indexed by
// `id - base_size`, so lookups are a bounds check and an index, and cycles are
// impossible because `load`/`new` reject any child id that is not smaller than
// its parent.
//
// Expansion is iterative with an explicit stack (push right, then left), so
// deep merge chains cannot overflow the call stack.
//
// Persisted format (shared with the training side):
//
//   { "stoi": { "<note>": 0, ... }, "merges": [[[a, b], id], ...] }

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Merge, TokenId, TokenPair};
use crate::vocab::BaseVocab;

#[derive(Serialize, Deserialize)]
struct MergeTreeFile {
    stoi: BTreeMap<String, TokenId>,
    merges: Vec<Merge>,
}

/// Base vocabulary plus the ordered merge list and its inverse.
#[derive(Clone, Debug)]
pub struct MergeTree {
    vocab: BaseVocab,
    merges: Vec<Merge>,
    children: Vec<TokenPair>,
}

impl MergeTree {
    /// Validate `merges` against `vocab` and build the inverse map.
    ///
    /// New ids must be contiguous from `vocab.len()` in list order, both
    /// children must already exist, and neither may be the sentinel.
    pub fn new(vocab: BaseVocab, merges: Vec<Merge>) -> Result<Self> {
        let base_size = vocab.len() as TokenId;
        let sentinel = vocab.sentinel();
        let mut children = Vec::with_capacity(merges.len());

        for (index, &((left, right), id)) in merges.iter().enumerate() {
            let expected = base_size + index as TokenId;
            if id != expected {
                return Err(Error::invalid(
                    "merge tree",
                    format!("merge #{index} creates id {id}, expected {expected}"),
                ));
            }
            if left >= id || right >= id {
                return Err(Error::invalid(
                    "merge tree",
                    format!("merge #{index} ({left}, {right}) -> {id} refers to a later id"),
                ));
            }
            if left == sentinel || right == sentinel {
                return Err(Error::invalid(
                    "merge tree",
                    format!("merge #{index} ({left}, {right}) -> {id} contains the sentinel"),
                ));
            }
            children.push((left, right));
        }

        Ok(Self {
            vocab,
            merges,
            children,
        })
    }

    pub fn vocab(&self) -> &BaseVocab {
        &self.vocab
    }

    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    pub fn base_size(&self) -> usize {
        self.vocab.len()
    }

    /// Total vocabulary size: base tokens plus composites.
    pub fn size(&self) -> usize {
        self.vocab.len() + self.merges.len()
    }

    pub fn sentinel(&self) -> TokenId {
        self.vocab.sentinel()
    }

    pub fn start_token(&self) -> Option<TokenId> {
        self.vocab.start_token()
    }

    pub fn is_base(&self, id: TokenId) -> bool {
        (id as usize) < self.vocab.len()
    }

    /// Children of a composite id, `None` for base or unknown ids.
    pub fn children(&self, id: TokenId) -> Option<TokenPair> {
        let index = (id as usize).checked_sub(self.vocab.len())?;
        self.children.get(index).copied()
    }

    /// Expand `id` to its base tokens, left to right.
    pub fn translate(&self, id: TokenId) -> Result<Vec<TokenId>> {
        let mut out = Vec::new();
        self.expand_into(id, &mut out)?;
        Ok(out)
    }

    /// Expand `id` and append the base tokens to `out`.
    pub fn expand_into(&self, id: TokenId, out: &mut Vec<TokenId>) -> Result<()> {
        if self.is_base(id) {
            out.push(id);
            return Ok(());
        }
        let mut stack = vec![id];
        while let Some(top) = stack.pop() {
            if self.is_base(top) {
                out.push(top);
            } else {
                let (left, right) = self.children(top).ok_or(Error::UnknownToken(top))?;
                stack.push(right);
                stack.push(left);
            }
        }
        Ok(())
    }

    /// Expand a whole sequence.
    pub fn expand_all(&self, ids: &[TokenId]) -> Result<Vec<TokenId>> {
        let mut out = Vec::with_capacity(ids.len() * 2);
        for &id in ids {
            self.expand_into(id, &mut out)?;
        }
        Ok(out)
    }

    /// True iff `id` is a base tag token. Composites are never tags.
    pub fn token_is_tag(&self, id: TokenId) -> bool {
        self.vocab.is_tag(id)
    }

    /// Closing tag for a base tag token.
    pub fn close_tag_for(&self, id: TokenId) -> Result<String> {
        self.vocab.close_tag(id)
    }

    /// Text of a base token.
    pub fn text(&self, id: TokenId) -> Option<&str> {
        self.vocab.text(id)
    }

    /// Concatenated base texts of any id.
    pub fn render(&self, id: TokenId) -> Result<String> {
        let mut s = String::new();
        for base in self.translate(id)? {
            s.push_str(self.vocab.text(base).ok_or(Error::UnknownToken(base))?);
        }
        Ok(s)
    }

    /// Every composite id whose expansion begins with the start token.
    ///
    /// The root tag is merged with its usual successors early in growth, so a
    /// model rarely emits the bare start token; decoders seed from one of
    /// these instead.
    pub fn start_variants(&self) -> Vec<TokenId> {
        let Some(start) = self.vocab.start_token() else {
            return Vec::new();
        };
        (0..self.merges.len())
            .map(|index| (self.vocab.len() + index) as TokenId)
            .filter(|&id| self.first_base(id) == start)
            .collect()
    }

    /// First base token of an expansion, following left children only.
    pub fn first_base(&self, mut id: TokenId) -> TokenId {
        while let Some((left, _)) = self.children(id) {
            id = left;
        }
        id
    }

    /// Write as `{"stoi": ..., "merges": ...}`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = MergeTreeFile {
            stoi: self.vocab.stoi().clone(),
            merges: self.merges.clone(),
        };
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, &file)?;
        writer.flush()?;
        Ok(())
    }

    /// Load and validate a saved tree.
    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let file: MergeTreeFile = serde_json::from_reader(reader)?;
        let vocab = BaseVocab::from_stoi(file.stoi)?;
        Self::new(vocab, file.merges)
    }
}
