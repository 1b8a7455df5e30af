// Base vocabulary — the bijection between token text and base ids.
//
// Base tokens are the atomic strings produced by the external MusicXML
// tokenizer: opening tags with their kept attributes (`<note>`,
// `<clef number="1">`), self-closing tags (`<chord />`), and text content
// (`C`, `4`, `quarter`). One extra token, `DOC_END_TOKEN`, terminates every
// document in a record store and is never merged.
//
// Every base id gets a `TokenClass` at construction time so the validator
// and interpreter never re-inspect strings on the hot path.
//
// When a vocabulary is built from a corpus (`from_documents`), ids are
// assigned in sorted string order so the same corpus always produces the same
// ids regardless of how ingest work was scheduled.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::types::TokenId;

/// Text of the document-end sentinel.
pub const DOC_END_TOKEN: &str = "<end>";

/// Name of the root element every generated document starts with.
pub const START_TAG_NAME: &str = "score-partwise";

/// Precomputed classification of a base token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenClass {
    /// An opening tag. Self-closing tags (`<chord />`) never get a closer.
    Tag { self_closing: bool },
    /// Text content between tags.
    Text,
    /// The document-end sentinel.
    Sentinel,
}

impl TokenClass {
    pub fn is_tag(self) -> bool {
        matches!(self, TokenClass::Tag { .. })
    }
}

/// The base vocabulary: ids `0..len()` with their text and class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BaseVocab {
    stoi: BTreeMap<String, TokenId>,
    itos: Vec<String>,
    classes: Vec<TokenClass>,
    sentinel: TokenId,
    start: Option<TokenId>,
}

impl BaseVocab {
    /// Build from a string→id map. Ids must cover `0..stoi.len()` exactly
    /// once and the map must contain `DOC_END_TOKEN`.
    pub fn from_stoi(stoi: BTreeMap<String, TokenId>) -> Result<Self> {
        let mut slots: Vec<Option<String>> = vec![None; stoi.len()];
        for (text, &id) in &stoi {
            let slot = slots.get_mut(id as usize).ok_or_else(|| {
                Error::invalid(
                    "base vocabulary",
                    format!("id {id} for {text:?} is outside 0..{}", stoi.len()),
                )
            })?;
            if let Some(other) = slot {
                return Err(Error::invalid(
                    "base vocabulary",
                    format!("id {id} is shared by {other:?} and {text:?}"),
                ));
            }
            *slot = Some(text.clone());
        }
        // Every slot is filled: n distinct ids in 0..n.
        let itos: Vec<String> = slots.into_iter().flatten().collect();

        let sentinel = *stoi.get(DOC_END_TOKEN).ok_or_else(|| {
            Error::invalid("base vocabulary", format!("missing {DOC_END_TOKEN:?}"))
        })?;

        let classes: Vec<TokenClass> = itos
            .iter()
            .enumerate()
            .map(|(id, text)| classify(text, id as TokenId == sentinel))
            .collect();

        let start = itos
            .iter()
            .enumerate()
            .find(|(id, text)| classes[*id].is_tag() && tag_name(text) == START_TAG_NAME)
            .map(|(id, _)| id as TokenId);

        Ok(Self {
            stoi,
            itos,
            classes,
            sentinel,
            start,
        })
    }

    /// Build from tokenized documents: every distinct string plus the
    /// sentinel, ids in sorted string order.
    pub fn from_documents<'a, I>(documents: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a [String]>,
    {
        let mut unique: BTreeSet<&str> = BTreeSet::new();
        for doc in documents {
            unique.extend(doc.iter().map(String::as_str));
        }
        unique.insert(DOC_END_TOKEN);

        let stoi = unique
            .into_iter()
            .enumerate()
            .map(|(id, text)| (text.to_string(), id as TokenId))
            .collect();
        Self::from_stoi(stoi)
    }

    pub fn len(&self) -> usize {
        self.itos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.itos.is_empty()
    }

    pub fn stoi(&self) -> &BTreeMap<String, TokenId> {
        &self.stoi
    }

    pub fn id(&self, text: &str) -> Option<TokenId> {
        self.stoi.get(text).copied()
    }

    pub fn text(&self, id: TokenId) -> Option<&str> {
        self.itos.get(id as usize).map(String::as_str)
    }

    pub fn class(&self, id: TokenId) -> Option<TokenClass> {
        self.classes.get(id as usize).copied()
    }

    pub fn is_tag(&self, id: TokenId) -> bool {
        self.class(id).is_some_and(TokenClass::is_tag)
    }

    pub fn sentinel(&self) -> TokenId {
        self.sentinel
    }

    /// Lowest-id tag token whose element is `score-partwise`, if any.
    pub fn start_token(&self) -> Option<TokenId> {
        self.start
    }

    /// Element name of a tag token (`<clef number="1">` → `clef`).
    pub fn tag_name(&self, id: TokenId) -> Result<&str> {
        if !self.is_tag(id) {
            return Err(Error::NotATag(id));
        }
        let text = self.text(id).ok_or(Error::UnknownToken(id))?;
        Ok(tag_name(text))
    }

    /// Matching closer for a tag token (`<clef number="1">` → `</clef>`).
    pub fn close_tag(&self, id: TokenId) -> Result<String> {
        Ok(format!("</{}>", self.tag_name(id)?))
    }

    /// Map a tokenized document to ids, appending the sentinel.
    pub fn encode_document(&self, tokens: &[String]) -> Result<Vec<TokenId>> {
        let mut ids = Vec::with_capacity(tokens.len() + 1);
        for token in tokens {
            let id = self
                .id(token)
                .ok_or_else(|| Error::UnknownText(token.clone()))?;
            ids.push(id);
        }
        ids.push(self.sentinel);
        Ok(ids)
    }
}

/// Element name of tag text: the characters after `<` up to the first space,
/// `/` or `>`.
pub fn tag_name(text: &str) -> &str {
    let inner = text.strip_prefix('<').unwrap_or(text);
    let end = inner
        .find(|c: char| c == ' ' || c == '/' || c == '>')
        .unwrap_or(inner.len());
    &inner[..end]
}

fn classify(text: &str, is_sentinel: bool) -> TokenClass {
    if is_sentinel {
        TokenClass::Sentinel
    } else if text.starts_with('<') {
        TokenClass::Tag {
            self_closing: text.ends_with("/>"),
        }
    } else {
        TokenClass::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stoi(entries: &[(&str, TokenId)]) -> BTreeMap<String, TokenId> {
        entries.iter().map(|&(s, i)| (s.to_string(), i)).collect()
    }

    #[test]
    fn classifies_tokens() {
        let vocab = BaseVocab::from_stoi(stoi(&[
            ("<note>", 0),
            ("<chord />", 1),
            ("C", 2),
            ("<end>", 3),
        ]))
        .unwrap();
        assert_eq!(
            vocab.class(0),
            Some(TokenClass::Tag {
                self_closing: false
            })
        );
        assert_eq!(vocab.class(1), Some(TokenClass::Tag { self_closing: true }));
        assert_eq!(vocab.class(2), Some(TokenClass::Text));
        assert_eq!(vocab.class(3), Some(TokenClass::Sentinel));
        assert!(!vocab.is_tag(3));
        assert_eq!(vocab.class(4), None);
    }

    #[test]
    fn close_tags_strip_attributes() {
        let vocab = BaseVocab::from_stoi(stoi(&[
            ("<clef number=\"1\">", 0),
            ("<measure>", 1),
            ("<chord />", 2),
            ("x", 3),
            ("<end>", 4),
        ]))
        .unwrap();
        assert_eq!(vocab.close_tag(0).unwrap(), "</clef>");
        assert_eq!(vocab.close_tag(1).unwrap(), "</measure>");
        assert_eq!(vocab.tag_name(2).unwrap(), "chord");
        assert!(matches!(vocab.close_tag(3), Err(Error::NotATag(3))));
        assert!(matches!(vocab.close_tag(4), Err(Error::NotATag(4))));
    }

    #[test]
    fn finds_lowest_start_token() {
        let vocab = BaseVocab::from_stoi(stoi(&[
            ("<part>", 0),
            ("<score-partwise version=\"3.1\">", 1),
            ("<score-partwise>", 2),
            ("<end>", 3),
        ]))
        .unwrap();
        assert_eq!(vocab.start_token(), Some(1));

        let plain = BaseVocab::from_stoi(stoi(&[("0", 0), ("1", 1), ("<end>", 2)])).unwrap();
        assert_eq!(plain.start_token(), None);
    }

    #[test]
    fn rejects_gaps_duplicates_and_missing_sentinel() {
        assert!(BaseVocab::from_stoi(stoi(&[("a", 0), ("<end>", 2)])).is_err());
        assert!(BaseVocab::from_stoi(stoi(&[("a", 0), ("b", 0), ("<end>", 1)])).is_err());
        assert!(BaseVocab::from_stoi(stoi(&[("a", 0), ("b", 1)])).is_err());
    }

    #[test]
    fn builds_sorted_vocab_from_documents() {
        let docs = vec![
            vec!["<note>".to_string(), "C".to_string()],
            vec!["<alter>".to_string(), "C".to_string()],
        ];
        let vocab = BaseVocab::from_documents(docs.iter().map(Vec::as_slice)).unwrap();
        assert_eq!(vocab.len(), 4);
        assert_eq!(vocab.id("<alter>"), Some(0));
        assert_eq!(vocab.id("<end>"), Some(1));
        assert_eq!(vocab.id("<note>"), Some(2));
        assert_eq!(vocab.id("C"), Some(3));

        assert_eq!(vocab.encode_document(&docs[0]).unwrap(), vec![2, 3, 1]);
        assert!(matches!(
            vocab.encode_document(&["D".to_string()]),
            Err(Error::UnknownText(_))
        ));
    }
}
