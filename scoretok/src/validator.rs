// Structural validator — accepts or rejects the next token of a decode.
//
// A candidate (possibly composite) id is expanded to base tokens and checked
// against the bigram tables built from the training corpus:
//
// 1. The first base token must have been seen directly after `last_token`.
// 2. If the expansion contains tags, its first tag must have been seen as the
//    next tag after `last_tag`. Skipped while no tag has been seen.
//
// Only the boundary of the expansion is checked; its interior came from the
// merge list, which was learned from the same corpus.
//
// A rejection leaves the state untouched, so a caller can keep proposing
// alternatives until one passes.

use std::fmt;

use crate::bigram::BigramTables;
use crate::error::{Error, Result};
use crate::merge_tree::MergeTree;
use crate::types::TokenId;

/// Why a candidate was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// The id is not in the vocabulary.
    UnknownToken(TokenId),
    /// `first` never followed `last_token` in the corpus.
    TokenTransition { last_token: TokenId, first: TokenId },
    /// `first_tag` never followed `last_tag` in the corpus.
    TagTransition { last_tag: TokenId, first_tag: TokenId },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::UnknownToken(id) => write!(f, "unknown token id {id}"),
            Rejection::TokenTransition { last_token, first } => {
                write!(f, "token {first} never follows token {last_token}")
            }
            Rejection::TagTransition {
                last_tag,
                first_tag,
            } => write!(f, "tag {first_tag} never follows tag {last_tag}"),
        }
    }
}

/// Per-session validation state over shared, read-only tables.
#[derive(Clone, Debug)]
pub struct Validator<'t> {
    tree: &'t MergeTree,
    tables: &'t BigramTables,
    last_token: TokenId,
    last_tag: Option<TokenId>,
}

impl<'t> Validator<'t> {
    /// Start a session as if `start` had just been accepted.
    pub fn new(tree: &'t MergeTree, tables: &'t BigramTables, start: TokenId) -> Result<Self> {
        let seq = tree.translate(start)?;
        let last_token = *seq.last().ok_or(Error::UnknownToken(start))?;
        let last_tag = seq.iter().rev().copied().find(|&id| tree.token_is_tag(id));
        Ok(Self {
            tree,
            tables,
            last_token,
            last_tag,
        })
    }

    pub fn last_token(&self) -> TokenId {
        self.last_token
    }

    pub fn last_tag(&self) -> Option<TokenId> {
        self.last_tag
    }

    /// Test `id` without changing state.
    pub fn check(&self, id: TokenId) -> std::result::Result<(), Rejection> {
        let seq = self
            .tree
            .translate(id)
            .map_err(|_| Rejection::UnknownToken(id))?;
        self.check_expansion(&seq)
    }

    /// Test `id` and, if it passes, make it the new last token.
    pub fn register_candidate(&mut self, id: TokenId) -> std::result::Result<(), Rejection> {
        let seq = self
            .tree
            .translate(id)
            .map_err(|_| Rejection::UnknownToken(id))?;
        self.check_expansion(&seq)?;

        if let Some(&last) = seq.last() {
            self.last_token = last;
        }
        if let Some(tag) = seq.iter().rev().copied().find(|&t| self.tree.token_is_tag(t)) {
            self.last_tag = Some(tag);
        }
        Ok(())
    }

    fn check_expansion(&self, seq: &[TokenId]) -> std::result::Result<(), Rejection> {
        let Some(&first) = seq.first() else {
            return Ok(());
        };
        if !self.tables.tok2tok.allows(self.last_token, first) {
            return Err(Rejection::TokenTransition {
                last_token: self.last_token,
                first,
            });
        }

        let first_tag = seq.iter().copied().find(|&t| self.tree.token_is_tag(t));
        if let (Some(last_tag), Some(first_tag)) = (self.last_tag, first_tag) {
            if !self.tables.tag2tag.allows(last_tag, first_tag) {
                return Err(Rejection::TagTransition {
                    last_tag,
                    first_tag,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::BaseVocab;

    // 0 <score-partwise>, 1 <part>, 2 <measure>, 3 <note>, 4 C, 5 <end>, 6 <step>
    fn tree() -> MergeTree {
        let stoi = [
            ("<score-partwise>", 0),
            ("<part>", 1),
            ("<measure>", 2),
            ("<note>", 3),
            ("C", 4),
            ("<end>", 5),
            ("<step>", 6),
        ]
        .into_iter()
        .map(|(s, i)| (s.to_string(), i))
        .collect();
        let vocab = BaseVocab::from_stoi(stoi).unwrap();
        // 7 = <score-partwise><part>, 8 = <step>C
        MergeTree::new(vocab, vec![((0, 1), 7), ((6, 4), 8)]).unwrap()
    }

    fn tables(tree: &MergeTree) -> BigramTables {
        // <score-partwise> <part> <measure> <note> <step> C <note> <step> C <end>
        BigramTables::from_document(&[0, 1, 2, 3, 6, 4, 3, 6, 4, 5], tree.vocab())
    }

    #[test]
    fn initial_state_comes_from_start_expansion() {
        let tree = tree();
        let tables = tables(&tree);
        let v = Validator::new(&tree, &tables, 7).unwrap();
        assert_eq!(v.last_token(), 1);
        assert_eq!(v.last_tag(), Some(1));

        let v = Validator::new(&tree, &tables, 0).unwrap();
        assert_eq!(v.last_token(), 0);
        assert_eq!(v.last_tag(), Some(0));
    }

    #[test]
    fn accepts_corpus_transitions() {
        let tree = tree();
        let tables = tables(&tree);
        let mut v = Validator::new(&tree, &tables, 7).unwrap();
        for id in [2, 3, 8, 3, 8, 5] {
            v.register_candidate(id).unwrap();
        }
        assert_eq!(v.last_token(), 5);
        assert_eq!(v.last_tag(), Some(6));
    }

    #[test]
    fn rejects_unseen_token_transition_without_mutating() {
        let tree = tree();
        let tables = tables(&tree);
        let mut v = Validator::new(&tree, &tables, 7).unwrap();
        let before = (v.last_token(), v.last_tag());

        assert_eq!(
            v.register_candidate(3),
            Err(Rejection::TokenTransition {
                last_token: 1,
                first: 3
            })
        );
        assert_eq!((v.last_token(), v.last_tag()), before);
    }

    #[test]
    fn rejects_unseen_tag_transition() {
        let tree = tree();
        // tok2tok allows C -> <measure>, but tag2tag never saw <step> -> <measure>.
        let mut tables = tables(&tree);
        tables.tok2tok.insert(4, 2);

        let mut v = Validator::new(&tree, &tables, 7).unwrap();
        for id in [2, 3, 8] {
            v.register_candidate(id).unwrap();
        }
        assert_eq!(
            v.check(2),
            Err(Rejection::TagTransition {
                last_tag: 6,
                first_tag: 2
            })
        );
        assert_eq!(v.register_candidate(2), v.check(2));
        assert_eq!(v.last_token(), 4);
    }

    #[test]
    fn text_only_candidates_skip_the_tag_check() {
        let tree = tree();
        let tables = tables(&tree);
        let mut v = Validator::new(&tree, &tables, 7).unwrap();
        for id in [2, 3, 6] {
            v.register_candidate(id).unwrap();
        }
        v.register_candidate(4).unwrap();
        assert_eq!(v.last_tag(), Some(6));
    }

    #[test]
    fn unknown_ids_are_rejections() {
        let tree = tree();
        let tables = tables(&tree);
        let mut v = Validator::new(&tree, &tables, 7).unwrap();
        assert_eq!(v.register_candidate(99), Err(Rejection::UnknownToken(99)));
        assert_eq!(v.last_token(), 1);
    }

    #[test]
    fn check_does_not_mutate() {
        let tree = tree();
        let tables = tables(&tree);
        let v = Validator::new(&tree, &tables, 7).unwrap();
        assert!(v.check(2).is_ok());
        assert!(v.check(2).is_ok());
        assert_eq!(v.last_token(), 1);
    }
}
