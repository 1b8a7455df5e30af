// Merge encoder — applies a finalized merge list to one document.
//
// The reference semantics are "replay every merge in list order as a full
// left-to-right, non-overlapping pass" (`bpe::apply_merge` in a loop). That
// is O(merges × len) per document, which dominates the corpus rewrite once
// the vocabulary reaches tens of thousands of ids.
//
// This encoder produces the same output in O(len log len) with a min-heap of
// candidate positions keyed by (merge order, position):
//
// - A merge's output id is newer than every merge that could have produced
//   its inputs, so every pair containing it has a strictly later order. All
//   candidates for merge k therefore exist before the first one is popped.
// - Within one merge order candidates pop left to right by original position,
//   and a merged token keeps its left position, so overlapping occurrences
//   resolve exactly like a left-to-right pass (`a a a` → `m a`).
// - Candidates go stale when a neighbor is consumed; they are revalidated
//   against the live pair on pop and dropped if it changed.
//
// Live positions form a doubly linked list, so finding a neighbor after
// merges is O(1).

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rustc_hash::FxHashMap;

use crate::types::{Merge, TokenId, TokenPair};

#[derive(Debug, PartialEq, Eq)]
struct Candidate {
    order: usize,
    position: usize,
    pair: TokenPair,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap and we want the earliest merge,
        // then the leftmost position.
        other
            .order
            .cmp(&self.order)
            .then_with(|| other.position.cmp(&self.position))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Lookup from pair to `(new id, merge order)`, shared read-only by workers.
#[derive(Debug, Clone, Default)]
pub struct MergeEncoder {
    ranks: FxHashMap<TokenPair, (TokenId, usize)>,
}

impl MergeEncoder {
    pub fn new(merges: &[Merge]) -> Self {
        let mut ranks = FxHashMap::default();
        for (order, &(pair, id)) in merges.iter().enumerate() {
            // A repeated pair can never fire again after its first pass
            // consumed every occurrence, so only the first entry counts.
            ranks.entry(pair).or_insert((id, order));
        }
        Self { ranks }
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /// Apply every merge to `tokens` in list order.
    pub fn encode(&self, tokens: &[TokenId]) -> Vec<TokenId> {
        if tokens.len() < 2 || self.is_empty() {
            return tokens.to_vec();
        }

        // Doubly linked list over positions; a consumed right token is
        // unlinked and marked dead.
        let len = tokens.len();
        let mut ids = tokens.to_vec();
        let mut alive = vec![true; len];
        let mut next: Vec<Option<usize>> = (1..=len).map(|i| (i < len).then_some(i)).collect();
        let mut prev: Vec<Option<usize>> = (0..len).map(|i| i.checked_sub(1)).collect();

        let mut heap = BinaryHeap::new();
        for (position, window) in tokens.windows(2).enumerate() {
            self.push_candidate(&mut heap, position, (window[0], window[1]));
        }

        while let Some(candidate) = heap.pop() {
            let position = candidate.position;
            if !alive[position] {
                continue;
            }
            let Some(right) = next[position] else {
                continue;
            };
            if (ids[position], ids[right]) != candidate.pair {
                continue;
            }
            let Some(&(merged, _)) = self.ranks.get(&candidate.pair) else {
                continue;
            };

            ids[position] = merged;
            alive[right] = false;
            next[position] = next[right];
            if let Some(after) = next[right] {
                prev[after] = Some(position);
            }

            if let Some(before) = prev[position] {
                self.push_candidate(&mut heap, before, (ids[before], merged));
            }
            if let Some(after) = next[position] {
                self.push_candidate(&mut heap, position, (merged, ids[after]));
            }
        }

        ids.into_iter()
            .zip(alive)
            .filter_map(|(id, alive)| alive.then_some(id))
            .collect()
    }

    fn push_candidate(&self, heap: &mut BinaryHeap<Candidate>, position: usize, pair: TokenPair) {
        if let Some(&(_, order)) = self.ranks.get(&pair) {
            heap.push(Candidate {
                order,
                position,
                pair,
            });
        }
    }
}
