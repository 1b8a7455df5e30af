// Decode session — drives a validator and an interpreter from a token source.
//
// The model itself lives outside this crate. `TokenSource` is the seam: it
// proposes the next id given everything accepted so far. Each proposal goes
// through the validator; a rejection asks the source again, up to
// `max_attempts` proposals per step. Accepted ids are fed to the interpreter.
//
// `FollowerSampler` stands in for a model: it proposes ids whose first base
// token was seen after the last accepted base token. It never consults
// tag2tag, so some proposals are still rejected and resampled.
//
// A session ends when the sentinel is accepted, the step budget runs out,
// the source has nothing more to offer, or a step exhausts its attempts.
// `DecodeReport` records which.

use std::io::Write;

use log::{debug, info};
use rand::Rng;

use crate::bigram::BigramTables;
use crate::error::{Error, Result};
use crate::indent::IndentTable;
use crate::interpreter::{Interpreter, LiveSink};
use crate::merge_tree::MergeTree;
use crate::types::TokenId;
use crate::validator::{Rejection, Validator};

/// Proposes the next token id.
pub trait TokenSource {
    /// `history` holds every accepted id, starting with the start token.
    /// Returning `None` ends the session.
    fn propose(&mut self, history: &[TokenId]) -> Option<TokenId>;
}

/// Replays a fixed sequence, one proposal per call.
///
/// Rejected ids are consumed like accepted ones, so a replay of a corrupted
/// sequence skips past the bad id instead of retrying it forever.
#[derive(Clone, Debug)]
pub struct ReplaySource {
    tokens: Vec<TokenId>,
    next: usize,
}

impl ReplaySource {
    pub fn new(tokens: Vec<TokenId>) -> Self {
        Self { tokens, next: 0 }
    }
}

impl TokenSource for ReplaySource {
    fn propose(&mut self, _history: &[TokenId]) -> Option<TokenId> {
        let id = self.tokens.get(self.next).copied()?;
        self.next += 1;
        Some(id)
    }
}

/// Proposes uniformly among ids that may follow the last accepted token
/// according to tok2tok.
pub struct FollowerSampler<'t, R> {
    tree: &'t MergeTree,
    tables: &'t BigramTables,
    /// Base id → every id (base or composite) whose expansion starts with it.
    by_first: Vec<Vec<TokenId>>,
    rng: R,
}

impl<'t, R: Rng> FollowerSampler<'t, R> {
    pub fn new(tree: &'t MergeTree, tables: &'t BigramTables, rng: R) -> Self {
        let mut by_first = vec![Vec::new(); tree.base_size()];
        for id in 0..tree.size() as TokenId {
            by_first[tree.first_base(id) as usize].push(id);
        }
        Self {
            tree,
            tables,
            by_first,
            rng,
        }
    }
}

impl<R: Rng> TokenSource for FollowerSampler<'_, R> {
    fn propose(&mut self, history: &[TokenId]) -> Option<TokenId> {
        let last = *history.last()?;
        let last_base = *self.tree.translate(last).ok()?.last()?;
        let followers = self.tables.tok2tok.followers(last_base)?;
        if followers.is_empty() {
            return None;
        }
        let pick = self.rng.random_range(0..followers.len());
        let first = *followers.iter().nth(pick)?;
        let ids = self.by_first.get(first as usize)?;
        if ids.is_empty() {
            return None;
        }
        ids.get(self.rng.random_range(0..ids.len())).copied()
    }
}

/// Any closure over the history is a source.
impl<F: FnMut(&[TokenId]) -> Option<TokenId>> TokenSource for F {
    fn propose(&mut self, history: &[TokenId]) -> Option<TokenId> {
        self(history)
    }
}

/// Why a session stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopCondition {
    /// The sentinel was accepted.
    DocumentEnd,
    /// `max_steps` tokens were accepted.
    StepBudget,
    /// The source returned `None`.
    SourceExhausted,
    /// `max_attempts` proposals in a row were rejected.
    AttemptsExhausted,
}

/// Outcome of `DecodeSession::run`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodeReport {
    /// Accepted ids, start token first.
    pub accepted: Vec<TokenId>,
    pub rejections: Vec<Rejection>,
    pub stop: StopCondition,
    /// The finished document with every open element closed.
    pub document: String,
}

/// Step limits for one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Maximum accepted tokens after the start token.
    pub max_steps: usize,
    /// Maximum proposals per step before giving up.
    pub max_attempts: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_steps: 5000,
            max_attempts: 64,
        }
    }
}

/// One validator and one interpreter sharing a start token.
pub struct DecodeSession<'t, W: Write> {
    validator: Validator<'t>,
    interpreter: Interpreter<'t, W>,
    sentinel: TokenId,
    start: TokenId,
}

impl<'t, W: Write> DecodeSession<'t, W> {
    /// Start from the vocabulary's start token.
    pub fn new(
        tree: &'t MergeTree,
        tables: &'t BigramTables,
        indents: &'t IndentTable,
        out: W,
    ) -> Result<Self> {
        let start = tree.start_token().ok_or(Error::MissingStartToken)?;
        Self::with_start(tree, tables, indents, start, out)
    }

    /// Start from an explicit (possibly composite) start token.
    pub fn with_start(
        tree: &'t MergeTree,
        tables: &'t BigramTables,
        indents: &'t IndentTable,
        start: TokenId,
        out: W,
    ) -> Result<Self> {
        Ok(Self {
            validator: Validator::new(tree, tables, start)?,
            interpreter: Interpreter::new(tree, indents, start, out),
            sentinel: tree.sentinel(),
            start,
        })
    }

    pub fn with_live_sink(mut self, sink: impl LiveSink + 't) -> Self {
        self.interpreter = self.interpreter.with_live_sink(sink);
        self
    }

    /// Decode until a stop condition and return the finished document.
    pub fn run<S: TokenSource + ?Sized>(
        mut self,
        source: &mut S,
        limits: DecodeLimits,
    ) -> Result<DecodeReport> {
        let mut accepted = vec![self.start];
        let mut rejections = Vec::new();

        let stop = 'steps: loop {
            if accepted.len() > limits.max_steps {
                break StopCondition::StepBudget;
            }
            let mut attempts = 0;
            loop {
                if attempts == limits.max_attempts {
                    break 'steps StopCondition::AttemptsExhausted;
                }
                attempts += 1;
                let Some(id) = source.propose(&accepted) else {
                    break 'steps StopCondition::SourceExhausted;
                };
                match self.validator.register_candidate(id) {
                    Ok(()) => {
                        accepted.push(id);
                        if id == self.sentinel {
                            break 'steps StopCondition::DocumentEnd;
                        }
                        self.interpreter.consume(id)?;
                        break;
                    }
                    Err(rejection) => {
                        debug!("rejected {id}: {rejection}");
                        rejections.push(rejection);
                    }
                }
            }
        };

        info!(
            "decode stopped ({stop:?}) after {} tokens, {} rejections",
            accepted.len(),
            rejections.len()
        );
        let document = self.interpreter.finish()?;
        Ok(DecodeReport {
            accepted,
            rejections,
            stop,
            document,
        })
    }
}
