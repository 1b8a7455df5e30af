// scoretok — byte-pair-encoded MusicXML token pipeline.
//
// Offline, tokenized MusicXML documents are ingested into a raw record store,
// a vocabulary of composite tokens is grown over it by byte-pair encoding,
// and the corpus is rewritten with that vocabulary. Online, a model proposes
// composite token ids one at a time; each proposal is checked against bigram
// tables learned from the corpus and, once accepted, turned back into nested
// MusicXML with every closing tag inferred from element depth.
//
// Module overview:
// - `types.rs`:       Token id aliases and the vocabulary ceiling.
// - `error.rs`:       `Error` for every fallible operation in the crate.
// - `vocab.rs`:       `BaseVocab` (string ↔ id, token classes, sentinel).
// - `merge_tree.rs`:  `MergeTree`, the merge list as an expansion structure,
//                     plus its JSON persistence.
// - `encoder.rs`:     `MergeEncoder`, applies a merge list to one document in
//                     one pass.
// - `bpe.rs`:         Vocabulary growth over a bounded window and the parallel
//                     corpus rewrite.
// - `bigram.rs`:      tok2tok / tag2tag follower tables.
// - `corpus.rs`:      JSON-lines document reader and parallel ingest.
// - `validator.rs`:   Per-session acceptance check for proposed ids.
// - `indent.rs`:      Element depth table driving closing-tag inference.
// - `interpreter.rs`: Streaming token → markup reconstruction.
// - `decode.rs`:      `DecodeSession`, pairing a validator with an interpreter
//                     over a pluggable `TokenSource`.
// - `config.rs`:      `PipelineConfig`, JSON-loaded paths and tunables.
// - `pipeline.rs`:    The `prepare` / `render` / `sample` / `inspect` stages.
//
// Record files themselves (u16 big-endian, sentinel-delimited documents)
// live in the `scoretok_store` crate.

pub mod bigram;
pub mod bpe;
pub mod config;
pub mod corpus;
pub mod decode;
pub mod encoder;
pub mod error;
pub mod indent;
pub mod interpreter;
pub mod merge_tree;
pub mod pipeline;
pub mod types;
pub mod validator;
pub mod vocab;

pub use bigram::{BigramTables, FollowerTable};
pub use config::PipelineConfig;
pub use decode::{DecodeLimits, DecodeReport, DecodeSession, ReplaySource, StopCondition, TokenSource};
pub use error::{Error, Result};
pub use indent::IndentTable;
pub use interpreter::Interpreter;
pub use merge_tree::MergeTree;
pub use types::{Merge, TokenId, TokenPair};
pub use validator::{Rejection, Validator};
pub use vocab::BaseVocab;
