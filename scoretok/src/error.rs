// Error type for the scoretok crate.
//
// Store-level failures are wrapped transparently so their messages pass
// through unchanged. Validator rejections are not errors; they are
// `validator::Rejection` values returned to the decoding caller.

use std::path::PathBuf;

use scoretok_store::StoreError;
use thiserror::Error;

use crate::types::TokenId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A persisted artifact parsed but failed validation.
    #[error("invalid {artifact}: {reason}")]
    InvalidArtifact {
        artifact: &'static str,
        reason: String,
    },

    #[error("unknown token id {0}")]
    UnknownToken(TokenId),

    /// A document contains a string that is not in the base vocabulary.
    #[error("token text {0:?} is not in the base vocabulary")]
    UnknownText(String),

    #[error("token id {0} is not a tag")]
    NotATag(TokenId),

    #[error("no indent level for tag <{0}>")]
    MissingIndent(String),

    #[error("the base vocabulary has no score-partwise start token")]
    MissingStartToken,

    #[error("destination {} already holds data; clear it before rerunning", .0.display())]
    DestinationNotEmpty(PathBuf),

    #[error("config error: {0}")]
    Config(String),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("progress bar template: {0}")]
    ProgressBar(#[from] indicatif::style::TemplateError),
}

impl Error {
    pub(crate) fn invalid(artifact: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidArtifact {
            artifact,
            reason: reason.into(),
        }
    }
}
