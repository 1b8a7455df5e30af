// Pipeline configuration.
//
// Every path and tunable the `scoretok` binary uses lives in
// `PipelineConfig`, loaded from JSON. Fields missing from the file take their
// defaults, so a config may list only what it changes. Relative paths are
// resolved against `data_root`; absolute paths are kept as given.
//
// The binary layers its command-line flags over the loaded config before
// calling `validate`.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bigram::{TAG2TAG_FILE, TOK2TOK_FILE};
use crate::bpe::{BpeOptions, DEFAULT_TOKEN_BUDGET};
use crate::decode::DecodeLimits;
use crate::error::{Error, Result};
use crate::types::MAX_VOCAB_SIZE;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory every relative path below is resolved against.
    pub data_root: PathBuf,
    /// Tokenized documents, one JSON string array per line.
    pub documents: PathBuf,
    /// Raw record store written by ingest.
    pub raw_store: PathBuf,
    /// Compressed record store written by the BPE rewrite.
    pub compressed_store: PathBuf,
    /// Merge tree JSON (`stoi` plus merges).
    pub tokens_file: PathBuf,
    pub tok2tok_file: PathBuf,
    pub tag2tag_file: PathBuf,
    /// Replaces the built-in MusicXML depth table when set.
    pub indent_table: Option<PathBuf>,
    /// Receives well-formed snapshots while rendering when set.
    pub live_output: Option<PathBuf>,
    /// Maximum ints loaded for vocabulary growth.
    pub token_budget: usize,
    /// Vocabulary size to grow to, base tokens included.
    pub target_vocab_size: usize,
    /// Worker threads for ingest and rewrite. `0` uses every available core.
    pub parallelism: usize,
    pub show_progress: bool,
    /// Most tokens a render accepts after the start token.
    pub max_decode_steps: usize,
    /// Most proposals per decode step.
    pub max_decode_attempts: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let limits = DecodeLimits::default();
        Self {
            data_root: PathBuf::from("data"),
            documents: PathBuf::from("documents.jsonl"),
            raw_store: PathBuf::from("raw.bin"),
            compressed_store: PathBuf::from("compressed.bin"),
            tokens_file: PathBuf::from("tokens.json"),
            tok2tok_file: PathBuf::from(TOK2TOK_FILE),
            tag2tag_file: PathBuf::from(TAG2TAG_FILE),
            indent_table: None,
            live_output: None,
            token_budget: DEFAULT_TOKEN_BUDGET,
            target_vocab_size: MAX_VOCAB_SIZE,
            parallelism: 0,
            show_progress: true,
            max_decode_steps: limits.max_steps,
            max_decode_attempts: limits.max_attempts,
        }
    }
}

impl PipelineConfig {
    /// Load a JSON config. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no stage can run with.
    pub fn validate(&self) -> Result<()> {
        if self.target_vocab_size > MAX_VOCAB_SIZE {
            return Err(Error::Config(format!(
                "target_vocab_size {} exceeds {MAX_VOCAB_SIZE}",
                self.target_vocab_size
            )));
        }
        if self.token_budget == 0 {
            return Err(Error::Config("token_budget must be positive".into()));
        }
        if self.max_decode_attempts == 0 {
            return Err(Error::Config("max_decode_attempts must be positive".into()));
        }
        Ok(())
    }

    /// `path` under `data_root` unless it is already absolute.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_root.join(path)
        }
    }

    pub fn documents_path(&self) -> PathBuf {
        self.resolve(&self.documents)
    }

    pub fn raw_store_path(&self) -> PathBuf {
        self.resolve(&self.raw_store)
    }

    pub fn compressed_store_path(&self) -> PathBuf {
        self.resolve(&self.compressed_store)
    }

    pub fn tokens_path(&self) -> PathBuf {
        self.resolve(&self.tokens_file)
    }

    pub fn tok2tok_path(&self) -> PathBuf {
        self.resolve(&self.tok2tok_file)
    }

    pub fn tag2tag_path(&self) -> PathBuf {
        self.resolve(&self.tag2tag_file)
    }

    pub fn indent_table_path(&self) -> Option<PathBuf> {
        self.indent_table.as_deref().map(|p| self.resolve(p))
    }

    pub fn live_output_path(&self) -> Option<PathBuf> {
        self.live_output.as_deref().map(|p| self.resolve(p))
    }

    /// Worker count with `0` replaced by the core count.
    pub fn worker_count(&self) -> usize {
        if self.parallelism == 0 {
            std::thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            self.parallelism
        }
    }

    pub fn bpe_options(&self) -> BpeOptions {
        BpeOptions {
            source: self.raw_store_path(),
            destination: self.compressed_store_path(),
            token_budget: self.token_budget,
            target_vocab_size: self.target_vocab_size,
            parallelism: self.worker_count(),
            show_progress: self.show_progress,
        }
    }

    pub fn decode_limits(&self) -> DecodeLimits {
        DecodeLimits {
            max_steps: self.max_decode_steps,
            max_attempts: self.max_decode_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let restored: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, restored);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let json = r#"{"data_root": "/srv/scores", "target_vocab_size": 4096}"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.target_vocab_size, 4096);
        assert_eq!(config.tokens_file, PathBuf::from("tokens.json"));
        assert_eq!(config.raw_store_path(), PathBuf::from("/srv/scores/raw.bin"));
        assert_eq!(config.tok2tok_path(), PathBuf::from("/srv/scores/tok2tok.json"));
        assert_eq!(config.indent_table_path(), None);
    }

    #[test]
    fn absolute_paths_bypass_data_root() {
        let config = PipelineConfig {
            data_root: PathBuf::from("/srv/scores"),
            live_output: Some(PathBuf::from("/tmp/live.xml")),
            ..PipelineConfig::default()
        };
        assert_eq!(config.live_output_path(), Some(PathBuf::from("/tmp/live.xml")));
    }

    #[test]
    fn rejects_oversized_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"target_vocab_size": 70000}"#).unwrap();
        assert!(matches!(PipelineConfig::load(&path), Err(Error::Config(_))));

        std::fs::write(&path, r#"{"target_vocab_size": 65536}"#).unwrap();
        assert_eq!(PipelineConfig::load(&path).unwrap().target_vocab_size, 65536);
    }

    #[test]
    fn zero_parallelism_means_every_core() {
        let config = PipelineConfig::default();
        assert!(config.worker_count() >= 1);
        let config = PipelineConfig {
            parallelism: 3,
            ..PipelineConfig::default()
        };
        assert_eq!(config.bpe_options().parallelism, 3);
    }
}
