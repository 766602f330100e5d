use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::{ChunkStrategy, DEFAULT_TOKEN_SIZE};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Defaults used by `reprocess` when the caller does not override them.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default)]
    pub strategy: ChunkStrategy,
    #[serde(default = "default_token_size")]
    pub token_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::Paragraph,
            token_size: DEFAULT_TOKEN_SIZE,
        }
    }
}

fn default_token_size() -> usize {
    DEFAULT_TOKEN_SIZE
}

#[derive(Debug, Deserialize, Clone)]
pub struct RankingConfig {
    /// Candidate count at which scoring moves to a background task.
    #[serde(default = "default_offload_threshold")]
    pub offload_threshold: usize,
    #[serde(default = "default_offload_timeout_ms")]
    pub offload_timeout_ms: u64,
    /// Leading characters of source text searched for query terms.
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
    #[serde(default = "default_max_terms")]
    pub max_terms: usize,
    /// Set to false to always score in-process.
    #[serde(default = "default_offload_enabled")]
    pub offload_enabled: bool,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            offload_threshold: default_offload_threshold(),
            offload_timeout_ms: default_offload_timeout_ms(),
            snippet_chars: default_snippet_chars(),
            max_terms: default_max_terms(),
            offload_enabled: default_offload_enabled(),
        }
    }
}

impl RankingConfig {
    pub fn offload_timeout(&self) -> Duration {
        Duration::from_millis(self.offload_timeout_ms)
    }
}

fn default_offload_threshold() -> usize {
    6
}
fn default_offload_timeout_ms() -> u64 {
    1200
}
fn default_snippet_chars() -> usize {
    2400
}
fn default_max_terms() -> usize {
    24
}
fn default_offload_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct BudgetConfig {
    /// Tokens held back for the model's own reply (never below 300).
    #[serde(default = "default_reserve_tokens")]
    pub reserve_tokens: usize,
    /// Context window assumed when the caller gives none.
    #[serde(default = "default_budget_tokens")]
    pub default_budget: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            reserve_tokens: default_reserve_tokens(),
            default_budget: default_budget_tokens(),
        }
    }
}

fn default_reserve_tokens() -> usize {
    300
}
fn default_budget_tokens() -> usize {
    4096
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Files larger than this are skipped without reading.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.md".to_string(),
        "**/*.txt".to_string(),
        "**/*.pdf".to_string(),
        "**/*.docx".to_string(),
    ]
}

fn default_max_file_bytes() -> u64 {
    50 * 1024 * 1024
}

impl Config {
    /// Config with every section at its default, pointing at `db_path`.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            chunking: ChunkingConfig::default(),
            ranking: RankingConfig::default(),
            budget: BudgetConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.token_size == 0 {
        anyhow::bail!("chunking.token_size must be > 0");
    }

    if config.ranking.max_terms == 0 {
        anyhow::bail!("ranking.max_terms must be >= 1");
    }

    if config.ranking.snippet_chars == 0 {
        anyhow::bail!("ranking.snippet_chars must be > 0");
    }

    if config.ranking.offload_timeout_ms == 0 {
        anyhow::bail!("ranking.offload_timeout_ms must be > 0");
    }

    if config.budget.default_budget == 0 {
        anyhow::bail!("budget.default_budget must be > 0");
    }

    if config.ingest.include_globs.is_empty() {
        anyhow::bail!("ingest.include_globs must list at least one pattern");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_db_section_is_required() {
        let config: Config = toml::from_str("[db]\npath = \"data/pctx.sqlite\"\n").unwrap();
        assert_eq!(config.ranking.offload_threshold, 6);
        assert_eq!(config.ranking.offload_timeout(), Duration::from_millis(1200));
        assert_eq!(config.budget.reserve_tokens, 300);
        assert_eq!(config.chunking.token_size, 120);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn strategy_parses_from_toml() {
        let config: Config = toml::from_str(
            "[db]\npath = \"x.sqlite\"\n[chunking]\nstrategy = \"section\"\ntoken_size = 64\n",
        )
        .unwrap();
        assert_eq!(config.chunking.strategy, ChunkStrategy::Section);
        assert_eq!(config.chunking.token_size, 64);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = Config::minimal("x.sqlite");
        config.ranking.max_terms = 0;
        assert!(validate(&config).is_err());

        let mut config = Config::minimal("x.sqlite");
        config.ingest.include_globs.clear();
        assert!(validate(&config).is_err());
    }
}
