use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::ledger::models::{BlockRange, ChainId};

/// What the binary computes
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Refunds still owed for recently executed bundles
    #[default]
    Pending,
    /// Refunds the next proposal would owe
    Next,
    /// A single `load_data` run over explicit block ranges
    Load,
}

fn default_bundle_lookback() -> usize {
    2
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Fixed chain order, hub chain first
    pub chain_id_list: Vec<ChainId>,
    pub snapshot_path: String,
    #[serde(default = "default_bundle_lookback")]
    pub bundle_lookback: usize,
    #[serde(default)]
    pub mode: RunMode,
    #[serde(default)]
    pub block_ranges: Vec<BlockRange>,
    #[serde(default = "default_true")]
    pub emit_diagnostics: bool,
}

impl Config {
    /// Load from `reconciler.toml` (optional) overlaid with `RECONCILER_*`
    /// variables. List values in the environment are comma separated.
    pub fn from_env() -> AppResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("reconciler").required(false))
            .add_source(
                config::Environment::with_prefix("RECONCILER")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("chain_id_list"),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn hub_chain_id(&self) -> AppResult<ChainId> {
        self.chain_id_list
            .first()
            .copied()
            .ok_or_else(|| AppError::Config("chain_id_list is empty".to_string()))
    }

    fn validate(&self) -> AppResult<()> {
        self.hub_chain_id()?;

        let mut seen = std::collections::HashSet::new();
        if let Some(duplicate) = self.chain_id_list.iter().find(|chain_id| !seen.insert(**chain_id)) {
            return Err(AppError::Config(format!("chain {} listed twice in chain_id_list", duplicate)));
        }

        if self.mode == RunMode::Load && self.block_ranges.is_empty() {
            return Err(AppError::Config("load mode requires block_ranges".to_string()));
        }
        if let Some(range) = self.block_ranges.iter().find(|range| range.start > range.end) {
            return Err(AppError::Config(format!(
                "block range [{}, {}] starts after it ends",
                range.start, range.end
            )));
        }

        Ok(())
    }
}
