use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ReceiptError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Runtime knobs for the pipeline. Every section is optional in TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LarderConfig {
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub inventory: InventoryConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub rules: RulesConfig,
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchingConfig {
    /// Score at or above which a line is applied to the match without review.
    #[serde(default = "default_auto_threshold")]
    pub auto_threshold: f64,
    /// Score at or above which a line is matched but flagged for review.
    #[serde(default = "default_review_threshold")]
    pub review_threshold: f64,
    /// Candidates within this distance of the best score count as tied.
    #[serde(default = "default_tie_epsilon")]
    pub tie_epsilon: f64,
    /// Weight of token overlap in the score; edit similarity gets the rest.
    #[serde(default = "default_token_weight")]
    pub token_weight: f64,
}

fn default_auto_threshold() -> f64 {
    0.85
}

fn default_review_threshold() -> f64 {
    0.60
}

fn default_tie_epsilon() -> f64 {
    0.01
}

fn default_token_weight() -> f64 {
    0.6
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            auto_threshold: default_auto_threshold(),
            review_threshold: default_review_threshold(),
            tie_epsilon: default_tie_epsilon(),
            token_weight: default_token_weight(),
        }
    }
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InventoryConfig {
    #[serde(default)]
    pub zero_stock: ZeroStockPolicy,
}

/// What happens to an item whose quantity reaches zero through consumption.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroStockPolicy {
    /// Delete the row; history keeps its line with a cleared reference.
    #[default]
    Remove,
    /// Keep the row at quantity 0 so the item can be restocked in place.
    Retain,
}

impl std::fmt::Display for ZeroStockPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remove => write!(f, "remove"),
            Self::Retain => write!(f, "retain"),
        }
    }
}

// ---------------------------------------------------------------------------
// Analytics + Rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalyticsConfig {
    #[serde(default = "default_top_items")]
    pub top_items: usize,
}

fn default_top_items() -> usize {
    10
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            top_items: default_top_items(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RulesConfig {
    /// Rule table to load instead of the built-in one.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl LarderConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReceiptError> {
        let config: LarderConfig =
            toml::from_str(input).map_err(|e| ReceiptError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read `path` if it exists; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ReceiptError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(ReceiptError::ConfigParse(format!(
                "cannot read {}: {e}",
                path.display()
            ))),
        }
    }

    pub fn validate(&self) -> Result<(), ReceiptError> {
        let m = &self.matching;

        for (name, value) in [
            ("auto_threshold", m.auto_threshold),
            ("review_threshold", m.review_threshold),
            ("token_weight", m.token_weight),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ReceiptError::ConfigValidation(format!(
                    "matching.{name} must be within [0, 1], got {value}"
                )));
            }
        }

        if m.review_threshold > m.auto_threshold {
            return Err(ReceiptError::ConfigValidation(format!(
                "matching.review_threshold ({}) must not exceed auto_threshold ({})",
                m.review_threshold, m.auto_threshold
            )));
        }

        if !(0.0..1.0).contains(&m.tie_epsilon) {
            return Err(ReceiptError::ConfigValidation(format!(
                "matching.tie_epsilon must be within [0, 1), got {}",
                m.tie_epsilon
            )));
        }

        if self.analytics.top_items == 0 {
            return Err(ReceiptError::ConfigValidation(
                "analytics.top_items must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
