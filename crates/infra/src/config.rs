//! Procurement workflow configuration.
//!
//! Values come from `QUOTEFLOW_*` environment variables or a JSON document.
//! Anything not given keeps its default.

use anyhow::{Context as _, ensure};
use rust_decimal::Decimal;
use serde::Deserialize;

use quoteflow_core::DomainResult;
use quoteflow_observability::logging::LoggingConfig;
use quoteflow_pricing::Markup;
use quoteflow_reconciliation::DEFAULT_MATCH_THRESHOLD;

pub const ENV_MATCH_THRESHOLD: &str = "QUOTEFLOW_FUZZY_MATCH_THRESHOLD";
pub const ENV_DEFAULT_MARKUP: &str = "QUOTEFLOW_DEFAULT_MARKUP_PERCENT";
pub const ENV_ALLOW_REVISIONS: &str = "QUOTEFLOW_ALLOW_SUPPLIER_REVISIONS";
pub const ENV_LOG_FILTER: &str = "QUOTEFLOW_LOG_FILTER";
pub const ENV_LOG_JSON: &str = "QUOTEFLOW_LOG_JSON";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProcurementConfig {
    /// Minimum fuzzy-match score for a supplier line to be paired with a
    /// requested line by name.
    pub fuzzy_match_threshold: f64,
    /// Markup applied to every line that has no override.
    pub default_markup_percent: Decimal,
    /// Whether new invitations may resubmit without a studio override.
    pub allow_supplier_revisions: bool,
    pub logging: LoggingConfig,
}

impl Default for ProcurementConfig {
    fn default() -> Self {
        Self {
            fuzzy_match_threshold: DEFAULT_MATCH_THRESHOLD,
            default_markup_percent: Decimal::ZERO,
            allow_supplier_revisions: true,
            logging: LoggingConfig::default(),
        }
    }
}

impl ProcurementConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (environment, secrets store, test map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_MATCH_THRESHOLD) {
            config.fuzzy_match_threshold = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_MATCH_THRESHOLD}={raw} is not a number"))?;
        }
        if let Some(raw) = lookup(ENV_DEFAULT_MARKUP) {
            config.default_markup_percent = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_DEFAULT_MARKUP}={raw} is not a decimal"))?;
        }
        if let Some(raw) = lookup(ENV_ALLOW_REVISIONS) {
            config.allow_supplier_revisions = parse_bool(&raw)
                .with_context(|| format!("{ENV_ALLOW_REVISIONS}={raw} is not a boolean"))?;
        }
        if let Some(raw) = lookup(ENV_LOG_FILTER) {
            config.logging.filter = raw;
        }
        if let Some(raw) = lookup(ENV_LOG_JSON) {
            config.logging.json =
                parse_bool(&raw).with_context(|| format!("{ENV_LOG_JSON}={raw} is not a boolean"))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let config: Self =
            serde_json::from_str(raw).context("procurement configuration is not valid JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.fuzzy_match_threshold.is_finite()
                && self.fuzzy_match_threshold > 0.0
                && self.fuzzy_match_threshold <= 1.0,
            "fuzzy_match_threshold must be in (0, 1], got {}",
            self.fuzzy_match_threshold
        );
        ensure!(
            !self.default_markup_percent.is_sign_negative(),
            "default_markup_percent must not be negative, got {}",
            self.default_markup_percent
        );
        Ok(())
    }

    pub fn default_markup(&self) -> DomainResult<Markup> {
        Markup::new(self.default_markup_percent)
    }
}

fn parse_bool(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected true/false, got '{other}'"),
    }
}
