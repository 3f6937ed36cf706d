//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every tunable has a default so a partial file (or only the
//! abbreviation tables) is enough to run.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;

use crate::types::Locale;

/// Environment variable overriding the config file path.
pub const CONFIG_PATH_ENV: &str = "ARBAAK_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub racing: RacingConfig,
    pub legacy: LegacyConfig,
    pub discount: DiscountConfig,
    pub abbreviations: AbbreviationConfig,
}

/// Which upstream provides the racecard and WIN/PLACE odds.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeedSource {
    /// GraphQL meeting and odds queries.
    #[default]
    Graphql,
    /// Bet site meeting script, racecard pages and win/place blob.
    Legacy,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub source: FeedSource,
    pub locale: Locale,
    /// Venue code to show; `None` takes the first meeting of the day.
    pub venue: Option<String>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "ARBAAK".to_string(),
            source: FeedSource::default(),
            locale: Locale::default(),
            venue: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RacingConfig {
    pub graphql_url: String,
    pub timeout_secs: u64,
    pub odds_types: Vec<String>,
}

impl Default for RacingConfig {
    fn default() -> Self {
        Self {
            graphql_url: "https://info.cld.hkjc.com/graphql/base/".to_string(),
            timeout_secs: 10,
            odds_types: vec!["WIN".to_string(), "PLA".to_string()],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LegacyConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Upper bound on meeting-script polls before giving up.
    pub poll_max_attempts: u32,
    /// Poll backoff is uniform in `0..poll_jitter_ms`.
    pub poll_jitter_ms: u64,
    pub racecard_attempts: u32,
    pub racecard_retry_delay_ms: u64,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            base_url: "https://bet.hkjc.com".to_string(),
            timeout_secs: 10,
            poll_max_attempts: 20,
            poll_jitter_ms: 1000,
            racecard_attempts: 3,
            racecard_retry_delay_ms: 200,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DiscountConfig {
    pub enabled: bool,
    pub base_url: String,
    /// Provider's `race_type` code for Hong Kong racing.
    pub location: String,
    pub timeout_secs: u64,
    pub cache_ttl_secs: i64,
}

impl Default for DiscountConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://info.mdataone.com".to_string(),
            location: "3H".to_string(),
            timeout_secs: 3,
            cache_ttl_secs: 10,
        }
    }
}

/// Full name → short display name.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AbbreviationConfig {
    pub jockeys: HashMap<String, String>,
    pub trainers: HashMap<String, String>,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Path from `ARBAAK_CONFIG`, or `config.toml` in the working directory.
    pub fn default_path() -> String {
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.legacy.poll_max_attempts > 0,
            "legacy.poll_max_attempts must be at least 1"
        );
        anyhow::ensure!(
            self.legacy.racecard_attempts > 0,
            "legacy.racecard_attempts must be at least 1"
        );
        anyhow::ensure!(
            self.discount.cache_ttl_secs >= 0,
            "discount.cache_ttl_secs must not be negative"
        );
        Ok(())
    }
}
