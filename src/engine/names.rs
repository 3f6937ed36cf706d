//! Jockey and trainer name abbreviation.

use std::collections::HashMap;

use crate::config::AbbreviationConfig;

/// Post-join display-name substitution. Unknown names come back unchanged.
pub trait NameLookup: Send + Sync {
    fn abbreviate_jockey<'a>(&'a self, name: &'a str) -> &'a str;
    fn abbreviate_trainer<'a>(&'a self, name: &'a str) -> &'a str;
}

/// Table-driven lookup loaded from `[abbreviations]` in `config.toml`.
#[derive(Debug, Clone, Default)]
pub struct NameAbbreviations {
    jockeys: HashMap<String, String>,
    trainers: HashMap<String, String>,
}

impl NameAbbreviations {
    pub fn new(jockeys: HashMap<String, String>, trainers: HashMap<String, String>) -> Self {
        Self { jockeys, trainers }
    }

    pub fn from_config(cfg: &AbbreviationConfig) -> Self {
        Self::new(cfg.jockeys.clone(), cfg.trainers.clone())
    }
}

impl NameLookup for NameAbbreviations {
    fn abbreviate_jockey<'a>(&'a self, name: &'a str) -> &'a str {
        self.jockeys.get(name).map(String::as_str).unwrap_or(name)
    }

    fn abbreviate_trainer<'a>(&'a self, name: &'a str) -> &'a str {
        self.trainers.get(name).map(String::as_str).unwrap_or(name)
    }
}

/// Lookup that never abbreviates.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullNames;

impl NameLookup for FullNames {
    fn abbreviate_jockey<'a>(&'a self, name: &'a str) -> &'a str {
        name
    }

    fn abbreviate_trainer<'a>(&'a self, name: &'a str) -> &'a str {
        name
    }
}
