//! Legacy racecard page parser.
//!
//! The racecard HTML embeds its runners as JavaScript array literals
//! (`... = [[{...}, {...}]];`) inside one script element. The arrays are
//! read with the structured literal parser, flattened one level and tagged
//! with the race number they were fetched for.

use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::{debug, warn};

use super::lenient::{flag, opt_string, opt_u32};
use super::literal::parse_literal;
use crate::types::{FeedError, Runner, RunnerStatus};

const SCRIPT_SELECTOR: &str = "#container > div > div > div:nth-of-type(2) > script";

fn script_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| Selector::parse(SCRIPT_SELECTOR).expect("valid racecard selector"))
}

fn runner_list_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r" = (\[.+?\]);").expect("valid runner list regex"))
}

/// One runner row from the racecard script.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RaceCardEntry {
    /// Race the page was requested for; not part of the payload.
    #[serde(skip)]
    pub race_no: u32,
    #[serde(rename = "num", default, deserialize_with = "opt_u32")]
    pub runner_no: Option<u32>,
    #[serde(default, deserialize_with = "opt_string")]
    pub id: Option<String>,
    /// Display name in the page language.
    #[serde(default, deserialize_with = "opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub name_en: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub name_ch: Option<String>,
    #[serde(default, alias = "horseId", deserialize_with = "opt_string")]
    pub horse_id: Option<String>,
    #[serde(rename = "jockeyCode", alias = "jockey_code", default, deserialize_with = "opt_string")]
    pub jockey_code: Option<String>,
    #[serde(rename = "jockeyName", alias = "jockey_name", default, deserialize_with = "opt_string")]
    pub jockey_name: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub jockey_name_en: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub jockey_name_ch: Option<String>,
    #[serde(
        rename = "trainerCode",
        alias = "trainer_code",
        default,
        deserialize_with = "opt_string"
    )]
    pub trainer_code: Option<String>,
    #[serde(
        rename = "trainerName",
        alias = "trainer_name",
        default,
        deserialize_with = "opt_string"
    )]
    pub trainer_name: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub trainer_name_en: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub trainer_name_ch: Option<String>,
    #[serde(rename = "handicapWeight", default, deserialize_with = "opt_u32")]
    pub handicap_weight: Option<u32>,
    #[serde(rename = "barDraw", default, deserialize_with = "opt_u32")]
    pub barrier_draw: Option<u32>,
    #[serde(rename = "standbyStatus", default, deserialize_with = "flag")]
    pub standby: bool,
    #[serde(default, deserialize_with = "flag")]
    pub scratched: bool,
}

impl RaceCardEntry {
    pub fn status(&self) -> RunnerStatus {
        if self.scratched {
            RunnerStatus::Scratched
        } else if self.standby || self.runner_no.is_none() {
            RunnerStatus::Standby
        } else {
            RunnerStatus::Declared
        }
    }

    /// Convert into the shared runner model. The page is served in Chinese,
    /// so the unsuffixed names fill the Chinese slots.
    pub fn into_runner(self) -> Runner {
        let status = self.status();
        let no = match status {
            RunnerStatus::Standby => None,
            _ => self.runner_no,
        };
        let id = self.id.unwrap_or_else(|| {
            format!(
                "R{}_{}",
                self.race_no,
                self.runner_no.map(|n| n.to_string()).unwrap_or_default()
            )
        });
        Runner {
            id,
            no,
            standby_no: if no.is_none() { self.runner_no } else { None },
            status,
            name_ch: self.name_ch.or(self.name).unwrap_or_default(),
            name_en: self.name_en.unwrap_or_default(),
            horse_id: self.horse_id.unwrap_or_default(),
            barrier_draw: self.barrier_draw,
            handicap_weight: self.handicap_weight,
            jockey_code: self.jockey_code,
            jockey_name_en: self.jockey_name_en,
            jockey_name_ch: self.jockey_name_ch.or(self.jockey_name),
            trainer_code: self.trainer_code,
            trainer_name_en: self.trainer_name_en,
            trainer_name_ch: self.trainer_name_ch.or(self.trainer_name),
            win_odds: None,
            place_odds: None,
            win_favourite: false,
            place_favourite: false,
        }
    }
}

/// Extract the runner entries of one racecard page.
///
/// A page without the runner script is `FeedError::ElementMissing`; the
/// site serves such pages transiently and the caller retries.
pub fn parse_racecard(html: &str, race_no: u32) -> Result<Vec<RaceCardEntry>, FeedError> {
    let document = Html::parse_document(html);
    let script = document
        .select(script_selector())
        .next()
        .ok_or(FeedError::ElementMissing { race_no })?;
    let text: String = script.text().collect();

    let mut entries = Vec::new();
    for caps in runner_list_pattern().captures_iter(&text) {
        let list = match parse_literal(&caps[1]) {
            Ok(Value::Array(items)) => items,
            Ok(_) => continue,
            Err(e) => {
                warn!(race_no, error = %e, "Skipping unreadable racecard literal");
                continue;
            }
        };
        for card in list {
            match card {
                Value::Array(inner) => {
                    entries.extend(inner.into_iter().filter_map(|v| decode_entry(v, race_no)))
                }
                obj @ Value::Object(_) => entries.extend(decode_entry(obj, race_no)),
                other => debug!(race_no, value = %other, "Unexpected racecard item"),
            }
        }
    }

    debug!(race_no, entries = entries.len(), "Racecard parsed");
    Ok(entries)
}

fn decode_entry(value: Value, race_no: u32) -> Option<RaceCardEntry> {
    if !value.is_object() {
        debug!(race_no, value = %value, "Unexpected racecard item");
        return None;
    }
    match serde_json::from_value::<RaceCardEntry>(value) {
        Ok(mut entry) => {
            entry.race_no = race_no;
            Some(entry)
        }
        Err(e) => {
            warn!(race_no, error = %e, "Skipping undecodable racecard entry");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
