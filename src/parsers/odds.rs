//! WIN/PLACE odds parsers.
//!
//! Two upstream shapes end up in the same `OddsMap`:
//! - the GraphQL `pmPools` response, one race per request;
//! - the legacy `winplaodds` text blob, all remaining races of a meeting
//!   in one body (`@@@` between races, `#` between the WIN and PLACE blocks).

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::{debug, error, info, warn};

use super::lenient::{self, flag, opt_string, seq};
use crate::types::{FeedError, LegacyOdds, OddsMap, PoolOdds, SCRATCH_MARKER};

/// Separates races in the legacy odds blob. The first segment is a header.
const RACE_SEPARATOR: &str = "@@@";
/// Separates the WIN block from the PLACE block inside a race segment.
const POOL_SEPARATOR: char = '#';

fn odds_entry_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+)=([\w.]+)=(\d)").expect("valid odds regex"))
}

// ---------------------------------------------------------------------------
// GraphQL pools
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WinPlace {
    Win,
    Place,
}

impl WinPlace {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "WIN" => Some(WinPlace::Win),
            "PLA" | "PLACE" => Some(WinPlace::Place),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPool {
    #[serde(rename = "oddsType", default, deserialize_with = "opt_string")]
    odds_type: Option<String>,
    #[serde(rename = "oddsNodes", default, deserialize_with = "seq")]
    nodes: Vec<RawOddsNode>,
}

#[derive(Debug, Deserialize)]
struct RawOddsNode {
    #[serde(rename = "combString", default, deserialize_with = "opt_string")]
    comb_string: Option<String>,
    #[serde(rename = "oddsValue", default)]
    odds_value: Option<Value>,
    #[serde(rename = "hotFavourite", default, deserialize_with = "flag")]
    hot_favourite: bool,
}

/// Build a runner → odds map from a GraphQL odds response.
///
/// Only WIN and PLACE pools are read; every other pool type in the same
/// response is ignored before the combination code is interpreted.
pub fn parse_pool_odds(response: &Value) -> OddsMap {
    let mut odds = OddsMap::new();

    let Some(data) = response.get("data").filter(|d| !d.is_null()) else {
        error!("Invalid odds response or no data");
        return odds;
    };

    let meetings = data
        .get("raceMeetings")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for meeting in meetings {
        let pools = meeting
            .get("pmPools")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for pool_value in pools {
            let pool: RawPool = match serde_json::from_value(pool_value.clone()) {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable odds pool");
                    continue;
                }
            };
            let Some(kind) = pool.odds_type.as_deref().and_then(WinPlace::from_tag) else {
                continue;
            };

            for node in pool.nodes {
                let comb = node.comb_string.unwrap_or_default();
                let Ok(runner_no) = comb.parse::<u32>() else {
                    warn!(comb_string = %comb, "Skipping odds node with non-numeric runner code");
                    continue;
                };
                let value = node.odds_value.as_ref().and_then(lenient::number_from_value);
                let entry = odds.entry(runner_no).or_default();
                match kind {
                    WinPlace::Win => {
                        entry.win = value;
                        entry.win_favourite = node.hot_favourite;
                    }
                    WinPlace::Place => {
                        entry.place = value;
                        entry.place_favourite = node.hot_favourite;
                    }
                }
            }
        }
    }

    debug!(runners = odds.len(), "Pool odds parsed");
    odds
}

// ---------------------------------------------------------------------------
// Legacy win/place blob
// ---------------------------------------------------------------------------

/// Split the blob into `(race_no, segment)` pairs. Race numbers start at 1
/// and follow segment position; the leading header segment is dropped.
pub fn split_races(body: &str) -> Vec<(u32, &str)> {
    body.trim()
        .split(RACE_SEPARATOR)
        .skip(1)
        .enumerate()
        .map(|(idx, segment)| (idx as u32 + 1, segment))
        .collect()
}

/// Parse one race segment (`WIN block # PLACE block`).
pub fn parse_race_odds(race_no: u32, segment: &str) -> Result<Vec<LegacyOdds>, FeedError> {
    let mut blocks = segment.split(POOL_SEPARATOR);
    let (Some(win_block), Some(place_block), None) = (blocks.next(), blocks.next(), blocks.next())
    else {
        return Err(FeedError::MalformedOdds {
            race_no,
            reason: format!(
                "expected exactly one '{POOL_SEPARATOR}' between WIN and PLACE, found {}",
                segment.matches(POOL_SEPARATOR).count()
            ),
        });
    };

    let pattern = odds_entry_pattern();
    let win_entries: Vec<_> = pattern.captures_iter(win_block).collect();
    let place_entries: Vec<_> = pattern.captures_iter(place_block).collect();
    if win_entries.len() != place_entries.len() {
        warn!(
            race_no,
            win = win_entries.len(),
            place = place_entries.len(),
            "WIN and PLACE blocks differ in length; extra entries ignored"
        );
    }

    let mut records = Vec::with_capacity(win_entries.len());
    for (position, (win, place)) in win_entries.iter().zip(place_entries.iter()).enumerate() {
        let win_runner = parse_runner_no(&win[1], race_no)?;
        let place_runner = parse_runner_no(&place[1], race_no)?;
        if win_runner != place_runner {
            return Err(FeedError::RunnerMismatch {
                race_no,
                position,
                win_runner,
                place_runner,
            });
        }

        if &win[2] == SCRATCH_MARKER {
            info!(race_no, runner_no = win_runner, "Runner scratched");
            continue;
        }

        records.push(LegacyOdds {
            race_no,
            runner_no: win_runner,
            win: parse_odds_value(&win[2]),
            win_favourite: &win[3] == "1",
            place: parse_odds_value(&place[2]),
            place_favourite: &place[3] == "1",
        });
    }

    Ok(records)
}

/// Parse the whole blob, failing on the first inconsistent race.
pub fn parse_win_place_odds(body: &str) -> Result<Vec<LegacyOdds>, FeedError> {
    let mut all = Vec::new();
    for (race_no, segment) in split_races(body) {
        debug!(race_no, "Processing race odds");
        all.extend(parse_race_odds(race_no, segment)?);
    }
    Ok(all)
}

/// Collect one race's legacy records into an `OddsMap`.
pub fn odds_map_for_race(records: &[LegacyOdds], race_no: u32) -> OddsMap {
    records
        .iter()
        .filter(|r| r.race_no == race_no)
        .map(|r| {
            (
                r.runner_no,
                PoolOdds {
                    win: r.win,
                    place: r.place,
                    win_favourite: r.win_favourite,
                    place_favourite: r.place_favourite,
                },
            )
        })
        .collect()
}

fn parse_runner_no(raw: &str, race_no: u32) -> Result<u32, FeedError> {
    raw.parse().map_err(|_| FeedError::MalformedOdds {
        race_no,
        reason: format!("runner number '{raw}' out of range"),
    })
}

/// Plain non-negative decimals only; anything else is absent.
fn parse_odds_value(raw: &str) -> Option<f64> {
    let digits_and_one_dot = raw.chars().all(|c| c.is_ascii_digit() || c == '.')
        && raw.matches('.').count() <= 1
        && raw.chars().any(|c| c.is_ascii_digit());
    if digits_and_one_dot {
        raw.parse().ok()
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
