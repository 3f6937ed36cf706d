//! Discount provider parser.
//!
//! The provider answers with a JSON object wrapped in two junk characters on
//! each side. Inside, `cookieKey` names the mode, date and location
//! (`EAT_22-09-2024_3H_1727000000`), `pendingData` is a tab-separated table
//! of open orders and `ts` is the snapshot time in epoch milliseconds.

use chrono::{DateTime, NaiveDate, Utc};
use regex::{Captures, Regex};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::{debug, warn};

use super::lenient::{self, opt_string};
use crate::types::{DiscountMode, DiscountRecord};

/// Bodies shorter than this never carry a usable table.
pub const MIN_RESPONSE_LEN: usize = 140;

/// Characters wrapped around the JSON payload on each side.
const WRAPPER_LEN: usize = 2;

fn session_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"([A-Z]{3})_(\d{2}-\d{2}-\d{4})_(\d{0,3}[A-Z]{0,2})_\d+")
            .expect("valid session key regex")
    })
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "cookieKey", default, deserialize_with = "opt_string")]
    cookie_key: Option<String>,
    #[serde(rename = "pendingData", default, deserialize_with = "opt_string")]
    pending_data: Option<String>,
    #[serde(default)]
    ts: Option<Value>,
}

/// One open order row: race, runner, win stake, place stake, discount tier.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingRow {
    race_no: u32,
    runner_no: u32,
    win_stake: f64,
    place_stake: f64,
    tier: f64,
}

/// Cheap validity gate applied before any JSON work.
pub fn is_valid_response(body: &str) -> bool {
    body.len() >= MIN_RESPONSE_LEN && session_key_pattern().is_match(body)
}

/// Parse a discount response into one record per (race, runner), ordered
/// by race then runner. Invalid bodies yield an empty list.
pub fn parse_discount_feed(body: &str) -> Vec<DiscountRecord> {
    if !is_valid_response(body) {
        debug!(len = body.len(), "Discount response failed validity gate");
        return Vec::new();
    }

    let Some(inner) = strip_wrapper(body) else {
        warn!(len = body.len(), "Discount response too short to unwrap");
        return Vec::new();
    };
    let envelope: Envelope = match serde_json::from_str(inner) {
        Ok(e) => e,
        Err(e) => {
            warn!(error = %e, "Discount response is not valid JSON");
            return Vec::new();
        }
    };

    let cookie_key = envelope.cookie_key.unwrap_or_default();
    let Some(key) = session_key_pattern().captures(&cookie_key) else {
        warn!(cookie_key = %cookie_key, "Discount cookieKey has no session key");
        return Vec::new();
    };
    let Some(mode) = DiscountMode::from_tag(&key[1]) else {
        warn!(tag = &key[1], "Unknown discount mode tag");
        return Vec::new();
    };
    let race_date = NaiveDate::parse_from_str(&key[2], "%d-%m-%Y").ok();
    let location = key_location(&key);
    let timestamp = envelope.ts.as_ref().and_then(parse_timestamp);

    let rows: Vec<PendingRow> = envelope
        .pending_data
        .as_deref()
        .unwrap_or_default()
        .lines()
        .filter_map(parse_row)
        .collect();

    let records = summarize(&rows, mode, race_date, &location, timestamp);
    debug!(%mode, rows = rows.len(), records = records.len(), "Discount feed parsed");
    records
}

fn strip_wrapper(body: &str) -> Option<&str> {
    let end = body.len().checked_sub(WRAPPER_LEN)?;
    body.get(WRAPPER_LEN..end)
}

fn key_location(key: &Captures<'_>) -> String {
    key.get(3).map(|m| m.as_str().to_string()).unwrap_or_default()
}

/// Epoch milliseconds (number or numeric string) to a UTC instant.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let millis = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }?;
    DateTime::from_timestamp_millis(millis)
}

fn parse_row(line: &str) -> Option<PendingRow> {
    let line = line.trim_end_matches('\r');
    if line.trim().is_empty() {
        return None;
    }
    let parsed = row_from_fields(line.split('\t').map(str::trim));
    if parsed.is_none() {
        debug!(line, "Skipping discount row without five numeric fields");
    }
    parsed
}

fn row_from_fields<'a>(mut fields: impl Iterator<Item = &'a str>) -> Option<PendingRow> {
    let mut next_number = || fields.next().and_then(lenient::parse_number);
    Some(PendingRow {
        race_no: whole(next_number()?)?,
        runner_no: whole(next_number()?)?,
        win_stake: next_number()?,
        place_stake: next_number()?,
        tier: next_number()?,
    })
}

fn whole(v: f64) -> Option<u32> {
    (v >= 0.0 && v.fract() == 0.0 && v <= u32::MAX as f64).then_some(v as u32)
}

/// Group rows by (race, runner) and take the minimum tier per pool.
fn summarize(
    rows: &[PendingRow],
    mode: DiscountMode,
    race_date: Option<NaiveDate>,
    location: &str,
    timestamp: Option<DateTime<Utc>>,
) -> Vec<DiscountRecord> {
    let mut groups: BTreeMap<(u32, u32), (Option<f64>, Option<f64>)> = BTreeMap::new();
    for row in rows {
        let (win, place) = groups.entry((row.race_no, row.runner_no)).or_default();
        if row.win_stake > 0.0 {
            *win = Some(win.map_or(row.tier, |w| w.min(row.tier)));
        }
        if row.place_stake > 0.0 {
            *place = Some(place.map_or(row.tier, |p| p.min(row.tier)));
        }
    }

    groups
        .into_iter()
        .map(|((race_no, runner_no), (win, place))| DiscountRecord {
            race_no,
            runner_no,
            win_discount: win,
            place_discount: place,
            mode,
            race_date,
            location: location.to_string(),
            timestamp,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
