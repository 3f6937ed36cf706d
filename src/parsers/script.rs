//! Legacy meeting script (`rsdata.js`).
//!
//! The body is a list of `var camelName = <literal>;` lines. Values go
//! through the literal parser and keys are snake-cased; only the handful
//! of keys the aggregator needs are lifted into `MeetingScript`.

use chrono::{DateTime, FixedOffset, NaiveDate};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{debug, warn};

use super::lenient;
use super::literal::parse_literal;
use crate::types::FeedError;

/// Marker whose presence means the meeting data has been published.
const READY_MARKER: &str = "mtgDate";

fn variable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\s*var (\w+) = (.+);\s*$").expect("valid variable regex")
    })
}

/// Meeting metadata published by the legacy bet site.
#[derive(Debug, Clone, PartialEq)]
pub struct MeetingScript {
    pub date: NaiveDate,
    pub total_races: u32,
    /// Races already run; their racecards are no longer served.
    pub ran_races: u32,
    pub venue: String,
    /// Indexed by race number minus one; absent when the feed sends "".
    pub post_times: Vec<Option<DateTime<FixedOffset>>>,
}

impl MeetingScript {
    /// Race numbers that still have racecards and odds.
    pub fn upcoming_races(&self) -> std::ops::RangeInclusive<u32> {
        (self.ran_races + 1)..=self.total_races
    }

    pub fn post_time(&self, race_no: u32) -> Option<DateTime<FixedOffset>> {
        let idx = race_no.checked_sub(1)? as usize;
        self.post_times.get(idx).copied().flatten()
    }
}

/// True once the script carries meeting data.
pub fn is_ready(body: &str) -> bool {
    body.contains(READY_MARKER)
}

/// `mtgTotalRace` → `mtg_total_race`.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Every `var` line of the script, keyed by snake-cased name. Lines whose
/// value is not a plain literal are skipped.
pub fn parse_variables(body: &str) -> HashMap<String, Value> {
    let pattern = variable_pattern();
    let mut vars = HashMap::new();
    for line in body.lines() {
        let Some(caps) = pattern.captures(line) else {
            continue;
        };
        match parse_literal(&caps[2]) {
            Ok(value) => {
                vars.insert(snake_case(&caps[1]), value);
            }
            Err(e) => debug!(name = &caps[1], error = %e, "Skipping non-literal script variable"),
        }
    }
    vars
}

/// Parse the meeting script into `MeetingScript`.
pub fn parse_meeting_script(body: &str) -> Result<MeetingScript, FeedError> {
    let vars = parse_variables(body);

    let date = vars
        .get("mtg_date")
        .and_then(Value::as_str)
        .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
        .ok_or_else(|| FeedError::MeetingScript("missing or invalid mtgDate".into()))?;
    let total_races = vars
        .get("mtg_total_race")
        .and_then(lenient::int_from_value)
        .ok_or_else(|| FeedError::MeetingScript("missing mtgTotalRace".into()))?;
    let ran_races = vars
        .get("mtg_ran_race")
        .and_then(lenient::int_from_value)
        .unwrap_or(0);
    let venue = vars
        .get("venue_short")
        .and_then(lenient::text_from_value)
        .ok_or_else(|| FeedError::MeetingScript("missing venueShort".into()))?;

    if ran_races > total_races {
        return Err(FeedError::MeetingScript(format!(
            "{ran_races} races ran out of {total_races}"
        )));
    }

    let post_times = match vars.get("race_post_time") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_str().and_then(lenient::parse_datetime))
            .collect(),
        Some(other) => {
            warn!(value = %other, "racePostTime is not a list");
            Vec::new()
        }
        None => Vec::new(),
    };

    Ok(MeetingScript {
        date,
        total_races,
        ran_races,
        venue,
        post_times,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    const SCRIPT: &str = r#"
var mtgDate = "2024-09-22";
var mtgTotalRace = 10;
var mtgRanRace = 2;
var venueShort = "ST";
var racePostTime = ["2024-09-22 12:45:00", "", "2024-09-22 13:45:00"];
var multiRacePoolsStr = buildPools(1, 2);
var isJackpot = true;
"#;

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("mtgTotalRace"), "mtg_total_race");
        assert_eq!(snake_case("venueShort"), "venue_short");
        assert_eq!(snake_case("Ab"), "ab");
    }

    #[test]
    fn test_parse_meeting_script() {
        let script = parse_meeting_script(SCRIPT).unwrap();
        assert_eq!(script.date, NaiveDate::from_ymd_opt(2024, 9, 22).unwrap());
        assert_eq!(script.total_races, 10);
        assert_eq!(script.ran_races, 2);
        assert_eq!(script.venue, "ST");
        assert_eq!(script.upcoming_races().collect::<Vec<_>>(), (3..=10).collect::<Vec<_>>());
        assert_eq!(script.post_time(1).map(|t| t.hour()), Some(12));
        assert_eq!(script.post_time(2), None);
        assert_eq!(script.post_time(3).map(|t| t.hour()), Some(13));
        assert_eq!(script.post_time(9), None);
        assert_eq!(script.post_time(0), None);
    }

    #[test]
    fn test_non_literal_variables_skipped() {
        let vars = parse_variables(SCRIPT);
        assert!(!vars.contains_key("multi_race_pools_str"));
        assert_eq!(vars.get("is_jackpot"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_ready_marker() {
        assert!(is_ready(SCRIPT));
        assert!(!is_ready("var isJackpot = false;"));
    }

    #[test]
    fn test_missing_fields_are_errors() {
        let err = parse_meeting_script("var mtgTotalRace = 8;").unwrap_err();
        assert!(matches!(err, FeedError::MeetingScript(_)));

        let err = parse_meeting_script("var mtgDate = \"2024-09-22\";\nvar venueShort = \"HV\";")
            .unwrap_err();
        assert!(err.to_string().contains("mtgTotalRace"));
    }

    #[test]
    fn test_ran_races_beyond_total_rejected() {
        let body =
            "var mtgDate = '2024-09-22';\nvar mtgTotalRace = 3;\nvar mtgRanRace = 4;\nvar venueShort = 'HV';";
        assert!(parse_meeting_script(body).is_err());
    }
}
