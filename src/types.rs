//! Shared types for the ARBAAK aggregator.
//!
//! The normalized racing model (`Meeting` → `Race` → `Runner`), the transient
//! odds and discount records that get merged into it, and the domain error
//! enum. Parsers produce these, the reconciler consumes them.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Sentinel used by every upstream feed for a scratched runner.
pub const SCRATCH_MARKER: &str = "SCR";

/// Seconds east of UTC for Hong Kong racing time.
const HONG_KONG_OFFSET_SECS: i32 = 8 * 3600;

/// Fixed UTC+8 offset used to interpret naive feed timestamps.
pub fn hong_kong_offset() -> FixedOffset {
    FixedOffset::east_opt(HONG_KONG_OFFSET_SECS).expect("UTC+8 is a valid offset")
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Lifecycle status of a runner on the racecard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunnerStatus {
    Declared,
    Standby,
    Withdrawn,
    Ran,
    Scratched,
}

impl fmt::Display for RunnerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerStatus::Declared => write!(f, "Declared"),
            RunnerStatus::Standby => write!(f, "Standby"),
            RunnerStatus::Withdrawn => write!(f, "Withdrawn"),
            RunnerStatus::Ran => write!(f, "Ran"),
            RunnerStatus::Scratched => write!(f, "Scratched"),
        }
    }
}

/// Parse a feed status string (case-insensitive). Anything outside the
/// five known states is an error so the caller can reject the record.
impl std::str::FromStr for RunnerStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "declared" => Ok(RunnerStatus::Declared),
            "standby" => Ok(RunnerStatus::Standby),
            "withdrawn" => Ok(RunnerStatus::Withdrawn),
            "ran" => Ok(RunnerStatus::Ran),
            "scratched" => Ok(RunnerStatus::Scratched),
            _ => Err(anyhow::anyhow!("Unknown runner status: {s}")),
        }
    }
}

/// A single horse entry in a race.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Runner {
    pub id: String,
    /// Racing number; `None` until assigned (standby runners).
    pub no: Option<u32>,
    pub standby_no: Option<u32>,
    pub status: RunnerStatus,
    pub name_ch: String,
    pub name_en: String,
    pub horse_id: String,
    pub barrier_draw: Option<u32>,
    pub handicap_weight: Option<u32>,
    pub jockey_code: Option<String>,
    pub jockey_name_en: Option<String>,
    pub jockey_name_ch: Option<String>,
    pub trainer_code: Option<String>,
    pub trainer_name_en: Option<String>,
    pub trainer_name_ch: Option<String>,
    pub win_odds: Option<f64>,
    pub place_odds: Option<f64>,
    pub win_favourite: bool,
    pub place_favourite: bool,
}

impl Runner {
    /// Standby runners have no racing number and never join supplementary data.
    pub fn is_standby(&self) -> bool {
        self.status == RunnerStatus::Standby || self.no.is_none()
    }

    /// Horse name in the requested locale, falling back to the other one.
    pub fn name(&self, locale: Locale) -> &str {
        let (primary, fallback) = match locale {
            Locale::Chinese => (&self.name_ch, &self.name_en),
            Locale::English => (&self.name_en, &self.name_ch),
        };
        if primary.is_empty() { fallback } else { primary }
    }

    pub fn jockey_name(&self, locale: Locale) -> Option<&str> {
        pick_locale(locale, &self.jockey_name_ch, &self.jockey_name_en)
    }

    pub fn trainer_name(&self, locale: Locale) -> Option<&str> {
        pick_locale(locale, &self.trainer_name_ch, &self.trainer_name_en)
    }

    /// Helper to build a test runner with sensible defaults.
    #[cfg(test)]
    pub fn sample(no: u32) -> Self {
        Runner {
            id: format!("HK_2024_R1_{no}"),
            no: Some(no),
            standby_no: None,
            status: RunnerStatus::Declared,
            name_ch: format!("馬{no}"),
            name_en: format!("HORSE {no}"),
            horse_id: format!("HK_2020_A{no:03}"),
            barrier_draw: Some(no),
            handicap_weight: Some(120),
            jockey_code: Some("PZ".to_string()),
            jockey_name_en: Some("Z Purton".to_string()),
            jockey_name_ch: Some("潘頓".to_string()),
            trainer_code: Some("SJJ".to_string()),
            trainer_name_en: Some("J Size".to_string()),
            trainer_name_ch: Some("蔡約翰".to_string()),
            win_odds: None,
            place_odds: None,
            win_favourite: false,
            place_favourite: false,
        }
    }
}

fn pick_locale<'a>(
    locale: Locale,
    ch: &'a Option<String>,
    en: &'a Option<String>,
) -> Option<&'a str> {
    let (primary, fallback) = match locale {
        Locale::Chinese => (ch, en),
        Locale::English => (en, ch),
    };
    primary
        .as_deref()
        .filter(|s| !s.is_empty())
        .or_else(|| fallback.as_deref().filter(|s| !s.is_empty()))
}

/// Display locale for names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Locale {
    #[default]
    #[serde(rename = "ch")]
    Chinese,
    #[serde(rename = "en")]
    English,
}

// ---------------------------------------------------------------------------
// Race & Meeting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceTrack {
    pub description_en: Option<String>,
    pub description_ch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceCourse {
    pub description_en: Option<String>,
    pub description_ch: Option<String>,
    pub display_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Country {
    pub code: Option<String>,
    pub name_en: Option<String>,
    pub name_ch: Option<String>,
}

/// One race of a meeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Race {
    pub id: String,
    /// 1-based, unique within the meeting.
    pub no: u32,
    pub status: String,
    pub name_en: Option<String>,
    pub name_ch: Option<String>,
    pub post_time: Option<DateTime<FixedOffset>>,
    pub distance: Option<u32>,
    pub field_size: Option<u32>,
    pub track: Option<RaceTrack>,
    pub course: Option<RaceCourse>,
    pub runners: Vec<Runner>,
}

impl Race {
    /// Runners that carry a racing number and take part in joins.
    pub fn numbered_runners(&self) -> impl Iterator<Item = &Runner> {
        self.runners.iter().filter(|r| !r.is_standby())
    }

    pub fn name(&self, locale: Locale) -> Option<&str> {
        pick_locale(locale, &self.name_ch, &self.name_en)
    }

    /// Replace the runner list, keeping the first runner for each racing
    /// number. Standby runners are never deduplicated. Returns the numbers
    /// that were dropped.
    pub fn set_runners(&mut self, runners: impl IntoIterator<Item = Runner>) -> Vec<u32> {
        let mut seen = HashSet::new();
        let mut dropped = Vec::new();
        self.runners = runners
            .into_iter()
            .filter(|runner| match runner.no.filter(|_| !runner.is_standby()) {
                Some(n) if !seen.insert(n) => {
                    dropped.push(n);
                    false
                }
                _ => true,
            })
            .collect();
        dropped
    }

    /// Helper to build a test race with `count` declared runners.
    #[cfg(test)]
    pub fn sample(no: u32, count: u32) -> Self {
        Race {
            id: format!("HK_2024_R{no}"),
            no,
            status: "SELLING".to_string(),
            name_en: Some(format!("RACE {no} HANDICAP")),
            name_ch: Some(format!("第{no}場讓賽")),
            post_time: None,
            distance: Some(1200),
            field_size: Some(count),
            track: None,
            course: None,
            runners: (1..=count).map(Runner::sample).collect(),
        }
    }
}

/// A wagering pool summary attached to a meeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub id: String,
    pub odds_type: Option<String>,
    pub status: Option<String>,
    pub sell_status: Option<String>,
    pub investment: Option<f64>,
    pub merged_pool_id: Option<String>,
    pub leg_races: Vec<u32>,
    pub last_update: Option<DateTime<FixedOffset>>,
}

/// A race meeting at one venue on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: String,
    pub status: String,
    pub venue_code: String,
    pub date: Option<NaiveDate>,
    pub meeting_type: Option<String>,
    pub country: Option<Country>,
    pub total_races: u32,
    pub current_race: u32,
    /// Ordered by race number, `1..=total_races` without gaps.
    pub races: Vec<Race>,
    pub pools: Vec<Pool>,
}

impl Meeting {
    pub fn race(&self, no: u32) -> Option<&Race> {
        self.races.iter().find(|r| r.no == no)
    }
}

impl fmt::Display for Meeting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let date = self
            .date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "unknown date".to_string());
        write!(
            f,
            "[{}] {} {} ({} races, status {})",
            self.id,
            date,
            self.venue_code,
            self.total_races,
            self.status,
        )
    }
}

// ---------------------------------------------------------------------------
// Odds
// ---------------------------------------------------------------------------

/// WIN/PLACE odds for one runner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PoolOdds {
    pub win: Option<f64>,
    pub place: Option<f64>,
    pub win_favourite: bool,
    pub place_favourite: bool,
}

/// Runner number → odds for a single race.
pub type OddsMap = BTreeMap<u32, PoolOdds>;

/// One runner's odds from the legacy win/place script feed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LegacyOdds {
    pub race_no: u32,
    pub runner_no: u32,
    pub win: Option<f64>,
    pub win_favourite: bool,
    pub place: Option<f64>,
    pub place_favourite: bool,
}

// ---------------------------------------------------------------------------
// Discounts
// ---------------------------------------------------------------------------

/// Operating mode of the discount provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscountMode {
    /// Backing a runner ("BET" on the wire).
    Back,
    /// Laying a runner ("EAT" on the wire).
    Lay,
}

impl DiscountMode {
    /// Three-letter tag used in the provider's session key.
    pub fn tag(&self) -> &'static str {
        match self {
            DiscountMode::Back => "BET",
            DiscountMode::Lay => "EAT",
        }
    }

    /// Endpoint path serving this mode.
    pub fn path(&self) -> &'static str {
        match self {
            DiscountMode::Back => "bdata",
            DiscountMode::Lay => "edata",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "BET" => Some(DiscountMode::Back),
            "EAT" => Some(DiscountMode::Lay),
            _ => None,
        }
    }
}

impl fmt::Display for DiscountMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscountMode::Back => write!(f, "back"),
            DiscountMode::Lay => write!(f, "lay"),
        }
    }
}

/// Best available discount tiers for one runner in one mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountRecord {
    pub race_no: u32,
    pub runner_no: u32,
    /// Minimum tier among rows with a win stake.
    pub win_discount: Option<f64>,
    /// Minimum tier among rows with a place stake.
    pub place_discount: Option<f64>,
    pub mode: DiscountMode,
    pub race_date: Option<NaiveDate>,
    pub location: String,
    pub timestamp: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific errors raised by parsers and the fetch cycle.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error(
        "Runner mismatch in race {race_no} at position {position}: WIN has {win_runner}, PLACE has {place_runner}"
    )]
    RunnerMismatch {
        race_no: u32,
        position: usize,
        win_runner: u32,
        place_runner: u32,
    },

    #[error("Malformed odds segment for race {race_no}: {reason}")]
    MalformedOdds { race_no: u32, reason: String },

    #[error("Racecard element missing for race {race_no}")]
    ElementMissing { race_no: u32 },

    #[error("Meeting not ready after {attempts} attempts")]
    MeetingNotReady { attempts: u32 },

    #[error("Script literal error at byte {offset}: {message}")]
    Literal { offset: usize, message: String },

    #[error("Malformed meeting script: {0}")]
    MeetingScript(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
