//! Meeting parser for the GraphQL racing feed.
//!
//! Turns a `raceMeetings` query response into `Meeting` → `Race` → `Runner`
//! trees. Each meeting, race and runner is decoded on its own so a single
//! malformed record never takes the rest of the response down with it.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::lenient::{self, opt_date, opt_datetime, opt_f64, opt_object, opt_string, opt_u32, seq};
use crate::types::{
    Country, Meeting, Pool, Race, RaceCourse, RaceTrack, Runner, RunnerStatus,
};

// ---------------------------------------------------------------------------
// API response types (GraphQL JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawMeeting {
    #[serde(default, deserialize_with = "opt_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    status: Option<String>,
    #[serde(rename = "venueCode", default, deserialize_with = "opt_string")]
    venue_code: Option<String>,
    #[serde(default, deserialize_with = "opt_date")]
    date: Option<chrono::NaiveDate>,
    #[serde(rename = "totalNumberOfRace", default, deserialize_with = "opt_u32")]
    total_races: Option<u32>,
    #[serde(rename = "currentNumberOfRace", default, deserialize_with = "opt_u32")]
    current_race: Option<u32>,
    #[serde(rename = "meetingType", default, deserialize_with = "opt_string")]
    meeting_type: Option<String>,
    /// A list on this feed, occasionally a bare object.
    #[serde(default)]
    country: Option<Value>,
    #[serde(default, deserialize_with = "seq")]
    races: Vec<Value>,
    #[serde(rename = "poolInvs", default, deserialize_with = "seq")]
    pools: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawRace {
    #[serde(default, deserialize_with = "opt_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "opt_u32")]
    no: Option<u32>,
    #[serde(default, deserialize_with = "opt_string")]
    status: Option<String>,
    #[serde(rename = "raceName_en", default, deserialize_with = "opt_string")]
    name_en: Option<String>,
    #[serde(rename = "raceName_ch", default, deserialize_with = "opt_string")]
    name_ch: Option<String>,
    #[serde(rename = "postTime", default, deserialize_with = "opt_datetime")]
    post_time: Option<chrono::DateTime<chrono::FixedOffset>>,
    #[serde(default, deserialize_with = "opt_u32")]
    distance: Option<u32>,
    #[serde(rename = "wageringFieldSize", default, deserialize_with = "opt_u32")]
    field_size: Option<u32>,
    #[serde(rename = "raceTrack", default, deserialize_with = "opt_object")]
    track: Option<RawDescription>,
    #[serde(rename = "raceCourse", default, deserialize_with = "opt_object")]
    course: Option<RawDescription>,
    #[serde(default, deserialize_with = "seq")]
    runners: Vec<Value>,
}

/// Shared shape of `raceTrack` and `raceCourse`.
#[derive(Debug, Deserialize)]
struct RawDescription {
    #[serde(default, deserialize_with = "opt_string")]
    description_en: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    description_ch: Option<String>,
    #[serde(rename = "displayCode", default, deserialize_with = "opt_string")]
    display_code: Option<String>,
}

impl RawDescription {
    fn is_empty(&self) -> bool {
        self.description_en.is_none()
            && self.description_ch.is_none()
            && self.display_code.is_none()
    }
}

#[derive(Debug, Deserialize)]
struct RawRunner {
    #[serde(default, deserialize_with = "opt_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "opt_u32")]
    no: Option<u32>,
    #[serde(rename = "standbyNo", default, deserialize_with = "opt_u32")]
    standby_no: Option<u32>,
    #[serde(default, deserialize_with = "opt_string")]
    status: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    name_ch: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    name_en: Option<String>,
    #[serde(default, deserialize_with = "opt_object")]
    horse: Option<RawHorse>,
    #[serde(rename = "barrierDrawNumber", default, deserialize_with = "opt_u32")]
    barrier_draw: Option<u32>,
    #[serde(rename = "handicapWeight", default, deserialize_with = "opt_u32")]
    handicap_weight: Option<u32>,
    #[serde(default, deserialize_with = "opt_object")]
    jockey: Option<RawPerson>,
    #[serde(default, deserialize_with = "opt_object")]
    trainer: Option<RawPerson>,
    #[serde(rename = "winOdds", default, deserialize_with = "opt_f64")]
    win_odds: Option<f64>,
    #[serde(rename = "placeOdds", default, deserialize_with = "opt_f64")]
    place_odds: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawHorse {
    #[serde(default, deserialize_with = "opt_string")]
    id: Option<String>,
}

/// Jockey or trainer.
#[derive(Debug, Deserialize)]
struct RawPerson {
    #[serde(default, deserialize_with = "opt_string")]
    code: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    name_en: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    name_ch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPool {
    #[serde(default, deserialize_with = "opt_string")]
    id: Option<String>,
    #[serde(rename = "oddsType", default, deserialize_with = "opt_string")]
    odds_type: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    status: Option<String>,
    #[serde(rename = "sellStatus", default, deserialize_with = "opt_string")]
    sell_status: Option<String>,
    #[serde(default, deserialize_with = "opt_f64")]
    investment: Option<f64>,
    #[serde(rename = "mergedPoolId", default, deserialize_with = "opt_string")]
    merged_pool_id: Option<String>,
    #[serde(rename = "lastUpdateTime", default, deserialize_with = "opt_datetime")]
    last_update: Option<chrono::DateTime<chrono::FixedOffset>>,
    #[serde(default, deserialize_with = "opt_object")]
    leg: Option<RawLeg>,
}

#[derive(Debug, Deserialize)]
struct RawLeg {
    #[serde(default, deserialize_with = "seq")]
    races: Vec<Value>,
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Parse every meeting in a `raceMeetings` response (batch mode).
///
/// A response without a `data` key is an upstream outage: it is logged and
/// yields no meetings rather than an error.
pub fn parse_meetings(response: &Value) -> Vec<Meeting> {
    let Some(data) = response.get("data").filter(|d| !d.is_null()) else {
        error!("Invalid meeting response or no data");
        return Vec::new();
    };

    let raw_meetings = match data.get("raceMeetings") {
        Some(Value::Array(items)) => items.as_slice(),
        _ => {
            info!("Meeting response carries no raceMeetings");
            return Vec::new();
        }
    };

    let meetings: Vec<Meeting> = raw_meetings.iter().filter_map(convert_meeting).collect();
    debug!(
        received = raw_meetings.len(),
        accepted = meetings.len(),
        "Meeting response parsed"
    );
    meetings
}

/// Parse the meeting for `venue` (or the first meeting when `venue` is `None`).
pub fn parse_meeting(response: &Value, venue: Option<&str>) -> Option<Meeting> {
    parse_meetings(response).into_iter().find(|m| match venue {
        Some(v) => m.venue_code.eq_ignore_ascii_case(v),
        None => true,
    })
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

fn convert_meeting(value: &Value) -> Option<Meeting> {
    let raw: RawMeeting = match serde_json::from_value(value.clone()) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "Skipping undecodable meeting");
            return None;
        }
    };

    let id = raw.id.unwrap_or_default();
    let mut races: Vec<Race> = raw.races.iter().filter_map(convert_race).collect();
    races.sort_by_key(|r| r.no);
    let before = races.len();
    races.dedup_by_key(|r| r.no);
    if races.len() != before {
        warn!(meeting_id = %id, dropped = before - races.len(), "Dropped duplicate race numbers");
    }

    let total_races = raw.total_races.unwrap_or(races.len() as u32);
    if !races.iter().map(|r| r.no).eq(1..=total_races) {
        error!(
            meeting_id = %id,
            total_races,
            race_numbers = ?races.iter().map(|r| r.no).collect::<Vec<_>>(),
            "Rejecting meeting whose races are not numbered 1..N"
        );
        return None;
    }

    let pools = raw
        .pools
        .iter()
        .filter_map(|p| serde_json::from_value::<RawPool>(p.clone()).ok())
        .map(convert_pool)
        .collect();

    Some(Meeting {
        id,
        status: raw.status.unwrap_or_default(),
        venue_code: raw.venue_code.unwrap_or_default(),
        date: raw.date,
        meeting_type: raw.meeting_type,
        country: raw.country.as_ref().and_then(convert_country),
        total_races,
        current_race: raw.current_race.unwrap_or(0),
        races,
        pools,
    })
}

fn convert_country(value: &Value) -> Option<Country> {
    let obj = match value {
        Value::Array(items) => items.first()?,
        Value::Object(_) => value,
        _ => return None,
    };
    let field = |key: &str| obj.get(key).and_then(lenient::text_from_value);
    let country = Country {
        code: field("code"),
        name_en: field("nameen").or_else(|| field("name_en")),
        name_ch: field("namech").or_else(|| field("name_ch")),
    };
    if country.code.is_none() && country.name_en.is_none() && country.name_ch.is_none() {
        None
    } else {
        Some(country)
    }
}

fn convert_race(value: &Value) -> Option<Race> {
    let raw: RawRace = match serde_json::from_value(value.clone()) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "Skipping undecodable race");
            return None;
        }
    };
    let Some(no) = raw.no.filter(|n| *n > 0) else {
        warn!(race_id = ?raw.id, "Skipping race without a race number");
        return None;
    };
    let id = raw.id.unwrap_or_else(|| format!("R{no}"));

    let runners: Vec<Runner> = raw
        .runners
        .iter()
        .enumerate()
        .filter_map(|(idx, value)| convert_runner(value, &id, idx))
        .collect();

    let mut race = Race {
        id,
        no,
        status: raw.status.unwrap_or_default(),
        name_en: raw.name_en,
        name_ch: raw.name_ch,
        post_time: raw.post_time,
        distance: raw.distance,
        field_size: raw.field_size,
        track: raw.track.filter(|t| !t.is_empty()).map(|t| RaceTrack {
            description_en: t.description_en,
            description_ch: t.description_ch,
        }),
        course: raw.course.filter(|c| !c.is_empty()).map(|c| RaceCourse {
            description_en: c.description_en,
            description_ch: c.description_ch,
            display_code: c.display_code,
        }),
        runners: Vec::new(),
    };
    for runner_no in race.set_runners(runners) {
        warn!(race_no = no, runner_no, "Dropping duplicate runner number");
    }
    Some(race)
}

fn convert_runner(value: &Value, race_id: &str, idx: usize) -> Option<Runner> {
    let raw: RawRunner = match serde_json::from_value(value.clone()) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(race_id, error = %e, "Skipping undecodable runner");
            return None;
        }
    };

    let status_raw = raw.status.unwrap_or_default();
    let status: RunnerStatus = match status_raw.parse() {
        Ok(s) => s,
        Err(_) => {
            warn!(
                race_id,
                runner_id = ?raw.id,
                status = %status_raw,
                "Rejecting runner with unknown status"
            );
            return None;
        }
    };

    let (jockey_code, jockey_name_en, jockey_name_ch) = split_person(raw.jockey);
    let (trainer_code, trainer_name_en, trainer_name_ch) = split_person(raw.trainer);

    Some(Runner {
        id: raw.id.unwrap_or_else(|| format!("{race_id}_{idx}")),
        no: raw.no,
        standby_no: raw.standby_no,
        status,
        name_ch: raw.name_ch.unwrap_or_default(),
        name_en: raw.name_en.unwrap_or_default(),
        horse_id: raw.horse.and_then(|h| h.id).unwrap_or_default(),
        barrier_draw: raw.barrier_draw,
        handicap_weight: raw.handicap_weight,
        jockey_code,
        jockey_name_en,
        jockey_name_ch,
        trainer_code,
        trainer_name_en,
        trainer_name_ch,
        win_odds: raw.win_odds,
        place_odds: raw.place_odds,
        win_favourite: false,
        place_favourite: false,
    })
}

fn split_person(person: Option<RawPerson>) -> (Option<String>, Option<String>, Option<String>) {
    match person {
        Some(p) => (p.code, p.name_en, p.name_ch),
        None => (None, None, None),
    }
}

fn convert_pool(raw: RawPool) -> Pool {
    Pool {
        id: raw.id.unwrap_or_default(),
        odds_type: raw.odds_type,
        status: raw.status,
        sell_status: raw.sell_status,
        investment: raw.investment,
        merged_pool_id: raw.merged_pool_id,
        leg_races: raw
            .leg
            .map(|l| l.races.iter().filter_map(lenient::int_from_value).collect())
            .unwrap_or_default(),
        last_update: raw.last_update,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
