//! Legacy bet-site pipeline: meeting poll, racecard retry and odds blob.
//!
//! The bet site publishes the meeting script some time before it carries
//! any data, and racecard pages occasionally come back without the runner
//! script. Both are retried here with bounded attempts.

use anyhow::Result;
use chrono::NaiveDate;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::LegacyConfig;
use crate::feeds::LegacyFeed;
use crate::parsers::odds::{odds_map_for_race, parse_race_odds, split_races};
use crate::parsers::racecard::{parse_racecard, RaceCardEntry};
use crate::parsers::script::{is_ready, parse_meeting_script, MeetingScript};
use crate::types::{FeedError, Meeting, OddsMap, Race};

/// Status given to races that have already been run.
pub const RACE_DONE: &str = "Done";
/// Status given to races still to be run.
pub const RACE_OPEN: &str = "Open";
/// Status given to races whose racecard could not be fetched.
pub const RACE_UNAVAILABLE: &str = "Unavailable";

/// Retry bounds for the legacy feed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub poll_max_attempts: u32,
    pub poll_jitter: Duration,
    pub racecard_attempts: u32,
    pub racecard_retry_delay: Duration,
}

impl From<&LegacyConfig> for RetryPolicy {
    fn from(cfg: &LegacyConfig) -> Self {
        Self {
            poll_max_attempts: cfg.poll_max_attempts,
            poll_jitter: Duration::from_millis(cfg.poll_jitter_ms),
            racecard_attempts: cfg.racecard_attempts,
            racecard_retry_delay: Duration::from_millis(cfg.racecard_retry_delay_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&LegacyConfig::default())
    }
}

/// A legacy meeting converted to the shared model.
#[derive(Debug, Clone)]
pub struct LegacyMeeting {
    pub meeting: Meeting,
    pub unavailable_races: Vec<(u32, String)>,
}

fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
}

/// Poll the meeting script until it carries meeting data.
///
/// Odd attempts (starting with the first) carry the venue hint, even
/// attempts do not. Gives up with `FeedError::MeetingNotReady`.
pub async fn poll_meeting_script(
    feed: &dyn LegacyFeed,
    date: NaiveDate,
    policy: &RetryPolicy,
) -> Result<MeetingScript> {
    for attempt in 1..=policy.poll_max_attempts {
        let with_venue = attempt % 2 == 1;
        let body = feed.fetch_meeting_script(date, with_venue).await?;
        if is_ready(&body) {
            debug!(attempt, "Meeting script ready");
            return Ok(parse_meeting_script(&body)?);
        }

        info!(attempt, with_venue, "Meeting script not ready");
        if attempt < policy.poll_max_attempts {
            tokio::time::sleep(jitter(policy.poll_jitter)).await;
        }
    }

    Err(FeedError::MeetingNotReady {
        attempts: policy.poll_max_attempts,
    }
    .into())
}

/// Fetch one race's racecard, retrying while the runner script is missing.
pub async fn fetch_racecard(
    feed: &dyn LegacyFeed,
    date: NaiveDate,
    venue: &str,
    race_no: u32,
    policy: &RetryPolicy,
) -> Result<Vec<RaceCardEntry>> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let html = feed.fetch_racecard(date, venue, race_no).await?;
        match parse_racecard(&html, race_no) {
            Ok(entries) => return Ok(entries),
            Err(e @ FeedError::ElementMissing { .. }) if attempt >= policy.racecard_attempts => {
                return Err(e.into());
            }
            Err(FeedError::ElementMissing { .. }) => {
                info!(race_no, attempt, "Racecard element missing; retrying");
                tokio::time::sleep(policy.racecard_retry_delay).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Load the meeting for `date` from the bet site.
///
/// `Ok(None)` when the published meeting is for another day. Races already
/// run are kept without runners; a race whose racecard cannot be fetched is
/// kept without runners and listed in `unavailable_races`.
pub async fn load_meeting(
    feed: &dyn LegacyFeed,
    date: NaiveDate,
    policy: &RetryPolicy,
) -> Result<Option<LegacyMeeting>> {
    let script = poll_meeting_script(feed, date, policy).await?;
    if script.date != date {
        info!(meeting_date = %script.date, %date, "Races are not on today");
        return Ok(None);
    }

    let mut races = Vec::with_capacity(script.total_races as usize);
    let mut unavailable_races = Vec::new();

    for race_no in 1..=script.total_races {
        let mut race = empty_race(&script, race_no);
        if !script.upcoming_races().contains(&race_no) {
            race.status = RACE_DONE.to_string();
            races.push(race);
            continue;
        }

        info!(race_no, "Fetching racecard");
        match fetch_racecard(feed, date, &script.venue, race_no, policy).await {
            Ok(entries) => {
                let dropped = race.set_runners(entries.into_iter().map(RaceCardEntry::into_runner));
                for runner_no in dropped {
                    warn!(race_no, runner_no, "Dropping duplicate racecard runner");
                }
                race.field_size = Some(race.numbered_runners().count() as u32);
            }
            Err(e) => {
                warn!(race_no, error = %e, "Racecard unavailable");
                race.status = RACE_UNAVAILABLE.to_string();
                unavailable_races.push((race_no, e.to_string()));
            }
        }
        races.push(race);
    }

    let meeting = Meeting {
        id: format!("{}_{}", script.date.format("%Y-%m-%d"), script.venue),
        status: RACE_OPEN.to_string(),
        venue_code: script.venue.clone(),
        date: Some(script.date),
        meeting_type: None,
        country: None,
        total_races: script.total_races,
        current_race: script.ran_races + 1,
        races,
        pools: Vec::new(),
    };

    Ok(Some(LegacyMeeting {
        meeting,
        unavailable_races,
    }))
}

fn empty_race(script: &MeetingScript, race_no: u32) -> Race {
    Race {
        id: format!("{}_{}_R{race_no}", script.date.format("%Y-%m-%d"), script.venue),
        no: race_no,
        status: RACE_OPEN.to_string(),
        name_en: None,
        name_ch: None,
        post_time: script.post_time(race_no),
        distance: None,
        field_size: None,
        track: None,
        course: None,
        runners: Vec::new(),
    }
}

/// Per-race odds maps from the win/place blob. A race whose segment is
/// inconsistent is logged and left out; the other races are kept.
pub fn odds_maps(body: &str) -> Vec<(u32, OddsMap)> {
    let mut maps = Vec::new();
    for (race_no, segment) in split_races(body) {
        match parse_race_odds(race_no, segment) {
            Ok(records) => maps.push((race_no, odds_map_for_race(&records, race_no))),
            Err(e) => warn!(race_no, error = %e, "Dropping odds for race"),
        }
    }
    maps
}
