//! Joins racecards with odds and discount tables.
//!
//! The racecard is always the left side: every numbered runner produces
//! exactly one row whatever the supplementary sources contain. Sources are
//! keyed by (race number, runner number) and reduced to one entry per key
//! before the join.

use chrono::{DateTime, FixedOffset, NaiveDate};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

use super::names::NameLookup;
use crate::types::{DiscountRecord, Locale, Meeting, OddsMap, Race, RunnerStatus};

// ---------------------------------------------------------------------------
// Odds merge
// ---------------------------------------------------------------------------

/// Write `odds` into the runners of race `race_no` only. Runners without an
/// entry keep what they had; entries without a runner are ignored.
/// Returns the number of runners updated.
pub fn merge_odds(races: &mut [Race], race_no: u32, odds: &OddsMap) -> usize {
    let Some(race) = races.iter_mut().find(|r| r.no == race_no) else {
        debug!(race_no, "No race to merge odds into");
        return 0;
    };

    let mut updated = 0;
    for runner in race.runners.iter_mut() {
        let Some(entry) = runner.no.and_then(|no| odds.get(&no)) else {
            continue;
        };
        runner.win_odds = entry.win;
        runner.place_odds = entry.place;
        runner.win_favourite = entry.win_favourite;
        runner.place_favourite = entry.place_favourite;
        updated += 1;
    }
    debug!(race_no, updated, entries = odds.len(), "Odds merged");
    updated
}

// ---------------------------------------------------------------------------
// Discount table
// ---------------------------------------------------------------------------

/// One mode's discount records, at most one per (race, runner).
#[derive(Debug, Clone, Default)]
pub struct DiscountTable {
    rows: HashMap<(u32, u32), DiscountRecord>,
}

impl DiscountTable {
    /// Build from parser output. A repeated key keeps the last record.
    pub fn from_records(records: impl IntoIterator<Item = DiscountRecord>) -> Self {
        let mut rows = HashMap::new();
        for record in records {
            let key = (record.race_no, record.runner_no);
            if let Some(previous) = rows.insert(key, record) {
                warn!(
                    race_no = key.0,
                    runner_no = key.1,
                    mode = %previous.mode,
                    "Duplicate discount record; keeping the later one"
                );
            }
        }
        Self { rows }
    }

    pub fn get(&self, race_no: u32, runner_no: u32) -> Option<&DiscountRecord> {
        self.rows.get(&(race_no, runner_no))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// One display row: a runner with everything joined onto it.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardRow {
    pub race_no: u32,
    pub runner_no: u32,
    pub status: RunnerStatus,
    pub name: String,
    pub jockey: Option<String>,
    pub trainer: Option<String>,
    pub win_odds: Option<f64>,
    pub place_odds: Option<f64>,
    pub win_favourite: bool,
    pub place_favourite: bool,
    pub back_win: Option<f64>,
    pub back_place: Option<f64>,
    pub lay_win: Option<f64>,
    pub lay_place: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RaceBoard {
    pub race_no: u32,
    pub name: Option<String>,
    pub status: String,
    pub post_time: Option<DateTime<FixedOffset>>,
    pub rows: Vec<BoardRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeetingBoard {
    pub meeting_id: String,
    pub venue: String,
    pub date: Option<NaiveDate>,
    pub total_races: u32,
    pub races: Vec<RaceBoard>,
    /// Races whose racecard could not be fetched, with the reason.
    pub unavailable_races: Vec<(u32, String)>,
}

impl MeetingBoard {
    pub fn race(&self, race_no: u32) -> Option<&RaceBoard> {
        self.races.iter().find(|r| r.race_no == race_no)
    }
}

/// Join one race with both discount tables.
pub fn reconcile_race(
    race: &Race,
    back: &DiscountTable,
    lay: &DiscountTable,
    names: &dyn NameLookup,
    locale: Locale,
) -> RaceBoard {
    let rows: Vec<BoardRow> = race
        .numbered_runners()
        .filter_map(|runner| {
            let runner_no = runner.no?;
            let back_rec = back.get(race.no, runner_no);
            let lay_rec = lay.get(race.no, runner_no);
            Some(BoardRow {
                race_no: race.no,
                runner_no,
                status: runner.status,
                name: runner.name(locale).to_string(),
                jockey: runner
                    .jockey_name(locale)
                    .map(|n| names.abbreviate_jockey(n).to_string()),
                trainer: runner
                    .trainer_name(locale)
                    .map(|n| names.abbreviate_trainer(n).to_string()),
                win_odds: runner.win_odds,
                place_odds: runner.place_odds,
                win_favourite: runner.win_favourite,
                place_favourite: runner.place_favourite,
                back_win: back_rec.and_then(|r| r.win_discount),
                back_place: back_rec.and_then(|r| r.place_discount),
                lay_win: lay_rec.and_then(|r| r.win_discount),
                lay_place: lay_rec.and_then(|r| r.place_discount),
            })
        })
        .collect();

    RaceBoard {
        race_no: race.no,
        name: race.name(locale).map(str::to_string),
        status: race.status.clone(),
        post_time: race.post_time,
        rows,
    }
}

/// Join every race of a meeting. Races without runners (already run on the
/// legacy feed) are kept with an empty row list.
pub fn reconcile_meeting(
    meeting: &Meeting,
    back: &DiscountTable,
    lay: &DiscountTable,
    names: &dyn NameLookup,
    locale: Locale,
) -> MeetingBoard {
    MeetingBoard {
        meeting_id: meeting.id.clone(),
        venue: meeting.venue_code.clone(),
        date: meeting.date,
        total_races: meeting.total_races,
        races: meeting
            .races
            .iter()
            .map(|race| reconcile_race(race, back, lay, names, locale))
            .collect(),
        unavailable_races: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Plain-text rendering
// ---------------------------------------------------------------------------

fn cell(value: Option<f64>) -> String {
    match value {
        Some(v) if v.fract() == 0.0 => format!("{v:.0}"),
        Some(v) => format!("{v}"),
        None => "N/A".to_string(),
    }
}

fn odds_cell(value: Option<f64>, favourite: bool) -> String {
    let text = cell(value);
    if favourite { format!("{text}*") } else { text }
}

impl fmt::Display for RaceBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let post = self
            .post_time
            .map(|t| t.format("%H:%M").to_string())
            .unwrap_or_else(|| "--:--".to_string());
        writeln!(
            f,
            "Race {} {} [{}] {}",
            self.race_no,
            post,
            self.status,
            self.name.as_deref().unwrap_or("")
        )?;
        writeln!(
            f,
            "{:>3}  {:<16} {:<10} {:<10} {:>7} {:>7} {:>8} {:>8} {:>8} {:>8}",
            "No", "Horse", "Jockey", "Trainer", "WIN", "PLA", "WIN bk", "PLA bk", "WIN ly", "PLA ly"
        )?;
        for row in &self.rows {
            writeln!(
                f,
                "{:>3}  {:<16} {:<10} {:<10} {:>7} {:>7} {:>8} {:>8} {:>8} {:>8}",
                row.runner_no,
                row.name,
                row.jockey.as_deref().unwrap_or("N/A"),
                row.trainer.as_deref().unwrap_or("N/A"),
                odds_cell(row.win_odds, row.win_favourite),
                odds_cell(row.place_odds, row.place_favourite),
                cell(row.back_win),
                cell(row.back_place),
                cell(row.lay_win),
                cell(row.lay_place),
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for MeetingBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let date = self
            .date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "unknown date".to_string());
        writeln!(f, "{} {} ({} races)", date, self.venue, self.total_races)?;
        for race in &self.races {
            writeln!(f)?;
            write!(f, "{race}")?;
        }
        for (race_no, reason) in &self.unavailable_races {
            writeln!(f, "Race {race_no}: unavailable ({reason})")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
