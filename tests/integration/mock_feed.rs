//! Mock feeds for integration testing.
//!
//! Deterministic `RacingFeed`, `LegacyFeed` and `DiscountFeed`
//! implementations that serve canned bodies from memory and count
//! every request, so tests can assert on what the aggregator fetched.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arbaak::feeds::{DiscountFeed, LegacyFeed, RacingFeed};
use arbaak::types::DiscountMode;

/// Shared request log. Cloned handles see the same entries.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    fn record(&self, call: String) {
        self.0.lock().unwrap().push(call);
    }

    /// Number of requests whose label starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// GraphQL
// ---------------------------------------------------------------------------

/// Racing GraphQL mock. Serves one meeting response and per-race odds.
pub struct MockRacingFeed {
    meetings: Value,
    odds: HashMap<u32, Value>,
    log: CallLog,
    /// If set, every request fails with this message.
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockRacingFeed {
    pub fn new(meetings: Value) -> Self {
        Self {
            meetings,
            odds: HashMap::new(),
            log: CallLog::default(),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_odds(mut self, race_no: u32, odds: Value) -> Self {
        self.odds.insert(race_no, odds);
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    fn check_error(&self) -> Result<()> {
        match self.force_error.lock().unwrap().as_ref() {
            Some(msg) => Err(anyhow!("{msg}")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RacingFeed for MockRacingFeed {
    async fn fetch_meetings(&self, date: NaiveDate, venue: Option<&str>) -> Result<Value> {
        self.log.record(format!("meetings:{date}:{}", venue.unwrap_or("-")));
        self.check_error()?;
        Ok(self.meetings.clone())
    }

    async fn fetch_race_odds(&self, _date: NaiveDate, venue: &str, race_no: u32) -> Result<Value> {
        self.log.record(format!("odds:{venue}:{race_no}"));
        self.check_error()?;
        self.odds
            .get(&race_no)
            .cloned()
            .ok_or_else(|| anyhow!("no odds for race {race_no}"))
    }
}

// ---------------------------------------------------------------------------
// Legacy bet site
// ---------------------------------------------------------------------------

/// Legacy bet-site mock. Racecards missing from the map come back as a
/// page without the runner script.
pub struct MockLegacyFeed {
    script: String,
    racecards: HashMap<u32, String>,
    odds_blob: String,
    log: CallLog,
}

impl MockLegacyFeed {
    pub fn new(script: &str, odds_blob: &str) -> Self {
        Self {
            script: script.to_string(),
            racecards: HashMap::new(),
            odds_blob: odds_blob.to_string(),
            log: CallLog::default(),
        }
    }

    pub fn with_racecard(mut self, race_no: u32, html: String) -> Self {
        self.racecards.insert(race_no, html);
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

#[async_trait]
impl LegacyFeed for MockLegacyFeed {
    async fn fetch_meeting_script(&self, _date: NaiveDate, with_venue: bool) -> Result<String> {
        self.log.record(format!("script:{with_venue}"));
        Ok(self.script.clone())
    }

    async fn fetch_racecard(&self, _date: NaiveDate, venue: &str, race_no: u32) -> Result<String> {
        self.log.record(format!("racecard:{venue}:{race_no}"));
        Ok(self
            .racecards
            .get(&race_no)
            .cloned()
            .unwrap_or_else(|| "<html><body></body></html>".to_string()))
    }

    async fn fetch_win_place_odds(
        &self,
        _date: NaiveDate,
        venue: &str,
        start: u32,
        end: u32,
    ) -> Result<String> {
        self.log.record(format!("winplace:{venue}:{start}-{end}"));
        Ok(self.odds_blob.clone())
    }
}

// ---------------------------------------------------------------------------
// Discounts
// ---------------------------------------------------------------------------

/// Discount provider mock keyed by mode.
pub struct MockDiscountFeed {
    bodies: HashMap<DiscountMode, String>,
    log: CallLog,
}

impl MockDiscountFeed {
    pub fn new() -> Self {
        Self {
            bodies: HashMap::new(),
            log: CallLog::default(),
        }
    }

    /// Serve tab-separated `rows` for `mode`, wrapped the way the provider does.
    pub fn with_rows(mut self, mode: DiscountMode, date: NaiveDate, rows: &str) -> Self {
        self.bodies.insert(mode, discount_body(mode, date, rows));
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

#[async_trait]
impl DiscountFeed for MockDiscountFeed {
    async fn fetch_discounts(&self, date: NaiveDate, mode: DiscountMode) -> Result<String> {
        self.log.record(format!("discounts:{mode}:{date}"));
        self.bodies
            .get(&mode)
            .cloned()
            .ok_or_else(|| anyhow!("provider down for {mode}"))
    }
}

// ---------------------------------------------------------------------------
// Canned payloads
// ---------------------------------------------------------------------------

pub fn runner(no: u32, name_ch: &str, name_en: &str, jockey_ch: &str, trainer_ch: &str) -> Value {
    json!({
        "id": format!("HK_2024_ST_R_{no}"),
        "no": no.to_string(),
        "standbyNo": "",
        "status": "Declared",
        "name_ch": name_ch,
        "name_en": name_en,
        "horse": {"id": format!("HK_2020_H{no:03}"), "code": format!("H{no:03}")},
        "barrierDrawNumber": no.to_string(),
        "handicapWeight": "128",
        "jockey": {"code": "J", "name_en": "", "name_ch": jockey_ch},
        "trainer": {"code": "T", "name_en": "", "name_ch": trainer_ch}
    })
}

pub fn standby_runner(standby_no: u32) -> Value {
    json!({
        "id": format!("HK_2024_ST_S_{standby_no}"),
        "no": "",
        "standbyNo": standby_no.to_string(),
        "status": "Standby",
        "name_ch": "後備",
        "name_en": "RESERVE",
        "horse": {"id": "HK_2020_S001"}
    })
}

pub fn race(no: u32, runners: Vec<Value>) -> Value {
    json!({
        "id": format!("HK_2024_ST_R{no}"),
        "no": no,
        "status": "SELLING",
        "raceName_en": format!("RACE {no} HANDICAP"),
        "raceName_ch": format!("第{no}場讓賽"),
        "postTime": format!("2024-09-22T{:02}:00:00+08:00", 12 + no),
        "distance": 1200,
        "wageringFieldSize": runners.len(),
        "runners": runners
    })
}

pub fn meetings(date: NaiveDate, races: Vec<Value>) -> Value {
    json!({
        "data": {
            "raceMeetings": [{
                "id": format!("{date}_ST"),
                "status": "START_SELL",
                "venueCode": "ST",
                "date": date.to_string(),
                "totalNumberOfRace": races.len(),
                "currentNumberOfRace": 1,
                "meetingType": "D",
                "country": [{"code": "HK", "namech": "香港", "nameen": "Hong Kong", "seq": 1}],
                "races": races,
                "poolInvs": []
            }]
        }
    })
}

/// `(runner, win, place)` triples; `None` leaves a pool entry out.
pub fn pool_odds(entries: &[(u32, Option<&str>, Option<&str>)]) -> Value {
    let node = |no: u32, odds: &str| {
        json!({"combString": format!("{no:02}"), "oddsValue": odds, "hotFavourite": false})
    };
    let win: Vec<Value> = entries
        .iter()
        .filter_map(|(no, w, _)| w.map(|o| node(*no, o)))
        .collect();
    let place: Vec<Value> = entries
        .iter()
        .filter_map(|(no, _, p)| p.map(|o| node(*no, o)))
        .collect();
    json!({"data": {"raceMeetings": [{"pmPools": [
        {"id": "WIN_1", "oddsType": "WIN", "oddsNodes": win},
        {"id": "PLA_1", "oddsType": "PLA", "oddsNodes": place}
    ]}]}})
}

/// Meeting script as the bet site publishes it.
pub fn meeting_script(date: NaiveDate, total: u32, ran: u32) -> String {
    format!(
        "var mtgDate = \"{date}\";\nvar mtgTotalRace = {total};\n\
         var mtgRanRace = {ran};\nvar venueShort = \"ST\";\n"
    )
}

/// Racecard page with the runner script in the place the site puts it.
pub fn racecard_page(literal: &str) -> String {
    format!(
        "<html><body><div id=\"container\"><div><div><div></div><div>\
         <script>var raceCard = {literal};</script>\
         </div></div></div></div></body></html>"
    )
}

fn discount_body(mode: DiscountMode, date: NaiveDate, rows: &str) -> String {
    let inner = json!({
        "cookieKey": format!("{}_{}_3H_1727000000", mode.tag(), date.format("%d-%m-%Y")),
        "pendingData": rows,
        "ts": 1727000000000i64,
        "padding": "p".repeat(200),
    });
    format!("([{inner}])")
}
