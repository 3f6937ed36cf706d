//! End-to-end fetch cycles through the aggregator with mock feeds.

use chrono::NaiveDate;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

use arbaak::config::FeedSource;
use arbaak::engine::aggregator::{Aggregator, CycleSettings};
use arbaak::engine::legacy::{RetryPolicy, RACE_DONE, RACE_OPEN, RACE_UNAVAILABLE};
use arbaak::engine::names::{FullNames, NameAbbreviations};
use arbaak::engine::reconciler::{BoardRow, RaceBoard};
use arbaak::types::{DiscountMode, Locale, RunnerStatus};

use crate::mock_feed::*;

fn race_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 9, 22).unwrap()
}

fn abbreviations() -> Box<NameAbbreviations> {
    let jockeys = HashMap::from([("潘頓".to_string(), "潘".to_string())]);
    let trainers = HashMap::from([("蔡約翰".to_string(), "蔡".to_string())]);
    Box::new(NameAbbreviations::new(jockeys, trainers))
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        poll_max_attempts: 2,
        poll_jitter: Duration::ZERO,
        racecard_attempts: 2,
        racecard_retry_delay: Duration::ZERO,
    }
}

fn row(race: &RaceBoard, runner_no: u32) -> &BoardRow {
    race.rows
        .iter()
        .find(|r| r.runner_no == runner_no)
        .unwrap_or_else(|| panic!("no row for runner {runner_no} in race {}", race.race_no))
}

fn graphql_feed() -> MockRacingFeed {
    let meeting = meetings(
        race_day(),
        vec![
            race(
                1,
                vec![
                    runner(1, "金鎗六十", "GOLDEN SIXTY", "潘頓", "蔡約翰"),
                    runner(2, "浪漫勇士", "ROMANTIC WARRIOR", "麥道朗", "沈集成"),
                    standby_runner(1),
                ],
            ),
            race(2, vec![runner(1, "加州星球", "CALIFORNIA SPANGLE", "田泰安", "告東尼")]),
        ],
    );
    // Race 2 has no odds configured, so its request fails.
    MockRacingFeed::new(meeting).with_odds(
        1,
        pool_odds(&[(1, Some("3.2"), Some("1.5")), (2, Some("SCR"), None)]),
    )
}

fn discount_feed() -> MockDiscountFeed {
    MockDiscountFeed::new()
        .with_rows(DiscountMode::Back, race_day(), "1\t1\t100\t0\t85\t0\n1\t1\t0\t100\t80\t0")
        .with_rows(DiscountMode::Lay, race_day(), "1\t2\t100\t0\t90\t0")
}

fn graphql_settings() -> CycleSettings {
    CycleSettings {
        venue: Some("ST".to_string()),
        ..CycleSettings::default()
    }
}

// ---------------------------------------------------------------------------
// GraphQL source
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_graphql_cycle_end_to_end() {
    let racing = graphql_feed();
    let racing_log = racing.log();
    let discounts = discount_feed();
    let discount_log = discounts.log();

    let mut agg = Aggregator::with_feeds(
        Box::new(racing),
        Box::new(MockLegacyFeed::new("", "")),
        Some(Box::new(discounts)),
        abbreviations(),
        graphql_settings(),
    );

    let board = agg.build_board(race_day()).await.unwrap().expect("board");
    assert_eq!(board.venue, "ST");
    assert_eq!(board.date, Some(race_day()));
    assert_eq!(board.total_races, 2);
    assert_eq!(board.races.len(), 2);
    assert!(board.unavailable_races.is_empty());

    // Standby runner is not on the board.
    let race1 = board.race(1).unwrap();
    assert_eq!(race1.rows.len(), 2);

    let r1 = row(race1, 1);
    assert_eq!(r1.name, "金鎗六十");
    assert_eq!(r1.jockey.as_deref(), Some("潘"));
    assert_eq!(r1.trainer.as_deref(), Some("蔡"));
    assert_eq!(r1.win_odds, Some(3.2));
    assert_eq!(r1.place_odds, Some(1.5));
    assert_eq!(r1.back_win, Some(85.0));
    assert_eq!(r1.back_place, Some(80.0));
    assert_eq!(r1.lay_win, None);

    let r2 = row(race1, 2);
    assert_eq!(r2.jockey.as_deref(), Some("麥道朗"));
    assert_eq!(r2.win_odds, None);
    assert_eq!(r2.place_odds, None);
    assert_eq!(r2.back_win, None);
    assert_eq!(r2.lay_win, Some(90.0));

    // Failed odds request leaves race 2 without odds.
    let race2 = board.race(2).unwrap();
    assert_eq!(race2.rows.len(), 1);
    assert_eq!(race2.rows[0].win_odds, None);

    assert_eq!(racing_log.count("meetings:2024-09-22:ST"), 1);
    assert_eq!(racing_log.count("odds:ST:"), 2);
    assert_eq!(discount_log.count("discounts:back:2024-09-22"), 1);
    assert_eq!(discount_log.count("discounts:lay:2024-09-22"), 1);

    let rendered = board.to_string();
    assert!(rendered.contains("金鎗六十"));
    assert!(rendered.contains("N/A"));
}

#[tokio::test]
async fn test_english_locale_uses_english_names() {
    let mut settings = graphql_settings();
    settings.locale = Locale::English;

    let mut agg = Aggregator::with_feeds(
        Box::new(graphql_feed()),
        Box::new(MockLegacyFeed::new("", "")),
        None,
        Box::new(FullNames),
        settings,
    );

    let board = agg.build_board(race_day()).await.unwrap().unwrap();
    let race1 = board.race(1).unwrap();
    assert_eq!(race1.name.as_deref(), Some("RACE 1 HANDICAP"));
    assert_eq!(row(race1, 1).name, "GOLDEN SIXTY");
    // No English jockey name; falls back to Chinese.
    assert_eq!(row(race1, 1).jockey.as_deref(), Some("潘頓"));
    // Discounts disabled.
    assert_eq!(row(race1, 1).back_win, None);
}

#[tokio::test]
async fn test_discounts_served_from_cache_within_ttl() {
    let racing = graphql_feed();
    let racing_log = racing.log();
    let discounts = discount_feed();
    let discount_log = discounts.log();

    let mut agg = Aggregator::with_feeds(
        Box::new(racing),
        Box::new(MockLegacyFeed::new("", "")),
        Some(Box::new(discounts)),
        abbreviations(),
        graphql_settings(),
    );

    let first = agg.build_board(race_day()).await.unwrap().unwrap();
    let second = agg.build_board(race_day()).await.unwrap().unwrap();

    // Odds are refetched every cycle, discounts only once.
    assert_eq!(racing_log.count("odds:"), 4);
    assert_eq!(discount_log.count("discounts:"), 2);
    assert_eq!(row(second.race(1).unwrap(), 1).back_win, Some(85.0));
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_failed_discount_fetch_is_not_cached() {
    let discounts = MockDiscountFeed::new();
    let discount_log = discounts.log();

    let mut agg = Aggregator::with_feeds(
        Box::new(graphql_feed()),
        Box::new(MockLegacyFeed::new("", "")),
        Some(Box::new(discounts)),
        abbreviations(),
        graphql_settings(),
    );

    let board = agg.build_board(race_day()).await.unwrap().unwrap();
    let r1 = row(board.race(1).unwrap(), 1);
    assert_eq!(r1.win_odds, Some(3.2));
    assert_eq!(r1.back_win, None);
    assert_eq!(r1.lay_place, None);

    agg.build_board(race_day()).await.unwrap().unwrap();
    assert_eq!(discount_log.count("discounts:"), 4);
}

#[tokio::test]
async fn test_no_meeting_yields_none() {
    let racing = MockRacingFeed::new(json!({"data": {"raceMeetings": []}}));
    let racing_log = racing.log();
    let discounts = discount_feed();
    let discount_log = discounts.log();

    let mut agg = Aggregator::with_feeds(
        Box::new(racing),
        Box::new(MockLegacyFeed::new("", "")),
        Some(Box::new(discounts)),
        abbreviations(),
        graphql_settings(),
    );

    assert!(agg.build_board(race_day()).await.unwrap().is_none());
    assert_eq!(racing_log.count("odds:"), 0);
    assert!(discount_log.all().is_empty());
}

#[tokio::test]
async fn test_meeting_fetch_error_yields_none() {
    let racing = graphql_feed();
    racing.set_error("connection refused");

    let mut agg = Aggregator::with_feeds(
        Box::new(racing),
        Box::new(MockLegacyFeed::new("", "")),
        None,
        abbreviations(),
        graphql_settings(),
    );

    assert!(agg.build_board(race_day()).await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Legacy source
// ---------------------------------------------------------------------------

fn legacy_settings() -> CycleSettings {
    CycleSettings {
        source: FeedSource::Legacy,
        retry: fast_retry(),
        ..CycleSettings::default()
    }
}

#[tokio::test]
async fn test_legacy_cycle_end_to_end() {
    // Race 2 odds disagree on runner order and are dropped.
    let blob = "HDR@@@1=3.2=0 2=SCR=0#1=1.5=1 2=1.1=0@@@1=4.0=0#2=1.5=0";
    let legacy = MockLegacyFeed::new(&meeting_script(race_day(), 3, 0), blob)
        .with_racecard(
            1,
            racecard_page(
                "[{num: 1, name: '金鎗六十', jockeyName: '潘頓', trainerName: '蔡約翰'}, {num: 2, name: '浪漫勇士', scratched: true}]",
            ),
        )
        .with_racecard(2, racecard_page("[{num: 1, name: '加州星球'}]"));
    let legacy_log = legacy.log();

    let mut agg = Aggregator::with_feeds(
        Box::new(MockRacingFeed::new(json!({}))),
        Box::new(legacy),
        Some(Box::new(discount_feed())),
        abbreviations(),
        legacy_settings(),
    );

    let board = agg.build_board(race_day()).await.unwrap().expect("board");
    assert_eq!(board.venue, "ST");
    assert_eq!(board.total_races, 3);
    assert_eq!(board.races.len(), 3);

    let race1 = board.race(1).unwrap();
    assert_eq!(race1.status, RACE_OPEN);
    let r1 = row(race1, 1);
    assert_eq!(r1.name, "金鎗六十");
    assert_eq!(r1.jockey.as_deref(), Some("潘"));
    assert_eq!(r1.win_odds, Some(3.2));
    assert_eq!(r1.place_odds, Some(1.5));
    assert!(r1.place_favourite);
    assert_eq!(r1.back_win, Some(85.0));

    // Scratched runner stays on the board without odds.
    let r2 = row(race1, 2);
    assert_eq!(r2.status, RunnerStatus::Scratched);
    assert_eq!(r2.win_odds, None);
    assert_eq!(r2.lay_win, Some(90.0));

    let race2 = board.race(2).unwrap();
    assert_eq!(race2.rows.len(), 1);
    assert_eq!(race2.rows[0].win_odds, None);
    assert_eq!(race2.rows[0].place_odds, None);

    // Racecard for race 3 never carries the runner script.
    let race3 = board.race(3).unwrap();
    assert_eq!(race3.status, RACE_UNAVAILABLE);
    assert!(race3.rows.is_empty());
    assert_eq!(board.unavailable_races.len(), 1);
    assert_eq!(board.unavailable_races[0].0, 3);

    assert_eq!(legacy_log.count("script:true"), 1);
    assert_eq!(legacy_log.count("racecard:ST:3"), 2);
    assert_eq!(legacy_log.count("racecard:"), 4);
    assert_eq!(legacy_log.count("winplace:ST:1-3"), 1);
}

#[tokio::test]
async fn test_legacy_skips_races_already_run() {
    let blob = "HDR@@@1=2.0=0#1=1.1=0@@@1=6.0=0#1=2.1=0";
    let legacy = MockLegacyFeed::new(&meeting_script(race_day(), 2, 1), blob)
        .with_racecard(2, racecard_page("[{num: 1, name: '加州星球'}]"));
    let legacy_log = legacy.log();

    let mut agg = Aggregator::with_feeds(
        Box::new(MockRacingFeed::new(json!({}))),
        Box::new(legacy),
        None,
        Box::new(FullNames),
        legacy_settings(),
    );

    let board = agg.build_board(race_day()).await.unwrap().unwrap();
    assert_eq!(board.race(1).unwrap().status, RACE_DONE);
    assert!(board.race(1).unwrap().rows.is_empty());
    assert_eq!(board.race(2).unwrap().rows[0].win_odds, Some(6.0));
    assert_eq!(legacy_log.count("racecard:ST:1"), 0);
}

#[tokio::test]
async fn test_legacy_meeting_on_another_day() {
    let tomorrow = race_day().succ_opt().unwrap();
    let legacy = MockLegacyFeed::new(&meeting_script(tomorrow, 8, 0), "");
    let legacy_log = legacy.log();

    let mut agg = Aggregator::with_feeds(
        Box::new(MockRacingFeed::new(json!({}))),
        Box::new(legacy),
        Some(Box::new(discount_feed())),
        abbreviations(),
        legacy_settings(),
    );

    assert!(agg.build_board(race_day()).await.unwrap().is_none());
    assert_eq!(legacy_log.count("racecard:"), 0);
}

#[tokio::test]
async fn test_legacy_script_never_ready_yields_none() {
    let legacy = MockLegacyFeed::new("var isJackpot = false;", "");
    let legacy_log = legacy.log();

    let mut agg = Aggregator::with_feeds(
        Box::new(MockRacingFeed::new(json!({}))),
        Box::new(legacy),
        None,
        Box::new(FullNames),
        legacy_settings(),
    );

    assert!(agg.build_board(race_day()).await.unwrap().is_none());
    assert_eq!(legacy_log.all(), vec!["script:true", "script:false"]);
}

#[tokio::test]
async fn test_legacy_unreadable_script_yields_none() {
    // Ready marker present but no venue.
    let script = "var mtgDate = \"2024-09-22\";\nvar mtgTotalRace = 8;\n";
    let legacy = MockLegacyFeed::new(script, "");
    let legacy_log = legacy.log();

    let mut agg = Aggregator::with_feeds(
        Box::new(MockRacingFeed::new(json!({}))),
        Box::new(legacy),
        Some(Box::new(discount_feed())),
        Box::new(FullNames),
        legacy_settings(),
    );

    assert!(agg.build_board(race_day()).await.unwrap().is_none());
    assert_eq!(legacy_log.count("script:"), 1);
    assert_eq!(legacy_log.count("racecard:"), 0);
}

#[tokio::test]
async fn test_legacy_duplicate_racecard_numbers_give_one_row() {
    let card = "[{num: 1, name: '金鎗六十'}, {num: 1, name: '浪漫勇士'}, {num: 2, name: '加州星球'}]";
    let legacy = MockLegacyFeed::new(&meeting_script(race_day(), 1, 0), "HDR@@@1=2.0=0#1=1.1=0")
        .with_racecard(1, racecard_page(card));

    let mut agg = Aggregator::with_feeds(
        Box::new(MockRacingFeed::new(json!({}))),
        Box::new(legacy),
        None,
        Box::new(FullNames),
        legacy_settings(),
    );

    let board = agg.build_board(race_day()).await.unwrap().unwrap();
    let race1 = board.race(1).unwrap();
    let numbers: Vec<u32> = race1.rows.iter().map(|r| r.runner_no).collect();
    assert_eq!(numbers, vec![1, 2]);
    assert_eq!(row(race1, 1).name, "金鎗六十");
    assert_eq!(row(race1, 1).win_odds, Some(2.0));
}
