//! One fetch cycle: feeds → parsers → reconciler.
//!
//! Requests are issued one after another; nothing here runs concurrently.
//! Upstream failures never abort the cycle. A missing, unready or
//! unreadable meeting becomes `Ok(None)`, a failed odds or discount fetch
//! leaves the affected values absent, and a failed racecard is reported
//! per race. Only a transport error on the legacy meeting script is
//! returned to the caller.

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use tracing::{info, warn};

use super::cache::DiscountCache;
use super::legacy::{self, RetryPolicy};
use super::names::{NameAbbreviations, NameLookup};
use super::reconciler::{merge_odds, reconcile_meeting, DiscountTable, MeetingBoard};
use crate::config::{AppConfig, FeedSource};
use crate::feeds::betsite::BetSiteClient;
use crate::feeds::discount::DiscountClient;
use crate::feeds::graphql::GraphQlClient;
use crate::feeds::{DiscountFeed, LegacyFeed, RacingFeed};
use crate::parsers::discount::parse_discount_feed;
use crate::parsers::meeting::parse_meeting;
use crate::parsers::odds::parse_pool_odds;
use crate::types::{DiscountMode, FeedError, Locale, Meeting};

/// Knobs for one aggregator, taken from `AppConfig`.
#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub source: FeedSource,
    pub locale: Locale,
    pub venue: Option<String>,
    pub retry: RetryPolicy,
    pub discount_ttl: Duration,
}

impl CycleSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            source: cfg.app.source,
            locale: cfg.app.locale,
            venue: cfg.app.venue.clone(),
            retry: RetryPolicy::from(&cfg.legacy),
            discount_ttl: Duration::seconds(cfg.discount.cache_ttl_secs),
        }
    }
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

pub struct Aggregator {
    racing: Box<dyn RacingFeed>,
    legacy: Box<dyn LegacyFeed>,
    discounts: Option<Box<dyn DiscountFeed>>,
    names: Box<dyn NameLookup>,
    settings: CycleSettings,
    cache: DiscountCache,
}

impl Aggregator {
    /// Build with the real HTTP clients.
    pub fn new(cfg: &AppConfig) -> Result<Self> {
        let racing =
            GraphQlClient::new(&cfg.racing).context("Failed to initialise GraphQL client")?;
        let legacy = BetSiteClient::new(&cfg.legacy);
        let discounts: Option<Box<dyn DiscountFeed>> = if cfg.discount.enabled {
            Some(Box::new(
                DiscountClient::new(&cfg.discount).context("Failed to initialise discount client")?,
            ))
        } else {
            None
        };

        Ok(Self::with_feeds(
            Box::new(racing),
            Box::new(legacy),
            discounts,
            Box::new(NameAbbreviations::from_config(&cfg.abbreviations)),
            CycleSettings::from_config(cfg),
        ))
    }

    /// Build from explicit feeds (used by tests).
    pub fn with_feeds(
        racing: Box<dyn RacingFeed>,
        legacy: Box<dyn LegacyFeed>,
        discounts: Option<Box<dyn DiscountFeed>>,
        names: Box<dyn NameLookup>,
        settings: CycleSettings,
    ) -> Self {
        let cache = DiscountCache::new(settings.discount_ttl);
        Self {
            racing,
            legacy,
            discounts,
            names,
            settings,
            cache,
        }
    }

    /// Run one cycle for `date`. `Ok(None)` means there is nothing to show.
    pub async fn build_board(&mut self, date: NaiveDate) -> Result<Option<MeetingBoard>> {
        let loaded = match self.settings.source {
            FeedSource::Graphql => self.load_graphql(date).await,
            FeedSource::Legacy => self.load_legacy(date).await?,
        };
        let Some((meeting, unavailable_races)) = loaded else {
            info!(%date, "No meeting to show");
            return Ok(None);
        };

        let discount_date = meeting.date.unwrap_or(date);
        let back = self.discount_table(discount_date, DiscountMode::Back).await;
        let lay = self.discount_table(discount_date, DiscountMode::Lay).await;

        let mut board =
            reconcile_meeting(&meeting, &back, &lay, self.names.as_ref(), self.settings.locale);
        board.unavailable_races = unavailable_races;

        info!(
            meeting = %meeting,
            races = board.races.len(),
            rows = board.races.iter().map(|r| r.rows.len()).sum::<usize>(),
            back = back.len(),
            lay = lay.len(),
            "Board built"
        );
        Ok(Some(board))
    }

    /// GraphQL meeting plus one odds request per race.
    async fn load_graphql(&self, date: NaiveDate) -> Option<(Meeting, Vec<(u32, String)>)> {
        let venue = self.settings.venue.as_deref();
        let response = match self.racing.fetch_meetings(date, venue).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Meeting fetch failed");
                return None;
            }
        };
        let mut meeting = parse_meeting(&response, venue)?;

        let race_numbers: Vec<u32> = meeting.races.iter().map(|r| r.no).collect();
        for race_no in race_numbers {
            let odds = match self.racing.fetch_race_odds(date, &meeting.venue_code, race_no).await {
                Ok(resp) => parse_pool_odds(&resp),
                Err(e) => {
                    warn!(race_no, error = %e, "Odds fetch failed");
                    continue;
                }
            };
            merge_odds(&mut meeting.races, race_no, &odds);
        }

        Some((meeting, Vec::new()))
    }

    /// Bet-site meeting, racecards and the win/place blob.
    async fn load_legacy(&self, date: NaiveDate) -> Result<Option<(Meeting, Vec<(u32, String)>)>> {
        let retry = &self.settings.retry;
        let loaded = match legacy::load_meeting(self.legacy.as_ref(), date, retry).await {
            Ok(Some(loaded)) => loaded,
            Ok(None) => return Ok(None),
            Err(e) => match e.downcast_ref::<FeedError>() {
                Some(FeedError::MeetingNotReady { .. } | FeedError::MeetingScript(_)) => {
                    warn!(error = %e, "Legacy meeting unavailable");
                    return Ok(None);
                }
                _ => return Err(e),
            },
        };
        let mut meeting = loaded.meeting;

        if meeting.total_races > 0 {
            // Full range so race numbers follow segment position.
            match self
                .legacy
                .fetch_win_place_odds(date, &meeting.venue_code, 1, meeting.total_races)
                .await
            {
                Ok(body) => {
                    for (race_no, odds) in legacy::odds_maps(&body) {
                        merge_odds(&mut meeting.races, race_no, &odds);
                    }
                }
                Err(e) => warn!(error = %e, "Win/place odds fetch failed"),
            }
        }

        Ok(Some((meeting, loaded.unavailable_races)))
    }

    /// Discount table for one mode, served from cache within the TTL.
    async fn discount_table(&mut self, date: NaiveDate, mode: DiscountMode) -> DiscountTable {
        let Some(feed) = self.discounts.as_ref() else {
            return DiscountTable::default();
        };

        self.cache.evict_expired();
        if let Some(records) = self.cache.get(date, mode) {
            info!(%mode, records = records.len(), "Discount table from cache");
            return DiscountTable::from_records(records.to_vec());
        }

        match feed.fetch_discounts(date, mode).await {
            Ok(body) => {
                let records = parse_discount_feed(&body);
                self.cache.insert(date, mode, records.clone());
                DiscountTable::from_records(records)
            }
            Err(e) => {
                warn!(%mode, error = %e, "Discount fetch failed");
                DiscountTable::default()
            }
        }
    }
}
