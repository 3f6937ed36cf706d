//! Upstream feed clients.
//!
//! Defines one seam trait per upstream provider and the reqwest-backed
//! implementations:
//! - `GraphQlClient` — racing GraphQL endpoint (meetings, per-race odds)
//! - `BetSiteClient` — legacy bet site (meeting script, racecards, win/place blob)
//! - `DiscountClient` — discount provider (back and lay tables)
//!
//! Clients only move bytes. Parsing lives in `crate::parsers`.

pub mod graphql;
pub mod betsite;
pub mod discount;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

use crate::types::DiscountMode;

/// Racing GraphQL API.
#[async_trait]
pub trait RacingFeed: Send + Sync {
    /// Raw `raceMeetings` response for a date, optionally narrowed to a venue.
    async fn fetch_meetings(&self, date: NaiveDate, venue: Option<&str>) -> Result<Value>;

    /// Raw WIN/PLACE pool response for one race.
    async fn fetch_race_odds(&self, date: NaiveDate, venue: &str, race_no: u32) -> Result<Value>;
}

/// Legacy bet site serving JavaScript and HTML.
#[async_trait]
pub trait LegacyFeed: Send + Sync {
    /// `rsdata.js` body; `with_venue` appends the `&venue=ST` hint.
    async fn fetch_meeting_script(&self, date: NaiveDate, with_venue: bool) -> Result<String>;

    /// Racecard HTML page for one race.
    async fn fetch_racecard(&self, date: NaiveDate, venue: &str, race_no: u32) -> Result<String>;

    /// Win/place odds blob covering races `start..=end`.
    async fn fetch_win_place_odds(
        &self,
        date: NaiveDate,
        venue: &str,
        start: u32,
        end: u32,
    ) -> Result<String>;
}

/// Discount provider.
#[async_trait]
pub trait DiscountFeed: Send + Sync {
    /// Raw wrapped-JSON body for one mode.
    async fn fetch_discounts(&self, date: NaiveDate, mode: DiscountMode) -> Result<String>;
}

/// User agent sent to every upstream.
pub(crate) const USER_AGENT: &str = concat!("ARBAAK/", env!("CARGO_PKG_VERSION"));
