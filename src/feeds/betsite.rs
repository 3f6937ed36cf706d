//! Legacy bet site client.
//!
//! The site refuses data requests without the session cookies it hands out
//! on its landing page, so every logical fetch builds a cookie-enabled
//! client, visits the site root, then issues the real request on the same
//! client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::{LegacyFeed, USER_AGENT};
use crate::config::LegacyConfig;

/// Venue hint appended to alternate meeting-script polls.
pub const VENUE_HINT: &str = "&venue=ST";

pub struct BetSiteClient {
    base_url: String,
    timeout: Duration,
}

impl BetSiteClient {
    pub fn new(cfg: &LegacyConfig) -> Self {
        Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(cfg.timeout_secs),
        }
    }

    pub fn meeting_script_url(&self, date: NaiveDate, with_venue: bool) -> String {
        let mut url = format!(
            "{}/racing/script/rsdata.js?lang=en&date={}",
            self.base_url,
            date.format("%Y-%m-%d")
        );
        if with_venue {
            url.push_str(VENUE_HINT);
        }
        url
    }

    pub fn racecard_url(&self, date: NaiveDate, venue: &str, race_no: u32) -> String {
        format!(
            "{}/racing/index.aspx?lang=ch&date={}&venue={}&raceno={race_no}",
            self.base_url,
            date.format("%Y-%m-%d"),
            urlencoding::encode(venue)
        )
    }

    pub fn win_place_odds_url(&self, date: NaiveDate, venue: &str, start: u32, end: u32) -> String {
        format!(
            "{}/racing/getJSON.aspx?type=winplaodds&date={}&venue={}&start={start}&end={end}",
            self.base_url,
            date.format("%Y-%m-%d"),
            urlencoding::encode(venue)
        )
    }

    /// GET `url` after establishing session cookies on a fresh client.
    async fn get_with_session(&self, url: &str) -> Result<String> {
        let http = Client::builder()
            .cookie_store(true)
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build bet site HTTP client")?;

        http.get(&self.base_url)
            .send()
            .await
            .context("Bet site landing request failed")?;

        debug!(url, "Fetching from bet site");
        let resp = http
            .get(url)
            .send()
            .await
            .context("Bet site request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Bet site error {status}: {body}");
        }

        resp.text().await.context("Failed to read bet site response body")
    }
}

#[async_trait]
impl LegacyFeed for BetSiteClient {
    async fn fetch_meeting_script(&self, date: NaiveDate, with_venue: bool) -> Result<String> {
        let url = self.meeting_script_url(date, with_venue);
        self.get_with_session(&url).await
    }

    async fn fetch_racecard(&self, date: NaiveDate, venue: &str, race_no: u32) -> Result<String> {
        let url = self.racecard_url(date, venue, race_no);
        self.get_with_session(&url).await
    }

    async fn fetch_win_place_odds(
        &self,
        date: NaiveDate,
        venue: &str,
        start: u32,
        end: u32,
    ) -> Result<String> {
        let url = self.win_place_odds_url(date, venue, start, end);
        self.get_with_session(&url).await
    }
}
