//! Discount provider client.
//!
//! `GET {base}/bdata` (back) or `{base}/edata` (lay) with
//! `race_type={location}&race_date={DD-MM-YYYY}&m=HK&rc=0&c=0`.
//! The provider is informal and slow to fail, hence the short timeout.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::{DiscountFeed, USER_AGENT};
use crate::config::DiscountConfig;
use crate::types::DiscountMode;

pub struct DiscountClient {
    http: Client,
    base_url: String,
    location: String,
}

impl DiscountClient {
    pub fn new(cfg: &DiscountConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build discount HTTP client")?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            location: cfg.location.clone(),
        })
    }

    pub fn url(&self, date: NaiveDate, mode: DiscountMode) -> String {
        format!(
            "{}/{}?race_type={}&race_date={}&m=HK&rc=0&c=0",
            self.base_url,
            mode.path(),
            urlencoding::encode(&self.location),
            date.format("%d-%m-%Y")
        )
    }
}

#[async_trait]
impl DiscountFeed for DiscountClient {
    async fn fetch_discounts(&self, date: NaiveDate, mode: DiscountMode) -> Result<String> {
        let url = self.url(date, mode);
        debug!(%mode, url = %url, "Fetching discount table");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Discount request failed ({mode})"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("Discount provider error {status} ({mode})");
        }

        resp.text().await.context("Failed to read discount response body")
    }
}
