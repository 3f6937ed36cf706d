//! Racing GraphQL client.
//!
//! Endpoint: https://info.cld.hkjc.com/graphql/base/
//! Every request is a POST of `{operationName, variables, query}`; the
//! response always carries a top-level `data` key unless the upstream is
//! down.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{RacingFeed, USER_AGENT};
use crate::config::RacingConfig;

const OPERATION_NAME: &str = "racing";

const MEETING_QUERY: &str = r#"
query racing($date: String, $venueCode: String) {
  raceMeetings(date: $date, venueCode: $venueCode) {
    id
    status
    venueCode
    date
    totalNumberOfRace
    currentNumberOfRace
    meetingType
    country {
      code
      namech
      nameen
      seq
    }
    races {
      id
      no
      status
      raceName_en
      raceName_ch
      postTime
      distance
      wageringFieldSize
      raceTrack {
        description_en
        description_ch
      }
      raceCourse {
        description_en
        description_ch
        displayCode
      }
      runners {
        id
        no
        standbyNo
        status
        name_ch
        name_en
        horse {
          id
          code
        }
        barrierDrawNumber
        handicapWeight
        winOdds
        jockey {
          code
          name_en
          name_ch
        }
        trainer {
          code
          name_en
          name_ch
        }
      }
    }
    poolInvs: pmPools(
      oddsTypes: [WIN, PLA, QIN, QPL, CWA, CWB, CWC, IWN, FCT, TCE, TRI, FF, QTT, DBL, TBL, DT, TT, SixUP]
    ) {
      id
      leg {
        number
        races
      }
      status
      sellStatus
      oddsType
      investment
      mergedPoolId
      lastUpdateTime
    }
  }
}
"#;

const ODDS_QUERY: &str = r#"
query racing($date: String, $venueCode: String, $oddsTypes: [OddsType], $raceNo: Int) {
  raceMeetings(date: $date, venueCode: $venueCode) {
    pmPools(oddsTypes: $oddsTypes, raceNo: $raceNo) {
      id
      status
      sellStatus
      oddsType
      lastUpdateTime
      oddsNodes {
        combString
        oddsValue
        hotFavourite
        oddsDropValue
      }
    }
  }
}
"#;

/// Payload for the meeting query. `venue = None` asks for every venue.
pub fn meeting_payload(date: NaiveDate, venue: Option<&str>) -> Value {
    json!({
        "operationName": OPERATION_NAME,
        "variables": {
            "date": date.format("%Y-%m-%d").to_string(),
            "venueCode": venue,
        },
        "query": MEETING_QUERY,
    })
}

/// Payload for one race's odds pools.
pub fn odds_payload(date: NaiveDate, venue: &str, race_no: u32, odds_types: &[String]) -> Value {
    json!({
        "operationName": OPERATION_NAME,
        "variables": {
            "date": date.format("%Y-%m-%d").to_string(),
            "venueCode": venue,
            "raceNo": race_no,
            "oddsTypes": odds_types,
        },
        "query": ODDS_QUERY,
    })
}

/// GraphQL racing client.
pub struct GraphQlClient {
    http: Client,
    endpoint: String,
    odds_types: Vec<String>,
}

impl GraphQlClient {
    pub fn new(cfg: &RacingConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build GraphQL HTTP client")?;
        Ok(Self {
            http,
            endpoint: cfg.graphql_url.clone(),
            odds_types: cfg.odds_types.clone(),
        })
    }

    async fn post(&self, payload: &Value) -> Result<Value> {
        let resp = self
            .http
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await
            .context("GraphQL request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("GraphQL API error {status}: {body}");
        }

        resp.json::<Value>()
            .await
            .context("Failed to parse GraphQL response")
    }
}

#[async_trait]
impl RacingFeed for GraphQlClient {
    async fn fetch_meetings(&self, date: NaiveDate, venue: Option<&str>) -> Result<Value> {
        debug!(%date, venue = ?venue, "Fetching race meetings");
        self.post(&meeting_payload(date, venue)).await
    }

    async fn fetch_race_odds(&self, date: NaiveDate, venue: &str, race_no: u32) -> Result<Value> {
        debug!(%date, venue, race_no, "Fetching race odds");
        self.post(&odds_payload(date, venue, race_no, &self.odds_types)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 22).unwrap()
    }

    #[test]
    fn test_meeting_payload() {
        let payload = meeting_payload(date(), Some("ST"));
        assert_eq!(payload["operationName"], "racing");
        assert_eq!(payload["variables"]["date"], "2024-09-22");
        assert_eq!(payload["variables"]["venueCode"], "ST");
        assert!(payload["query"].as_str().unwrap().contains("totalNumberOfRace"));

        let any_venue = meeting_payload(date(), None);
        assert!(any_venue["variables"]["venueCode"].is_null());
    }

    #[test]
    fn test_odds_payload() {
        let types = vec!["WIN".to_string(), "PLA".to_string()];
        let payload = odds_payload(date(), "HV", 3, &types);
        assert_eq!(payload["variables"]["raceNo"], 3);
        assert_eq!(payload["variables"]["oddsTypes"], json!(["WIN", "PLA"]));
        assert!(payload["query"].as_str().unwrap().contains("oddsNodes"));
    }

    #[test]
    fn test_client_builds_from_config() {
        let client = GraphQlClient::new(&RacingConfig::default()).unwrap();
        assert_eq!(client.endpoint, "https://info.cld.hkjc.com/graphql/base/");
        assert_eq!(client.odds_types.len(), 2);
    }
}
