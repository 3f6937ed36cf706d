//! Short-lived cache for parsed discount tables.
//!
//! Keyed by (query date, mode). Entries expire by age; expired entries are
//! ignored on read and dropped by `evict_expired`.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashMap;

use crate::types::{DiscountMode, DiscountRecord};

struct CacheEntry {
    records: Vec<DiscountRecord>,
    inserted_at: DateTime<Utc>,
}

pub struct DiscountCache {
    entries: HashMap<(NaiveDate, DiscountMode), CacheEntry>,
    ttl: Duration,
}

impl DiscountCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, date: NaiveDate, mode: DiscountMode) -> Option<&[DiscountRecord]> {
        self.get_at(date, mode, Utc::now())
    }

    fn get_at(
        &self,
        date: NaiveDate,
        mode: DiscountMode,
        now: DateTime<Utc>,
    ) -> Option<&[DiscountRecord]> {
        self.entries.get(&(date, mode)).and_then(|entry| {
            if now - entry.inserted_at < self.ttl {
                Some(entry.records.as_slice())
            } else {
                None
            }
        })
    }

    pub fn insert(&mut self, date: NaiveDate, mode: DiscountMode, records: Vec<DiscountRecord>) {
        self.entries.insert(
            (date, mode),
            CacheEntry {
                records,
                inserted_at: Utc::now(),
            },
        );
    }

    /// Remove expired entries.
    pub fn evict_expired(&mut self) {
        let now = Utc::now();
        let ttl = self.ttl;
        self.entries.retain(|_, entry| now - entry.inserted_at < ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
