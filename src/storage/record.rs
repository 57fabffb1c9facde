use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::news::{Article, DateRange, DayBucket};

/// Persisted state of one (symbol, day).
///
/// An empty bucket alone says nothing: `confirmed` tells a day that a real
/// remote call found empty apart from one that still has to be checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayRecord {
    #[serde(flatten)]
    pub bucket: DayBucket,
    pub confirmed: bool,
    #[serde(default)]
    pub weekend: bool,
    pub fetched_at: DateTime<Utc>,
}

/// What a record means to the fetch planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayState {
    Articles(usize),
    ConfirmedEmpty,
    Unconfirmed,
    Weekend,
}

impl DayRecord {
    /// Result of a successful remote call covering this day.
    pub fn fetched(bucket: DayBucket) -> Self {
        Self {
            bucket,
            confirmed: true,
            weekend: false,
            fetched_at: Utc::now(),
        }
    }

    /// An empty day that is too recent to be trusted as "no news".
    pub fn unconfirmed(date: NaiveDate) -> Self {
        Self {
            bucket: DayBucket::new(date),
            confirmed: false,
            weekend: false,
            fetched_at: Utc::now(),
        }
    }

    /// Placeholder written without a remote call.
    pub fn weekend(date: NaiveDate) -> Self {
        Self {
            bucket: DayBucket::new(date),
            confirmed: true,
            weekend: true,
            fetched_at: Utc::now(),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.bucket.date
    }

    pub fn articles(&self) -> &[Article] {
        self.bucket.articles()
    }

    pub fn state(&self) -> DayState {
        if !self.bucket.is_empty() {
            DayState::Articles(self.bucket.len())
        } else if self.weekend {
            DayState::Weekend
        } else if self.confirmed {
            DayState::ConfirmedEmpty
        } else {
            DayState::Unconfirmed
        }
    }
}

/// Every known day for one symbol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolCache {
    days: BTreeMap<NaiveDate, DayRecord>,
}

impl SymbolCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, date: NaiveDate) -> Option<&DayRecord> {
        self.days.get(&date)
    }

    pub fn insert(&mut self, record: DayRecord) -> Option<DayRecord> {
        self.days.insert(record.date(), record)
    }

    pub fn range(&self, range: DateRange) -> impl Iterator<Item = &DayRecord> {
        self.days.range(range.start()..=range.end()).map(|(_, record)| record)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DayRecord> {
        self.days.values()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn article_count(&self) -> usize {
        self.days.values().map(|r| r.bucket.len()).sum()
    }
}

impl FromIterator<DayRecord> for SymbolCache {
    fn from_iter<I: IntoIterator<Item = DayRecord>>(iter: I) -> Self {
        let mut cache = Self::new();
        for record in iter {
            cache.insert(record);
        }
        cache
    }
}
