//! Shared fixtures for the integration tests: News API response bodies
//! and a scripted fetcher.
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use stock_news_cache::error::{Error, Result};
use stock_news_cache::news::fetcher::{FetchedRange, NewsFetcher};
use stock_news_cache::news::{Article, DateRange};

/// `everything` response for AAPL over 2024-01-01..=2024-01-03.
/// Two usable articles on the 2nd (plus a duplicate and a removed item),
/// one on the 3rd, none on the 1st.
pub const AAPL_JAN_1_TO_3: &str = r#"{
    "status": "ok",
    "totalResults": 5,
    "articles": [
        {
            "source": {"id": "reuters", "name": "Reuters"},
            "author": "Jane Doe",
            "title": "Apple unveils new chip",
            "description": "The company showed its latest silicon.",
            "url": "https://example.com/apple-chip",
            "urlToImage": null,
            "publishedAt": "2024-01-02T14:30:00Z",
            "content": "Apple on Tuesday..."
        },
        {
            "source": {"id": null, "name": "MarketWatch"},
            "author": null,
            "title": "Apple shows off new chip",
            "description": "Syndicated copy of the Reuters story.",
            "url": "https://example.com/apple-chip",
            "publishedAt": "2024-01-02T15:00:00Z",
            "content": null
        },
        {
            "source": {"id": null, "name": "[Removed]"},
            "title": "[Removed]",
            "description": "[Removed]",
            "url": "https://removed.com",
            "publishedAt": "1970-01-01T00:00:00Z"
        },
        {
            "source": {"id": "bloomberg", "name": "Bloomberg"},
            "title": "Apple suppliers brace for slower quarter",
            "url": "https://example.com/apple-suppliers",
            "publishedAt": "2024-01-02T08:00:00Z"
        },
        {
            "source": {"id": null, "name": "CNBC"},
            "title": "Apple stock slips after downgrade",
            "url": "https://example.com/apple-downgrade",
            "publishedAt": "2024-01-03T16:45:00+00:00"
        }
    ]
}"#;

/// Response for 2024-01-04 alone.
pub const AAPL_JAN_4: &str = r#"{
    "status": "ok",
    "totalResults": 1,
    "articles": [
        {
            "source": {"id": null, "name": "Reuters"},
            "title": "Apple faces antitrust questions",
            "url": "https://example.com/apple-antitrust",
            "publishedAt": "2024-01-04T11:00:00Z"
        }
    ]
}"#;

pub const EMPTY_RESPONSE: &str = r#"{"status": "ok", "totalResults": 0, "articles": []}"#;

pub const RATE_LIMITED: &str = r#"{
    "status": "error",
    "code": "rateLimited",
    "message": "You have made too many requests recently."
}"#;

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

pub fn story(d: u32, n: usize) -> Article {
    Article::new(format!("Story {} on {}", n, d), "Wire", day(d))
        .with_url(format!("https://example.com/{}/{}", d, n))
}

/// Fetcher serving canned articles, recording every requested range.
pub struct ScriptedFetcher {
    ranged: bool,
    articles: BTreeMap<NaiveDate, Vec<Article>>,
    failing: Mutex<BTreeSet<NaiveDate>>,
    calls: Mutex<Vec<DateRange>>,
}

impl ScriptedFetcher {
    pub fn new(ranged: bool) -> Self {
        Self {
            ranged,
            articles: BTreeMap::new(),
            failing: Mutex::new(BTreeSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_day(mut self, d: u32, count: usize) -> Self {
        self.articles.insert(day(d), (0..count).map(|n| story(d, n)).collect());
        self
    }

    pub fn fail_on(&self, d: u32) {
        self.failing.lock().insert(day(d));
    }

    pub fn heal(&self) {
        self.failing.lock().clear();
    }

    pub fn calls(&self) -> Vec<DateRange> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl NewsFetcher for ScriptedFetcher {
    fn supports_ranges(&self) -> bool {
        self.ranged
    }

    async fn fetch(&self, _symbol: &str, range: DateRange) -> Result<FetchedRange> {
        self.calls.lock().push(range);
        if range.days().any(|d| self.failing.lock().contains(&d)) {
            return Err(Error::Fetch(format!("scripted failure for {}", range)));
        }
        Ok(FetchedRange::complete(
            range
                .days()
                .flat_map(|d| self.articles.get(&d).cloned().unwrap_or_default())
                .collect(),
        ))
    }
}
