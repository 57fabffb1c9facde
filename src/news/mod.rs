pub mod fetcher;
pub mod newsapi;

use std::fmt;
use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate, Weekday};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single news item about a symbol, reduced to day granularity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub published: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Article {
    pub fn new(title: impl Into<String>, source: impl Into<String>, published: NaiveDate) -> Self {
        Self {
            title: title.into(),
            source: source.into(),
            url: None,
            published,
            sentiment: None,
            description: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_sentiment(mut self, sentiment: f64) -> Self {
        self.sentiment = Some(sentiment);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Identity used for deduplication: the URL, or title and source when
    /// the URL is missing or blank.
    pub fn dedup_key(&self) -> String {
        match self.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => format!("url:{}", url),
            _ => format!("title:{}\u{1f}{}", self.title.trim(), self.source.trim()),
        }
    }

    /// Short stable identifier derived from the dedup key.
    pub fn id(&self) -> String {
        let hash = blake3::hash(self.dedup_key().as_bytes()).to_hex();
        hash.as_str()[..16].to_string()
    }
}

/// All articles published on one calendar day for one symbol.
///
/// Articles keep the order in which they were inserted, which is the
/// remote's relevance order. Inserting an article whose dedup key is
/// already present is a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayBucket {
    pub date: NaiveDate,
    articles: Vec<Article>,
}

impl DayBucket {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            articles: Vec::new(),
        }
    }

    pub fn from_articles<I>(date: NaiveDate, articles: I) -> Self
    where
        I: IntoIterator<Item = Article>,
    {
        let mut bucket = Self::new(date);
        for article in articles {
            bucket.insert(article);
        }
        bucket
    }

    /// Returns `false` when the article was a duplicate.
    pub fn insert(&mut self, article: Article) -> bool {
        let key = article.dedup_key();
        if self.articles.iter().any(|a| a.dedup_key() == key) {
            return false;
        }
        self.articles.push(article);
        true
    }

    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    /// The first `limit` articles in stored order, or all of them.
    pub fn take(&self, limit: Option<usize>) -> &[Article] {
        match limit {
            Some(limit) if limit < self.articles.len() => &self.articles[..limit],
            _ => &self.articles,
        }
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

/// Inclusive calendar-day range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn single(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// The `days` days before `end` plus `end` itself.
    pub fn ending_at(end: NaiveDate, days: u32) -> Result<Self> {
        let start = end
            .checked_sub_signed(chrono::Duration::days(i64::from(days)))
            .ok_or_else(|| Error::Invalid(format!("{} days before {} is out of range", days, end)))?;
        Ok(Self { start, end })
    }

    /// Smallest range containing every date, `None` when there are none.
    pub fn covering(dates: &[NaiveDate]) -> Option<Self> {
        let start = *dates.iter().min()?;
        let end = *dates.iter().max()?;
        Some(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn len_days(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}..={}", self.start, self.end)
        }
    }
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn symbol_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\^?[A-Z0-9][A-Z0-9.=\-]{0,19}$").expect("symbol pattern is valid")
    })
}

/// Trim and upper-case a ticker, rejecting anything that cannot be used as
/// a storage key.
pub fn normalize_symbol(raw: &str) -> Result<String> {
    let symbol = raw.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(Error::InvalidSymbol("symbol cannot be empty".to_string()));
    }
    if !symbol_pattern().is_match(&symbol) {
        return Err(Error::InvalidSymbol(raw.to_string()));
    }
    Ok(symbol)
}
