use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use crate::error::Result;
use crate::news::{Article, DateRange};

/// Remote source of articles for a symbol over a date range.
#[async_trait]
pub trait NewsFetcher: Send + Sync {
    /// Whether one call may cover several days. Single-day fetchers are
    /// called once per missing day.
    fn supports_ranges(&self) -> bool {
        true
    }

    /// Fetch every article published for `symbol` within `range`.
    ///
    /// An `Err` means nothing in the range could be fetched. Days the call
    /// reached but cannot vouch for go into [`FetchedRange::unresolved`].
    async fn fetch(&self, symbol: &str, range: DateRange) -> Result<FetchedRange>;
}

/// Outcome of one successful remote call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedRange {
    pub articles: Vec<Article>,
    pub unresolved: BTreeSet<NaiveDate>,
}

impl FetchedRange {
    pub fn complete(articles: Vec<Article>) -> Self {
        Self {
            articles,
            unresolved: BTreeSet::new(),
        }
    }

    pub fn with_unresolved<I>(mut self, dates: I) -> Self
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        self.unresolved.extend(dates);
        self
    }

    /// Group articles by publication day, keeping remote order within a day.
    /// Articles dated outside `range` are dropped.
    pub fn into_days(self, range: DateRange) -> BTreeMap<NaiveDate, Vec<Article>> {
        let mut days: BTreeMap<NaiveDate, Vec<Article>> = BTreeMap::new();
        let mut dropped = 0usize;

        for article in self.articles {
            if range.contains(article.published) {
                days.entry(article.published).or_default().push(article);
            } else {
                dropped += 1;
            }
        }

        if dropped > 0 {
            debug!("Dropped {} articles outside {}", dropped, range);
        }
        days
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_into_days_groups_in_order() {
        let range = DateRange::new(day(1), day(3)).unwrap();
        let fetched = FetchedRange::complete(vec![
            Article::new("b1", "Wire", day(2)).with_url("https://example.com/b1"),
            Article::new("a1", "Wire", day(1)).with_url("https://example.com/a1"),
            Article::new("b2", "Wire", day(2)).with_url("https://example.com/b2"),
            Article::new("out", "Wire", day(9)).with_url("https://example.com/out"),
        ]);

        let days = fetched.into_days(range);
        assert_eq!(days.len(), 2);
        let titles: Vec<&str> = days[&day(2)].iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["b1", "b2"]);
        assert!(!days.contains_key(&day(3)));
        assert!(!days.contains_key(&day(9)));
    }

    #[test]
    fn test_with_unresolved() {
        let fetched = FetchedRange::complete(Vec::new()).with_unresolved([day(2), day(3)]);
        assert_eq!(fetched.unresolved.len(), 2);
        assert!(fetched.unresolved.contains(&day(3)));
    }
}
