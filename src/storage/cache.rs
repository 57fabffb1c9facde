use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::collections::hash_map::Entry;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::news::fetcher::NewsFetcher;
use crate::news::{normalize_symbol, Article, DateRange, DayBucket};
use crate::storage::plan;
use crate::storage::record::{DayRecord, SymbolCache};
use crate::storage::traits::BucketStore;

/// Limits and refresh rules applied to a range query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachePolicy {
    /// Cap on the combined result; unset means unlimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_articles_total: Option<usize>,

    /// Cap on each day's contribution; unset means unlimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_articles_per_day: Option<usize>,

    /// Re-check days confirmed to have no news.
    pub refresh_no_news: bool,

    /// Re-fetch every day in range, overwriting what is stored.
    pub refresh_articles: bool,

    /// Store Saturdays and Sundays as placeholders instead of fetching them.
    pub skip_weekends: bool,

    /// Empty days younger than this many days stay unconfirmed. 0 confirms
    /// every empty fetch.
    pub confirm_empty_after_days: u32,
}

impl CachePolicy {
    pub fn validate(&self) -> Result<()> {
        if self.max_articles_total == Some(0) {
            return Err(Error::Config("max_articles_total must be greater than 0".to_string()));
        }
        if self.max_articles_per_day == Some(0) {
            return Err(Error::Config("max_articles_per_day must be greater than 0".to_string()));
        }
        Ok(())
    }
}

/// Articles for a range plus where each day came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleSet {
    pub symbol: String,
    pub range: DateRange,
    pub articles: Vec<Article>,
    /// Days answered from stored records.
    pub cached_dates: Vec<NaiveDate>,
    /// Days fetched successfully by this call, empty ones included.
    pub fetched_dates: Vec<NaiveDate>,
    /// Days whose fetch failed or came back unresolved; they contribute nothing.
    pub failed_dates: Vec<NaiveDate>,
    /// Weekend placeholders written by this call.
    pub weekend_dates: Vec<NaiveDate>,
    /// Resolved days that have no articles.
    pub no_news_dates: Vec<NaiveDate>,
    /// Days that could not be persisted and live in memory only.
    pub storage_failures: Vec<NaiveDate>,
    pub remote_calls: usize,
}

impl ArticleSet {
    fn new(symbol: &str, range: DateRange) -> Self {
        Self {
            symbol: symbol.to_string(),
            range,
            articles: Vec::new(),
            cached_dates: Vec::new(),
            fetched_dates: Vec::new(),
            failed_dates: Vec::new(),
            weekend_dates: Vec::new(),
            no_news_dates: Vec::new(),
            storage_failures: Vec::new(),
            remote_calls: 0,
        }
    }

    /// Every day in range has confirmed coverage.
    pub fn is_complete(&self) -> bool {
        self.failed_dates.is_empty()
    }

    pub fn is_degraded(&self) -> bool {
        !self.storage_failures.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} {}: {} articles; {} days from cache, {} fetched, {} without news, {} failed ({} remote calls)",
            self.symbol,
            self.range,
            self.articles.len(),
            self.cached_dates.len(),
            self.fetched_dates.len(),
            self.no_news_dates.len(),
            self.failed_dates.len(),
            self.remote_calls
        )
    }
}

/// Running totals over the lifetime of a [`NewsCache`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub queries: u64,
    pub days_from_cache: u64,
    pub days_fetched: u64,
    pub days_failed: u64,
    pub days_without_news: u64,
    pub remote_calls: u64,
    pub storage_writes: u64,
    pub storage_failures: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.days_from_cache + self.days_fetched + self.days_failed;
        if total == 0 {
            0.0
        } else {
            self.days_from_cache as f64 / total as f64
        }
    }

    fn record(&mut self, set: &ArticleSet) {
        self.queries += 1;
        self.days_from_cache += set.cached_dates.len() as u64;
        self.days_fetched += set.fetched_dates.len() as u64;
        self.days_failed += set.failed_dates.len() as u64;
        self.days_without_news += set.no_news_dates.len() as u64;
        self.remote_calls += set.remote_calls as u64;
    }
}

/// Symbol- and day-partitioned article cache in front of a [`NewsFetcher`].
///
/// Records are loaded from the store the first time a symbol is queried and
/// every new or refreshed day is written back before the query returns.
/// A day stored as fetched is never fetched again unless the policy asks
/// for a refresh.
pub struct NewsCache {
    store: Arc<dyn BucketStore>,
    fetcher: Arc<dyn NewsFetcher>,
    policy: CachePolicy,
    symbols: HashMap<String, SymbolCache>,
    stats: CacheStats,
    degraded: bool,
    today: NaiveDate,
}

impl NewsCache {
    pub fn open(
        store: Arc<dyn BucketStore>,
        fetcher: Arc<dyn NewsFetcher>,
        policy: CachePolicy,
    ) -> Result<Self> {
        policy.validate()?;
        debug!("Opening news cache with policy {:?}", policy);

        Ok(Self {
            store,
            fetcher,
            policy,
            symbols: HashMap::new(),
            stats: CacheStats::default(),
            degraded: false,
            today: Utc::now().date_naive(),
        })
    }

    /// Override the date used to judge how recent an empty day is.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Some write failed this run and the affected days are memory-only.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Articles for `symbol` between `start` and `end` inclusive.
    pub async fn get_articles(
        &mut self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        policy: &CachePolicy,
    ) -> Result<ArticleSet> {
        let range = DateRange::new(start, end)?;
        policy.validate()?;
        let symbol = normalize_symbol(symbol)?;
        self.query(&symbol, range, policy).await
    }

    /// [`get_articles`](Self::get_articles) with the policy given to `open`.
    pub async fn get_range(&mut self, symbol: &str, range: DateRange) -> Result<ArticleSet> {
        let policy = self.policy.clone();
        let symbol = normalize_symbol(symbol)?;
        self.query(&symbol, range, &policy).await
    }

    /// End of run: flush the store and hand back the totals.
    pub fn close(self) -> Result<CacheStats> {
        self.store.flush()?;
        info!(
            "News cache closed: {} queries, {} days from cache, {} fetched, {} failed, hit rate {:.1}%{}",
            self.stats.queries,
            self.stats.days_from_cache,
            self.stats.days_fetched,
            self.stats.days_failed,
            self.stats.hit_rate() * 100.0,
            if self.degraded { " (degraded: some days were not persisted)" } else { "" }
        );
        Ok(self.stats)
    }

    async fn query(&mut self, symbol: &str, range: DateRange, policy: &CachePolicy) -> Result<ArticleSet> {
        let ranged = self.fetcher.supports_ranges();
        let plan = {
            let cache = match self.symbols.entry(symbol.to_string()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(self.store.load_symbol(symbol)?),
            };
            plan::plan(range, cache, policy, ranged)
        };

        let mut set = ArticleSet::new(symbol, range);
        set.cached_dates = plan.cached.clone();

        if plan.is_full_hit() {
            debug!("All news for {} {} served from cache", symbol, range);
        } else {
            debug!(
                "{} {}: {} cached days, {} days to fetch in {} requests",
                symbol,
                range,
                plan.cached.len(),
                plan.fetch_day_count(),
                plan.requests.len()
            );
        }

        for &date in &plan.placeholders {
            self.record_day(symbol, DayRecord::weekend(date), &mut set);
            set.weekend_dates.push(date);
        }

        let fetcher = Arc::clone(&self.fetcher);
        let mut failed = BTreeSet::new();
        let mut requests: VecDeque<plan::FetchRequest> = plan.requests.into();

        while let Some(request) = requests.pop_front() {
            set.remote_calls += 1;
            match fetcher.fetch(symbol, request.range).await {
                Ok(mut fetched) => {
                    let unresolved = std::mem::take(&mut fetched.unresolved);
                    let mut by_day = fetched.into_days(request.range);
                    let batched = request.range.start() != request.range.end();

                    for date in request.dates {
                        if unresolved.contains(&date) {
                            if batched {
                                debug!("Retrying {} on {} on its own", symbol, date);
                                requests.push_back(plan::FetchRequest {
                                    range: DateRange::single(date),
                                    dates: vec![date],
                                });
                            } else {
                                warn!("No confirmed news coverage for {} on {}", symbol, date);
                                failed.insert(date);
                            }
                            continue;
                        }

                        let bucket = DayBucket::from_articles(date, by_day.remove(&date).unwrap_or_default());
                        let record = if bucket.is_empty() && !self.confirms_empty(date, policy) {
                            DayRecord::unconfirmed(date)
                        } else {
                            DayRecord::fetched(bucket)
                        };
                        self.record_day(symbol, record, &mut set);
                        set.fetched_dates.push(date);
                    }
                }
                Err(e) if e.is_temporary() => {
                    warn!(
                        "Fetching news for {} {} failed, continuing without those days: {}",
                        symbol, request.range, e
                    );
                    failed.extend(request.dates);
                }
                Err(e) => return Err(e),
            }
        }

        set.fetched_dates.sort();
        set.failed_dates = failed.into_iter().collect();
        self.assemble(symbol, policy, &mut set);
        self.stats.record(&set);

        info!("{}", set.summary());
        Ok(set)
    }

    fn confirms_empty(&self, date: NaiveDate, policy: &CachePolicy) -> bool {
        policy.confirm_empty_after_days == 0
            || (self.today - date).num_days() > i64::from(policy.confirm_empty_after_days)
    }

    /// Keep the record in memory and persist it. A failed write degrades
    /// the cache but does not lose the day for this run.
    fn record_day(&mut self, symbol: &str, record: DayRecord, set: &mut ArticleSet) {
        let date = record.date();
        match self.store.write_day(symbol, &record) {
            Ok(()) => self.stats.storage_writes += 1,
            Err(e) => {
                error!(
                    "Failed to persist news for {} on {}, keeping it in memory only: {}",
                    symbol, date, e
                );
                self.degraded = true;
                self.stats.storage_failures += 1;
                set.storage_failures.push(date);
            }
        }
        self.symbols.entry(symbol.to_string()).or_default().insert(record);
    }

    fn assemble(&self, symbol: &str, policy: &CachePolicy, set: &mut ArticleSet) {
        let failed: HashSet<NaiveDate> = set.failed_dates.iter().copied().collect();
        let cache = self.symbols.get(symbol);
        let mut articles = Vec::new();

        for date in set.range.days() {
            if failed.contains(&date) {
                continue;
            }
            match cache.and_then(|c| c.get(date)) {
                Some(record) if !record.bucket.is_empty() => {
                    articles.extend(record.bucket.take(policy.max_articles_per_day).iter().cloned());
                }
                _ => set.no_news_dates.push(date),
            }
        }

        if let Some(total) = policy.max_articles_total {
            articles.truncate(total);
        }
        set.articles = articles;
    }
}
