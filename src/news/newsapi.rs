//! Client for the News API `everything` endpoint.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, Response};
use tokio::time::timeout;
use tracing::{debug, warn};
use url::Url;

use crate::config::NewsApiSettings;
use crate::error::{Error, Result};
use crate::news::fetcher::{FetchedRange, NewsFetcher};
use crate::news::{Article, DateRange};

pub const API_KEY_ENV: &str = "NEWS_API_KEY";

const REMOVED_MARKER: &str = "[Removed]";

#[derive(Debug, Clone)]
pub struct NewsApiClient {
    client: Client,
    base_url: Url,
    api_key: String,
    language: String,
    sort_by: String,
    page_size: u32,
    query_suffix: String,
    timeout_duration: Duration,
}

impl NewsApiClient {
    pub fn new(api_key: impl Into<String>, settings: &NewsApiSettings) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::Config("News API key is empty".to_string()));
        }

        let base_url = Url::parse(&settings.base_url)
            .map_err(|_| Error::InvalidUrl(settings.base_url.clone()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout))
            .user_agent(settings.user_agent.clone())
            .gzip(true)
            .build()
            .map_err(|e| Error::HttpError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            api_key,
            language: settings.language.clone(),
            sort_by: settings.sort_by.clone(),
            page_size: settings.page_size,
            query_suffix: settings.query_suffix.trim().to_string(),
            timeout_duration: Duration::from_secs(settings.timeout),
        })
    }

    /// Build a client with the key taken from `NEWS_API_KEY`.
    pub fn from_env(settings: &NewsApiSettings) -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| {
            Error::Config(format!(
                "{} not found; set it in the environment or a .env file",
                API_KEY_ENV
            ))
        })?;
        Self::new(api_key, settings)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_duration = timeout;
        self
    }

    /// Search expression sent as `q`. Index symbols such as `^GSPC` are
    /// searched without the caret.
    pub fn query_for(&self, symbol: &str) -> String {
        let base = symbol.replace('^', "");
        if self.query_suffix.is_empty() {
            base
        } else {
            format!("{} OR {}", base, self.query_suffix)
        }
    }

    async fn send(&self, query: &str, range: DateRange) -> Result<Response> {
        let url = self
            .base_url
            .join("v2/everything")
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", self.base_url, e)))?;

        self.client
            .get(url)
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("q", query.to_string()),
                ("from", range.start().to_string()),
                ("to", range.end().to_string()),
                ("language", self.language.clone()),
                ("sortBy", self.sort_by.clone()),
                ("pageSize", self.page_size.to_string()),
            ])
            .send()
            .await
            .map_err(|e| Error::HttpError(format!("Request failed: {}", e)))
    }
}

#[async_trait]
impl NewsFetcher for NewsApiClient {
    async fn fetch(&self, symbol: &str, range: DateRange) -> Result<FetchedRange> {
        let query = self.query_for(symbol);
        debug!("News API query '{}' for {} ({})", query, symbol, range);

        let response = timeout(self.timeout_duration, self.send(&query, range))
            .await
            .map_err(|_| Error::Timeout(format!("News API request for {} {} timed out", symbol, range)))?;
        let response = response?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::HttpError(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<wire::ErrorBody>(&body)
                .map(|e| e.describe())
                .unwrap_or_else(|_| status.canonical_reason().unwrap_or("Unknown error").to_string());
            return Err(Error::HttpError(format!(
                "HTTP {} from News API: {}",
                status.as_u16(),
                detail
            )));
        }

        let envelope: wire::Envelope = serde_json::from_str(&body)
            .map_err(|e| Error::Fetch(format!("Malformed News API response for {} {}: {}", symbol, range, e)))?;
        if envelope.status != "ok" {
            let detail = serde_json::from_str::<wire::ErrorBody>(&body)
                .map(|e| e.describe())
                .unwrap_or_else(|_| format!("status '{}'", envelope.status));
            return Err(Error::HttpError(format!("News API error: {}", detail)));
        }

        let returned = envelope.articles.len();
        let articles: Vec<Article> = envelope
            .articles
            .into_iter()
            .filter_map(wire::RawArticle::into_article)
            .collect();
        debug!("News API returned {} articles ({} usable) for {}", returned, articles.len(), symbol);

        let truncated = envelope
            .total_results
            .map_or(false, |total| total > returned as u64);
        let mut fetched = FetchedRange::complete(articles);

        if truncated && range.start() == range.end() {
            // a single day cannot be split further; keep the first page
            warn!(
                "News API response for {} on {} truncated at {} of {} articles",
                symbol,
                range.start(),
                returned,
                envelope.total_results.unwrap_or_default()
            );
        } else if truncated {
            let covered: BTreeSet<NaiveDate> = fetched.articles.iter().map(|a| a.published).collect();
            let unresolved: Vec<NaiveDate> = range.days().filter(|d| !covered.contains(d)).collect();
            warn!(
                "News API response for {} {} truncated at {} articles; {} days left unresolved",
                symbol,
                range,
                returned,
                unresolved.len()
            );
            fetched = fetched.with_unresolved(unresolved);
        }

        Ok(fetched)
    }
}

/// Publication day of a News API timestamp, in UTC.
fn published_day(raw: &str) -> Option<NaiveDate> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc).date_naive());
    }
    let date_part = raw.split('T').next()?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

mod wire {
    use serde::Deserialize;

    use super::{published_day, REMOVED_MARKER};
    use crate::news::Article;

    #[derive(Deserialize)]
    pub(super) struct Envelope {
        pub(super) status: String,
        #[serde(rename = "totalResults")]
        pub(super) total_results: Option<u64>,
        #[serde(default)]
        pub(super) articles: Vec<RawArticle>,
    }

    #[derive(Deserialize)]
    pub(super) struct ErrorBody {
        pub(super) code: Option<String>,
        pub(super) message: Option<String>,
    }

    impl ErrorBody {
        pub(super) fn describe(&self) -> String {
            match (&self.code, &self.message) {
                (Some(code), Some(message)) => format!("{}: {}", code, message),
                (Some(code), None) => code.clone(),
                (None, Some(message)) => message.clone(),
                (None, None) => "no error detail".to_string(),
            }
        }
    }

    #[derive(Deserialize)]
    pub(super) struct RawArticle {
        pub(super) source: Option<Source>,
        pub(super) title: Option<String>,
        pub(super) description: Option<String>,
        pub(super) url: Option<String>,
        #[serde(rename = "publishedAt")]
        pub(super) published_at: Option<String>,
    }

    #[derive(Deserialize)]
    pub(super) struct Source {
        pub(super) name: Option<String>,
    }

    impl RawArticle {
        pub(super) fn into_article(self) -> Option<Article> {
            let title = self.title.filter(|t| !t.trim().is_empty() && t != REMOVED_MARKER)?;
            let published = published_day(self.published_at.as_deref()?)?;
            let source = self
                .source
                .and_then(|s| s.name)
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "Unknown".to_string());

            let mut article = Article::new(title, source, published);
            if let Some(url) = self.url.filter(|u| !u.trim().is_empty()) {
                article = article.with_url(url);
            }
            if let Some(description) = self.description.filter(|d| !d.trim().is_empty()) {
                article = article.with_description(description);
            }
            Some(article)
        }
    }
}
