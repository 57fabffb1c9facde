use std::path::{Path, PathBuf};
use std::fs;
use std::sync::Arc;
use chrono::Utc;
use clap_complete::{generate, Shell};
use clap::CommandFactory;
use tracing::{debug, info};

use crate::cli::{Cli, PolicyArgs, RangeArgs};
use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};
use crate::news::newsapi::{NewsApiClient, API_KEY_ENV};
use crate::news::normalize_symbol;
use crate::storage::{
    ArticleSet, BucketStore, CacheStats, DayRecord, DayState, FileStore, HealthStatus, NewsCache,
};

/// Run a cached query against News API and print the result.
pub async fn fetch(
    symbol: &str,
    range: &RangeArgs,
    policy: &PolicyArgs,
    json: bool,
    config: &Config,
) -> Result<()> {
    let range = range.resolve(Utc::now().date_naive(), config.general.analysis_period_days)?;
    let policy = policy.apply(&config.news);

    let store = Arc::new(FileStore::open(config.news_db_dir()?)?);
    let client = Arc::new(NewsApiClient::from_env(&config.news_api)?);
    let mut cache = NewsCache::open(store, client, config.news.clone())?;

    let set = cache.get_articles(symbol, range.start(), range.end(), &policy).await?;
    let stats = cache.close()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&to_json(&set))?);
    } else {
        print_articles(&set, &stats);
    }
    Ok(())
}

fn to_json(set: &ArticleSet) -> serde_json::Value {
    serde_json::json!({
        "symbol": set.symbol,
        "from": set.range.start(),
        "to": set.range.end(),
        "articles": set.articles,
        "failed_dates": set.failed_dates,
        "storage_failures": set.storage_failures,
        "remote_calls": set.remote_calls,
    })
}

fn print_articles(set: &ArticleSet, stats: &CacheStats) {
    println!("📰 {} news for {}", set.symbol, set.range);
    println!("==============================");

    if set.articles.is_empty() {
        println!("   No articles in range");
    }
    for article in &set.articles {
        println!("\n{}  [{}]  {}", article.published, article.source, article.title);
        if let Some(url) = &article.url {
            println!("   {}", url);
        }
        if let Some(sentiment) = article.sentiment {
            println!("   Sentiment: {:.2}", sentiment);
        }
    }

    println!("\n📊 Summary:");
    println!("   Articles: {}", set.articles.len());
    println!("   Days from cache: {}", set.cached_dates.len());
    println!("   Days fetched: {} ({} remote calls)", set.fetched_dates.len(), set.remote_calls);
    println!("   Days without news: {}", set.no_news_dates.len());
    println!("   Cache hit rate: {:.1}%", stats.hit_rate() * 100.0);

    if !set.is_complete() {
        println!("\n⚠️  No coverage for {} days (fetch failed, run again to retry):", set.failed_dates.len());
        println!("   {}", join_dates(&set.failed_dates));
    }
    if set.is_degraded() {
        println!("\n⚠️  {} days could not be saved to the news database:", set.storage_failures.len());
        println!("   {}", join_dates(&set.storage_failures));
    }
}

fn join_dates(dates: &[chrono::NaiveDate]) -> String {
    dates.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ")
}

/// Per-day cache state for a symbol, read straight from the store.
pub fn inspect(symbol: &str, range: &RangeArgs, config: &Config) -> Result<()> {
    let symbol = normalize_symbol(symbol)?;
    let range = range.resolve(Utc::now().date_naive(), config.general.analysis_period_days)?;
    let store = FileStore::open(config.news_db_dir()?)?;
    let cache = store.load_symbol(&symbol)?;

    println!("🔎 Cached news for {} {}", symbol, range);
    println!("==============================");

    let mut cached = 0;
    for date in range.days() {
        let record = cache.get(date);
        if record.is_some() {
            cached += 1;
        }
        println!("   {}  {}", date, describe_day(record));
    }

    println!("\n   {} of {} days cached", cached, range.len_days());
    Ok(())
}

fn describe_day(record: Option<&DayRecord>) -> String {
    match record.map(DayRecord::state) {
        Some(DayState::Articles(1)) => "1 article".to_string(),
        Some(DayState::Articles(n)) => format!("{} articles", n),
        Some(DayState::ConfirmedEmpty) => "no news".to_string(),
        Some(DayState::Unconfirmed) => "empty, not yet confirmed".to_string(),
        Some(DayState::Weekend) => "weekend (not fetched)".to_string(),
        None => "not cached".to_string(),
    }
}

/// Show configuration, store statistics and health.
pub fn status(config_path: &Path, config: &Config) -> Result<()> {
    println!("📊 News Cache Status");
    println!("====================");

    if config_path.exists() {
        println!("✅ Configuration: {}", config_path.display());
    } else {
        println!("⚠️  Configuration: using defaults ({} not found)", config_path.display());
        println!("   Run 'news-cache init-config' to create it");
    }

    if std::env::var(API_KEY_ENV).is_ok() {
        println!("✅ {}: set", API_KEY_ENV);
    } else {
        println!("❌ {}: not set (fetch will fail)", API_KEY_ENV);
    }

    let store = FileStore::open(config.news_db_dir()?)?;
    println!("\n🗄️  News database: {}", store.root().display());

    let stats = store.stats()?;
    println!("   Symbols: {}", stats.symbols);
    println!("   Days cached: {}", stats.days);
    println!("   Articles: {}", stats.articles);
    println!("   Size: {} bytes", stats.size_bytes);

    match store.health_check()? {
        HealthStatus::Healthy => println!("   ✅ Health: OK"),
        HealthStatus::Warning(msg) => println!("   ⚠️  Health: {}", msg),
        HealthStatus::Critical(msg) => println!("   ❌ Health: {}", msg),
    }

    let symbols = store.list_symbols()?;
    if !symbols.is_empty() {
        println!("\n📈 Symbols:");
        for symbol in symbols {
            let cache = store.load_symbol(&symbol)?;
            let span = match (cache.iter().next(), cache.iter().last()) {
                (Some(first), Some(last)) => format!("{} to {}", first.date(), last.date()),
                _ => "empty".to_string(),
            };
            println!(
                "   {}: {} days, {} articles ({})",
                symbol,
                cache.len(),
                cache.article_count(),
                span
            );
        }
    }

    Ok(())
}

pub fn cleanup(config: &Config) -> Result<()> {
    let store = FileStore::open(config.news_db_dir()?)?;
    let removed = store.cleanup()?;
    println!("🧹 Removed {} stale temporary files from {}", removed, store.root().display());
    Ok(())
}

pub fn purge(symbol: &str, config: &Config) -> Result<()> {
    let symbol = normalize_symbol(symbol)?;
    let store = FileStore::open(config.news_db_dir()?)?;
    let removed = store.remove_symbol(&symbol)?;
    if removed == 0 {
        println!("Nothing cached for {}", symbol);
    } else {
        println!("🗑️  Removed {} cached days for {}", removed, symbol);
    }
    Ok(())
}

/// Write the default configuration file.
pub fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(Error::Invalid(format!(
            "Configuration file already exists: {} (use --force to overwrite)",
            path.display()
        )));
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, create_default_config())?;
    info!("Created default configuration: {}", path.display());

    println!("✅ Configuration written to {}", path.display());
    println!("");
    println!("Next steps:");
    println!("   1. Put your News API key in {} (environment or .env)", API_KEY_ENV);
    println!("   2. Fetch news: news-cache fetch AAPL");
    Ok(())
}

pub fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let cmd_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, cmd_name, &mut std::io::stdout());
}

/// Initialize logging. `--debug` and `--verbose` win over the configured
/// level; `RUST_LOG` wins over the configured level too.
pub fn init_logging(debug: bool, verbose: bool, logging: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
    };

    let result = if logging.json_format {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_file(debug)
            .with_line_number(debug)
            .with_writer(std::io::stderr)
            .try_init()
    };
    result.map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))?;

    debug!("Logging initialized");
    Ok(())
}

/// `--config` or the default location.
pub fn config_file(config_path: Option<PathBuf>) -> Result<PathBuf> {
    match config_path {
        Some(path) => Ok(path),
        None => Config::default_path(),
    }
}

fn create_default_config() -> String {
    format!(r#"# News cache configuration
# Generated on {}

[general]
# Days looked back from today when fetch gets no --from/--days
analysis_period_days = 28

[news]
# Caps on returned articles; leave unset for no limit
# max_articles_per_day = 10
# max_articles_total = 200

# Re-check days previously found to have no news
refresh_no_news = false

# Re-fetch every day, replacing cached articles
refresh_articles = false

# Store Saturdays and Sundays without asking the API
skip_weekends = false

# Empty days younger than this stay unconfirmed and are re-fetched (0 = off)
confirm_empty_after_days = 0

[news_api]
base_url = "https://newsapi.org"
language = "en"
# relevancy, popularity or publishedAt
sort_by = "relevancy"
page_size = 100
# Extra search terms OR-ed with the symbol
query_suffix = ""
# Request timeout in seconds
timeout = 30

[storage]
# Defaults to the platform data directory
# data_dir = "/var/lib/news-cache"

[logging]
# error, warn, info, debug, trace
level = "info"
json_format = false
"#,
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::news::{Article, DayBucket};
    use crate::storage::CachePolicy;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_default_config_parses_to_defaults() {
        let config: Config = toml::from_str(&create_default_config()).unwrap();
        assert_eq!(config.general.analysis_period_days, 28);
        assert_eq!(config.news, CachePolicy::default());
        assert_eq!(config.news_api.sort_by, "relevancy");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_init_config_refuses_to_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cfg").join("config.toml");

        init_config(&path, false).unwrap();
        assert!(path.exists());
        assert!(matches!(init_config(&path, false), Err(Error::Invalid(_))));
        init_config(&path, true).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.news_api.page_size, 100);
    }

    #[test]
    fn test_describe_day() {
        let bucket = DayBucket::from_articles(
            day(2),
            [
                Article::new("One", "Wire", day(2)).with_url("https://example.com/1"),
                Article::new("Two", "Wire", day(2)).with_url("https://example.com/2"),
            ],
        );
        assert_eq!(describe_day(Some(&DayRecord::fetched(bucket))), "2 articles");
        assert_eq!(describe_day(Some(&DayRecord::fetched(DayBucket::new(day(3))))), "no news");
        assert_eq!(describe_day(Some(&DayRecord::unconfirmed(day(3)))), "empty, not yet confirmed");
        assert_eq!(describe_day(None), "not cached");
    }

    #[test]
    fn test_json_output_shape() {
        let set = ArticleSet {
            symbol: "AAPL".to_string(),
            range: crate::news::DateRange::new(day(1), day(3)).unwrap(),
            articles: vec![Article::new("Headline", "Reuters", day(2)).with_url("https://example.com/a")],
            cached_dates: vec![day(1)],
            fetched_dates: vec![day(2)],
            failed_dates: vec![day(3)],
            weekend_dates: Vec::new(),
            no_news_dates: vec![day(1)],
            storage_failures: Vec::new(),
            remote_calls: 1,
        };

        let json = to_json(&set);
        assert_eq!(json["symbol"], "AAPL");
        assert_eq!(json["from"], "2024-01-01");
        assert_eq!(json["articles"][0]["title"], "Headline");
        assert_eq!(json["articles"][0]["published"], "2024-01-02");
        assert_eq!(json["failed_dates"][0], "2024-01-03");
        assert_eq!(json["remote_calls"], 1);
    }

    #[test]
    fn test_inspect_and_purge() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = Some(temp_dir.path().to_path_buf());

        let store = FileStore::open(config.news_db_dir().unwrap()).unwrap();
        store
            .write_day(
                "AAPL",
                &DayRecord::fetched(DayBucket::from_articles(
                    day(2),
                    [Article::new("Headline", "Reuters", day(2))],
                )),
            )
            .unwrap();
        assert_eq!(store.list_symbols().unwrap(), vec!["AAPL"]);

        let range = RangeArgs { from: Some(day(1)), to: Some(day(3)), days: None };
        inspect("aapl", &range, &config).unwrap();
        status(&temp_dir.path().join("absent.toml"), &config).unwrap();

        purge("AAPL", &config).unwrap();
        assert!(store.list_symbols().unwrap().is_empty());
        assert!(matches!(purge("../x", &config), Err(Error::InvalidSymbol(_))));
    }

    #[test]
    fn test_config_file_prefers_flag() {
        let path = PathBuf::from("/tmp/custom.toml");
        assert_eq!(config_file(Some(path.clone())).unwrap(), path);
    }

    #[test]
    fn test_init_logging() {
        // may already be initialized by another test
        let _ = init_logging(false, false, &LoggingConfig::default());
    }
}
