use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::storage::record::{DayRecord, SymbolCache};
use crate::storage::traits::{BucketStore, HealthStatus, StoreStats};

pub const FORMAT_VERSION: u32 = 1;

const RECORD_EXTENSION: &str = "json";
const TEMP_SUFFIX: &str = ".tmp";

/// On-disk form of a record; the symbol is repeated so a misplaced file is detected.
#[derive(Serialize)]
struct StoredDayRef<'a> {
    version: u32,
    symbol: &'a str,
    #[serde(flatten)]
    record: &'a DayRecord,
}

#[derive(Deserialize)]
struct StoredDay {
    version: u32,
    symbol: String,
    #[serde(flatten)]
    record: DayRecord,
}

/// One JSON file per (symbol, day) under `root/<SYMBOL>/<YYYY-MM-DD>.json`.
///
/// Each write goes to a temporary file in the symbol directory which is then
/// renamed over the target, so readers see either the old or the new record.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.exists() {
            fs::create_dir_all(&root).map_err(|e| {
                Error::Storage(format!(
                    "Failed to create news database directory '{}': {}",
                    root.display(),
                    e
                ))
            })?;
        }
        if !root.is_dir() {
            return Err(Error::Storage(format!("'{}' is not a directory", root.display())));
        }

        tracing::debug!("News database directory: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn symbol_dir(&self, symbol: &str) -> PathBuf {
        self.root.join(symbol)
    }

    pub fn record_path(&self, symbol: &str, date: NaiveDate) -> PathBuf {
        self.symbol_dir(symbol)
            .join(format!("{}.{}", date.format("%Y-%m-%d"), RECORD_EXTENSION))
    }

    /// Direct lookup of a single day.
    pub fn read_day(&self, symbol: &str, date: NaiveDate) -> Result<Option<DayRecord>> {
        let path = self.record_path(symbol, date);
        if !path.exists() {
            return Ok(None);
        }
        Self::read_record(&path, symbol).map(Some)
    }

    fn read_record(path: &Path, symbol: &str) -> Result<DayRecord> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Storage(format!("Failed to read record '{}': {}", path.display(), e))
        })?;

        let stored: StoredDay = serde_json::from_str(&content).map_err(|e| {
            Error::Storage(format!("Corrupt record '{}': {}", path.display(), e))
        })?;

        if stored.version != FORMAT_VERSION {
            return Err(Error::Storage(format!(
                "Record '{}' has format version {}, expected {}",
                path.display(),
                stored.version,
                FORMAT_VERSION
            )));
        }

        if stored.symbol != symbol {
            return Err(Error::Storage(format!(
                "Record '{}' belongs to symbol '{}', not '{}'",
                path.display(),
                stored.symbol,
                symbol
            )));
        }

        let expected = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok());
        if expected != Some(stored.record.date()) {
            return Err(Error::Storage(format!(
                "Record '{}' holds date {} which does not match its file name",
                path.display(),
                stored.record.date()
            )));
        }

        Ok(stored.record)
    }

    fn list_error(path: &Path, e: std::io::Error) -> Error {
        Error::Storage(format!("Failed to list '{}': {}", path.display(), e))
    }

    fn is_temp_file(path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .map_or(false, |name| name.ends_with(TEMP_SUFFIX))
    }

    fn is_record_file(path: &Path) -> bool {
        path.extension().and_then(|ext| ext.to_str()) == Some(RECORD_EXTENSION)
    }

    /// Remove temporary files left behind by interrupted writes.
    pub fn cleanup(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in WalkDir::new(&self.root).max_depth(2).into_iter().flatten() {
            if entry.file_type().is_file() && Self::is_temp_file(entry.path()) {
                match fs::remove_file(entry.path()) {
                    Ok(()) => removed += 1,
                    Err(e) => tracing::warn!(
                        "Failed to remove stale temp file '{}': {}",
                        entry.path().display(),
                        e
                    ),
                }
            }
        }
        if removed > 0 {
            tracing::info!("Removed {} stale temp files from {}", removed, self.root.display());
        }
        Ok(removed)
    }

    fn record_files(&self) -> impl Iterator<Item = walkdir::DirEntry> {
        WalkDir::new(&self.root)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .flatten()
            .filter(|entry| entry.file_type().is_file() && Self::is_record_file(entry.path()))
    }
}

impl BucketStore for FileStore {
    fn load_symbol(&self, symbol: &str) -> Result<SymbolCache> {
        let dir = self.symbol_dir(symbol);
        if !dir.exists() {
            tracing::debug!("No stored news for {}", symbol);
            return Ok(SymbolCache::new());
        }

        let entries = fs::read_dir(&dir).map_err(|e| Self::list_error(&dir, e))?;

        let mut cache = SymbolCache::new();
        for entry in entries {
            let path = entry.map_err(|e| Self::list_error(&dir, e))?.path();
            if Self::is_temp_file(&path) {
                tracing::debug!("Skipping leftover temp file {}", path.display());
                continue;
            }
            if !Self::is_record_file(&path) {
                continue;
            }
            cache.insert(Self::read_record(&path, symbol)?);
        }

        tracing::debug!("Loaded {} stored days for {}", cache.len(), symbol);
        Ok(cache)
    }

    fn write_day(&self, symbol: &str, record: &DayRecord) -> Result<()> {
        let dir = self.symbol_dir(symbol);
        fs::create_dir_all(&dir).map_err(|e| {
            Error::Storage(format!("Failed to create '{}': {}", dir.display(), e))
        })?;

        let stored = StoredDayRef {
            version: FORMAT_VERSION,
            symbol,
            record,
        };
        let json = serde_json::to_vec_pretty(&stored)?;

        let target = self.record_path(symbol, record.date());
        let mut temp = tempfile::Builder::new()
            .prefix(".")
            .suffix(TEMP_SUFFIX)
            .tempfile_in(&dir)
            .map_err(|e| {
                Error::Storage(format!("Failed to create temp file in '{}': {}", dir.display(), e))
            })?;

        temp.write_all(&json)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| {
                Error::Storage(format!("Failed to write '{}': {}", temp.path().display(), e))
            })?;

        temp.persist(&target).map_err(|e| {
            Error::Storage(format!("Failed to replace '{}': {}", target.display(), e.error))
        })?;

        Ok(())
    }

    fn remove_symbol(&self, symbol: &str) -> Result<usize> {
        let dir = self.symbol_dir(symbol);
        if !dir.exists() {
            return Ok(0);
        }

        let count = fs::read_dir(&dir)
            .map_err(|e| Self::list_error(&dir, e))?
            .flatten()
            .filter(|entry| Self::is_record_file(&entry.path()))
            .count();

        fs::remove_dir_all(&dir).map_err(|e| {
            Error::Storage(format!("Failed to remove '{}': {}", dir.display(), e))
        })?;

        tracing::info!("Removed {} stored days for {}", count, symbol);
        Ok(count)
    }

    fn list_symbols(&self) -> Result<Vec<String>> {
        let mut symbols = Vec::new();
        let entries = fs::read_dir(&self.root).map_err(|e| Self::list_error(&self.root, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| Self::list_error(&self.root, e))?;
            let file_type = entry.file_type().map_err(|e| Self::list_error(&entry.path(), e))?;
            if file_type.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    symbols.push(name.to_string());
                }
            }
        }
        symbols.sort();
        Ok(symbols)
    }

    fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();
        let mut symbols = std::collections::BTreeSet::new();

        for entry in self.record_files() {
            let path = entry.path();
            let symbol = path
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();

            stats.days += 1;
            stats.size_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);

            match Self::read_record(path, &symbol) {
                Ok(record) => stats.articles += record.articles().len(),
                Err(e) => tracing::warn!("{}", e),
            }
            symbols.insert(symbol);
        }

        stats.symbols = symbols.len();
        Ok(stats)
    }

    fn flush(&self) -> Result<()> {
        self.cleanup().map(|_| ())
    }

    fn health_check(&self) -> Result<HealthStatus> {
        if !self.root.is_dir() {
            return Ok(HealthStatus::Critical(format!(
                "News database directory '{}' is missing",
                self.root.display()
            )));
        }

        if let Err(e) = tempfile::tempfile_in(&self.root) {
            return Ok(HealthStatus::Critical(format!(
                "News database directory '{}' is not writable: {}",
                self.root.display(),
                e
            )));
        }

        let mut corrupt = 0;
        for entry in self.record_files() {
            let path = entry.path();
            let symbol = path
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            if Self::read_record(path, symbol).is_err() {
                corrupt += 1;
            }
        }
        if corrupt > 0 {
            return Ok(HealthStatus::Critical(format!("{} unreadable records", corrupt)));
        }

        let stale = WalkDir::new(&self.root)
            .max_depth(2)
            .into_iter()
            .flatten()
            .filter(|entry| entry.file_type().is_file() && Self::is_temp_file(entry.path()))
            .count();
        if stale > 0 {
            return Ok(HealthStatus::Warning(format!("{} stale temp files", stale)));
        }

        Ok(HealthStatus::Healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::news::{Article, DayBucket};
    use tempfile::TempDir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn record_with(date: NaiveDate, titles: &[&str]) -> DayRecord {
        DayRecord::fetched(DayBucket::from_articles(
            date,
            titles.iter().map(|t| {
                Article::new(*t, "Reuters", date).with_url(format!("https://example.com/{}", t))
            }),
        ))
    }

    #[test]
    fn test_file_store_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path().join("news_db")).unwrap();

        store.write_day("AAPL", &record_with(day(2), &["a", "b"])).unwrap();
        store.write_day("AAPL", &DayRecord::fetched(DayBucket::new(day(3)))).unwrap();

        assert!(store.record_path("AAPL", day(2)).exists());

        let cache = store.load_symbol("AAPL").unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(day(2)).unwrap().articles().len(), 2);
        assert!(cache.get(day(3)).unwrap().confirmed);

        let direct = store.read_day("AAPL", day(2)).unwrap().unwrap();
        assert_eq!(&direct, cache.get(day(2)).unwrap());
        assert!(store.read_day("AAPL", day(9)).unwrap().is_none());
    }

    #[test]
    fn test_overwrite_replaces_whole_record() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).unwrap();

        store.write_day("AAPL", &record_with(day(2), &["a", "b", "c"])).unwrap();
        store.write_day("AAPL", &record_with(day(2), &["z"])).unwrap();

        let record = store.read_day("AAPL", day(2)).unwrap().unwrap();
        assert_eq!(record.articles().len(), 1);
        assert_eq!(record.articles()[0].title, "z");

        let leftovers: Vec<_> = fs::read_dir(store.root().join("AAPL"))
            .unwrap()
            .flatten()
            .filter(|e| FileStore::is_temp_file(&e.path()))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_corrupt_record_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).unwrap();
        store.write_day("AAPL", &record_with(day(2), &["a"])).unwrap();

        fs::write(store.record_path("AAPL", day(2)), "{ not json").unwrap();

        match store.load_symbol("AAPL") {
            Err(Error::Storage(msg)) => assert!(msg.contains("2024-01-02.json")),
            other => panic!("Expected Storage error, got {:?}", other),
        }
        assert!(matches!(store.health_check().unwrap(), HealthStatus::Critical(_)));
    }

    #[test]
    fn test_misplaced_record_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).unwrap();
        store.write_day("AAPL", &record_with(day(2), &["a"])).unwrap();

        fs::rename(store.record_path("AAPL", day(2)), store.record_path("AAPL", day(5))).unwrap();
        assert!(matches!(store.load_symbol("AAPL"), Err(Error::Storage(_))));
    }

    #[test]
    fn test_temp_files_ignored_and_cleaned() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).unwrap();
        store.write_day("AAPL", &record_with(day(2), &["a"])).unwrap();

        let stale = store.root().join("AAPL").join(".abc123.tmp");
        fs::write(&stale, "{ partial").unwrap();

        assert_eq!(store.load_symbol("AAPL").unwrap().len(), 1);
        assert!(matches!(store.health_check().unwrap(), HealthStatus::Warning(_)));

        assert_eq!(store.cleanup().unwrap(), 1);
        assert!(!stale.exists());
        assert_eq!(store.health_check().unwrap(), HealthStatus::Healthy);
    }

    #[test]
    fn test_stats_list_and_remove() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).unwrap();
        store.write_day("AAPL", &record_with(day(2), &["a", "b"])).unwrap();
        store.write_day("AAPL", &record_with(day(3), &["c"])).unwrap();
        store.write_day("MSFT", &DayRecord::unconfirmed(day(2))).unwrap();

        assert_eq!(store.list_symbols().unwrap(), vec!["AAPL", "MSFT"]);

        let stats = store.stats().unwrap();
        assert_eq!(stats.symbols, 2);
        assert_eq!(stats.days, 3);
        assert_eq!(stats.articles, 3);
        assert!(stats.size_bytes > 0);

        assert_eq!(store.remove_symbol("AAPL").unwrap(), 2);
        assert_eq!(store.list_symbols().unwrap(), vec!["MSFT"]);
        assert!(store.load_symbol("AAPL").unwrap().is_empty());
    }

    #[test]
    fn test_listing_errors_name_the_path() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path().join("news")).unwrap();

        // a plain file where a symbol directory should be
        fs::write(store.root().join("AAPL"), b"not a directory").unwrap();
        for result in [store.load_symbol("AAPL").map(|_| ()), store.remove_symbol("AAPL").map(|_| ())] {
            match result {
                Err(Error::Storage(msg)) => assert!(msg.contains("AAPL"), "{}", msg),
                other => panic!("Expected storage error, got {:?}", other),
            }
        }

        fs::remove_file(store.root().join("AAPL")).unwrap();
        fs::remove_dir(store.root()).unwrap();
        match store.list_symbols() {
            Err(Error::Storage(msg)) => assert!(msg.contains("news"), "{}", msg),
            other => panic!("Expected storage error, got {:?}", other),
        }
    }
}
