use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::error::Result;
use crate::storage::record::{DayRecord, SymbolCache};

/// Durable home of day records, addressable by (symbol, date).
///
/// Writes replace a single record as a whole. Implementations must never
/// leave a half-written record behind.
pub trait BucketStore: Send + Sync {
    /// Every record stored for `symbol`. Unknown symbols yield an empty cache;
    /// unreadable or corrupt records are an error.
    fn load_symbol(&self, symbol: &str) -> Result<SymbolCache>;

    /// Insert or overwrite the record for `(symbol, record.date())`.
    fn write_day(&self, symbol: &str, record: &DayRecord) -> Result<()>;

    /// Drop every record of `symbol`, returning how many were removed.
    fn remove_symbol(&self, symbol: &str) -> Result<usize>;

    fn list_symbols(&self) -> Result<Vec<String>>;

    fn stats(&self) -> Result<StoreStats>;

    /// Called once at the end of a run.
    fn flush(&self) -> Result<()>;

    fn health_check(&self) -> Result<HealthStatus>;
}

/// Storage statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    pub symbols: usize,
    pub days: usize,
    pub articles: usize,
    pub size_bytes: u64,
}

/// Health status of storage system
#[derive(Debug, Clone, PartialEq)]
pub enum HealthStatus {
    Healthy,
    Warning(String),
    Critical(String),
}

/// Memory-only store for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    symbols: RwLock<HashMap<String, SymbolCache>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `write_day` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn get(&self, symbol: &str, date: chrono::NaiveDate) -> Option<DayRecord> {
        self.symbols
            .read()
            .get(symbol)
            .and_then(|cache| cache.get(date).cloned())
    }
}

impl BucketStore for MemoryStore {
    fn load_symbol(&self, symbol: &str) -> Result<SymbolCache> {
        Ok(self.symbols.read().get(symbol).cloned().unwrap_or_default())
    }

    fn write_day(&self, symbol: &str, record: &DayRecord) -> Result<()> {
        self.symbols
            .write()
            .entry(symbol.to_string())
            .or_default()
            .insert(record.clone());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn remove_symbol(&self, symbol: &str) -> Result<usize> {
        Ok(self
            .symbols
            .write()
            .remove(symbol)
            .map(|cache| cache.len())
            .unwrap_or(0))
    }

    fn list_symbols(&self) -> Result<Vec<String>> {
        let mut symbols: Vec<String> = self.symbols.read().keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }

    fn stats(&self) -> Result<StoreStats> {
        let symbols = self.symbols.read();
        Ok(StoreStats {
            symbols: symbols.len(),
            days: symbols.values().map(SymbolCache::len).sum(),
            articles: symbols.values().map(SymbolCache::article_count).sum(),
            size_bytes: 0,
        })
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn health_check(&self) -> Result<HealthStatus> {
        Ok(HealthStatus::Healthy)
    }
}
