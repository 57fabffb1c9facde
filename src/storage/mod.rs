pub mod cache;
pub mod file_store;
pub mod plan;
pub mod record;
pub mod traits;

pub use cache::{ArticleSet, CachePolicy, CacheStats, NewsCache};
pub use file_store::FileStore;
pub use record::{DayRecord, DayState, SymbolCache};
pub use traits::{BucketStore, HealthStatus, MemoryStore, StoreStats};
