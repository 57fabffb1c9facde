pub mod cli;
pub mod config;
pub mod error;
pub mod news;
pub mod storage;

pub use config::Config;
pub use error::{Error, Result};
pub use news::{Article, DateRange, DayBucket};
pub use storage::{ArticleSet, CachePolicy, NewsCache};
