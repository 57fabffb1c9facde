pub mod commands;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use crate::config::Config;
use crate::error::Result;
use crate::news::DateRange;
use crate::storage::CachePolicy;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "news-cache")]
#[command(about = "Local per-day news cache for stock analysis")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch news for a symbol, using the cache where possible
    Fetch {
        /// Ticker symbol, e.g. AAPL or ^GSPC
        symbol: String,

        #[command(flatten)]
        range: RangeArgs,

        #[command(flatten)]
        policy: PolicyArgs,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show what is cached for a symbol without contacting the remote
    Inspect {
        /// Ticker symbol
        symbol: String,

        #[command(flatten)]
        range: RangeArgs,
    },

    /// Show store statistics and health
    Status,

    /// Remove temporary files left behind by interrupted writes
    Cleanup,

    /// Delete every cached day of a symbol
    Purge {
        /// Ticker symbol
        symbol: String,
    },

    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Date range selection shared by the query commands.
#[derive(Args, Debug, Clone, Default)]
pub struct RangeArgs {
    /// First day, YYYY-MM-DD
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Last day, YYYY-MM-DD (default: today)
    #[arg(long)]
    pub to: Option<NaiveDate>,

    /// Days to look back from --to (default: analysis_period_days)
    #[arg(long, conflicts_with = "from")]
    pub days: Option<u32>,
}

impl RangeArgs {
    pub fn resolve(&self, today: NaiveDate, default_days: u32) -> Result<DateRange> {
        let end = self.to.unwrap_or(today);
        match self.from {
            Some(start) => DateRange::new(start, end),
            None => DateRange::ending_at(end, self.days.unwrap_or(default_days)),
        }
    }
}

/// Per-run overrides of the configured cache policy.
#[derive(Args, Debug, Clone, Default)]
pub struct PolicyArgs {
    /// Re-fetch every day in range, even ones with cached articles
    #[arg(long)]
    pub refresh_articles: bool,

    /// Re-check days previously confirmed to have no news
    #[arg(long)]
    pub refresh_no_news: bool,

    /// Keep at most this many articles per day
    #[arg(long)]
    pub max_per_day: Option<usize>,

    /// Keep at most this many articles in total
    #[arg(long)]
    pub max_total: Option<usize>,
}

impl PolicyArgs {
    pub fn apply(&self, base: &CachePolicy) -> CachePolicy {
        CachePolicy {
            refresh_articles: base.refresh_articles || self.refresh_articles,
            refresh_no_news: base.refresh_no_news || self.refresh_no_news,
            max_articles_per_day: self.max_per_day.or(base.max_articles_per_day),
            max_articles_total: self.max_total.or(base.max_articles_total),
            ..base.clone()
        }
    }
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config_path = commands::config_file(self.config)?;

        // init-config and completions must work without a valid config
        match self.command {
            Commands::InitConfig { force } => {
                commands::init_logging(self.debug, self.verbose, &Default::default())?;
                return commands::init_config(&config_path, force);
            }
            Commands::Completions { shell } => {
                commands::generate_completions(shell);
                return Ok(());
            }
            _ => {}
        }

        let config = Config::load_with_env(&config_path)?;
        commands::init_logging(self.debug, self.verbose, &config.logging)?;

        match self.command {
            Commands::Fetch { symbol, range, policy, json } => {
                commands::fetch(&symbol, &range, &policy, json, &config).await
            }
            Commands::Inspect { symbol, range } => {
                commands::inspect(&symbol, &range, &config)
            }
            Commands::Status => {
                commands::status(&config_path, &config)
            }
            Commands::Cleanup => {
                commands::cleanup(&config)
            }
            Commands::Purge { symbol } => {
                commands::purge(&symbol, &config)
            }
            Commands::InitConfig { .. } | Commands::Completions { .. } => Ok(()),
        }
    }
}
