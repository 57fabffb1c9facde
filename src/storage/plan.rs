//! Decides, day by day, what a range query needs from the remote.

use chrono::NaiveDate;

use crate::news::{is_weekend, DateRange};
use crate::storage::cache::CachePolicy;
use crate::storage::record::{DayRecord, DayState, SymbolCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayAction {
    /// The stored record is authoritative.
    Cached,
    /// Ask the remote.
    Fetch,
    /// Write a weekend placeholder without a remote call.
    Placeholder,
}

/// One remote call: `range` spans `dates`, which are the days to store from it.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub range: DateRange,
    pub dates: Vec<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchPlan {
    pub cached: Vec<NaiveDate>,
    pub placeholders: Vec<NaiveDate>,
    pub requests: Vec<FetchRequest>,
}

impl FetchPlan {
    pub fn is_full_hit(&self) -> bool {
        self.requests.is_empty() && self.placeholders.is_empty()
    }

    pub fn fetch_day_count(&self) -> usize {
        self.requests.iter().map(|r| r.dates.len()).sum()
    }
}

pub fn classify(date: NaiveDate, record: Option<&DayRecord>, policy: &CachePolicy) -> DayAction {
    if policy.skip_weekends && is_weekend(date) {
        return match record {
            Some(_) => DayAction::Cached,
            None => DayAction::Placeholder,
        };
    }

    let record = match record {
        Some(record) => record,
        None => return DayAction::Fetch,
    };

    if policy.refresh_articles {
        return DayAction::Fetch;
    }

    match record.state() {
        DayState::Articles(_) => DayAction::Cached,
        DayState::ConfirmedEmpty if policy.refresh_no_news => DayAction::Fetch,
        DayState::ConfirmedEmpty => DayAction::Cached,
        DayState::Unconfirmed => DayAction::Fetch,
        // written while weekends were skipped; they are wanted now
        DayState::Weekend => DayAction::Fetch,
    }
}

/// Build the request list for `range`.
///
/// With `ranged` set, consecutive days to fetch share one request; weekend
/// placeholders do not interrupt a run but a cached day does. Otherwise
/// every day gets its own request.
pub fn plan(range: DateRange, cache: &SymbolCache, policy: &CachePolicy, ranged: bool) -> FetchPlan {
    let mut plan = FetchPlan::default();
    let mut run: Vec<NaiveDate> = Vec::new();

    for date in range.days() {
        match classify(date, cache.get(date), policy) {
            DayAction::Cached => {
                plan.cached.push(date);
                close_run(&mut run, &mut plan.requests, ranged);
            }
            DayAction::Placeholder => plan.placeholders.push(date),
            DayAction::Fetch => run.push(date),
        }
    }
    close_run(&mut run, &mut plan.requests, ranged);

    plan
}

fn close_run(run: &mut Vec<NaiveDate>, requests: &mut Vec<FetchRequest>, ranged: bool) {
    let dates = std::mem::take(run);
    if ranged {
        if let Some(range) = DateRange::covering(&dates) {
            requests.push(FetchRequest { range, dates });
        }
    } else {
        requests.extend(dates.into_iter().map(|date| FetchRequest {
            range: DateRange::single(date),
            dates: vec![date],
        }));
    }
}
