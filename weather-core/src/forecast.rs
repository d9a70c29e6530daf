//! Derived views over a flat, ordered forecast feed.
//!
//! All views are rebuilt from the same list on every successful fetch; nothing
//! here is mutated in place.

use std::collections::BTreeMap;

use chrono::{Local, NaiveDate, TimeZone};

use crate::model::ForecastEntry;

/// 8 slots at 3-hour granularity ≈ the next 24 hours.
pub const NEAR_TERM_SLOTS: usize = 8;
pub const DAILY_SUMMARY_DAYS: usize = 5;

pub type DayBuckets = BTreeMap<NaiveDate, Vec<ForecastEntry>>;

/// Short near-term slice: a plain prefix, no filtering.
pub fn near_term(list: &[ForecastEntry]) -> Vec<ForecastEntry> {
    list.iter().take(NEAR_TERM_SLOTS).cloned().collect()
}

/// Groups entries by local calendar day.
pub fn group_by_day(list: &[ForecastEntry]) -> DayBuckets {
    group_by_day_in(list, &Local)
}

pub fn group_by_day_in<Tz: TimeZone>(list: &[ForecastEntry], tz: &Tz) -> DayBuckets {
    let mut buckets = DayBuckets::new();
    for entry in list {
        buckets.entry(entry.day_in(tz)).or_default().push(entry.clone());
    }
    for entries in buckets.values_mut() {
        entries.sort_by_key(|e| e.timestamp);
    }
    buckets
}

/// One entry per upcoming day (today excluded), at most five.
pub fn daily_summary(list: &[ForecastEntry]) -> Vec<ForecastEntry> {
    daily_summary_in(list, &Local, Local::now().date_naive())
}

pub fn daily_summary_in<Tz: TimeZone>(
    list: &[ForecastEntry],
    tz: &Tz,
    today: NaiveDate,
) -> Vec<ForecastEntry> {
    summarize(&group_by_day_in(list, tz), today)
}

fn summarize(buckets: &DayBuckets, today: NaiveDate) -> Vec<ForecastEntry> {
    buckets
        .iter()
        .filter(|(day, _)| **day != today)
        .take(DAILY_SUMMARY_DAYS)
        .filter_map(|(_, entries)| entries.first().cloned())
        .collect()
}

/// The three views presentation needs, derived from one list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastDigest {
    pub near_term: Vec<ForecastEntry>,
    pub daily: Vec<ForecastEntry>,
    pub days: DayBuckets,
}

impl ForecastDigest {
    pub fn from_entries(list: &[ForecastEntry]) -> Self {
        Self::from_entries_in(list, &Local, Local::now().date_naive())
    }

    pub fn from_entries_in<Tz: TimeZone>(
        list: &[ForecastEntry],
        tz: &Tz,
        today: NaiveDate,
    ) -> Self {
        let days = group_by_day_in(list, tz);
        let daily = summarize(&days, today);
        Self { near_term: near_term(list), daily, days }
    }

    /// Full-day detail for the day a summary entry belongs to.
    pub fn day_of<Tz: TimeZone>(&self, entry: &ForecastEntry, tz: &Tz) -> &[ForecastEntry] {
        self.days.get(&entry.day_in(tz)).map(Vec::as_slice).unwrap_or_default()
    }
}
