use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::models::MetadataRecord;

pub const TOP_N: usize = 10;
pub const NO_DATA_MESSAGE: &str = "Could not find any email data for the selected criteria.";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CountEntry {
    pub key: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DayCount {
    pub day: NaiveDate,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InboxStats {
    pub total: usize,
    pub top_senders: Vec<CountEntry>,
    pub top_domains: Vec<CountEntry>,
    /// Index = UTC hour.
    pub by_hour: [usize; 24],
    /// Monday first.
    pub by_weekday: [usize; 7],
    /// Every calendar day from the first to the last record, zero-filled.
    pub by_day: Vec<DayCount>,
}

impl InboxStats {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Earliest hour among those with the highest count.
    pub fn busiest_hour(&self) -> Option<u32> {
        let max = *self.by_hour.iter().max()?;
        if max == 0 {
            return None;
        }
        self.by_hour
            .iter()
            .position(|&count| count == max)
            .and_then(|hour| u32::try_from(hour).ok())
    }
}

pub fn build_stats(records: &[MetadataRecord]) -> InboxStats {
    let mut by_hour = [0usize; 24];
    let mut by_weekday = [0usize; 7];
    let mut days: BTreeMap<NaiveDate, usize> = BTreeMap::new();

    for record in records {
        if let Some(slot) = by_hour.get_mut(record.hour as usize) {
            *slot += 1;
        }
        by_weekday[record.date.weekday().num_days_from_monday() as usize] += 1;
        *days.entry(record.date.date_naive()).or_default() += 1;
    }

    InboxStats {
        total: records.len(),
        top_senders: top_counts(records.iter().map(|r| r.sender_email.as_str())),
        top_domains: top_counts(records.iter().map(|r| r.sender_domain.as_str())),
        by_hour,
        by_weekday,
        by_day: fill_days(&days),
    }
}

/// Count non-empty keys; highest count first, ties alphabetical.
fn top_counts<'a>(keys: impl Iterator<Item = &'a str>) -> Vec<CountEntry> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for key in keys.map(str::trim).filter(|k| !k.is_empty()) {
        *counts.entry(key).or_default() += 1;
    }

    let mut entries: Vec<CountEntry> = counts
        .into_iter()
        .map(|(key, count)| CountEntry {
            key: key.to_string(),
            count,
        })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    entries.truncate(TOP_N);
    entries
}

fn fill_days(days: &BTreeMap<NaiveDate, usize>) -> Vec<DayCount> {
    let (Some((&first, _)), Some((&last, _))) = (days.first_key_value(), days.last_key_value())
    else {
        return Vec::new();
    };

    let mut filled = Vec::new();
    let mut day = first;
    while day <= last {
        filled.push(DayCount {
            day,
            count: days.get(&day).copied().unwrap_or(0),
        });
        day += Duration::days(1);
    }
    filled
}

/// Short human summary of the dashboard numbers.
pub fn summary_report(stats: &InboxStats) -> String {
    if stats.is_empty() {
        return NO_DATA_MESSAGE.to_string();
    }

    let sender = stats
        .top_senders
        .first()
        .map(|e| e.key.as_str())
        .unwrap_or("(unknown)");
    let domain = stats
        .top_domains
        .first()
        .map(|e| e.key.as_str())
        .unwrap_or("(unknown)");

    let mut report = format!(
        "Analysis complete! Scanned {} emails in the selected range.\n\
         - Your most frequent sender is {sender}.\n\
         - The busiest company domain is {domain}.",
        stats.total
    );
    if let Some(hour) = stats.busiest_hour() {
        report.push_str(&format!(
            "\n- You receive the most emails during the {hour}:00 hour."
        ));
    }
    report
}
