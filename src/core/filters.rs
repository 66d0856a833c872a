use crate::core::dataset::LabeledRecord;
use chrono::{DateTime, NaiveDate};
use std::collections::BTreeMap;

/// Request-scoped filter parameters over a labeled dataset. No hidden
/// session state: callers build one of these per query.
#[derive(Debug, Clone, Default)]
pub struct Filters {
    /// Keep rows whose label is in this set (case-insensitive).
    pub labels: Option<Vec<String>>,
    /// Keep rows whose cleaned text contains this substring
    /// (case-insensitive).
    pub contains: Option<String>,
    /// Keep rows with at least this many likes. Rows with no like count
    /// never pass a threshold.
    pub min_likes: Option<u64>,
}

pub fn apply_filters<'a>(records: &'a [LabeledRecord], filters: &Filters) -> Vec<&'a LabeledRecord> {
    let label_set: Option<Vec<String>> = filters
        .labels
        .as_ref()
        .map(|labels| labels.iter().map(|l| l.to_lowercase()).collect());
    let needle = filters.contains.as_ref().map(|s| s.to_lowercase());

    records
        .iter()
        .filter(|record| {
            if let Some(labels) = &label_set
                && !labels.contains(&record.label.to_lowercase())
            {
                return false;
            }
            if let Some(needle) = &needle
                && !record.comment_clean.to_lowercase().contains(needle)
            {
                return false;
            }
            if let Some(min) = filters.min_likes
                && record.likes.is_none_or(|likes| likes < min)
            {
                return false;
            }
            true
        })
        .collect()
}

/// Aggregate row counts per label.
pub fn label_counts<'a>(
    records: impl IntoIterator<Item = &'a LabeledRecord>,
) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(record.label.clone()).or_insert(0) += 1;
    }
    counts
}

/// Per-day per-label row counts from the `publishedAt` timestamp. Rows with
/// a missing or unparseable timestamp are skipped.
pub fn daily_label_counts<'a>(
    records: impl IntoIterator<Item = &'a LabeledRecord>,
) -> BTreeMap<(NaiveDate, String), usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        let Some(published) = record.published_at.as_deref() else {
            continue;
        };
        let Ok(timestamp) = DateTime::parse_from_rfc3339(published) else {
            continue;
        };
        let key = (timestamp.date_naive(), record.label.clone());
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}
