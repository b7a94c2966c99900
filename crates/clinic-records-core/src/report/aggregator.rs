//! Weekly diagnosis aggregation.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ranking::{rank_by_count, CategoryTotal};
use super::weeks::{week_buckets, WeekAlignment, WeekBucket};
use super::{DateRange, ReportResult};
use crate::models::Observation;

/// Category name → count.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct FrequencyTable {
    counts: BTreeMap<String, usize>,
}

impl FrequencyTable {
    /// Table with every category present at zero.
    pub fn with_categories(categories: &[String]) -> Self {
        Self {
            counts: categories.iter().map(|c| (c.clone(), 0)).collect(),
        }
    }

    pub fn increment(&mut self, category: &str) {
        *self.counts.entry(category.to_string()).or_default() += 1;
    }

    /// Count for `category`; zero when absent.
    pub fn get(&self, category: &str) -> usize {
        self.counts.get(category).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Counts for one week bucket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeekCounts {
    pub bucket: WeekBucket,
    pub counts: FrequencyTable,
}

/// Result of a weekly aggregation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeeklyReport {
    pub range: DateRange,
    /// Category universe in first-encounter order
    pub categories: Vec<String>,
    /// One entry per bucket, in date order
    pub weeks: Vec<WeekCounts>,
    /// Categories by descending total across the whole range
    pub ranked: Vec<CategoryTotal>,
}

impl WeeklyReport {
    /// Total for `category` across the whole range.
    pub fn total(&self, category: &str) -> usize {
        self.ranked
            .iter()
            .find(|t| t.category == category)
            .map_or(0, |t| t.total)
    }

    /// Bucket counts for the week containing `date`.
    pub fn week_of(&self, date: NaiveDate) -> Option<&WeekCounts> {
        self.weeks.iter().find(|w| w.bucket.contains(date))
    }
}

/// Weekly aggregator with a fixed bucket alignment.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeeklyAggregator {
    alignment: WeekAlignment,
}

impl WeeklyAggregator {
    pub fn new(alignment: WeekAlignment) -> Self {
        Self { alignment }
    }

    /// Aggregate over the categories that actually occur in range.
    pub fn aggregate(
        &self,
        observations: &[Observation],
        start: NaiveDate,
        end: NaiveDate,
    ) -> ReportResult<WeeklyReport> {
        let range = DateRange::new(start, end)?;
        let categories = categories_in_range(observations, &range);
        Ok(self.tabulate(observations, categories, range))
    }

    /// Aggregate over an explicit category universe.
    ///
    /// Categories without occurrences still appear with zero counts;
    /// observations outside the universe are ignored.
    pub fn aggregate_with_categories(
        &self,
        observations: &[Observation],
        categories: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> ReportResult<WeeklyReport> {
        let range = DateRange::new(start, end)?;

        let mut universe: Vec<String> = Vec::with_capacity(categories.len());
        for category in categories {
            if !universe.contains(category) {
                universe.push(category.clone());
            }
        }
        Ok(self.tabulate(observations, universe, range))
    }

    fn tabulate(
        &self,
        observations: &[Observation],
        categories: Vec<String>,
        range: DateRange,
    ) -> WeeklyReport {
        let universe: HashSet<&str> = categories.iter().map(String::as_str).collect();
        let counted: Vec<&Observation> = observations
            .iter()
            .filter(|o| o.is_active() && range.contains(o.recorded_at))
            .filter(|o| universe.contains(o.category.as_str()))
            .collect();

        let weeks: Vec<WeekCounts> = week_buckets(&range, self.alignment)
            .into_iter()
            .map(|bucket| {
                let mut counts = FrequencyTable::with_categories(&categories);
                for obs in counted.iter().filter(|o| bucket.contains(o.recorded_at)) {
                    counts.increment(&obs.category);
                }
                WeekCounts { bucket, counts }
            })
            .collect();

        let ranked = rank_by_count(&categories, |category| {
            weeks.iter().map(|w| w.counts.get(category)).sum()
        });

        tracing::debug!(
            start = %range.start(),
            end = %range.end(),
            weeks = weeks.len(),
            categories = categories.len(),
            observations = counted.len(),
            "aggregated weekly report"
        );

        WeeklyReport {
            range,
            categories,
            weeks,
            ranked,
        }
    }
}

/// Aggregate with the default bucket alignment.
pub fn aggregate(
    observations: &[Observation],
    start: NaiveDate,
    end: NaiveDate,
) -> ReportResult<WeeklyReport> {
    WeeklyAggregator::default().aggregate(observations, start, end)
}

/// Distinct categories of active in-range observations, first encounter first.
fn categories_in_range(observations: &[Observation], range: &DateRange) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut categories = Vec::new();
    for obs in observations
        .iter()
        .filter(|o| o.is_active() && range.contains(o.recorded_at))
    {
        if seen.insert(obs.category.as_str()) {
            categories.push(obs.category.clone());
        }
    }
    categories
}
