//! Period-based clinical reports.
//!
//! Pipeline: fetch one snapshot of observations → bucket by week → tabulate
//! per category → rank by frequency.
//!
//! The aggregation functions are pure and work on any observation slice;
//! [`Reporter`] wires them to an [`ObservationStore`].

mod aggregator;
mod disaggregate;
mod ranking;
mod referral;
mod weeks;

pub use aggregator::*;
pub use disaggregate::*;
pub use ranking::*;
pub use referral::*;
pub use weeks::*;

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ReportConfig;
use crate::db::{DbError, DbResult};
use crate::models::{CategoryConcept, Observation};

/// Report errors.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Invalid range: start date {start} is after end date {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

pub type ReportResult<T> = Result<T, ReportError>;

/// An inclusive date range with `start <= end`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "RangeBounds")]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Deserialize)]
struct RangeBounds {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<RangeBounds> for DateRange {
    type Error = ReportError;

    fn try_from(bounds: RangeBounds) -> Result<Self, Self::Error> {
        DateRange::new(bounds.start, bounds.end)
    }
}

impl DateRange {
    /// Validate and build a range.
    pub fn new(start: NaiveDate, end: NaiveDate) -> ReportResult<Self> {
        if start > end {
            return Err(ReportError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Optional concept/category restriction for observation queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationFilter {
    /// Question concept name (e.g., "Diagnosis")
    pub concept: Option<String>,
    /// Answer category name (e.g., "Malaria")
    pub category: Option<String>,
}

impl ObservationFilter {
    pub fn concept(name: impl Into<String>) -> Self {
        Self {
            concept: Some(name.into()),
            category: None,
        }
    }

    pub fn with_category(mut self, name: impl Into<String>) -> Self {
        self.category = Some(name.into());
        self
    }
}

/// Source of observations for reports.
pub trait ObservationStore {
    /// Non-voided observations in `range` matching `filter`.
    fn fetch_observations(
        &self,
        filter: &ObservationFilter,
        range: &DateRange,
    ) -> DbResult<Vec<Observation>>;

    /// Categories recorded for `concept` in `range`, first encounter first.
    fn discover_categories(
        &self,
        concept: &str,
        range: &DateRange,
    ) -> DbResult<Vec<CategoryConcept>>;

    /// Non-voided observations for `concept` across all time.
    fn all_observations_for(&self, concept: &str) -> DbResult<Vec<Observation>>;

    /// Gender and birthdate of the given subjects.
    fn subject_demographics(
        &self,
        subject_ids: &[String],
    ) -> DbResult<HashMap<String, SubjectDemographics>>;
}

/// Disaggregated diagnosis report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisaggregatedReport {
    pub range: DateRange,
    pub rows: Vec<DisaggregatedRow>,
}

/// Runs reports against an observation store.
pub struct Reporter<'a, S: ObservationStore + ?Sized> {
    store: &'a S,
    config: ReportConfig,
}

impl<'a, S: ObservationStore + ?Sized> Reporter<'a, S> {
    /// Create a new reporter.
    pub fn new(store: &'a S, config: ReportConfig) -> Self {
        Self { store, config }
    }

    /// Weekly diagnosis counts over `[start, end]`.
    pub fn weekly_report(&self, start: NaiveDate, end: NaiveDate) -> ReportResult<WeeklyReport> {
        let range = self.validate(start, end)?;
        let concept = &self.config.diagnosis_concept;

        let categories: Vec<String> = self
            .store
            .discover_categories(concept, &range)?
            .into_iter()
            .map(|c| c.name)
            .collect();
        let observations = self
            .store
            .fetch_observations(&ObservationFilter::concept(concept), &range)?;

        WeeklyAggregator::new(self.config.week_alignment).aggregate_with_categories(
            &observations,
            &categories,
            start,
            end,
        )
    }

    /// Diagnoses ranked by frequency, with gender and age group breakdowns.
    pub fn disaggregated_diagnoses(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ReportResult<DisaggregatedReport> {
        let range = self.validate(start, end)?;
        let concept = &self.config.diagnosis_concept;

        let candidates = self.store.discover_categories(concept, &range)?;
        let observations = self
            .store
            .fetch_observations(&ObservationFilter::concept(concept), &range)?;

        let mut subject_ids: Vec<String> =
            observations.iter().map(|o| o.subject_id.clone()).collect();
        subject_ids.sort();
        subject_ids.dedup();
        let subjects = self.store.subject_demographics(&subject_ids)?;

        Ok(DisaggregatedReport {
            range,
            rows: disaggregate(&observations, &candidates, &subjects),
        })
    }

    /// Referrals made over `[start, end]`.
    pub fn referrals(&self, start: NaiveDate, end: NaiveDate) -> ReportResult<ReferralReport> {
        let range = self.validate(start, end)?;
        let concept = &self.config.referral_concept;

        let observations = self
            .store
            .fetch_observations(&ObservationFilter::concept(concept), &range)?;
        let history = self.store.all_observations_for(concept)?;

        Ok(referral_report(&observations, &history, range))
    }

    fn validate(&self, start: NaiveDate, end: NaiveDate) -> ReportResult<DateRange> {
        DateRange::new(start, end).map_err(|e| {
            tracing::info!(%start, %end, "rejected report request: {}", e);
            e
        })
    }
}
