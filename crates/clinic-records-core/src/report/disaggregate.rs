//! Diagnosis counts broken down by gender and age group.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::ranking::{count_by_category, rank_categories};
use crate::models::{CategoryConcept, Observation};

/// Gender and birthdate of an observation subject.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SubjectDemographics {
    pub gender: Option<String>,
    pub birthdate: Option<NaiveDate>,
}

/// Reporting age bands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgeGroup {
    UnderSixMonths,
    SixMonthsToOneYear,
    OneToFive,
    FiveToFourteen,
    FourteenToTwenty,
    TwentyToThirty,
    ThirtyToForty,
    FortyToFifty,
    FiftyAndAbove,
    Unknown,
}

impl AgeGroup {
    pub const ALL: [AgeGroup; 10] = [
        AgeGroup::UnderSixMonths,
        AgeGroup::SixMonthsToOneYear,
        AgeGroup::OneToFive,
        AgeGroup::FiveToFourteen,
        AgeGroup::FourteenToTwenty,
        AgeGroup::TwentyToThirty,
        AgeGroup::ThirtyToForty,
        AgeGroup::FortyToFifty,
        AgeGroup::FiftyAndAbove,
        AgeGroup::Unknown,
    ];

    /// Label shown on report forms.
    pub fn label(&self) -> &'static str {
        match self {
            AgeGroup::UnderSixMonths => "< 6 months",
            AgeGroup::SixMonthsToOneYear => "6 months to < 1 yr",
            AgeGroup::OneToFive => "1 to < 5",
            AgeGroup::FiveToFourteen => "5 to 14",
            AgeGroup::FourteenToTwenty => "> 14 to < 20",
            AgeGroup::TwentyToThirty => "20 to < 30",
            AgeGroup::ThirtyToForty => "30 to < 40",
            AgeGroup::FortyToFifty => "40 to < 50",
            AgeGroup::FiftyAndAbove => "50 and above",
            AgeGroup::Unknown => "none",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.label() == label)
    }

    /// Age band of someone born on `birthdate`, measured on `on`.
    pub fn classify(birthdate: Option<NaiveDate>, on: NaiveDate) -> Self {
        let Some(birthdate) = birthdate else {
            return AgeGroup::Unknown;
        };
        let months = completed_months(birthdate, on);
        if months < 0 {
            return AgeGroup::Unknown;
        }

        match months {
            m if m < 6 => AgeGroup::UnderSixMonths,
            m if m < 12 => AgeGroup::SixMonthsToOneYear,
            m => match m / 12 {
                y if y < 5 => AgeGroup::OneToFive,
                y if y <= 14 => AgeGroup::FiveToFourteen,
                y if y < 20 => AgeGroup::FourteenToTwenty,
                y if y < 30 => AgeGroup::TwentyToThirty,
                y if y < 40 => AgeGroup::ThirtyToForty,
                y if y < 50 => AgeGroup::FortyToFifty,
                _ => AgeGroup::FiftyAndAbove,
            },
        }
    }
}

/// Whole months elapsed between `from` and `to`; negative if `to` is earlier.
pub fn completed_months(from: NaiveDate, to: NaiveDate) -> i32 {
    let mut months = (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32;
    if months > 0 && to.day() < from.day() {
        months -= 1;
    } else if months < 0 && to.day() > from.day() {
        months += 1;
    }
    if months == 0 && to < from {
        return -1;
    }
    months
}

/// Counts split by gender code.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenderBreakdown {
    pub male: usize,
    pub female: usize,
    pub other: usize,
}

impl GenderBreakdown {
    pub fn record(&mut self, gender: Option<&str>) {
        match gender {
            Some("M") => self.male += 1,
            Some("F") => self.female += 1,
            _ => self.other += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.male + self.female + self.other
    }
}

/// One ranked category with its breakdowns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisaggregatedRow {
    pub concept: CategoryConcept,
    pub total: usize,
    pub by_gender: GenderBreakdown,
    pub by_age_group: BTreeMap<AgeGroup, GenderBreakdown>,
}

/// Rank `candidates` by frequency and break each one down by gender and age
/// group at the time of the observation.
///
/// Subjects missing from `subjects` count as unknown gender and age.
pub fn disaggregate(
    observations: &[Observation],
    candidates: &[CategoryConcept],
    subjects: &HashMap<String, SubjectDemographics>,
) -> Vec<DisaggregatedRow> {
    let counts = count_by_category(observations);
    let unknown = SubjectDemographics::default();

    rank_categories(observations, candidates)
        .into_iter()
        .map(|concept| {
            let mut by_gender = GenderBreakdown::default();
            let mut by_age_group: BTreeMap<AgeGroup, GenderBreakdown> = BTreeMap::new();

            for obs in observations
                .iter()
                .filter(|o| o.is_active() && o.category == concept.name)
            {
                let subject = subjects.get(&obs.subject_id).unwrap_or(&unknown);
                let gender = subject.gender.as_deref();
                by_gender.record(gender);
                by_age_group
                    .entry(AgeGroup::classify(subject.birthdate, obs.recorded_at))
                    .or_default()
                    .record(gender);
            }

            DisaggregatedRow {
                total: counts.get(concept.name.as_str()).copied().unwrap_or(0),
                concept,
                by_gender,
                by_age_group,
            }
        })
        .collect()
}
