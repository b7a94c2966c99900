//! Birthdate resolution, display and age.
//!
//! A birthdate may be only partly known. The missing parts are filled with
//! sentinels and the date is flagged as estimated:
//!
//! | known            | stored as      | displayed as   |
//! |------------------|----------------|----------------|
//! | age only         | July 1         | `??/???/YYYY`  |
//! | year             | July 1         | `??/???/YYYY`  |
//! | year and month   | 15th of month  | `??/Mon/YYYY`  |
//! | full date        | that date      | `DD/Mon/YYYY`  |

use chrono::{Datelike, Month, NaiveDate};

use super::{PersonError, PersonResult};
use crate::models::Birthdate;

/// Literal sent by forms and remote sites for an unknown date part.
pub const UNKNOWN: &str = "Unknown";

const ESTIMATED_MONTH: u32 = 7;
const ESTIMATED_DAY: u32 = 15;

/// Raw birth fields as submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BirthFields {
    pub year: Option<String>,
    pub month: Option<String>,
    pub day: Option<String>,
    pub age_estimate: Option<String>,
}

impl BirthFields {
    pub fn is_empty(&self) -> bool {
        [&self.year, &self.month, &self.day, &self.age_estimate]
            .iter()
            .all(|f| is_blank(f.as_deref()))
    }
}

impl Birthdate {
    /// Exact, non-estimated birthdate.
    pub fn exact(date: NaiveDate) -> Self {
        Self {
            date,
            estimated: false,
        }
    }

    /// Resolve submitted birth fields.
    ///
    /// `reference_year` anchors age estimates. Returns `Ok(None)` when no
    /// birth field was submitted at all.
    pub fn resolve(fields: &BirthFields, reference_year: i32) -> PersonResult<Option<Self>> {
        if fields.is_empty() {
            return Ok(None);
        }

        let year = fields.year.as_deref().map(str::trim).unwrap_or_default();
        if year == UNKNOWN || (year.is_empty() && !is_blank(fields.age_estimate.as_deref())) {
            return Self::from_age(fields.age_estimate.as_deref(), reference_year).map(Some);
        }

        let year: i32 = year
            .parse()
            .map_err(|_| PersonError::InvalidBirthdate(format!("year '{}'", year)))?;

        let Some(month) = parse_month(fields.month.as_deref()) else {
            return estimated(year, ESTIMATED_MONTH, 1).map(Some);
        };

        match parse_day(fields.day.as_deref())? {
            None => estimated(year, month, ESTIMATED_DAY).map(Some),
            Some(day) => NaiveDate::from_ymd_opt(year, month, day)
                .map(|date| Some(Self::exact(date)))
                .ok_or_else(|| {
                    PersonError::InvalidBirthdate(format!("{}-{:02}-{:02}", year, month, day))
                }),
        }
    }

    /// July 1 of `reference_year - age`.
    pub fn from_age(age_estimate: Option<&str>, reference_year: i32) -> PersonResult<Self> {
        let age: i32 = age_estimate
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PersonError::InvalidBirthdate("missing age estimate".into()))?
            .parse()
            .map_err(|_| {
                PersonError::InvalidBirthdate(format!(
                    "age estimate '{}'",
                    age_estimate.unwrap_or_default()
                ))
            })?;
        if age < 0 {
            return Err(PersonError::InvalidBirthdate(format!("age estimate {}", age)));
        }
        estimated(reference_year - age, ESTIMATED_MONTH, 1)
    }

    /// Only the year is known.
    pub fn is_year_only(&self) -> bool {
        self.estimated
            && self.date.day() == 1
            && (self.date.month() == ESTIMATED_MONTH || self.date.month() == 1)
    }

    /// Display form, with `?` for the unknown parts.
    pub fn formatted(&self) -> String {
        if !self.estimated {
            self.date.format("%d/%b/%Y").to_string()
        } else if self.is_year_only() {
            self.date.format("??/???/%Y").to_string()
        } else {
            self.date.format("??/%b/%Y").to_string()
        }
    }

    /// Age in whole years on `today`.
    ///
    /// A year-only estimate recorded this year is rounded up before July so
    /// that someone registered in March as 25 stays 25.
    pub fn age(&self, today: NaiveDate, date_created: NaiveDate) -> i32 {
        let born = self.date;
        let mut age = today.year() - born.year();
        if (today.month(), today.day()) < (born.month(), born.day()) {
            age -= 1;
        }

        if self.estimated
            && born.month() == ESTIMATED_MONTH
            && born.day() == 1
            && today.month() < ESTIMATED_MONTH
            && date_created.year() == today.year()
        {
            age += 1;
        }
        age
    }
}

/// Month number from a number, full name or abbreviation.
///
/// `None` for blank, `"Unknown"`, out-of-range or unrecognised input.
pub fn parse_month(month: Option<&str>) -> Option<u32> {
    let month = month.map(str::trim).filter(|m| !m.is_empty() && *m != UNKNOWN)?;
    if let Ok(n) = month.parse::<u32>() {
        return (1..=12).contains(&n).then_some(n);
    }
    month.parse::<Month>().ok().map(|m| m.number_from_month())
}

/// Day of month; `None` for blank, `"Unknown"` or zero.
fn parse_day(day: Option<&str>) -> PersonResult<Option<u32>> {
    let Some(day) = day.map(str::trim).filter(|d| !d.is_empty() && *d != UNKNOWN) else {
        return Ok(None);
    };
    match day.parse::<u32>() {
        Ok(0) => Ok(None),
        Ok(n) => Ok(Some(n)),
        Err(_) => Err(PersonError::InvalidBirthdate(format!("day '{}'", day))),
    }
}

fn estimated(year: i32, month: u32, day: u32) -> PersonResult<Birthdate> {
    NaiveDate::from_ymd_opt(year, month, day)
        .map(|date| Birthdate {
            date,
            estimated: true,
        })
        .ok_or_else(|| PersonError::InvalidBirthdate(format!("year {}", year)))
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}
