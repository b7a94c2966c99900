//! Clinic Records Core Library
//!
//! Local-first patient demographics and clinical period reports.
//!
//! # Architecture
//!
//! ```text
//!  Registration form ──► build_person ──► PersonRecord ──► SQLite (person, names,
//!          │                  │                                 addresses, attributes,
//!          │          attribute-type directory                  identifiers)
//!          │                                                        │
//!  Remote site ◄──── PortableDocument ◄──── to_portable ◄───────────┘
//!       │                   ▲
//!       └── RemoteSync ─────┘ (best response, failures become None)
//!
//!  obs table ──► fetch_observations(filter, range) ──► snapshot
//!                                                        │
//!                               ┌────────────────────────┼──────────────────┐
//!                               ▼                        ▼                  ▼
//!                        weekly buckets          rank + disaggregate    referrals
//!                        + frequency tables      (gender, age group)
//! ```
//!
//! # Modules
//!
//! - [`db`]: SQLite store for people, observations and reference tables
//! - [`models`]: Domain types (PersonRecord, Observation, etc.)
//! - [`report`]: Week buckets, aggregation, ranking and disaggregation
//! - [`person`]: Birthdate rules, record builder, portable documents, search
//! - [`remote`]: Remote demographics directories
//! - [`config`]: TOML configuration

pub mod config;
pub mod db;
pub mod models;
pub mod person;
pub mod remote;
pub mod report;

// Re-export commonly used types
pub use config::ClinicConfig;
pub use db::Database;
pub use models::{
    AttributeKind, Birthdate, CategoryConcept, Observation, PersonRecord, SessionContext,
};
pub use person::{build_person, from_portable, to_portable, PersonForm, PortableDocument};
pub use remote::{RemoteDirectory, RemoteSync};
pub use report::{aggregate, rank_categories, DateRange, Reporter, WeeklyReport};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use chrono::NaiveDate;
use std::sync::{Arc, Mutex};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ClinicError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Invalid birthdate: {0}")]
    InvalidBirthdate(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<db::DbError> for ClinicError {
    fn from(e: db::DbError) -> Self {
        ClinicError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for ClinicError {
    fn from(e: serde_json::Error) -> Self {
        ClinicError::SerializationError(e.to_string())
    }
}

impl From<report::ReportError> for ClinicError {
    fn from(e: report::ReportError) -> Self {
        match e {
            report::ReportError::InvalidRange { start, end } => ClinicError::InvalidRange(format!(
                "start date {} is after end date {}",
                start, end
            )),
            report::ReportError::Database(db) => db.into(),
        }
    }
}

impl From<person::PersonError> for ClinicError {
    fn from(e: person::PersonError) -> Self {
        match e {
            person::PersonError::NotFound(what) => ClinicError::NotFound(what),
            person::PersonError::InvalidBirthdate(msg) => ClinicError::InvalidBirthdate(msg),
            person::PersonError::Database(db) => db.into(),
            person::PersonError::Serialization(s) => s.into(),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for ClinicError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ClinicError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, ClinicError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| ClinicError::InvalidInput(format!("date '{}': {}", value, e)))
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path with default settings.
#[uniffi::export]
pub fn open_database(path: String) -> Result<Arc<ClinicRecordsCore>, ClinicError> {
    let db = Database::open(&path)?;
    ClinicRecordsCore::with_database(db, ClinicConfig::default())
}

/// Open the database named in a TOML configuration file.
#[uniffi::export]
pub fn open_with_config(config_path: String) -> Result<Arc<ClinicRecordsCore>, ClinicError> {
    let config = ClinicConfig::load(std::path::Path::new(&config_path))
        .map_err(|e| ClinicError::InvalidInput(format!("{:#}", e)))?;
    let db = Database::open(&config.database.path)?;
    ClinicRecordsCore::with_database(db, config)
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<ClinicRecordsCore>, ClinicError> {
    let db = Database::open_in_memory()?;
    ClinicRecordsCore::with_database(db, ClinicConfig::default())
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe database wrapper for FFI.
#[derive(uniffi::Object)]
pub struct ClinicRecordsCore {
    db: Arc<Mutex<Database>>,
    config: ClinicConfig,
}

impl ClinicRecordsCore {
    fn with_database(db: Database, config: ClinicConfig) -> Result<Arc<Self>, ClinicError> {
        db.seed_reference_types(
            &config.reference.attribute_types,
            &config.reference.identifier_types,
        )?;
        Ok(Arc::new(Self {
            db: Arc::new(Mutex::new(db)),
            config,
        }))
    }

    fn session(
        session_date: &str,
        location: Option<String>,
    ) -> Result<SessionContext, ClinicError> {
        let mut session = SessionContext::new(parse_date(session_date)?);
        session.location = location;
        Ok(session)
    }
}

#[uniffi::export]
impl ClinicRecordsCore {
    // =========================================================================
    // Person Operations
    // =========================================================================

    /// Register a person from registration form JSON.
    pub fn create_person_from_form(
        &self,
        form_json: String,
        session_date: String,
        location: Option<String>,
    ) -> Result<FfiBuildResult, ClinicError> {
        let form: PersonForm = serde_json::from_str(&form_json)?;
        let session = Self::session(&session_date, location)?;
        let db = self.db.lock()?;
        let report = person::create_person(&db, &form, &session)?;
        Ok(report.into())
    }

    /// Get a person by ID.
    pub fn get_person(&self, person_id: String) -> Result<Option<FfiPerson>, ClinicError> {
        let db = self.db.lock()?;
        let person = db.get_person(&person_id)?;
        Ok(person.map(|p| p.into()))
    }

    /// Portable demographics JSON for a person.
    pub fn person_demographics_json(&self, person_id: String) -> Result<String, ClinicError> {
        let db = self.db.lock()?;
        let person = db
            .get_person(&person_id)?
            .ok_or_else(|| ClinicError::NotFound(format!("person '{}'", person_id)))?;
        Ok(to_portable(&person).to_json()?)
    }

    /// Store a person received as portable demographics JSON.
    pub fn import_demographics_json(
        &self,
        json: String,
        session_date: String,
    ) -> Result<FfiPerson, ClinicError> {
        let doc = PortableDocument::from_json(&json)?;
        let session = Self::session(&session_date, None)?;
        let person = from_portable(&doc, &session)?;
        let db = self.db.lock()?;
        db.insert_person(&person)?;
        let stored = db
            .get_person(&person.person_id)?
            .ok_or_else(|| ClinicError::NotFound(format!("person '{}'", person.person_id)))?;
        Ok(stored.into())
    }

    /// People holding the given identifier.
    pub fn search_by_identifier(&self, identifier: String) -> Result<Vec<FfiPerson>, ClinicError> {
        let db = self.db.lock()?;
        let people = db.search_by_identifier(&identifier)?;
        Ok(people.into_iter().map(|p| p.into()).collect())
    }

    /// Local people matching portable demographics JSON.
    pub fn find_by_demographics(&self, json: String) -> Result<Vec<FfiPerson>, ClinicError> {
        let doc = PortableDocument::from_json(&json)?;
        let db = self.db.lock()?;
        let people = person::find_by_demographics(&db, &doc)?;
        Ok(people.into_iter().map(|p| p.into()).collect())
    }

    /// Void a person and all dependent rows.
    pub fn void_person(&self, person_id: String, reason: String) -> Result<bool, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.void_person(&person_id, &reason)?)
    }

    // =========================================================================
    // Observation Operations
    // =========================================================================

    /// Record an observation, returning its id.
    pub fn record_observation(
        &self,
        subject_id: String,
        concept: String,
        category: String,
        recorded_at: String,
    ) -> Result<i64, ClinicError> {
        let observation =
            Observation::new(subject_id, concept, category, parse_date(&recorded_at)?);
        let db = self.db.lock()?;
        Ok(db.record_observation(&observation)?)
    }

    /// Void an observation.
    pub fn void_observation(&self, obs_id: i64, reason: String) -> Result<bool, ClinicError> {
        let db = self.db.lock()?;
        Ok(db.void_observation(obs_id, &reason)?)
    }

    // =========================================================================
    // Report Operations
    // =========================================================================

    /// Weekly diagnosis counts between two ISO dates, inclusive.
    pub fn weekly_report(
        &self,
        start_date: String,
        end_date: String,
    ) -> Result<FfiWeeklyReport, ClinicError> {
        let (start, end) = (parse_date(&start_date)?, parse_date(&end_date)?);
        let db = self.db.lock()?;
        let reporter = Reporter::new(&*db, self.config.report.clone());
        Ok(reporter.weekly_report(start, end)?.into())
    }

    /// Disaggregated diagnosis report as JSON.
    pub fn disaggregated_report_json(
        &self,
        start_date: String,
        end_date: String,
    ) -> Result<String, ClinicError> {
        let (start, end) = (parse_date(&start_date)?, parse_date(&end_date)?);
        let db = self.db.lock()?;
        let reporter = Reporter::new(&*db, self.config.report.clone());
        Ok(serde_json::to_string(&reporter.disaggregated_diagnoses(start, end)?)?)
    }

    /// Referral report as JSON.
    pub fn referral_report_json(
        &self,
        start_date: String,
        end_date: String,
    ) -> Result<String, ClinicError> {
        let (start, end) = (parse_date(&start_date)?, parse_date(&end_date)?);
        let db = self.db.lock()?;
        let reporter = Reporter::new(&*db, self.config.report.clone());
        Ok(serde_json::to_string(&reporter.referrals(start, end)?)?)
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe person summary.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPerson {
    pub person_id: String,
    pub gender: Option<String>,
    pub display_name: Option<String>,
    /// ISO date
    pub birthdate: Option<String>,
    pub birthdate_estimated: bool,
    pub birthdate_formatted: Option<String>,
    pub national_id: Option<String>,
    pub date_created: String,
    pub voided: bool,
}

impl From<PersonRecord> for FfiPerson {
    fn from(person: PersonRecord) -> Self {
        Self {
            display_name: person.display_name(),
            national_id: person.national_id().map(String::from),
            birthdate: person.birthdate.map(|b| b.date.to_string()),
            birthdate_estimated: person.birthdate.map_or(false, |b| b.estimated),
            birthdate_formatted: person.birthdate.map(|b| b.formatted()),
            date_created: person.date_created.to_string(),
            person_id: person.person_id,
            gender: person.gender,
            voided: person.voided,
        }
    }
}

/// FFI-safe result of registering a person.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiBuildResult {
    pub person: FfiPerson,
    /// "field: reason" for each skipped form field
    pub skipped: Vec<String>,
}

impl From<person::BuildReport> for FfiBuildResult {
    fn from(report: person::BuildReport) -> Self {
        Self {
            person: report.person.into(),
            skipped: report
                .skipped
                .into_iter()
                .map(|s| format!("{}: {}", s.field, s.reason))
                .collect(),
        }
    }
}

/// Counts past `u32::MAX` are reported as `u32::MAX`.
fn saturating_count(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// FFI-safe category count.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCategoryCount {
    pub category: String,
    pub count: u32,
}

/// FFI-safe week bucket with its counts, in category universe order.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiWeekCounts {
    pub start: String,
    pub end: String,
    pub counts: Vec<FfiCategoryCount>,
}

/// FFI-safe weekly report.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiWeeklyReport {
    pub start: String,
    pub end: String,
    pub weeks: Vec<FfiWeekCounts>,
    pub ranked: Vec<FfiCategoryCount>,
}

impl From<WeeklyReport> for FfiWeeklyReport {
    fn from(report: WeeklyReport) -> Self {
        let weeks = report
            .weeks
            .iter()
            .map(|w| FfiWeekCounts {
                start: w.bucket.start.to_string(),
                end: w.bucket.end.to_string(),
                counts: report
                    .categories
                    .iter()
                    .map(|c| FfiCategoryCount {
                        category: c.clone(),
                        count: saturating_count(w.counts.get(c)),
                    })
                    .collect(),
            })
            .collect();

        Self {
            start: report.range.start().to_string(),
            end: report.range.end().to_string(),
            weeks,
            ranked: report
                .ranked
                .into_iter()
                .map(|t| FfiCategoryCount {
                    category: t.category,
                    count: saturating_count(t.total),
                })
                .collect(),
        }
    }
}
