//! Observation models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single dated, categorized clinical observation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    /// Store-assigned row id (None until persisted)
    pub obs_id: Option<i64>,
    /// Person the observation was recorded for
    pub subject_id: String,
    /// Question concept (e.g., "Diagnosis", "Referral")
    pub concept: String,
    /// Answer label: the diagnosis name or referral destination
    pub category: String,
    /// Date the observation was recorded
    pub recorded_at: NaiveDate,
    /// Soft-deleted observations never take part in reports
    pub voided: bool,
}

impl Observation {
    /// Create a new, unsaved observation.
    pub fn new(
        subject_id: impl Into<String>,
        concept: impl Into<String>,
        category: impl Into<String>,
        recorded_at: NaiveDate,
    ) -> Self {
        Self {
            obs_id: None,
            subject_id: subject_id.into(),
            concept: concept.into(),
            category: category.into(),
            recorded_at,
            voided: false,
        }
    }

    /// Whether this observation counts towards reports.
    pub fn is_active(&self) -> bool {
        !self.voided
    }
}

/// A category discovered from recorded observations.
///
/// Carries the concept id so callers can link back to the reference table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryConcept {
    pub concept_id: i64,
    pub name: String,
}

impl CategoryConcept {
    pub fn new(concept_id: i64, name: impl Into<String>) -> Self {
        Self {
            concept_id,
            name: name.into(),
        }
    }
}
