//! Observation database operations.

use std::collections::HashMap;

use rusqlite::{params, Row};

use super::{Database, DbResult};
use crate::models::{CategoryConcept, Observation};
use crate::report::{DateRange, ObservationFilter, ObservationStore, SubjectDemographics};

const OBSERVATION_SELECT: &str = r#"
    SELECT o.obs_id, o.person_id, q.name, v.name, o.obs_date, o.voided
    FROM obs o
    INNER JOIN concept_name q ON q.concept_id = o.concept_id
    INNER JOIN concept_name v ON v.concept_id = o.value_coded
"#;

fn observation_from_row(row: &Row<'_>) -> rusqlite::Result<Observation> {
    Ok(Observation {
        obs_id: row.get(0)?,
        subject_id: row.get(1)?,
        concept: row.get(2)?,
        category: row.get(3)?,
        recorded_at: row.get(4)?,
        voided: row.get(5)?,
    })
}

impl Database {
    /// Record an observation, creating its concepts on first use.
    pub fn record_observation(&self, obs: &Observation) -> DbResult<i64> {
        let concept_id = self.ensure_concept(&obs.concept)?;
        let value_coded = self.ensure_concept(&obs.category)?;

        self.conn.execute(
            r#"
            INSERT INTO obs (person_id, concept_id, value_coded, obs_date, voided)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                obs.subject_id,
                concept_id,
                value_coded,
                obs.recorded_at,
                obs.voided,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Get an observation by id, voided or not.
    pub fn get_observation(&self, obs_id: i64) -> DbResult<Option<Observation>> {
        use rusqlite::OptionalExtension;

        let sql = format!("{} WHERE o.obs_id = ?", OBSERVATION_SELECT);
        self.conn
            .query_row(&sql, [obs_id], observation_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Soft-delete an observation.
    pub fn void_observation(&self, obs_id: i64, reason: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE obs SET voided = 1, void_reason = ?2 WHERE obs_id = ?1 AND voided = 0",
            params![obs_id, reason],
        )?;
        Ok(rows_affected > 0)
    }

    /// Non-voided observations inside `range`, optionally filtered by
    /// concept name and/or category name, in date order.
    pub fn fetch_observations(
        &self,
        filter: &ObservationFilter,
        range: &DateRange,
    ) -> DbResult<Vec<Observation>> {
        let sql = format!(
            r#"{}
            WHERE o.voided = 0
              AND o.obs_date >= ?1 AND o.obs_date <= ?2
              AND (?3 IS NULL OR q.name = ?3)
              AND (?4 IS NULL OR v.name = ?4)
            ORDER BY o.obs_date, o.obs_id
            "#,
            OBSERVATION_SELECT
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                range.start(),
                range.end(),
                filter.concept.as_deref(),
                filter.category.as_deref(),
            ],
            observation_from_row,
        )?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Distinct categories recorded for `concept` inside `range`, in order of
    /// first encounter.
    pub fn discover_categories(
        &self,
        concept: &str,
        range: &DateRange,
    ) -> DbResult<Vec<CategoryConcept>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT v.concept_id, v.name
            FROM obs o
            INNER JOIN concept_name q ON q.concept_id = o.concept_id
            INNER JOIN concept_name v ON v.concept_id = o.value_coded
            WHERE o.voided = 0
              AND q.name = ?1
              AND o.obs_date >= ?2 AND o.obs_date <= ?3
            GROUP BY v.concept_id, v.name
            ORDER BY MIN(o.obs_date), MIN(o.obs_id)
            "#,
        )?;
        let rows = stmt.query_map(params![concept, range.start(), range.end()], |row| {
            Ok(CategoryConcept {
                concept_id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Every non-voided observation ever recorded for `concept`.
    pub fn all_observations_for(&self, concept: &str) -> DbResult<Vec<Observation>> {
        let sql = format!(
            r#"{}
            WHERE o.voided = 0 AND q.name = ?1
            ORDER BY o.obs_date, o.obs_id
            "#,
            OBSERVATION_SELECT
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([concept], observation_from_row)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

impl ObservationStore for Database {
    fn fetch_observations(
        &self,
        filter: &ObservationFilter,
        range: &DateRange,
    ) -> DbResult<Vec<Observation>> {
        Database::fetch_observations(self, filter, range)
    }

    fn discover_categories(
        &self,
        concept: &str,
        range: &DateRange,
    ) -> DbResult<Vec<CategoryConcept>> {
        Database::discover_categories(self, concept, range)
    }

    fn all_observations_for(&self, concept: &str) -> DbResult<Vec<Observation>> {
        Database::all_observations_for(self, concept)
    }

    fn subject_demographics(
        &self,
        subject_ids: &[String],
    ) -> DbResult<HashMap<String, SubjectDemographics>> {
        Database::subject_demographics(self, subject_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PersonRecord;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn setup_db() -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        let person = PersonRecord::new(date(2021, 1, 1));
        db.insert_person(&person).unwrap();
        (db, person.person_id)
    }

    #[test]
    fn test_record_and_get() {
        let (db, person_id) = setup_db();

        let obs = Observation::new(&person_id, "Diagnosis", "flu", date(2021, 1, 4));
        let obs_id = db.record_observation(&obs).unwrap();

        let stored = db.get_observation(obs_id).unwrap().unwrap();
        assert_eq!(stored.obs_id, Some(obs_id));
        assert_eq!(stored.concept, "Diagnosis");
        assert_eq!(stored.category, "flu");
        assert_eq!(stored.recorded_at, date(2021, 1, 4));
    }

    #[test]
    fn test_fetch_excludes_voided_and_out_of_range() {
        let (db, person_id) = setup_db();

        let keep = db
            .record_observation(&Observation::new(&person_id, "Diagnosis", "flu", date(2021, 1, 4)))
            .unwrap();
        let voided = db
            .record_observation(&Observation::new(
                &person_id,
                "Diagnosis",
                "cold",
                date(2021, 1, 5),
            ))
            .unwrap();
        db.record_observation(&Observation::new(&person_id, "Diagnosis", "flu", date(2021, 2, 1)))
            .unwrap();

        assert!(db.void_observation(voided, "entered in error").unwrap());

        let range = DateRange::new(date(2021, 1, 1), date(2021, 1, 14)).unwrap();
        let rows = db
            .fetch_observations(&ObservationFilter::default(), &range)
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].obs_id, Some(keep));
    }

    #[test]
    fn test_fetch_filters_by_concept() {
        let (db, person_id) = setup_db();

        db.record_observation(&Observation::new(&person_id, "Diagnosis", "flu", date(2021, 1, 4)))
            .unwrap();
        db.record_observation(&Observation::new(
            &person_id,
            "Referral",
            "District Hospital",
            date(2021, 1, 4),
        ))
        .unwrap();

        let range = DateRange::new(date(2021, 1, 1), date(2021, 1, 14)).unwrap();
        let referrals = db
            .fetch_observations(&ObservationFilter::concept("Referral"), &range)
            .unwrap();

        assert_eq!(referrals.len(), 1);
        assert_eq!(referrals[0].category, "District Hospital");
    }

    #[test]
    fn test_void_twice_is_noop() {
        let (db, person_id) = setup_db();
        let obs_id = db
            .record_observation(&Observation::new(&person_id, "Diagnosis", "flu", date(2021, 1, 4)))
            .unwrap();

        assert!(db.void_observation(obs_id, "duplicate").unwrap());
        assert!(!db.void_observation(obs_id, "duplicate").unwrap());
    }

    #[test]
    fn test_discover_categories_first_encounter_order() {
        let (db, person_id) = setup_db();

        db.record_observation(&Observation::new(
            &person_id,
            "Diagnosis",
            "malaria",
            date(2021, 1, 6),
        ))
        .unwrap();
        db.record_observation(&Observation::new(&person_id, "Diagnosis", "flu", date(2021, 1, 4)))
            .unwrap();
        db.record_observation(&Observation::new(&person_id, "Diagnosis", "flu", date(2021, 1, 9)))
            .unwrap();
        db.record_observation(&Observation::new(
            &person_id,
            "Referral",
            "Clinic A",
            date(2021, 1, 5),
        ))
        .unwrap();

        let range = DateRange::new(date(2021, 1, 1), date(2021, 1, 14)).unwrap();
        let names: Vec<String> = db
            .discover_categories("Diagnosis", &range)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();

        assert_eq!(names, vec!["flu".to_string(), "malaria".to_string()]);
    }
}
