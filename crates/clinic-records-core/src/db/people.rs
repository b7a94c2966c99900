//! Person database operations.

use std::collections::HashMap;

use rusqlite::{params, OptionalExtension};

use super::{Database, DbResult};
use crate::models::{
    AttributeKind, Birthdate, PatientIdentifier, PersonAddress, PersonAttribute, PersonName,
    PersonRecord, UNKNOWN_ID,
};
use crate::report::SubjectDemographics;

/// Row shape of the `person` table.
struct PersonRow {
    person_id: String,
    gender: Option<String>,
    birthdate: Option<chrono::NaiveDate>,
    birthdate_estimated: bool,
    date_created: chrono::NaiveDate,
    date_changed: Option<String>,
    voided: bool,
}

impl Database {
    /// Insert a person together with names, addresses, attributes and
    /// identifiers.
    ///
    /// Identifiers of an unregistered type are stored under `"Unknown id"`.
    /// Attributes, or identifiers when that type is missing too, are skipped
    /// without failing the insert.
    pub fn insert_person(&self, person: &PersonRecord) -> DbResult<()> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            r#"
            INSERT INTO person (
                person_id, gender, birthdate, birthdate_estimated,
                date_created, date_changed, voided
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                person.person_id,
                person.gender,
                person.birthdate.map(|b| b.date),
                person.birthdate.map_or(false, |b| b.estimated),
                person.date_created,
                person.date_changed,
                person.voided,
            ],
        )?;

        for (i, name) in person.names.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO person_name (
                    person_id, given_name, middle_name, family_name, family_name2, preferred
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    person.person_id,
                    name.given_name,
                    name.middle_name,
                    name.family_name,
                    name.family_name2,
                    i == 0,
                ],
            )?;
        }

        for (i, address) in person.addresses.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO person_address (
                    person_id, address1, address2, city_village,
                    county_district, state_province, preferred
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    person.person_id,
                    address.address1,
                    address.address2,
                    address.city_village,
                    address.county_district,
                    address.state_province,
                    i == 0,
                ],
            )?;
        }

        for attribute in &person.attributes {
            let type_id = match attribute.attribute_type_id {
                Some(id) => Some(id),
                None => self.attribute_type_id(attribute.kind.type_name())?,
            };
            let Some(type_id) = type_id else {
                tracing::warn!(
                    person_id = %person.person_id,
                    attribute_type = attribute.kind.type_name(),
                    "skipping attribute with unregistered type"
                );
                continue;
            };
            tx.execute(
                r#"
                INSERT INTO person_attribute (person_id, person_attribute_type_id, value)
                VALUES (?1, ?2, ?3)
                "#,
                params![person.person_id, type_id, attribute.value],
            )?;
        }

        for identifier in &person.identifiers {
            let type_id = match identifier.identifier_type_id {
                Some(id) => Some(id),
                None => match self.identifier_type_id(&identifier.type_name)? {
                    Some(id) => Some(id),
                    None => self.identifier_type_id(UNKNOWN_ID)?,
                },
            };
            let Some(type_id) = type_id else {
                tracing::warn!(
                    person_id = %person.person_id,
                    identifier_type = %identifier.type_name,
                    "skipping identifier with unregistered type"
                );
                continue;
            };
            tx.execute(
                r#"
                INSERT INTO patient_identifier (person_id, identifier_type, identifier)
                VALUES (?1, ?2, ?3)
                "#,
                params![person.person_id, type_id, identifier.identifier],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Get a person by id, including voided people.
    pub fn get_person(&self, person_id: &str) -> DbResult<Option<PersonRecord>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT person_id, gender, birthdate, birthdate_estimated,
                       date_created, date_changed, voided
                FROM person
                WHERE person_id = ?
                "#,
                [person_id],
                |row| {
                    Ok(PersonRow {
                        person_id: row.get(0)?,
                        gender: row.get(1)?,
                        birthdate: row.get(2)?,
                        birthdate_estimated: row.get(3)?,
                        date_created: row.get(4)?,
                        date_changed: row.get(5)?,
                        voided: row.get(6)?,
                    })
                },
            )
            .optional()?;

        row.map(|row| self.hydrate_person(row)).transpose()
    }

    /// Non-voided people holding a non-voided identifier equal to `identifier`.
    pub fn search_by_identifier(&self, identifier: &str) -> DbResult<Vec<PersonRecord>> {
        if identifier.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(
            r#"
            SELECT DISTINCT p.person_id
            FROM patient_identifier i
            INNER JOIN person p ON p.person_id = i.person_id
            WHERE i.identifier = ? AND i.voided = 0 AND p.voided = 0
            ORDER BY p.date_created, p.person_id
            "#,
        )?;
        let ids = stmt
            .query_map([identifier], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        self.people_by_ids(&ids)
    }

    /// Given and family names of non-voided people of one gender, one row
    /// per active name, oldest person first.
    pub fn name_candidates(&self, gender: &str) -> DbResult<Vec<(String, PersonName)>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT p.person_id, n.given_name, n.family_name
            FROM person p
            INNER JOIN person_name n ON n.person_id = p.person_id
            WHERE p.voided = 0 AND n.voided = 0 AND p.gender = ?
              AND n.given_name IS NOT NULL AND n.family_name IS NOT NULL
            ORDER BY p.date_created, p.person_id, n.person_name_id
            "#,
        )?;
        let rows = stmt
            .query_map([gender], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    PersonName {
                        given_name: row.get(1)?,
                        family_name: row.get(2)?,
                        ..Default::default()
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Record the remote site's change timestamp for a person.
    pub fn update_person_date_changed(
        &self,
        person_id: &str,
        date_changed: &str,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE person SET date_changed = ?2 WHERE person_id = ?1",
            params![person_id, date_changed],
        )?;
        Ok(rows_affected > 0)
    }

    /// Void a person and every dependent name, address, attribute and
    /// identifier row.
    pub fn void_person(&self, person_id: &str, reason: &str) -> DbResult<bool> {
        let tx = self.conn.unchecked_transaction()?;

        let rows_affected = tx.execute(
            "UPDATE person SET voided = 1, void_reason = ?2 WHERE person_id = ?1 AND voided = 0",
            params![person_id, reason],
        )?;
        if rows_affected == 0 {
            return Ok(false);
        }

        for table in [
            "person_name",
            "person_address",
            "person_attribute",
            "patient_identifier",
        ] {
            tx.execute(
                &format!("UPDATE {} SET voided = 1 WHERE person_id = ?", table),
                [person_id],
            )?;
        }

        tx.commit()?;
        tracing::info!(person_id, reason, "voided person");
        Ok(true)
    }

    /// Gender and birthdate for each requested subject that exists.
    pub fn subject_demographics(
        &self,
        person_ids: &[String],
    ) -> DbResult<HashMap<String, SubjectDemographics>> {
        let mut stmt = self
            .conn
            .prepare("SELECT gender, birthdate FROM person WHERE person_id = ?")?;

        let mut subjects = HashMap::new();
        for person_id in person_ids {
            if subjects.contains_key(person_id) {
                continue;
            }
            let found = stmt
                .query_row([person_id], |row| {
                    Ok(SubjectDemographics {
                        gender: row.get(0)?,
                        birthdate: row.get(1)?,
                    })
                })
                .optional()?;
            if let Some(demographics) = found {
                subjects.insert(person_id.clone(), demographics);
            }
        }
        Ok(subjects)
    }

    /// Load people by id, skipping ids that do not exist.
    pub fn people_by_ids(&self, ids: &[String]) -> DbResult<Vec<PersonRecord>> {
        let mut people = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(person) = self.get_person(id)? {
                people.push(person);
            }
        }
        Ok(people)
    }

    fn hydrate_person(&self, row: PersonRow) -> DbResult<PersonRecord> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT given_name, middle_name, family_name, family_name2
            FROM person_name
            WHERE person_id = ? AND voided = 0
            ORDER BY preferred DESC, person_name_id
            "#,
        )?;
        let names = stmt
            .query_map([&row.person_id], |r| {
                Ok(PersonName {
                    given_name: r.get(0)?,
                    middle_name: r.get(1)?,
                    family_name: r.get(2)?,
                    family_name2: r.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare(
            r#"
            SELECT address1, address2, city_village, county_district, state_province
            FROM person_address
            WHERE person_id = ? AND voided = 0
            ORDER BY preferred DESC, person_address_id
            "#,
        )?;
        let addresses = stmt
            .query_map([&row.person_id], |r| {
                Ok(PersonAddress {
                    address1: r.get(0)?,
                    address2: r.get(1)?,
                    city_village: r.get(2)?,
                    county_district: r.get(3)?,
                    state_province: r.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare(
            r#"
            SELECT t.name, a.value, a.person_attribute_type_id
            FROM person_attribute a
            INNER JOIN person_attribute_type t
                ON t.person_attribute_type_id = a.person_attribute_type_id
            WHERE a.person_id = ? AND a.voided = 0
            ORDER BY a.person_attribute_id
            "#,
        )?;
        let attribute_rows = stmt
            .query_map([&row.person_id], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        // Types outside the registration form are not part of the record
        let attributes = attribute_rows
            .into_iter()
            .filter_map(|(type_name, value, type_id)| {
                AttributeKind::from_type_name(&type_name).map(|kind| PersonAttribute {
                    kind,
                    value,
                    attribute_type_id: Some(type_id),
                })
            })
            .collect();

        let mut stmt = self.conn.prepare(
            r#"
            SELECT t.name, i.identifier, i.identifier_type
            FROM patient_identifier i
            INNER JOIN patient_identifier_type t
                ON t.patient_identifier_type_id = i.identifier_type
            WHERE i.person_id = ? AND i.voided = 0
            ORDER BY i.patient_identifier_id
            "#,
        )?;
        let identifiers = stmt
            .query_map([&row.person_id], |r| {
                Ok(PatientIdentifier {
                    type_name: r.get(0)?,
                    identifier: r.get(1)?,
                    identifier_type_id: Some(r.get(2)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PersonRecord {
            person_id: row.person_id,
            gender: row.gender,
            birthdate: row.birthdate.map(|date| Birthdate {
                date,
                estimated: row.birthdate_estimated,
            }),
            names,
            addresses,
            attributes,
            identifiers,
            date_created: row.date_created,
            date_changed: row.date_changed,
            voided: row.voided,
        })
    }
}
