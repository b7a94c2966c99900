//! Build person records from registration form input.

use std::collections::BTreeMap;

use chrono::Datelike;
use serde::{Deserialize, Deserializer, Serialize};

use super::birthdate::BirthFields;
use super::{AttributeTypeDirectory, PersonError, PersonResult};
use crate::db::Database;
use crate::models::{
    AttributeKind, Birthdate, PatientIdentifier, PersonAddress, PersonAttribute, PersonName,
    PersonRecord, SessionContext, UNKNOWN_ID,
};

/// Flat registration form.
///
/// Birth fields and the age estimate accept either strings or numbers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PersonForm {
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub birth_year: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub birth_month: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub birth_day: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub age_estimate: Option<String>,
    #[serde(default)]
    pub names: PersonName,
    #[serde(default)]
    pub addresses: PersonAddress,
    #[serde(default)]
    pub occupation: Option<String>,
    #[serde(default)]
    pub cell_phone_number: Option<String>,
    #[serde(default)]
    pub office_phone_number: Option<String>,
    #[serde(default)]
    pub home_phone_number: Option<String>,
    #[serde(default)]
    pub patient: Option<PatientForm>,
}

/// Patient section of the form: identifier type name → identifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatientForm {
    #[serde(default)]
    pub identifiers: BTreeMap<String, String>,
}

impl PersonForm {
    pub fn birth_fields(&self) -> BirthFields {
        BirthFields {
            year: self.birth_year.clone(),
            month: self.birth_month.clone(),
            day: self.birth_day.clone(),
            age_estimate: self.age_estimate.clone(),
        }
    }

    /// Submitted value for an attribute kind.
    pub fn attribute(&self, kind: AttributeKind) -> Option<&str> {
        match kind {
            AttributeKind::Occupation => self.occupation.as_deref(),
            AttributeKind::CellPhoneNumber => self.cell_phone_number.as_deref(),
            AttributeKind::OfficePhoneNumber => self.office_phone_number.as_deref(),
            AttributeKind::HomePhoneNumber => self.home_phone_number.as_deref(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient {
    Text(String),
    Integer(i64),
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Lenient>::deserialize(deserializer)?.map(|value| match value {
        Lenient::Text(s) => s,
        Lenient::Integer(n) => n.to_string(),
    }))
}

/// A form field left out of the built record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkippedField {
    pub field: String,
    pub reason: String,
}

/// Result of building a person.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    pub person: PersonRecord,
    pub skipped: Vec<SkippedField>,
}

/// Map "Male"/"Female" to "M"/"F".
///
/// Matching is case-sensitive and anything else is kept as given.
pub fn normalize_gender(gender: &str) -> String {
    match gender {
        "Male" => "M".to_string(),
        "Female" => "F".to_string(),
        other => other.to_string(),
    }
}

/// Build a person record from form input.
///
/// Blank attributes and identifiers are left out. An attribute or identifier
/// whose type cannot be resolved is skipped and reported in
/// [`BuildReport::skipped`] without failing the rest of the record. An
/// unregistered identifier type falls back to `"Unknown id"`. Store failures
/// during type lookup abort the build.
pub fn build_person(
    form: &PersonForm,
    session: &SessionContext,
    directory: &dyn AttributeTypeDirectory,
) -> PersonResult<BuildReport> {
    let mut person = PersonRecord::new(session.session_date);
    let mut skipped = Vec::new();

    person.gender = form
        .gender
        .as_deref()
        .filter(|g| !g.trim().is_empty())
        .map(normalize_gender);
    person.birthdate = Birthdate::resolve(&form.birth_fields(), session.session_date.year())?;

    if !form.names.is_empty() {
        person.names.push(form.names.clone());
    }
    if !form.addresses.is_empty() {
        person.addresses.push(form.addresses.clone());
    }

    for kind in AttributeKind::ALL {
        let Some(value) = form.attribute(kind).filter(|v| !v.trim().is_empty()) else {
            continue;
        };
        match directory.resolve_attribute_type(kind.type_name()) {
            Ok(type_id) => person.attributes.push(PersonAttribute {
                kind,
                value: value.to_string(),
                attribute_type_id: Some(type_id),
            }),
            Err(e @ PersonError::NotFound(_)) => {
                tracing::warn!(field = kind.field_key(), error = %e, "skipping attribute");
                skipped.push(SkippedField {
                    field: kind.field_key().to_string(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    let identifiers = form.patient.as_ref().map(|p| &p.identifiers);
    for (type_name, identifier) in identifiers.into_iter().flatten() {
        if identifier.trim().is_empty() {
            continue;
        }
        let resolved = match directory.resolve_identifier_type(type_name) {
            Err(PersonError::NotFound(_)) => directory
                .resolve_identifier_type(UNKNOWN_ID)
                .map(|id| (UNKNOWN_ID, id)),
            other => other.map(|id| (type_name.as_str(), id)),
        };
        match resolved {
            Ok((resolved_name, type_id)) => person.identifiers.push(PatientIdentifier {
                type_name: resolved_name.to_string(),
                identifier: identifier.clone(),
                identifier_type_id: Some(type_id),
            }),
            Err(e @ PersonError::NotFound(_)) => {
                tracing::warn!(identifier_type = %type_name, error = %e, "skipping identifier");
                skipped.push(SkippedField {
                    field: format!("patient.identifiers.{}", type_name),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    tracing::debug!(
        person_id = %person.person_id,
        attributes = person.attributes.len(),
        identifiers = person.identifiers.len(),
        skipped = skipped.len(),
        "built person from form"
    );

    Ok(BuildReport { person, skipped })
}

/// Build a person from form input and store it.
pub fn create_person(
    db: &Database,
    form: &PersonForm,
    session: &SessionContext,
) -> PersonResult<BuildReport> {
    let report = build_person(form, session, db)?;
    db.insert_person(&report.person)?;
    tracing::info!(
        person_id = %report.person.person_id,
        location = session.location.as_deref().unwrap_or_default(),
        "registered person"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbError;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    /// In-memory directory.
    #[derive(Default)]
    struct FakeDirectory {
        attribute_types: HashMap<&'static str, i64>,
        identifier_types: HashMap<&'static str, i64>,
    }

    impl FakeDirectory {
        fn standard() -> Self {
            Self {
                attribute_types: [
                    ("Occupation", 1),
                    ("Cell Phone Number", 2),
                    ("Office Phone Number", 3),
                    ("Home Phone Number", 4),
                ]
                .into_iter()
                .collect(),
                identifier_types: [("National id", 10), ("Unknown id", 11)]
                    .into_iter()
                    .collect(),
            }
        }
    }

    impl AttributeTypeDirectory for FakeDirectory {
        fn resolve_attribute_type(&self, name: &str) -> PersonResult<i64> {
            self.attribute_types
                .get(name)
                .copied()
                .ok_or_else(|| PersonError::NotFound(name.to_string()))
        }

        fn resolve_identifier_type(&self, name: &str) -> PersonResult<i64> {
            self.identifier_types
                .get(name)
                .copied()
                .ok_or_else(|| PersonError::NotFound(name.to_string()))
        }
    }

    /// Directory whose store fails on every lookup.
    struct BrokenDirectory;

    impl BrokenDirectory {
        fn failure() -> PersonError {
            PersonError::Database(DbError::Sqlite(rusqlite::Error::InvalidQuery))
        }
    }

    impl AttributeTypeDirectory for BrokenDirectory {
        fn resolve_attribute_type(&self, _name: &str) -> PersonResult<i64> {
            Err(Self::failure())
        }

        fn resolve_identifier_type(&self, _name: &str) -> PersonResult<i64> {
            Err(Self::failure())
        }
    }

    fn session() -> SessionContext {
        SessionContext::new(NaiveDate::from_ymd_opt(2020, 3, 1).unwrap())
    }

    fn form() -> PersonForm {
        PersonForm {
            gender: Some("Female".into()),
            birth_year: Some("1980".into()),
            birth_month: Some("June".into()),
            birth_day: Some("Unknown".into()),
            names: PersonName {
                given_name: Some("Mary".into()),
                family_name: Some("Banda".into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_normalize_gender() {
        assert_eq!(normalize_gender("Male"), "M");
        assert_eq!(normalize_gender("Female"), "F");
        assert_eq!(normalize_gender("male"), "male");
        assert_eq!(normalize_gender("X"), "X");
    }

    #[test]
    fn test_build_basic_person() {
        let report = build_person(&form(), &session(), &FakeDirectory::standard()).unwrap();
        let person = report.person;

        assert_eq!(person.gender.as_deref(), Some("F"));
        let birthdate = person.birthdate.unwrap();
        assert_eq!(birthdate.date, NaiveDate::from_ymd_opt(1980, 6, 15).unwrap());
        assert!(birthdate.estimated);
        assert_eq!(person.display_name().as_deref(), Some("Mary Banda"));
        assert!(person.addresses.is_empty());
        assert_eq!(person.date_created, session().session_date);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_blank_occupation_creates_no_attribute() {
        let mut f = form();
        f.occupation = Some("   ".into());
        let report = build_person(&f, &session(), &FakeDirectory::standard()).unwrap();
        assert!(report.person.attribute(AttributeKind::Occupation).is_none());
        assert!(report.person.attributes.is_empty());
    }

    #[test]
    fn test_occupation_creates_one_attribute_with_type_id() {
        let mut f = form();
        f.occupation = Some("Farmer".into());
        let report = build_person(&f, &session(), &FakeDirectory::standard()).unwrap();

        assert_eq!(report.person.attributes.len(), 1);
        assert_eq!(report.person.attributes[0].value, "Farmer");
        assert_eq!(report.person.attributes[0].attribute_type_id, Some(1));
    }

    #[test]
    fn test_failing_attribute_type_is_isolated() {
        let mut directory = FakeDirectory::standard();
        directory.attribute_types.remove("Office Phone Number");

        let mut f = form();
        f.occupation = Some("Teacher".into());
        f.office_phone_number = Some("01 555 123".into());
        f.cell_phone_number = Some("0999 123 456".into());

        let report = build_person(&f, &session(), &directory).unwrap();
        assert_eq!(report.person.attributes.len(), 2);
        assert_eq!(
            report.person.attribute(AttributeKind::CellPhoneNumber),
            Some("0999 123 456")
        );
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].field, "office_phone_number");
    }

    #[test]
    fn test_identifiers_fall_back_to_unknown_type() {
        let mut f = form();
        f.patient = Some(PatientForm {
            identifiers: [
                ("National id".to_string(), "P1701".to_string()),
                ("ARV Number".to_string(), "ARV-22".to_string()),
                ("Old Number".to_string(), " ".to_string()),
            ]
            .into_iter()
            .collect(),
        });

        let report = build_person(&f, &session(), &FakeDirectory::standard()).unwrap();
        let person = report.person;
        assert_eq!(person.identifiers.len(), 2);
        assert_eq!(person.national_id(), Some("P1701"));
        assert_eq!(person.identifier(UNKNOWN_ID), Some("ARV-22"));
    }

    #[test]
    fn test_identifier_without_any_type_is_skipped() {
        let mut f = form();
        f.patient = Some(PatientForm {
            identifiers: [("ARV Number".to_string(), "ARV-22".to_string())]
                .into_iter()
                .collect(),
        });

        let report = build_person(&f, &session(), &FakeDirectory::default()).unwrap();
        assert!(report.person.identifiers.is_empty());
        assert_eq!(report.skipped[0].field, "patient.identifiers.ARV Number");
    }

    #[test]
    fn test_attribute_store_failure_propagates() {
        let mut f = form();
        f.occupation = Some("Teacher".into());
        let result = build_person(&f, &session(), &BrokenDirectory);
        assert!(matches!(result, Err(PersonError::Database(_))));
    }

    #[test]
    fn test_identifier_store_failure_propagates() {
        let mut f = form();
        f.patient = Some(PatientForm {
            identifiers: [("National id".to_string(), "P1701".to_string())]
                .into_iter()
                .collect(),
        });
        let result = build_person(&f, &session(), &BrokenDirectory);
        assert!(matches!(result, Err(PersonError::Database(_))));
    }

    #[test]
    fn test_invalid_birthdate_fails_build() {
        let mut f = form();
        f.birth_year = Some("Unknown".into());
        let result = build_person(&f, &session(), &FakeDirectory::standard());
        assert!(matches!(result, Err(PersonError::InvalidBirthdate(_))));
    }

    #[test]
    fn test_form_accepts_numeric_birth_fields() {
        let json = r#"{
            "gender": "Male",
            "birth_year": "Unknown",
            "age_estimate": 30,
            "names": {"given_name": "John", "family_name": "Phiri"},
            "addresses": {"city_village": "Area 25"},
            "patient": {"identifiers": {"National id": "P99"}}
        }"#;
        let f: PersonForm = serde_json::from_str(json).unwrap();
        assert_eq!(f.age_estimate.as_deref(), Some("30"));

        let report = build_person(&f, &session(), &FakeDirectory::standard()).unwrap();
        let birthdate = report.person.birthdate.unwrap();
        assert_eq!(birthdate.date, NaiveDate::from_ymd_opt(1990, 7, 1).unwrap());
        assert_eq!(report.person.addresses.len(), 1);
    }
}
