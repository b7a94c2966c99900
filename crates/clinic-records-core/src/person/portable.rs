//! Portable demographics document.
//!
//! Shape exchanged with remote sites:
//!
//! ```json
//! {"person": {
//!     "gender": "F",
//!     "birth_year": 1980, "birth_month": 6, "birth_day": "Unknown",
//!     "names": {"given_name": "Mary", "family_name": "Banda"},
//!     "addresses": {"city_village": "Area 25"},
//!     "attributes": {"occupation": "Farmer", "cell_phone_number": "0999"},
//!     "patient": {"identifiers": {"National id": "P1701"}},
//!     "date_changed": "2020-03-01 10:00:00"
//! }}
//! ```
//!
//! Every key is optional. Some sites send the attribute keys at the top level
//! of `"person"` instead of under `"attributes"`; [`PortableDocument::from_value`]
//! moves them under `"attributes"` before parsing.

use std::collections::BTreeMap;
use std::fmt;

use chrono::Datelike;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::birthdate::{BirthFields, UNKNOWN};
use super::builder::normalize_gender;
use super::PersonResult;
use crate::models::{
    AttributeKind, Birthdate, PatientIdentifier, PersonAddress, PersonAttribute, PersonName,
    PersonRecord, SessionContext,
};

/// A date part that may arrive as a number or as text such as `"Unknown"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum DatePart {
    Number(i64),
    Text(String),
}

impl DatePart {
    pub fn unknown() -> Self {
        DatePart::Text(UNKNOWN.to_string())
    }
}

impl fmt::Display for DatePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatePart::Number(n) => write!(f, "{}", n),
            DatePart::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Top-level document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PortableDocument {
    #[serde(default)]
    pub person: PortablePerson,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PortablePerson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_year: Option<DatePart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_month: Option<DatePart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_day: Option<DatePart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_estimate: Option<DatePart>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub names: PersonName,
    #[serde(default, deserialize_with = "null_as_default")]
    pub addresses: PersonAddress,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attributes: PortableAttributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<PortablePatient>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_changed: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PortableAttributes {
    #[serde(default)]
    pub occupation: Option<String>,
    #[serde(default)]
    pub cell_phone_number: Option<String>,
    #[serde(default)]
    pub office_phone_number: Option<String>,
    #[serde(default)]
    pub home_phone_number: Option<String>,
}

impl PortableAttributes {
    pub fn get(&self, kind: AttributeKind) -> Option<&str> {
        match kind {
            AttributeKind::Occupation => self.occupation.as_deref(),
            AttributeKind::CellPhoneNumber => self.cell_phone_number.as_deref(),
            AttributeKind::OfficePhoneNumber => self.office_phone_number.as_deref(),
            AttributeKind::HomePhoneNumber => self.home_phone_number.as_deref(),
        }
    }

    pub fn set(&mut self, kind: AttributeKind, value: Option<String>) {
        let slot = match kind {
            AttributeKind::Occupation => &mut self.occupation,
            AttributeKind::CellPhoneNumber => &mut self.cell_phone_number,
            AttributeKind::OfficePhoneNumber => &mut self.office_phone_number,
            AttributeKind::HomePhoneNumber => &mut self.home_phone_number,
        };
        *slot = value;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PortablePatient {
    #[serde(default, deserialize_with = "present_identifiers")]
    pub identifiers: BTreeMap<String, String>,
}

/// Reads `null` the same as a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Identifier map with `null` values dropped.
fn present_identifiers<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Option<String>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(type_name, identifier)| identifier.map(|id| (type_name, id)))
        .collect())
}

impl PortableDocument {
    /// Document carrying only a national id.
    pub fn for_national_id(national_id: &str) -> Self {
        let mut doc = Self::default();
        doc.person.patient = Some(PortablePatient {
            identifiers: [(crate::models::NATIONAL_ID.to_string(), national_id.to_string())]
                .into_iter()
                .collect(),
        });
        doc
    }

    /// Parse JSON text, migrating legacy attribute keys.
    pub fn from_json(json: &str) -> PersonResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse a JSON value, migrating legacy attribute keys.
    pub fn from_value(mut value: Value) -> PersonResult<Self> {
        migrate_flattened_attributes(&mut value);
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json(&self) -> PersonResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn national_id(&self) -> Option<&str> {
        self.identifier(crate::models::NATIONAL_ID)
    }

    pub fn identifier(&self, type_name: &str) -> Option<&str> {
        self.person
            .patient
            .as_ref()
            .and_then(|p| p.identifiers.get(type_name))
            .map(String::as_str)
    }

    /// Number of populated leaf fields; used to pick the most complete of
    /// several candidate documents.
    pub fn populated_field_count(&self) -> usize {
        let p = &self.person;
        let filled = |v: &Option<String>| v.as_deref().map_or(false, |s| !s.trim().is_empty());

        let scalars = [p.gender.is_some(), p.date_changed.is_some()]
            .into_iter()
            .chain(
                [&p.birth_year, &p.birth_month, &p.birth_day, &p.age_estimate]
                    .into_iter()
                    .map(Option::is_some),
            )
            .filter(|b| *b)
            .count();

        let names = [
            &p.names.given_name,
            &p.names.middle_name,
            &p.names.family_name,
            &p.names.family_name2,
        ]
        .into_iter()
        .filter(|v| filled(*v))
        .count();

        let addresses = [
            &p.addresses.address1,
            &p.addresses.address2,
            &p.addresses.city_village,
            &p.addresses.county_district,
            &p.addresses.state_province,
        ]
        .into_iter()
        .filter(|v| filled(*v))
        .count();

        let attributes = AttributeKind::ALL
            .iter()
            .filter(|k| p.attributes.get(**k).map_or(false, |v| !v.trim().is_empty()))
            .count();

        let identifiers = p.patient.as_ref().map_or(0, |pt| pt.identifiers.len());

        scalars + names + addresses + attributes + identifiers
    }
}

/// Move attribute keys found directly under `"person"` into `"attributes"`.
///
/// A value already present under `"attributes"` wins over the flattened one.
fn migrate_flattened_attributes(value: &mut Value) {
    let Some(person) = value.get_mut("person").and_then(Value::as_object_mut) else {
        return;
    };

    let mut moved = Map::new();
    for kind in AttributeKind::ALL {
        if let Some(v) = person.remove(kind.field_key()) {
            moved.insert(kind.field_key().to_string(), v);
        }
    }
    if moved.is_empty() {
        return;
    }

    let attributes = person
        .entry("attributes")
        .or_insert_with(|| Value::Object(Map::new()));
    if !attributes.is_object() {
        *attributes = Value::Object(Map::new());
    }
    if let Some(attributes) = attributes.as_object_mut() {
        for (key, v) in moved {
            let present = attributes.get(&key).map_or(false, |existing| !existing.is_null());
            if !present {
                attributes.insert(key, v);
            }
        }
    }
}

/// Export a person as a portable document.
///
/// Uses the preferred name and address. Estimated birthdates send
/// `"Unknown"` for the sentinel parts.
pub fn to_portable(person: &PersonRecord) -> PortableDocument {
    let (birth_year, birth_month, birth_day) = match person.birthdate {
        None => (None, None, None),
        Some(b) => {
            let year = DatePart::Number(i64::from(b.date.year()));
            let month = DatePart::Number(i64::from(b.date.month()));
            let day = DatePart::Number(i64::from(b.date.day()));
            if !b.estimated {
                (Some(year), Some(month), Some(day))
            } else if b.is_year_only() {
                (Some(year), Some(DatePart::unknown()), Some(DatePart::unknown()))
            } else {
                (Some(year), Some(month), Some(DatePart::unknown()))
            }
        }
    };

    let mut attributes = PortableAttributes::default();
    for kind in AttributeKind::ALL {
        attributes.set(kind, person.attribute(kind).map(String::from));
    }

    let patient = (!person.identifiers.is_empty()).then(|| PortablePatient {
        identifiers: person
            .identifiers
            .iter()
            .map(|i| (i.type_name.clone(), i.identifier.clone()))
            .collect(),
    });

    PortableDocument {
        person: PortablePerson {
            gender: person.gender.clone(),
            birth_year,
            birth_month,
            birth_day,
            age_estimate: None,
            names: person.preferred_name().cloned().unwrap_or_default(),
            addresses: person.preferred_address().cloned().unwrap_or_default(),
            attributes,
            patient,
            date_changed: person.date_changed.clone(),
        },
    }
}

/// Import a portable document as a new, unsaved person.
///
/// Type ids are left unresolved; the store resolves them by name on insert,
/// storing identifiers of unregistered types under `"Unknown id"`.
pub fn from_portable(
    doc: &PortableDocument,
    session: &SessionContext,
) -> PersonResult<PersonRecord> {
    let p = &doc.person;
    let mut person = PersonRecord::new(session.session_date);

    person.gender = p.gender.as_deref().map(normalize_gender);

    let fields = BirthFields {
        year: p.birth_year.as_ref().map(DatePart::to_string),
        month: p.birth_month.as_ref().map(DatePart::to_string),
        day: p.birth_day.as_ref().map(DatePart::to_string),
        age_estimate: p.age_estimate.as_ref().map(DatePart::to_string),
    };
    person.birthdate = Birthdate::resolve(&fields, session.session_date.year())?;

    if !p.names.is_empty() {
        person.names.push(p.names.clone());
    }
    if !p.addresses.is_empty() {
        person.addresses.push(p.addresses.clone());
    }

    for kind in AttributeKind::ALL {
        if let Some(value) = p.attributes.get(kind).filter(|v| !v.trim().is_empty()) {
            person.attributes.push(PersonAttribute {
                kind,
                value: value.to_string(),
                attribute_type_id: None,
            });
        }
    }

    if let Some(patient) = &p.patient {
        for (type_name, identifier) in &patient.identifiers {
            if identifier.trim().is_empty() {
                continue;
            }
            person.identifiers.push(PatientIdentifier {
                type_name: type_name.clone(),
                identifier: identifier.clone(),
                identifier_type_id: None,
            });
        }
    }

    person.date_changed = p.date_changed.clone();
    Ok(person)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn session() -> SessionContext {
        SessionContext::new(date(2020, 3, 1))
    }

    fn sample_person() -> PersonRecord {
        let mut person = PersonRecord::new(date(2019, 5, 1));
        person.gender = Some("F".into());
        person.birthdate = Some(Birthdate {
            date: date(1980, 6, 15),
            estimated: true,
        });
        person.names.push(PersonName {
            given_name: Some("Mary".into()),
            family_name: Some("Banda".into()),
            ..Default::default()
        });
        person.addresses.push(PersonAddress {
            city_village: Some("Area 25".into()),
            ..Default::default()
        });
        person.attributes.push(PersonAttribute {
            kind: AttributeKind::Occupation,
            value: "Farmer".into(),
            attribute_type_id: Some(1),
        });
        person.identifiers.push(PatientIdentifier {
            type_name: "National id".into(),
            identifier: "P1701".into(),
            identifier_type_id: Some(10),
        });
        person.date_changed = Some("2020-02-01 09:30:00".into());
        person
    }

    #[test]
    fn test_to_portable_shape() {
        let doc = to_portable(&sample_person());
        let value = serde_json::to_value(&doc).unwrap();

        assert_eq!(value["person"]["gender"], "F");
        assert_eq!(value["person"]["birth_year"], 1980);
        assert_eq!(value["person"]["birth_month"], 6);
        assert_eq!(value["person"]["birth_day"], "Unknown");
        assert_eq!(value["person"]["attributes"]["occupation"], "Farmer");
        assert_eq!(value["person"]["patient"]["identifiers"]["National id"], "P1701");
        assert!(value["person"].get("occupation").is_none());
    }

    #[test]
    fn test_portable_inverse_on_shared_fields() {
        let original = sample_person();
        let restored = from_portable(&to_portable(&original), &session()).unwrap();

        assert_eq!(restored.gender, original.gender);
        assert_eq!(restored.birthdate, original.birthdate);
        assert_eq!(restored.names, original.names);
        assert_eq!(restored.addresses, original.addresses);
        assert_eq!(restored.attribute(AttributeKind::Occupation), Some("Farmer"));
        assert_eq!(restored.national_id(), Some("P1701"));
        assert_eq!(restored.date_changed, original.date_changed);
    }

    #[test]
    fn test_year_only_birthdate_survives_exchange() {
        let mut person = sample_person();
        person.birthdate = Some(Birthdate {
            date: date(1975, 7, 1),
            estimated: true,
        });

        let doc = to_portable(&person);
        assert_eq!(doc.person.birth_month, Some(DatePart::unknown()));

        let restored = from_portable(&doc, &session()).unwrap();
        assert_eq!(restored.birthdate, person.birthdate);
    }

    #[test]
    fn test_missing_keys_read_as_empty() {
        let doc = PortableDocument::from_json("{}").unwrap();
        assert_eq!(doc, PortableDocument::default());

        let doc = PortableDocument::from_json(r#"{"person": {"gender": "M"}}"#).unwrap();
        assert_eq!(doc.person.gender.as_deref(), Some("M"));
        assert!(doc.national_id().is_none());

        let person = from_portable(&doc, &session()).unwrap();
        assert!(person.birthdate.is_none());
        assert!(person.names.is_empty());
    }

    #[test]
    fn test_null_sections_read_as_empty() {
        let json = r#"{"person": {
            "gender": "F",
            "names": null,
            "addresses": null,
            "attributes": null,
            "patient": {"identifiers": null}
        }}"#;
        let doc = PortableDocument::from_json(json).unwrap();

        assert_eq!(doc.person.gender.as_deref(), Some("F"));
        assert!(doc.person.names.is_empty());
        assert!(doc.person.addresses.is_empty());
        assert_eq!(doc.person.attributes, PortableAttributes::default());
        assert!(doc.national_id().is_none());
    }

    #[test]
    fn test_null_identifier_dropped() {
        let json = r#"{"person": {
            "patient": {"identifiers": {"National id": "P1", "ARV Number": null}}
        }}"#;
        let doc = PortableDocument::from_json(json).unwrap();

        assert_eq!(doc.national_id(), Some("P1"));
        assert!(doc.identifier("ARV Number").is_none());
        assert_eq!(doc.populated_field_count(), 1);
    }

    #[test]
    fn test_flattened_attributes_replace_null_section() {
        let json = r#"{"person": {"occupation": "Driver", "attributes": null}}"#;
        let doc = PortableDocument::from_json(json).unwrap();
        assert_eq!(doc.person.attributes.occupation.as_deref(), Some("Driver"));
    }

    #[test]
    fn test_flattened_attributes_migrated() {
        let json = r#"{"person": {
            "occupation": "Driver",
            "cell_phone_number": "0888 000 111",
            "attributes": {"occupation": null, "home_phone_number": "01 222"}
        }}"#;
        let doc = PortableDocument::from_json(json).unwrap();

        assert_eq!(doc.person.attributes.occupation.as_deref(), Some("Driver"));
        assert_eq!(doc.person.attributes.cell_phone_number.as_deref(), Some("0888 000 111"));
        assert_eq!(doc.person.attributes.home_phone_number.as_deref(), Some("01 222"));
    }

    #[test]
    fn test_nested_value_wins_over_flattened() {
        let json = r#"{"person": {
            "occupation": "Driver",
            "attributes": {"occupation": "Nurse"}
        }}"#;
        let doc = PortableDocument::from_json(json).unwrap();
        assert_eq!(doc.person.attributes.occupation.as_deref(), Some("Nurse"));
    }

    #[test]
    fn test_string_date_parts_accepted() {
        let json = r#"{"person": {"birth_year": "1990", "birth_month": "Mar", "birth_day": "9"}}"#;
        let doc = PortableDocument::from_json(json).unwrap();
        let person = from_portable(&doc, &session()).unwrap();
        assert_eq!(person.birthdate, Some(Birthdate::exact(date(1990, 3, 9))));
    }

    #[test]
    fn test_populated_field_count() {
        let full = to_portable(&sample_person());
        let sparse = PortableDocument::for_national_id("P1701");

        assert_eq!(sparse.populated_field_count(), 1);
        assert!(full.populated_field_count() > sparse.populated_field_count());
    }
}
