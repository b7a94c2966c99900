//! Person (demographics) models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identifier type name used for national ids.
pub const NATIONAL_ID: &str = "National id";

/// Identifier type used when the submitted type is not registered.
pub const UNKNOWN_ID: &str = "Unknown id";

/// A demographic record for one person.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonRecord {
    /// Local UUID - always present, generated locally
    pub person_id: String,
    /// "M", "F", or whatever the caller supplied
    pub gender: Option<String>,
    /// Birthdate, possibly estimated
    pub birthdate: Option<Birthdate>,
    /// Names, preferred first
    pub names: Vec<PersonName>,
    /// Addresses, preferred first
    pub addresses: Vec<PersonAddress>,
    /// Occupation and phone numbers
    pub attributes: Vec<PersonAttribute>,
    /// Patient identifiers (national id, etc.)
    pub identifiers: Vec<PatientIdentifier>,
    /// Date the record was created (session date)
    pub date_created: NaiveDate,
    /// Last change timestamp as reported by the owning site
    pub date_changed: Option<String>,
    /// Soft-deleted
    pub voided: bool,
}

impl PersonRecord {
    /// Create an empty record created on `date_created`.
    pub fn new(date_created: NaiveDate) -> Self {
        Self {
            person_id: uuid::Uuid::new_v4().to_string(),
            gender: None,
            birthdate: None,
            names: Vec::new(),
            addresses: Vec::new(),
            attributes: Vec::new(),
            identifiers: Vec::new(),
            date_created,
            date_changed: None,
            voided: false,
        }
    }

    pub fn preferred_name(&self) -> Option<&PersonName> {
        self.names.first()
    }

    pub fn preferred_address(&self) -> Option<&PersonAddress> {
        self.addresses.first()
    }

    /// "Given Family", title-cased.
    pub fn display_name(&self) -> Option<String> {
        let name = self.preferred_name()?;
        let full = format!(
            "{} {}",
            name.given_name.as_deref().unwrap_or_default(),
            name.family_name.as_deref().unwrap_or_default()
        );
        Some(titleize(full.trim()))
    }

    /// Value of the first attribute of the given kind.
    pub fn attribute(&self, kind: AttributeKind) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.kind == kind)
            .map(|a| a.value.as_str())
    }

    /// Identifier value for the given identifier type name.
    pub fn identifier(&self, type_name: &str) -> Option<&str> {
        self.identifiers
            .iter()
            .find(|i| i.type_name == type_name)
            .map(|i| i.identifier.as_str())
    }

    pub fn national_id(&self) -> Option<&str> {
        self.identifier(NATIONAL_ID)
    }

    /// Long-form sex label; None for anything other than "M"/"F".
    pub fn sex(&self) -> Option<&'static str> {
        match self.gender.as_deref() {
            Some("M") => Some("Male"),
            Some("F") => Some("Female"),
            _ => None,
        }
    }
}

/// A person's name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PersonName {
    pub given_name: Option<String>,
    pub middle_name: Option<String>,
    pub family_name: Option<String>,
    pub family_name2: Option<String>,
}

impl PersonName {
    pub fn is_empty(&self) -> bool {
        [
            &self.given_name,
            &self.middle_name,
            &self.family_name,
            &self.family_name2,
        ]
        .iter()
        .all(|f| f.as_deref().map_or(true, |s| s.trim().is_empty()))
    }
}

/// A person's address.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PersonAddress {
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city_village: Option<String>,
    pub county_district: Option<String>,
    pub state_province: Option<String>,
}

impl PersonAddress {
    pub fn is_empty(&self) -> bool {
        [
            &self.address1,
            &self.address2,
            &self.city_village,
            &self.county_district,
            &self.state_province,
        ]
        .iter()
        .all(|f| f.as_deref().map_or(true, |s| s.trim().is_empty()))
    }
}

/// Attribute kinds captured on the registration form.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Occupation,
    CellPhoneNumber,
    OfficePhoneNumber,
    HomePhoneNumber,
}

impl AttributeKind {
    pub const ALL: [AttributeKind; 4] = [
        AttributeKind::Occupation,
        AttributeKind::CellPhoneNumber,
        AttributeKind::OfficePhoneNumber,
        AttributeKind::HomePhoneNumber,
    ];

    /// Name registered in the attribute type table.
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeKind::Occupation => "Occupation",
            AttributeKind::CellPhoneNumber => "Cell Phone Number",
            AttributeKind::OfficePhoneNumber => "Office Phone Number",
            AttributeKind::HomePhoneNumber => "Home Phone Number",
        }
    }

    /// Key used in form input and portable documents.
    pub fn field_key(&self) -> &'static str {
        match self {
            AttributeKind::Occupation => "occupation",
            AttributeKind::CellPhoneNumber => "cell_phone_number",
            AttributeKind::OfficePhoneNumber => "office_phone_number",
            AttributeKind::HomePhoneNumber => "home_phone_number",
        }
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.type_name() == name)
    }
}

/// A typed attribute value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonAttribute {
    pub kind: AttributeKind,
    pub value: String,
    /// Resolved attribute type id (None until resolved against the directory)
    pub attribute_type_id: Option<i64>,
}

/// A patient identifier such as a national id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientIdentifier {
    pub type_name: String,
    pub identifier: String,
    /// Resolved identifier type id (None until resolved against the directory)
    pub identifier_type_id: Option<i64>,
}

/// A birthdate, flagged when day and/or month were filled with sentinels.
///
/// July 1 means only the year is known; the 15th means year and month are known.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Birthdate {
    pub date: NaiveDate,
    pub estimated: bool,
}

/// Per-request context that used to live in process-wide session globals.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    /// Date the work is recorded against; anchors age estimates
    pub session_date: NaiveDate,
    /// Clinic location name
    pub location: Option<String>,
    /// User performing the work
    pub creator: Option<String>,
}

impl SessionContext {
    pub fn new(session_date: NaiveDate) -> Self {
        Self {
            session_date,
            location: None,
            creator: None,
        }
    }

    /// Context anchored at today's date.
    pub fn today() -> Self {
        Self::new(chrono::Local::now().date_naive())
    }
}

fn titleize(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
