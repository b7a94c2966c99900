//! Person lookup by identifier and by fuzzy name match.

use strsim::jaro_winkler;

use super::portable::PortableDocument;
use super::PersonResult;
use crate::db::Database;
use crate::models::{PersonName, PersonRecord};

/// Minimum Jaro-Winkler similarity for two names to match.
pub const NAME_MATCH_THRESHOLD: f64 = 0.88;

/// Demographic search parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NameQuery {
    pub gender: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
}

impl NameQuery {
    fn from_document(doc: &PortableDocument) -> Self {
        Self {
            gender: doc.person.gender.clone(),
            given_name: doc.person.names.given_name.clone(),
            family_name: doc.person.names.family_name.clone(),
        }
    }
}

/// Whether two names sound alike.
pub fn names_similar(a: &str, b: &str) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    !a.is_empty() && !b.is_empty() && jaro_winkler(&a, &b) >= NAME_MATCH_THRESHOLD
}

fn name_matches(name: &PersonName, given: &str, family: &str) -> bool {
    let given_ok = name
        .given_name
        .as_deref()
        .map_or(false, |n| names_similar(n, given));
    let family_ok = name
        .family_name
        .as_deref()
        .map_or(false, |n| names_similar(n, family));
    given_ok && family_ok
}

/// People of the given gender whose given and family names both match.
///
/// Gender, given name and family name are all required; a query missing any
/// of them matches nobody.
pub fn search_people(db: &Database, query: &NameQuery) -> PersonResult<Vec<PersonRecord>> {
    let (Some(gender), Some(given), Some(family)) = (
        query.gender.as_deref(),
        query.given_name.as_deref(),
        query.family_name.as_deref(),
    ) else {
        return Ok(Vec::new());
    };

    let mut ids: Vec<String> = Vec::new();
    for (person_id, name) in db.name_candidates(gender)? {
        if name_matches(&name, given, family) && !ids.contains(&person_id) {
            ids.push(person_id);
        }
    }
    let matches = db.people_by_ids(&ids)?;

    tracing::debug!(gender, given, family, matches = matches.len(), "searched people by name");
    Ok(matches)
}

/// Local people matching a portable document.
///
/// The national id is tried first; when it is absent or matches nobody the
/// search falls back to gender and names.
pub fn find_by_demographics(
    db: &Database,
    doc: &PortableDocument,
) -> PersonResult<Vec<PersonRecord>> {
    if let Some(national_id) = doc.national_id() {
        let found = db.search_by_identifier(national_id)?;
        if !found.is_empty() {
            return Ok(found);
        }
    }
    search_people(db, &NameQuery::from_document(doc))
}
