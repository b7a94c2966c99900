//! SQLite schema definition.

/// Complete database schema for the clinic records store.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- People
-- ============================================================================

CREATE TABLE IF NOT EXISTS person (
    person_id TEXT PRIMARY KEY,
    gender TEXT,
    birthdate TEXT,                              -- YYYY-MM-DD
    birthdate_estimated INTEGER NOT NULL DEFAULT 0,
    date_created TEXT NOT NULL,                  -- session date, YYYY-MM-DD
    date_changed TEXT,
    voided INTEGER NOT NULL DEFAULT 0,
    void_reason TEXT
);

CREATE INDEX IF NOT EXISTS idx_person_gender ON person(gender);

CREATE TABLE IF NOT EXISTS person_name (
    person_name_id INTEGER PRIMARY KEY AUTOINCREMENT,
    person_id TEXT NOT NULL REFERENCES person(person_id),
    given_name TEXT,
    middle_name TEXT,
    family_name TEXT,
    family_name2 TEXT,
    preferred INTEGER NOT NULL DEFAULT 0,
    voided INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_person_name_person ON person_name(person_id);
CREATE INDEX IF NOT EXISTS idx_person_name_family ON person_name(family_name);

CREATE TABLE IF NOT EXISTS person_address (
    person_address_id INTEGER PRIMARY KEY AUTOINCREMENT,
    person_id TEXT NOT NULL REFERENCES person(person_id),
    address1 TEXT,
    address2 TEXT,
    city_village TEXT,
    county_district TEXT,
    state_province TEXT,
    preferred INTEGER NOT NULL DEFAULT 0,
    voided INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_person_address_person ON person_address(person_id);

-- ============================================================================
-- Reference Tables (Attribute and Identifier Types)
-- ============================================================================

CREATE TABLE IF NOT EXISTS person_attribute_type (
    person_attribute_type_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS person_attribute (
    person_attribute_id INTEGER PRIMARY KEY AUTOINCREMENT,
    person_id TEXT NOT NULL REFERENCES person(person_id),
    person_attribute_type_id INTEGER NOT NULL
        REFERENCES person_attribute_type(person_attribute_type_id),
    value TEXT NOT NULL,
    voided INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_person_attribute_person ON person_attribute(person_id);

CREATE TABLE IF NOT EXISTS patient_identifier_type (
    patient_identifier_type_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS patient_identifier (
    patient_identifier_id INTEGER PRIMARY KEY AUTOINCREMENT,
    person_id TEXT NOT NULL REFERENCES person(person_id),
    identifier_type INTEGER NOT NULL
        REFERENCES patient_identifier_type(patient_identifier_type_id),
    identifier TEXT NOT NULL,
    voided INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_patient_identifier_value ON patient_identifier(identifier);

-- ============================================================================
-- Concepts and Observations
-- ============================================================================

-- Both question concepts ("Diagnosis", "Referral") and answers
-- (diagnosis names, referral destinations) live here.
CREATE TABLE IF NOT EXISTS concept_name (
    concept_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS obs (
    obs_id INTEGER PRIMARY KEY AUTOINCREMENT,
    person_id TEXT NOT NULL REFERENCES person(person_id),
    concept_id INTEGER NOT NULL REFERENCES concept_name(concept_id),
    value_coded INTEGER NOT NULL REFERENCES concept_name(concept_id),
    obs_date TEXT NOT NULL,                      -- YYYY-MM-DD
    voided INTEGER NOT NULL DEFAULT 0,
    void_reason TEXT
);

CREATE INDEX IF NOT EXISTS idx_obs_date ON obs(obs_date);
CREATE INDEX IF NOT EXISTS idx_obs_concept ON obs(concept_id, value_coded);
CREATE INDEX IF NOT EXISTS idx_obs_person ON obs(person_id);

-- Voided observations stay voided
CREATE TRIGGER IF NOT EXISTS obs_unvoid_guard BEFORE UPDATE OF voided ON obs
WHEN old.voided = 1 AND new.voided = 0
BEGIN
    SELECT RAISE(ABORT, 'Voided observations cannot be restored');
END;

-- Seed the identifier type used as a fallback for unregistered types
INSERT OR IGNORE INTO patient_identifier_type (name) VALUES ('Unknown id');
"#;
