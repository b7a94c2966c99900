//! Reference table operations: attribute types, identifier types, concepts.

use rusqlite::OptionalExtension;

use super::{Database, DbResult};
use crate::person::{AttributeTypeDirectory, PersonError, PersonResult};

impl Database {
    /// Register an attribute type, returning its id (existing or new).
    pub fn register_attribute_type(&self, name: &str) -> DbResult<i64> {
        self.conn.execute(
            "INSERT OR IGNORE INTO person_attribute_type (name) VALUES (?)",
            [name],
        )?;
        self.conn
            .query_row(
                "SELECT person_attribute_type_id FROM person_attribute_type WHERE name = ?",
                [name],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    /// Look up an attribute type id by name.
    pub fn attribute_type_id(&self, name: &str) -> DbResult<Option<i64>> {
        self.conn
            .query_row(
                "SELECT person_attribute_type_id FROM person_attribute_type WHERE name = ?",
                [name],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Register an identifier type, returning its id (existing or new).
    pub fn register_identifier_type(&self, name: &str) -> DbResult<i64> {
        self.conn.execute(
            "INSERT OR IGNORE INTO patient_identifier_type (name) VALUES (?)",
            [name],
        )?;
        self.conn
            .query_row(
                "SELECT patient_identifier_type_id FROM patient_identifier_type WHERE name = ?",
                [name],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    /// Look up an identifier type id by name.
    pub fn identifier_type_id(&self, name: &str) -> DbResult<Option<i64>> {
        self.conn
            .query_row(
                "SELECT patient_identifier_type_id FROM patient_identifier_type WHERE name = ?",
                [name],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Get or create a concept by name.
    pub fn ensure_concept(&self, name: &str) -> DbResult<i64> {
        self.conn
            .execute("INSERT OR IGNORE INTO concept_name (name) VALUES (?)", [name])?;
        self.conn
            .query_row(
                "SELECT concept_id FROM concept_name WHERE name = ?",
                [name],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    /// Look up a concept id by name.
    pub fn concept_id(&self, name: &str) -> DbResult<Option<i64>> {
        self.conn
            .query_row(
                "SELECT concept_id FROM concept_name WHERE name = ?",
                [name],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Register every attribute and identifier type name given.
    pub fn seed_reference_types(
        &self,
        attribute_types: &[String],
        identifier_types: &[String],
    ) -> DbResult<()> {
        for name in attribute_types {
            self.register_attribute_type(name)?;
        }
        for name in identifier_types {
            self.register_identifier_type(name)?;
        }
        tracing::debug!(
            attribute_types = attribute_types.len(),
            identifier_types = identifier_types.len(),
            "seeded reference types"
        );
        Ok(())
    }
}

impl AttributeTypeDirectory for Database {
    fn resolve_attribute_type(&self, name: &str) -> PersonResult<i64> {
        self.attribute_type_id(name)?
            .ok_or_else(|| PersonError::NotFound(format!("attribute type '{}'", name)))
    }

    fn resolve_identifier_type(&self, name: &str) -> PersonResult<i64> {
        self.identifier_type_id(name)?
            .ok_or_else(|| PersonError::NotFound(format!("identifier type '{}'", name)))
    }
}
