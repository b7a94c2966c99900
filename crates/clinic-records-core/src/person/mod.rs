//! Person record building, exchange and search.
//!
//! - [`birthdate`]: sentinel rules for partially known birthdates
//! - [`builder`]: flat registration form → [`PersonRecord`](crate::models::PersonRecord)
//! - [`portable`]: the nested `{"person": {...}}` document exchanged with remote sites
//! - [`search`]: identifier and fuzzy name lookups

pub mod birthdate;
pub mod builder;
pub mod portable;
pub mod search;

pub use birthdate::*;
pub use builder::*;
pub use portable::*;
pub use search::*;

use thiserror::Error;

use crate::db::DbError;

/// Person errors.
#[derive(Error, Debug)]
pub enum PersonError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid birthdate: {0}")]
    InvalidBirthdate(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type PersonResult<T> = Result<T, PersonError>;

/// Resolves attribute and identifier type names to their reference ids.
pub trait AttributeTypeDirectory {
    /// Fails with [`PersonError::NotFound`] when `name` is not registered.
    fn resolve_attribute_type(&self, name: &str) -> PersonResult<i64>;

    /// Fails with [`PersonError::NotFound`] when `name` is not registered.
    fn resolve_identifier_type(&self, name: &str) -> PersonResult<i64>;
}
