//! Schema-aware validation of constructed nodes.
//!
//! The core only asks yes/no questions of a schema model: does a type exist, is a
//! value valid for it, and which type is declared for a global element or
//! attribute name.

use std::fmt::Debug;
use thiserror::Error;
use weft_types::QName;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("'{value}' is not a valid instance of {type_name}: {reason}")]
pub struct InvalidValue {
    pub value: String,
    pub type_name: String,
    pub reason: String,
}

impl InvalidValue {
    pub fn new(value: &str, type_name: &QName, reason: impl Into<String>) -> Self {
        Self {
            value: value.to_string(),
            type_name: type_name.to_string(),
            reason: reason.into(),
        }
    }
}

pub trait SchemaValidator: Send + Sync + Debug {
    /// True if `type_name` names a simple type known to this schema.
    fn has_type(&self, type_name: &QName) -> bool;

    fn validate(&self, value: &str, type_name: &QName) -> Result<(), InvalidValue>;

    /// Type of the global element declaration for `name`, if any.
    fn element_declaration(&self, name: &QName) -> Option<QName>;

    /// Type of the global attribute declaration for `name`, if any.
    fn attribute_declaration(&self, name: &QName) -> Option<QName>;
}
