//! A small in-memory schema model.
//!
//! Enough to exercise schema-aware construction: user-defined simple types that
//! restrict a built-in type with an optional enumeration, plus global element and
//! attribute declarations naming their types.

use crate::builtin_types::validate_builtin;
use std::collections::HashMap;
use weft_traits::{InvalidValue, SchemaValidator};
use weft_types::QName;

#[derive(Debug, Clone)]
struct SimpleType {
    base: QName,
    enumeration: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemorySchema {
    types: HashMap<QName, SimpleType>,
    elements: HashMap<QName, QName>,
    attributes: HashMap<QName, QName>,
}

impl InMemorySchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a simple type derived from `base` (built-in or previously declared).
    pub fn with_simple_type(
        mut self,
        name: QName,
        base: QName,
        enumeration: Option<Vec<String>>,
    ) -> Self {
        self.types.insert(name, SimpleType { base, enumeration });
        self
    }

    pub fn with_element(mut self, name: QName, type_name: QName) -> Self {
        self.elements.insert(name, type_name);
        self
    }

    pub fn with_attribute(mut self, name: QName, type_name: QName) -> Self {
        self.attributes.insert(name, type_name);
        self
    }

    fn check(&self, value: &str, type_name: &QName, depth: usize) -> Result<(), InvalidValue> {
        if let Some(outcome) = validate_builtin(type_name, value) {
            return outcome;
        }
        let Some(simple) = self.types.get(type_name).filter(|_| depth < 32) else {
            return Err(InvalidValue::new(value, type_name, "unknown type"));
        };
        self.check(value, &simple.base, depth + 1)
            .map_err(|e| InvalidValue::new(value, type_name, e.reason))?;
        match &simple.enumeration {
            Some(allowed) if !allowed.iter().any(|a| a == value.trim()) => Err(InvalidValue::new(
                value,
                type_name,
                format!("not one of {}", allowed.join(", ")),
            )),
            _ => Ok(()),
        }
    }
}

impl SchemaValidator for InMemorySchema {
    fn has_type(&self, type_name: &QName) -> bool {
        self.types.contains_key(type_name) || validate_builtin(type_name, "").is_some()
    }

    fn validate(&self, value: &str, type_name: &QName) -> Result<(), InvalidValue> {
        self.check(value, type_name, 0)
    }

    fn element_declaration(&self, name: &QName) -> Option<QName> {
        self.elements.get(name).cloned()
    }

    fn attribute_declaration(&self, name: &QName) -> Option<QName> {
        self.attributes.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn colours() -> InMemorySchema {
        InMemorySchema::new()
            .with_simple_type(
                QName::new(Some("urn:s"), "colour"),
                QName::xs("token"),
                Some(vec!["red".into(), "green".into()]),
            )
            .with_simple_type(QName::new(Some("urn:s"), "small"), QName::xs("byte"), None)
            .with_element(QName::local("c"), QName::new(Some("urn:s"), "colour"))
    }

    #[test]
    fn enumeration_restricts_base() {
        let schema = colours();
        let colour = QName::new(Some("urn:s"), "colour");
        assert!(schema.validate("red", &colour).is_ok());
        assert!(schema.validate("blue", &colour).is_err());
        assert!(schema.has_type(&colour));
    }

    #[test]
    fn base_type_is_checked() {
        let schema = colours();
        let small = QName::new(Some("urn:s"), "small");
        assert!(schema.validate("12", &small).is_ok());
        let err = schema.validate("1000", &small).unwrap_err();
        assert!(err.type_name.contains("small"));
    }

    #[test]
    fn declarations_are_looked_up_by_expanded_name() {
        let schema = colours();
        assert_eq!(
            schema.element_declaration(&QName::local("c")),
            Some(QName::new(Some("urn:s"), "colour"))
        );
        assert!(schema.attribute_declaration(&QName::local("c")).is_none());
        assert!(schema.validate("x", &QName::local("nothing")).is_err());
    }
}
