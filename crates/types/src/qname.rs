//! Namespace-aware qualified names.
//!
//! Two names are equal when their namespace URI and local part are equal; the
//! prefix is carried only so that output can reuse it.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

pub const XSLT_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";
pub const ERR_NAMESPACE: &str = "http://www.w3.org/2005/xqt-errors";
pub const XS_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QNameError {
    #[error("'{0}' is not a valid lexical QName")]
    InvalidLexical(String),

    #[error("namespace prefix '{0}' is not declared")]
    UnboundPrefix(String),
}

#[derive(Debug, Clone)]
pub struct QName {
    pub prefix: Option<String>,
    pub namespace: Option<String>,
    pub local: String,
}

impl QName {
    /// A name in no namespace.
    pub fn local(local: impl Into<String>) -> Self {
        Self {
            prefix: None,
            namespace: None,
            local: local.into(),
        }
    }

    pub fn new(namespace: Option<&str>, local: impl Into<String>) -> Self {
        Self {
            prefix: None,
            namespace: namespace.filter(|ns| !ns.is_empty()).map(str::to_string),
            local: local.into(),
        }
    }

    pub fn prefixed(
        prefix: impl Into<String>,
        namespace: impl Into<String>,
        local: impl Into<String>,
    ) -> Self {
        let prefix = prefix.into();
        let namespace = namespace.into();
        Self {
            prefix: (!prefix.is_empty()).then_some(prefix),
            namespace: (!namespace.is_empty()).then_some(namespace),
            local: local.into(),
        }
    }

    /// An error code in the standard `err` namespace, e.g. `XTDE0640`.
    pub fn error_code(local: impl Into<String>) -> Self {
        Self::prefixed("err", ERR_NAMESPACE, local)
    }

    /// An XML Schema built-in type name, e.g. `integer`.
    pub fn xs(local: impl Into<String>) -> Self {
        Self::prefixed("xs", XS_NAMESPACE, local)
    }

    pub fn namespace_uri(&self) -> &str {
        self.namespace.as_deref().unwrap_or("")
    }

    pub fn prefix(&self) -> &str {
        self.prefix.as_deref().unwrap_or("")
    }

    pub fn has_namespace(&self, uri: &str) -> bool {
        self.namespace_uri() == uri
    }

    /// Clark notation, `Q{uri}local`.
    pub fn eqname(&self) -> String {
        format!("Q{{{}}}{}", self.namespace_uri(), self.local)
    }

    /// The `prefix:local` form used when writing markup.
    pub fn lexical(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{}:{}", p, self.local),
            None => self.local.clone(),
        }
    }

    pub fn with_prefix(&self, prefix: Option<&str>) -> Self {
        Self {
            prefix: prefix.filter(|p| !p.is_empty()).map(str::to_string),
            namespace: self.namespace.clone(),
            local: self.local.clone(),
        }
    }

    /// Splits a lexical QName into its optional prefix and local part.
    pub fn split_lexical(lexical: &str) -> Result<(Option<&str>, &str), QNameError> {
        let lexical = lexical.trim();
        match lexical.split_once(':') {
            Some((prefix, local)) if is_ncname(prefix) && is_ncname(local) => {
                Ok((Some(prefix), local))
            }
            None if is_ncname(lexical) => Ok((None, lexical)),
            _ => Err(QNameError::InvalidLexical(lexical.to_string())),
        }
    }

    /// Resolves a lexical QName with the supplied prefix lookup.
    ///
    /// `default_namespace` applies to unprefixed names (the default element namespace
    /// for element names, `None` for attributes and most other names).
    pub fn resolve<'a, F>(
        lexical: &str,
        default_namespace: Option<&str>,
        lookup: F,
    ) -> Result<Self, QNameError>
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        if let Some(rest) = lexical.strip_prefix("Q{")
            && let Some((uri, local)) = rest.split_once('}')
        {
            if !is_ncname(local) {
                return Err(QNameError::InvalidLexical(lexical.to_string()));
            }
            return Ok(Self::new(Some(uri), local));
        }

        match Self::split_lexical(lexical)? {
            (Some(prefix), local) => {
                let uri = match prefix {
                    "xml" => XML_NAMESPACE,
                    _ => lookup(prefix)
                        .ok_or_else(|| QNameError::UnboundPrefix(prefix.to_string()))?,
                };
                Ok(Self::prefixed(prefix, uri, local))
            }
            (None, local) => Ok(Self::new(default_namespace, local)),
        }
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.local == other.local && self.namespace_uri() == other.namespace_uri()
    }
}

impl Eq for QName {}

impl Hash for QName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace_uri().hash(state);
        self.local.hash(state);
    }
}

impl PartialOrd for QName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.namespace_uri()
            .cmp(other.namespace_uri())
            .then_with(|| self.local.cmp(&other.local))
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.prefix, &self.namespace) {
            (Some(p), _) => write!(f, "{}:{}", p, self.local),
            (None, Some(ns)) => write!(f, "Q{{{}}}{}", ns, self.local),
            (None, None) => f.write_str(&self.local),
        }
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '\u{B7}')
}

/// Returns true if `s` is a non-colonized XML name.
pub fn is_ncname(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if is_name_start(c) => chars.all(is_name_char),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_prefix() {
        let a = QName::prefixed("a", "urn:x", "item");
        let b = QName::prefixed("b", "urn:x", "item");
        assert_eq!(a, b);
        assert_ne!(a, QName::local("item"));
    }

    #[test]
    fn split_lexical_rejects_bad_names() {
        assert_eq!(QName::split_lexical("p:x").unwrap(), (Some("p"), "x"));
        assert_eq!(QName::split_lexical("x").unwrap(), (None, "x"));
        assert!(QName::split_lexical("1x").is_err());
        assert!(QName::split_lexical("a:b:c").is_err());
        assert!(QName::split_lexical("").is_err());
    }

    #[test]
    fn resolve_uses_lookup_and_clark_notation() {
        let lookup = |p: &str| if p == "f" { Some("urn:f") } else { None };
        let q = QName::resolve("f:name", None, lookup).unwrap();
        assert_eq!(q.namespace_uri(), "urn:f");
        assert_eq!(q.prefix(), "f");

        let q = QName::resolve("Q{urn:g}name", None, lookup).unwrap();
        assert_eq!(q.namespace_uri(), "urn:g");

        assert_eq!(
            QName::resolve("z:name", None, lookup),
            Err(QNameError::UnboundPrefix("z".to_string()))
        );
    }

    #[test]
    fn error_codes_display_with_err_prefix() {
        assert_eq!(QName::error_code("XTDE0640").to_string(), "err:XTDE0640");
        assert_eq!(QName::new(Some("urn:a"), "b").to_string(), "Q{urn:a}b");
    }
}
