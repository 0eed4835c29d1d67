//! Errors raised while executing instructions.
//!
//! Every failure carries a standard error-code QName. The variant records which
//! family the code belongs to, which in turn decides whether `xsl:catch` may
//! intercept it: static and resolution errors always abort the transformation.

use std::fmt;
use thiserror::Error;
use weft_traits::{InvalidValue, ResourceError};
use weft_types::{QName, XdmValue};

/// Position of an instruction in its stylesheet module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub module: Option<String>,
    pub line: u32,
    pub column: u32,
}

impl Locator {
    pub fn new(line: u32, column: u32) -> Self {
        Self {
            module: None,
            line,
            column,
        }
    }

    pub fn in_module(module: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            module: Some(module.into()),
            line,
            column,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(m) => write!(f, "{}:{}:{}", m, self.line, self.column),
            None => write!(f, "line {}, column {}", self.line, self.column),
        }
    }
}

fn at(locator: &Option<Locator>) -> String {
    match locator {
        Some(l) => format!(" at {l}"),
        None => String::new(),
    }
}

#[derive(Error, Debug, Clone)]
pub enum XsltError {
    #[error("static error {code}: {message}{}", at(.locator))]
    Static {
        code: QName,
        message: String,
        locator: Option<Locator>,
    },

    #[error("type error {code}: {message}{}", at(.locator))]
    Type {
        code: QName,
        message: String,
        locator: Option<Locator>,
    },

    #[error("dynamic error {code}: {message}{}", at(.locator))]
    Dynamic {
        code: QName,
        message: String,
        value: Option<XdmValue>,
        locator: Option<Locator>,
    },

    #[error("resource error {code}: {message}{}", at(.locator))]
    Resource {
        code: QName,
        message: String,
        locator: Option<Locator>,
    },

    /// A context-dependent function was called where no state is in scope.
    #[error("{code}: {message}{}", at(.locator))]
    Resolution {
        code: QName,
        message: String,
        locator: Option<Locator>,
    },

    #[error("fork branch {branch} failed{}: {source}", at(.locator))]
    Fork {
        branch: usize,
        locator: Option<Locator>,
        source: Box<XsltError>,
    },
}

impl XsltError {
    pub fn static_error(code: &str, message: impl Into<String>) -> Self {
        XsltError::Static {
            code: QName::error_code(code),
            message: message.into(),
            locator: None,
        }
    }

    pub fn type_error(code: &str, message: impl Into<String>) -> Self {
        XsltError::Type {
            code: QName::error_code(code),
            message: message.into(),
            locator: None,
        }
    }

    pub fn dynamic(code: &str, message: impl Into<String>) -> Self {
        Self::user(QName::error_code(code), message, None)
    }

    /// A dynamic error with an arbitrary code, as raised by `error()` or
    /// `xsl:message terminate="yes"`.
    pub fn user(code: QName, message: impl Into<String>, value: Option<XdmValue>) -> Self {
        XsltError::Dynamic {
            code,
            message: message.into(),
            value,
            locator: None,
        }
    }

    pub fn resource(code: &str, message: impl Into<String>) -> Self {
        XsltError::Resource {
            code: QName::error_code(code),
            message: message.into(),
            locator: None,
        }
    }

    pub fn resolution(code: &str, message: impl Into<String>) -> Self {
        XsltError::Resolution {
            code: QName::error_code(code),
            message: message.into(),
            locator: None,
        }
    }

    pub fn code(&self) -> &QName {
        match self {
            XsltError::Static { code, .. }
            | XsltError::Type { code, .. }
            | XsltError::Dynamic { code, .. }
            | XsltError::Resource { code, .. }
            | XsltError::Resolution { code, .. } => code,
            XsltError::Fork { source, .. } => source.code(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            XsltError::Static { message, .. }
            | XsltError::Type { message, .. }
            | XsltError::Dynamic { message, .. }
            | XsltError::Resource { message, .. }
            | XsltError::Resolution { message, .. } => message,
            XsltError::Fork { source, .. } => source.message(),
        }
    }

    pub fn value(&self) -> Option<&XdmValue> {
        match self {
            XsltError::Dynamic { value, .. } => value.as_ref(),
            XsltError::Fork { source, .. } => source.value(),
            _ => None,
        }
    }

    pub fn locator(&self) -> Option<&Locator> {
        match self {
            XsltError::Static { locator, .. }
            | XsltError::Type { locator, .. }
            | XsltError::Dynamic { locator, .. }
            | XsltError::Resource { locator, .. }
            | XsltError::Resolution { locator, .. } => locator.as_ref(),
            XsltError::Fork { source, locator, .. } => source.locator().or(locator.as_ref()),
        }
    }

    pub fn is_catchable(&self) -> bool {
        match self {
            XsltError::Static { .. } | XsltError::Resolution { .. } => false,
            XsltError::Type { .. } | XsltError::Dynamic { .. } | XsltError::Resource { .. } => {
                true
            }
            XsltError::Fork { source, .. } => source.is_catchable(),
        }
    }

    /// True if the error code is the standard code `local` in the `err` namespace.
    pub fn has_code(&self, local: &str) -> bool {
        let code = self.code();
        code.local == local && code.has_namespace(weft_types::ERR_NAMESPACE)
    }

    /// Attaches `locator` unless the error already carries one.
    pub fn at_locator(mut self, loc: Option<&Locator>) -> Self {
        let Some(loc) = loc else {
            return self;
        };
        match &mut self {
            XsltError::Static { locator, .. }
            | XsltError::Type { locator, .. }
            | XsltError::Dynamic { locator, .. }
            | XsltError::Resource { locator, .. }
            | XsltError::Resolution { locator, .. }
            | XsltError::Fork { locator, .. } => {
                if locator.is_none() {
                    *locator = Some(loc.clone());
                }
            }
        }
        self
    }
}

impl From<ResourceError> for XsltError {
    fn from(err: ResourceError) -> Self {
        XsltError::resource(codes::FODC0002, err.to_string())
    }
}

impl From<roxmltree::Error> for XsltError {
    fn from(err: roxmltree::Error) -> Self {
        XsltError::resource(codes::FODC0002, format!("XML parsing error: {err}"))
    }
}

impl From<InvalidValue> for XsltError {
    fn from(err: InvalidValue) -> Self {
        XsltError::type_error(codes::XTTE1510, err.to_string())
    }
}

/// Standard error codes raised by the core.
pub mod codes {
    pub const XTSE0010: &str = "XTSE0010";
    pub const XTSE0620: &str = "XTSE0620";
    pub const XTSE0650: &str = "XTSE0650";
    pub const XTSE0660: &str = "XTSE0660";
    pub const XTSE0680: &str = "XTSE0680";
    pub const XTSE0840: &str = "XTSE0840";
    pub const XTSE0870: &str = "XTSE0870";
    pub const XTSE0940: &str = "XTSE0940";
    pub const XTSE1505: &str = "XTSE1505";
    pub const XTSE1520: &str = "XTSE1520";
    pub const XTSE1590: &str = "XTSE1590";
    pub const XTSE1600: &str = "XTSE1600";
    pub const XTSE3140: &str = "XTSE3140";
    pub const XTSE3150: &str = "XTSE3150";
    pub const XTSE3185: &str = "XTSE3185";
    pub const XPST0003: &str = "XPST0003";
    pub const XPST0008: &str = "XPST0008";
    pub const XPST0017: &str = "XPST0017";
    pub const XPST0081: &str = "XPST0081";

    pub const XPTY0004: &str = "XPTY0004";
    pub const XPTY0018: &str = "XPTY0018";
    pub const XPTY0019: &str = "XPTY0019";
    pub const XPTY0020: &str = "XPTY0020";
    pub const XTTE0505: &str = "XTTE0505";
    pub const XTTE0590: &str = "XTTE0590";
    pub const XTTE1100: &str = "XTTE1100";
    pub const XTTE1510: &str = "XTTE1510";
    pub const XTTE1512: &str = "XTTE1512";
    pub const XTTE1540: &str = "XTTE1540";
    pub const XTTE1555: &str = "XTTE1555";
    pub const XTTE3090: &str = "XTTE3090";

    pub const FOAR0001: &str = "FOAR0001";
    pub const FOAR0002: &str = "FOAR0002";
    pub const FOCA0002: &str = "FOCA0002";
    pub const FOER0000: &str = "FOER0000";
    pub const FOJS0001: &str = "FOJS0001";
    pub const FORG0001: &str = "FORG0001";
    pub const FORG0006: &str = "FORG0006";
    pub const FORX0001: &str = "FORX0001";
    pub const FORX0002: &str = "FORX0002";
    pub const XTDE0050: &str = "XTDE0050";
    pub const XTDE0700: &str = "XTDE0700";
    pub const XTDE0820: &str = "XTDE0820";
    pub const XTDE0830: &str = "XTDE0830";
    pub const XTDE0850: &str = "XTDE0850";
    pub const XTDE0855: &str = "XTDE0855";
    pub const XTDE0860: &str = "XTDE0860";
    pub const XTDE1150: &str = "XTDE1150";
    pub const XTDE1460: &str = "XTDE1460";
    pub const XTDE1480: &str = "XTDE1480";
    pub const XTDE1490: &str = "XTDE1490";
    pub const XTDE1500: &str = "XTDE1500";
    pub const XTMM9000: &str = "XTMM9000";
    pub const XTDE0640: &str = "XTDE0640";
    pub const XPDY0002: &str = "XPDY0002";
    pub const FOTY0013: &str = "FOTY0013";

    pub const FODC0002: &str = "FODC0002";
    pub const FODC0005: &str = "FODC0005";

    pub const XTDE1061: &str = "XTDE1061";
    pub const XTDE1071: &str = "XTDE1071";
    pub const XTDE3480: &str = "XTDE3480";
    pub const XTDE3490: &str = "XTDE3490";
}
