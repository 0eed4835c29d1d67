use crate::qname::QName;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum AtomicValue {
    String(String),
    UntypedAtomic(String),
    Boolean(bool),
    Integer(i64),
    Decimal(Decimal),
    Double(f64),
    Date(String),
    DateTime(String),
    Time(String),
    Duration(String),
    AnyUri(String),
    QName(QName),
}

impl AtomicValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            AtomicValue::String(_) => "xs:string",
            AtomicValue::UntypedAtomic(_) => "xs:untypedAtomic",
            AtomicValue::Boolean(_) => "xs:boolean",
            AtomicValue::Integer(_) => "xs:integer",
            AtomicValue::Decimal(_) => "xs:decimal",
            AtomicValue::Double(_) => "xs:double",
            AtomicValue::Date(_) => "xs:date",
            AtomicValue::DateTime(_) => "xs:dateTime",
            AtomicValue::Time(_) => "xs:time",
            AtomicValue::Duration(_) => "xs:duration",
            AtomicValue::AnyUri(_) => "xs:anyURI",
            AtomicValue::QName(_) => "xs:QName",
        }
    }

    pub fn to_string_value(&self) -> String {
        match self {
            AtomicValue::String(s)
            | AtomicValue::UntypedAtomic(s)
            | AtomicValue::Date(s)
            | AtomicValue::DateTime(s)
            | AtomicValue::Time(s)
            | AtomicValue::Duration(s)
            | AtomicValue::AnyUri(s) => s.clone(),
            AtomicValue::Boolean(b) => if *b { "true" } else { "false" }.to_string(),
            AtomicValue::Integer(i) => i.to_string(),
            AtomicValue::Decimal(d) => d.normalize().to_string(),
            AtomicValue::Double(d) => format_double(*d),
            AtomicValue::QName(q) => q.lexical(),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            AtomicValue::Integer(_) | AtomicValue::Decimal(_) | AtomicValue::Double(_)
        )
    }

    pub fn is_string_like(&self) -> bool {
        matches!(
            self,
            AtomicValue::String(_) | AtomicValue::UntypedAtomic(_) | AtomicValue::AnyUri(_)
        )
    }

    /// Numeric value as a double; NaN for values with no numeric interpretation.
    pub fn to_double(&self) -> f64 {
        match self {
            AtomicValue::Double(d) => *d,
            AtomicValue::Integer(i) => *i as f64,
            AtomicValue::Decimal(d) => d.to_f64().unwrap_or(f64::NAN),
            AtomicValue::Boolean(b) => f64::from(u8::from(*b)),
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) => {
                parse_xs_double(s).unwrap_or(f64::NAN)
            }
            _ => f64::NAN,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AtomicValue::Integer(i) => Some(*i),
            AtomicValue::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            AtomicValue::Double(d) if d.is_finite() && d.fract() == 0.0 => Some(*d as i64),
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for AtomicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_value())
    }
}

impl From<&str> for AtomicValue {
    fn from(s: &str) -> Self {
        AtomicValue::String(s.to_string())
    }
}

impl From<String> for AtomicValue {
    fn from(s: String) -> Self {
        AtomicValue::String(s)
    }
}

impl From<i64> for AtomicValue {
    fn from(i: i64) -> Self {
        AtomicValue::Integer(i)
    }
}

impl From<f64> for AtomicValue {
    fn from(d: f64) -> Self {
        AtomicValue::Double(d)
    }
}

impl From<bool> for AtomicValue {
    fn from(b: bool) -> Self {
        AtomicValue::Boolean(b)
    }
}

/// Canonical XPath string form of a double.
pub fn format_double(d: f64) -> String {
    if d.is_nan() {
        "NaN".to_string()
    } else if d.is_infinite() {
        if d > 0.0 { "INF" } else { "-INF" }.to_string()
    } else if d == 0.0 {
        if d.is_sign_negative() { "-0" } else { "0" }.to_string()
    } else if d.fract() == 0.0 && d.abs() < 1e15 {
        format!("{}", d as i64)
    } else {
        d.to_string()
    }
}

/// Parses the `xs:double` lexical space, including `INF`, `-INF` and `NaN`.
pub fn parse_xs_double(s: &str) -> Option<f64> {
    match s.trim() {
        "INF" | "+INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        t if t.eq_ignore_ascii_case("inf") || t.eq_ignore_ascii_case("nan") => None,
        t => t.parse().ok(),
    }
}
