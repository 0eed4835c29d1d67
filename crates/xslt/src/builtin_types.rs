//! Lexical checks for the XSD built-in simple types.
//!
//! Used for `type="xs:..."` on constructed nodes when no schema model is
//! attached, and as the base-type check of user-defined simple types.

use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::LazyLock;
use weft_traits::InvalidValue;
use weft_types::{QName, XS_NAMESPACE, is_ncname, parse_xs_double};

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?\d{4,}-(0[1-9]|1[0-2])-(0[1-9]|[12]\d|3[01])(Z|[+-]\d{2}:\d{2})?$")
        .expect("BUG: invalid DATE_RE regex literal")
});

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([01]\d|2[0-3]):[0-5]\d:[0-5]\d(\.\d+)?(Z|[+-]\d{2}:\d{2})?$|^24:00:00(\.0+)?(Z|[+-]\d{2}:\d{2})?$")
        .expect("BUG: invalid TIME_RE regex literal")
});

static DATETIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^-?\d{4,}-(0[1-9]|1[0-2])-(0[1-9]|[12]\d|3[01])T([01]\d|2[0-3]):[0-5]\d:[0-5]\d(\.\d+)?(Z|[+-]\d{2}:\d{2})?$",
    )
    .expect("BUG: invalid DATETIME_RE regex literal")
});

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?P(\d+Y)?(\d+M)?(\d+D)?(T(\d+H)?(\d+M)?(\d+(\.\d+)?S)?)?$")
        .expect("BUG: invalid DURATION_RE regex literal")
});

static LANGUAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z]{1,8}(-[a-zA-Z0-9]{1,8})*$")
        .expect("BUG: invalid LANGUAGE_RE regex literal")
});

pub fn is_builtin(type_name: &QName) -> bool {
    type_name.has_namespace(XS_NAMESPACE) && check(&type_name.local, "").is_some()
}

/// Checks `value` against a built-in type. `None` if `type_name` is not a
/// built-in type this checker knows.
pub fn validate_builtin(type_name: &QName, value: &str) -> Option<Result<(), InvalidValue>> {
    if !type_name.has_namespace(XS_NAMESPACE) {
        return None;
    }
    check(&type_name.local, value)
        .map(|outcome| outcome.map_err(|reason| InvalidValue::new(value, type_name, reason)))
}

fn check(local: &str, value: &str) -> Option<Result<(), String>> {
    let collapsed = value.trim();
    let outcome = match local {
        "string" | "anySimpleType" | "untypedAtomic" | "anyAtomicType" => Ok(()),
        "normalizedString" => expect(
            !value.contains(['\n', '\r', '\t']),
            "contains line breaks or tabs",
        ),
        "token" => expect(
            !value.contains(['\n', '\r', '\t'])
                && value == collapsed
                && !value.contains("  "),
            "not a whitespace-collapsed token",
        ),
        "boolean" => expect(
            matches!(collapsed, "true" | "false" | "1" | "0"),
            "expected true, false, 1 or 0",
        ),
        "decimal" => expect(
            is_decimal_lexical(collapsed) && Decimal::from_str(collapsed).is_ok(),
            "not a decimal number",
        ),
        "integer" | "long" | "int" | "short" | "byte" | "nonNegativeInteger"
        | "positiveInteger" | "nonPositiveInteger" | "negativeInteger" | "unsignedLong"
        | "unsignedInt" | "unsignedShort" | "unsignedByte" => integer_in_range(local, collapsed),
        "double" | "float" => expect(parse_xs_double(collapsed).is_some(), "not a number"),
        "date" => expect(DATE_RE.is_match(collapsed), "not an xs:date"),
        "time" => expect(TIME_RE.is_match(collapsed), "not an xs:time"),
        "dateTime" => expect(DATETIME_RE.is_match(collapsed), "not an xs:dateTime"),
        "duration" => expect(
            DURATION_RE.is_match(collapsed)
                && !collapsed.ends_with('P')
                && !collapsed.ends_with('T'),
            "not an xs:duration",
        ),
        "anyURI" => expect(!collapsed.contains(' '), "contains spaces"),
        "QName" => expect(QName::split_lexical(collapsed).is_ok(), "not a lexical QName"),
        "NCName" | "ID" | "IDREF" => expect(is_ncname(collapsed), "not an NCName"),
        "Name" => expect(
            collapsed
                .split(':')
                .all(|part| part.is_empty() || is_ncname(part))
                && !collapsed.is_empty(),
            "not an XML name",
        ),
        "NMTOKEN" => expect(
            !collapsed.is_empty()
                && collapsed
                    .chars()
                    .all(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | ':')),
            "not a name token",
        ),
        "language" => expect(LANGUAGE_RE.is_match(collapsed), "not a language tag"),
        _ => return None,
    };
    Some(outcome)
}

fn expect(ok: bool, reason: &str) -> Result<(), String> {
    if ok { Ok(()) } else { Err(reason.to_string()) }
}

fn is_decimal_lexical(s: &str) -> bool {
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    let mut seen_digit = false;
    let mut seen_dot = false;
    for c in digits.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return false,
        }
    }
    seen_digit
}

fn integer_in_range(local: &str, s: &str) -> Result<(), String> {
    let digits = s.strip_prefix('+').unwrap_or(s);
    if digits.is_empty() || !digits.trim_start_matches('-').chars().all(|c| c.is_ascii_digit()) {
        return Err("not an integer".to_string());
    }
    let n: i128 = digits
        .parse()
        .map_err(|_| "integer out of range".to_string())?;
    let (min, max): (i128, i128) = match local {
        "long" => (i64::MIN.into(), i64::MAX.into()),
        "int" => (i32::MIN.into(), i32::MAX.into()),
        "short" => (i16::MIN.into(), i16::MAX.into()),
        "byte" => (i8::MIN.into(), i8::MAX.into()),
        "nonNegativeInteger" => (0, i128::MAX),
        "positiveInteger" => (1, i128::MAX),
        "nonPositiveInteger" => (i128::MIN, 0),
        "negativeInteger" => (i128::MIN, -1),
        "unsignedLong" => (0, u64::MAX.into()),
        "unsignedInt" => (0, u32::MAX.into()),
        "unsignedShort" => (0, u16::MAX.into()),
        "unsignedByte" => (0, u8::MAX.into()),
        _ => (i128::MIN, i128::MAX),
    };
    expect((min..=max).contains(&n), &format!("out of range for xs:{local}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid(local: &str, value: &str) -> bool {
        matches!(validate_builtin(&QName::xs(local), value), Some(Ok(())))
    }

    #[test]
    fn numeric_types() {
        assert!(valid("integer", " 42 "));
        assert!(valid("integer", "-7"));
        assert!(!valid("integer", "4.2"));
        assert!(!valid("byte", "128"));
        assert!(valid("unsignedByte", "255"));
        assert!(!valid("positiveInteger", "0"));
        assert!(valid("decimal", "-1.50"));
        assert!(!valid("decimal", "1e3"));
        assert!(valid("double", "1e3"));
        assert!(valid("double", "INF"));
        assert!(!valid("double", "abc"));
    }

    #[test]
    fn date_and_time_types() {
        assert!(valid("date", "2024-02-29"));
        assert!(valid("date", "2024-02-29Z"));
        assert!(!valid("date", "2024-13-01"));
        assert!(valid("time", "23:59:59.5"));
        assert!(!valid("time", "25:00:00"));
        assert!(valid("dateTime", "2024-01-01T10:00:00+01:00"));
        assert!(valid("duration", "P1Y2M3DT4H"));
        assert!(!valid("duration", "P"));
        assert!(!valid("duration", "P1DT"));
    }

    #[test]
    fn name_types() {
        assert!(valid("NCName", "abc"));
        assert!(!valid("NCName", "a:b"));
        assert!(valid("QName", "a:b"));
        assert!(valid("language", "en-GB"));
        assert!(valid("boolean", "1"));
        assert!(!valid("boolean", "yes"));
    }

    #[test]
    fn unknown_types_are_not_builtin() {
        assert!(validate_builtin(&QName::xs("frobnicate"), "x").is_none());
        assert!(validate_builtin(&QName::local("integer"), "1").is_none());
        assert!(is_builtin(&QName::xs("date")));
    }

    #[test]
    fn failure_carries_value_and_type() {
        let err = validate_builtin(&QName::xs("integer"), "x")
            .and_then(Result::err)
            .expect("integer check fails");
        assert_eq!(err.value, "x");
        assert!(err.type_name.contains("integer"));
    }
}
