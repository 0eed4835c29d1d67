//! Normalized grouping and merge keys.
//!
//! Atomic values compare across types the way grouping needs: every numeric type
//! collapses to an IEEE double, untyped values compare as strings, QNames by
//! expanded name. Values without a cheap total order (dates, durations, URIs) are
//! compared on their lexical form within their own type.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use weft_types::AtomicValue;

#[derive(Debug, Clone)]
pub enum ComparableKey {
    Boolean(bool),
    Number(f64),
    String(String),
    QName(String),
    Opaque {
        type_name: &'static str,
        lexical: String,
    },
}

impl ComparableKey {
    pub fn from_atomic(value: &AtomicValue) -> Self {
        match value {
            AtomicValue::Boolean(b) => ComparableKey::Boolean(*b),
            AtomicValue::Integer(_) | AtomicValue::Decimal(_) | AtomicValue::Double(_) => {
                ComparableKey::Number(normalize(value.to_double()))
            }
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) => {
                ComparableKey::String(s.clone())
            }
            AtomicValue::QName(q) => {
                ComparableKey::QName(format!("{}:{}", q.local, q.namespace_uri()))
            }
            other => ComparableKey::Opaque {
                type_name: other.type_name(),
                lexical: other.to_string_value(),
            },
        }
    }

    fn rank(&self) -> u8 {
        match self {
            ComparableKey::Boolean(_) => 0,
            ComparableKey::Number(_) => 1,
            ComparableKey::String(_) => 2,
            ComparableKey::QName(_) => 3,
            ComparableKey::Opaque { .. } => 4,
        }
    }
}

fn normalize(d: f64) -> f64 {
    if d.is_nan() {
        f64::NAN
    } else if d == 0.0 {
        0.0
    } else {
        d
    }
}

impl PartialEq for ComparableKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ComparableKey {}

impl PartialOrd for ComparableKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ComparableKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (ComparableKey::Boolean(a), ComparableKey::Boolean(b)) => a.cmp(b),
            (ComparableKey::Number(a), ComparableKey::Number(b)) => a.total_cmp(b),
            (ComparableKey::String(a), ComparableKey::String(b))
            | (ComparableKey::QName(a), ComparableKey::QName(b)) => a.cmp(b),
            (
                ComparableKey::Opaque {
                    type_name: ta,
                    lexical: la,
                },
                ComparableKey::Opaque {
                    type_name: tb,
                    lexical: lb,
                },
            ) => ta.cmp(tb).then_with(|| la.cmp(lb)),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for ComparableKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            ComparableKey::Boolean(b) => b.hash(state),
            ComparableKey::Number(d) => d.to_bits().hash(state),
            ComparableKey::String(s) | ComparableKey::QName(s) => s.hash(state),
            ComparableKey::Opaque { type_name, lexical } => {
                type_name.hash(state);
                lexical.hash(state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::collections::HashSet;
    use weft_types::QName;

    #[test]
    fn numerics_compare_across_types() {
        let int = ComparableKey::from_atomic(&AtomicValue::Integer(2));
        let dec = ComparableKey::from_atomic(&AtomicValue::Decimal(Decimal::new(20, 1)));
        let dbl = ComparableKey::from_atomic(&AtomicValue::Double(2.0));
        assert_eq!(int, dec);
        assert_eq!(dec, dbl);

        let set: HashSet<_> = [int, dec, dbl].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn zero_and_nan_are_canonical() {
        assert_eq!(
            ComparableKey::from_atomic(&AtomicValue::Double(-0.0)),
            ComparableKey::from_atomic(&AtomicValue::Integer(0))
        );
        assert_eq!(
            ComparableKey::from_atomic(&AtomicValue::Double(f64::NAN)),
            ComparableKey::from_atomic(&AtomicValue::Double(-f64::NAN))
        );
    }

    #[test]
    fn untyped_matches_string() {
        assert_eq!(
            ComparableKey::from_atomic(&AtomicValue::UntypedAtomic("a".into())),
            ComparableKey::from_atomic(&AtomicValue::from("a"))
        );
    }

    #[test]
    fn qnames_ignore_prefix() {
        let a = ComparableKey::from_atomic(&AtomicValue::QName(QName::prefixed("a", "urn:x", "n")));
        let b = ComparableKey::from_atomic(&AtomicValue::QName(QName::prefixed("b", "urn:x", "n")));
        assert_eq!(a, b);
    }

    #[test]
    fn ordering_is_natural_within_a_type() {
        let mut keys: Vec<_> = [3, 1, 2]
            .into_iter()
            .map(|i| ComparableKey::from_atomic(&AtomicValue::Integer(i)))
            .collect();
        keys.sort();
        assert_eq!(keys[0], ComparableKey::Number(1.0));
        assert_eq!(keys[2], ComparableKey::Number(3.0));
    }
}
