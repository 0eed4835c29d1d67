use crate::error::{XsltError, codes};
use crate::expression::XPathContext;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::cmp::Ordering;
use weft_types::{AtomicValue, XdmValue, parse_xs_double};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    IntegerDivide,
    Modulo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparisonOp {
    fn test(self, ordering: Option<Ordering>) -> bool {
        match self {
            ComparisonOp::Eq => ordering == Some(Ordering::Equal),
            ComparisonOp::Ne => ordering != Some(Ordering::Equal),
            ComparisonOp::Lt => ordering == Some(Ordering::Less),
            ComparisonOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            ComparisonOp::Gt => ordering == Some(Ordering::Greater),
            ComparisonOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        }
    }
}

enum Number {
    Integer(i64),
    Decimal(Decimal),
    Double(f64),
}

fn number(value: &AtomicValue) -> Result<Number, XsltError> {
    match value {
        AtomicValue::Integer(i) => Ok(Number::Integer(*i)),
        AtomicValue::Decimal(d) => Ok(Number::Decimal(*d)),
        AtomicValue::Double(d) => Ok(Number::Double(*d)),
        AtomicValue::UntypedAtomic(s) => parse_xs_double(s).map(Number::Double).ok_or_else(|| {
            XsltError::dynamic(codes::FORG0001, format!("cannot convert '{s}' to xs:double"))
        }),
        other => Err(XsltError::type_error(
            codes::XPTY0004,
            format!("arithmetic is not defined for {}", other.type_name()),
        )),
    }
}

fn overflow() -> XsltError {
    XsltError::dynamic(codes::FOAR0002, "numeric overflow")
}

fn division_by_zero() -> XsltError {
    XsltError::dynamic(codes::FOAR0001, "division by zero")
}

/// The single atomized item of `value`, or `None` for the empty sequence.
pub(super) fn single_atomic(
    ctx: &XPathContext<'_>,
    value: &XdmValue,
) -> Result<Option<AtomicValue>, XsltError> {
    let mut atoms = ctx.atomize(value);
    match atoms.len() {
        0 => Ok(None),
        1 => Ok(atoms.pop()),
        n => Err(XsltError::type_error(
            codes::XPTY0004,
            format!("expected at most one item, got {n}"),
        )),
    }
}

pub(super) fn single_integer(
    ctx: &XPathContext<'_>,
    value: &XdmValue,
) -> Result<Option<i64>, XsltError> {
    match single_atomic(ctx, value)? {
        None => Ok(None),
        Some(atom) => atom.as_integer().map(Some).ok_or_else(|| {
            XsltError::type_error(
                codes::XPTY0004,
                format!("expected an integer, got {}", atom.type_name()),
            )
        }),
    }
}

pub(super) fn arithmetic(
    op: ArithmeticOp,
    left: &AtomicValue,
    right: &AtomicValue,
) -> Result<AtomicValue, XsltError> {
    match (number(left)?, number(right)?) {
        (Number::Integer(l), Number::Integer(r)) => integer_op(op, l, r),
        (Number::Double(l), r) => double_op(op, l, to_f64(&r)),
        (l, Number::Double(r)) => double_op(op, to_f64(&l), r),
        (l, r) => decimal_op(op, to_decimal(&l)?, to_decimal(&r)?),
    }
}

fn to_f64(n: &Number) -> f64 {
    match n {
        Number::Integer(i) => *i as f64,
        Number::Decimal(d) => d.to_f64().unwrap_or(f64::NAN),
        Number::Double(d) => *d,
    }
}

fn to_decimal(n: &Number) -> Result<Decimal, XsltError> {
    match n {
        Number::Integer(i) => Ok(Decimal::from(*i)),
        Number::Decimal(d) => Ok(*d),
        Number::Double(d) => Decimal::from_f64(*d).ok_or_else(overflow),
    }
}

fn integer_op(op: ArithmeticOp, l: i64, r: i64) -> Result<AtomicValue, XsltError> {
    let result = match op {
        ArithmeticOp::Add => l.checked_add(r),
        ArithmeticOp::Subtract => l.checked_sub(r),
        ArithmeticOp::Multiply => l.checked_mul(r),
        ArithmeticOp::Divide => {
            if r == 0 {
                return Err(division_by_zero());
            }
            return decimal_op(op, Decimal::from(l), Decimal::from(r));
        }
        ArithmeticOp::IntegerDivide | ArithmeticOp::Modulo if r == 0 => {
            return Err(division_by_zero());
        }
        ArithmeticOp::IntegerDivide => l.checked_div(r),
        ArithmeticOp::Modulo => l.checked_rem(r),
    };
    result.map(AtomicValue::Integer).ok_or_else(overflow)
}

fn decimal_op(op: ArithmeticOp, l: Decimal, r: Decimal) -> Result<AtomicValue, XsltError> {
    if r.is_zero()
        && matches!(
            op,
            ArithmeticOp::Divide | ArithmeticOp::IntegerDivide | ArithmeticOp::Modulo
        )
    {
        return Err(division_by_zero());
    }
    let result = match op {
        ArithmeticOp::Add => l.checked_add(r),
        ArithmeticOp::Subtract => l.checked_sub(r),
        ArithmeticOp::Multiply => l.checked_mul(r),
        ArithmeticOp::Divide => l.checked_div(r),
        ArithmeticOp::Modulo => l.checked_rem(r),
        ArithmeticOp::IntegerDivide => {
            let quotient = l.checked_div(r).ok_or_else(overflow)?;
            let integer = quotient.trunc().to_i64().ok_or_else(overflow)?;
            return Ok(AtomicValue::Integer(integer));
        }
    };
    result
        .map(|d| AtomicValue::Decimal(d.normalize()))
        .ok_or_else(overflow)
}

fn double_op(op: ArithmeticOp, l: f64, r: f64) -> Result<AtomicValue, XsltError> {
    let result = match op {
        ArithmeticOp::Add => l + r,
        ArithmeticOp::Subtract => l - r,
        ArithmeticOp::Multiply => l * r,
        ArithmeticOp::Divide => l / r,
        ArithmeticOp::Modulo => l % r,
        ArithmeticOp::IntegerDivide => {
            if r == 0.0 {
                return Err(division_by_zero());
            }
            let quotient = (l / r).trunc();
            if !quotient.is_finite() || quotient.abs() >= i64::MAX as f64 {
                return Err(overflow());
            }
            return Ok(AtomicValue::Integer(quotient as i64));
        }
    };
    Ok(AtomicValue::Double(result))
}

pub(super) fn negate(value: &AtomicValue) -> Result<AtomicValue, XsltError> {
    match number(value)? {
        Number::Integer(i) => i.checked_neg().map(AtomicValue::Integer).ok_or_else(overflow),
        Number::Decimal(d) => Ok(AtomicValue::Decimal(-d)),
        Number::Double(d) => Ok(AtomicValue::Double(-d)),
    }
}

/// Compares two atomic values. Untyped values adopt the type of the other
/// operand when it is numeric, and compare as strings otherwise.
pub(super) fn compare(
    op: ComparisonOp,
    left: &AtomicValue,
    right: &AtomicValue,
) -> Result<bool, XsltError> {
    use AtomicValue as A;
    let ordering = match (left, right) {
        (l, r) if l.is_numeric() && r.is_numeric() => numeric_order(l, r)?,
        (l, A::UntypedAtomic(_)) if l.is_numeric() => numeric_order(l, right)?,
        (A::UntypedAtomic(_), r) if r.is_numeric() => numeric_order(left, r)?,
        (l, r) if l.is_string_like() && r.is_string_like() => {
            Some(l.to_string_value().cmp(&r.to_string_value()))
        }
        (A::Boolean(l), A::Boolean(r)) => Some(l.cmp(r)),
        (A::Boolean(l), A::UntypedAtomic(s)) | (A::UntypedAtomic(s), A::Boolean(l)) => {
            let other = matches!(s.trim(), "true" | "1");
            let ord = if matches!(left, A::Boolean(_)) {
                l.cmp(&other)
            } else {
                other.cmp(l)
            };
            Some(ord)
        }
        (A::QName(l), A::QName(r)) => {
            if !matches!(op, ComparisonOp::Eq | ComparisonOp::Ne) {
                return Err(incomparable(left, right));
            }
            Some(if l == r { Ordering::Equal } else { Ordering::Less })
        }
        (l, r) if l.type_name() == r.type_name() => {
            Some(l.to_string_value().cmp(&r.to_string_value()))
        }
        _ => return Err(incomparable(left, right)),
    };
    Ok(op.test(ordering))
}

fn numeric_order(left: &AtomicValue, right: &AtomicValue) -> Result<Option<Ordering>, XsltError> {
    match (number(left)?, number(right)?) {
        (Number::Integer(l), Number::Integer(r)) => Ok(Some(l.cmp(&r))),
        (Number::Double(l), r) => Ok(l.partial_cmp(&to_f64(&r))),
        (l, Number::Double(r)) => Ok(to_f64(&l).partial_cmp(&r)),
        (l, r) => Ok(Some(to_decimal(&l)?.cmp(&to_decimal(&r)?))),
    }
}

fn incomparable(left: &AtomicValue, right: &AtomicValue) -> XsltError {
    XsltError::type_error(
        codes::XPTY0004,
        format!(
            "cannot compare {} with {}",
            left.type_name(),
            right.type_name()
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_overflow_is_reported() {
        let err = arithmetic(
            ArithmeticOp::Multiply,
            &AtomicValue::Integer(i64::MAX),
            &AtomicValue::Integer(2),
        )
        .unwrap_err();
        assert!(err.has_code(codes::FOAR0002));
    }

    #[test]
    fn untyped_operands_become_doubles() {
        let sum = arithmetic(
            ArithmeticOp::Add,
            &AtomicValue::UntypedAtomic("1.5".into()),
            &AtomicValue::Integer(1),
        )
        .unwrap();
        assert_eq!(sum, AtomicValue::Double(2.5));
        assert!(
            arithmetic(ArithmeticOp::Add, &AtomicValue::from("x"), &AtomicValue::Integer(1))
                .unwrap_err()
                .has_code(codes::XPTY0004)
        );
    }

    #[test]
    fn nan_compares_unequal() {
        let nan = AtomicValue::Double(f64::NAN);
        assert!(!compare(ComparisonOp::Eq, &nan, &nan).unwrap());
        assert!(compare(ComparisonOp::Ne, &nan, &nan).unwrap());
    }

    #[test]
    fn strings_and_numbers_do_not_mix() {
        let err = compare(
            ComparisonOp::Eq,
            &AtomicValue::from("1"),
            &AtomicValue::Integer(1),
        )
        .unwrap_err();
        assert!(err.has_code(codes::XPTY0004));
        assert!(
            compare(
                ComparisonOp::Lt,
                &AtomicValue::UntypedAtomic("2".into()),
                &AtomicValue::Integer(10)
            )
            .unwrap()
        );
    }
}
