//! Built-in functions of the expression subset.

use super::CoreExpr;
use super::ops::{self, ArithmeticOp};
use crate::error::{XsltError, codes};
use crate::expression::{XPathContext, bool_coerce};
use weft_types::{AtomicValue, QName, XdmItem, XdmValue, parse_xs_double};

/// Accepted argument counts, inclusive; `None` means unbounded.
fn arity(name: &str) -> Option<(usize, Option<usize>)> {
    let range = match name {
        "current-group" | "current-grouping-key" | "current-merge-key" | "position" | "last"
        | "true" | "false" => (0, Some(0)),
        "current-merge-group" | "string" | "number" | "name" | "local-name" | "string-length" => {
            (0, Some(1))
        }
        "regex-group" | "count" | "not" | "boolean" | "sum" | "empty" | "exists" | "data" => {
            (1, Some(1))
        }
        "string-join" => (1, Some(2)),
        "concat" => (2, None),
        "contains" | "QName" => (2, Some(2)),
        "error" => (0, Some(3)),
        _ => return None,
    };
    Some(range)
}

pub(super) fn check_arity(name: &str, count: usize) -> Result<(), XsltError> {
    match arity(name) {
        Some((min, max)) if count >= min && max.is_none_or(|max| count <= max) => Ok(()),
        Some(_) => Err(XsltError::static_error(
            codes::XPST0017,
            format!("{name}() does not accept {count} argument(s)"),
        )),
        None => Err(XsltError::static_error(
            codes::XPST0017,
            format!("unknown function {name}#{count}"),
        )),
    }
}

fn optional_string(ctx: &XPathContext<'_>, value: &XdmValue) -> Result<String, XsltError> {
    Ok(ops::single_atomic(ctx, value)?
        .map(|a| a.to_string_value())
        .unwrap_or_default())
}

/// The argument, or the context item when the argument is omitted.
fn argument_or_context(
    args: &[CoreExpr],
    ctx: &XPathContext<'_>,
) -> Result<XdmValue, XsltError> {
    match args.first() {
        Some(arg) => arg.evaluate(ctx),
        None => Ok(XdmValue::from(ctx.context_item()?.clone())),
    }
}

fn node_name(
    args: &[CoreExpr],
    ctx: &XPathContext<'_>,
    render: impl Fn(&QName) -> String,
) -> Result<XdmValue, XsltError> {
    let value = argument_or_context(args, ctx)?;
    let name = match value.single() {
        None if value.is_empty() => None,
        Some(XdmItem::Node(node)) => ctx.dtm().name(*node),
        _ => {
            return Err(XsltError::type_error(
                codes::XPTY0004,
                "expected a single node",
            ));
        }
    };
    Ok(XdmValue::string(name.map(|n| render(&n)).unwrap_or_default()))
}

fn to_number(atom: Option<AtomicValue>) -> f64 {
    match atom {
        Some(a) if a.is_numeric() => a.to_double(),
        Some(AtomicValue::Boolean(b)) => f64::from(u8::from(b)),
        Some(a) => parse_xs_double(&a.to_string_value()).unwrap_or(f64::NAN),
        None => f64::NAN,
    }
}

fn error_code(ctx: &XPathContext<'_>, value: &XdmValue) -> Result<QName, XsltError> {
    match ops::single_atomic(ctx, value)? {
        None => Ok(QName::error_code(codes::FOER0000)),
        Some(AtomicValue::QName(q)) => Ok(q),
        Some(other) => ctx
            .namespaces()
            .resolve(&other.to_string_value(), None)
            .map_err(|e| XsltError::type_error(codes::XPTY0004, e.message().to_string())),
    }
}

pub(super) fn call(
    name: &str,
    args: &[CoreExpr],
    ctx: &XPathContext<'_>,
) -> Result<XdmValue, XsltError> {
    let arg = |i: usize| -> Result<XdmValue, XsltError> {
        args.get(i)
            .map(|a| a.evaluate(ctx))
            .unwrap_or_else(|| Ok(XdmValue::empty()))
    };
    match name {
        "current-group" => ctx.current_group(),
        "current-grouping-key" => ctx.current_grouping_key(),
        "current-merge-key" => ctx.current_merge_key(),
        "current-merge-group" => {
            if args.is_empty() {
                ctx.current_merge_group(None)
            } else {
                let source = optional_string(ctx, &arg(0)?)?;
                ctx.current_merge_group(Some(&source))
            }
        }
        "regex-group" => {
            let n = ops::single_integer(ctx, &arg(0)?)?.unwrap_or(0);
            let group = usize::try_from(n).map(|n| ctx.regex_group(n));
            Ok(XdmValue::string(group.unwrap_or_default()))
        }
        "position" => Ok(XdmValue::integer(ctx.position() as i64)),
        "last" => Ok(XdmValue::integer(ctx.size() as i64)),
        "true" => Ok(XdmValue::boolean(true)),
        "false" => Ok(XdmValue::boolean(false)),
        "not" => Ok(XdmValue::boolean(!bool_coerce(&arg(0)?)?)),
        "boolean" => Ok(XdmValue::boolean(bool_coerce(&arg(0)?)?)),
        "string" => {
            let value = argument_or_context(args, ctx)?;
            match value.len() {
                0 => Ok(XdmValue::string("")),
                1 => Ok(XdmValue::string(ctx.string_join(&value, ""))),
                _ => Err(XsltError::type_error(
                    codes::XPTY0004,
                    "string() expects at most one item",
                )),
            }
        }
        "data" => Ok(ctx
            .atomize(&arg(0)?)
            .into_iter()
            .map(XdmItem::Atomic)
            .collect()),
        "concat" => {
            let mut out = String::new();
            for a in args {
                out.push_str(&optional_string(ctx, &a.evaluate(ctx)?)?);
            }
            Ok(XdmValue::string(out))
        }
        "string-join" => {
            let separator = optional_string(ctx, &arg(1)?)?;
            let parts: Vec<String> = ctx
                .atomize(&arg(0)?)
                .iter()
                .map(AtomicValue::to_string_value)
                .collect();
            Ok(XdmValue::string(parts.join(&separator)))
        }
        "string-length" => {
            let value = argument_or_context(args, ctx)?;
            let s = optional_string(ctx, &value)?;
            Ok(XdmValue::integer(s.chars().count() as i64))
        }
        "contains" => {
            let haystack = optional_string(ctx, &arg(0)?)?;
            let needle = optional_string(ctx, &arg(1)?)?;
            Ok(XdmValue::boolean(haystack.contains(&needle)))
        }
        "count" => Ok(XdmValue::integer(arg(0)?.len() as i64)),
        "empty" => Ok(XdmValue::boolean(arg(0)?.is_empty())),
        "exists" => Ok(XdmValue::boolean(!arg(0)?.is_empty())),
        "number" => {
            let value = argument_or_context(args, ctx)?;
            let atom = ops::single_atomic(ctx, &value)?;
            Ok(XdmValue::from(AtomicValue::Double(to_number(atom))))
        }
        "sum" => {
            let mut total = AtomicValue::Integer(0);
            for atom in ctx.atomize(&arg(0)?) {
                total = ops::arithmetic(ArithmeticOp::Add, &total, &atom)?;
            }
            Ok(XdmValue::from(total))
        }
        "name" => node_name(args, ctx, QName::lexical),
        "local-name" => node_name(args, ctx, |q| q.local.clone()),
        "QName" => {
            let uri = optional_string(ctx, &arg(0)?)?;
            let lexical = optional_string(ctx, &arg(1)?)?;
            let (prefix, local) = QName::split_lexical(&lexical).map_err(|e| {
                XsltError::dynamic(codes::FOCA0002, e.to_string())
            })?;
            let name = match (prefix, uri.is_empty()) {
                (Some(p), false) => QName::prefixed(p, &uri, local),
                (None, false) => QName::new(Some(&uri), local),
                (None, true) => QName::local(local),
                (Some(_), true) => {
                    return Err(XsltError::dynamic(
                        codes::FOCA0002,
                        format!("prefixed name '{lexical}' needs a namespace URI"),
                    ));
                }
            };
            Ok(XdmValue::from(AtomicValue::QName(name)))
        }
        "error" => {
            let code = error_code(ctx, &arg(0)?)?;
            let description = match args.get(1) {
                Some(d) => optional_string(ctx, &d.evaluate(ctx)?)?,
                None => format!("error() raised {}", code.lexical()),
            };
            let object = match args.get(2) {
                Some(o) => Some(o.evaluate(ctx)?),
                None => None,
            };
            Err(XsltError::user(code, description, object))
        }
        other => Err(XsltError::static_error(
            codes::XPST0017,
            format!("unknown function {other}#{}", args.len()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_table() {
        assert!(check_arity("concat", 5).is_ok());
        assert!(check_arity("concat", 1).is_err());
        assert!(check_arity("current-merge-group", 1).is_ok());
        assert!(check_arity("current-merge-group", 2).is_err());
        assert!(check_arity("error", 3).is_ok());
        assert!(check_arity("format-number", 2).unwrap_err().has_code(codes::XPST0017));
    }

    #[test]
    fn number_conversion() {
        assert_eq!(to_number(Some(AtomicValue::from("2.5"))), 2.5);
        assert!(to_number(Some(AtomicValue::from("x"))).is_nan());
        assert!(to_number(None).is_nan());
        assert_eq!(to_number(Some(AtomicValue::Boolean(true))), 1.0);
    }
}
