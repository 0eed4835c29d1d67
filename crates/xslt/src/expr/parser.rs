//! A `nom`-based parser for the expression subset.

use super::{ArithmeticOp, Axis, ComparisonOp, CoreExpr, NodeTest};
use crate::error::{XsltError, codes};
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, digit0, digit1, multispace0, one_of, satisfy},
    combinator::{map, map_res, not, opt, peek, recognize, value},
    multi::{many0, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated},
};
use rust_decimal::Decimal;
use std::str::FromStr;
use weft_types::{AtomicValue, QName};

pub(super) fn parse_expression(input: &str) -> Result<CoreExpr, XsltError> {
    match expr(input) {
        Ok((rest, parsed)) if rest.trim().is_empty() => Ok(parsed),
        Ok((rest, _)) => Err(XsltError::static_error(
            codes::XPST0003,
            format!("unexpected '{}' in expression '{}'", rest.trim(), input),
        )),
        Err(e) => Err(XsltError::static_error(
            codes::XPST0003,
            format!("cannot parse expression '{input}': {e}"),
        )),
    }
}

// --- Combinators & Helpers ---

fn ws<'a, F, O, E>(inner: F) -> impl Parser<&'a str, Output = O, Error = E>
where
    F: Parser<&'a str, Output = O, Error = E>,
    E: nom::error::ParseError<&'a str>,
{
    delimited(multispace0, inner, multispace0)
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// A keyword operator such as `div`; must not run on into a longer name.
fn keyword<'a>(
    word: &'static str,
) -> impl Parser<&'a str, Output = &'a str, Error = nom::error::Error<&'a str>> {
    ws(terminated(tag(word), not(satisfy(is_name_char))))
}

fn fold_left<Op: Copy>(
    first: CoreExpr,
    rest: Vec<(Op, CoreExpr)>,
    build: impl Fn(Op, CoreExpr, CoreExpr) -> CoreExpr,
) -> CoreExpr {
    rest.into_iter()
        .fold(first, |left, (op, right)| build(op, left, right))
}

// --- Expression Parsers (in order of precedence) ---

fn expr(input: &str) -> IResult<&str, CoreExpr> {
    let (input, mut items) = separated_list1(ws(char(',')), or_expr).parse(input)?;
    if items.len() == 1 {
        Ok((input, items.remove(0)))
    } else {
        Ok((input, CoreExpr::Sequence(items)))
    }
}

fn or_expr(input: &str) -> IResult<&str, CoreExpr> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(pair(value((), keyword("or")), and_expr)).parse(input)?;
    Ok((
        input,
        fold_left(first, rest, |_, l, r| CoreExpr::Or(Box::new(l), Box::new(r))),
    ))
}

fn and_expr(input: &str) -> IResult<&str, CoreExpr> {
    let (input, first) = comparison_expr(input)?;
    let (input, rest) = many0(pair(value((), keyword("and")), comparison_expr)).parse(input)?;
    Ok((
        input,
        fold_left(first, rest, |_, l, r| CoreExpr::And(Box::new(l), Box::new(r))),
    ))
}

fn comparison_op(input: &str) -> IResult<&str, (ComparisonOp, bool)> {
    alt((
        ws(alt((
            value((ComparisonOp::Ne, true), tag("!=")),
            value((ComparisonOp::Le, true), tag("<=")),
            value((ComparisonOp::Ge, true), tag(">=")),
            value((ComparisonOp::Eq, true), tag("=")),
            value((ComparisonOp::Lt, true), tag("<")),
            value((ComparisonOp::Gt, true), tag(">")),
        ))),
        alt((
            value((ComparisonOp::Eq, false), keyword("eq")),
            value((ComparisonOp::Ne, false), keyword("ne")),
            value((ComparisonOp::Lt, false), keyword("lt")),
            value((ComparisonOp::Le, false), keyword("le")),
            value((ComparisonOp::Gt, false), keyword("gt")),
            value((ComparisonOp::Ge, false), keyword("ge")),
        )),
    ))
    .parse(input)
}

fn comparison_expr(input: &str) -> IResult<&str, CoreExpr> {
    let (input, first) = range_expr(input)?;
    let (input, rest) = opt(pair(comparison_op, range_expr)).parse(input)?;
    match rest {
        Some(((op, general), right)) => Ok((
            input,
            CoreExpr::Compare {
                op,
                general,
                left: Box::new(first),
                right: Box::new(right),
            },
        )),
        None => Ok((input, first)),
    }
}

fn range_expr(input: &str) -> IResult<&str, CoreExpr> {
    let (input, first) = additive_expr(input)?;
    let (input, rest) = opt(preceded(keyword("to"), additive_expr)).parse(input)?;
    match rest {
        Some(end) => Ok((input, CoreExpr::Range(Box::new(first), Box::new(end)))),
        None => Ok((input, first)),
    }
}

fn arithmetic(op: ArithmeticOp, left: CoreExpr, right: CoreExpr) -> CoreExpr {
    CoreExpr::Arithmetic {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn additive_expr(input: &str) -> IResult<&str, CoreExpr> {
    let (input, first) = multiplicative_expr(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            value(ArithmeticOp::Add, char('+')),
            value(ArithmeticOp::Subtract, char('-')),
        ))),
        multiplicative_expr,
    ))
    .parse(input)?;
    Ok((input, fold_left(first, rest, arithmetic)))
}

fn multiplicative_expr(input: &str) -> IResult<&str, CoreExpr> {
    let (input, first) = unary_expr(input)?;
    let (input, rest) = many0(pair(
        alt((
            ws(value(ArithmeticOp::Multiply, char('*'))),
            value(ArithmeticOp::Divide, keyword("div")),
            value(ArithmeticOp::IntegerDivide, keyword("idiv")),
            value(ArithmeticOp::Modulo, keyword("mod")),
        )),
        unary_expr,
    ))
    .parse(input)?;
    Ok((input, fold_left(first, rest, arithmetic)))
}

fn unary_expr(input: &str) -> IResult<&str, CoreExpr> {
    let (input, signs) = many0(ws(one_of("+-"))).parse(input)?;
    let (input, operand) = path_expr(input)?;
    let negations = signs.iter().filter(|c| **c == '-').count();
    if negations % 2 == 1 {
        Ok((input, CoreExpr::Negate(Box::new(operand))))
    } else {
        Ok((input, operand))
    }
}

// --- Paths ---

fn descendant_or_self() -> CoreExpr {
    CoreExpr::Step {
        axis: Axis::DescendantOrSelf,
        test: NodeTest::Node,
    }
}

fn join(left: CoreExpr, right: CoreExpr) -> CoreExpr {
    CoreExpr::Path(Box::new(left), Box::new(right))
}

fn path_expr(input: &str) -> IResult<&str, CoreExpr> {
    ws(alt((
        map(preceded(tag("//"), relative_path), |rel| {
            join(join(CoreExpr::Root, descendant_or_self()), rel)
        }),
        map(preceded(char('/'), opt(relative_path)), |rel| match rel {
            Some(rel) => join(CoreExpr::Root, rel),
            None => CoreExpr::Root,
        }),
        relative_path,
    )))
    .parse(input)
}

fn relative_path(input: &str) -> IResult<&str, CoreExpr> {
    let (input, first) = postfix_expr(input)?;
    let (input, rest) = many0(pair(ws(alt((tag("//"), tag("/")))), postfix_expr)).parse(input)?;
    let mut result = first;
    for (separator, next) in rest {
        if separator == "//" {
            result = join(result, descendant_or_self());
        }
        result = join(result, next);
    }
    Ok((input, result))
}

fn postfix_expr(input: &str) -> IResult<&str, CoreExpr> {
    let (input, base) = alt((primary_expr, step)).parse(input)?;
    let (input, predicates) = many0(predicate).parse(input)?;
    let filtered = predicates
        .into_iter()
        .fold(base, |base, predicate| CoreExpr::Filter {
            base: Box::new(base),
            predicate: Box::new(predicate),
        });
    Ok((input, filtered))
}

fn predicate(input: &str) -> IResult<&str, CoreExpr> {
    delimited(ws(char('[')), expr, ws(char(']'))).parse(input)
}

fn axis(input: &str) -> IResult<&str, Axis> {
    terminated(
        alt((
            value(Axis::DescendantOrSelf, tag("descendant-or-self")),
            value(Axis::Child, tag("child")),
            value(Axis::Attribute, tag("attribute")),
            value(Axis::SelfAxis, tag("self")),
            value(Axis::Parent, tag("parent")),
        )),
        tag("::"),
    )
    .parse(input)
}

fn node_test(input: &str) -> IResult<&str, NodeTest> {
    alt((
        value(NodeTest::Wildcard, char('*')),
        value(NodeTest::Text, pair(tag("text"), ws(tag("()")))),
        value(NodeTest::Comment, pair(tag("comment"), ws(tag("()")))),
        value(NodeTest::Node, pair(tag("node"), ws(tag("()")))),
        map(q_name, NodeTest::Name),
    ))
    .parse(input)
}

fn step(input: &str) -> IResult<&str, CoreExpr> {
    alt((
        value(
            CoreExpr::Step {
                axis: Axis::Parent,
                test: NodeTest::Node,
            },
            tag(".."),
        ),
        map(preceded(char('@'), node_test), |test| CoreExpr::Step {
            axis: Axis::Attribute,
            test,
        }),
        map(pair(axis, node_test), |(axis, test)| CoreExpr::Step { axis, test }),
        map(node_test, |test| CoreExpr::Step {
            axis: Axis::Child,
            test,
        }),
    ))
    .parse(input)
}

// --- Primary Expressions ---

fn primary_expr(input: &str) -> IResult<&str, CoreExpr> {
    alt((
        numeric_literal,
        map(string_literal, |s| CoreExpr::Literal(AtomicValue::String(s))),
        variable_reference,
        parenthesized_expr,
        function_call,
        context_item,
    ))
    .parse(input)
}

fn context_item(input: &str) -> IResult<&str, CoreExpr> {
    value(CoreExpr::ContextItem, terminated(char('.'), not(char('.')))).parse(input)
}

fn parenthesized_expr(input: &str) -> IResult<&str, CoreExpr> {
    map(
        delimited(ws(char('(')), opt(expr), ws(char(')'))),
        |inner| inner.unwrap_or(CoreExpr::Empty),
    )
    .parse(input)
}

fn variable_reference(input: &str) -> IResult<&str, CoreExpr> {
    map(preceded(char('$'), q_name), |name| CoreExpr::Variable {
        name,
        slot: None,
    })
    .parse(input)
}

fn function_call(input: &str) -> IResult<&str, CoreExpr> {
    let (rest, name) = terminated(lexical_name, peek(ws(char('(')))).parse(input)?;
    if matches!(name, "text" | "node" | "comment") {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        )));
    }
    let (rest, args) = delimited(
        ws(char('(')),
        separated_list0(ws(char(',')), or_expr),
        ws(char(')')),
    )
    .parse(rest)?;
    let name = name.strip_prefix("fn:").unwrap_or(name).to_string();
    Ok((rest, CoreExpr::Function { name, args }))
}

fn numeric_literal(input: &str) -> IResult<&str, CoreExpr> {
    let mantissa = alt((
        recognize((digit1, opt(pair(char('.'), digit0)))),
        recognize((char('.'), digit1)),
    ));
    let exponent = (one_of("eE"), opt(one_of("+-")), digit1);
    map_res(
        terminated(
            recognize(pair(mantissa, opt(exponent))),
            not(satisfy(is_name_start)),
        ),
        number_from,
    )
    .parse(input)
}

fn number_from(text: &str) -> Result<CoreExpr, String> {
    let atom = if text.contains(['e', 'E']) {
        AtomicValue::Double(text.parse::<f64>().map_err(|e| e.to_string())?)
    } else if text.contains('.') {
        AtomicValue::Decimal(Decimal::from_str(text).map_err(|e| e.to_string())?)
    } else {
        match text.parse::<i64>() {
            Ok(i) => AtomicValue::Integer(i),
            Err(_) => AtomicValue::Decimal(Decimal::from_str(text).map_err(|e| e.to_string())?),
        }
    };
    Ok(CoreExpr::Literal(atom))
}

/// A quoted string; the quote character is escaped by doubling it.
fn string_literal(input: &str) -> IResult<&str, String> {
    let quote = match input.chars().next() {
        Some(q @ ('\'' | '"')) => q,
        _ => {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Char,
            )));
        }
    };
    let mut out = String::new();
    let mut chars = input[1..].char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == quote {
            if chars.peek().map(|(_, next)| *next) == Some(quote) {
                chars.next();
                out.push(quote);
                continue;
            }
            return Ok((&input[1 + i + c.len_utf8()..], out));
        }
        out.push(c);
    }
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

// --- Names ---

fn nc_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(satisfy(is_name_start), take_while(is_name_char))).parse(input)
}

fn lexical_name(input: &str) -> IResult<&str, &str> {
    alt((
        recognize((tag("Q{"), take_while(|c| c != '}'), char('}'), nc_name)),
        recognize(pair(nc_name, opt(pair(char(':'), nc_name)))),
    ))
    .parse(input)
}

/// A name whose prefix is resolved later against the static namespaces.
fn q_name(input: &str) -> IResult<&str, QName> {
    map(lexical_name, |lexical: &str| {
        if let Some(rest) = lexical.strip_prefix("Q{")
            && let Some((uri, local)) = rest.split_once('}')
        {
            return QName::new(Some(uri), local);
        }
        match lexical.split_once(':') {
            Some((prefix, local)) => QName {
                prefix: Some(prefix.to_string()),
                namespace: None,
                local: local.to_string(),
            },
            None => QName::local(lexical),
        }
    })
    .parse(input)
}
