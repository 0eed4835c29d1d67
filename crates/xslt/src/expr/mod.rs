//! A compact XPath subset used as the compiled expression language.
//!
//! Covers what the instruction core exercises: literals, the context item,
//! variables, child/attribute/self/parent/descendant-or-self steps with
//! predicates, arithmetic, comparisons, boolean logic, ranges, sequences, and the
//! XSLT functions that read execution state (`current-group()` and friends).

mod functions;
mod ops;
mod parser;

pub use ops::{ArithmeticOp, ComparisonOp};

use crate::ast::NamespaceContext;
use crate::context::Focus;
use crate::error::{XsltError, codes};
use crate::expression::{Expression, XPathContext, bool_coerce};
use crate::variables::{Slot, VariableScope};
use weft_types::{AtomicValue, NodeHandle, NodeKind, QName, XML_NAMESPACE, XdmItem, XdmValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Attribute,
    SelfAxis,
    Parent,
    DescendantOrSelf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeTest {
    Name(QName),
    Wildcard,
    Text,
    Comment,
    Node,
}

impl NodeTest {
    fn matches(&self, kind: NodeKind, name: Option<&QName>, principal: NodeKind) -> bool {
        match self {
            NodeTest::Name(q) => kind == principal && name == Some(q),
            NodeTest::Wildcard => kind == principal,
            NodeTest::Text => kind == NodeKind::Text,
            NodeTest::Comment => kind == NodeKind::Comment,
            NodeTest::Node => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CoreExpr {
    Literal(AtomicValue),
    Empty,
    ContextItem,
    /// `/`: the document node of the context node's tree.
    Root,
    Variable {
        name: QName,
        slot: Option<Slot>,
    },
    Step {
        axis: Axis,
        test: NodeTest,
    },
    /// `left/right`: `right` evaluated once per item of `left`.
    Path(Box<CoreExpr>, Box<CoreExpr>),
    Filter {
        base: Box<CoreExpr>,
        predicate: Box<CoreExpr>,
    },
    Sequence(Vec<CoreExpr>),
    Range(Box<CoreExpr>, Box<CoreExpr>),
    Arithmetic {
        op: ArithmeticOp,
        left: Box<CoreExpr>,
        right: Box<CoreExpr>,
    },
    Negate(Box<CoreExpr>),
    Compare {
        op: ComparisonOp,
        /// `=` style (existential) rather than `eq` style (singletons).
        general: bool,
        left: Box<CoreExpr>,
        right: Box<CoreExpr>,
    },
    And(Box<CoreExpr>, Box<CoreExpr>),
    Or(Box<CoreExpr>, Box<CoreExpr>),
    Function {
        name: String,
        args: Vec<CoreExpr>,
    },
}

impl CoreExpr {
    /// Parses `text` and resolves its prefixes against `namespaces`.
    pub fn parse(text: &str, namespaces: &NamespaceContext) -> Result<CoreExpr, XsltError> {
        let mut expr = parser::parse_expression(text)?;
        expr.resolve_names(namespaces)?;
        Ok(expr)
    }

    pub fn literal(value: impl Into<AtomicValue>) -> CoreExpr {
        CoreExpr::Literal(value.into())
    }

    fn children_mut(&mut self) -> Vec<&mut CoreExpr> {
        match self {
            CoreExpr::Literal(_)
            | CoreExpr::Empty
            | CoreExpr::ContextItem
            | CoreExpr::Root
            | CoreExpr::Variable { .. }
            | CoreExpr::Step { .. } => Vec::new(),
            CoreExpr::Path(a, b)
            | CoreExpr::Range(a, b)
            | CoreExpr::And(a, b)
            | CoreExpr::Or(a, b)
            | CoreExpr::Filter {
                base: a,
                predicate: b,
            }
            | CoreExpr::Arithmetic {
                left: a, right: b, ..
            }
            | CoreExpr::Compare {
                left: a, right: b, ..
            } => vec![a.as_mut(), b.as_mut()],
            CoreExpr::Negate(a) => vec![a.as_mut()],
            CoreExpr::Sequence(items) | CoreExpr::Function { args: items, .. } => {
                items.iter_mut().collect()
            }
        }
    }

    fn resolve_names(&mut self, namespaces: &NamespaceContext) -> Result<(), XsltError> {
        match self {
            CoreExpr::Variable { name, .. }
            | CoreExpr::Step {
                test: NodeTest::Name(name),
                ..
            } => resolve_prefix(name, namespaces)?,
            CoreExpr::Function { name, args } => functions::check_arity(name, args.len())?,
            _ => {}
        }
        for child in self.children_mut() {
            child.resolve_names(namespaces)?;
        }
        Ok(())
    }

    fn evaluate(&self, ctx: &XPathContext<'_>) -> Result<XdmValue, XsltError> {
        match self {
            CoreExpr::Literal(value) => Ok(XdmValue::from(value.clone())),
            CoreExpr::Empty => Ok(XdmValue::empty()),
            CoreExpr::ContextItem => Ok(XdmValue::from(ctx.context_item()?.clone())),
            CoreExpr::Root => {
                let node = context_node(ctx)?;
                Ok(XdmValue::from(ctx.dtm().root(node)))
            }
            CoreExpr::Variable { name, slot } => match slot {
                Some(slot) => ctx.variable(*slot),
                None => Err(XsltError::static_error(
                    codes::XPST0008,
                    format!("variable ${name} has not been bound"),
                )),
            },
            CoreExpr::Step { axis, test } => step(ctx, *axis, test),
            CoreExpr::Path(left, right) => path(ctx, left, right),
            CoreExpr::Filter { base, predicate } => filter(ctx, base, predicate),
            CoreExpr::Sequence(items) => {
                let mut out = Vec::new();
                for item in items {
                    out.extend(item.evaluate(ctx)?.iter().cloned());
                }
                Ok(XdmValue::from_items(out))
            }
            CoreExpr::Range(from, to) => {
                let (Some(from), Some(to)) = (
                    ops::single_integer(ctx, &from.evaluate(ctx)?)?,
                    ops::single_integer(ctx, &to.evaluate(ctx)?)?,
                ) else {
                    return Ok(XdmValue::empty());
                };
                Ok((from..=to)
                    .map(|i| XdmItem::Atomic(AtomicValue::Integer(i)))
                    .collect())
            }
            CoreExpr::Arithmetic { op, left, right } => {
                let left = ops::single_atomic(ctx, &left.evaluate(ctx)?)?;
                let right = ops::single_atomic(ctx, &right.evaluate(ctx)?)?;
                match (left, right) {
                    (Some(l), Some(r)) => Ok(XdmValue::from(ops::arithmetic(*op, &l, &r)?)),
                    _ => Ok(XdmValue::empty()),
                }
            }
            CoreExpr::Negate(inner) => match ops::single_atomic(ctx, &inner.evaluate(ctx)?)? {
                Some(value) => Ok(XdmValue::from(ops::negate(&value)?)),
                None => Ok(XdmValue::empty()),
            },
            CoreExpr::Compare {
                op,
                general,
                left,
                right,
            } => {
                let left = left.evaluate(ctx)?;
                let right = right.evaluate(ctx)?;
                if *general {
                    let left = ctx.atomize(&left);
                    let right = ctx.atomize(&right);
                    for l in &left {
                        for r in &right {
                            if ops::compare(*op, l, r)? {
                                return Ok(XdmValue::boolean(true));
                            }
                        }
                    }
                    Ok(XdmValue::boolean(false))
                } else {
                    match (ops::single_atomic(ctx, &left)?, ops::single_atomic(ctx, &right)?) {
                        (Some(l), Some(r)) => Ok(XdmValue::boolean(ops::compare(*op, &l, &r)?)),
                        _ => Ok(XdmValue::empty()),
                    }
                }
            }
            CoreExpr::And(left, right) => {
                let result = bool_coerce(&left.evaluate(ctx)?)? && bool_coerce(&right.evaluate(ctx)?)?;
                Ok(XdmValue::boolean(result))
            }
            CoreExpr::Or(left, right) => {
                let result = bool_coerce(&left.evaluate(ctx)?)? || bool_coerce(&right.evaluate(ctx)?)?;
                Ok(XdmValue::boolean(result))
            }
            CoreExpr::Function { name, args } => functions::call(name, args, ctx),
        }
    }
}

impl Expression for CoreExpr {
    fn execute(&self, ctx: &XPathContext<'_>) -> Result<XdmValue, XsltError> {
        self.evaluate(ctx)
    }

    fn fixup_variables(&mut self, scope: &VariableScope) -> Result<(), XsltError> {
        if let CoreExpr::Variable { name, slot } = self {
            *slot = Some(scope.resolve(name).ok_or_else(|| {
                XsltError::static_error(
                    codes::XPST0008,
                    format!("variable ${name} is not declared in this scope"),
                )
            })?);
        }
        for child in self.children_mut() {
            child.fixup_variables(scope)?;
        }
        Ok(())
    }

    fn is_context_item(&self) -> bool {
        matches!(self, CoreExpr::ContextItem)
    }
}

fn resolve_prefix(name: &mut QName, namespaces: &NamespaceContext) -> Result<(), XsltError> {
    let Some(prefix) = name.prefix.as_deref() else {
        return Ok(());
    };
    if name.namespace.is_some() {
        return Ok(());
    }
    let uri = match prefix {
        "xml" => XML_NAMESPACE,
        p => namespaces.lookup(p).ok_or_else(|| {
            XsltError::static_error(codes::XPST0081, format!("namespace prefix '{p}' is not declared"))
        })?,
    };
    name.namespace = Some(uri.to_string());
    Ok(())
}

fn context_node(ctx: &XPathContext<'_>) -> Result<NodeHandle, XsltError> {
    match ctx.context_item()? {
        XdmItem::Node(node) => Ok(*node),
        XdmItem::Atomic(a) => Err(XsltError::type_error(
            codes::XPTY0020,
            format!("context item is an atomic value ({}), not a node", a.type_name()),
        )),
    }
}

fn step(ctx: &XPathContext<'_>, axis: Axis, test: &NodeTest) -> Result<XdmValue, XsltError> {
    let node = context_node(ctx)?;
    let dtm = ctx.dtm();
    let candidates = match axis {
        Axis::Child => dtm.children(node),
        Axis::Attribute => dtm.attributes(node),
        Axis::SelfAxis => vec![node],
        Axis::Parent => dtm.parent(node).into_iter().collect(),
        Axis::DescendantOrSelf => {
            let mut out = Vec::new();
            let mut stack = vec![node];
            while let Some(n) = stack.pop() {
                out.push(n);
                stack.extend(dtm.children(n).into_iter().rev());
            }
            out
        }
    };
    let principal = if axis == Axis::Attribute {
        NodeKind::Attribute
    } else {
        NodeKind::Element
    };
    Ok(candidates
        .into_iter()
        .filter(|n| {
            dtm.kind(*n)
                .is_some_and(|kind| test.matches(kind, dtm.name(*n).as_ref(), principal))
        })
        .map(XdmItem::Node)
        .collect())
}

fn path(ctx: &XPathContext<'_>, left: &CoreExpr, right: &CoreExpr) -> Result<XdmValue, XsltError> {
    let base = left.evaluate(ctx)?;
    if base.iter().any(|item| !item.is_node()) {
        return Err(XsltError::type_error(
            codes::XPTY0019,
            "the left-hand side of '/' must be a sequence of nodes",
        ));
    }
    let size = base.len();
    let mut items = Vec::new();
    for (i, item) in base.iter().enumerate() {
        let inner = ctx.with_focus(Focus::new(item.clone(), i + 1, size));
        items.extend(right.evaluate(&inner)?.iter().cloned());
    }
    let nodes = items.iter().filter(|i| i.is_node()).count();
    if nodes == items.len() {
        let mut handles: Vec<NodeHandle> = items.iter().filter_map(XdmItem::as_node).collect();
        handles.sort();
        handles.dedup();
        Ok(handles.into_iter().map(XdmItem::Node).collect())
    } else if nodes == 0 {
        Ok(XdmValue::from_items(items))
    } else {
        Err(XsltError::type_error(
            codes::XPTY0018,
            "a path step returned both nodes and atomic values",
        ))
    }
}

fn filter(ctx: &XPathContext<'_>, base: &CoreExpr, predicate: &CoreExpr) -> Result<XdmValue, XsltError> {
    let base = base.evaluate(ctx)?;
    let size = base.len();
    let mut kept = Vec::new();
    for (i, item) in base.iter().enumerate() {
        let inner = ctx.with_focus(Focus::new(item.clone(), i + 1, size));
        let result = predicate.evaluate(&inner)?;
        let keep = match result.single().and_then(XdmItem::as_atomic) {
            Some(n) if n.is_numeric() => n.to_double() == (i + 1) as f64,
            _ => bool_coerce(&result)?,
        };
        if keep {
            kept.push(item.clone());
        }
    }
    Ok(XdmValue::from_items(kept))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::StylesheetBuilder;
    use crate::context::ExecutionContext;
    use crate::datasources::Dtm;

    fn eval_with(src: &str, dtm: &Dtm, focus: Focus) -> Result<XdmValue, XsltError> {
        let stylesheet = StylesheetBuilder::new().compose()?;
        let expr = CoreExpr::parse(src, &NamespaceContext::new())?;
        let state = ExecutionContext::new(focus, Default::default());
        let ctx = XPathContext::new(&stylesheet, dtm, &state, stylesheet.root());
        expr.execute(&ctx)
    }

    fn eval(src: &str) -> Result<XdmValue, XsltError> {
        eval_with(src, &Dtm::new(), Focus::absent())
    }

    fn text(value: &XdmValue) -> Vec<String> {
        value
            .iter()
            .filter_map(|i| i.as_atomic().map(AtomicValue::to_string_value))
            .collect()
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(text(&eval("1 + 2 * 3").unwrap()), ["7"]);
        assert_eq!(text(&eval("(1 + 2) * 3").unwrap()), ["9"]);
        assert_eq!(text(&eval("7 idiv 2").unwrap()), ["3"]);
        assert_eq!(text(&eval("7 mod 2").unwrap()), ["1"]);
        assert_eq!(text(&eval("6 div 4").unwrap()), ["1.5"]);
        assert_eq!(text(&eval("-(2)").unwrap()), ["-2"]);
        assert_eq!(text(&eval("1.5e0 * 2").unwrap()), ["3"]);
    }

    #[test]
    fn integer_division_by_zero_fails() {
        let err = eval("1 div 0").unwrap_err();
        assert!(err.has_code("FOAR0001"), "{err}");
        assert!(err.is_catchable());
        assert_eq!(text(&eval("1e0 div 0").unwrap()), ["INF"]);
    }

    #[test]
    fn sequences_ranges_and_comparisons() {
        assert_eq!(eval("1 to 4").unwrap().len(), 4);
        assert_eq!(eval("()").unwrap().len(), 0);
        assert_eq!(text(&eval("(1, 2, 3)[2]").unwrap()), ["2"]);
        assert_eq!(text(&eval("(1, 2, 3)[. > 1]").unwrap()), ["2", "3"]);
        assert_eq!(eval("(1, 2) = 2").unwrap(), XdmValue::boolean(true));
        assert_eq!(eval("'a' lt 'b'").unwrap(), XdmValue::boolean(true));
        assert_eq!(eval("1 = 1 and 2 != 2").unwrap(), XdmValue::boolean(false));
        assert_eq!(eval("true() or error()").unwrap(), XdmValue::boolean(true));
        assert_eq!(eval("false() or error()").unwrap_err().code().local, "FOER0000");
    }

    #[test]
    fn paths_navigate_source_documents() {
        let dtm = Dtm::new();
        let root = dtm
            .parse_xml(r#"<r><i n="1">a</i><i n="2">b</i><j/></r>"#, None)
            .unwrap();
        let focus = Focus::singleton(XdmItem::Node(root));

        let items = eval_with("/r/i", &dtm, focus.clone()).unwrap();
        assert_eq!(items.len(), 2);
        let attrs = eval_with("r/i/@n", &dtm, focus.clone()).unwrap();
        assert_eq!(attrs.len(), 2);
        assert_eq!(
            text(&eval_with("string(r/i[2])", &dtm, focus.clone()).unwrap()),
            ["b"]
        );
        assert_eq!(
            text(&eval_with("count(//i)", &dtm, focus.clone()).unwrap()),
            ["2"]
        );
        assert_eq!(
            text(&eval_with("count(r/*)", &dtm, focus.clone()).unwrap()),
            ["3"]
        );
        assert_eq!(
            text(&eval_with("string(r/i[@n = '2'])", &dtm, focus).unwrap()),
            ["b"]
        );
    }

    #[test]
    fn unknown_functions_and_prefixes_are_static_errors() {
        let ns = NamespaceContext::new();
        assert!(CoreExpr::parse("nosuch()", &ns).unwrap_err().has_code("XPST0017"));
        assert!(CoreExpr::parse("count()", &ns).unwrap_err().has_code("XPST0017"));
        assert!(CoreExpr::parse("$p:x", &ns).unwrap_err().has_code("XPST0081"));
        assert!(CoreExpr::parse("1 +", &ns).unwrap_err().has_code("XPST0003"));
    }

    #[test]
    fn fixup_binds_or_rejects_variables() {
        let scope = VariableScope::new(vec![QName::local("x")].into(), 1);
        let mut bound = CoreExpr::parse("$x + 1", &NamespaceContext::new()).unwrap();
        bound.fixup_variables(&scope).unwrap();
        let mut unbound = CoreExpr::parse("$y", &NamespaceContext::new()).unwrap();
        assert!(unbound.fixup_variables(&scope).unwrap_err().has_code("XPST0008"));
        assert!(CoreExpr::parse(" . ", &NamespaceContext::new()).unwrap().is_context_item());
    }
}
