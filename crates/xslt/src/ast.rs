//! The compiled instruction tree.
//!
//! Instructions live in an arena owned by the [`Stylesheet`](crate::Stylesheet) and
//! refer to each other by [`NodeId`]. A node owns its children's ids; the parent id
//! is a back-reference used for the lexical ancestor walks of `current-group()`,
//! `current-merge-group()` and `xsl:catch` placement checks.

use crate::error::{Locator, XsltError};
use crate::expression::{Expression, XPathContext};
use crate::output::{OutputMethod, OutputProperties};
use crate::variables::{Slot, VariableScope};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use weft_types::QName;

pub type Expr = Box<dyn Expression>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Statically known namespace bindings of an instruction. The empty prefix holds the
/// default element namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceContext {
    bindings: BTreeMap<String, String>,
}

impl NamespaceContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, prefix: &str, uri: &str) -> Self {
        self.bind(prefix, uri);
        self
    }

    pub fn bind(&mut self, prefix: &str, uri: &str) {
        self.bindings.insert(prefix.to_string(), uri.to_string());
    }

    pub fn lookup(&self, prefix: &str) -> Option<&str> {
        self.bindings.get(prefix).map(String::as_str)
    }

    pub fn default_element_namespace(&self) -> Option<&str> {
        self.lookup("").filter(|ns| !ns.is_empty())
    }

    /// Resolves a lexical QName; unprefixed names take `default_namespace`.
    pub fn resolve(&self, lexical: &str, default_namespace: Option<&str>) -> Result<QName, XsltError> {
        QName::resolve(lexical, default_namespace, |p| self.lookup(p)).map_err(|e| {
            XsltError::static_error(crate::error::codes::XPST0081, e.to_string())
        })
    }
}

/// An attribute value template: literal text interleaved with `{expr}` parts.
#[derive(Debug)]
pub struct Avt {
    pub(crate) parts: Vec<AvtPart>,
}

#[derive(Debug)]
pub enum AvtPart {
    Literal(String),
    Expr(Expr),
}

impl Avt {
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            parts: vec![AvtPart::Literal(text.into())],
        }
    }

    pub fn from_parts(parts: Vec<AvtPart>) -> Self {
        Self { parts }
    }

    pub fn is_literal(&self) -> bool {
        self.parts.iter().all(|p| matches!(p, AvtPart::Literal(_)))
    }

    /// Splits `text` into literal and expression parts; `{{` and `}}` escape braces.
    pub fn parse<F>(text: &str, mut compile: F) -> Result<Self, XsltError>
    where
        F: FnMut(&str) -> Result<Expr, XsltError>,
    {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut source = String::new();
                    let mut quote: Option<char> = None;
                    let mut closed = false;
                    for c in chars.by_ref() {
                        match (quote, c) {
                            (None, '}') => {
                                closed = true;
                                break;
                            }
                            (None, '\'' | '"') => quote = Some(c),
                            (Some(q), c) if c == q => quote = None,
                            _ => {}
                        }
                        source.push(c);
                    }
                    if !closed {
                        return Err(XsltError::static_error(
                            crate::error::codes::XPST0003,
                            format!("unterminated expression in attribute value template '{text}'"),
                        ));
                    }
                    if !literal.is_empty() {
                        parts.push(AvtPart::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(AvtPart::Expr(compile(&source)?));
                }
                '}' => {
                    return Err(XsltError::static_error(
                        crate::error::codes::XPST0003,
                        format!("unmatched '}}' in attribute value template '{text}'"),
                    ));
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() || parts.is_empty() {
            parts.push(AvtPart::Literal(literal));
        }
        Ok(Self { parts })
    }

    pub fn evaluate(&self, ctx: &XPathContext<'_>) -> Result<String, XsltError> {
        let mut result = String::new();
        for part in &self.parts {
            match part {
                AvtPart::Literal(s) => result.push_str(s),
                AvtPart::Expr(expr) => {
                    let value = expr.execute(ctx)?;
                    result.push_str(&ctx.string_join(&value, " "));
                }
            }
        }
        Ok(result)
    }

    fn expressions_mut(&mut self) -> impl Iterator<Item = &mut Expr> {
        self.parts.iter_mut().filter_map(|p| match p {
            AvtPart::Expr(e) => Some(e),
            AvtPart::Literal(_) => None,
        })
    }
}

/// One entry of an `xsl:catch/@errors` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameTest {
    /// `*`
    Any,
    /// `prefix:*` or `Q{uri}*`
    Namespace(String),
    /// `*:local`
    LocalName(String),
    Name(QName),
}

impl NameTest {
    pub fn matches(&self, name: &QName) -> bool {
        match self {
            NameTest::Any => true,
            NameTest::Namespace(uri) => name.namespace_uri() == uri,
            NameTest::LocalName(local) => &name.local == local,
            NameTest::Name(q) => q == name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Strict,
    Lax,
    Preserve,
    Strip,
}

impl Validation {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "strict" => Some(Validation::Strict),
            "lax" => Some(Validation::Lax),
            "preserve" => Some(Validation::Preserve),
            "strip" => Some(Validation::Strip),
            _ => None,
        }
    }
}

/// The `as` attribute of `xsl:context-item`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemType {
    Item,
    Node,
    Document,
    Element(Option<QName>),
    Attribute(Option<QName>),
    Text,
    Comment,
    /// An atomic type such as `xs:string`; `xs:anyAtomicType` matches every atomic value.
    Atomic(QName),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextItemUse {
    Required,
    #[default]
    Optional,
    Absent,
}

#[derive(Debug)]
pub enum Grouping {
    By(Expr),
    Adjacent(Expr),
    /// Boolean test standing in for the `group-starting-with` pattern.
    StartingWith(Expr),
    /// Boolean test standing in for the `group-ending-with` pattern.
    EndingWith(Expr),
}

impl Grouping {
    fn expression_mut(&mut self) -> &mut Expr {
        match self {
            Grouping::By(e) | Grouping::Adjacent(e) | Grouping::StartingWith(e) | Grouping::EndingWith(e) => e,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug)]
pub enum Instruction {
    Stylesheet,
    Template {
        name: Option<QName>,
    },
    Param {
        name: QName,
        select: Option<Expr>,
        required: bool,
        slot: Option<Slot>,
    },
    ContextItem {
        item_type: ItemType,
        usage: ContextItemUse,
    },
    CallTemplate {
        name: QName,
    },
    WithParam {
        name: QName,
        select: Option<Expr>,
    },
    Variable {
        name: QName,
        select: Option<Expr>,
        slot: Option<Slot>,
    },
    Text {
        value: String,
    },
    ValueOf {
        select: Option<Expr>,
        separator: Option<Avt>,
    },
    Sequence {
        select: Option<Expr>,
    },
    LiteralElement {
        name: QName,
        attributes: Vec<(QName, Avt)>,
    },
    If {
        test: Expr,
    },
    Choose,
    When {
        test: Expr,
    },
    Otherwise,
    ForEach {
        select: Expr,
    },
    ForEachGroup {
        select: Expr,
        grouping: Grouping,
    },
    Element {
        name: Avt,
        namespace: Option<Avt>,
        type_name: Option<QName>,
        validation: Option<Validation>,
    },
    Attribute {
        name: Avt,
        namespace: Option<Avt>,
        select: Option<Expr>,
        separator: Option<Avt>,
        type_name: Option<QName>,
        validation: Option<Validation>,
    },
    Document {
        type_name: Option<QName>,
        validation: Option<Validation>,
    },
    Comment {
        select: Option<Expr>,
    },
    Try {
        select: Option<Expr>,
        rollback_output: bool,
    },
    Catch {
        errors: Option<Vec<NameTest>>,
        select: Option<Expr>,
        /// First of the six consecutive slots holding the `err:*` variables.
        error_slots: Option<Slot>,
    },
    Fork,
    Merge,
    MergeSource {
        name: Option<String>,
        select: Expr,
        sort_before_merge: bool,
    },
    MergeKey {
        select: Expr,
        order: SortOrder,
    },
    MergeAction,
    ResultDocument {
        href: Option<Avt>,
        format: Option<QName>,
        method: Option<OutputMethod>,
    },
    SourceDocument {
        href: Avt,
        streamable: bool,
    },
    AnalyzeString {
        select: Expr,
        regex: Avt,
        flags: Option<Avt>,
    },
    MatchingSubstring,
    NonMatchingSubstring,
    Message {
        select: Option<Expr>,
        terminate: bool,
        error_code: Option<QName>,
    },
    CharacterMap {
        name: QName,
        use_character_maps: Vec<QName>,
    },
    OutputCharacter {
        character: char,
        string: String,
    },
    Output {
        name: Option<QName>,
        properties: OutputProperties,
    },
}

impl Instruction {
    /// The element name the instruction is written as, for diagnostics and tracing.
    pub fn name(&self) -> &'static str {
        match self {
            Instruction::Stylesheet => "xsl:stylesheet",
            Instruction::Template { .. } => "xsl:template",
            Instruction::Param { .. } => "xsl:param",
            Instruction::ContextItem { .. } => "xsl:context-item",
            Instruction::CallTemplate { .. } => "xsl:call-template",
            Instruction::WithParam { .. } => "xsl:with-param",
            Instruction::Variable { .. } => "xsl:variable",
            Instruction::Text { .. } => "xsl:text",
            Instruction::ValueOf { .. } => "xsl:value-of",
            Instruction::Sequence { .. } => "xsl:sequence",
            Instruction::LiteralElement { .. } => "literal-result-element",
            Instruction::If { .. } => "xsl:if",
            Instruction::Choose => "xsl:choose",
            Instruction::When { .. } => "xsl:when",
            Instruction::Otherwise => "xsl:otherwise",
            Instruction::ForEach { .. } => "xsl:for-each",
            Instruction::ForEachGroup { .. } => "xsl:for-each-group",
            Instruction::Element { .. } => "xsl:element",
            Instruction::Attribute { .. } => "xsl:attribute",
            Instruction::Document { .. } => "xsl:document",
            Instruction::Comment { .. } => "xsl:comment",
            Instruction::Try { .. } => "xsl:try",
            Instruction::Catch { .. } => "xsl:catch",
            Instruction::Fork => "xsl:fork",
            Instruction::Merge => "xsl:merge",
            Instruction::MergeSource { .. } => "xsl:merge-source",
            Instruction::MergeKey { .. } => "xsl:merge-key",
            Instruction::MergeAction => "xsl:merge-action",
            Instruction::ResultDocument { .. } => "xsl:result-document",
            Instruction::SourceDocument { .. } => "xsl:source-document",
            Instruction::AnalyzeString { .. } => "xsl:analyze-string",
            Instruction::MatchingSubstring => "xsl:matching-substring",
            Instruction::NonMatchingSubstring => "xsl:non-matching-substring",
            Instruction::Message { .. } => "xsl:message",
            Instruction::CharacterMap { .. } => "xsl:character-map",
            Instruction::OutputCharacter { .. } => "xsl:output-character",
            Instruction::Output { .. } => "xsl:output",
        }
    }

    /// Every compiled expression held by the instruction, including AVT parts.
    pub(crate) fn expressions_mut(&mut self) -> Vec<&mut Expr> {
        let mut exprs: Vec<&mut Expr> = Vec::new();
        match self {
            Instruction::Param { select, .. }
            | Instruction::WithParam { select, .. }
            | Instruction::Variable { select, .. }
            | Instruction::Sequence { select }
            | Instruction::Comment { select }
            | Instruction::Try { select, .. }
            | Instruction::Catch { select, .. }
            | Instruction::Message { select, .. } => exprs.extend(select.as_mut()),
            Instruction::ValueOf { select, separator } => {
                exprs.extend(select.as_mut());
                if let Some(sep) = separator {
                    exprs.extend(sep.expressions_mut());
                }
            }
            Instruction::LiteralElement { attributes, .. } => {
                for (_, avt) in attributes {
                    exprs.extend(avt.expressions_mut());
                }
            }
            Instruction::If { test } | Instruction::When { test } => exprs.push(test),
            Instruction::ForEach { select } => exprs.push(select),
            Instruction::ForEachGroup { select, grouping } => {
                exprs.push(select);
                exprs.push(grouping.expression_mut());
            }
            Instruction::Element { name, namespace, .. } => {
                exprs.extend(name.expressions_mut());
                if let Some(ns) = namespace {
                    exprs.extend(ns.expressions_mut());
                }
            }
            Instruction::Attribute {
                name,
                namespace,
                select,
                separator,
                ..
            } => {
                exprs.extend(name.expressions_mut());
                if let Some(ns) = namespace {
                    exprs.extend(ns.expressions_mut());
                }
                exprs.extend(select.as_mut());
                if let Some(sep) = separator {
                    exprs.extend(sep.expressions_mut());
                }
            }
            Instruction::MergeSource { select, .. } | Instruction::MergeKey { select, .. } => {
                exprs.push(select)
            }
            Instruction::ResultDocument { href, .. } => {
                if let Some(href) = href {
                    exprs.extend(href.expressions_mut());
                }
            }
            Instruction::SourceDocument { href, .. } => exprs.extend(href.expressions_mut()),
            Instruction::AnalyzeString { select, regex, flags } => {
                exprs.push(select);
                exprs.extend(regex.expressions_mut());
                if let Some(flags) = flags {
                    exprs.extend(flags.expressions_mut());
                }
            }
            Instruction::Stylesheet
            | Instruction::Template { .. }
            | Instruction::ContextItem { .. }
            | Instruction::CallTemplate { .. }
            | Instruction::Text { .. }
            | Instruction::Choose
            | Instruction::Otherwise
            | Instruction::Document { .. }
            | Instruction::Fork
            | Instruction::Merge
            | Instruction::MergeAction
            | Instruction::MatchingSubstring
            | Instruction::NonMatchingSubstring
            | Instruction::CharacterMap { .. }
            | Instruction::OutputCharacter { .. }
            | Instruction::Output { .. } => {}
        }
        exprs
    }
}

/// A node of the instruction arena.
#[derive(Debug)]
pub struct InstructionNode {
    pub kind: Instruction,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub locator: Option<Locator>,
    pub namespaces: Arc<NamespaceContext>,
    /// Variables in scope at this node, frozen at compose time.
    pub scope: VariableScope,
}

impl InstructionNode {
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::CoreExpr;

    fn compile(src: &str) -> Result<Expr, XsltError> {
        CoreExpr::parse(src, &NamespaceContext::new()).map(|e| Box::new(e) as Expr)
    }

    #[test]
    fn avt_splits_literals_and_expressions() {
        let avt = Avt::parse("a{1}b{{c}}", compile).unwrap();
        assert_eq!(avt.parts.len(), 3);
        assert!(matches!(&avt.parts[2], AvtPart::Literal(s) if s == "b{c}"));
        assert!(!avt.is_literal());
        assert!(Avt::parse("plain", compile).unwrap().is_literal());
    }

    #[test]
    fn avt_braces_inside_string_literals() {
        let avt = Avt::parse("{'}'}", compile).unwrap();
        assert_eq!(avt.parts.len(), 1);
        assert!(Avt::parse("{1", compile).is_err());
        assert!(Avt::parse("x}", compile).is_err());
    }

    #[test]
    fn name_tests_match_codes() {
        let code = QName::error_code("FOAR0001");
        assert!(NameTest::Any.matches(&code));
        assert!(NameTest::Namespace(weft_types::ERR_NAMESPACE.to_string()).matches(&code));
        assert!(NameTest::LocalName("FOAR0001".to_string()).matches(&code));
        assert!(!NameTest::Name(QName::local("FOAR0001")).matches(&code));
    }

    #[test]
    fn namespace_context_resolves_prefixes() {
        let ns = NamespaceContext::new().with("", "urn:default").with("p", "urn:p");
        assert_eq!(ns.default_element_namespace(), Some("urn:default"));
        let q = ns.resolve("p:x", None).unwrap();
        assert_eq!(q.namespace_uri(), "urn:p");
        assert!(ns.resolve("z:x", None).is_err());
    }
}
