//! The bridge between instructions and compiled expressions.
//!
//! Instructions hold their expressions as `Box<dyn Expression>` and evaluate them
//! against an [`XPathContext`]: a read-only view of the stylesheet, the source
//! store and the current execution state, plus the focus to evaluate with.

use crate::ast::{NamespaceContext, NodeId};
use crate::compiler::Stylesheet;
use crate::context::{ExecutionContext, Focus, REGEX_GROUPS};
use crate::datasources::Dtm;
use crate::error::{XsltError, codes};
use crate::scope::{self, ScopeState};
use crate::variables::{Slot, VariableScope};
use std::fmt::Debug;
use weft_types::{AtomicValue, XdmItem, XdmValue};

pub trait Expression: Send + Sync + Debug {
    fn execute(&self, ctx: &XPathContext<'_>) -> Result<XdmValue, XsltError>;

    /// Binds variable references to the slots visible from the owning instruction.
    fn fixup_variables(&mut self, _scope: &VariableScope) -> Result<(), XsltError> {
        Ok(())
    }

    /// True for the bare context-item expression `.`.
    fn is_context_item(&self) -> bool {
        false
    }
}

/// Effective boolean value.
pub fn bool_coerce(value: &XdmValue) -> Result<bool, XsltError> {
    let Some(first) = value.first() else {
        return Ok(false);
    };
    if first.is_node() {
        return Ok(true);
    }
    if value.len() > 1 {
        return Err(XsltError::type_error(
            codes::FORG0006,
            format!(
                "effective boolean value is not defined for a sequence of {} atomic values",
                value.len()
            ),
        ));
    }
    match first.as_atomic() {
        Some(AtomicValue::Boolean(b)) => Ok(*b),
        Some(AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s)) => {
            Ok(!s.is_empty())
        }
        Some(n) if n.is_numeric() => {
            let d = n.to_double();
            Ok(d != 0.0 && !d.is_nan())
        }
        Some(other) => Err(XsltError::type_error(
            codes::FORG0006,
            format!("effective boolean value is not defined for {}", other.type_name()),
        )),
        None => Ok(true),
    }
}

pub struct XPathContext<'a> {
    pub stylesheet: &'a Stylesheet,
    pub dtm: &'a Dtm,
    pub state: &'a ExecutionContext,
    /// The instruction whose expression is being evaluated.
    pub instruction: NodeId,
    pub focus: Focus,
}

impl<'a> XPathContext<'a> {
    pub fn new(
        stylesheet: &'a Stylesheet,
        dtm: &'a Dtm,
        state: &'a ExecutionContext,
        instruction: NodeId,
    ) -> Self {
        Self {
            stylesheet,
            dtm,
            state,
            instruction,
            focus: state.focus.clone(),
        }
    }

    pub fn with_focus(&self, focus: Focus) -> XPathContext<'a> {
        XPathContext {
            stylesheet: self.stylesheet,
            dtm: self.dtm,
            state: self.state,
            instruction: self.instruction,
            focus,
        }
    }

    pub fn context_item(&self) -> Result<&XdmItem, XsltError> {
        self.focus.item.as_ref().ok_or_else(|| {
            XsltError::dynamic(codes::XPDY0002, "the context item is absent")
        })
    }

    pub fn position(&self) -> usize {
        self.focus.position
    }

    pub fn size(&self) -> usize {
        self.focus.size
    }

    pub fn dtm(&self) -> &Dtm {
        self.dtm
    }

    pub fn namespaces(&self) -> &NamespaceContext {
        &self.stylesheet.node(self.instruction).namespaces
    }

    pub fn variable(&self, slot: Slot) -> Result<XdmValue, XsltError> {
        self.state.variables.get(slot).cloned().ok_or_else(|| {
            XsltError::dynamic(
                codes::XTDE0640,
                format!("variable in {slot:?} is referenced before it is bound"),
            )
        })
    }

    pub fn current_group(&self) -> Result<XdmValue, XsltError> {
        let frame = scope::find(self.stylesheet, &self.state.scope, self.instruction, |s| {
            matches!(s, ScopeState::Group { .. })
        });
        match frame.map(|f| &f.state) {
            Some(ScopeState::Group { members, .. }) => Ok(members.clone()),
            _ => Err(XsltError::resolution(
                codes::XTDE1061,
                "current-group() called outside xsl:for-each-group",
            )),
        }
    }

    pub fn current_grouping_key(&self) -> Result<XdmValue, XsltError> {
        let frame = scope::find(self.stylesheet, &self.state.scope, self.instruction, |s| {
            matches!(s, ScopeState::Group { .. })
        });
        match frame.map(|f| &f.state) {
            Some(ScopeState::Group { key, .. }) => {
                Ok(key.clone().map(XdmValue::from).unwrap_or_default())
            }
            _ => Err(XsltError::resolution(
                codes::XTDE1071,
                "current-grouping-key() called outside xsl:for-each-group",
            )),
        }
    }

    pub fn current_merge_group(&self, source: Option<&str>) -> Result<XdmValue, XsltError> {
        let group = self.merge_group()?;
        match source {
            None => Ok(group.all_items()),
            Some(name) => group.items_from(name).ok_or_else(|| {
                XsltError::resolution(
                    codes::XTDE3490,
                    format!("no merge source named '{name}'"),
                )
            }),
        }
    }

    pub fn current_merge_key(&self) -> Result<XdmValue, XsltError> {
        Ok(XdmValue::from(self.merge_group()?.key.clone()))
    }

    fn merge_group(&self) -> Result<&scope::MergeGroup, XsltError> {
        let frame = scope::find(self.stylesheet, &self.state.scope, self.instruction, |s| {
            matches!(s, ScopeState::Merge(_))
        });
        match frame.map(|f| &f.state) {
            Some(ScopeState::Merge(group)) => Ok(group.as_ref()),
            _ => Err(XsltError::resolution(
                codes::XTDE3480,
                "current-merge-group() called outside xsl:merge-action",
            )),
        }
    }

    /// Captured group `n` of the current `xsl:matching-substring`, or "".
    pub fn regex_group(&self, n: usize) -> String {
        self.state
            .scratch
            .get(REGEX_GROUPS)
            .and_then(|groups| groups.items().get(n).map(|item| self.string_value(item)))
            .unwrap_or_default()
    }

    pub fn template_rule_is_null(&self) -> bool {
        self.state.template_rule_is_null()
    }

    pub fn string_value(&self, item: &XdmItem) -> String {
        match item {
            XdmItem::Node(node) => self.dtm.string_value(*node),
            XdmItem::Atomic(a) => a.to_string_value(),
        }
    }

    pub fn atomize(&self, value: &XdmValue) -> Vec<AtomicValue> {
        value
            .iter()
            .map(|item| match item {
                XdmItem::Node(node) => AtomicValue::UntypedAtomic(self.dtm.string_value(*node)),
                XdmItem::Atomic(a) => a.clone(),
            })
            .collect()
    }

    pub fn string_join(&self, value: &XdmValue, separator: &str) -> String {
        value
            .iter()
            .map(|item| self.string_value(item))
            .collect::<Vec<_>>()
            .join(separator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_boolean_value() {
        assert!(!bool_coerce(&XdmValue::empty()).unwrap());
        assert!(bool_coerce(&XdmValue::string("x")).unwrap());
        assert!(!bool_coerce(&XdmValue::string("")).unwrap());
        assert!(!bool_coerce(&XdmValue::integer(0)).unwrap());
        assert!(!bool_coerce(&XdmValue::from(AtomicValue::Double(f64::NAN))).unwrap());
        assert!(bool_coerce(&XdmValue::boolean(true)).unwrap());
        assert!(bool_coerce(&XdmValue::from(weft_types::NodeHandle::new(0, 0))).unwrap());
    }

    #[test]
    fn effective_boolean_value_errors() {
        let pair: XdmValue = [XdmValue::integer(1), XdmValue::integer(2)]
            .iter()
            .flat_map(|v| v.iter().cloned())
            .collect();
        assert!(bool_coerce(&pair).unwrap_err().has_code(codes::FORG0006));
        let date = XdmValue::from(AtomicValue::Date("2024-01-01".into()));
        assert!(bool_coerce(&date).unwrap_err().has_code(codes::FORG0006));
    }
}
