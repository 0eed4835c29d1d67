use crate::ast::{ContextItemUse, Expr, Instruction, ItemType, NodeId};
use crate::context::Focus;
use crate::datasources::Dtm;
use crate::error::{XsltError, codes};
use crate::executor::TemplateExecutor;
use crate::expression::bool_coerce;
use crate::output::ResultSerializer;
use weft_types::{NodeKind, QName, XS_NAMESPACE, XdmItem, XdmValue};

impl TemplateExecutor {
    /// Evaluates a test against the current focus, substituting a synthetic
    /// document for an atomic context item.
    fn test(&mut self, id: NodeId, test: &Expr) -> Result<bool, XsltError> {
        let focus = self.test_focus()?;
        self.with_focus(focus, |this| bool_coerce(&this.evaluate(id, test)?))
    }

    pub(crate) fn handle_if(
        &mut self,
        id: NodeId,
        test: &Expr,
        out: &mut dyn ResultSerializer,
    ) -> Result<(), XsltError> {
        if self.test(id, test)? {
            self.execute_children(id, out)?;
        }
        Ok(())
    }

    pub(crate) fn handle_choose(
        &mut self,
        id: NodeId,
        out: &mut dyn ResultSerializer,
    ) -> Result<(), XsltError> {
        let stylesheet = self.stylesheet();
        let children = stylesheet.children(id);

        let mut otherwise = None;
        for &child in children {
            match &stylesheet.node(child).kind {
                Instruction::When { .. } if otherwise.is_none() => {}
                Instruction::Otherwise if otherwise.is_none() => otherwise = Some(child),
                other => {
                    return Err(XsltError::static_error(
                        codes::XTSE0010,
                        format!(
                            "{} is not allowed here: xsl:choose takes xsl:when* followed by an optional xsl:otherwise",
                            other.name()
                        ),
                    ));
                }
            }
        }

        if children.is_empty() {
            let locator = stylesheet.node(id).locator.as_ref();
            self.shared.log.warning(
                Some(codes::XTSE0010),
                "no branch selected: xsl:choose has neither xsl:when nor xsl:otherwise",
                locator,
            );
            return Ok(());
        }

        for &child in children {
            if let Instruction::When { test } = &stylesheet.node(child).kind
                && self.test(child, test)?
            {
                return self.run_branch(child, out);
            }
        }
        match otherwise {
            Some(branch) => self.run_branch(branch, out),
            None => Ok(()),
        }
    }

    /// Runs the children of a branch-like child instruction (`xsl:when`,
    /// `xsl:merge-action`, ...) with its own trace events.
    pub(crate) fn run_branch(&mut self, branch: NodeId, out: &mut dyn ResultSerializer) -> Result<(), XsltError> {
        let stylesheet = self.stylesheet();
        let node = stylesheet.node(branch);
        self.shared.trace.trace_event(node);
        let result = self.execute_children(branch, out);
        self.shared.trace.trace_end_event(node);
        result.map_err(|e| e.at_locator(node.locator.as_ref()))
    }

    pub(crate) fn handle_for_each(
        &mut self,
        id: NodeId,
        select: &Expr,
        out: &mut dyn ResultSerializer,
    ) -> Result<(), XsltError> {
        let items = self.evaluate(id, select)?;
        let size = items.len();
        self.with_null_template_rule(|this| {
            for (i, item) in items.iter().enumerate() {
                let focus = Focus::new(item.clone(), i + 1, size);
                this.with_focus(focus, |this| this.execute_children(id, out))?;
            }
            Ok(())
        })
    }

    pub(crate) fn handle_call_template(
        &mut self,
        id: NodeId,
        name: &QName,
        out: &mut dyn ResultSerializer,
    ) -> Result<(), XsltError> {
        let stylesheet = self.stylesheet();
        let template = stylesheet.template(name).ok_or_else(|| {
            XsltError::static_error(codes::XTSE0650, format!("no template named {name}"))
        })?;

        let mut params = Vec::new();
        for &child in stylesheet.children(id) {
            match &stylesheet.node(child).kind {
                Instruction::WithParam { name, select } => {
                    let value = self.binding_value(child, name, select.as_ref())?;
                    params.push((name.clone(), value));
                }
                other => {
                    return Err(XsltError::static_error(
                        codes::XTSE0010,
                        format!("{} is not allowed as a child of xsl:call-template", other.name()),
                    ));
                }
            }
        }

        self.invoke_template(template, &params, out)
    }

    /// Runs a template body in a fresh local frame with `params` supplied by the caller.
    pub(crate) fn invoke_template(
        &mut self,
        template: NodeId,
        params: &[(QName, XdmValue)],
        out: &mut dyn ResultSerializer,
    ) -> Result<(), XsltError> {
        let stylesheet = self.stylesheet();
        let node = stylesheet.node(template);
        self.check_supplied_params(template, params)?;

        let mut focus = self.ctx.focus.clone();
        for &child in stylesheet.children(template) {
            if let Instruction::ContextItem { item_type, usage } = &stylesheet.node(child).kind {
                focus = self.declared_focus(item_type, *usage)?;
            }
        }

        self.shared.trace.trace_event(node);
        let saved = self.ctx.variables.push_frame();
        let result = self.with_focus(focus, |this| this.run_template_body(template, params, out));
        self.ctx.variables.pop_frame(saved);
        self.shared.trace.trace_end_event(node);
        result.map_err(|e| e.at_locator(node.locator.as_ref()))
    }

    fn run_template_body(
        &mut self,
        template: NodeId,
        params: &[(QName, XdmValue)],
        out: &mut dyn ResultSerializer,
    ) -> Result<(), XsltError> {
        let stylesheet = self.stylesheet();
        for &child in stylesheet.children(template) {
            match &stylesheet.node(child).kind {
                Instruction::Param {
                    name,
                    select,
                    required,
                    slot,
                } => {
                    let slot = self.bound_slot(child, *slot)?;
                    let value = match params.iter().find(|(n, _)| n == name) {
                        Some((_, value)) => value.clone(),
                        None if *required => {
                            return Err(XsltError::dynamic(
                                codes::XTDE0700,
                                format!("required parameter ${name} was not supplied"),
                            ));
                        }
                        None => self.binding_value(child, name, select.as_ref())?,
                    };
                    self.ctx.variables.set(slot, value);
                }
                Instruction::ContextItem { .. } => {}
                _ => self.execute(child, out)?,
            }
        }
        Ok(())
    }

    /// Parameters the template does not declare are ignored, except in strict mode.
    fn check_supplied_params(
        &self,
        template: NodeId,
        params: &[(QName, XdmValue)],
    ) -> Result<(), XsltError> {
        if !self.strict() {
            return Ok(());
        }
        let stylesheet = &self.shared.stylesheet;
        for (supplied, _) in params {
            let declared = stylesheet.children(template).iter().any(|&c| {
                matches!(&stylesheet.node(c).kind, Instruction::Param { name, .. } if name == supplied)
            });
            if !declared {
                return Err(XsltError::static_error(
                    codes::XTSE0680,
                    format!("template does not declare a parameter ${supplied}"),
                ));
            }
        }
        Ok(())
    }

    /// The focus a template body runs with, after checking its `xsl:context-item`.
    fn declared_focus(&self, item_type: &ItemType, usage: ContextItemUse) -> Result<Focus, XsltError> {
        if usage == ContextItemUse::Absent {
            return Ok(Focus::absent());
        }
        match &self.ctx.focus.item {
            None if usage == ContextItemUse::Required => Err(XsltError::type_error(
                codes::XTTE3090,
                "the template requires a context item but none is supplied",
            )),
            Some(item) if !matches_item_type(self.dtm(), item, item_type) => {
                Err(XsltError::type_error(
                    codes::XTTE0590,
                    format!("the context item does not match the required type {item_type:?}"),
                ))
            }
            _ => Ok(self.ctx.focus.clone()),
        }
    }
}

pub(crate) fn matches_item_type(dtm: &Dtm, item: &XdmItem, item_type: &ItemType) -> bool {
    let node_is = |kind: NodeKind, name: Option<&QName>| match item {
        XdmItem::Node(node) => {
            dtm.kind(*node) == Some(kind) && name.is_none_or(|n| dtm.name(*node).as_ref() == Some(n))
        }
        XdmItem::Atomic(_) => false,
    };
    match item_type {
        ItemType::Item => true,
        ItemType::Node => item.is_node(),
        ItemType::Document => node_is(NodeKind::Document, None),
        ItemType::Element(name) => node_is(NodeKind::Element, name.as_ref()),
        ItemType::Attribute(name) => node_is(NodeKind::Attribute, name.as_ref()),
        ItemType::Text => node_is(NodeKind::Text, None),
        ItemType::Comment => node_is(NodeKind::Comment, None),
        ItemType::Atomic(type_name) => {
            let Some(value) = item.as_atomic() else {
                return false;
            };
            if !type_name.has_namespace(XS_NAMESPACE) {
                return false;
            }
            let actual = value.type_name().trim_start_matches("xs:");
            match type_name.local.as_str() {
                "anyAtomicType" => true,
                "decimal" => matches!(actual, "decimal" | "integer"),
                expected => actual == expected,
            }
        }
    }
}
