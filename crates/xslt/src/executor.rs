//! Instruction dispatch.
//!
//! [`TemplateExecutor`] walks the composed instruction arena depth first. Each
//! instruction kind has one handler (in `executor_handlers`) that receives the
//! node id, the kind-specific fields and the serializer to write to. Handlers
//! return `Result<(), XsltError>`; a failure unwinds through `?` until an
//! `xsl:try` inspects it or the transformation ends.
//!
//! # Execution state
//!
//! - **Shared** (read-only, `Arc`): stylesheet, source store, configuration,
//!   collaborators, diagnostics. Fork branches share it across threads.
//! - **Context** ([`ExecutionContext`]): focus, variables, the template-rule
//!   stack, the scratch map, the dynamic scope chain and output properties.
//!   Cloned per fork branch.

use crate::ast::{Expr, Instruction, NodeId};
use crate::compiler::Stylesheet;
use crate::config::TransformConfig;
use crate::context::{ExecutionContext, Focus};
use crate::datasources::{Dtm, TransientDocuments};
use crate::diagnostics::DiagnosticLog;
use crate::error::{XsltError, codes};
use crate::expression::XPathContext;
use crate::output::{EventBuffer, ResultSerializer};
use crate::scope::{self, ScopeState};
use crate::trace::TraceListener;
use crate::variables::Slot;
use std::sync::Arc;
use weft_executor::ExecutorImpl;
use weft_traits::{ResourceProvider, ResultSink, SchemaValidator};
use weft_types::{NodeHandle, NodeKind, QName, XdmItem, XdmValue};

/// State shared by every executor of one transformation, fork branches included.
#[derive(Debug)]
pub(crate) struct Shared {
    pub stylesheet: Arc<Stylesheet>,
    pub dtm: Arc<Dtm>,
    pub config: TransformConfig,
    pub executor: ExecutorImpl,
    pub resources: Option<Arc<dyn ResourceProvider>>,
    pub sink: Option<Arc<dyn ResultSink>>,
    pub schema: Option<Arc<dyn SchemaValidator>>,
    pub trace: Arc<dyn TraceListener>,
    pub log: Arc<DiagnosticLog>,
    pub transient: TransientDocuments,
}

pub struct TemplateExecutor {
    pub(crate) shared: Arc<Shared>,
    pub(crate) ctx: ExecutionContext,
}

impl TemplateExecutor {
    pub(crate) fn new(shared: Arc<Shared>, ctx: ExecutionContext) -> Self {
        Self { shared, ctx }
    }

    pub(crate) fn stylesheet(&self) -> Arc<Stylesheet> {
        Arc::clone(&self.shared.stylesheet)
    }

    pub(crate) fn dtm(&self) -> &Dtm {
        &self.shared.dtm
    }

    pub(crate) fn strict(&self) -> bool {
        self.shared.config.strict
    }

    /// An expression context for evaluating the expressions of instruction `id`.
    pub(crate) fn xpath(&self, id: NodeId) -> XPathContext<'_> {
        XPathContext::new(&self.shared.stylesheet, &self.shared.dtm, &self.ctx, id)
    }

    pub(crate) fn evaluate(&self, id: NodeId, expr: &Expr) -> Result<XdmValue, XsltError> {
        let value = expr.execute(&self.xpath(id))?;
        self.shared
            .trace
            .selected_event(self.shared.stylesheet.node(id), &value);
        Ok(value)
    }

    pub(crate) fn evaluate_avt(&self, id: NodeId, avt: &crate::ast::Avt) -> Result<String, XsltError> {
        avt.evaluate(&self.xpath(id))
    }

    /// Executes instruction `id`, attaching its locator to any failure.
    pub fn execute(&mut self, id: NodeId, out: &mut dyn ResultSerializer) -> Result<(), XsltError> {
        let stylesheet = self.stylesheet();
        let node = stylesheet.node(id);
        self.shared.trace.trace_event(node);
        let result = self.dispatch(id, out);
        self.shared.trace.trace_end_event(node);
        result.map_err(|e| e.at_locator(node.locator.as_ref()))
    }

    pub(crate) fn execute_children(
        &mut self,
        id: NodeId,
        out: &mut dyn ResultSerializer,
    ) -> Result<(), XsltError> {
        let stylesheet = self.stylesheet();
        for &child in stylesheet.children(id) {
            self.execute(child, out)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, id: NodeId, out: &mut dyn ResultSerializer) -> Result<(), XsltError> {
        let stylesheet = self.stylesheet();
        let node = stylesheet.node(id);
        match &node.kind {
            Instruction::Text { value } => {
                out.characters(value);
                Ok(())
            }
            Instruction::ValueOf { select, separator } => {
                self.handle_value_of(id, select.as_ref(), separator.as_ref(), out)
            }
            Instruction::Sequence { select } => self.handle_sequence(id, select.as_ref(), out),
            Instruction::LiteralElement { name, attributes } => {
                self.handle_literal_element(id, name, attributes, out)
            }
            Instruction::If { test } => self.handle_if(id, test, out),
            Instruction::Choose => self.handle_choose(id, out),
            Instruction::ForEach { select } => self.handle_for_each(id, select, out),
            Instruction::ForEachGroup { select, grouping } => {
                self.handle_for_each_group(id, select, grouping, out)
            }
            Instruction::Element {
                name,
                namespace,
                type_name,
                validation,
            } => self.handle_element(
                id,
                name,
                namespace.as_ref(),
                type_name.as_ref(),
                *validation,
                out,
            ),
            Instruction::Attribute {
                name,
                namespace,
                select,
                separator,
                type_name,
                validation,
            } => self.handle_attribute(
                id,
                name,
                namespace.as_ref(),
                select.as_ref(),
                separator.as_ref(),
                type_name.as_ref(),
                *validation,
                out,
            ),
            Instruction::Document {
                type_name,
                validation,
            } => self.handle_document(id, type_name.as_ref(), *validation, out),
            Instruction::Comment { select } => self.handle_comment(id, select.as_ref(), out),
            Instruction::Variable { name, select, slot } => {
                self.handle_variable(id, name, select.as_ref(), *slot, out)
            }
            Instruction::CallTemplate { name } => self.handle_call_template(id, name, out),
            Instruction::Try {
                select,
                rollback_output,
            } => self.handle_try(id, select.as_ref(), *rollback_output, out),
            Instruction::Fork => self.handle_fork(id, out),
            Instruction::Merge => self.handle_merge(id, out),
            Instruction::ResultDocument {
                href,
                format,
                method,
            } => self.handle_result_document(id, href.as_ref(), format.as_ref(), *method, out),
            Instruction::SourceDocument { href, streamable } => {
                self.handle_source_document(id, href, *streamable, out)
            }
            Instruction::AnalyzeString {
                select,
                regex,
                flags,
            } => self.handle_analyze_string(id, select, regex, flags.as_ref(), out),
            Instruction::Message {
                select,
                terminate,
                error_code,
            } => self.handle_message(id, select.as_ref(), *terminate, error_code.as_ref(), out),
            Instruction::Catch { .. } => Err(XsltError::static_error(
                codes::XTSE3150,
                "xsl:catch may only appear as a child of xsl:try",
            )),
            Instruction::When { .. }
            | Instruction::Otherwise
            | Instruction::MergeSource { .. }
            | Instruction::MergeKey { .. }
            | Instruction::MergeAction
            | Instruction::MatchingSubstring
            | Instruction::NonMatchingSubstring
            | Instruction::Param { .. }
            | Instruction::WithParam { .. }
            | Instruction::ContextItem { .. } => Err(misplaced(
                node.name(),
                stylesheet.parent(id).map(|p| stylesheet.node(p).name()),
            )),
            Instruction::Stylesheet
            | Instruction::Template { .. }
            | Instruction::CharacterMap { .. }
            | Instruction::OutputCharacter { .. }
            | Instruction::Output { .. } => Ok(()),
        }
    }

    /// Runs `f` with `focus` as the focus, restoring the previous focus afterwards.
    pub(crate) fn with_focus<R>(&mut self, focus: Focus, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = std::mem::replace(&mut self.ctx.focus, focus);
        let result = f(self);
        self.ctx.focus = saved;
        result
    }

    /// Runs `f` with the current template rule set to null.
    pub(crate) fn with_null_template_rule<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.ctx.template_rule_null.push(true);
        let result = f(self);
        self.ctx.template_rule_null.pop();
        result
    }

    /// Runs `f` with a scope frame owned by `owner` pushed on the chain.
    pub(crate) fn with_scope<R>(
        &mut self,
        owner: NodeId,
        state: ScopeState,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let pushed = scope::push(&self.ctx.scope, owner, state);
        let saved = std::mem::replace(&mut self.ctx.scope, pushed);
        let result = f(self);
        self.ctx.scope = saved;
        result
    }

    /// A problem that strict mode turns into error `code` and lenient mode into a
    /// warning.
    pub(crate) fn recoverable(
        &self,
        id: NodeId,
        code: &str,
        message: impl Into<String>,
    ) -> Result<(), XsltError> {
        let message = message.into();
        if self.strict() {
            return Err(XsltError::dynamic(code, message));
        }
        let locator = self.shared.stylesheet.node(id).locator.as_ref();
        self.shared.log.warning(Some(code), message, locator);
        Ok(())
    }

    pub(crate) fn bound_slot(&self, id: NodeId, slot: Option<Slot>) -> Result<Slot, XsltError> {
        slot.ok_or_else(|| {
            XsltError::static_error(
                codes::XPST0008,
                format!(
                    "{} was not composed with a variable slot",
                    self.shared.stylesheet.node(id).name()
                ),
            )
        })
    }

    /// Runs the children of `id` into a fresh buffer that inherits the namespace
    /// bindings in scope in `parent`.
    pub(crate) fn children_to_buffer(
        &mut self,
        id: NodeId,
        parent: &dyn ResultSerializer,
    ) -> Result<EventBuffer, XsltError> {
        let mut buffer = EventBuffer::inheriting(parent);
        self.execute_children(id, &mut buffer)?;
        Ok(buffer)
    }

    /// The string value of the content constructed by the children of `id`.
    pub(crate) fn children_to_string(&mut self, id: NodeId) -> Result<String, XsltError> {
        let mut buffer = EventBuffer::new();
        self.execute_children(id, &mut buffer)?;
        Ok(buffer.text_content())
    }

    /// Writes a sequence to the result: nodes are copied, adjacent atomic values
    /// are separated by a single space.
    pub(crate) fn emit_value(&self, value: &XdmValue, out: &mut dyn ResultSerializer) {
        let mut previous_atomic = false;
        for item in value.iter() {
            match item {
                XdmItem::Atomic(atom) => {
                    if previous_atomic {
                        out.characters(" ");
                    }
                    out.characters(&atom.to_string_value());
                    previous_atomic = true;
                }
                XdmItem::Node(node) => {
                    self.copy_node(*node, out);
                    previous_atomic = false;
                }
            }
        }
    }

    /// Deep-copies a source node to the result.
    pub(crate) fn copy_node(&self, node: NodeHandle, out: &mut dyn ResultSerializer) {
        let dtm = self.dtm();
        match dtm.kind(node) {
            Some(NodeKind::Document) => {
                for child in dtm.children(node) {
                    self.copy_node(child, out);
                }
            }
            Some(NodeKind::Element) => {
                let Some(name) = dtm.name(node) else {
                    return;
                };
                out.start_element(&name);
                for attribute in dtm.attributes(node) {
                    if let Some(attribute_name) = dtm.name(attribute) {
                        out.add_attribute(&attribute_name, &dtm.string_value(attribute));
                    }
                }
                for child in dtm.children(node) {
                    self.copy_node(child, out);
                }
                out.end_element();
            }
            Some(NodeKind::Attribute) => {
                if let Some(name) = dtm.name(node) {
                    out.add_attribute(&name, &dtm.string_value(node));
                }
            }
            Some(NodeKind::Text) => out.characters(&dtm.string_value(node)),
            Some(NodeKind::Comment) => out.comment(&dtm.string_value(node)),
            None => {}
        }
    }

    /// Focus for boolean tests: an atomic context item is replaced by a synthetic
    /// document holding its string value.
    pub(crate) fn test_focus(&self) -> Result<Focus, XsltError> {
        match &self.ctx.focus.item {
            Some(XdmItem::Atomic(atom)) => {
                let document = self
                    .shared
                    .transient
                    .synthetic_text(self.dtm(), &atom.to_string_value())?;
                Ok(Focus::new(
                    XdmItem::Node(document),
                    self.ctx.focus.position,
                    self.ctx.focus.size,
                ))
            }
            _ => Ok(self.ctx.focus.clone()),
        }
    }

    /// Resolves a computed lexical QName against the static namespaces of `id`.
    pub(crate) fn resolve_static_prefix(&self, id: NodeId, prefix: &str) -> Option<String> {
        self.shared
            .stylesheet
            .node(id)
            .namespaces
            .lookup(prefix)
            .map(str::to_string)
    }
}

fn misplaced(name: &str, parent: Option<&str>) -> XsltError {
    XsltError::static_error(
        codes::XTSE0010,
        format!(
            "{name} is not allowed as a child of {}",
            parent.unwrap_or("the stylesheet")
        ),
    )
}
