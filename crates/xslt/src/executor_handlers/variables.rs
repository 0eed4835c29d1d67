use crate::ast::{Expr, Instruction, NodeId};
use crate::datasources::TreeBuilder;
use crate::error::{XsltError, codes};
use crate::executor::TemplateExecutor;
use crate::output::ResultSerializer;
use crate::variables::Slot;
use std::collections::HashMap;
use weft_types::{NodeHandle, QName, XdmValue};

impl TemplateExecutor {
    pub(crate) fn handle_variable(
        &mut self,
        id: NodeId,
        name: &QName,
        select: Option<&Expr>,
        slot: Option<Slot>,
        _out: &mut dyn ResultSerializer,
    ) -> Result<(), XsltError> {
        let slot = self.bound_slot(id, slot)?;
        let value = self.binding_value(id, name, select)?;
        self.ctx.variables.set(slot, value);
        Ok(())
    }

    /// The value of a variable, parameter or with-param: its `select`, or a
    /// temporary tree built from its content, or the empty string.
    pub(crate) fn binding_value(
        &mut self,
        id: NodeId,
        name: &QName,
        select: Option<&Expr>,
    ) -> Result<XdmValue, XsltError> {
        let has_content = !self.shared.stylesheet.children(id).is_empty();
        match (select, has_content) {
            (Some(_), true) => Err(XsltError::static_error(
                codes::XTSE0620,
                format!("${name} has both a select attribute and content"),
            )),
            (Some(expr), false) => self.evaluate(id, expr),
            (None, true) => Ok(XdmValue::from(self.temporary_tree(id)?)),
            (None, false) => Ok(XdmValue::string("")),
        }
    }

    /// Builds the content of `id` into a new document and returns its document node.
    pub(crate) fn temporary_tree(&mut self, id: NodeId) -> Result<NodeHandle, XsltError> {
        let mut builder = TreeBuilder::new();
        self.execute_children(id, &mut builder)?;
        self.shared.transient.add(self.dtm(), builder.finish())
    }

    /// Evaluates global variables and parameters in declaration order. Parameters
    /// take the externally supplied value when there is one.
    pub(crate) fn initialize_globals(
        &mut self,
        supplied: &HashMap<QName, XdmValue>,
    ) -> Result<(), XsltError> {
        let stylesheet = self.stylesheet();
        for &global in stylesheet.globals() {
            let node = stylesheet.node(global);
            let frame = self.ctx.variables.push_frame();
            let value = match &node.kind {
                Instruction::Variable { name, select, slot } => {
                    let slot = self.bound_slot(global, *slot)?;
                    (slot, self.binding_value(global, name, select.as_ref()))
                }
                Instruction::Param {
                    name,
                    select,
                    required,
                    slot,
                } => {
                    let slot = self.bound_slot(global, *slot)?;
                    let value = match supplied.get(name) {
                        Some(value) => Ok(value.clone()),
                        None if *required => Err(XsltError::dynamic(
                            codes::XTDE0050,
                            format!("no value supplied for required stylesheet parameter ${name}"),
                        )),
                        None => self.binding_value(global, name, select.as_ref()),
                    };
                    (slot, value)
                }
                _ => {
                    self.ctx.variables.pop_frame(frame);
                    continue;
                }
            };
            self.ctx.variables.pop_frame(frame);
            let (slot, value) = value;
            let value = value.map_err(|e| e.at_locator(node.locator.as_ref()))?;
            self.ctx.variables.set(slot, value);
        }
        Ok(())
    }
}
