use crate::ast::{Expr, Instruction, NodeId};
use crate::compiler::CATCH_VARIABLES;
use crate::error::{XsltError, codes};
use crate::executor::TemplateExecutor;
use crate::output::{EventBuffer, ResultSerializer};
use crate::variables::Slot;
use log::debug;
use weft_types::{AtomicValue, XdmValue};

fn is_catch(kind: &Instruction) -> bool {
    matches!(kind, Instruction::Catch { .. })
}

impl TemplateExecutor {
    pub(crate) fn handle_try(
        &mut self,
        id: NodeId,
        select: Option<&Expr>,
        rollback_output: bool,
        out: &mut dyn ResultSerializer,
    ) -> Result<(), XsltError> {
        let stylesheet = self.stylesheet();
        let children = stylesheet.children(id);

        let split = children
            .iter()
            .position(|&c| is_catch(&stylesheet.node(c).kind))
            .unwrap_or(children.len());
        let (body, catches) = children.split_at(split);
        if catches.iter().any(|&c| !is_catch(&stylesheet.node(c).kind)) {
            return Err(XsltError::static_error(
                codes::XTSE3140,
                "xsl:catch children must come after every other child of xsl:try",
            ));
        }
        if select.is_some() && !body.is_empty() {
            return Err(XsltError::static_error(
                codes::XTSE3140,
                "xsl:try must not have both a select attribute and content",
            ));
        }

        let outcome = if rollback_output {
            let committed = self.ctx.pending_results.len();
            let mut buffer = EventBuffer::inheriting(out);
            let outcome = self
                .run_guarded(id, select, body, &mut buffer)
                .map(|()| buffer.replay(out));
            if outcome.is_err() {
                self.ctx.pending_results.truncate(committed);
            }
            outcome
        } else {
            self.run_guarded(id, select, body, out)
        };

        let error = match outcome {
            Ok(()) => return Ok(()),
            Err(error) if !error.is_catchable() => return Err(error),
            Err(error) => error,
        };

        for &catch in catches {
            let Instruction::Catch {
                errors,
                select,
                error_slots,
            } = &stylesheet.node(catch).kind
            else {
                continue;
            };
            let matches = errors
                .as_ref()
                .is_none_or(|tests| tests.iter().any(|t| t.matches(error.code())));
            if matches {
                debug!("xsl:catch handling {}", error.code());
                return self.run_catch(catch, select.as_ref(), *error_slots, &error, out);
            }
        }
        Err(error)
    }

    fn run_guarded(
        &mut self,
        id: NodeId,
        select: Option<&Expr>,
        body: &[NodeId],
        out: &mut dyn ResultSerializer,
    ) -> Result<(), XsltError> {
        if let Some(expr) = select {
            let value = self.evaluate(id, expr)?;
            self.emit_value(&value, out);
            return Ok(());
        }
        for &child in body {
            self.execute(child, out)?;
        }
        Ok(())
    }

    fn run_catch(
        &mut self,
        catch: NodeId,
        select: Option<&Expr>,
        error_slots: Option<Slot>,
        error: &XsltError,
        out: &mut dyn ResultSerializer,
    ) -> Result<(), XsltError> {
        if select.is_some() && !self.shared.stylesheet.children(catch).is_empty() {
            return Err(XsltError::static_error(
                codes::XTSE3150,
                "xsl:catch must not have both a select attribute and content",
            ));
        }
        let first = self.bound_slot(catch, error_slots)?;
        let locator = error.locator();
        let values: [XdmValue; CATCH_VARIABLES.len()] = [
            XdmValue::from(AtomicValue::QName(error.code().clone())),
            XdmValue::string(error.message()),
            error.value().cloned().unwrap_or_default(),
            locator
                .and_then(|l| l.module.clone())
                .map(XdmValue::string)
                .unwrap_or_default(),
            locator
                .map(|l| XdmValue::integer(i64::from(l.line)))
                .unwrap_or_default(),
            locator
                .map(|l| XdmValue::integer(i64::from(l.column)))
                .unwrap_or_default(),
        ];
        for (i, value) in values.into_iter().enumerate() {
            self.ctx.variables.set(first.offset(i), value);
        }

        let result = match select {
            Some(expr) => self.evaluate(catch, expr).map(|value| self.emit_value(&value, out)),
            None => self.run_branch(catch, out),
        };

        for i in 0..CATCH_VARIABLES.len() {
            self.ctx.variables.clear(first.offset(i));
        }
        result
    }
}
