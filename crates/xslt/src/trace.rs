//! Optional instruction tracing.
//!
//! The executor reports entry into and exit from every instruction, and the items
//! selected by `select` expressions, to a [`TraceListener`]. With the default
//! [`NoopTraceListener`] nothing happens and behaviour is unchanged.

use crate::ast::InstructionNode;
use log::trace;
use std::fmt::Debug;
use weft_types::XdmValue;

pub trait TraceListener: Send + Sync + Debug {
    fn trace_event(&self, instruction: &InstructionNode);

    fn trace_end_event(&self, instruction: &InstructionNode);

    fn selected_event(&self, instruction: &InstructionNode, selected: &XdmValue);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTraceListener;

impl TraceListener for NoopTraceListener {
    fn trace_event(&self, _instruction: &InstructionNode) {}

    fn trace_end_event(&self, _instruction: &InstructionNode) {}

    fn selected_event(&self, _instruction: &InstructionNode, _selected: &XdmValue) {}
}

/// Writes trace events at `trace` level under the `weft::trace` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTraceListener;

fn location(instruction: &InstructionNode) -> String {
    instruction
        .locator
        .as_ref()
        .map(|l| format!(" ({l})"))
        .unwrap_or_default()
}

impl TraceListener for LogTraceListener {
    fn trace_event(&self, instruction: &InstructionNode) {
        trace!(target: "weft::trace", "enter {}{}", instruction.name(), location(instruction));
    }

    fn trace_end_event(&self, instruction: &InstructionNode) {
        trace!(target: "weft::trace", "leave {}{}", instruction.name(), location(instruction));
    }

    fn selected_event(&self, instruction: &InstructionNode, selected: &XdmValue) {
        trace!(
            target: "weft::trace",
            "{} selected {} item(s){}",
            instruction.name(),
            selected.len(),
            location(instruction)
        );
    }
}
