//! Per-evaluation mutable state.

use crate::output::OutputProperties;
use crate::scope::ScopeChain;
use crate::variables::VariableStack;
use std::collections::HashMap;
use weft_types::{XdmItem, XdmValue};

/// Context item, position and size.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Focus {
    pub item: Option<XdmItem>,
    pub position: usize,
    pub size: usize,
}

impl Focus {
    pub fn new(item: XdmItem, position: usize, size: usize) -> Self {
        Self {
            item: Some(item),
            position,
            size,
        }
    }

    pub fn singleton(item: XdmItem) -> Self {
        Self::new(item, 1, 1)
    }

    pub fn absent() -> Self {
        Self::default()
    }
}

/// A secondary result document that is serialized but not yet handed to the
/// result sink. Writes are committed when the transformation succeeds, so a
/// failed fork or rolled-back `xsl:try` never publishes anything.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingResult {
    pub uri: String,
    pub content: String,
}

/// Scratch key under which `xsl:matching-substring` publishes its captured groups.
pub const REGEX_GROUPS: &str = "regex-groups";

/// Everything that varies while the instruction tree is walked.
///
/// Cloning takes a snapshot: fork branches each run against their own copy, so
/// nothing in here is ever shared mutably between threads.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub focus: Focus,
    pub variables: VariableStack,
    /// Top entry is true while the current template rule is null.
    pub template_rule_null: Vec<bool>,
    pub scratch: HashMap<String, XdmValue>,
    pub scope: ScopeChain,
    pub output_properties: OutputProperties,
    /// Absolute URIs of the result documents currently being written.
    pub active_result_documents: Vec<String>,
    /// Completed result documents awaiting commit, in completion order.
    pub pending_results: Vec<PendingResult>,
}

impl ExecutionContext {
    pub fn new(focus: Focus, output_properties: OutputProperties) -> Self {
        Self {
            focus,
            output_properties,
            ..Self::default()
        }
    }

    pub fn template_rule_is_null(&self) -> bool {
        self.template_rule_null.last().copied().unwrap_or(false)
    }
}
