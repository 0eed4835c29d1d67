//! The dynamic scope chain.
//!
//! Grouping and merge instructions push a [`ScopeFrame`] owned by their own
//! instruction node for the duration of each body run. Functions such as
//! `current-group()` walk the *lexical* ancestors of the calling instruction and
//! take the first ancestor that owns a frame of the right kind. Frames are
//! `Arc`-linked so a fork branch can share its parent's chain without copying it.

use crate::ast::NodeId;
use crate::compiler::Stylesheet;
use std::sync::Arc;
use weft_types::{AtomicValue, XdmItem, XdmValue};

#[derive(Debug)]
pub struct ScopeFrame {
    pub owner: NodeId,
    pub state: ScopeState,
    pub parent: Option<Arc<ScopeFrame>>,
}

#[derive(Debug)]
pub enum ScopeState {
    Group {
        /// Absent for `group-starting-with` and `group-ending-with`.
        key: Option<AtomicValue>,
        members: XdmValue,
    },
    Merge(Arc<MergeGroup>),
}

/// Items sharing one merge key, tagged with the name of the source they came from.
#[derive(Debug)]
pub struct MergeGroup {
    pub key: AtomicValue,
    pub members: Vec<(Option<String>, XdmItem)>,
    /// Every source name declared on the merge, for `current-merge-group($name)` checks.
    pub source_names: Arc<[String]>,
}

impl MergeGroup {
    pub fn all_items(&self) -> XdmValue {
        self.members.iter().map(|(_, item)| item.clone()).collect()
    }

    pub fn items_from(&self, source: &str) -> Option<XdmValue> {
        if !self.source_names.iter().any(|s| s == source) {
            return None;
        }
        Some(
            self.members
                .iter()
                .filter(|(name, _)| name.as_deref() == Some(source))
                .map(|(_, item)| item.clone())
                .collect(),
        )
    }
}

pub type ScopeChain = Option<Arc<ScopeFrame>>;

pub fn push(chain: &ScopeChain, owner: NodeId, state: ScopeState) -> ScopeChain {
    Some(Arc::new(ScopeFrame {
        owner,
        state,
        parent: chain.clone(),
    }))
}

pub fn frames(chain: &ScopeChain) -> impl Iterator<Item = &ScopeFrame> {
    std::iter::successors(chain.as_deref(), |frame| frame.parent.as_deref())
}

/// Finds the frame owned by the nearest lexical ancestor of `from` (itself
/// included) whose state satisfies `accept`.
pub fn find<'c, F>(
    stylesheet: &Stylesheet,
    chain: &'c ScopeChain,
    from: NodeId,
    accept: F,
) -> Option<&'c ScopeFrame>
where
    F: Fn(&ScopeState) -> bool,
{
    for ancestor in stylesheet.ancestors_or_self(from) {
        if let Some(frame) = frames(chain).find(|f| f.owner == ancestor && accept(&f.state)) {
            return Some(frame);
        }
    }
    None
}
