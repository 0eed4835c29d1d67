//! Variable and parameter slots.
//!
//! At compose time every variable reference is bound to a [`Slot`]: an index into
//! the global table, or an offset into the local frame of the enclosing template
//! body. At run time [`VariableStack`] holds the values behind those slots.

use std::sync::Arc;
use weft_types::{QName, XdmValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Global(usize),
    Local(usize),
}

impl Slot {
    /// The slot `n` positions after this one, in the same table.
    pub fn offset(self, n: usize) -> Slot {
        match self {
            Slot::Global(i) => Slot::Global(i + n),
            Slot::Local(i) => Slot::Local(i + n),
        }
    }
}

/// Names visible at one point of the stylesheet, innermost last.
///
/// The first `globals_count` names are global variables and parameters; the rest
/// are locals of the enclosing template body, numbered from zero.
#[derive(Debug, Clone, Default)]
pub struct VariableScope {
    names: Arc<[QName]>,
    globals_count: usize,
}

impl VariableScope {
    pub fn new(names: Arc<[QName]>, globals_count: usize) -> Self {
        Self {
            names,
            globals_count,
        }
    }

    #[cfg(test)]
    pub(crate) fn names(&self) -> &[QName] {
        &self.names
    }

    /// Binds `name` to the innermost declaration in scope.
    pub fn resolve(&self, name: &QName) -> Option<Slot> {
        let index = self.names.iter().rposition(|n| n == name)?;
        Some(if index < self.globals_count {
            Slot::Global(index)
        } else {
            Slot::Local(index - self.globals_count)
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct VariableStack {
    globals: Vec<Option<XdmValue>>,
    locals: Vec<Option<XdmValue>>,
    frame_base: usize,
}

impl VariableStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slot: Slot) -> Option<&XdmValue> {
        match slot {
            Slot::Global(i) => self.globals.get(i)?.as_ref(),
            Slot::Local(i) => self.locals.get(self.frame_base + i)?.as_ref(),
        }
    }

    pub fn set(&mut self, slot: Slot, value: XdmValue) {
        let (table, index) = match slot {
            Slot::Global(i) => (&mut self.globals, i),
            Slot::Local(i) => (&mut self.locals, self.frame_base + i),
        };
        if table.len() <= index {
            table.resize(index + 1, None);
        }
        table[index] = Some(value);
    }

    pub fn clear(&mut self, slot: Slot) {
        let entry = match slot {
            Slot::Global(i) => self.globals.get_mut(i),
            Slot::Local(i) => self.locals.get_mut(self.frame_base + i),
        };
        if let Some(entry) = entry {
            *entry = None;
        }
    }

    /// Opens a fresh local frame above everything currently bound. Returns the
    /// previous frame base, to be handed back to [`VariableStack::pop_frame`].
    pub fn push_frame(&mut self) -> usize {
        let previous = self.frame_base;
        self.frame_base = self.locals.len();
        previous
    }

    pub fn pop_frame(&mut self, previous: usize) {
        self.locals.truncate(self.frame_base);
        self.frame_base = previous;
    }

    #[cfg(test)]
    pub(crate) fn frame_depth(&self) -> usize {
        self.locals.len() - self.frame_base
    }
}
