//! Items and sequences.
//!
//! An [`XdmValue`] is an immutable, cheaply clonable sequence of items. Values are
//! shared freely between variable bindings, scope frames and fork branches, so the
//! storage is an `Arc<[XdmItem]>`.

use crate::atomic::AtomicValue;
use crate::node::NodeHandle;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum XdmItem {
    Node(NodeHandle),
    Atomic(AtomicValue),
}

impl XdmItem {
    pub fn as_node(&self) -> Option<NodeHandle> {
        match self {
            XdmItem::Node(n) => Some(*n),
            XdmItem::Atomic(_) => None,
        }
    }

    pub fn as_atomic(&self) -> Option<&AtomicValue> {
        match self {
            XdmItem::Atomic(a) => Some(a),
            XdmItem::Node(_) => None,
        }
    }

    pub fn is_node(&self) -> bool {
        matches!(self, XdmItem::Node(_))
    }
}

impl From<NodeHandle> for XdmItem {
    fn from(n: NodeHandle) -> Self {
        XdmItem::Node(n)
    }
}

impl From<AtomicValue> for XdmItem {
    fn from(a: AtomicValue) -> Self {
        XdmItem::Atomic(a)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct XdmValue(Arc<[XdmItem]>);

impl XdmValue {
    pub fn empty() -> Self {
        Self(Arc::from(Vec::new()))
    }

    pub fn from_item(item: impl Into<XdmItem>) -> Self {
        Self(Arc::from(vec![item.into()]))
    }

    pub fn from_items(items: Vec<XdmItem>) -> Self {
        Self(Arc::from(items))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::from_item(AtomicValue::String(s.into()))
    }

    pub fn integer(i: i64) -> Self {
        Self::from_item(AtomicValue::Integer(i))
    }

    pub fn boolean(b: bool) -> Self {
        Self::from_item(AtomicValue::Boolean(b))
    }

    pub fn items(&self) -> &[XdmItem] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, XdmItem> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&XdmItem> {
        self.0.first()
    }

    /// The single item of a singleton sequence.
    pub fn single(&self) -> Option<&XdmItem> {
        match &*self.0 {
            [item] => Some(item),
            _ => None,
        }
    }

    pub fn concat(&self, other: &XdmValue) -> XdmValue {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }
        self.iter().chain(other.iter()).cloned().collect()
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.iter().filter_map(XdmItem::as_node)
    }
}

impl Default for XdmValue {
    fn default() -> Self {
        Self::empty()
    }
}

impl FromIterator<XdmItem> for XdmValue {
    fn from_iter<I: IntoIterator<Item = XdmItem>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a XdmValue {
    type Item = &'a XdmItem;
    type IntoIter = std::slice::Iter<'a, XdmItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<AtomicValue> for XdmValue {
    fn from(a: AtomicValue) -> Self {
        Self::from_item(a)
    }
}

impl From<NodeHandle> for XdmValue {
    fn from(n: NodeHandle) -> Self {
        Self::from_item(n)
    }
}

impl From<XdmItem> for XdmValue {
    fn from(item: XdmItem) -> Self {
        Self::from_item(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_shares_storage_with_empty_side() {
        let a = XdmValue::integer(1);
        let joined = a.concat(&XdmValue::empty());
        assert!(Arc::ptr_eq(&a.0, &joined.0));

        let both = a.concat(&XdmValue::string("x"));
        assert_eq!(both.len(), 2);
        assert_eq!(both.items()[1], XdmItem::Atomic(AtomicValue::from("x")));
    }

    #[test]
    fn single_only_for_singletons() {
        assert!(XdmValue::empty().single().is_none());
        assert!(XdmValue::boolean(true).single().is_some());
        let pair: XdmValue = vec![
            XdmItem::Node(NodeHandle::new(0, 1)),
            XdmItem::Node(NodeHandle::new(0, 2)),
        ]
        .into_iter()
        .collect();
        assert!(pair.single().is_none());
        assert_eq!(pair.nodes().count(), 2);
    }
}
