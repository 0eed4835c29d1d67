//! The source-tree store.
//!
//! Documents are immutable arenas of [`SourceNode`]s once registered with the
//! [`Dtm`]. Handles ([`NodeHandle`]) pair a document index with a node index,
//! so they are `Copy` and cheap to pass through XDM values. The registry sits
//! behind a lock because fork branches and `xsl:source-document` may add
//! documents while other threads read.
//!
//! Temporary trees and synthetic text documents only live for one run. They are
//! recorded in a [`TransientDocuments`] and released when the run ends, and
//! their slots are reused by later documents.

mod tree;
mod xml;

pub use tree::TreeBuilder;

use crate::error::XsltError;
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use weft_types::{NodeHandle, NodeKind, QName};

#[derive(Debug, Clone)]
pub struct SourceNode {
    pub kind: NodeKind,
    pub name: Option<QName>,
    /// Character content of text, comment and attribute nodes.
    pub value: String,
    pub parent: Option<u32>,
    pub children: Vec<u32>,
    pub attributes: Vec<u32>,
}

impl SourceNode {
    fn new(kind: NodeKind, name: Option<QName>, value: String, parent: Option<u32>) -> Self {
        Self {
            kind,
            name,
            value,
            parent,
            children: Vec::new(),
            attributes: Vec::new(),
        }
    }
}

/// One document's node arena; index 0 is the document node.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub uri: Option<String>,
    nodes: Vec<SourceNode>,
}

impl SourceDocument {
    pub fn new(uri: Option<String>) -> Self {
        Self {
            uri,
            nodes: vec![SourceNode::new(NodeKind::Document, None, String::new(), None)],
        }
    }

    pub fn node(&self, index: u32) -> Option<&SourceNode> {
        self.nodes.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn append_child(&mut self, parent: u32, kind: NodeKind, name: Option<QName>, value: String) -> u32 {
        let index = self.nodes.len() as u32;
        self.nodes.push(SourceNode::new(kind, name, value, Some(parent)));
        if let Some(p) = self.nodes.get_mut(parent as usize) {
            p.children.push(index);
        }
        index
    }

    /// Adds an attribute to `element`, replacing one with the same name.
    pub fn set_attribute(&mut self, element: u32, name: QName, value: String) -> u32 {
        let existing = self.nodes.get(element as usize).and_then(|e| {
            e.attributes
                .iter()
                .copied()
                .find(|a| self.nodes[*a as usize].name.as_ref() == Some(&name))
        });
        if let Some(index) = existing {
            self.nodes[index as usize].value = value;
            return index;
        }
        let index = self.nodes.len() as u32;
        self.nodes
            .push(SourceNode::new(NodeKind::Attribute, Some(name), value, Some(element)));
        if let Some(e) = self.nodes.get_mut(element as usize) {
            e.attributes.push(index);
        }
        index
    }

    /// Appends text to `parent`, merging with a preceding text child.
    pub fn append_text(&mut self, parent: u32, text: &str) {
        let last = self
            .nodes
            .get(parent as usize)
            .and_then(|p| p.children.last().copied());
        if let Some(last) = last
            && self.nodes[last as usize].kind == NodeKind::Text
        {
            self.nodes[last as usize].value.push_str(text);
            return;
        }
        self.append_child(parent, NodeKind::Text, None, text.to_string());
    }

    pub fn string_value(&self, index: u32) -> String {
        let Some(node) = self.node(index) else {
            return String::new();
        };
        match node.kind {
            NodeKind::Text | NodeKind::Comment | NodeKind::Attribute => node.value.clone(),
            NodeKind::Document | NodeKind::Element => {
                let mut out = String::new();
                self.collect_text(index, &mut out);
                out
            }
        }
    }

    fn collect_text(&self, index: u32, out: &mut String) {
        let Some(node) = self.node(index) else {
            return;
        };
        for &child in &node.children {
            match self.nodes[child as usize].kind {
                NodeKind::Text => out.push_str(&self.nodes[child as usize].value),
                NodeKind::Element => self.collect_text(child, out),
                _ => {}
            }
        }
    }
}

#[derive(Debug, Default)]
struct DocumentTable {
    slots: Vec<Option<Arc<SourceDocument>>>,
    free: Vec<u32>,
}

/// Registry of every document visible to a transformation.
#[derive(Debug, Default)]
pub struct Dtm {
    documents: RwLock<DocumentTable>,
    by_uri: RwLock<HashMap<String, NodeHandle>>,
}

impl Dtm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `document` and returns the handle of its document node.
    pub fn add_document(&self, document: SourceDocument) -> Result<NodeHandle, XsltError> {
        let mut table = self.documents.write().map_err(|_| lock_poisoned())?;
        let index = match table.free.pop() {
            Some(index) => index,
            None => {
                table.slots.push(None);
                (table.slots.len() - 1) as u32
            }
        };
        if let Some(uri) = &document.uri
            && let Ok(mut by_uri) = self.by_uri.write()
        {
            by_uri.insert(uri.clone(), NodeHandle::document_root(index));
        }
        table.slots[index as usize] = Some(Arc::new(document));
        Ok(NodeHandle::document_root(index))
    }

    /// Drops the documents containing `handles`. Their handles must not be used
    /// afterwards: the slots are handed to the next documents added.
    pub fn release(&self, handles: &[NodeHandle]) {
        let Ok(mut table) = self.documents.write() else {
            return;
        };
        let mut released = 0;
        for handle in handles {
            let index = handle.document;
            if let Some(slot) = table.slots.get_mut(index as usize)
                && slot.take().is_some()
            {
                table.free.push(index);
                released += 1;
            }
        }
        if let Ok(mut by_uri) = self.by_uri.write() {
            by_uri.retain(|_, h| handles.iter().all(|r| r.document != h.document));
        }
        debug!("released {released} transient documents");
    }

    pub fn document(&self, handle: NodeHandle) -> Option<Arc<SourceDocument>> {
        self.documents
            .read()
            .ok()?
            .slots
            .get(handle.document as usize)?
            .clone()
    }

    /// Number of live documents.
    pub fn document_count(&self) -> usize {
        self.documents
            .read()
            .map(|t| t.slots.iter().filter(|s| s.is_some()).count())
            .unwrap_or(0)
    }

    fn with_node<T>(&self, handle: NodeHandle, f: impl FnOnce(&SourceDocument, &SourceNode) -> T) -> Option<T> {
        let doc = self.document(handle)?;
        let node = doc.node(handle.index)?;
        Some(f(&doc, node))
    }

    pub fn kind(&self, handle: NodeHandle) -> Option<NodeKind> {
        self.with_node(handle, |_, n| n.kind)
    }

    pub fn name(&self, handle: NodeHandle) -> Option<QName> {
        self.with_node(handle, |_, n| n.name.clone()).flatten()
    }

    pub fn parent(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.with_node(handle, |_, n| n.parent)
            .flatten()
            .map(|p| NodeHandle::new(handle.document, p))
    }

    pub fn children(&self, handle: NodeHandle) -> Vec<NodeHandle> {
        self.with_node(handle, |_, n| {
            n.children
                .iter()
                .map(|&c| NodeHandle::new(handle.document, c))
                .collect()
        })
        .unwrap_or_default()
    }

    pub fn first_child(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.with_node(handle, |_, n| n.children.first().copied())
            .flatten()
            .map(|c| NodeHandle::new(handle.document, c))
    }

    pub fn attributes(&self, handle: NodeHandle) -> Vec<NodeHandle> {
        self.with_node(handle, |_, n| {
            n.attributes
                .iter()
                .map(|&a| NodeHandle::new(handle.document, a))
                .collect()
        })
        .unwrap_or_default()
    }

    pub fn string_value(&self, handle: NodeHandle) -> String {
        self.document(handle)
            .map(|doc| doc.string_value(handle.index))
            .unwrap_or_default()
    }

    /// Document node of the tree containing `handle`.
    pub fn root(&self, handle: NodeHandle) -> NodeHandle {
        NodeHandle::document_root(handle.document)
    }

    /// A new document node with one text child holding `text`.
    pub fn synthetic_text_document(&self, text: &str) -> Result<NodeHandle, XsltError> {
        let mut document = SourceDocument::new(None);
        document.append_text(0, text);
        self.add_document(document)
    }

    /// Parses `text` as XML and registers the result under `uri` if given.
    pub fn parse_xml(&self, text: &str, uri: Option<&str>) -> Result<NodeHandle, XsltError> {
        let document = xml::parse(text, uri)?;
        debug!(
            "parsed {} ({} nodes)",
            uri.unwrap_or("<inline>"),
            document.len()
        );
        self.add_document(document)
    }

    /// Previously loaded document for an absolute URI.
    pub fn cached(&self, uri: &str) -> Option<NodeHandle> {
        self.by_uri.read().ok()?.get(uri).copied()
    }
}

/// Documents created by one transformation run, released when the run ends.
#[derive(Debug, Default)]
pub struct TransientDocuments {
    handles: Mutex<Vec<NodeHandle>>,
    /// Synthetic text documents by content; equal strings share one document.
    synthetic: Mutex<HashMap<String, NodeHandle>>,
}

impl TransientDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a temporary tree with `dtm` for the rest of the run.
    pub fn add(&self, dtm: &Dtm, document: SourceDocument) -> Result<NodeHandle, XsltError> {
        let handle = dtm.add_document(document)?;
        self.record(handle);
        Ok(handle)
    }

    pub fn synthetic_text(&self, dtm: &Dtm, text: &str) -> Result<NodeHandle, XsltError> {
        let mut synthetic = self.synthetic.lock().map_err(|_| lock_poisoned())?;
        if let Some(&handle) = synthetic.get(text) {
            return Ok(handle);
        }
        let handle = dtm.synthetic_text_document(text)?;
        synthetic.insert(text.to_string(), handle);
        self.record(handle);
        Ok(handle)
    }

    fn record(&self, handle: NodeHandle) {
        match self.handles.lock() {
            Ok(mut handles) => handles.push(handle),
            Err(poisoned) => poisoned.into_inner().push(handle),
        }
    }

    pub fn len(&self) -> usize {
        self.handles.lock().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Releases every recorded document from `dtm`.
    pub fn release(&self, dtm: &Dtm) {
        let handles = match self.handles.lock() {
            Ok(mut handles) => std::mem::take(&mut *handles),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        if let Ok(mut synthetic) = self.synthetic.lock() {
            synthetic.clear();
        }
        if !handles.is_empty() {
            dtm.release(&handles);
        }
    }
}

fn lock_poisoned() -> XsltError {
    XsltError::dynamic(crate::error::codes::FODC0002, "source store lock poisoned")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_and_navigates_a_document() {
        let dtm = Dtm::new();
        let root = dtm
            .parse_xml(r#"<a x="1"><b>hi</b><!--c--><b>there</b></a>"#, Some("urn:doc"))
            .expect("well-formed");
        assert_eq!(dtm.kind(root), Some(NodeKind::Document));

        let a = dtm.first_child(root).expect("root element");
        assert_eq!(dtm.name(a), Some(QName::local("a")));
        assert_eq!(dtm.children(a).len(), 3);
        assert_eq!(dtm.attributes(a).len(), 1);
        assert_eq!(dtm.string_value(a), "hithere");
        assert_eq!(dtm.parent(a), Some(root));
        assert_eq!(dtm.cached("urn:doc"), Some(root));
    }

    #[test]
    fn synthetic_documents_are_shared_within_a_run() {
        let dtm = Dtm::new();
        let transient = TransientDocuments::new();
        let first = transient.synthetic_text(&dtm, "abc").expect("created");
        let second = transient.synthetic_text(&dtm, "abc").expect("cached");
        assert_eq!(first, second);
        assert_eq!(dtm.string_value(first), "abc");
        assert_eq!(dtm.document_count(), 1);
    }

    #[test]
    fn released_documents_free_their_slots() {
        let dtm = Dtm::new();
        let source = dtm.parse_xml("<kept/>", Some("urn:kept")).expect("well-formed");
        let transient = TransientDocuments::new();
        let temporary = transient
            .add(&dtm, SourceDocument::new(None))
            .expect("registered");
        transient.synthetic_text(&dtm, "x").expect("created");
        assert_eq!(dtm.document_count(), 3);

        transient.release(&dtm);
        assert!(transient.is_empty());
        assert_eq!(dtm.document_count(), 1);
        assert!(dtm.document(temporary).is_none());
        assert_eq!(dtm.cached("urn:kept"), Some(source));

        let reused = dtm.synthetic_text_document("y").expect("created");
        assert_ne!(reused.document, source.document);
        assert_eq!(dtm.document_count(), 2);
    }

    #[test]
    fn attributes_replace_by_name() {
        let mut doc = SourceDocument::new(None);
        let e = doc.append_child(0, NodeKind::Element, Some(QName::local("e")), String::new());
        doc.set_attribute(e, QName::local("a"), "1".into());
        doc.set_attribute(e, QName::local("a"), "2".into());
        let element = doc.node(e).expect("element");
        assert_eq!(element.attributes.len(), 1);
        assert_eq!(doc.string_value(element.attributes[0]), "2");
    }
}
