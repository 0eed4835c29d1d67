use std::fmt;

/// Opaque reference to a node held by a source store.
///
/// `document` indexes the store's document table and `index` the node arena of
/// that document; index 0 is always the document node itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle {
    pub document: u32,
    pub index: u32,
}

impl NodeHandle {
    pub const fn new(document: u32, index: u32) -> Self {
        Self { document, index }
    }

    pub const fn document_root(document: u32) -> Self {
        Self { document, index: 0 }
    }

    pub fn is_document_root(&self) -> bool {
        self.index == 0
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.document, self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    Comment,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Document => "document-node()",
            NodeKind::Element => "element()",
            NodeKind::Attribute => "attribute()",
            NodeKind::Text => "text()",
            NodeKind::Comment => "comment()",
        }
    }
}
