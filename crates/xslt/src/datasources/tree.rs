use super::SourceDocument;
use crate::output::{NamespaceStack, ResultSerializer};
use log::warn;
use weft_types::{NodeKind, QName};

/// Builds a temporary tree (variable content, `xsl:document`) from result events.
#[derive(Debug)]
pub struct TreeBuilder {
    document: SourceDocument,
    open: Vec<u32>,
    /// Index of the element still accepting attributes.
    accepting_attributes: Option<u32>,
    namespaces: NamespaceStack,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self {
            document: SourceDocument::new(None),
            open: Vec::new(),
            accepting_attributes: None,
            namespaces: NamespaceStack::new(),
        }
    }

    fn current(&self) -> u32 {
        self.open.last().copied().unwrap_or(0)
    }

    pub fn finish(self) -> SourceDocument {
        self.document
    }
}

impl ResultSerializer for TreeBuilder {
    fn start_document(&mut self) {}

    fn end_document(&mut self) {}

    fn start_element(&mut self, name: &QName) {
        self.namespaces.open_element(name);
        let parent = self.current();
        let index = self
            .document
            .append_child(parent, NodeKind::Element, Some(name.clone()), String::new());
        self.open.push(index);
        self.accepting_attributes = Some(index);
    }

    fn end_element(&mut self) {
        self.namespaces.close_element();
        self.open.pop();
        self.accepting_attributes = None;
    }

    fn add_attribute(&mut self, name: &QName, value: &str) {
        match self.accepting_attributes {
            Some(element) => {
                self.namespaces.attribute_name(name);
                self.document
                    .set_attribute(element, name.clone(), value.to_string());
            }
            None => warn!("attribute {name} has no element to attach to; ignored"),
        }
    }

    fn characters(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.accepting_attributes = None;
        let parent = self.current();
        self.document.append_text(parent, text);
    }

    fn comment(&mut self, text: &str) {
        self.accepting_attributes = None;
        let parent = self.current();
        self.document
            .append_child(parent, NodeKind::Comment, None, text.to_string());
    }

    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) {
        self.namespaces.declare_pending(prefix, uri);
    }

    fn end_prefix_mapping(&mut self, prefix: &str) {
        self.namespaces.withdraw_pending(prefix);
    }

    fn get_prefix(&self, uri: &str) -> Option<String> {
        self.namespaces.get_prefix(uri)
    }

    fn generate_next_prefix(&mut self) -> String {
        self.namespaces.generate_prefix()
    }

    fn in_scope_namespaces(&self) -> Vec<(String, String)> {
        self.namespaces.in_scope()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_become_nodes() {
        let mut builder = TreeBuilder::new();
        builder.start_element(&QName::local("r"));
        builder.add_attribute(&QName::local("a"), "1");
        builder.characters("x");
        builder.characters("y");
        builder.start_element(&QName::local("c"));
        builder.end_element();
        builder.end_element();
        builder.characters("tail");

        let doc = builder.finish();
        let root = doc.node(0).expect("document node");
        assert_eq!(root.children.len(), 2);
        assert_eq!(doc.string_value(0), "xytail");
        let r = doc.node(root.children[0]).expect("element");
        assert_eq!(r.attributes.len(), 1);
        assert_eq!(r.children.len(), 2);
    }

    #[test]
    fn late_attributes_are_ignored() {
        let mut builder = TreeBuilder::new();
        builder.start_element(&QName::local("r"));
        builder.characters("text");
        builder.add_attribute(&QName::local("late"), "1");
        builder.end_element();
        let doc = builder.finish();
        assert!(doc.node(1).expect("element").attributes.is_empty());
    }
}
