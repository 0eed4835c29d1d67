use super::{NamespaceStack, OutputEvent, ResultSerializer};
use weft_types::QName;

/// Records serializer events so they can be replayed, inspected, or dropped.
///
/// Fork branches write into one buffer each and are replayed in branch order;
/// `xsl:try` with rollback discards its buffer when the body fails.
#[derive(Debug, Clone, Default)]
pub struct EventBuffer {
    events: Vec<OutputEvent>,
    namespaces: NamespaceStack,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A buffer that answers prefix queries as `parent` would at its current position.
    pub fn inheriting(parent: &dyn ResultSerializer) -> Self {
        Self {
            events: Vec::new(),
            namespaces: NamespaceStack::inheriting(parent.in_scope_namespaces()),
        }
    }

    pub fn replay(&self, out: &mut dyn ResultSerializer) {
        for event in &self.events {
            event.replay(out);
        }
    }

    /// Concatenated character data, at any depth.
    pub fn text_content(&self) -> String {
        self.events
            .iter()
            .filter_map(|e| match e {
                OutputEvent::Characters(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn events(&self) -> &[OutputEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl ResultSerializer for EventBuffer {
    fn start_document(&mut self) {
        self.events.push(OutputEvent::StartDocument);
    }

    fn end_document(&mut self) {
        self.events.push(OutputEvent::EndDocument);
    }

    fn start_element(&mut self, name: &QName) {
        self.namespaces.open_element(name);
        self.events.push(OutputEvent::StartElement(name.clone()));
    }

    fn end_element(&mut self) {
        self.namespaces.close_element();
        self.events.push(OutputEvent::EndElement);
    }

    fn add_attribute(&mut self, name: &QName, value: &str) {
        self.namespaces.attribute_name(name);
        self.events
            .push(OutputEvent::Attribute(name.clone(), value.to_string()));
    }

    fn characters(&mut self, text: &str) {
        if let Some(OutputEvent::Characters(previous)) = self.events.last_mut() {
            previous.push_str(text);
        } else {
            self.events.push(OutputEvent::Characters(text.to_string()));
        }
    }

    fn comment(&mut self, text: &str) {
        self.events.push(OutputEvent::Comment(text.to_string()));
    }

    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) {
        self.namespaces.declare_pending(prefix, uri);
        self.events.push(OutputEvent::StartPrefixMapping(
            prefix.to_string(),
            uri.to_string(),
        ));
    }

    fn end_prefix_mapping(&mut self, prefix: &str) {
        self.namespaces.withdraw_pending(prefix);
        self.events
            .push(OutputEvent::EndPrefixMapping(prefix.to_string()));
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
    fn replay_reproduces_events_in_order() {
        let mut buffer = EventBuffer::new();
        buffer.start_element(&QName::local("a"));
        buffer.add_attribute(&QName::local("x"), "1");
        buffer.characters("hi");
        buffer.end_element();

        let mut copy = EventBuffer::new();
        buffer.replay(&mut copy);
        assert_eq!(copy.events(), buffer.events());
        assert_eq!(copy.events().len(), 4);
    }

    #[test]
    fn adjacent_text_is_merged() {
        let mut buffer = EventBuffer::new();
        buffer.characters("a");
        buffer.characters("b");
        buffer.comment("c");
        buffer.characters("d");
        assert_eq!(buffer.events().len(), 3);
        assert_eq!(buffer.text_content(), "abd");
    }

    #[test]
    fn inherits_parent_bindings() {
        let mut parent = EventBuffer::new();
        parent.start_prefix_mapping("p", "urn:p");
        parent.start_element(&QName::local("root"));

        let child = EventBuffer::inheriting(&parent);
        assert_eq!(child.get_prefix("urn:p").as_deref(), Some("p"));
        assert!(child.is_empty());
    }
}
