//! Result-tree events and their consumers.
//!
//! Instructions never build result nodes directly; they push events into a
//! [`ResultSerializer`]. The concrete serializers are:
//!
//! - [`MarkupWriter`]: quick-xml backed XML/HTML writer with text and JSON modes
//! - [`EventBuffer`]: records events for later replay (fork branches, try
//!   rollback, validation of constructed nodes)
//! - [`TreeBuilder`](crate::datasources::TreeBuilder): builds a temporary source
//!   document (variable content, `xsl:document`)

mod buffer;
mod namespaces;
mod properties;
mod writer;

pub use buffer::EventBuffer;
pub use namespaces::NamespaceStack;
pub use properties::{CharacterMapping, OutputMethod, OutputProperties};
pub use writer::MarkupWriter;

use weft_types::QName;

/// Receiver of result-tree events.
///
/// Attributes may be added after `start_element` until the first child event.
/// `start_prefix_mapping` declares a binding on the *next* element started;
/// `end_prefix_mapping` closes it and withdraws it if no element took it.
/// Serializers repair missing namespace declarations for element and attribute
/// names themselves, so callers only need prefix mappings to influence which
/// prefix is used.
pub trait ResultSerializer {
    fn start_document(&mut self);
    fn end_document(&mut self);
    fn start_element(&mut self, name: &QName);
    fn end_element(&mut self);
    fn add_attribute(&mut self, name: &QName, value: &str);
    fn characters(&mut self, text: &str);
    fn comment(&mut self, text: &str);
    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str);
    fn end_prefix_mapping(&mut self, prefix: &str);

    /// A prefix currently bound to `uri`, if any. The empty string stands for the
    /// default namespace.
    fn get_prefix(&self, uri: &str) -> Option<String>;

    /// A prefix not bound to anything in the current scope.
    fn generate_next_prefix(&mut self) -> String;

    /// Bindings in scope at the current position, outermost first.
    fn in_scope_namespaces(&self) -> Vec<(String, String)>;
}

/// One recorded serializer call.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    StartDocument,
    EndDocument,
    StartElement(QName),
    EndElement,
    Attribute(QName, String),
    Characters(String),
    Comment(String),
    StartPrefixMapping(String, String),
    EndPrefixMapping(String),
}

impl OutputEvent {
    pub fn replay(&self, out: &mut dyn ResultSerializer) {
        match self {
            OutputEvent::StartDocument => out.start_document(),
            OutputEvent::EndDocument => out.end_document(),
            OutputEvent::StartElement(name) => out.start_element(name),
            OutputEvent::EndElement => out.end_element(),
            OutputEvent::Attribute(name, value) => out.add_attribute(name, value),
            OutputEvent::Characters(text) => out.characters(text),
            OutputEvent::Comment(text) => out.comment(text),
            OutputEvent::StartPrefixMapping(prefix, uri) => out.start_prefix_mapping(prefix, uri),
            OutputEvent::EndPrefixMapping(prefix) => out.end_prefix_mapping(prefix),
        }
    }
}
