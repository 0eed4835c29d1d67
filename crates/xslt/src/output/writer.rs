use super::{CharacterMapping, NamespaceStack, OutputMethod, OutputProperties, ResultSerializer};
use crate::error::XsltError;
use log::warn;
use quick_xml::Writer;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::borrow::Cow;
use weft_types::QName;

const HTML_VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

#[derive(Debug)]
struct PendingStart {
    name: String,
    attributes: Vec<(String, String)>,
}

/// Serializes result-tree events to markup (xml, html) or character data (text, json).
pub struct MarkupWriter {
    writer: Writer<Vec<u8>>,
    method: OutputMethod,
    character_map: Option<CharacterMapping>,
    pending: Option<PendingStart>,
    open: Vec<String>,
    namespaces: NamespaceStack,
    text: String,
    error: Option<String>,
}

impl MarkupWriter {
    pub fn new(properties: &OutputProperties) -> Self {
        let writer = if properties.indent && properties.method.is_markup() {
            Writer::new_with_indent(Vec::new(), b' ', 2)
        } else {
            Writer::new(Vec::new())
        };
        let mut this = Self {
            writer,
            method: properties.method,
            character_map: None,
            pending: None,
            open: Vec::new(),
            namespaces: NamespaceStack::new(),
            text: String::new(),
            error: None,
        };
        if properties.method == OutputMethod::Xml && !properties.omit_xml_declaration {
            let decl = BytesDecl::new("1.0", Some(properties.encoding.as_str()), None);
            this.write(Event::Decl(decl));
        }
        this
    }

    pub fn with_character_map(mut self, map: CharacterMapping) -> Self {
        if !map.is_empty() {
            self.character_map = Some(map);
        }
        self
    }

    pub fn method(&self) -> OutputMethod {
        self.method
    }

    /// Closes anything still open and returns the serialized result.
    pub fn finish(mut self) -> Result<String, XsltError> {
        if !self.method.is_markup() {
            return Ok(self.text);
        }
        while !self.open.is_empty() || self.pending.is_some() {
            self.end_element();
        }
        if let Some(message) = self.error {
            return Err(XsltError::resource(
                crate::error::codes::XTDE1480,
                format!("failed to serialize result: {message}"),
            ));
        }
        String::from_utf8(self.writer.into_inner()).map_err(|e| {
            XsltError::resource(crate::error::codes::XTDE1480, format!("non UTF-8 output: {e}"))
        })
    }

    fn write(&mut self, event: Event<'_>) {
        if let Err(e) = self.writer.write_event(event) {
            self.error.get_or_insert_with(|| e.to_string());
        }
    }

    fn flush_pending(&mut self) {
        if let Some(start) = self.pending.take() {
            let element = start_tag(&start);
            self.write(Event::Start(element));
            self.open.push(start.name);
        }
    }

    fn escape(&self, text: &str, in_attribute: bool) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            if let Some(replacement) = self.character_map.as_ref().and_then(|m| m.get(&c)) {
                out.push_str(replacement);
                continue;
            }
            match c {
                '&' => out.push_str("&amp;"),
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                '"' if in_attribute => out.push_str("&quot;"),
                '\n' if in_attribute => out.push_str("&#xA;"),
                _ => out.push(c),
            }
        }
        out
    }

    fn map_only(&self, text: &str) -> String {
        match &self.character_map {
            Some(map) => text
                .chars()
                .map(|c| map.get(&c).cloned().unwrap_or_else(|| c.to_string()))
                .collect(),
            None => text.to_string(),
        }
    }
}

fn start_tag(start: &PendingStart) -> BytesStart<'static> {
    let mut element = BytesStart::new(start.name.clone());
    for (key, value) in &start.attributes {
        element.push_attribute(Attribute {
            key: quick_xml::name::QName(key.as_bytes()),
            value: Cow::Owned(value.clone().into_bytes()),
        });
    }
    element.into_owned()
}

impl ResultSerializer for MarkupWriter {
    fn start_document(&mut self) {}

    fn end_document(&mut self) {}

    fn start_element(&mut self, name: &QName) {
        if !self.method.is_markup() {
            return;
        }
        self.flush_pending();
        let (lexical, declarations) = self.namespaces.open_element(name);
        let attributes = declarations
            .into_iter()
            .map(|(prefix, uri)| {
                let key = if prefix.is_empty() {
                    "xmlns".to_string()
                } else {
                    format!("xmlns:{prefix}")
                };
                (key, self.escape(&uri, true))
            })
            .collect();
        self.pending = Some(PendingStart {
            name: lexical,
            attributes,
        });
    }

    fn end_element(&mut self) {
        if !self.method.is_markup() {
            return;
        }
        if let Some(start) = self.pending.take() {
            let element = start_tag(&start);
            if self.method == OutputMethod::Html {
                let void = HTML_VOID_ELEMENTS.contains(&start.name.to_ascii_lowercase().as_str());
                self.write(Event::Start(element));
                if !void {
                    self.write(Event::End(BytesEnd::new(start.name)));
                }
            } else {
                self.write(Event::Empty(element));
            }
        } else if let Some(name) = self.open.pop() {
            self.write(Event::End(BytesEnd::new(name)));
        }
        self.namespaces.close_element();
    }

    fn add_attribute(&mut self, name: &QName, value: &str) {
        if !self.method.is_markup() {
            return;
        }
        if self.pending.is_none() {
            warn!("attribute {name} written after element content; ignored");
            return;
        }
        let (lexical, declaration) = self.namespaces.attribute_name(name);
        let escaped = self.escape(value, true);
        let declaration = declaration.map(|(prefix, uri)| (format!("xmlns:{prefix}"), self.escape(&uri, true)));
        if let Some(start) = self.pending.as_mut() {
            if let Some(decl) = declaration {
                start.attributes.push(decl);
            }
            match start.attributes.iter_mut().find(|(k, _)| *k == lexical) {
                Some(existing) => existing.1 = escaped,
                None => start.attributes.push((lexical, escaped)),
            }
        }
    }

    fn characters(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.method.is_markup() {
            let mapped = self.map_only(text);
            self.text.push_str(&mapped);
            return;
        }
        self.flush_pending();
        let escaped = self.escape(text, false);
        self.write(Event::Text(BytesText::from_escaped(escaped)));
    }

    fn comment(&mut self, text: &str) {
        if !self.method.is_markup() {
            return;
        }
        self.flush_pending();
        self.write(Event::Comment(BytesText::from_escaped(text.to_string())));
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

    fn bare() -> OutputProperties {
        OutputProperties::default().with_omit_xml_declaration(true)
    }

    #[test]
    fn writes_elements_attributes_and_text() {
        let mut w = MarkupWriter::new(&bare());
        w.start_element(&QName::local("root"));
        w.add_attribute(&QName::local("a"), "x<y");
        w.characters("1 & 2");
        w.start_element(&QName::local("empty"));
        w.end_element();
        w.end_element();
        assert_eq!(
            w.finish().expect("serialized"),
            r#"<root a="x&lt;y">1 &amp; 2<empty/></root>"#
        );
    }

    #[test]
    fn declaration_written_unless_omitted() {
        let mut w = MarkupWriter::new(&OutputProperties::default());
        w.start_element(&QName::local("r"));
        w.end_element();
        assert_eq!(
            w.finish().expect("serialized"),
            r#"<?xml version="1.0" encoding="UTF-8"?><r/>"#
        );
    }

    #[test]
    fn namespaced_names_are_declared() {
        let mut w = MarkupWriter::new(&bare());
        w.start_element(&QName::prefixed("p", "urn:p", "root"));
        w.add_attribute(&QName::new(Some("urn:q"), "att"), "v");
        w.end_element();
        assert_eq!(
            w.finish().expect("serialized"),
            r#"<p:root xmlns:p="urn:p" xmlns:ns0="urn:q" ns0:att="v"/>"#
        );
    }

    #[test]
    fn ended_prefix_mapping_is_not_declared_later() {
        let mut w = MarkupWriter::new(&bare());
        w.start_element(&QName::local("root"));
        w.start_prefix_mapping("ns0", "urn:a");
        w.end_prefix_mapping("ns0");
        w.start_element(&QName::local("plain"));
        w.end_element();
        w.end_element();
        assert_eq!(w.finish().expect("serialized"), "<root><plain/></root>");
    }

    #[test]
    fn html_void_elements_have_no_end_tag() {
        let props = bare().with_method(OutputMethod::Html);
        let mut w = MarkupWriter::new(&props);
        w.start_element(&QName::local("p"));
        w.start_element(&QName::local("br"));
        w.end_element();
        w.start_element(&QName::local("span"));
        w.end_element();
        w.end_element();
        assert_eq!(w.finish().expect("serialized"), "<p><br><span></span></p>");
    }

    #[test]
    fn text_method_keeps_character_data_only() {
        let props = bare().with_method(OutputMethod::Text);
        let mut w = MarkupWriter::new(&props);
        w.start_element(&QName::local("ignored"));
        w.characters("a < b");
        w.comment("gone");
        w.end_element();
        assert_eq!(w.finish().expect("serialized"), "a < b");
    }

    #[test]
    fn character_map_output_is_not_escaped() {
        let map = CharacterMapping::from([('©', "&copy;".to_string())]);
        let mut w = MarkupWriter::new(&bare()).with_character_map(map);
        w.start_element(&QName::local("c"));
        w.characters("© <");
        w.end_element();
        assert_eq!(w.finish().expect("serialized"), "<c>&copy; &lt;</c>");
    }
}
