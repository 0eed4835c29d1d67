// XML loading into the source store using roxmltree
use super::SourceDocument;
use crate::error::XsltError;
use roxmltree::{Node, ParsingOptions};
use weft_types::{NodeKind, QName};

pub(super) fn parse(text: &str, uri: Option<&str>) -> Result<SourceDocument, XsltError> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let parsed = roxmltree::Document::parse_with_options(text, options)?;
    let mut document = SourceDocument::new(uri.map(str::to_string));
    for child in parsed.root().children() {
        copy_node(child, 0, &mut document);
    }
    Ok(document)
}

fn qname_of(node: Node<'_, '_>, namespace: Option<&str>, local: &str) -> QName {
    match namespace {
        Some(ns) => {
            let prefix = node.lookup_prefix(ns).unwrap_or("");
            QName::prefixed(prefix, ns, local)
        }
        None => QName::local(local),
    }
}

fn copy_node(node: Node<'_, '_>, parent: u32, document: &mut SourceDocument) {
    if node.is_element() {
        let tag = node.tag_name();
        let name = qname_of(node, tag.namespace(), tag.name());
        let index = document.append_child(parent, NodeKind::Element, Some(name), String::new());
        for attr in node.attributes() {
            let name = qname_of(node, attr.namespace(), attr.name());
            document.set_attribute(index, name, attr.value().to_string());
        }
        for child in node.children() {
            copy_node(child, index, document);
        }
    } else if node.is_text() {
        if let Some(text) = node.text() {
            document.append_text(parent, text);
        }
    } else if node.is_comment() {
        let text = node.text().unwrap_or_default().to_string();
        document.append_child(parent, NodeKind::Comment, None, text);
    }
}
