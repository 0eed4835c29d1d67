//! Text, sequence and node construction: `xsl:value-of`, `xsl:sequence`, literal
//! result elements, `xsl:element`, `xsl:attribute`, `xsl:document`, `xsl:comment`.

use crate::ast::{Avt, Expr, NodeId, Validation};
use crate::builtin_types::validate_builtin;
use crate::error::{XsltError, codes};
use crate::executor::TemplateExecutor;
use crate::output::{EventBuffer, OutputEvent, ResultSerializer};
use weft_types::QName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Constructed {
    Element,
    Attribute,
}

impl Constructed {
    fn label(self) -> &'static str {
        match self {
            Constructed::Element => "element",
            Constructed::Attribute => "attribute",
        }
    }

    fn invalid_name_code(self) -> &'static str {
        match self {
            Constructed::Element => codes::XTDE0820,
            Constructed::Attribute => codes::XTDE0850,
        }
    }

    fn unbound_prefix_code(self) -> &'static str {
        match self {
            Constructed::Element => codes::XTDE0830,
            Constructed::Attribute => codes::XTDE0860,
        }
    }

    fn invalid_value_code(self) -> &'static str {
        match self {
            Constructed::Element => codes::XTTE1510,
            Constructed::Attribute => codes::XTTE1555,
        }
    }
}

fn exclusive_content(
    select: bool,
    content: bool,
    code: &str,
    instruction: &str,
) -> Result<(), XsltError> {
    if select && content {
        return Err(XsltError::static_error(
            code,
            format!("{instruction} must not have both a select attribute and content"),
        ));
    }
    Ok(())
}

fn check_type_and_validation(
    type_name: Option<&QName>,
    validation: Option<Validation>,
    instruction: &str,
) -> Result<(), XsltError> {
    if type_name.is_some() && validation.is_some() {
        return Err(XsltError::type_error(
            codes::XTTE1540,
            format!("{instruction} must not specify both type and validation"),
        ));
    }
    Ok(())
}

/// Separates `--` runs and a trailing `-` so the text is a legal comment.
fn comment_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    for c in text.chars() {
        if c == '-' && out.ends_with('-') {
            out.push(' ');
        }
        out.push(c);
    }
    if out.ends_with('-') {
        out.push(' ');
    }
    out
}

impl TemplateExecutor {
    fn has_content(&self, id: NodeId) -> bool {
        !self.shared.stylesheet.children(id).is_empty()
    }

    pub(crate) fn handle_value_of(
        &mut self,
        id: NodeId,
        select: Option<&Expr>,
        separator: Option<&Avt>,
        out: &mut dyn ResultSerializer,
    ) -> Result<(), XsltError> {
        exclusive_content(
            select.is_some(),
            self.has_content(id),
            codes::XTSE0870,
            "xsl:value-of",
        )?;
        let text = match select {
            Some(expr) => {
                let value = self.evaluate(id, expr)?;
                let separator = match separator {
                    Some(avt) => self.evaluate_avt(id, avt)?,
                    None => " ".to_string(),
                };
                self.xpath(id).string_join(&value, &separator)
            }
            None => self.children_to_string(id)?,
        };
        out.characters(&text);
        Ok(())
    }

    pub(crate) fn handle_sequence(
        &mut self,
        id: NodeId,
        select: Option<&Expr>,
        out: &mut dyn ResultSerializer,
    ) -> Result<(), XsltError> {
        exclusive_content(
            select.is_some(),
            self.has_content(id),
            codes::XTSE3185,
            "xsl:sequence",
        )?;
        match select {
            Some(expr) => {
                let value = self.evaluate(id, expr)?;
                self.emit_value(&value, out);
                Ok(())
            }
            None => self.execute_children(id, out),
        }
    }

    pub(crate) fn handle_literal_element(
        &mut self,
        id: NodeId,
        name: &QName,
        attributes: &[(QName, Avt)],
        out: &mut dyn ResultSerializer,
    ) -> Result<(), XsltError> {
        out.start_element(name);
        for (attribute, avt) in attributes {
            let value = self.evaluate_avt(id, avt)?;
            out.add_attribute(attribute, &value);
        }
        self.execute_children(id, out)?;
        out.end_element();
        Ok(())
    }

    /// Resolves the computed name of an `xsl:element` or `xsl:attribute`.
    /// `Ok(None)` means the node is omitted after a recoverable problem. The flag
    /// is set when the prefix was generated and the caller must declare it.
    fn computed_name(
        &mut self,
        id: NodeId,
        name: &Avt,
        namespace: Option<&Avt>,
        role: Constructed,
        out: &mut dyn ResultSerializer,
    ) -> Result<Option<(QName, bool)>, XsltError> {
        let lexical = self.evaluate_avt(id, name)?;
        let lexical = lexical.trim();

        if role == Constructed::Attribute && lexical == "xmlns" {
            self.recoverable(id, codes::XTDE0855, "an attribute must not be named xmlns")?;
            return Ok(None);
        }
        let Ok((prefix, local)) = QName::split_lexical(lexical) else {
            self.recoverable(
                id,
                role.invalid_name_code(),
                format!("'{lexical}' is not a valid {} name", role.label()),
            )?;
            return Ok(None);
        };
        let prefix = prefix.filter(|p| !p.is_empty());

        let uri = match (namespace, prefix) {
            (Some(avt), _) => self.evaluate_avt(id, avt)?,
            (None, Some(p)) => match self.resolve_static_prefix(id, p) {
                Some(uri) => uri,
                None => {
                    self.recoverable(
                        id,
                        role.unbound_prefix_code(),
                        format!("namespace prefix '{p}' of {} name '{lexical}' is not declared", role.label()),
                    )?;
                    return Ok(None);
                }
            },
            (None, None) if role == Constructed::Element => self
                .shared
                .stylesheet
                .node(id)
                .namespaces
                .default_element_namespace()
                .unwrap_or_default()
                .to_string(),
            (None, None) => String::new(),
        };

        if uri.is_empty() {
            return Ok(Some((QName::local(local), false)));
        }
        let (prefix, generated) = match prefix {
            Some(p) if p != "xmlns" => (p.to_string(), false),
            _ => match out.get_prefix(&uri) {
                Some(existing) if !(existing.is_empty() && role == Constructed::Attribute) => {
                    (existing, false)
                }
                _ => (out.generate_next_prefix(), true),
            },
        };
        Ok(Some((QName::prefixed(prefix, uri, local), generated)))
    }

    /// Writes the element `qname` around `content`, declaring a generated prefix
    /// for exactly the element's scope.
    fn write_element(
        &mut self,
        qname: &QName,
        generated: bool,
        out: &mut dyn ResultSerializer,
        content: impl FnOnce(&mut Self, &mut dyn ResultSerializer) -> Result<(), XsltError>,
    ) -> Result<(), XsltError> {
        if generated {
            out.start_prefix_mapping(qname.prefix(), qname.namespace_uri());
        }
        out.start_element(qname);
        content(self, out)?;
        out.end_element();
        if generated {
            out.end_prefix_mapping(qname.prefix());
        }
        Ok(())
    }

    /// Checks `value` against a named simple type: built-in types directly, anything
    /// else through the attached schema.
    fn check_type(&self, type_name: &QName, value: &str, code: &str) -> Result<(), XsltError> {
        if let Some(outcome) = validate_builtin(type_name, value) {
            return outcome.map_err(|e| XsltError::type_error(code, e.to_string()));
        }
        match &self.shared.schema {
            Some(schema) if schema.has_type(type_name) => schema
                .validate(value, type_name)
                .map_err(|e| XsltError::type_error(code, e.to_string())),
            _ => Err(XsltError::static_error(
                codes::XTSE1520,
                format!("type {type_name} is not a built-in type or a type of the schema in use"),
            )),
        }
    }

    fn validate_constructed(
        &self,
        name: &QName,
        value: &str,
        type_name: Option<&QName>,
        validation: Option<Validation>,
        role: Constructed,
    ) -> Result<(), XsltError> {
        let code = role.invalid_value_code();
        if let Some(type_name) = type_name {
            return self.check_type(type_name, value, code);
        }
        let Some(mode @ (Validation::Strict | Validation::Lax)) = validation else {
            return Ok(());
        };
        let declared = self.shared.schema.as_ref().and_then(|schema| match role {
            Constructed::Element => schema.element_declaration(name),
            Constructed::Attribute => schema.attribute_declaration(name),
        });
        match declared {
            Some(declared) => self.check_type(&declared, value, code),
            None if mode == Validation::Strict => Err(XsltError::type_error(
                codes::XTTE1512,
                format!("strict validation: no declaration for {} {name}", role.label()),
            )),
            None => Ok(()),
        }
    }

    pub(crate) fn handle_element(
        &mut self,
        id: NodeId,
        name: &Avt,
        namespace: Option<&Avt>,
        type_name: Option<&QName>,
        validation: Option<Validation>,
        out: &mut dyn ResultSerializer,
    ) -> Result<(), XsltError> {
        check_type_and_validation(type_name, validation, "xsl:element")?;

        let Some((qname, generated)) =
            self.computed_name(id, name, namespace, Constructed::Element, out)?
        else {
            // Recovery: the content goes to the parent, minus leading attributes.
            let buffer = self.children_to_buffer(id, out)?;
            buffer
                .events()
                .iter()
                .skip_while(|e| matches!(e, OutputEvent::Attribute(..)))
                .for_each(|e| e.replay(out));
            return Ok(());
        };

        let validating = type_name.is_some()
            || matches!(validation, Some(Validation::Strict | Validation::Lax));
        if !validating {
            return self.write_element(&qname, generated, out, |this, out| {
                this.execute_children(id, out)
            });
        }

        let content = self.children_to_buffer(id, out)?;
        self.validate_constructed(
            &qname,
            &content.text_content(),
            type_name,
            validation,
            Constructed::Element,
        )?;
        self.write_element(&qname, generated, out, |_, out| {
            content.replay(out);
            Ok(())
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn handle_attribute(
        &mut self,
        id: NodeId,
        name: &Avt,
        namespace: Option<&Avt>,
        select: Option<&Expr>,
        separator: Option<&Avt>,
        type_name: Option<&QName>,
        validation: Option<Validation>,
        out: &mut dyn ResultSerializer,
    ) -> Result<(), XsltError> {
        check_type_and_validation(type_name, validation, "xsl:attribute")?;
        exclusive_content(
            select.is_some(),
            self.has_content(id),
            codes::XTSE0840,
            "xsl:attribute",
        )?;

        let Some((qname, _)) =
            self.computed_name(id, name, namespace, Constructed::Attribute, out)?
        else {
            return Ok(());
        };

        let value = match select {
            Some(expr) => {
                let selected = self.evaluate(id, expr)?;
                let separator = match separator {
                    Some(avt) => self.evaluate_avt(id, avt)?,
                    None => " ".to_string(),
                };
                self.xpath(id).string_join(&selected, &separator)
            }
            None => self.children_to_string(id)?,
        };

        self.validate_constructed(&qname, &value, type_name, validation, Constructed::Attribute)?;
        out.add_attribute(&qname, &value);
        Ok(())
    }

    pub(crate) fn handle_document(
        &mut self,
        id: NodeId,
        type_name: Option<&QName>,
        validation: Option<Validation>,
        out: &mut dyn ResultSerializer,
    ) -> Result<(), XsltError> {
        check_type_and_validation(type_name, validation, "xsl:document")?;
        let content = self.children_to_buffer(id, out)?;

        if let Some(type_name) = type_name {
            self.check_type(type_name, &content.text_content(), codes::XTTE1510)?;
        } else if matches!(validation, Some(Validation::Strict | Validation::Lax)) {
            for (name, text) in top_level_elements(&content) {
                self.validate_constructed(&name, &text, None, validation, Constructed::Element)?;
            }
        }

        out.start_document();
        content.replay(out);
        out.end_document();
        Ok(())
    }

    pub(crate) fn handle_comment(
        &mut self,
        id: NodeId,
        select: Option<&Expr>,
        out: &mut dyn ResultSerializer,
    ) -> Result<(), XsltError> {
        exclusive_content(
            select.is_some(),
            self.has_content(id),
            codes::XTSE0940,
            "xsl:comment",
        )?;
        let text = match select {
            Some(expr) => {
                let value = self.evaluate(id, expr)?;
                self.xpath(id).string_join(&value, " ")
            }
            None => self.children_to_string(id)?,
        };
        out.comment(&comment_text(&text));
        Ok(())
    }
}

/// Names and string values of the outermost elements recorded in `buffer`.
fn top_level_elements(buffer: &EventBuffer) -> Vec<(QName, String)> {
    let mut found = Vec::new();
    let mut depth = 0usize;
    for event in buffer.events() {
        match event {
            OutputEvent::StartElement(name) => {
                if depth == 0 {
                    found.push((name.clone(), String::new()));
                }
                depth += 1;
            }
            OutputEvent::EndElement => depth = depth.saturating_sub(1),
            OutputEvent::Characters(text) if depth > 0 => {
                if let Some((_, value)) = found.last_mut() {
                    value.push_str(text);
                }
            }
            _ => {}
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_text_breaks_double_hyphens() {
        assert_eq!(comment_text("a--b"), "a- -b");
        assert_eq!(comment_text("a---b"), "a- - -b");
        assert_eq!(comment_text("end-"), "end- ");
        assert_eq!(comment_text("plain"), "plain");
    }

    #[test]
    fn outermost_elements_collect_nested_text() {
        let mut buffer = EventBuffer::new();
        buffer.start_element(&QName::local("a"));
        buffer.characters("1");
        buffer.start_element(&QName::local("b"));
        buffer.characters("2");
        buffer.end_element();
        buffer.end_element();
        buffer.start_element(&QName::local("c"));
        buffer.end_element();

        let found = top_level_elements(&buffer);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0], (QName::local("a"), "12".to_string()));
        assert_eq!(found[1].0, QName::local("c"));
    }
}
