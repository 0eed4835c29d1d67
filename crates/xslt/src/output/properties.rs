use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use weft_types::QName;

/// Replacement strings applied to characters on output.
pub type CharacterMapping = HashMap<char, String>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMethod {
    #[default]
    Xml,
    Html,
    Text,
    Json,
}

impl OutputMethod {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "xml" => Some(Self::Xml),
            "html" | "xhtml" => Some(Self::Html),
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn is_markup(self) -> bool {
        matches!(self, Self::Xml | Self::Html)
    }
}

/// Serialization parameters in effect for a result tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputProperties {
    pub method: OutputMethod,
    pub indent: bool,
    pub omit_xml_declaration: bool,
    pub encoding: String,
    #[serde(skip)]
    pub use_character_maps: Vec<QName>,
}

impl Default for OutputProperties {
    fn default() -> Self {
        Self {
            method: OutputMethod::Xml,
            indent: false,
            omit_xml_declaration: false,
            encoding: "UTF-8".to_string(),
            use_character_maps: Vec::new(),
        }
    }
}

impl OutputProperties {
    pub fn with_method(mut self, method: OutputMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_indent(mut self, indent: bool) -> Self {
        self.indent = indent;
        self
    }

    pub fn with_omit_xml_declaration(mut self, omit: bool) -> Self {
        self.omit_xml_declaration = omit;
        self
    }

    pub fn with_character_maps(mut self, names: Vec<QName>) -> Self {
        self.use_character_maps = names;
        self
    }

    /// Properties switched to HTML output, everything else kept.
    pub fn html(&self) -> Self {
        Self {
            method: OutputMethod::Html,
            omit_xml_declaration: true,
            ..self.clone()
        }
    }
}
