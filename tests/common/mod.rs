use weft::{
    Instruction, OutputProperties, QName, Stylesheet, StylesheetBuilder, TransformConfig,
    Transformer, XsltError,
};
use weft::xslt::NodeId;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Base URI every test resolves relative `href`s against.
pub const BASE: &str = "file:///work/";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Default configuration without the XML declaration, so outputs compare as plain strings.
pub fn config() -> TransformConfig {
    TransformConfig::default()
        .with_base_uri(BASE)
        .with_default_output(OutputProperties::default().with_omit_xml_declaration(true))
}

/// Adds the named template `main` to the stylesheet root.
pub fn main_template(b: &mut StylesheetBuilder) -> NodeId {
    named_template(b, "main")
}

pub fn named_template(b: &mut StylesheetBuilder, name: &str) -> NodeId {
    let root = b.root();
    b.add(
        root,
        Instruction::Template {
            name: Some(QName::local(name)),
        },
    )
}

pub fn transformer(stylesheet: Stylesheet) -> Transformer {
    init_logging();
    Transformer::new(stylesheet).with_config(config())
}

/// Runs `main` with no context item.
pub fn run_main(transformer: &Transformer) -> Result<String, XsltError> {
    transformer.call_template_to_string(&QName::local("main"), None)
}
