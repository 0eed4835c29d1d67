//! weft: an embeddable XSLT 3.0 instruction-execution core.
//!
//! This crate re-exports the workspace members under one name:
//!
//! - [`types`]: the XDM value model (QNames, atomic values, items, sequences)
//! - [`traits`]: collaborator seams (resources, result sinks, schema, executors)
//! - [`executor`]: executors for `xsl:fork` branches
//! - [`xslt`]: instruction tree, dispatch and the [`Transformer`] entry point
//!
//! ```ignore
//! use weft::{Instruction, QName, StylesheetBuilder, Transformer};
//!
//! let mut b = StylesheetBuilder::new();
//! let main = b.add(b.root(), Instruction::Template { name: Some(QName::local("main")) });
//! b.text(main, "hello");
//! let output = Transformer::new(b.compose()?).call_template_to_string(&QName::local("main"), None)?;
//! ```

pub use weft_executor as executor;
pub use weft_traits as traits;
pub use weft_types as types;
pub use weft_xslt as xslt;

pub use weft_traits::{
    FilesystemResourceProvider, FilesystemResultSink, InMemoryResourceProvider,
    InMemoryResultSink, ResourceProvider, ResultSink, SchemaValidator,
};
pub use weft_types::{AtomicValue, NodeHandle, QName, XdmItem, XdmValue};
pub use weft_xslt::{
    ForkExecutor, Instruction, MarkupWriter, OutputMethod, OutputProperties, Stylesheet,
    StylesheetBuilder, TransformConfig, Transformer, XsltError,
};
