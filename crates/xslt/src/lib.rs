//! XSLT 3.0 instruction-execution core.
//!
//! The crate executes a composed instruction tree (see [`StylesheetBuilder`]) against
//! source documents held in a [`Dtm`]. Expressions are evaluated through the
//! [`Expression`] seam; the small built-in language in [`expr`] covers what the
//! instructions themselves need.
//!
//! Beyond the XSLT 2.0 basics it implements `xsl:try`/`xsl:catch`, `xsl:fork`,
//! `xsl:merge`, `xsl:for-each-group`, `xsl:result-document` and
//! `xsl:source-document`.

pub mod ast;
pub mod builtin_types;
pub mod compiler;
pub mod config;
pub mod context;
pub mod datasources;
pub mod diagnostics;
pub mod error;
pub mod executor;
pub mod expr;
pub mod expression;
pub mod keys;
pub mod output;
pub mod schema;
pub mod scope;
pub mod trace;
pub mod transformer;
pub mod variables;

mod executor_handlers;


pub use ast::{Avt, Instruction, NodeId, Validation};
pub use compiler::{Stylesheet, StylesheetBuilder};
pub use config::{ForkExecutor, TransformConfig};
pub use datasources::Dtm;
pub use diagnostics::{Diagnostic, DiagnosticLog, Severity};
pub use error::{Locator, XsltError};
pub use expression::Expression;
pub use output::{EventBuffer, MarkupWriter, OutputMethod, OutputProperties, ResultSerializer};
pub use schema::InMemorySchema;
pub use trace::{LogTraceListener, TraceListener};
pub use transformer::Transformer;
