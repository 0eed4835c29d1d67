//! One module per instruction family. Every handler is an inherent method on
//! [`TemplateExecutor`](crate::executor::TemplateExecutor) called from its
//! dispatch match.

mod analyze_string;
mod construct;
mod control_flow;
mod documents;
mod fork;
mod grouping;
mod merge;
mod message;
mod try_catch;
mod variables;
