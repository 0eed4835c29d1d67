//! Non-fatal diagnostics and `xsl:message` output collected during a run.

use crate::error::Locator;
use log::{info, warn};
use std::sync::Mutex;
use weft_types::QName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Message,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<QName>,
    pub message: String,
    pub locator: Option<Locator>,
}

/// Thread-safe log shared by every branch of a transformation.
#[derive(Debug, Default)]
pub struct DiagnosticLog {
    entries: Mutex<Vec<Diagnostic>>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, diagnostic: Diagnostic) {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(diagnostic),
            Err(poisoned) => poisoned.into_inner().push(diagnostic),
        }
    }

    /// A recoverable problem: logged and recorded, execution continues.
    pub fn warning(&self, code: Option<&str>, message: impl Into<String>, locator: Option<&Locator>) {
        let message = message.into();
        match (code, locator) {
            (Some(code), Some(l)) => warn!("{code}: {message} at {l}"),
            (Some(code), None) => warn!("{code}: {message}"),
            (None, _) => warn!("{message}"),
        }
        self.push(Diagnostic {
            severity: Severity::Warning,
            code: code.map(QName::error_code),
            message,
            locator: locator.cloned(),
        });
    }

    pub fn message(&self, text: impl Into<String>, locator: Option<&Locator>) {
        let text = text.into();
        info!("xsl:message: {text}");
        self.push(Diagnostic {
            severity: Severity::Message,
            code: None,
            message: text,
            locator: locator.cloned(),
        });
    }

    pub fn entries(&self) -> Vec<Diagnostic> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn warnings(&self) -> Vec<Diagnostic> {
        self.filtered(Severity::Warning)
    }

    pub fn messages(&self) -> Vec<String> {
        self.filtered(Severity::Message)
            .into_iter()
            .map(|d| d.message)
            .collect()
    }

    fn filtered(&self, severity: Severity) -> Vec<Diagnostic> {
        self.entries()
            .into_iter()
            .filter(|d| d.severity == severity)
            .collect()
    }
}
