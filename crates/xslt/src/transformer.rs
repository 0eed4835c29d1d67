//! The embedding entry point.
//!
//! A [`Transformer`] pairs a composed [`Stylesheet`] with a source store, a
//! configuration and the optional collaborators, and runs a named template (or
//! any instruction body) against a context item.
//!
//! ```ignore
//! let transformer = Transformer::new(stylesheet)
//!     .with_config(TransformConfig::default().with_strict(true))
//!     .with_result_sink(Arc::new(InMemoryResultSink::new()));
//! let doc = transformer.parse_document("<in/>", None)?;
//! let xml = transformer.call_template_to_string(&QName::local("main"), Some(doc.into()))?;
//! ```

use crate::ast::NodeId;
use crate::compiler::Stylesheet;
use crate::config::TransformConfig;
use crate::context::{ExecutionContext, Focus};
use crate::datasources::{Dtm, TransientDocuments};
use crate::diagnostics::{Diagnostic, DiagnosticLog};
use crate::error::{XsltError, codes};
use crate::executor::{Shared, TemplateExecutor};
use crate::output::{MarkupWriter, OutputProperties, ResultSerializer};
use crate::trace::{LogTraceListener, NoopTraceListener, TraceListener};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use weft_traits::{ResourceProvider, ResultSink, SchemaValidator};
use weft_types::{NodeHandle, QName, XdmItem, XdmValue};

pub struct Transformer {
    stylesheet: Arc<Stylesheet>,
    dtm: Arc<Dtm>,
    config: TransformConfig,
    resources: Option<Arc<dyn ResourceProvider>>,
    sink: Option<Arc<dyn ResultSink>>,
    schema: Option<Arc<dyn SchemaValidator>>,
    trace: Option<Arc<dyn TraceListener>>,
    parameters: HashMap<QName, XdmValue>,
    log: Arc<DiagnosticLog>,
}

impl Transformer {
    pub fn new(stylesheet: impl Into<Arc<Stylesheet>>) -> Self {
        Self {
            stylesheet: stylesheet.into(),
            dtm: Arc::new(Dtm::new()),
            config: TransformConfig::default(),
            resources: None,
            sink: None,
            schema: None,
            trace: None,
            parameters: HashMap::new(),
            log: Arc::new(DiagnosticLog::new()),
        }
    }

    pub fn with_config(mut self, config: TransformConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_resource_provider(mut self, provider: Arc<dyn ResourceProvider>) -> Self {
        self.resources = Some(provider);
        self
    }

    pub fn with_result_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_schema(mut self, schema: Arc<dyn SchemaValidator>) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Overrides the listener chosen from [`TransformConfig::trace`].
    pub fn with_trace_listener(mut self, listener: Arc<dyn TraceListener>) -> Self {
        self.trace = Some(listener);
        self
    }

    /// Supplies a value for a global `xsl:param`.
    pub fn with_parameter(mut self, name: QName, value: XdmValue) -> Self {
        self.parameters.insert(name, value);
        self
    }

    pub fn stylesheet(&self) -> &Stylesheet {
        &self.stylesheet
    }

    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    pub fn dtm(&self) -> &Dtm {
        &self.dtm
    }

    /// Parses an XML document into the source store and returns its document node.
    pub fn parse_document(&self, text: &str, uri: Option<&str>) -> Result<NodeHandle, XsltError> {
        self.dtm.parse_xml(text, uri)
    }

    /// Warnings and `xsl:message` output of every run so far.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.log.entries()
    }

    pub fn messages(&self) -> Vec<String> {
        self.log.messages()
    }

    /// Properties of the principal result: the unnamed output declaration if the
    /// stylesheet has one, otherwise the configured default.
    pub fn primary_output(&self) -> OutputProperties {
        self.stylesheet
            .output(None)
            .cloned()
            .unwrap_or_else(|| self.config.default_output.clone())
    }

    fn shared(&self) -> Arc<Shared> {
        let trace = match &self.trace {
            Some(listener) => Arc::clone(listener),
            None if self.config.trace => Arc::new(LogTraceListener) as Arc<dyn TraceListener>,
            None => Arc::new(NoopTraceListener),
        };
        Arc::new(Shared {
            stylesheet: Arc::clone(&self.stylesheet),
            dtm: Arc::clone(&self.dtm),
            config: self.config.clone(),
            executor: self.config.executor(),
            resources: self.resources.clone(),
            sink: self.sink.clone(),
            schema: self.schema.clone(),
            trace,
            log: Arc::clone(&self.log),
            transient: TransientDocuments::new(),
        })
    }

    /// An executor positioned on `context` with every global bound.
    fn start(
        &self,
        shared: Arc<Shared>,
        context: Option<XdmItem>,
    ) -> Result<TemplateExecutor, XsltError> {
        let focus = context.map(Focus::singleton).unwrap_or_default();
        let ctx = ExecutionContext::new(focus, self.primary_output());
        let mut executor = TemplateExecutor::new(shared, ctx);
        executor.initialize_globals(&self.parameters)?;
        Ok(executor)
    }

    /// Runs the template named `name`, writing its result to `out`.
    pub fn call_template(
        &self,
        name: &QName,
        context: Option<XdmItem>,
        out: &mut dyn ResultSerializer,
    ) -> Result<(), XsltError> {
        let template = self.stylesheet.template(name).ok_or_else(|| {
            XsltError::static_error(codes::XTSE0650, format!("no template named {name}"))
        })?;
        debug!("call-template {name}");
        self.run_body(template, context, out)
    }

    /// Runs the children of instruction `body` (typically an `xsl:template`) in a
    /// fresh local frame. Secondary result documents reach the sink only when the
    /// whole run succeeds; temporary trees are released either way.
    pub fn run_body(
        &self,
        body: NodeId,
        context: Option<XdmItem>,
        out: &mut dyn ResultSerializer,
    ) -> Result<(), XsltError> {
        let shared = self.shared();
        let result = self.execute(Arc::clone(&shared), body, context, out);
        shared.transient.release(&self.dtm);
        if let Err(e) = &result {
            debug!("transformation failed: {e}");
        }
        result
    }

    fn execute(
        &self,
        shared: Arc<Shared>,
        body: NodeId,
        context: Option<XdmItem>,
        out: &mut dyn ResultSerializer,
    ) -> Result<(), XsltError> {
        let mut executor = self.start(shared, context)?;
        executor.invoke_template(body, &[], out)?;
        executor.commit_results()
    }

    /// Runs the template named `name` and serializes the principal result.
    pub fn call_template_to_string(
        &self,
        name: &QName,
        context: Option<XdmItem>,
    ) -> Result<String, XsltError> {
        let properties = self.primary_output();
        let mapping = self
            .stylesheet
            .character_mapping(&properties.use_character_maps)?;
        let mut writer = MarkupWriter::new(&properties).with_character_map(mapping);
        self.call_template(name, context, &mut writer)?;
        writer.finish()
    }
}
