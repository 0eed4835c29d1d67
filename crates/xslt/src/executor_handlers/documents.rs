//! `xsl:result-document` and `xsl:source-document`.

use crate::ast::{Avt, NodeId};
use crate::context::{Focus, PendingResult};
use crate::error::{XsltError, codes};
use crate::executor::TemplateExecutor;
use crate::output::{MarkupWriter, OutputMethod, OutputProperties, ResultSerializer};
use log::debug;
use url::Url;
use weft_types::{NodeHandle, QName, XdmItem};

impl TemplateExecutor {
    /// Resolves `href` against the configured base URI, falling back to the
    /// stylesheet's own.
    fn resolve_href(&self, href: &str) -> Result<String, XsltError> {
        let unresolvable = |reason: String| {
            XsltError::resource(codes::FODC0005, format!("cannot resolve '{href}': {reason}"))
        };
        match Url::parse(href) {
            Ok(absolute) => Ok(absolute.to_string()),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self
                    .shared
                    .config
                    .base_uri
                    .as_deref()
                    .or(self.shared.stylesheet.base_uri())
                    .ok_or_else(|| unresolvable("no base URI is known".to_string()))?;
                Url::parse(base)
                    .and_then(|base| base.join(href))
                    .map(|resolved| resolved.to_string())
                    .map_err(|e| unresolvable(e.to_string()))
            }
            Err(e) => Err(unresolvable(e.to_string())),
        }
    }

    /// Runs `f` with `properties` as the active output properties.
    fn with_output_properties<R>(
        &mut self,
        properties: OutputProperties,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let saved = std::mem::replace(&mut self.ctx.output_properties, properties);
        let result = f(self);
        self.ctx.output_properties = saved;
        result
    }

    fn result_properties(
        &self,
        format: Option<&QName>,
        method: Option<OutputMethod>,
    ) -> Result<OutputProperties, XsltError> {
        let stylesheet = &self.shared.stylesheet;
        let mut properties = match format {
            Some(name) => stylesheet.output(Some(name)).cloned().ok_or_else(|| {
                XsltError::dynamic(
                    codes::XTDE1460,
                    format!("format {name} does not name an output declaration"),
                )
            })?,
            None => stylesheet
                .output(None)
                .cloned()
                .unwrap_or_else(|| self.shared.config.default_output.clone()),
        };
        if let Some(method) = method {
            properties.method = method;
        }
        if properties.method == OutputMethod::Html {
            properties = properties.html();
        }
        Ok(properties)
    }

    pub(crate) fn handle_result_document(
        &mut self,
        id: NodeId,
        href: Option<&Avt>,
        format: Option<&QName>,
        method: Option<OutputMethod>,
        out: &mut dyn ResultSerializer,
    ) -> Result<(), XsltError> {
        let properties = self.result_properties(format, method)?;
        let href = match href {
            Some(avt) => self.evaluate_avt(id, avt)?,
            None => String::new(),
        };
        let href = href.trim();

        if href.is_empty() || href == "#default" {
            debug!("result-document: principal output as {:?}", properties.method);
            return self.with_output_properties(properties, |this| this.execute_children(id, out));
        }

        let uri = self.resolve_href(href)?;
        if self.ctx.active_result_documents.contains(&uri) {
            return Err(XsltError::dynamic(
                codes::XTDE1500,
                format!("result document {uri} is already being written"),
            ));
        }
        if self.shared.sink.is_none() {
            return Err(XsltError::dynamic(
                codes::XTDE1480,
                format!("no result sink is configured to receive {uri}"),
            ));
        }
        if self.ctx.pending_results.iter().any(|p| p.uri == uri) {
            return Err(already_written(&uri));
        }

        let mapping = self
            .shared
            .stylesheet
            .character_mapping(&properties.use_character_maps)?;
        let mut writer = MarkupWriter::new(&properties).with_character_map(mapping);
        let method = properties.method;

        self.ctx.active_result_documents.push(uri.clone());
        let result =
            self.with_output_properties(properties, |this| this.execute_children(id, &mut writer));
        self.ctx.active_result_documents.pop();
        result?;

        let content = writer.finish()?;
        if method == OutputMethod::Json
            && let Err(e) = serde_json::from_str::<serde_json::Value>(&content)
        {
            return Err(XsltError::dynamic(
                codes::FOJS0001,
                format!("result document {uri} is not valid JSON: {e}"),
            ));
        }
        debug!("result-document: {uri} ready ({} bytes)", content.len());
        self.ctx.pending_results.push(PendingResult { uri, content });
        Ok(())
    }

    /// Takes over result documents completed by a fork branch, failing with
    /// XTDE1490 if any of them repeats a URI already pending.
    pub(crate) fn adopt_results(&mut self, results: Vec<PendingResult>) -> Result<(), XsltError> {
        for (i, result) in results.iter().enumerate() {
            let repeated = self.ctx.pending_results.iter().any(|p| p.uri == result.uri)
                || results[..i].iter().any(|p| p.uri == result.uri);
            if repeated {
                return Err(already_written(&result.uri));
            }
        }
        self.ctx.pending_results.extend(results);
        Ok(())
    }

    /// Hands every pending result document to the result sink.
    pub(crate) fn commit_results(&mut self) -> Result<(), XsltError> {
        let pending = std::mem::take(&mut self.ctx.pending_results);
        if pending.is_empty() {
            return Ok(());
        }
        let sink = self.shared.sink.clone().ok_or_else(|| {
            XsltError::dynamic(codes::XTDE1480, "no result sink is configured")
        })?;
        for PendingResult { uri, content } in pending {
            sink.write(&uri, content.as_bytes())?;
            debug!(
                "result-document: wrote {} bytes to {uri} via {}",
                content.len(),
                sink.name()
            );
        }
        Ok(())
    }

    pub(crate) fn handle_source_document(
        &mut self,
        id: NodeId,
        href: &Avt,
        streamable: bool,
        out: &mut dyn ResultSerializer,
    ) -> Result<(), XsltError> {
        if streamable && !self.shared.config.streaming_input {
            return Err(XsltError::type_error(
                codes::XTTE0505,
                "streamable source documents require a streaming-capable transformation input",
            ));
        }
        let href = self.evaluate_avt(id, href)?;
        let uri = self.resolve_href(href.trim())?;

        let document = match self.load_document(&uri) {
            Ok(document) => document,
            Err(e) => {
                let locator = self.shared.stylesheet.node(id).locator.as_ref();
                self.shared
                    .log
                    .warning(None, format!("xsl:source-document skipped {uri}: {e}"), locator);
                return Ok(());
            }
        };
        self.with_focus(Focus::singleton(XdmItem::Node(document)), |this| {
            this.execute_children(id, out)
        })
    }

    /// The document node for `uri`: from the source store if already loaded,
    /// otherwise fetched from the resource provider and parsed.
    fn load_document(&self, uri: &str) -> Result<NodeHandle, XsltError> {
        if let Some(cached) = self.dtm().cached(uri) {
            return Ok(cached);
        }
        let provider = self.shared.resources.as_ref().ok_or_else(|| {
            XsltError::resource(codes::FODC0002, "no resource provider is configured")
        })?;
        let data = provider.load(uri)?;
        let text = std::str::from_utf8(&data).map_err(|e| {
            XsltError::resource(codes::FODC0002, format!("{uri} is not UTF-8: {e}"))
        })?;
        debug!("source-document: loaded {uri} through {}", provider.name());
        self.dtm().parse_xml(text, Some(uri))
    }
}

fn already_written(uri: &str) -> XsltError {
    XsltError::dynamic(
        codes::XTDE1490,
        format!("result document {uri} was already written"),
    )
}
