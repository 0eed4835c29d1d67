use crate::ast::{Expr, NodeId};
use crate::error::{XsltError, codes};
use crate::executor::TemplateExecutor;
use crate::output::ResultSerializer;
use weft_types::{QName, XdmValue};

impl TemplateExecutor {
    pub(crate) fn handle_message(
        &mut self,
        id: NodeId,
        select: Option<&Expr>,
        terminate: bool,
        error_code: Option<&QName>,
        _out: &mut dyn ResultSerializer,
    ) -> Result<(), XsltError> {
        let has_content = !self.shared.stylesheet.children(id).is_empty();
        let text = match (select, has_content) {
            (Some(_), true) => {
                return Err(XsltError::static_error(
                    codes::XTSE0010,
                    "xsl:message must not have both a select attribute and content",
                ));
            }
            (Some(expr), false) => {
                let value = self.evaluate(id, expr)?;
                self.xpath(id).string_join(&value, " ")
            }
            (None, _) => self.children_to_string(id)?,
        };

        let locator = self.shared.stylesheet.node(id).locator.clone();
        self.shared.log.message(text.clone(), locator.as_ref());

        if terminate {
            let code = error_code
                .cloned()
                .unwrap_or_else(|| QName::error_code(codes::XTMM9000));
            return Err(XsltError::user(
                code,
                format!("processing terminated by xsl:message: {text}"),
                Some(XdmValue::string(text)),
            ));
        }
        Ok(())
    }
}
