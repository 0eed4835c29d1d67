use crate::ast::{Instruction, NodeId};
use crate::error::{XsltError, codes};
use crate::executor::TemplateExecutor;
use crate::output::{EventBuffer, ResultSerializer};
use log::debug;
use std::sync::Arc;
use weft_traits::Executor;

impl TemplateExecutor {
    pub(crate) fn handle_fork(
        &mut self,
        id: NodeId,
        out: &mut dyn ResultSerializer,
    ) -> Result<(), XsltError> {
        let stylesheet = self.stylesheet();
        let children = stylesheet.children(id);

        let mut terminal_group = false;
        for (i, &child) in children.iter().enumerate() {
            match &stylesheet.node(child).kind {
                Instruction::Sequence { .. } => {}
                Instruction::ForEachGroup { .. } if i + 1 == children.len() => terminal_group = true,
                other => {
                    return Err(XsltError::type_error(
                        codes::XPTY0004,
                        format!(
                            "xsl:fork takes xsl:sequence branches and an optional final xsl:for-each-group, found {}",
                            other.name()
                        ),
                    ));
                }
            }
        }

        if terminal_group {
            debug!("fork: {} children run in order", children.len());
            return self.execute_children(id, out);
        }
        if children.is_empty() {
            return Ok(());
        }

        let workers = self.shared.config.fork_workers(children.len());
        debug!(
            "fork: {} branches on {} with {} workers",
            children.len(),
            self.shared.executor.name(),
            workers
        );

        let shared = Arc::clone(&self.shared);
        let mut ctx = self.ctx.clone();
        ctx.pending_results.clear();
        let seed = EventBuffer::inheriting(out);
        let branches: Vec<NodeId> = children.to_vec();
        let results = self
            .shared
            .executor
            .execute_bounded(branches, workers, move |branch| {
                let mut executor = TemplateExecutor::new(Arc::clone(&shared), ctx.clone());
                let mut buffer = seed.clone();
                executor
                    .with_null_template_rule(|this| this.execute(branch, &mut buffer))
                    .map(|()| (buffer, executor.ctx.pending_results))
            });

        let mut buffers = Vec::with_capacity(results.len());
        let mut documents = Vec::new();
        for (i, result) in results.into_iter().enumerate() {
            match result {
                Ok((buffer, pending)) => {
                    buffers.push(buffer);
                    documents.extend(pending);
                }
                Err(source) => {
                    return Err(XsltError::Fork {
                        branch: i + 1,
                        locator: stylesheet.node(id).locator.clone(),
                        source: Box::new(source),
                    });
                }
            }
        }
        self.adopt_results(documents)?;
        for buffer in &buffers {
            buffer.replay(out);
        }
        Ok(())
    }
}
