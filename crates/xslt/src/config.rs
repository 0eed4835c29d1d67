//! Transformation-wide settings.

use crate::output::OutputProperties;
use serde::{Deserialize, Serialize};
use weft_executor::{ExecutorImpl, RayonExecutor, SyncExecutor};

/// Which executor runs the branches of `xsl:fork`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForkExecutor {
    /// Branches run one after another on the calling thread.
    Sync,
    #[default]
    Rayon,
}

/// Configuration for a transformation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TransformConfig {
    /// Raise errors instead of warnings for recoverable construction problems
    /// (invalid computed names, unbound prefixes, `xmlns` attributes).
    pub strict: bool,
    /// Route trace events to the `log` crate.
    pub trace: bool,
    /// Overrides the stylesheet base URI used to resolve `href` attributes.
    pub base_uri: Option<String>,
    /// Declares the primary input as streaming-capable, permitting
    /// `xsl:source-document streamable="yes"`.
    pub streaming_input: bool,
    /// Upper bound on worker threads for one `xsl:fork`; `None` sizes the pool
    /// to the number of branches.
    pub max_fork_threads: Option<usize>,
    pub fork_executor: ForkExecutor,
    /// Properties of the principal result.
    pub default_output: OutputProperties,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            strict: false,
            trace: false,
            base_uri: None,
            streaming_input: false,
            max_fork_threads: None,
            fork_executor: ForkExecutor::default(),
            default_output: OutputProperties::default(),
        }
    }
}

impl TransformConfig {
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = Some(base_uri.into());
        self
    }

    pub fn with_streaming_input(mut self, streaming: bool) -> Self {
        self.streaming_input = streaming;
        self
    }

    pub fn with_max_fork_threads(mut self, threads: usize) -> Self {
        self.max_fork_threads = Some(threads.max(1));
        self
    }

    pub fn with_fork_executor(mut self, executor: ForkExecutor) -> Self {
        self.fork_executor = executor;
        self
    }

    pub fn with_default_output(mut self, output: OutputProperties) -> Self {
        self.default_output = output;
        self
    }

    pub fn executor(&self) -> ExecutorImpl {
        match self.fork_executor {
            ForkExecutor::Sync => ExecutorImpl::Sync(SyncExecutor::new()),
            ForkExecutor::Rayon => ExecutorImpl::Rayon(RayonExecutor::new()),
        }
    }

    /// Worker count for a fork with `branches` branches.
    pub fn fork_workers(&self, branches: usize) -> usize {
        let branches = branches.max(1);
        match self.max_fork_threads {
            Some(max) => branches.min(max),
            None => branches,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputMethod;
    use weft_traits::Executor;

    #[test]
    fn defaults_are_lenient_and_parallel() {
        let config = TransformConfig::default();
        assert!(!config.strict);
        assert_eq!(config.fork_executor, ForkExecutor::Rayon);
        assert_eq!(config.executor().name(), "RayonExecutor");
        assert_eq!(config.fork_workers(4), 4);
    }

    #[test]
    fn fork_workers_respect_the_cap() {
        let config = TransformConfig::default().with_max_fork_threads(2);
        assert_eq!(config.fork_workers(5), 2);
        assert_eq!(config.fork_workers(1), 1);
        assert_eq!(config.fork_workers(0), 1);
    }

    #[test]
    fn deserializes_from_kebab_case_json() {
        let config: TransformConfig = serde_json::from_str(
            r#"{"strict": true, "fork-executor": "sync", "max-fork-threads": 3,
                "default-output": {"method": "html", "indent": true}}"#,
        )
        .unwrap();
        assert!(config.strict);
        assert_eq!(config.executor().name(), "SyncExecutor");
        assert_eq!(config.max_fork_threads, Some(3));
        assert_eq!(config.default_output.method, OutputMethod::Html);
        assert!(config.default_output.indent);
        assert_eq!(config.default_output.encoding, "UTF-8");
    }
}
