pub mod executor;
pub mod resource;
pub mod schema;
pub mod sink;

pub use executor::{Executor, ExecutorError, SyncExecutor};
pub use resource::{
    FilesystemResourceProvider, InMemoryResourceProvider, ResourceError, ResourceProvider,
    SharedResourceData,
};
pub use schema::{InvalidValue, SchemaValidator};
pub use sink::{FilesystemResultSink, InMemoryResultSink, ResultSink};
