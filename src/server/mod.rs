//! Tool-calling surface: tool factory, registry listener, execution router
//! and the JSON-RPC façade

pub mod executor;
pub mod factory;
pub mod listener;
pub mod router;
pub mod server;

pub use executor::{
    CallContext, ChunkStream, ElicitResult, ElicitationAction, ElicitationHandler, Elicitor, ExecutionResult,
    Executor, Identity, ProgressReporter, ProgressSink,
};
pub use factory::{BuiltTool, ToolBuilder, ToolNaming};
pub use listener::{RegistryListener, RegistrySnapshot, SnapshotEntry};
pub use router::{CallRequest, CallResult, ExecutionRouter};
pub use server::{BridgeServer, ClientSession, DOCS_SCHEME, PROTOCOL_VERSION};
