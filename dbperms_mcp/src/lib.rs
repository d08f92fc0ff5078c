pub mod config;
pub mod dispatcher;
pub mod envelope;
pub mod registry;
pub mod server;
pub mod shutdown;

pub use dispatcher::Dispatcher;
pub use envelope::{ToolError, ToolInvocation, ToolResult};
pub use server::PermissionsServer;
pub use shutdown::ShutdownGate;
