//! Client for tool-provider subprocesses.
//!
//! Tool providers are external processes (typically sandboxed containers)
//! that advertise named tools over a JSON-RPC 2.0 stdin/stdout channel:
//! `initialize`, `tools/list`, `tools/call`.
pub mod protocol;
pub mod transport;

pub use protocol::{RemoteContent, RemoteTool, ToolCallResult, TransportError, TransportResult};
pub use transport::{ToolServerConfig, ToolServerConnection};
