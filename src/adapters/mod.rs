//! Adapters between the conversion service and the outside world.
//!
//! - `mcp`: JSON-RPC tool protocol (initialize, tools/list, tools/call)
//! - `http`: axum router, static downloads and server lifecycle

pub mod http;
pub mod mcp;

pub use http::{router, serve, serve_until, shutdown_signal};
pub use mcp::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, McpHandler, TOOL_NAME};
