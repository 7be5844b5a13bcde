//! Control plane - the `$connect` handshake.
//!
//! The control plane uses JSON for the single handshake exchange that opens
//! a connection. After it, every frame carries a MsgPack body.
//!
//! # Workflow
//!
//! 1. Client connects to the server pipe
//! 2. Client sends `$connect` (JSON-RPC) on the reserved API number
//! 3. Server answers with its version and limits
//! 4. Both sides use the smaller limits
//! 5. Binary calls begin

mod connect;

pub use connect::{
    build_connect_message, connect_reply, connect_request, parse_connect_message, ConnectInfo,
    ConnectParams, CONNECT_METHOD, PROTOCOL_VERSION,
};
