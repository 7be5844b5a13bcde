//! `$connect` handshake.
//!
//! The first frame on a new connection uses the reserved `CONNECT_API`
//! number and carries JSON instead of MsgPack:
//! - the client announces its protocol version and process id;
//! - the server answers with its version and the limits it accepts.
//!
//! The client then runs with the smaller of its own limits and the server's.
//!
//! # Example
//!
//! ```
//! use conwire_client::control::build_connect_message;
//!
//! let json = build_connect_message(4242);
//! assert!(json.contains("$connect"));
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{ConwireError, Result};
use crate::protocol::{Frame, Header, Status, CONNECT_API};
use crate::transport::Limits;

/// Protocol version string.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Method name of the handshake request.
pub const CONNECT_METHOD: &str = "$connect";

/// Build the `$connect` JSON-RPC message.
pub fn build_connect_message(pid: u32) -> String {
    json!({
        "jsonrpc": "2.0",
        "method": CONNECT_METHOD,
        "params": {
            "version": PROTOCOL_VERSION,
            "pid": pid
        }
    })
    .to_string()
}

/// Frame carrying the `$connect` request.
pub fn connect_request(pid: u32) -> Frame {
    let body = build_connect_message(pid).into_bytes();
    let header = Header::request(CONNECT_API, body.len() as u32, 0);
    Frame::new(header, Bytes::from(body), Bytes::new())
}

/// Frame carrying the server's answer. Used by in-process servers.
pub fn connect_reply(info: &ConnectInfo) -> Result<Frame> {
    let body = info.to_json()?;
    let header = Header::reply(CONNECT_API, 0, Status::SUCCESS, body.len() as u32, 0);
    Ok(Frame::new(header, Bytes::from(body), Bytes::new()))
}

/// Parameters of a `$connect` request, as seen by the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectParams {
    pub version: String,
    pub pid: u32,
}

#[derive(Debug, Deserialize)]
struct ConnectEnvelope {
    method: String,
    params: ConnectParams,
}

/// Parse a `$connect` request body.
pub fn parse_connect_message(body: &[u8]) -> Result<ConnectParams> {
    let envelope: ConnectEnvelope = serde_json::from_slice(body)?;
    if envelope.method != CONNECT_METHOD {
        return Err(ConwireError::Protocol(format!(
            "Expected {}, got {}",
            CONNECT_METHOD, envelope.method
        )));
    }
    Ok(envelope.params)
}

/// Server answer to `$connect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectInfo {
    pub version: String,
    pub max_frame_payload: usize,
    pub max_capture_size: u32,
}

impl ConnectInfo {
    /// Parse the server's JSON answer.
    pub fn parse(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Encode for the wire.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Check that the server speaks the same major version.
    pub fn check_version(&self) -> Result<()> {
        let major = |v: &str| v.split('.').next().map(str::to_owned);
        if major(&self.version) != major(PROTOCOL_VERSION) {
            return Err(ConwireError::Protocol(format!(
                "Server protocol {} is incompatible with {}",
                self.version, PROTOCOL_VERSION
            )));
        }
        Ok(())
    }

    /// Clamp the client's limits to what the server accepts.
    pub fn negotiate(&self, client: Limits) -> Limits {
        Limits {
            max_frame_payload: client.max_frame_payload.min(self.max_frame_payload),
            max_body: client.max_body,
            max_capture: client.max_capture.min(self.max_capture_size),
        }
    }
}
