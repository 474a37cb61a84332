// ubus JSON-RPC wire types
//
// Envelope structs for requests and replies, plus the raw shape of a UCI
// section as `uci get` returns it. Everything here is serde-only.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub(crate) const JSONRPC_VERSION: &str = "2.0";

/// A single JSON-RPC request. Batches are sent as a JSON array of these.
#[derive(Debug, Serialize)]
pub(crate) struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

/// A single JSON-RPC reply.
#[derive(Debug, Deserialize)]
pub(crate) struct RpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcErrorObject {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// One section as returned by `uci get {config}` under `values`.
///
/// Metadata keys start with a dot; every other key is an option whose
/// value is either a string or an array of strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UciSectionData {
    #[serde(rename = ".anonymous", default)]
    pub anonymous: bool,
    #[serde(rename = ".type")]
    pub section_type: String,
    #[serde(rename = ".name")]
    pub name: String,
    #[serde(rename = ".index", default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

/// Reply of `session login`.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionInfo {
    pub ubus_rpc_session: String,
    #[serde(default)]
    pub timeout: u64,
    #[serde(default)]
    pub expires: u64,
}
