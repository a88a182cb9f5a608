use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type TabId = u32;
pub type FrameId = u32;
/// Correlation token supplied by the page agent and echoed back verbatim.
pub type RequestId = u64;

/// The top-level frame of a tab.
pub const TOP_FRAME: FrameId = 0;

/// The only response header preserved in a [`FetchResult`].
pub const CONTENT_TYPE_HEADER: &str = "content-type";

pub const METHOD_FETCH: &str = "fetch";
pub const METHOD_FETCH_FRAME: &str = "fetchFrame";
pub const METHOD_FETCH_RESPONSE: &str = "fetchResponse";
pub const METHOD_FRAME_TREE_INIT_RESPONSE: &str = "frameTree.initResponse";
pub const METHOD_FRAME_TREE_ACK_INIT_REQUEST: &str = "frameTree.ackInitRequest";
pub const METHOD_SET_TIMEOUT: &str = "lazyTimeout.setTimeout";
pub const METHOD_CLEAR_TIMEOUT: &str = "lazyTimeout.clearTimeout";
pub const METHOD_ON_TIMEOUT: &str = "lazyTimeout.onTimeout";

/// Origin context the transport attaches to every inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sender {
    pub tab: TabId,
    pub frame: FrameId,
}

impl Sender {
    pub fn new(tab: TabId, frame: FrameId) -> Self {
        Self { tab, frame }
    }
}

/// A delegated resource fetch, immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    pub url: String,
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub request_id: RequestId,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SetTimeoutRequest {
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(rename = "delay")]
    pub delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClearTimeoutRequest {
    #[serde(rename = "type")]
    pub type_tag: String,
}

/// Outcome of a delegated fetch. Produced exactly once per request; when the
/// referrer retry runs, the retry's result supersedes the first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchResult {
    pub bytes: Vec<u8>,
    /// Only `content-type` is preserved; every other response header is dropped.
    pub headers: BTreeMap<String, String>,
    pub status: Option<u16>,
    pub error: Option<String>,
}

impl FetchResult {
    /// A failed fetch: empty byte sequence, absent status, captured message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

/// One `fetchResponse` message. Metadata is repeated on every chunk; the
/// receiving side keeps no state beyond byte-stream reassembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMessage {
    pub request_id: RequestId,
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished: Option<bool>,
    pub byte_array: Vec<u8>,
}

/// Messages the coordinator emits toward tabs and frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "method")]
pub enum Outbound {
    #[serde(rename = "fetchResponse")]
    FetchResponse(ChunkMessage),
    #[serde(rename = "lazyTimeout.onTimeout")]
    TimeoutFired {
        #[serde(rename = "type")]
        type_tag: String,
    },
}

/// An inbound message, classified by its `method` discriminator.
///
/// Pass-through variants keep the raw payload so forwarding stays verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Delegated resource fetch from a page agent.
    Fetch(FetchRequest),
    /// Opaque payload relayed to the sender's own tab.
    FetchFrame(Value),
    /// Frame-discovery payload relayed to the sender's top frame.
    FrameTree(Value),
    /// Install or replace a deferred trigger for the sending frame.
    SetTimeout(SetTimeoutRequest),
    /// Cancel a pending trigger for the sending frame.
    ClearTimeout(ClearTimeoutRequest),
}

impl Inbound {
    pub fn parse(message: Value) -> Result<Self, ParseError> {
        let method = match message.get("method").and_then(Value::as_str) {
            Some(method) => method.to_owned(),
            None => return Err(ParseError::MissingMethod),
        };
        match method.as_str() {
            METHOD_FETCH => serde_json::from_value(message)
                .map(Inbound::Fetch)
                .map_err(|err| ParseError::invalid(METHOD_FETCH, err)),
            METHOD_FETCH_FRAME => Ok(Inbound::FetchFrame(message)),
            METHOD_FRAME_TREE_INIT_RESPONSE | METHOD_FRAME_TREE_ACK_INIT_REQUEST => {
                Ok(Inbound::FrameTree(message))
            }
            METHOD_SET_TIMEOUT => serde_json::from_value(message)
                .map(Inbound::SetTimeout)
                .map_err(|err| ParseError::invalid(METHOD_SET_TIMEOUT, err)),
            METHOD_CLEAR_TIMEOUT => serde_json::from_value(message)
                .map(Inbound::ClearTimeout)
                .map_err(|err| ParseError::invalid(METHOD_CLEAR_TIMEOUT, err)),
            _ => Err(ParseError::UnknownMethod(method)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    MissingMethod,
    UnknownMethod(String),
    InvalidPayload {
        method: &'static str,
        message: String,
    },
}

impl ParseError {
    fn invalid(method: &'static str, err: serde_json::Error) -> Self {
        ParseError::InvalidPayload {
            method,
            message: err.to_string(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::MissingMethod => write!(f, "message has no method field"),
            ParseError::UnknownMethod(method) => write!(f, "unknown method {method}"),
            ParseError::InvalidPayload { method, message } => {
                write!(f, "invalid {method} payload: {message}")
            }
        }
    }
}
