//! Courier core: pure protocol model for the fetch relay and timeout registry.
mod chunk;
mod msg;
mod registry;
mod rules;

pub use chunk::{plan_chunks, MAX_CHUNK_BYTES};
pub use msg::{
    ChunkMessage, ClearTimeoutRequest, FetchRequest, FetchResult, FrameId, Inbound, Outbound,
    ParseError, RequestId, Sender, SetTimeoutRequest, TabId, CONTENT_TYPE_HEADER,
    METHOD_CLEAR_TIMEOUT, METHOD_FETCH, METHOD_FETCH_FRAME, METHOD_FETCH_RESPONSE,
    METHOD_FRAME_TREE_ACK_INIT_REQUEST, METHOD_FRAME_TREE_INIT_RESPONSE, METHOD_ON_TIMEOUT,
    METHOD_SET_TIMEOUT, TOP_FRAME,
};
pub use registry::{TimeoutKey, TimeoutTable};
pub use rules::{ReferrerRule, ReferrerRuleSet, RuleId};
