use crate::msg::{ChunkMessage, FetchResult, RequestId};

/// Upper bound on the payload of a single `fetchResponse` message.
pub const MAX_CHUNK_BYTES: usize = 8 * 1024 * 1024;

/// Split a fetch result into the `fetchResponse` messages that deliver it.
///
/// A result at or under `chunk_size` becomes one non-truncated message; a
/// longer one becomes consecutive truncated messages whose payloads, in
/// order, concatenate back to the original bytes. Only the last truncated
/// message carries `finished = true`.
pub fn plan_chunks(
    request_id: RequestId,
    result: &FetchResult,
    chunk_size: usize,
) -> Vec<ChunkMessage> {
    debug_assert!(chunk_size > 0);
    if result.bytes.len() <= chunk_size {
        return vec![ChunkMessage {
            request_id,
            headers: result.headers.clone(),
            status: result.status,
            error: result.error.clone(),
            truncated: false,
            finished: None,
            byte_array: result.bytes.clone(),
        }];
    }

    let chunk_count = result.bytes.len().div_ceil(chunk_size);
    let mut messages = Vec::with_capacity(chunk_count);
    for (index, block) in result.bytes.chunks(chunk_size).enumerate() {
        messages.push(ChunkMessage {
            request_id,
            headers: result.headers.clone(),
            status: result.status,
            error: result.error.clone(),
            truncated: true,
            finished: Some(index + 1 == chunk_count),
            byte_array: block.to_vec(),
        });
    }
    messages
}
