use std::sync::Arc;

use courier_core::{plan_chunks, FetchResult, Outbound, RequestId, TabId, MAX_CHUNK_BYTES};
use courier_logging::courier_trace;

use crate::transport::{Transport, TransportError};

/// Sends a fetch result back to its tab as one or more `fetchResponse`
/// messages, strictly in offset order.
#[derive(Clone)]
pub struct ChunkRelay {
    transport: Arc<dyn Transport>,
    chunk_size: usize,
}

impl ChunkRelay {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_chunk_size(transport, MAX_CHUNK_BYTES)
    }

    pub fn with_chunk_size(transport: Arc<dyn Transport>, chunk_size: usize) -> Self {
        Self {
            transport,
            chunk_size,
        }
    }

    /// Each message is fully acknowledged by the transport before the next
    /// is constructed; on the first failure the remaining chunks are dropped
    /// and the error is returned for the caller to treat as best-effort.
    pub async fn deliver(
        &self,
        tab: TabId,
        request_id: RequestId,
        result: &FetchResult,
    ) -> Result<(), TransportError> {
        let messages = plan_chunks(request_id, result, self.chunk_size);
        let total = messages.len();
        for (index, message) in messages.into_iter().enumerate() {
            let payload = serde_json::to_value(Outbound::FetchResponse(message))?;
            self.transport.send_to_tab(tab, payload).await?;
            courier_trace!("request {request_id}: delivered chunk {}/{total}", index + 1);
        }
        Ok(())
    }
}
