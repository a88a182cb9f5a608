use async_trait::async_trait;
use courier_core::{FrameId, TabId};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("recipient unreachable: {0}")]
    Unreachable(String),
}

/// Delivery seam toward tabs and frames.
///
/// Implementations bridge whatever messaging primitive the host environment
/// provides; a send resolves once the recipient acknowledged the message.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends to every frame of `tab`.
    async fn send_to_tab(&self, tab: TabId, message: Value) -> Result<(), TransportError>;

    /// Sends to one specific frame of `tab`.
    async fn send_to_frame(
        &self,
        tab: TabId,
        frame: FrameId,
        message: Value,
    ) -> Result<(), TransportError>;
}
