use std::sync::Arc;

use courier_core::{Inbound, Sender, TabId, MAX_CHUNK_BYTES, TOP_FRAME};
use courier_logging::{courier_debug, courier_warn};
use serde_json::{json, Value};

use crate::fetch::{FetchSettings, Fetcher, ReqwestFetcher};
use crate::relay::ChunkRelay;
use crate::timeout::{TimeoutRegistry, TokioScheduler, TriggerScheduler};
use crate::transport::Transport;

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub fetch: FetchSettings,
    pub chunk_size: usize,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            fetch: FetchSettings::default(),
            chunk_size: MAX_CHUNK_BYTES,
        }
    }
}

/// Privileged dispatcher for the fetch-relay and timeout-registry protocols.
///
/// One inbound message is handled per call; fetches and forwards run as
/// spawned tasks, so requests from different tabs and frames stay in flight
/// concurrently while each ack returns immediately.
#[derive(Clone)]
pub struct Coordinator {
    transport: Arc<dyn Transport>,
    fetcher: Arc<dyn Fetcher>,
    relay: ChunkRelay,
    timeouts: Arc<TimeoutRegistry>,
}

impl Coordinator {
    /// Wires the production fetcher and trigger scheduler.
    pub fn new(transport: Arc<dyn Transport>, settings: CoordinatorSettings) -> Self {
        let fetcher = Arc::new(ReqwestFetcher::new(settings.fetch.clone()));
        Self::with_parts(transport, fetcher, Arc::new(TokioScheduler), settings)
    }

    /// Assembly seam: inject the fetcher and scheduler.
    pub fn with_parts(
        transport: Arc<dyn Transport>,
        fetcher: Arc<dyn Fetcher>,
        scheduler: Arc<dyn TriggerScheduler>,
        settings: CoordinatorSettings,
    ) -> Self {
        let relay = ChunkRelay::with_chunk_size(Arc::clone(&transport), settings.chunk_size);
        let timeouts = Arc::new(TimeoutRegistry::new(Arc::clone(&transport), scheduler));
        Self {
            transport,
            fetcher,
            relay,
            timeouts,
        }
    }

    /// Handles one inbound message and returns its synchronous ack, if the
    /// method defines one. Unknown or malformed messages are logged and
    /// ignored; nothing here re-raises into the dispatch layer.
    pub fn handle_message(&self, sender: Sender, message: Value) -> Option<Value> {
        let inbound = match Inbound::parse(message) {
            Ok(inbound) => inbound,
            Err(err) => {
                courier_warn!("ignoring message from tab {}: {err}", sender.tab);
                return None;
            }
        };

        match inbound {
            Inbound::Fetch(request) => {
                courier_debug!(
                    "fetch {} from tab {} frame {}: {}",
                    request.request_id,
                    sender.tab,
                    sender.frame,
                    request.url
                );
                let fetcher = Arc::clone(&self.fetcher);
                let relay = self.relay.clone();
                let tab = sender.tab;
                tokio::spawn(async move {
                    let result = fetcher.fetch(&request).await;
                    if let Err(err) = relay.deliver(tab, request.request_id, &result).await {
                        courier_debug!("request {}: response dropped: {err}", request.request_id);
                    }
                });
                Some(json!({ "success": true }))
            }
            Inbound::FetchFrame(raw) => {
                let transport = Arc::clone(&self.transport);
                let tab = sender.tab;
                tokio::spawn(async move {
                    if let Err(err) = transport.send_to_tab(tab, raw).await {
                        courier_debug!("fetchFrame relay to tab {tab} dropped: {err}");
                    }
                });
                Some(json!({ "success": true }))
            }
            Inbound::FrameTree(raw) => {
                let transport = Arc::clone(&self.transport);
                let tab = sender.tab;
                tokio::spawn(async move {
                    if let Err(err) = transport.send_to_frame(tab, TOP_FRAME, raw).await {
                        courier_debug!("frame-tree relay to tab {tab} dropped: {err}");
                    }
                });
                Some(json!({}))
            }
            Inbound::SetTimeout(request) => {
                self.timeouts
                    .set(sender.tab, sender.frame, &request.type_tag, request.delay_ms);
                Some(json!({}))
            }
            Inbound::ClearTimeout(request) => {
                self.timeouts
                    .clear(sender.tab, sender.frame, &request.type_tag);
                Some(json!({}))
            }
        }
    }

    /// Host-environment hook: a tab closed, evict its pending triggers.
    pub fn on_tab_removed(&self, tab: TabId) {
        self.timeouts.on_tab_removed(tab);
    }

    /// Number of deferred triggers currently pending.
    pub fn pending_timeouts(&self) -> usize {
        self.timeouts.pending()
    }
}
