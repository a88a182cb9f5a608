#![allow(dead_code)]

use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use courier_core::{FrameId, TabId};
use courier_engine::{Transport, TransportError};
use serde_json::Value;

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(courier_logging::initialize_for_tests);
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub tab: TabId,
    pub frame: Option<FrameId>,
    pub message: Value,
}

/// Records every message sent through it, optionally failing once a
/// configured number of sends succeeded.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentMessage>>,
    remaining_sends: Mutex<Option<usize>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A transport that accepts `count` sends and then reports the
    /// recipient as unreachable.
    pub fn failing_after(count: usize) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            remaining_sends: Mutex::new(Some(count)),
        })
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    fn record(
        &self,
        tab: TabId,
        frame: Option<FrameId>,
        message: Value,
    ) -> Result<(), TransportError> {
        {
            let mut remaining = self.remaining_sends.lock().unwrap();
            if let Some(remaining) = remaining.as_mut() {
                if *remaining == 0 {
                    return Err(TransportError::Unreachable(format!("tab {tab} is gone")));
                }
                *remaining -= 1;
            }
        }
        self.sent.lock().unwrap().push(SentMessage {
            tab,
            frame,
            message,
        });
        Ok(())
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_to_tab(&self, tab: TabId, message: Value) -> Result<(), TransportError> {
        self.record(tab, None, message)
    }

    async fn send_to_frame(
        &self,
        tab: TabId,
        frame: FrameId,
        message: Value,
    ) -> Result<(), TransportError> {
        self.record(tab, Some(frame), message)
    }
}

/// Polls `pred` every few milliseconds until it holds, panicking after two
/// seconds.
pub async fn wait_until(pred: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !pred() {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not reached within deadline");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
