//! Courier engine: the coordinator and its IO seams.
mod coordinator;
mod fetch;
mod relay;
mod timeout;
mod transport;

pub use coordinator::{Coordinator, CoordinatorSettings};
pub use fetch::{
    FetchError, FetchSettings, Fetcher, ReferrerOverride, ReqwestFetcher, RuleGuard,
    RETRY_SETTLE_DELAY,
};
pub use relay::ChunkRelay;
pub use timeout::{TimeoutRegistry, TokioScheduler, TriggerHandle, TriggerScheduler};
pub use transport::{Transport, TransportError};
