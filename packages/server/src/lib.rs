//! Corebridge Server — AMQP broker client, correlation router, and the
//! supporting usage-counter and response-cache side channels.

pub mod broker;
pub mod cache;
pub mod config;
pub mod connector;
pub mod consumer;
pub mod counters;
pub mod error;
pub mod router;
pub mod shutdown;

pub use broker::{BrokerClient, PublisherHandle, ReplyPublisher};
pub use cache::ResponseCache;
pub use config::{BrokerConfig, CacheConfig, RelayConfig};
pub use connector::{BackendConnector, ConnectorError, NullConnector};
pub use consumer::{ConcurrencyGate, RelayConsumer};
pub use counters::{AtomicUsageCounters, NoopUsageCounters, OpCounts, UsageRecorder};
pub use error::RelayError;
pub use router::{Disposition, HandlerRegistry, InboundMessage, RouterContext};
pub use shutdown::{RelayState, ShutdownController};
