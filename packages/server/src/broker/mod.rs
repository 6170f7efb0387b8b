//! Broker transport: connection/channel lifecycle and the single-writer
//! publish path.

pub mod client;
pub mod publisher;

pub use client::BrokerClient;
pub use publisher::{spawn_publisher, PublisherHandle, ReplyPublisher};
