//! Hubs that spread one keyword across many transports.
//!
//! [`PublisherHub`] fans every update out to all registered publishing
//! transports; [`SubscriberHub`] polls all registered subscribing transports
//! and collects whatever arrived. Both are keyed by address and safe to
//! share between threads.

pub mod config;
pub mod error;
pub mod keywords;
pub mod publisher;
pub mod subscriber;

pub use config::{EndpointConfig, HubConfig};
pub use error::{HubError, Result};
pub use publisher::PublisherHub;
pub use subscriber::SubscriberHub;
