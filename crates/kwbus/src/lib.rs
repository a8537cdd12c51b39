//! Keyword-addressed publish/subscribe between processes.
//!
//! A publisher pushes text payloads for a keyword (`STATE`, `PLAN`, ...) and
//! subscribers pick up the latest one, without either side knowing whether
//! the bytes travel over TCP sockets, a shared file or a named pipe.
//!
//! # Crate Structure
//!
//! - [`frame`]: socket wire framing, chunking and pipe sentinels
//! - [`transport`]: the publisher/subscriber contract and its transports
//! - [`hub`]: fan-out and fan-in across many transports

/// Re-export frame types.
pub mod frame {
    pub use kwbus_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use kwbus_transport::*;
}

/// Re-export hub types.
pub mod hub {
    pub use kwbus_hub::*;
}

pub use kwbus_hub::{keywords, HubConfig, PublisherHub, SubscriberHub};
pub use kwbus_transport::{Publisher, Subscriber, TransportKind};
