//! Keyword publish/subscribe transports.
//!
//! Every transport implements the same two-sided contract:
//! - [`Publisher`] binds an address for a keyword and pushes updates
//! - [`Subscriber`] registers interest and exposes the latest payload
//!
//! Three families are provided: TCP sockets with chunked packets
//! ([`socket`]), a shared data file guarded by a lock marker ([`file`]) and
//! sentinel-framed text over a named pipe ([`pipe`], Unix only). A publisher
//! only ever talks to a subscriber of the same [`TransportKind`].

pub mod cache;
pub mod error;
pub mod file;
pub mod socket;
pub mod traits;

#[cfg(unix)]
pub mod pipe;

pub use cache::{CachedEntry, UpdateCache};
pub use error::{Result, TransportError};
pub use file::{FileConfig, FilePublisher, FileSubscriber, LockFile};
pub use socket::{SocketConfig, SocketPublisher, SocketSubscriber};
pub use traits::{Delivery, DeliveryReport, Publisher, Subscriber, TransportKind};

#[cfg(unix)]
pub use pipe::{PipeConfig, PipePublisher, PipeSubscriber};
