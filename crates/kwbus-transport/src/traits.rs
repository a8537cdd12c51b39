use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TransportError};

/// Transport family. A publisher and a subscriber talk to each other only
/// when they belong to the same family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// TCP sockets with chunked packets.
    Socket,
    /// Shared data file guarded by a lock file.
    File,
    /// Sentinel-framed text over a FIFO.
    Pipe,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Socket => "socket",
            TransportKind::File => "file",
            TransportKind::Pipe => "pipe",
        }
    }

    /// Publishing transport of this family with default configuration.
    pub fn publisher(self) -> Result<Box<dyn Publisher>> {
        match self {
            TransportKind::Socket => Ok(Box::new(crate::socket::SocketPublisher::new())),
            TransportKind::File => Ok(Box::new(crate::file::FilePublisher::new())),
            #[cfg(unix)]
            TransportKind::Pipe => Ok(Box::new(crate::pipe::PipePublisher::new())),
            #[cfg(not(unix))]
            TransportKind::Pipe => Err(pipe_unsupported()),
        }
    }

    /// Subscribing transport of this family with default configuration.
    pub fn subscriber(self) -> Result<Box<dyn Subscriber>> {
        match self {
            TransportKind::Socket => Ok(Box::new(crate::socket::SocketSubscriber::new())),
            TransportKind::File => Ok(Box::new(crate::file::FileSubscriber::new())),
            #[cfg(unix)]
            TransportKind::Pipe => Ok(Box::new(crate::pipe::PipeSubscriber::new())),
            #[cfg(not(unix))]
            TransportKind::Pipe => Err(pipe_unsupported()),
        }
    }
}

#[cfg(not(unix))]
fn pipe_unsupported() -> TransportError {
    TransportError::Io(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "the pipe transport requires a Unix platform",
    ))
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "socket" | "tcp" => Ok(TransportKind::Socket),
            "file" => Ok(TransportKind::File),
            "pipe" | "fifo" => Ok(TransportKind::Pipe),
            other => Err(format!("unknown transport kind: {other}")),
        }
    }
}

/// Outcome of delivering one update to one destination.
#[derive(Debug)]
pub struct Delivery {
    /// Subscriber or file the update was addressed to.
    pub target: String,
    pub result: Result<()>,
}

/// Per-destination outcomes of one [`Publisher::update`] call.
///
/// Fan-out is best effort: a failed destination is recorded here and the
/// remaining destinations are still served.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    deliveries: Vec<Delivery>,
}

impl DeliveryReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, target: impl Into<String>, result: Result<()>) {
        self.deliveries.push(Delivery {
            target: target.into(),
            result,
        });
    }

    pub fn deliveries(&self) -> &[Delivery] {
        &self.deliveries
    }

    /// Number of destinations that received the update.
    pub fn delivered(&self) -> usize {
        self.deliveries.iter().filter(|d| d.result.is_ok()).count()
    }

    /// Destinations that failed, with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &TransportError)> {
        self.deliveries.iter().filter_map(|d| match &d.result {
            Ok(()) => None,
            Err(err) => Some((d.target.as_str(), err)),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.deliveries.len()
    }
}

/// Publishing half of the transport contract.
pub trait Publisher: Send {
    /// Transport family of this instance.
    fn kind(&self) -> TransportKind;

    /// Bind to `address` and start accepting interest in `keyword`.
    fn publish(&mut self, address: &str, keyword: &str) -> Result<()>;

    /// Stop accepting interest in `keyword` and drop its subscribers.
    fn unpublish(&mut self, keyword: &str);

    /// Push `payload` to every subscriber of `keyword`, or cache it for
    /// later delivery.
    fn update(&mut self, keyword: &str, payload: &str) -> DeliveryReport;

    /// Whether anyone is currently interested in `keyword`.
    fn has_subscribers(&self, keyword: &str) -> bool;

    /// Release every resource. Returns `true` if the instance was bound.
    /// Calling it again is a no-op returning `false`.
    fn shutdown(&mut self) -> bool;
}

/// Subscribing half of the transport contract.
pub trait Subscriber: Send {
    /// Transport family of this instance.
    fn kind(&self) -> TransportKind;

    /// Register interest in `keyword` at `address`.
    ///
    /// Fails with [`TransportError::UnsupportedKeyword`] when the remote
    /// rejects the keyword and [`TransportError::AlreadyBound`] when this
    /// instance already serves that binding slot.
    fn subscribe(&mut self, address: &str, keyword: &str) -> Result<()>;

    /// Cancel interest. Best effort; never fails.
    fn unsubscribe(&mut self, address: &str, keyword: &str);

    /// Most recently received payload for `keyword`, or an empty string.
    fn request(&self, keyword: &str) -> String;

    /// Whether a payload arrived since the previous check. Consumes the
    /// freshness: a second call without a new update returns `false`.
    fn has_update(&mut self, keyword: &str) -> bool;

    /// Fresh payload for `keyword`, consuming its freshness.
    ///
    /// Transports fed by a background listener override this so the check
    /// and the read happen under one cache lock.
    fn take_update(&mut self, keyword: &str) -> Option<String> {
        self.has_update(keyword).then(|| self.request(keyword))
    }
}
