use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use kwbus_transport::{Subscriber, TransportError};
use tracing::{debug, info, warn};

use crate::config::HubConfig;
use crate::error::Result;

struct Receiver {
    transport: Box<dyn Subscriber>,
    /// Keywords subscribed through the hub.
    keywords: BTreeSet<String>,
}

impl Receiver {
    fn release(mut self, address: &str) {
        for keyword in &self.keywords {
            self.transport.unsubscribe(address, keyword);
        }
    }
}

/// Collects inbound payloads from a set of subscribing transports keyed by
/// address.
#[derive(Default)]
pub struct SubscriberHub {
    receivers: Mutex<BTreeMap<String, Receiver>>,
}

impl SubscriberHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hub with one default-configured transport per endpoint.
    pub fn from_config(config: &HubConfig) -> Result<Self> {
        let hub = Self::new();
        for endpoint in &config.endpoints {
            hub.add_receiver(endpoint.address.clone(), endpoint.kind.subscriber()?);
        }
        Ok(hub)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Receiver>> {
        self.receivers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `transport` at `address`, unsubscribing any receiver it
    /// displaces.
    pub fn add_receiver(&self, address: impl Into<String>, transport: Box<dyn Subscriber>) {
        let address = address.into();
        info!(%address, kind = %transport.kind(), "receiver added");
        let displaced = self.lock().insert(
            address.clone(),
            Receiver {
                transport,
                keywords: BTreeSet::new(),
            },
        );
        if let Some(displaced) = displaced {
            debug!(%address, "releasing displaced receiver");
            displaced.release(&address);
        }
    }

    /// Unregister the receiver at `address`, unsubscribing its keywords.
    pub fn remove_receiver(&self, address: &str) -> bool {
        let Some(receiver) = self.lock().remove(address) else {
            return false;
        };
        receiver.release(address);
        info!(address, "receiver removed");
        true
    }

    /// Run `f` against the receiver registered at `address`.
    pub fn with_receiver<R>(
        &self,
        address: &str,
        f: impl FnOnce(&mut dyn Subscriber) -> R,
    ) -> Option<R> {
        let mut receivers = self.lock();
        let receiver = receivers.get_mut(address)?;
        Some(f(receiver.transport.as_mut()))
    }

    /// Subscribe the receiver at `address` to `keyword`.
    pub fn subscribe(&self, address: &str, keyword: &str) -> bool {
        let mut receivers = self.lock();
        let Some(receiver) = receivers.get_mut(address) else {
            warn!(address, keyword, "subscribe on unknown receiver");
            return false;
        };
        match receiver.transport.subscribe(address, keyword) {
            Ok(()) => {
                receiver.keywords.insert(keyword.to_string());
                true
            }
            Err(err @ TransportError::UnsupportedKeyword { .. }) => {
                info!(address, keyword, error = %err, "subscription rejected");
                false
            }
            Err(err) => {
                warn!(address, keyword, error = %err, "subscribe failed");
                false
            }
        }
    }

    /// Unsubscribe every receiver from `keyword`.
    pub fn unsubscribe(&self, keyword: &str) {
        for (address, receiver) in self.lock().iter_mut() {
            receiver.transport.unsubscribe(address, keyword);
            receiver.keywords.remove(keyword);
        }
    }

    /// Fresh payloads for `keyword`, one per receiver that has an update,
    /// in address order.
    pub fn request(&self, keyword: &str) -> Vec<String> {
        self.lock()
            .values_mut()
            .filter_map(|receiver| receiver.transport.take_update(keyword))
            .collect()
    }

    /// Last fresh payload returned by [`request`](Self::request).
    pub fn request_latest(&self, keyword: &str) -> Option<String> {
        self.request(keyword).pop()
    }

    pub fn addresses(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
