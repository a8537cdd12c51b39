use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use kwbus_transport::{DeliveryReport, Publisher};
use tracing::{debug, info, warn};

use crate::config::HubConfig;
use crate::error::Result;

#[derive(Default)]
struct State {
    transports: BTreeMap<String, Box<dyn Publisher>>,
    /// Keyword every transport should be published for, including ones
    /// added later.
    advertised: Option<String>,
}

/// Fans updates out to a set of publishing transports keyed by address.
///
/// Transport failures are logged and never surface as errors.
#[derive(Default)]
pub struct PublisherHub {
    state: Mutex<State>,
}

impl PublisherHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hub with one default-configured transport per endpoint.
    pub fn from_config(config: &HubConfig) -> Result<Self> {
        let hub = Self::new();
        for endpoint in &config.endpoints {
            hub.add_transmitter(endpoint.address.clone(), endpoint.kind.publisher()?);
        }
        Ok(hub)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `transport` at `address`.
    ///
    /// A transport already registered there is shut down first. When a
    /// keyword is advertised, the new transport is published for it.
    pub fn add_transmitter(&self, address: impl Into<String>, mut transport: Box<dyn Publisher>) {
        let address = address.into();
        let mut state = self.lock();

        if let Some(mut displaced) = state.transports.remove(&address) {
            debug!(%address, kind = %displaced.kind(), "replacing transmitter");
            displaced.shutdown();
        }
        if let Some(keyword) = &state.advertised {
            if let Err(err) = transport.publish(&address, keyword) {
                warn!(%address, %keyword, error = %err, "failed to publish new transmitter");
            }
        }
        info!(%address, kind = %transport.kind(), "transmitter added");
        state.transports.insert(address, transport);
    }

    /// Unregister and shut down the transport at `address`.
    pub fn remove_transmitter(&self, address: &str) -> bool {
        match self.lock().transports.remove(address) {
            Some(mut transport) => {
                transport.shutdown();
                info!(address, "transmitter removed");
                true
            }
            None => false,
        }
    }

    /// Publish `keyword` on every transport and remember it for transports
    /// added later. Returns how many transports published successfully.
    pub fn advertise_all(&self, keyword: &str) -> usize {
        let mut state = self.lock();
        state.advertised = Some(keyword.to_string());

        let mut published = 0;
        for (address, transport) in state.transports.iter_mut() {
            match transport.publish(address, keyword) {
                Ok(()) => published += 1,
                Err(err) => warn!(%address, keyword, error = %err, "advertise failed"),
            }
        }
        info!(keyword, published, "keyword advertised");
        published
    }

    /// Publish `keyword` on the transport at `address` only.
    pub fn advertise_one(&self, address: &str, keyword: &str) -> bool {
        let mut state = self.lock();
        let Some(transport) = state.transports.get_mut(address) else {
            warn!(address, keyword, "advertise on unknown transmitter");
            return false;
        };
        match transport.publish(address, keyword) {
            Ok(()) => true,
            Err(err) => {
                warn!(address, keyword, error = %err, "advertise failed");
                false
            }
        }
    }

    /// Unpublish `keyword` everywhere and drop it as the standing
    /// advertisement.
    pub fn unadvertise_all(&self, keyword: &str) {
        let mut state = self.lock();
        if state.advertised.as_deref() == Some(keyword) {
            state.advertised = None;
        }
        for transport in state.transports.values_mut() {
            transport.unpublish(keyword);
        }
        info!(keyword, "keyword unadvertised");
    }

    /// Push `payload` through every transport.
    pub fn update(&self, keyword: &str, payload: &str) -> Vec<(String, DeliveryReport)> {
        let mut state = self.lock();
        state
            .transports
            .iter_mut()
            .map(|(address, transport)| {
                let report = transport.update(keyword, payload);
                for (target, err) in report.failures() {
                    warn!(%address, keyword, target, error = %err, "delivery failed");
                }
                (address.clone(), report)
            })
            .collect()
    }

    /// Whether any transport has a subscriber for `keyword`.
    pub fn has_clients(&self, keyword: &str) -> bool {
        self.lock()
            .transports
            .values()
            .any(|transport| transport.has_subscribers(keyword))
    }

    pub fn addresses(&self) -> Vec<String> {
        self.lock().transports.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().transports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().transports.is_empty()
    }

    /// Shut every transport down and forget them. Returns how many were
    /// bound.
    pub fn shutdown(&self) -> usize {
        let mut state = self.lock();
        state.advertised = None;
        let transports = std::mem::take(&mut state.transports);
        let bound = transports
            .into_values()
            .map(|mut transport| transport.shutdown())
            .filter(|was_bound| *was_bound)
            .count();
        if bound > 0 {
            info!(bound, "publisher hub shut down");
        }
        bound
    }
}

impl Drop for PublisherHub {
    fn drop(&mut self) {
        self.shutdown();
    }
}
