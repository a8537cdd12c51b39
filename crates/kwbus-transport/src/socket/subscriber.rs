use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::SystemTime;

use kwbus_frame::{
    kind_name, FrameConfig, FrameError, FrameReader, FrameWriter, HandshakeRequest, Message,
    Reassembler,
};
use tracing::{debug, info, warn};

use super::{connect_addrs, SocketConfig, MAX_HANDSHAKE_PAYLOAD};
use crate::cache::{unix_millis, UpdateCache};
use crate::error::{Result, TransportError};
use crate::traits::{Subscriber, TransportKind};

struct Listener {
    address: String,
    keyword: String,
    stream: TcpStream,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Listener {
    fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        let _ = self.stream.shutdown(Shutdown::Both);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(address = %self.address, "socket listener panicked");
            }
        }
    }
}

/// Subscribing side of the socket transport.
///
/// One connection per instance. A listener thread reassembles incoming
/// packets and stores each complete payload in the shared cache.
pub struct SocketSubscriber {
    config: SocketConfig,
    cache: Arc<UpdateCache>,
    listener: Option<Listener>,
}

impl SocketSubscriber {
    pub fn new() -> Self {
        Self::with_config(SocketConfig::default())
    }

    pub fn with_config(config: SocketConfig) -> Self {
        Self {
            config,
            cache: Arc::new(UpdateCache::new()),
            listener: None,
        }
    }

    /// Whether the listener thread is still reading from the publisher.
    pub fn is_listening(&self) -> bool {
        self.listener.as_ref().is_some_and(Listener::is_running)
    }

    fn connect(&self, address: &str) -> Result<TcpStream> {
        let mut last_err = None;
        for addr in connect_addrs(address)? {
            match TcpStream::connect_timeout(&addr, self.config.handshake_timeout) {
                Ok(stream) => return Ok(stream),
                Err(err) => last_err = Some(err),
            }
        }
        Err(TransportError::Connect {
            address: address.to_string(),
            source: last_err
                .unwrap_or_else(|| std::io::Error::other("no address to connect to")),
        })
    }
}

impl Default for SocketSubscriber {
    fn default() -> Self {
        Self::new()
    }
}

impl Subscriber for SocketSubscriber {
    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }

    fn subscribe(&mut self, address: &str, keyword: &str) -> Result<()> {
        if let Some(listener) = &self.listener {
            if listener.is_running() {
                return Err(TransportError::AlreadyBound {
                    address: listener.address.clone(),
                    keyword: listener.keyword.clone(),
                });
            }
        }
        if let Some(stale) = self.listener.take() {
            debug!(address = %stale.address, "reaping finished socket listener");
            stale.stop();
        }

        let stream = self.connect(address)?;
        let frame_config = FrameConfig {
            max_payload_size: MAX_HANDSHAKE_PAYLOAD,
            read_timeout: Some(self.config.handshake_timeout),
            write_timeout: Some(self.config.handshake_timeout),
        };
        let mut reader = FrameReader::with_config_tcp(stream.try_clone()?, frame_config.clone())?;
        let mut writer = FrameWriter::with_config_tcp(stream.try_clone()?, frame_config)?;

        writer.write_message(&Message::HandshakeRequest(HandshakeRequest {
            keyword: keyword.to_string(),
            timestamp: unix_millis(SystemTime::now()),
        }))?;
        let supported = match reader.read_message()? {
            Message::HandshakeReply(reply) => reply.supported,
            other => {
                let _ = stream.shutdown(Shutdown::Both);
                return Err(TransportError::Handshake(format!(
                    "expected HANDSHAKE_REPLY, got {}",
                    kind_name(other.kind())
                )));
            }
        };
        if !supported {
            let _ = stream.shutdown(Shutdown::Both);
            info!(address, keyword, "publisher rejected keyword");
            return Err(TransportError::UnsupportedKeyword {
                address: address.to_string(),
                keyword: keyword.to_string(),
            });
        }

        // Data packets may exceed the handshake budget and arrive at any pace.
        reader.reconfigure(FrameConfig::default())?;

        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let cache = Arc::clone(&self.cache);
            let stop = Arc::clone(&stop);
            let address = address.to_string();
            thread::Builder::new()
                .name(format!("kwbus-sock-sub-{address}"))
                .spawn(move || listen_loop(reader, &cache, &stop, &address))?
        };

        info!(address, keyword, "subscribed over socket");
        self.listener = Some(Listener {
            address: address.to_string(),
            keyword: keyword.to_string(),
            stream,
            stop,
            handle: Some(handle),
        });
        Ok(())
    }

    fn unsubscribe(&mut self, address: &str, keyword: &str) {
        match self.listener.take() {
            Some(listener) if listener.address == address && listener.keyword == keyword => {
                listener.stop();
                self.cache.remove(keyword);
                info!(address, keyword, "unsubscribed from socket");
            }
            other => {
                self.listener = other;
                debug!(address, keyword, "unsubscribe ignored, not subscribed");
            }
        }
    }

    fn request(&self, keyword: &str) -> String {
        self.cache.payload(keyword)
    }

    fn has_update(&mut self, keyword: &str) -> bool {
        self.cache.take_fresh(keyword)
    }

    fn take_update(&mut self, keyword: &str) -> Option<String> {
        self.cache.take_fresh_payload(keyword)
    }
}

impl Drop for SocketSubscriber {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.stop();
        }
    }
}

fn listen_loop(
    mut reader: FrameReader<TcpStream>,
    cache: &UpdateCache,
    stop: &AtomicBool,
    address: &str,
) {
    let mut reassembler = Reassembler::new();
    loop {
        match reader.read_message() {
            Ok(Message::Data(packet)) => {
                if let Some(payload) = reassembler.push(&packet) {
                    debug!(address, keyword = %packet.keyword, size = payload.len(), "update received");
                    cache.store(&packet.keyword, payload);
                }
            }
            Ok(other) => {
                warn!(address, kind = kind_name(other.kind()), "unexpected message on data stream");
            }
            Err(err) if stop.load(Ordering::SeqCst) => {
                debug!(address, error = %err, "socket listener stopped");
                break;
            }
            Err(FrameError::ConnectionClosed) => {
                info!(address, "publisher closed the connection");
                break;
            }
            Err(err) => {
                warn!(address, error = %err, "socket listener failed");
                break;
            }
        }
    }
    let _ = reader.get_ref().shutdown(Shutdown::Both);
}

#[cfg(test)]
mod tests {
    use std::net::{SocketAddr, TcpListener};
    use std::time::{Duration, Instant};

    use kwbus_frame::{DataPacket, HandshakeReply};

    use super::*;
    use crate::socket::SocketPublisher;
    use crate::traits::Publisher;

    fn wait_for_update(subscriber: &mut SocketSubscriber, keyword: &str) -> bool {
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(5) {
            if subscriber.has_update(keyword) {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    fn wait_for_subscribers(publisher: &SocketPublisher, keyword: &str) {
        let start = Instant::now();
        while !publisher.has_subscribers(keyword) {
            assert!(start.elapsed() < Duration::from_secs(5), "no subscriber registered");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn publish_subscribe_roundtrip() {
        let mut publisher = SocketPublisher::new();
        publisher.publish("127.0.0.1:0", "STATE").unwrap();
        let address = publisher.local_addr().unwrap().to_string();

        let mut subscriber = SocketSubscriber::new();
        subscriber.subscribe(&address, "STATE").unwrap();
        wait_for_subscribers(&publisher, "STATE");

        publisher.update("STATE", "x=1;y=2");
        assert!(wait_for_update(&mut subscriber, "STATE"));
        assert_eq!(subscriber.request("STATE"), "x=1;y=2");
        assert!(!subscriber.has_update("STATE"));
    }

    #[test]
    fn take_update_returns_each_payload_once() {
        let mut publisher = SocketPublisher::new();
        publisher.publish("127.0.0.1:0", "STATE").unwrap();
        let address = publisher.local_addr().unwrap().to_string();

        let mut subscriber = SocketSubscriber::new();
        subscriber.subscribe(&address, "STATE").unwrap();
        wait_for_subscribers(&publisher, "STATE");

        publisher.update("STATE", "v=1");
        let start = Instant::now();
        let mut received = None;
        while received.is_none() && start.elapsed() < Duration::from_secs(5) {
            received = subscriber.take_update("STATE");
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(received.as_deref(), Some("v=1"));
        assert_eq!(subscriber.take_update("STATE"), None);
        assert!(!subscriber.has_update("STATE"));
    }

    #[test]
    fn multi_chunk_payload_is_reassembled() {
        let mut publisher = SocketPublisher::new();
        publisher.publish("127.0.0.1:0", "PLAN").unwrap();
        let address = publisher.local_addr().unwrap().to_string();

        let mut subscriber = SocketSubscriber::new();
        subscriber.subscribe(&address, "PLAN").unwrap();
        wait_for_subscribers(&publisher, "PLAN");

        let payload: String = (0..100_000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        publisher.update("PLAN", &payload);
        assert!(wait_for_update(&mut subscriber, "PLAN"));
        assert_eq!(subscriber.request("PLAN"), payload);
    }

    #[test]
    fn unsupported_keyword_fails_subscribe() {
        let mut publisher = SocketPublisher::new();
        publisher.publish("127.0.0.1:0", "PLAN").unwrap();
        let address = publisher.local_addr().unwrap().to_string();

        let mut subscriber = SocketSubscriber::new();
        let err = subscriber.subscribe(&address, "STATE").unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedKeyword { .. }));
        assert!(!subscriber.is_listening());

        thread::sleep(Duration::from_millis(50));
        assert_eq!(publisher.connection_count(), 0);
    }

    #[test]
    fn second_subscribe_is_rejected_while_bound() {
        let mut publisher = SocketPublisher::new();
        publisher.publish("127.0.0.1:0", "PLAN").unwrap();
        let address = publisher.local_addr().unwrap().to_string();

        let mut subscriber = SocketSubscriber::new();
        subscriber.subscribe(&address, "PLAN").unwrap();
        assert!(matches!(
            subscriber.subscribe(&address, "PLAN"),
            Err(TransportError::AlreadyBound { .. })
        ));

        subscriber.unsubscribe(&address, "PLAN");
        assert!(!subscriber.is_listening());
        subscriber.subscribe(&address, "PLAN").unwrap();
    }

    /// Publisher stand-in that sends a hand-written packet sequence.
    fn scripted_publisher(script: Vec<Vec<(i32, i32, &'static str)>>) -> (SocketAddr, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = FrameReader::new(stream.try_clone().unwrap());
            let mut writer = FrameWriter::new(stream);
            assert!(matches!(
                reader.read_message().unwrap(),
                Message::HandshakeRequest(_)
            ));
            writer
                .write_message(&Message::HandshakeReply(HandshakeReply { supported: true }))
                .unwrap();
            for block in script {
                for (sequence, max, chunk) in block {
                    writer
                        .write_message(&Message::Data(DataPacket {
                            sequence,
                            max,
                            keyword: "PLAN".to_string(),
                            chunk: chunk.to_string(),
                            timestamp: 0,
                        }))
                        .unwrap();
                }
                thread::sleep(Duration::from_millis(100));
            }
            // Hold the connection open until the subscriber hangs up.
            let _ = reader.read_message();
        });
        (addr, handle)
    }

    #[test]
    fn gap_in_sequence_discards_block_and_keeps_previous_payload() {
        let (addr, server) = scripted_publisher(vec![
            vec![(0, 1, "good-"), (1, 1, "block")],
            vec![(0, 3, "a"), (1, 3, "b"), (3, 3, "d")],
        ]);
        let address = addr.to_string();

        let mut subscriber = SocketSubscriber::new();
        subscriber.subscribe(&address, "PLAN").unwrap();

        assert!(wait_for_update(&mut subscriber, "PLAN"));
        assert_eq!(subscriber.request("PLAN"), "good-block");

        thread::sleep(Duration::from_millis(400));
        assert!(!subscriber.has_update("PLAN"));
        assert_eq!(subscriber.request("PLAN"), "good-block");

        subscriber.unsubscribe(&address, "PLAN");
        server.join().unwrap();
    }
}
