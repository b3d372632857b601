// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process message bus.
//!
//! Every [`LocalConnection`] gets a unique nonzero client id from its
//! [`LocalBus`]. A session is a pair of bounded `crossbeam` channels; the
//! connect handshake completes only once the listening side has accepted
//! (SYN/ACK), so a client never talks into a queue nobody serves.

use super::{Connection, Listener, Session, TransportError};
use crate::config::MAX_PAYLOAD_SIZE;
use crate::types::{ClientId, ProtocolId};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Messages buffered per direction before `send` blocks
const SESSION_QUEUE_DEPTH: usize = 256;

/// Interval at which `connect` re-checks for a listener that is not up yet
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(5);

type ListenerKey = (ClientId, ProtocolId);

/// A connection waiting to be accepted
struct PendingConnection {
    session: LocalSession,
    ack: Sender<()>,
}

struct BusInner {
    next_client_id: AtomicU16,
    listeners: DashMap<ListenerKey, Sender<PendingConnection>>,
    max_payload_size: usize,
}

impl BusInner {
    fn allocate_client_id(&self) -> ClientId {
        loop {
            let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
            if id != crate::config::INVALID_CLIENT_ID {
                return id;
            }
        }
    }
}

/// Process-local message fabric.
#[derive(Clone)]
pub struct LocalBus {
    inner: Arc<BusInner>,
}

impl LocalBus {
    /// Create a bus with the default maximum payload size.
    pub fn new() -> Self {
        Self::with_max_payload(MAX_PAYLOAD_SIZE)
    }

    /// Create a bus limiting every message to `max_payload_size` bytes.
    pub fn with_max_payload(max_payload_size: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                next_client_id: AtomicU16::new(1),
                listeners: DashMap::new(),
                max_payload_size,
            }),
        }
    }

    /// Attach a new endpoint to the bus.
    pub fn connect(&self) -> LocalConnection {
        let client_id = self.inner.allocate_client_id();
        log::debug!("[local-bus] endpoint {} attached", client_id);
        LocalConnection {
            client_id,
            bus: Arc::clone(&self.inner),
        }
    }

    /// Number of (endpoint, protocol) pairs currently listening.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

/// An endpoint on a [`LocalBus`].
pub struct LocalConnection {
    client_id: ClientId,
    bus: Arc<BusInner>,
}

impl Connection for LocalConnection {
    fn client_id(&self) -> ClientId {
        self.client_id
    }

    fn max_payload_size(&self) -> usize {
        self.bus.max_payload_size
    }

    fn listen(
        &self,
        protocol_id: ProtocolId,
        max_pending: usize,
    ) -> Result<Box<dyn Listener>, TransportError> {
        let key = (self.client_id, protocol_id);
        let (tx, rx) = channel::bounded(max_pending.max(1));

        match self.bus.listeners.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(TransportError::AddressInUse(protocol_id));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(tx);
            }
        }

        log::debug!(
            "[local-bus] endpoint {} listening on protocol {}",
            self.client_id,
            protocol_id
        );

        Ok(Box::new(LocalListener {
            key,
            pending: rx,
            bus: Arc::clone(&self.bus),
        }))
    }

    fn connect(
        &self,
        remote: ClientId,
        protocol_id: ProtocolId,
        timeout: Duration,
    ) -> Result<Box<dyn Session>, TransportError> {
        let deadline = Instant::now() + timeout;
        let unreachable = TransportError::Unreachable {
            client_id: remote,
            protocol_id,
        };

        // Wait for the remote to start listening
        let backlog = loop {
            if let Some(tx) = self.bus.listeners.get(&(remote, protocol_id)) {
                break tx.clone();
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(unreachable);
            }
            std::thread::sleep(CONNECT_RETRY_INTERVAL.min(deadline - now));
        };

        let (to_server, from_client) = channel::bounded(SESSION_QUEUE_DEPTH);
        let (to_client, from_server) = channel::bounded(SESSION_QUEUE_DEPTH);
        let max = self.bus.max_payload_size;

        let client_side = LocalSession::new(remote, to_server, from_server, max);
        let server_side = LocalSession::new(self.client_id, to_client, from_client, max);

        let (ack_tx, ack_rx) = channel::bounded(1);
        let pending = PendingConnection {
            session: server_side,
            ack: ack_tx,
        };

        match backlog.try_send(pending) {
            Ok(()) => {}
            Err(channel::TrySendError::Full(_)) => {
                log::warn!(
                    "[local-bus] endpoint {} refused connection from {}: backlog full",
                    remote,
                    self.client_id
                );
                return Err(TransportError::Refused(remote));
            }
            Err(channel::TrySendError::Disconnected(_)) => return Err(unreachable),
        }

        match ack_rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(()) => {
                log::debug!(
                    "[local-bus] session {} -> {} established (protocol {})",
                    self.client_id,
                    remote,
                    protocol_id
                );
                Ok(Box::new(client_side))
            }
            Err(RecvTimeoutError::Timeout) => Err(TransportError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(unreachable),
        }
    }
}

impl Drop for LocalConnection {
    fn drop(&mut self) {
        let id = self.client_id;
        self.bus.listeners.retain(|(owner, _), _| *owner != id);
    }
}

struct LocalListener {
    key: ListenerKey,
    pending: Receiver<PendingConnection>,
    bus: Arc<BusInner>,
}

impl Listener for LocalListener {
    fn accept(&self, timeout: Duration) -> Result<Option<Box<dyn Session>>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let pending = match self.pending.recv_timeout(remaining) {
                Ok(pending) => pending,
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => return Err(TransportError::Closed),
            };

            // The connecting side may have given up already
            if pending.ack.send(()).is_ok() {
                return Ok(Some(Box::new(pending.session)));
            }
            log::debug!(
                "[local-bus] dropping abandoned connection from {}",
                pending.session.remote
            );
        }
    }
}

impl Drop for LocalListener {
    fn drop(&mut self) {
        self.bus.listeners.remove(&self.key);
        log::debug!(
            "[local-bus] endpoint {} stopped listening on protocol {}",
            self.key.0,
            self.key.1
        );
    }
}

struct LocalSession {
    remote: ClientId,
    tx: Mutex<Option<Sender<Vec<u8>>>>,
    rx: Receiver<Vec<u8>>,
    max_payload_size: usize,
}

impl LocalSession {
    fn new(
        remote: ClientId,
        tx: Sender<Vec<u8>>,
        rx: Receiver<Vec<u8>>,
        max_payload_size: usize,
    ) -> Self {
        Self {
            remote,
            tx: Mutex::new(Some(tx)),
            rx,
            max_payload_size,
        }
    }
}

impl Session for LocalSession {
    fn remote_client_id(&self) -> ClientId {
        self.remote
    }

    fn send(&self, payload: &[u8], timeout: Duration) -> Result<(), TransportError> {
        if payload.len() > self.max_payload_size {
            return Err(TransportError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload_size,
            });
        }

        // Clone the sender so a slow peer does not block `close`
        let tx = self.tx.lock().clone().ok_or(TransportError::Closed)?;
        tx.send_timeout(payload.to_vec(), timeout)
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => TransportError::Timeout,
                SendTimeoutError::Disconnected(_) => TransportError::Disconnected,
            })
    }

    fn receive(&self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        if self.tx.lock().is_none() {
            return Err(TransportError::Closed);
        }

        match self.rx.recv_timeout(timeout) {
            Ok(msg) => Ok(Some(msg)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Disconnected),
        }
    }

    fn close(&self) {
        self.tx.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const PROTO: ProtocolId = 7;
    const WAIT: Duration = Duration::from_millis(500);

    #[test]
    fn client_ids_are_unique_and_nonzero() {
        let bus = LocalBus::new();
        let a = bus.connect();
        let b = bus.connect();
        assert_ne!(a.client_id(), 0);
        assert_ne!(a.client_id(), b.client_id());
    }

    #[test]
    fn connect_accept_and_exchange() {
        let bus = LocalBus::new();
        let server = bus.connect();
        let client = bus.connect();
        let client_id = client.client_id();

        let listener = server.listen(PROTO, 4).unwrap();
        let remote = server.client_id();
        let handle = thread::spawn(move || client.connect(remote, PROTO, WAIT).unwrap());

        let server_session = loop {
            if let Some(s) = listener.accept(WAIT).unwrap() {
                break s;
            }
        };
        let client_session = handle.join().unwrap();

        assert_eq!(server_session.remote_client_id(), client_id);
        assert_eq!(client_session.remote_client_id(), remote);

        client_session.send(b"ping", WAIT).unwrap();
        assert_eq!(server_session.receive(WAIT).unwrap().unwrap(), b"ping");
        server_session.send(b"pong", WAIT).unwrap();
        assert_eq!(client_session.receive(WAIT).unwrap().unwrap(), b"pong");
    }

    #[test]
    fn unknown_remote_is_unreachable() {
        let bus = LocalBus::new();
        let client = bus.connect();
        let err = client
            .connect(4242, PROTO, Duration::from_millis(20))
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::Unreachable { .. }));
    }

    #[test]
    fn unaccepted_connect_times_out() {
        let bus = LocalBus::new();
        let server = bus.connect();
        let client = bus.connect();
        let _listener = server.listen(PROTO, 4).unwrap();

        let err = client
            .connect(server.client_id(), PROTO, Duration::from_millis(20))
            .err()
            .unwrap();
        assert_eq!(err, TransportError::Timeout);
    }

    #[test]
    fn full_backlog_refuses() {
        let bus = LocalBus::new();
        let server = bus.connect();
        let _listener = server.listen(PROTO, 1).unwrap();
        let remote = server.client_id();

        // First attempt occupies the only backlog slot until it times out
        let first = bus.connect();
        let occupant =
            thread::spawn(move || first.connect(remote, PROTO, Duration::from_millis(300)));
        thread::sleep(Duration::from_millis(50));

        let second = bus.connect();
        let err = second
            .connect(remote, PROTO, Duration::from_millis(20))
            .err()
            .unwrap();
        assert_eq!(err, TransportError::Refused(remote));
        assert!(occupant.join().unwrap().is_err());
    }

    #[test]
    fn duplicate_listen_is_rejected() {
        let bus = LocalBus::new();
        let server = bus.connect();
        let first = server.listen(PROTO, 1).unwrap();
        assert_eq!(
            server.listen(PROTO, 1).err().unwrap(),
            TransportError::AddressInUse(PROTO)
        );
        drop(first);
        assert!(server.listen(PROTO, 1).is_ok());
    }

    #[test]
    fn close_is_observed_by_peer() {
        let bus = LocalBus::new();
        let server = bus.connect();
        let client = bus.connect();
        let listener = server.listen(PROTO, 1).unwrap();
        let remote = server.client_id();
        let handle = thread::spawn(move || client.connect(remote, PROTO, WAIT).unwrap());
        let server_session = listener.accept(WAIT).unwrap().unwrap();
        let client_session = handle.join().unwrap();

        client_session.send(b"last", WAIT).unwrap();
        client_session.close();

        assert_eq!(server_session.receive(WAIT).unwrap().unwrap(), b"last");
        assert_eq!(
            server_session.receive(WAIT).err().unwrap(),
            TransportError::Disconnected
        );
        assert_eq!(
            client_session.send(b"x", WAIT).err().unwrap(),
            TransportError::Closed
        );
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let bus = LocalBus::with_max_payload(16);
        let server = bus.connect();
        let client = bus.connect();
        let listener = server.listen(PROTO, 1).unwrap();
        let remote = server.client_id();
        let handle = thread::spawn(move || client.connect(remote, PROTO, WAIT).unwrap());
        let _server_session = listener.accept(WAIT).unwrap().unwrap();
        let client_session = handle.join().unwrap();

        let err = client_session.send(&[0u8; 17], WAIT).err().unwrap();
        assert_eq!(err, TransportError::PayloadTooLarge { size: 17, max: 16 });
    }
}
