// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message-channel transport consumed by the RPC client and server.
//!
//! The fabric delivers bounded-size payloads, reliably and in order, between
//! two endpoints identified by a [`ClientId`]. Sessions are multiplexed by
//! [`ProtocolId`] so several protocols can share one endpoint.
//!
//! ```text
//!   client endpoint                         server endpoint
//!   Connection::connect(remote, proto) ---> Listener::accept()
//!              |                                   |
//!           Session  <====== ordered msgs =====> Session
//! ```
//!
//! [`LocalBus`] is the in-process implementation used by tests, benches and
//! the C ABI.

mod local;

pub use local::{LocalBus, LocalConnection};

use crate::error::ResultCode;
use crate::types::{ClientId, ProtocolId};
use std::time::Duration;
use thiserror::Error;

/// Transport-level failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Operation did not complete before its deadline
    #[error("operation timed out")]
    Timeout,

    /// No endpoint with this id is listening on the protocol
    #[error("client {client_id} unreachable on protocol {protocol_id}")]
    Unreachable {
        client_id: ClientId,
        protocol_id: ProtocolId,
    },

    /// The listener's pending queue is full
    #[error("connection refused by client {0}")]
    Refused(ClientId),

    /// Another listener already owns this (endpoint, protocol) pair
    #[error("protocol {0} already has a listener on this endpoint")]
    AddressInUse(ProtocolId),

    /// The peer closed the session
    #[error("session disconnected")]
    Disconnected,

    /// The session was closed locally
    #[error("session closed")]
    Closed,

    /// Payload exceeds the fabric's message size
    #[error("payload of {size} bytes exceeds maximum {max}")]
    PayloadTooLarge { size: usize, max: usize },
}

impl TransportError {
    /// Map onto the wire-level status taxonomy.
    pub fn code(&self) -> ResultCode {
        match self {
            Self::Timeout | Self::Unreachable { .. } => ResultCode::NetTimedOut,
            Self::Refused(_) => ResultCode::NetConnectionRefused,
            Self::AddressInUse(_) => ResultCode::AlreadyExists,
            Self::Disconnected => ResultCode::NetConnectionReset,
            Self::Closed => ResultCode::NetNotConnected,
            Self::PayloadTooLarge { .. } => ResultCode::BufferTooSmall,
        }
    }
}

/// An endpoint on the message fabric.
pub trait Connection: Send + Sync {
    /// Id other endpoints use to reach this one
    fn client_id(&self) -> ClientId;

    /// Largest payload a single message may carry
    fn max_payload_size(&self) -> usize;

    /// Start accepting sessions for `protocol_id`.
    ///
    /// At most `max_pending` connections are queued before being accepted;
    /// further attempts are refused.
    fn listen(
        &self,
        protocol_id: ProtocolId,
        max_pending: usize,
    ) -> Result<Box<dyn Listener>, TransportError>;

    /// Establish a session with `remote`, waiting up to `timeout` for it to
    /// be reachable and to accept.
    fn connect(
        &self,
        remote: ClientId,
        protocol_id: ProtocolId,
        timeout: Duration,
    ) -> Result<Box<dyn Session>, TransportError>;
}

/// Accepts inbound sessions for one protocol. Dropping it stops listening.
pub trait Listener: Send {
    /// Wait up to `timeout` for the next session; `Ok(None)` on timeout.
    fn accept(&self, timeout: Duration) -> Result<Option<Box<dyn Session>>, TransportError>;
}

/// One established point-to-point session.
pub trait Session: Send + Sync {
    /// Id of the endpoint on the other side
    fn remote_client_id(&self) -> ClientId;

    /// Send one message, blocking at most `timeout` when the peer is slow.
    fn send(&self, payload: &[u8], timeout: Duration) -> Result<(), TransportError>;

    /// Wait up to `timeout` for the next message; `Ok(None)` on timeout.
    fn receive(&self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError>;

    /// Close the session. The peer observes [`TransportError::Disconnected`]
    /// once it has drained the messages already in flight.
    fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        assert_eq!(TransportError::Timeout.code(), ResultCode::NetTimedOut);
        assert_eq!(
            TransportError::Unreachable {
                client_id: 9,
                protocol_id: 1
            }
            .code(),
            ResultCode::NetTimedOut
        );
        assert_eq!(
            TransportError::Disconnected.code(),
            ResultCode::NetConnectionReset
        );
        assert_ne!(
            TransportError::Refused(3).code(),
            ResultCode::InvalidParameter
        );
    }
}
