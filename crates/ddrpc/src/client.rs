// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RPC client.
//!
//! A client owns one session to one server and issues synchronous calls on
//! it, one at a time. The status a call returns is the one the server put
//! in the response terminator, so a clean round trip can still report e.g.
//! `ServiceNotRegistered`.

use crate::config::{RpcConfig, DEFAULT_CONNECTION_TIMEOUT, INVALID_CLIENT_ID};
use crate::error::{ResultCode, RpcError, RpcResult};
use crate::protocol::{data_chunks, Packet, RequestHeader};
use crate::transport::{Connection, Session, TransportError};
use crate::types::{ApiVersion, ClientId, FunctionId, ProtocolId, ServiceId};
use crate::writer::{BufferWriter, ByteWriter, OptionalWriter};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Parameters for [`RpcClient::create`].
#[derive(Clone)]
pub struct ClientCreateInfo {
    /// Local endpoint to connect from
    pub connection: Option<Arc<dyn Connection>>,
    /// Protocol to use, `None` for the default RPC protocol
    pub protocol_id: Option<ProtocolId>,
    /// Endpoint hosting the server
    pub client_id: ClientId,
    /// Time to wait for the server to accept; zero selects the default
    pub timeout: Duration,
    pub config: RpcConfig,
}

impl ClientCreateInfo {
    pub fn new(connection: Arc<dyn Connection>, client_id: ClientId) -> Self {
        Self {
            connection: Some(connection),
            protocol_id: None,
            client_id,
            timeout: DEFAULT_CONNECTION_TIMEOUT,
            config: RpcConfig::default(),
        }
    }

    pub fn with_protocol_id(mut self, protocol_id: ProtocolId) -> Self {
        self.protocol_id = Some(protocol_id);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_config(mut self, config: RpcConfig) -> Self {
        self.config = config;
        self
    }
}

/// One call.
pub struct CallInfo<'a> {
    pub service_id: ServiceId,
    /// Version of the service the caller was built against
    pub service_version: ApiVersion,
    pub function_id: FunctionId,
    pub params: &'a [u8],
    /// Sink for response bytes; `None` when no data is expected
    pub response_writer: Option<&'a mut dyn ByteWriter>,
    /// Overrides the configured call timeout
    pub timeout: Option<Duration>,
    /// Overrides the configured send timeout
    pub send_timeout: Option<Duration>,
}

impl<'a> CallInfo<'a> {
    pub fn new(service_id: ServiceId, service_version: ApiVersion, function_id: FunctionId) -> Self {
        Self {
            service_id,
            service_version,
            function_id,
            params: &[],
            response_writer: None,
            timeout: None,
            send_timeout: None,
        }
    }

    pub fn params(mut self, params: &'a [u8]) -> Self {
        self.params = params;
        self
    }

    pub fn writer(mut self, writer: &'a mut dyn ByteWriter) -> Self {
        self.response_writer = Some(writer);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }
}

/// Progress of one response
#[derive(Default)]
struct ResponseState {
    announced: Option<u64>,
    received: u64,
}

/// RPC client connected to one server.
///
/// # Example
///
/// ```rust,no_run
/// use ddrpc::{ApiVersion, BufferWriter, CallInfo, ClientCreateInfo, LocalBus, RpcClient};
/// use std::sync::Arc;
///
/// # fn main() -> ddrpc::RpcResult<()> {
/// let bus = LocalBus::new();
/// # let server_id = 1;
/// let mut client = RpcClient::create(ClientCreateInfo::new(Arc::new(bus.connect()), server_id))?;
///
/// let mut reply = BufferWriter::new();
/// client.call(CallInfo::new(7, ApiVersion::new(1, 0, 0), 1).params(b"hi").writer(&mut reply))?;
/// assert_eq!(reply.bytes(), b"hi");
/// # Ok(())
/// # }
/// ```
pub struct RpcClient {
    session: Box<dyn Session>,
    remote: ClientId,
    protocol_id: ProtocolId,
    max_payload_size: usize,
    config: RpcConfig,
    // Set once a response could not be read to its end
    desynchronized: bool,
    _connection: Arc<dyn Connection>,
}

impl RpcClient {
    /// Connect to the server hosted by `info.client_id`.
    ///
    /// # Errors
    /// `InvalidParameter` for a missing connection, the invalid client id or a
    /// protocol id outside the configured range. An unreachable server yields
    /// a transport error.
    pub fn create(info: ClientCreateInfo) -> RpcResult<Self> {
        let connection = info.connection.ok_or_else(RpcError::invalid_parameter)?;
        if info.client_id == INVALID_CLIENT_ID {
            return Err(RpcError::invalid_parameter());
        }
        let protocol_id = info
            .config
            .resolve_protocol_id(info.protocol_id)
            .ok_or_else(RpcError::invalid_parameter)?;
        if let Err(e) = info.config.validate() {
            log::warn!("[ddrpc-client] rejecting configuration: {}", e);
            return Err(RpcError::invalid_parameter());
        }

        let timeout = if info.timeout.is_zero() {
            DEFAULT_CONNECTION_TIMEOUT
        } else {
            info.timeout
        };

        let session = connection
            .connect(info.client_id, protocol_id, timeout)
            .map_err(|e| {
                log::warn!(
                    "[ddrpc-client] connect to {} on protocol {} failed: {}",
                    info.client_id,
                    protocol_id,
                    e
                );
                e
            })?;

        log::debug!(
            "[ddrpc-client] connected to {} on protocol {}",
            info.client_id,
            protocol_id
        );

        let max_payload_size = connection
            .max_payload_size()
            .min(info.config.max_payload_size);

        Ok(Self {
            session,
            remote: info.client_id,
            protocol_id,
            max_payload_size,
            config: info.config,
            desynchronized: false,
            _connection: connection,
        })
    }

    /// Destroy a client. `None` is a no-op.
    pub fn destroy(client: Option<Self>) {
        drop(client);
    }

    /// Endpoint hosting the server
    pub fn remote_client_id(&self) -> ClientId {
        self.remote
    }

    pub fn protocol_id(&self) -> ProtocolId {
        self.protocol_id
    }

    /// `false` once a call left the session in an unknown state.
    pub fn is_connected(&self) -> bool {
        !self.desynchronized
    }

    /// Issue a call and wait for its response.
    ///
    /// # Errors
    /// `InvalidParameter` for zero ids (no traffic is sent); the status the
    /// server reported; `UnexpectedReturnData` when the server returned bytes
    /// but no writer was supplied; transport and wire errors.
    pub fn call(&mut self, info: CallInfo<'_>) -> RpcResult<()> {
        if info.service_id == 0 || info.function_id == 0 {
            return Err(RpcError::invalid_parameter());
        }
        if self.desynchronized {
            return Err(ResultCode::NetNotConnected.into());
        }

        let mut writer = OptionalWriter::new(info.response_writer);
        let header = RequestHeader {
            service_id: info.service_id,
            version: info.service_version,
            function_id: info.function_id,
            param_size: info.params.len() as u64,
            has_response_writer: writer.is_present(),
        };
        let send_timeout = info.send_timeout.unwrap_or(self.config.send_timeout());
        let timeout = info.timeout.unwrap_or(self.config.call_timeout());

        let result = self
            .send_request(&header, info.params, send_timeout)
            .and_then(|()| self.receive_response(&mut writer, timeout));

        match result {
            Ok(code) => writer.end(code).into_result(),
            Err(e) => {
                self.desynchronized = true;
                log::warn!(
                    "[ddrpc-client] call {}:{} to {} failed: {}",
                    info.service_id,
                    info.function_id,
                    self.remote,
                    e
                );
                writer.end(e.code());
                Err(e)
            }
        }
    }

    /// Call and collect the response into a vector.
    pub fn call_to_vec(
        &mut self,
        service_id: ServiceId,
        service_version: ApiVersion,
        function_id: FunctionId,
        params: &[u8],
    ) -> RpcResult<Vec<u8>> {
        let mut reply = BufferWriter::new();
        self.call(
            CallInfo::new(service_id, service_version, function_id)
                .params(params)
                .writer(&mut reply),
        )?;
        Ok(reply.into_bytes())
    }

    fn send_request(
        &self,
        header: &RequestHeader,
        params: &[u8],
        timeout: Duration,
    ) -> RpcResult<()> {
        self.session
            .send(&Packet::Request(*header).to_bytes(), timeout)?;
        for chunk in data_chunks(params, self.max_payload_size) {
            self.session.send(&Packet::Data(chunk).to_bytes(), timeout)?;
        }
        Ok(())
    }

    /// Read packets until the terminator. Returns the call status, or an
    /// error when the stream can no longer be trusted.
    fn receive_response(
        &self,
        writer: &mut OptionalWriter<'_>,
        timeout: Duration,
    ) -> RpcResult<ResultCode> {
        let deadline = Instant::now() + timeout;
        let poll = self.config.poll_interval();
        let mut state = ResponseState::default();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout.into());
            }

            // A poll timeout only means the server is still working
            let message = match self.session.receive(poll.min(remaining))? {
                Some(message) => message,
                None => continue,
            };

            match Packet::decode(&message)? {
                Packet::SizeIndicator(0) => {
                    return Err(ResultCode::InvalidResponseSize.into());
                }
                Packet::SizeIndicator(size) => {
                    if state.announced.is_some() || state.received > 0 {
                        return Err(ResultCode::UnexpectedResponseType.into());
                    }
                    state.announced = Some(size);
                    writer.begin(usize::try_from(size).ok());
                }
                Packet::Data([]) => {
                    return Err(ResultCode::InvalidResponseDataSize.into());
                }
                Packet::Data(bytes) => {
                    state.received += bytes.len() as u64;
                    if matches!(state.announced, Some(size) if state.received > size) {
                        return Err(ResultCode::ResponseSizeMismatch.into());
                    }
                    writer.write_bytes(bytes);
                }
                Packet::Terminator(code) => return Ok(finish_response(&state, writer, code)),
                Packet::Request(_) => {
                    return Err(ResultCode::UnexpectedResponseType.into());
                }
            }
        }
    }
}

/// Status of a response whose terminator carried `code`.
fn finish_response(state: &ResponseState, writer: &OptionalWriter<'_>, code: ResultCode) -> ResultCode {
    if !code.is_success() {
        return code;
    }
    if matches!(state.announced, Some(size) if size != state.received) {
        return ResultCode::ResponseSizeMismatch;
    }
    if !writer.is_present() && writer.received() > 0 {
        return ResultCode::UnexpectedReturnData;
    }
    code
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.session.close();
        log::debug!("[ddrpc-client] disconnected from {}", self.remote);
    }
}
