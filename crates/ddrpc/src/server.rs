// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RPC server.
//!
//! A server listens on one protocol of one endpoint. Every accepted session
//! gets its own worker thread running a receive / dispatch / respond loop:
//!
//! 1. receive a request header and drain its parameters
//! 2. validate ids, version and parameter size
//! 3. resolve the handler in the [`ServiceRegistry`]
//! 4. run the handler against a streaming [`ResponseWriter`]
//! 5. send exactly one terminator carrying the final status
//!
//! ```text
//!  ddrpc-listen ──accept──> ddrpc-session-<id> ──> registry.lookup ──> handler
//!                           ddrpc-session-<id> ──> ...
//! ```

use crate::config::RpcConfig;
use crate::error::{ResultCode, RpcError, RpcResult};
use crate::protocol::{data_chunks, Packet, RequestHeader};
use crate::registry::{CallContext, FunctionInfo, ResolvedFunction, ServiceInfo, ServiceRegistry};
use crate::transport::{Connection, Listener, Session, TransportError};
use crate::types::{ClientId, FunctionId, ProtocolId, ServiceId};
use crate::writer::ByteWriter;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Upper bound on the wait between checks while draining sessions
const DRAIN_CHECK_INTERVAL: Duration = Duration::from_millis(5);

/// Parameters for [`RpcServer::create`].
#[derive(Clone)]
pub struct ServerCreateInfo {
    /// Endpoint to listen on
    pub connection: Option<Arc<dyn Connection>>,
    /// Protocol to serve, `None` for the default RPC protocol
    pub protocol_id: Option<ProtocolId>,
    pub config: RpcConfig,
}

impl ServerCreateInfo {
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            connection: Some(connection),
            protocol_id: None,
            config: RpcConfig::default(),
        }
    }

    pub fn with_protocol_id(mut self, protocol_id: ProtocolId) -> Self {
        self.protocol_id = Some(protocol_id);
        self
    }

    pub fn with_config(mut self, config: RpcConfig) -> Self {
        self.config = config;
        self
    }
}

/// Server counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Requests answered, successful or not
    pub calls_dispatched: u64,
    /// Requests answered with a non-success status
    pub calls_failed: u64,
    pub sessions_accepted: u64,
    /// Sessions closed because `max_sessions` was reached
    pub sessions_refused: u64,
    pub active_sessions: usize,
}

struct SessionSlot {
    session: Arc<dyn Session>,
    thread: JoinHandle<()>,
}

/// Closes a session and frees its slot on every worker exit path
struct SessionGuard {
    shared: Arc<ServerShared>,
    session: Arc<dyn Session>,
    key: u64,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.close();
        self.shared.sessions.lock().remove(&self.key);
    }
}

/// State shared between the server handle, the listener and the workers
struct ServerShared {
    shutdown: AtomicBool,
    config: RpcConfig,
    max_payload_size: usize,
    registry: Arc<ServiceRegistry>,
    sessions: Mutex<HashMap<u64, SessionSlot>>,
    next_session: AtomicU64,
    calls_dispatched: AtomicU64,
    calls_failed: AtomicU64,
    sessions_accepted: AtomicU64,
    sessions_refused: AtomicU64,
}

/// Outcome of draining a request's parameters
enum Params {
    Collected(Vec<u8>),
    TooLarge,
    Corrupted,
}

/// RPC server bound to one endpoint and protocol.
///
/// # Example
///
/// ```rust,no_run
/// use ddrpc::{ApiVersion, FunctionInfo, LocalBus, RpcServer, ServerCreateInfo, ServiceInfo};
/// use std::sync::Arc;
///
/// # fn main() -> ddrpc::RpcResult<()> {
/// let bus = LocalBus::new();
/// let server = RpcServer::create(ServerCreateInfo::new(Arc::new(bus.connect())))?;
///
/// server.register_service(ServiceInfo::new(7, "Echo", ApiVersion::new(1, 0, 0)))?;
/// server.register_function(FunctionInfo::new(7, 1, "Echo", |ctx| {
///     let params = ctx.params;
///     ctx.write(params)
/// }).with_description("Returns its parameters"))?;
/// # Ok(())
/// # }
/// ```
pub struct RpcServer {
    client_id: ClientId,
    protocol_id: ProtocolId,
    shared: Arc<ServerShared>,
    listen_thread: Option<JoinHandle<()>>,
    // Keeps the endpoint alive for as long as the server listens
    _connection: Arc<dyn Connection>,
}

impl RpcServer {
    /// Create a server and start listening.
    ///
    /// # Errors
    /// `InvalidParameter` when the connection is missing, the protocol id is
    /// outside the configured range or the configuration is invalid; a
    /// transport error when the endpoint cannot listen.
    pub fn create(info: ServerCreateInfo) -> RpcResult<Self> {
        let connection = info.connection.ok_or_else(RpcError::invalid_parameter)?;
        let protocol_id = info
            .config
            .resolve_protocol_id(info.protocol_id)
            .ok_or_else(RpcError::invalid_parameter)?;
        if let Err(e) = info.config.validate() {
            log::warn!("[ddrpc-server] rejecting configuration: {}", e);
            return Err(RpcError::invalid_parameter());
        }

        let listener = connection.listen(protocol_id, info.config.max_pending_connections)?;
        let client_id = connection.client_id();
        let max_payload_size = connection
            .max_payload_size()
            .min(info.config.max_payload_size);

        let shared = Arc::new(ServerShared {
            shutdown: AtomicBool::new(false),
            config: info.config,
            max_payload_size,
            registry: Arc::new(ServiceRegistry::new()),
            sessions: Mutex::new(HashMap::new()),
            next_session: AtomicU64::new(1),
            calls_dispatched: AtomicU64::new(0),
            calls_failed: AtomicU64::new(0),
            sessions_accepted: AtomicU64::new(0),
            sessions_refused: AtomicU64::new(0),
        });

        let listen_shared = Arc::clone(&shared);
        let listen_thread = thread::Builder::new()
            .name("ddrpc-listen".to_string())
            .spawn(move || listen_shared.listen_loop(listener))
            .map_err(|e| {
                log::error!("[ddrpc-server] failed to spawn listener thread: {}", e);
                RpcError::Status(ResultCode::Unknown)
            })?;

        log::info!(
            "[ddrpc-server] listening on client {} protocol {}",
            client_id,
            protocol_id
        );

        Ok(Self {
            client_id,
            protocol_id,
            shared,
            listen_thread: Some(listen_thread),
            _connection: connection,
        })
    }

    /// Destroy a server. `None` is a no-op.
    pub fn destroy(server: Option<Self>) {
        if let Some(mut server) = server {
            server.shutdown();
        }
    }

    /// Endpoint id clients connect to
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn protocol_id(&self) -> ProtocolId {
        self.protocol_id
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.shared.registry
    }

    pub fn register_service(&self, info: ServiceInfo) -> RpcResult<()> {
        self.shared.registry.register_service(info)
    }

    pub fn unregister_service(&self, id: ServiceId) {
        self.shared.registry.unregister_service(id);
    }

    pub fn register_function(&self, info: FunctionInfo) -> RpcResult<()> {
        self.shared.registry.register_function(info)
    }

    pub fn unregister_function(&self, service_id: ServiceId, function_id: FunctionId) {
        self.shared.registry.unregister_function(service_id, function_id);
    }

    /// Registered services, ordered by id
    pub fn services(&self) -> Vec<ServiceInfo> {
        self.shared.registry.services()
    }

    pub fn stats(&self) -> ServerStats {
        let shared = &self.shared;
        ServerStats {
            calls_dispatched: shared.calls_dispatched.load(Ordering::Relaxed),
            calls_failed: shared.calls_failed.load(Ordering::Relaxed),
            sessions_accepted: shared.sessions_accepted.load(Ordering::Relaxed),
            sessions_refused: shared.sessions_refused.load(Ordering::Relaxed),
            active_sessions: shared.sessions.lock().len(),
        }
    }

    /// Stop accepting sessions, let in-flight handlers finish within the
    /// grace period and close every session. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        log::info!(
            "[ddrpc-server] shutting down client {} protocol {}",
            self.client_id,
            self.protocol_id
        );

        if let Some(handle) = self.listen_thread.take() {
            if handle.join().is_err() {
                log::error!("[ddrpc-server] listener thread panicked");
            }
        }

        let slots: Vec<SessionSlot> = self
            .shared
            .sessions
            .lock()
            .drain()
            .map(|(_, slot)| slot)
            .collect();

        let deadline = Instant::now() + self.shared.config.destroy_grace_period();
        while slots.iter().any(|slot| !slot.thread.is_finished()) && Instant::now() < deadline {
            thread::sleep(DRAIN_CHECK_INTERVAL);
        }

        for slot in slots {
            if slot.thread.is_finished() {
                if slot.thread.join().is_err() {
                    log::error!(
                        "[ddrpc-server] session {} worker panicked",
                        slot.session.remote_client_id()
                    );
                }
            } else {
                log::warn!(
                    "[ddrpc-server] session {} still busy after grace period, closing",
                    slot.session.remote_client_id()
                );
                slot.session.close();
            }
        }
    }
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl ServerShared {
    fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn listen_loop(self: Arc<Self>, listener: Box<dyn Listener>) {
        let poll = self.config.poll_interval();
        while !self.is_shutting_down() {
            match listener.accept(poll) {
                Ok(Some(session)) => self.start_session(Arc::from(session)),
                Ok(None) => {}
                Err(e) => {
                    log::error!("[ddrpc-server] listener failed: {}", e);
                    break;
                }
            }
        }
        log::debug!("[ddrpc-server] listener stopped");
    }

    fn start_session(self: &Arc<Self>, session: Arc<dyn Session>) {
        let remote = session.remote_client_id();
        let mut sessions = self.sessions.lock();

        if sessions.len() >= self.config.max_sessions {
            log::warn!(
                "[ddrpc-server] refusing session from {}: {} sessions active",
                remote,
                sessions.len()
            );
            self.sessions_refused.fetch_add(1, Ordering::Relaxed);
            session.close();
            return;
        }

        let key = self.next_session.fetch_add(1, Ordering::Relaxed);
        let worker = Arc::clone(self);
        let worker_session = Arc::clone(&session);
        let spawned = thread::Builder::new()
            .name(format!("ddrpc-session-{}", remote))
            .spawn(move || {
                let guard = SessionGuard {
                    shared: worker,
                    session: worker_session,
                    key,
                };
                guard.shared.serve_session(guard.session.as_ref());
            });

        match spawned {
            Ok(thread) => {
                sessions.insert(key, SessionSlot { session, thread });
                self.sessions_accepted.fetch_add(1, Ordering::Relaxed);
                log::debug!("[ddrpc-server] session from {} accepted", remote);
            }
            Err(e) => {
                log::error!(
                    "[ddrpc-server] failed to spawn worker for {}: {}",
                    remote,
                    e
                );
                session.close();
            }
        }
    }

    fn serve_session(&self, session: &dyn Session) {
        let remote = session.remote_client_id();
        let poll = self.config.poll_interval();

        while !self.is_shutting_down() {
            let message = match session.receive(poll) {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(TransportError::Disconnected) | Err(TransportError::Closed) => {
                    log::debug!("[ddrpc-server] session {} closed by peer", remote);
                    break;
                }
                Err(e) => {
                    log::warn!("[ddrpc-server] session {} receive failed: {}", remote, e);
                    break;
                }
            };

            let outcome = match Packet::decode(&message) {
                Ok(Packet::Request(header)) => self.dispatch(session, &header),
                Ok(other) => {
                    log::warn!(
                        "[ddrpc-server] session {}: {:?} packet outside a call, dropping",
                        remote,
                        other.kind()
                    );
                    Ok(())
                }
                Err(e) => {
                    log::warn!("[ddrpc-server] session {}: corrupted request: {}", remote, e);
                    self.reply(session, ResultCode::CorruptedPacket)
                }
            };

            if let Err(e) = outcome {
                log::warn!("[ddrpc-server] session {} dropped: {}", remote, e);
                break;
            }
        }

        session.close();
    }

    /// Serve one call. Only transport failures are returned; every other
    /// outcome is reported to the caller in the terminator.
    fn dispatch(&self, session: &dyn Session, header: &RequestHeader) -> Result<(), TransportError> {
        let params = match self.receive_params(session, header.param_size)? {
            Params::Corrupted => return self.reply(session, ResultCode::CorruptedPacket),
            params => params,
        };

        // Zero ids and versions are sentinels; reject them before the lookup
        let resolved = if header.service_id == 0
            || header.function_id == 0
            || !header.version.is_valid()
        {
            Err(ResultCode::InvalidParameter)
        } else if matches!(params, Params::TooLarge) {
            Err(ResultCode::ParamTooLarge)
        } else {
            self.registry
                .lookup(header.service_id, header.function_id, header.version)
                .map_err(|e| e.code())
        };

        let code = match (resolved, params) {
            (Ok(function), Params::Collected(params)) => {
                self.invoke(session, header, &function, &params)?
            }
            (Err(code), _) => code,
            (Ok(_), _) => ResultCode::Unknown,
        };

        if !code.is_success() {
            log::debug!(
                "[ddrpc-server] call {}:{} v{} from {} -> {}",
                header.service_id,
                header.function_id,
                header.version,
                session.remote_client_id(),
                code
            );
        }
        self.reply(session, code)
    }

    fn receive_params(&self, session: &dyn Session, size: u64) -> Result<Params, TransportError> {
        let keep = size <= self.config.max_param_size;
        let mut params = Vec::with_capacity(if keep { size as usize } else { 0 });
        let mut received = 0u64;
        let timeout = self.config.call_timeout();

        // Always drain so the next request starts on a packet boundary
        while received < size {
            let message = session.receive(timeout)?.ok_or(TransportError::Timeout)?;
            match Packet::decode(&message) {
                Ok(Packet::Data(chunk)) if !chunk.is_empty() => {
                    received += chunk.len() as u64;
                    if received > size {
                        return Ok(Params::Corrupted);
                    }
                    if keep {
                        params.extend_from_slice(chunk);
                    }
                }
                _ => return Ok(Params::Corrupted),
            }
        }

        Ok(if keep {
            Params::Collected(params)
        } else {
            Params::TooLarge
        })
    }

    fn invoke(
        &self,
        session: &dyn Session,
        header: &RequestHeader,
        function: &ResolvedFunction,
        params: &[u8],
    ) -> Result<ResultCode, TransportError> {
        let mut writer = ResponseWriter::new(
            session,
            self.max_payload_size,
            header.has_response_writer,
            self.config.send_timeout(),
        );

        let result = {
            let mut ctx = CallContext {
                version: header.version,
                params,
                writer: &mut writer,
            };
            panic::catch_unwind(AssertUnwindSafe(|| function.handler.call(&mut ctx)))
                .unwrap_or_else(|_| {
                    log::error!(
                        "[ddrpc-server] handler {}:{} panicked",
                        header.service_id,
                        header.function_id
                    );
                    Err(RpcError::from(ResultCode::Unknown))
                })
        };

        if let Some(e) = writer.transport_error.take() {
            return Err(e);
        }
        log::trace!(
            "[ddrpc-server] call {}:{} streamed {} bytes",
            header.service_id,
            header.function_id,
            writer.bytes_sent
        );
        Ok(writer.finish(result))
    }

    fn reply(&self, session: &dyn Session, code: ResultCode) -> Result<(), TransportError> {
        self.calls_dispatched.fetch_add(1, Ordering::Relaxed);
        if !code.is_success() {
            self.calls_failed.fetch_add(1, Ordering::Relaxed);
        }
        session.send(&Packet::Terminator(code).to_bytes(), self.config.send_timeout())
    }
}

/// Server-side sink streaming handler output to the session.
///
/// Bytes are dropped when the caller supplied no writer; the call then ends
/// with `UnexpectedReturnData` instead of silently succeeding.
pub(crate) struct ResponseWriter<'a> {
    session: &'a dyn Session,
    max_payload_size: usize,
    caller_has_writer: bool,
    send_timeout: Duration,
    ended: Option<ResultCode>,
    bytes_sent: usize,
    bytes_dropped: usize,
    transport_error: Option<TransportError>,
}

impl<'a> ResponseWriter<'a> {
    pub(crate) fn new(
        session: &'a dyn Session,
        max_payload_size: usize,
        caller_has_writer: bool,
        send_timeout: Duration,
    ) -> Self {
        Self {
            session,
            max_payload_size,
            caller_has_writer,
            send_timeout,
            ended: None,
            bytes_sent: 0,
            bytes_dropped: 0,
            transport_error: None,
        }
    }

    fn send(&mut self, packet: Packet<'_>) -> RpcResult<()> {
        if let Some(e) = &self.transport_error {
            return Err(e.clone().into());
        }
        self.session
            .send(&packet.to_bytes(), self.send_timeout)
            .map_err(|e| {
                self.transport_error = Some(e.clone());
                RpcError::Transport(e)
            })
    }

    fn misuse(&self, operation: &str) -> RpcResult<()> {
        log::warn!(
            "[ddrpc-server] handler called {} after ending its response",
            operation
        );
        Err(RpcError::invalid_parameter())
    }

    /// Final status of the call given the handler's own result.
    pub(crate) fn finish(&self, handler_result: RpcResult<()>) -> ResultCode {
        let code = match handler_result {
            Err(e) => e.code(),
            Ok(()) => self.ended.unwrap_or(ResultCode::Success),
        };

        if code.is_success() && self.bytes_dropped > 0 {
            log::warn!(
                "[ddrpc-server] handler returned {} bytes to a caller without a writer",
                self.bytes_dropped
            );
            return ResultCode::UnexpectedReturnData;
        }
        code
    }

    #[cfg(test)]
    pub(crate) fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }
}

impl ByteWriter for ResponseWriter<'_> {
    fn begin(&mut self, total_size: Option<usize>) -> RpcResult<()> {
        if self.ended.is_some() {
            return self.misuse("begin");
        }
        match total_size {
            Some(size) if size > 0 && self.caller_has_writer => {
                self.send(Packet::SizeIndicator(size as u64))
            }
            _ => Ok(()),
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> RpcResult<()> {
        if self.ended.is_some() {
            return self.misuse("write_bytes");
        }
        if bytes.is_empty() {
            return Ok(());
        }
        if !self.caller_has_writer {
            self.bytes_dropped += bytes.len();
            return Ok(());
        }

        for chunk in data_chunks(bytes, self.max_payload_size) {
            self.send(Packet::Data(chunk))?;
            self.bytes_sent += chunk.len();
        }
        Ok(())
    }

    fn end(&mut self, result: ResultCode) -> RpcResult<()> {
        if self.ended.is_some() {
            return self.misuse("end");
        }
        self.ended = Some(result);
        Ok(())
    }
}
