// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # ddRpc C ABI
//!
//! C-compatible bindings for ddRpc servers and clients over the in-process
//! bus. Every function returns a `DDResult` (the numeric [`ResultCode`]);
//! required pointers are null-checked and rejected with
//! `DD_RESULT_COMMON_INVALID_PARAMETER`, and destroy functions accept NULL.
//!
//! # Usage from C
//!
//! ```c
//! DDRpcBus* bus = dd_rpc_bus_create();
//! DDNetConnection* server_conn = NULL;
//! dd_rpc_connection_create(bus, &server_conn);
//!
//! DDRpcServerCreateInfo server_info = { server_conn, 0 };
//! DDRpcServer* server = NULL;
//! dd_rpc_server_create(&server_info, &server);
//!
//! DDRpcServiceInfo service = { 42, { 1, 0, 0 }, "Clock", "Wall clock" };
//! dd_rpc_server_register_service(server, &service);
//!
//! DDRpcFunctionInfo function = { 42, 1, "Now", "Current time", NULL, now_handler };
//! dd_rpc_server_register_function(server, &function);
//! ```
//!
//! # Safety
//!
//! All public functions taking pointers are `unsafe` and require the caller
//! to pass either NULL or a pointer obtained from this library (handles), or
//! valid, properly aligned memory (info structs, strings, buffers).

mod logging;
mod writer;

pub use logging::*;
pub use writer::{
    DDByteWriter, PfnByteWriterBegin, PfnByteWriterEnd, PfnByteWriterWriteBytes,
};

use std::ffi::CStr;
use std::os::raw::{c_char, c_void};
use std::ptr;
use std::sync::Arc;
use std::time::Duration;

use ddrpc::{
    ApiVersion, ByteWriter, CallContext, CallInfo, ClientCreateInfo, FunctionHandler, FunctionInfo,
    LocalBus, LocalConnection, ResultCode, RpcClient, RpcResult, RpcServer, ServerCreateInfo,
    ServiceInfo,
};

use writer::{borrow_as_c, ForeignWriter};

/// Numeric [`ResultCode`]
pub type DDResult = i32;

pub const DD_RESULT_SUCCESS: DDResult = ResultCode::Success as i32;
pub const DD_RESULT_COMMON_INVALID_PARAMETER: DDResult = ResultCode::InvalidParameter as i32;

/// Opaque handle to an in-process message bus
#[repr(C)]
pub struct DDRpcBus {
    _private: [u8; 0],
}

/// Opaque handle to one endpoint on a bus
#[repr(C)]
pub struct DDNetConnection {
    _private: [u8; 0],
}

/// Opaque handle to an RPC server
#[repr(C)]
pub struct DDRpcServer {
    _private: [u8; 0],
}

/// Opaque handle to an RPC client
#[repr(C)]
pub struct DDRpcClient {
    _private: [u8; 0],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DDApiVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl From<DDApiVersion> for ApiVersion {
    fn from(v: DDApiVersion) -> Self {
        ApiVersion::new(v.major, v.minor, v.patch)
    }
}

impl From<ApiVersion> for DDApiVersion {
    fn from(v: ApiVersion) -> Self {
        Self {
            major: v.major,
            minor: v.minor,
            patch: v.patch,
        }
    }
}

#[repr(C)]
pub struct DDRpcServerCreateInfo {
    /// Endpoint to listen on
    pub connection: *mut DDNetConnection,
    /// 0 selects the default protocol
    pub protocol_id: u8,
}

#[repr(C)]
pub struct DDRpcClientCreateInfo {
    /// Local endpoint
    pub connection: *mut DDNetConnection,
    /// Endpoint hosting the server
    pub client_id: u16,
    /// 0 selects the default protocol
    pub protocol_id: u8,
    /// Connection timeout, 0 selects the default
    pub timeout_in_ms: u32,
}

#[repr(C)]
pub struct DDRpcServiceInfo {
    pub id: u32,
    pub version: DDApiVersion,
    pub name: *const c_char,
    pub description: *const c_char,
}

/// Arguments handed to a C function handler.
#[repr(C)]
pub struct DDRpcServerCallInfo {
    pub user_data: *mut c_void,
    /// Version the caller requested
    pub version: DDApiVersion,
    pub param_buffer_size: usize,
    /// NULL when `param_buffer_size` is 0
    pub param_buffer: *const c_void,
    /// Response sink, valid for the duration of the call
    pub writer: *const DDByteWriter,
}

/// C function handler. A non-success return ends the call with that code.
pub type PfnRpcFunction = unsafe extern "C" fn(call: *const DDRpcServerCallInfo) -> DDResult;

#[repr(C)]
pub struct DDRpcFunctionInfo {
    pub service_id: u32,
    pub id: u32,
    pub name: *const c_char,
    pub description: *const c_char,
    pub user_data: *mut c_void,
    pub pfn_function: Option<PfnRpcFunction>,
}

#[repr(C)]
pub struct DDRpcClientCallInfo {
    pub service: u32,
    pub service_version: DDApiVersion,
    pub function: u32,
    pub param_buffer_size: usize,
    /// May be NULL only when `param_buffer_size` is 0
    pub param_buffer: *const c_void,
    /// Optional response sink
    pub response_writer: *const DDByteWriter,
    /// 0 selects the default call timeout
    pub timeout_in_ms: u32,
}

fn code_of<T>(result: &RpcResult<T>) -> DDResult {
    ddrpc::result_code(result).as_i32()
}

unsafe fn c_str<'a>(s: *const c_char) -> Option<&'a str> {
    if s.is_null() {
        return None;
    }
    CStr::from_ptr(s).to_str().ok()
}

unsafe fn bytes<'a>(data: *const c_void, size: usize) -> Option<&'a [u8]> {
    match (data.is_null(), size) {
        (_, 0) => Some(&[]),
        (true, _) => None,
        (false, _) => Some(std::slice::from_raw_parts(data.cast::<u8>(), size)),
    }
}

// =============================================================================
// Bus and connections
// =============================================================================

/// Create an in-process bus. Release with `dd_rpc_bus_destroy`.
#[no_mangle]
pub extern "C" fn dd_rpc_bus_create() -> *mut DDRpcBus {
    logging::init_default();
    Box::into_raw(Box::new(LocalBus::new())).cast::<DDRpcBus>()
}

/// # Safety
/// `bus` must be NULL or a handle from `dd_rpc_bus_create`, destroyed once.
#[no_mangle]
pub unsafe extern "C" fn dd_rpc_bus_destroy(bus: *mut DDRpcBus) {
    if !bus.is_null() {
        drop(Box::from_raw(bus.cast::<LocalBus>()));
    }
}

/// Attach a new endpoint to `bus`.
///
/// # Safety
/// `bus` must be a valid bus handle, `out_connection` a writable pointer.
#[no_mangle]
pub unsafe extern "C" fn dd_rpc_connection_create(
    bus: *mut DDRpcBus,
    out_connection: *mut *mut DDNetConnection,
) -> DDResult {
    if bus.is_null() || out_connection.is_null() {
        return DD_RESULT_COMMON_INVALID_PARAMETER;
    }
    let bus = &*bus.cast::<LocalBus>();
    let connection = Arc::new(bus.connect());
    *out_connection = Box::into_raw(Box::new(connection)).cast::<DDNetConnection>();
    DD_RESULT_SUCCESS
}

/// # Safety
/// `connection` must be NULL or a handle from `dd_rpc_connection_create`.
/// Servers and clients created from it keep the endpoint alive.
#[no_mangle]
pub unsafe extern "C" fn dd_rpc_connection_destroy(connection: *mut DDNetConnection) {
    if !connection.is_null() {
        drop(Box::from_raw(connection.cast::<Arc<LocalConnection>>()));
    }
}

/// Endpoint id of `connection`, 0 for NULL.
///
/// # Safety
/// `connection` must be NULL or a valid connection handle.
#[no_mangle]
pub unsafe extern "C" fn dd_rpc_connection_query_client_id(
    connection: *const DDNetConnection,
) -> u16 {
    if connection.is_null() {
        return 0;
    }
    use ddrpc::Connection;
    (*connection.cast::<Arc<LocalConnection>>()).client_id()
}

unsafe fn connection_arc(connection: *mut DDNetConnection) -> Arc<LocalConnection> {
    Arc::clone(&*connection.cast::<Arc<LocalConnection>>())
}

// =============================================================================
// Server
// =============================================================================

/// Bridge from a C function pointer to [`FunctionHandler`].
struct CFunctionBridge {
    callback: PfnRpcFunction,
    user_data: *mut c_void,
}

// SAFETY: handlers run on session worker threads. The C API documents that
// the callback and its user data must be thread-safe.
unsafe impl Send for CFunctionBridge {}
unsafe impl Sync for CFunctionBridge {}

impl FunctionHandler for CFunctionBridge {
    fn call(&self, ctx: &mut CallContext<'_>) -> RpcResult<()> {
        let mut slot: &mut dyn ByteWriter = &mut *ctx.writer;
        let writer = borrow_as_c(&mut slot);
        let info = DDRpcServerCallInfo {
            user_data: self.user_data,
            version: ctx.version.into(),
            param_buffer_size: ctx.params.len(),
            param_buffer: if ctx.params.is_empty() {
                ptr::null()
            } else {
                ctx.params.as_ptr().cast()
            },
            writer: &writer,
        };

        // SAFETY: `info` and the writer it points to outlive the callback
        let rc = unsafe { (self.callback)(&info) };
        ResultCode::from_i32(rc).into_result()
    }
}

/// Create a server listening on `info.connection`.
///
/// # Safety
/// `info` and `out_server` must be valid pointers; `info.connection` a valid
/// connection handle.
#[no_mangle]
pub unsafe extern "C" fn dd_rpc_server_create(
    info: *const DDRpcServerCreateInfo,
    out_server: *mut *mut DDRpcServer,
) -> DDResult {
    if info.is_null() || out_server.is_null() {
        return DD_RESULT_COMMON_INVALID_PARAMETER;
    }
    let info = &*info;
    if info.connection.is_null() {
        return DD_RESULT_COMMON_INVALID_PARAMETER;
    }

    let mut create = ServerCreateInfo::new(connection_arc(info.connection));
    if info.protocol_id != 0 {
        create = create.with_protocol_id(info.protocol_id);
    }

    match RpcServer::create(create) {
        Ok(server) => {
            *out_server = Box::into_raw(Box::new(server)).cast::<DDRpcServer>();
            DD_RESULT_SUCCESS
        }
        Err(e) => {
            log::error!("[ddrpc-c] dd_rpc_server_create: {}", e);
            e.code().as_i32()
        }
    }
}

/// Stop the server, letting in-flight calls finish.
///
/// # Safety
/// `server` must be NULL or a handle from `dd_rpc_server_create`, destroyed once.
#[no_mangle]
pub unsafe extern "C" fn dd_rpc_server_destroy(server: *mut DDRpcServer) {
    if !server.is_null() {
        RpcServer::destroy(Some(*Box::from_raw(server.cast::<RpcServer>())));
    }
}

/// Endpoint id clients connect to, 0 for NULL.
///
/// # Safety
/// `server` must be NULL or a valid server handle.
#[no_mangle]
pub unsafe extern "C" fn dd_rpc_server_query_client_id(server: *const DDRpcServer) -> u16 {
    if server.is_null() {
        return 0;
    }
    (*server.cast::<RpcServer>()).client_id()
}

/// # Safety
/// `server` must be a valid server handle; `info` a valid pointer whose
/// strings are null-terminated.
#[no_mangle]
pub unsafe extern "C" fn dd_rpc_server_register_service(
    server: *mut DDRpcServer,
    info: *const DDRpcServiceInfo,
) -> DDResult {
    if server.is_null() || info.is_null() {
        return DD_RESULT_COMMON_INVALID_PARAMETER;
    }
    let info = &*info;
    let (Some(name), Some(description)) = (c_str(info.name), c_str(info.description)) else {
        return DD_RESULT_COMMON_INVALID_PARAMETER;
    };

    let server = &*server.cast::<RpcServer>();
    code_of(&server.register_service(
        ServiceInfo::new(info.id, name, info.version.into()).with_description(description),
    ))
}

/// # Safety
/// `server` must be NULL or a valid server handle.
#[no_mangle]
pub unsafe extern "C" fn dd_rpc_server_unregister_service(server: *mut DDRpcServer, id: u32) {
    if !server.is_null() {
        (*server.cast::<RpcServer>()).unregister_service(id);
    }
}

/// Register a C handler. `info.user_data` is passed back on every call.
///
/// # Safety
/// `server` must be a valid server handle; `info` a valid pointer whose
/// strings are null-terminated. The handler and user data must be safe to
/// use from any thread until the function is unregistered.
#[no_mangle]
pub unsafe extern "C" fn dd_rpc_server_register_function(
    server: *mut DDRpcServer,
    info: *const DDRpcFunctionInfo,
) -> DDResult {
    if server.is_null() || info.is_null() {
        return DD_RESULT_COMMON_INVALID_PARAMETER;
    }
    let info = &*info;
    let (Some(name), Some(description), Some(callback)) =
        (c_str(info.name), c_str(info.description), info.pfn_function)
    else {
        return DD_RESULT_COMMON_INVALID_PARAMETER;
    };

    let bridge = Arc::new(CFunctionBridge {
        callback,
        user_data: info.user_data,
    });
    let server = &*server.cast::<RpcServer>();
    code_of(&server.register_function(
        FunctionInfo::with_handler(info.service_id, info.id, name, bridge)
            .with_description(description),
    ))
}

/// # Safety
/// `server` must be NULL or a valid server handle.
#[no_mangle]
pub unsafe extern "C" fn dd_rpc_server_unregister_function(
    server: *mut DDRpcServer,
    service_id: u32,
    function_id: u32,
) {
    if !server.is_null() {
        (*server.cast::<RpcServer>()).unregister_function(service_id, function_id);
    }
}

// =============================================================================
// Client
// =============================================================================

/// Connect a client to the server at `info.client_id`.
///
/// # Safety
/// `info` and `out_client` must be valid pointers; `info.connection` a valid
/// connection handle.
#[no_mangle]
pub unsafe extern "C" fn dd_rpc_client_create(
    info: *const DDRpcClientCreateInfo,
    out_client: *mut *mut DDRpcClient,
) -> DDResult {
    if info.is_null() || out_client.is_null() {
        return DD_RESULT_COMMON_INVALID_PARAMETER;
    }
    let info = &*info;
    if info.connection.is_null() {
        return DD_RESULT_COMMON_INVALID_PARAMETER;
    }

    let mut create = ClientCreateInfo::new(connection_arc(info.connection), info.client_id)
        .with_timeout(Duration::from_millis(u64::from(info.timeout_in_ms)));
    if info.protocol_id != 0 {
        create = create.with_protocol_id(info.protocol_id);
    }

    match RpcClient::create(create) {
        Ok(client) => {
            *out_client = Box::into_raw(Box::new(client)).cast::<DDRpcClient>();
            DD_RESULT_SUCCESS
        }
        Err(e) => {
            log::warn!("[ddrpc-c] dd_rpc_client_create: {}", e);
            e.code().as_i32()
        }
    }
}

/// # Safety
/// `client` must be NULL or a handle from `dd_rpc_client_create`, destroyed once.
#[no_mangle]
pub unsafe extern "C" fn dd_rpc_client_destroy(client: *mut DDRpcClient) {
    if !client.is_null() {
        RpcClient::destroy(Some(*Box::from_raw(client.cast::<RpcClient>())));
    }
}

/// Issue a synchronous call.
///
/// # Safety
/// `client` must be a valid client handle, not used concurrently from
/// another thread; `info` a valid pointer. `info.param_buffer` must point to
/// `info.param_buffer_size` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn dd_rpc_client_call(
    client: *mut DDRpcClient,
    info: *const DDRpcClientCallInfo,
) -> DDResult {
    if client.is_null() || info.is_null() {
        return DD_RESULT_COMMON_INVALID_PARAMETER;
    }
    let info = &*info;
    let Some(params) = bytes(info.param_buffer, info.param_buffer_size) else {
        return DD_RESULT_COMMON_INVALID_PARAMETER;
    };

    let mut foreign = if info.response_writer.is_null() {
        None
    } else {
        match ForeignWriter::new(*info.response_writer) {
            Some(writer) => Some(writer),
            None => return DD_RESULT_COMMON_INVALID_PARAMETER,
        }
    };

    let mut call = CallInfo::new(info.service, info.service_version.into(), info.function)
        .params(params);
    if info.timeout_in_ms != 0 {
        call = call.timeout(Duration::from_millis(u64::from(info.timeout_in_ms)));
    }
    if let Some(writer) = foreign.as_mut() {
        call = call.writer(writer);
    }

    let client = &mut *client.cast::<RpcClient>();
    code_of(&client.call(call))
}
