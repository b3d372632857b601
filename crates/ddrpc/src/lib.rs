// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # ddRpc - versioned request/response RPC over message channels
//!
//! Services are groups of functions identified by numeric ids and carrying a
//! semantic version. A server hosts services on one endpoint and protocol of
//! a point-to-point message fabric; clients open a session to that endpoint
//! and issue synchronous calls whose response is streamed back into a
//! caller-supplied [`ByteWriter`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ddrpc::{
//!     ApiVersion, BufferWriter, CallInfo, ClientCreateInfo, FunctionInfo, LocalBus, RpcClient,
//!     RpcResult, RpcServer, ServerCreateInfo, ServiceInfo,
//! };
//! use std::sync::Arc;
//!
//! fn main() -> RpcResult<()> {
//!     let bus = LocalBus::new();
//!     let server = RpcServer::create(ServerCreateInfo::new(Arc::new(bus.connect())))?;
//!
//!     let version = ApiVersion::new(1, 0, 0);
//!     server.register_service(ServiceInfo::new(42, "Clock", version))?;
//!     server.register_function(FunctionInfo::new(42, 1, "Now", |ctx| {
//!         ctx.write(&1_700_000_000u64.to_le_bytes())
//!     }).with_description("Current time in milliseconds"))?;
//!
//!     let info = ClientCreateInfo::new(Arc::new(bus.connect()), server.client_id());
//!     let mut client = RpcClient::create(info)?;
//!
//!     let mut reply = BufferWriter::new();
//!     client.call(CallInfo::new(42, version, 1).writer(&mut reply))?;
//!     assert_eq!(reply.bytes().len(), 8);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------+
//! |  RpcClient::call                RpcServer (listener + workers)|
//! +---------------------------------------------------------------+
//! |  protocol: Request / Data / SizeIndicator / Terminator packets |
//! +---------------------------------------------------------------+
//! |  transport: Connection / Listener / Session  (LocalBus)       |
//! +---------------------------------------------------------------+
//! ```
//!
//! ## Modules Overview
//!
//! - [`registry`] - service and function tables, handler trait
//! - [`server`] / [`client`] - the two ends of a call
//! - [`protocol`] - packet encoding
//! - [`transport`] - message fabric abstraction and in-process bus
//! - [`config`] - constants and TOML configuration
//! - [`error`] - result codes and error types

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod transport;
pub mod types;
pub mod writer;

pub use client::{CallInfo, ClientCreateInfo, RpcClient};
pub use config::{ConfigError, ProtocolIdRange, RpcConfig};
pub use error::{result_code, ResultCode, RpcError, RpcResult};
pub use protocol::WireError;
pub use registry::{
    CallContext, FunctionHandler, FunctionInfo, ResolvedFunction, ServiceInfo, ServiceRegistry,
};
pub use server::{RpcServer, ServerCreateInfo, ServerStats};
pub use transport::{
    Connection, Listener, LocalBus, LocalConnection, Session, TransportError,
};
pub use types::{ApiVersion, ClientId, FunctionId, ProtocolId, ServiceId};
pub use writer::{BufferWriter, ByteWriter, RejectingWriter};
