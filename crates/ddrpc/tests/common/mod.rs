// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared fixtures for ddRpc integration tests.

#![allow(dead_code)]

use ddrpc::{
    ApiVersion, CallContext, ClientCreateInfo, Connection, FunctionId, FunctionInfo, LocalBus,
    ProtocolId, ProtocolIdRange, ResultCode, RpcClient, RpcConfig, RpcError, RpcResult,
    RpcServer, ServerCreateInfo, ServiceId, ServiceInfo,
};
use std::sync::Arc;
use std::time::Duration;

pub const TEST_PROTOCOL_ID: ProtocolId = 64;
pub const INVALID_TEST_PROTOCOL_ID: ProtocolId = 63;

/// Nonzero ids nobody registers
pub const INVALID_SERVICE: ServiceId = 1000;
pub const INVALID_FUNCTION: FunctionId = 2000;

pub const TEST_SERVICE_ID: ServiceId = 1337;
pub const TEST_SERVICE_VERSION: ApiVersion = ApiVersion::new(1, 1, 1);

pub const TEST_FUNCTION: FunctionId = 64;
pub const TEST_VERSION_FUNCTION: FunctionId = TEST_FUNCTION + 1;
pub const TEST_NO_PARAM_NO_RETURN: FunctionId = TEST_FUNCTION + 2;
pub const TEST_NO_PARAM_RETURN: FunctionId = TEST_FUNCTION + 3;
pub const TEST_PARAM_NO_RETURN: FunctionId = TEST_FUNCTION + 4;
pub const TEST_PARAM_RETURN: FunctionId = TEST_FUNCTION + 5;

pub const TEST_RETURN_DATA: u64 = 0x12345678;
pub const TEST_PARAM_DATA: u64 = 0x87654321;

pub fn test_config() -> RpcConfig {
    RpcConfig {
        protocol_ids: ProtocolIdRange {
            min: TEST_PROTOCOL_ID,
            max: 127,
        },
        poll_interval_ms: 10,
        call_timeout_ms: 2000,
        destroy_grace_period_ms: 500,
        ..RpcConfig::default()
    }
}

pub fn test_service_info() -> ServiceInfo {
    ServiceInfo::new(TEST_SERVICE_ID, "Test", TEST_SERVICE_VERSION)
        .with_description("Service used by the ddRpc tests")
}

pub fn test_function_info() -> FunctionInfo {
    FunctionInfo::new(TEST_SERVICE_ID, TEST_FUNCTION, "TestFunction", |_ctx| Ok(()))
        .with_description("Does nothing")
}

/// Read the single u64 parameter every parameterised test function expects.
fn read_param(ctx: &CallContext<'_>) -> RpcResult<u64> {
    let bytes: [u8; 8] = ctx
        .params
        .try_into()
        .map_err(|_| RpcError::Status(ResultCode::ParsingUnexpectedEof))?;
    match u64::from_le_bytes(bytes) {
        TEST_PARAM_DATA => Ok(TEST_PARAM_DATA),
        _ => Err(ResultCode::ParsingInvalidBytes.into()),
    }
}

/// Register the test service with its six functions.
pub fn register_test_service(server: &RpcServer) {
    server
        .register_service(test_service_info())
        .expect("register test service");

    let functions = [
        test_function_info(),
        FunctionInfo::new(TEST_SERVICE_ID, TEST_VERSION_FUNCTION, "TestVersion", |ctx| {
            if ctx.version == TEST_SERVICE_VERSION {
                Ok(())
            } else {
                Err(RpcError::invalid_parameter())
            }
        }).with_description("Checks the requested version"),
        FunctionInfo::new(TEST_SERVICE_ID, TEST_NO_PARAM_NO_RETURN, "NoParamNoReturn", |_ctx| {
            Ok(())
        }).with_description("Takes nothing and returns nothing"),
        FunctionInfo::new(TEST_SERVICE_ID, TEST_NO_PARAM_RETURN, "NoParamReturn", |ctx| {
            ctx.write(&TEST_RETURN_DATA.to_le_bytes())
        }).with_description("Returns a fixed value"),
        FunctionInfo::new(TEST_SERVICE_ID, TEST_PARAM_NO_RETURN, "ParamNoReturn", |ctx| {
            read_param(ctx).map(|_| ())
        }).with_description("Validates its parameter"),
        FunctionInfo::new(TEST_SERVICE_ID, TEST_PARAM_RETURN, "ParamReturn", |ctx| {
            read_param(ctx)?;
            ctx.write(&TEST_RETURN_DATA.to_le_bytes())
        }).with_description("Validates its parameter and returns a fixed value"),
    ];

    for info in functions {
        server.register_function(info).expect("register test function");
    }
}

pub fn create_server(bus: &LocalBus) -> RpcServer {
    create_server_with(bus, test_config())
}

pub fn create_server_with(bus: &LocalBus, config: RpcConfig) -> RpcServer {
    let connection: Arc<dyn Connection> = Arc::new(bus.connect());
    let info = ServerCreateInfo::new(connection)
        .with_protocol_id(TEST_PROTOCOL_ID)
        .with_config(config);
    RpcServer::create(info).expect("Failed to create server")
}

pub fn create_client(bus: &LocalBus, server: &RpcServer) -> RpcClient {
    create_client_with(bus, server, test_config())
}

pub fn create_client_with(bus: &LocalBus, server: &RpcServer, config: RpcConfig) -> RpcClient {
    let connection: Arc<dyn Connection> = Arc::new(bus.connect());
    let info = ClientCreateInfo::new(connection, server.client_id())
        .with_protocol_id(TEST_PROTOCOL_ID)
        .with_timeout(Duration::from_millis(1000))
        .with_config(config);
    RpcClient::create(info).expect("Failed to create client")
}

/// A server hosting the test service plus one connected client.
pub struct Fixture {
    pub bus: LocalBus,
    pub server: RpcServer,
    pub client: RpcClient,
}

impl Fixture {
    pub fn new() -> Self {
        let bus = LocalBus::new();
        let server = create_server(&bus);
        register_test_service(&server);
        let client = create_client(&bus, &server);
        Self {
            bus,
            server,
            client,
        }
    }
}
