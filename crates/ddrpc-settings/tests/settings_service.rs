// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Settings service exercised end to end over the in-process bus.

use ddrpc::{
    ClientCreateInfo, LocalBus, ResultCode, RpcClient, RpcConfig, RpcServer, ServerCreateInfo,
};
use ddrpc_settings::service::{QUERY_CURRENT_VALUES, SET_DATA};
use ddrpc_settings::{
    component_hash, setting_name_hash, MemoryComponent, SettingValue, SettingsClient,
    SettingsDataHeader, SettingsService, SETTINGS_SERVICE_ID, SETTINGS_SERVICE_VERSION,
};
use std::sync::Arc;
use std::thread;

fn test_config() -> RpcConfig {
    RpcConfig {
        poll_interval_ms: 10,
        destroy_grace_period_ms: 500,
        ..RpcConfig::default()
    }
}

struct Harness {
    bus: LocalBus,
    server: RpcServer,
    settings: Arc<SettingsService>,
    pal: Arc<MemoryComponent>,
}

impl Harness {
    fn new() -> Self {
        let bus = LocalBus::new();
        let server = RpcServer::create(
            ServerCreateInfo::new(Arc::new(bus.connect())).with_config(test_config()),
        )
        .expect("Failed to create server");

        let pal = Arc::new(
            MemoryComponent::new("Pal")
                .with_setting("TextureOpt", SettingValue::Uint32(1))
                .with_setting("Vsync", SettingValue::Bool(true))
                .with_setting("DebugName", SettingValue::String("frame".into()))
                .with_settings_data(
                    SettingsDataHeader {
                        is_encoded: true,
                        magic_buffer_id: 0x1234,
                        magic_buffer_offset: 16,
                    },
                    b"{\"Settings\":[]}".to_vec(),
                )
                .with_data_hash(0x0123_4567_89AB_CDEF),
        );

        let settings = SettingsService::new();
        settings
            .register_component(pal.clone())
            .expect("register Pal");
        settings
            .register_component(Arc::new(
                MemoryComponent::new("Dx12").with_setting("MaxFrames", SettingValue::Uint8(3)),
            ))
            .expect("register Dx12");
        settings.register(&server).expect("register service");

        Self {
            bus,
            server,
            settings,
            pal,
        }
    }

    fn rpc(&self) -> RpcClient {
        RpcClient::create(
            ClientCreateInfo::new(Arc::new(self.bus.connect()), self.server.client_id())
                .with_config(test_config()),
        )
        .expect("Failed to create client")
    }

    fn client(&self) -> SettingsClient {
        SettingsClient::new(self.rpc())
    }
}

#[test]
fn test_service_is_listed() {
    let harness = Harness::new();
    let services = harness.server.services();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].id, SETTINGS_SERVICE_ID);
    assert_eq!(services[0].version, SETTINGS_SERVICE_VERSION);
    assert_eq!(
        harness
            .server
            .registry()
            .functions(SETTINGS_SERVICE_ID)
            .expect("functions")
            .len(),
        6
    );
}

#[test]
fn test_get_components() {
    let harness = Harness::new();
    let mut client = harness.client();

    assert_eq!(client.get_components().expect("components"), ["Dx12", "Pal"]);

    harness.settings.unregister_component("Dx12");
    assert_eq!(client.get_components().expect("components"), ["Pal"]);
}

#[test]
fn test_query_component_settings() {
    let harness = Harness::new();
    let mut client = harness.client();

    let (header, blob) = client
        .query_component_settings("Pal")
        .expect("settings blob");
    assert!(header.is_encoded);
    assert_eq!(header.magic_buffer_id, 0x1234);
    assert_eq!(header.magic_buffer_offset, 16);
    assert_eq!(blob, b"{\"Settings\":[]}");

    assert_eq!(
        client.query_component_settings("Dx12").unwrap_err(),
        ResultCode::SettingsInvalidSettingData
    );
    assert_eq!(
        client.query_component_settings("Vulkan").unwrap_err(),
        ResultCode::SettingsInvalidComponent
    );
    assert_eq!(
        client.query_component_settings("").unwrap_err(),
        ResultCode::InvalidParameter
    );
}

#[test]
fn test_query_data_hash_and_values() {
    let harness = Harness::new();
    let mut client = harness.client();

    assert_eq!(
        client.query_settings_data_hash("Pal").expect("hash"),
        0x0123_4567_89AB_CDEF
    );

    let values = client.query_current_values("Pal").expect("values");
    assert_eq!(values.len(), 3);
    assert_eq!(values[0].hash, setting_name_hash("TextureOpt"));
    assert_eq!(values[0].value, SettingValue::Uint32(1));
    assert_eq!(values[2].value, SettingValue::String("frame".into()));

    assert_eq!(
        client.query_current_values("Vulkan").unwrap_err(),
        ResultCode::SettingsInvalidComponent
    );
}

#[test]
fn test_set_data() {
    let harness = Harness::new();
    let mut client = harness.client();

    client
        .set_data("Pal", setting_name_hash("Vsync"), SettingValue::Bool(false))
        .expect("set Vsync");
    assert_eq!(harness.pal.value("Vsync"), Some(SettingValue::Bool(false)));

    client
        .set_data(
            "Pal",
            setting_name_hash("DebugName"),
            SettingValue::String("capture".into()),
        )
        .expect("set DebugName");
    let values = client.query_current_values("Pal").expect("values");
    assert_eq!(values[2].value, SettingValue::String("capture".into()));

    assert_eq!(
        client
            .set_data("Pal", setting_name_hash("Missing"), SettingValue::Bool(true))
            .unwrap_err(),
        ResultCode::SettingsInvalidName
    );
    assert_eq!(
        client
            .set_data("Pal", setting_name_hash("Vsync"), SettingValue::Uint32(1))
            .unwrap_err(),
        ResultCode::SettingsTypeMismatch
    );
    assert_eq!(
        client
            .set_data("Vulkan", setting_name_hash("Vsync"), SettingValue::Bool(true))
            .unwrap_err(),
        ResultCode::SettingsInvalidComponent
    );

    // Failed calls leave the session usable
    assert_eq!(harness.pal.value("Vsync"), Some(SettingValue::Bool(false)));
    assert!(client.rpc().is_connected());
}

#[test]
fn test_malformed_params() {
    let harness = Harness::new();
    let mut rpc = harness.rpc();

    // Declares a 64-byte name but carries three bytes
    let mut params = 64u32.to_le_bytes().to_vec();
    params.extend_from_slice(b"Pal");
    let err = rpc
        .call(
            ddrpc::CallInfo::new(SETTINGS_SERVICE_ID, SETTINGS_SERVICE_VERSION, SET_DATA)
                .params(&params),
        )
        .unwrap_err();
    assert_eq!(err, ResultCode::ParsingInvalidBytes);

    // Name without terminator
    let err = rpc
        .call_to_vec(
            SETTINGS_SERVICE_ID,
            SETTINGS_SERVICE_VERSION,
            QUERY_CURRENT_VALUES,
            b"Pal",
        )
        .unwrap_err();
    assert_eq!(err, ResultCode::InvalidParameter);

    let reply = rpc
        .call_to_vec(
            SETTINGS_SERVICE_ID,
            SETTINGS_SERVICE_VERSION,
            QUERY_CURRENT_VALUES,
            b"Pal\0",
        )
        .expect("well-formed call after failures");
    assert!(!reply.is_empty());
}

#[test]
fn test_get_current_values() {
    let harness = Harness::new();
    let mut client = harness.client();

    let all = client.get_current_values().expect("all values");
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].name, "Dx12");
    assert_eq!(all[0].hash, component_hash("Dx12"));
    assert_eq!(all[0].values.len(), 1);
    assert_eq!(all[0].values[0].value, SettingValue::Uint8(3));
    assert_eq!(all[1].name, "Pal");
    assert_eq!(all[1].values.len(), 3);
}

#[test]
fn test_old_major_version_is_rejected() {
    let harness = Harness::new();
    let mut rpc = harness.rpc();
    let err = rpc
        .call_to_vec(
            SETTINGS_SERVICE_ID,
            ddrpc::ApiVersion::new(1, 0, 0),
            ddrpc_settings::service::GET_COMPONENTS,
            &[],
        )
        .unwrap_err();
    assert_eq!(err, ResultCode::VersionMismatch);
}

#[test]
fn test_concurrent_tools() {
    const TOOLS: u32 = 4;
    const ROUNDS: u32 = 25;

    let bus = LocalBus::new();
    let server = RpcServer::create(
        ServerCreateInfo::new(Arc::new(bus.connect())).with_config(test_config()),
    )
    .expect("Failed to create server");

    let mut component = MemoryComponent::new("Shared");
    for tool in 0..TOOLS {
        component = component.with_setting(format!("Counter{}", tool), SettingValue::Uint32(0));
    }
    let component = Arc::new(component);

    let settings = SettingsService::new();
    settings
        .register_component(component.clone())
        .expect("register component");
    settings.register(&server).expect("register service");

    let handles: Vec<_> = (0..TOOLS)
        .map(|tool| {
            let rpc = RpcClient::create(
                ClientCreateInfo::new(Arc::new(bus.connect()), server.client_id())
                    .with_config(test_config()),
            )
            .expect("Failed to create client");
            thread::spawn(move || {
                let mut client = SettingsClient::new(rpc);
                let hash = setting_name_hash(&format!("Counter{}", tool));
                for round in 1..=ROUNDS {
                    client
                        .set_data("Shared", hash, SettingValue::Uint32(round))
                        .expect("set counter");
                    if fastrand::u8(..) < 64 {
                        client.query_current_values("Shared").expect("read back");
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("tool thread");
    }

    for tool in 0..TOOLS {
        assert_eq!(
            component.value(&format!("Counter{}", tool)),
            Some(SettingValue::Uint32(ROUNDS))
        );
    }
    assert_eq!(server.stats().calls_failed, 0);
}

#[test]
fn test_unregistered_service() {
    let harness = Harness::new();
    let mut client = harness.client();
    SettingsService::unregister(&harness.server);
    assert_eq!(
        client.get_components().unwrap_err(),
        ResultCode::ServiceNotRegistered
    );
}
