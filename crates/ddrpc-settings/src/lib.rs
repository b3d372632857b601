// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # ddrpc-settings - settings service over ddRpc
//!
//! Applications register [`SettingsComponent`]s with a [`SettingsService`];
//! the service is hosted by an [`ddrpc::RpcServer`] and lets tools list
//! components, read their settings blobs and current values, and change
//! individual settings while the application runs.
//!
//! ## Functions
//!
//! | Id | Function              | Params              | Response                    |
//! |----|-----------------------|---------------------|-----------------------------|
//! | 1  | GetComponents         | none                | `{"Components": [...]}`     |
//! | 2  | QueryComponentSettings| component name      | data header + blob          |
//! | 3  | QueryCurrentValues    | component name      | setting values              |
//! | 4  | QuerySettingsDataHash | component name      | u64                         |
//! | 5  | SetData               | [`SetDataRequest`]  | none                        |
//! | 6  | GetCurrentValues      | none                | [`ComponentValues`] stream  |
//!
//! See [`wire`] for the byte layouts.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ddrpc::{ClientCreateInfo, LocalBus, RpcClient, RpcResult, RpcServer, ServerCreateInfo};
//! use ddrpc_settings::{MemoryComponent, SettingValue, SettingsClient, SettingsService};
//! use std::sync::Arc;
//!
//! fn main() -> RpcResult<()> {
//!     let bus = LocalBus::new();
//!     let server = RpcServer::create(ServerCreateInfo::new(Arc::new(bus.connect())))?;
//!
//!     let settings = SettingsService::new();
//!     let pal = Arc::new(MemoryComponent::new("Pal").with_setting("Vsync", SettingValue::Bool(true)));
//!     settings.register_component(pal.clone())?;
//!     settings.register(&server)?;
//!
//!     let rpc = RpcClient::create(ClientCreateInfo::new(Arc::new(bus.connect()), server.client_id()))?;
//!     let mut client = SettingsClient::new(rpc);
//!     assert_eq!(client.get_components()?, ["Pal"]);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod component;
pub mod service;
pub mod wire;

pub use client::SettingsClient;
pub use component::{
    component_hash, setting_name_hash, MemoryComponent, SettingNameHash, SettingType,
    SettingValue, SettingsComponent,
};
pub use service::{ComponentList, SettingsService, SETTINGS_SERVICE_ID, SETTINGS_SERVICE_VERSION};
pub use wire::{ComponentValues, SetDataRequest, SettingEntry, SettingsDataHeader};
