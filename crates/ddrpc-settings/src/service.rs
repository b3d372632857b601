// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The settings RPC service.
//!
//! Components live in their own table, guarded by a lock independent of the
//! RPC registry. Every function handler takes that lock for the duration of
//! one call, so concurrent tools observe each `SetData` atomically.

use crate::component::{component_hash, SettingsComponent};
use crate::wire::{self, SetDataRequest, SETTINGS_DATA_HEADER_SIZE};
use ddrpc::config::MAX_NAME_LENGTH;
use ddrpc::{
    ApiVersion, CallContext, FunctionId, FunctionInfo, ResultCode, RpcError, RpcResult, RpcServer,
    ServiceId, ServiceInfo,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Service id of the settings service ("SETS")
pub const SETTINGS_SERVICE_ID: ServiceId = 0x5345_5453;
pub const SETTINGS_SERVICE_VERSION: ApiVersion = ApiVersion::new(2, 0, 0);
pub const SETTINGS_SERVICE_NAME: &str = "Settings";

pub const GET_COMPONENTS: FunctionId = 1;
pub const QUERY_COMPONENT_SETTINGS: FunctionId = 2;
pub const QUERY_CURRENT_VALUES: FunctionId = 3;
pub const QUERY_SETTINGS_DATA_HASH: FunctionId = 4;
pub const SET_DATA: FunctionId = 5;
pub const GET_CURRENT_VALUES: FunctionId = 6;

/// JSON document returned by `GetComponents`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentList {
    #[serde(rename = "Components")]
    pub components: Vec<String>,
}

type ComponentTable = HashMap<u32, Arc<dyn SettingsComponent>>;

/// Exposes registered settings components to remote tools.
pub struct SettingsService {
    components: Mutex<ComponentTable>,
}

impl SettingsService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            components: Mutex::new(HashMap::new()),
        })
    }

    /// Add a component. Names must be non-empty, at most
    /// [`MAX_NAME_LENGTH`] bytes and unique.
    pub fn register_component(&self, component: Arc<dyn SettingsComponent>) -> RpcResult<()> {
        let name = component.name();
        if name.is_empty() || name.len() > MAX_NAME_LENGTH || name.as_bytes().contains(&0) {
            return Err(RpcError::invalid_parameter());
        }

        let hash = component_hash(name);
        let mut components = self.components.lock();
        if components.contains_key(&hash) {
            log::warn!(
                "[ddrpc-settings] component '{}' already registered (hash {:#010x})",
                name,
                hash
            );
            return Err(ResultCode::AlreadyExists.into());
        }

        log::debug!("[ddrpc-settings] registered component '{}'", name);
        components.insert(hash, component);
        Ok(())
    }

    /// Remove a component; unknown names are ignored.
    pub fn unregister_component(&self, name: &str) {
        if self.components.lock().remove(&component_hash(name)).is_some() {
            log::debug!("[ddrpc-settings] unregistered component '{}'", name);
        }
    }

    /// Registered component names, sorted
    pub fn component_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .components
            .lock()
            .values()
            .map(|c| c.name().to_string())
            .collect();
        names.sort();
        names
    }

    /// Register the service and its functions on `server`.
    pub fn register(self: &Arc<Self>, server: &RpcServer) -> RpcResult<()> {
        server.register_service(
            ServiceInfo::new(
                SETTINGS_SERVICE_ID,
                SETTINGS_SERVICE_NAME,
                SETTINGS_SERVICE_VERSION,
            )
            .with_description("Query and modify driver settings components"),
        )?;

        let functions = [
            self.function(GET_COMPONENTS, "GetComponents", Self::get_components)
                .with_description("List registered component names as JSON"),
            self.function(
                QUERY_COMPONENT_SETTINGS,
                "QueryComponentSettings",
                Self::query_component_settings,
            )
            .with_description("Settings data header and blob of a component"),
            self.function(
                QUERY_CURRENT_VALUES,
                "QueryCurrentValues",
                Self::query_current_values,
            )
            .with_description("Current values of every setting of a component"),
            self.function(
                QUERY_SETTINGS_DATA_HASH,
                "QuerySettingsDataHash",
                Self::query_settings_data_hash,
            )
            .with_description("Hash of a component's settings blob"),
            self.function(SET_DATA, "SetData", Self::set_data)
                .with_description("Set one setting value"),
            self.function(
                GET_CURRENT_VALUES,
                "GetCurrentValues",
                Self::get_current_values,
            )
            .with_description("Current values of all components"),
        ];

        for info in functions {
            if let Err(e) = server.register_function(info) {
                server.unregister_service(SETTINGS_SERVICE_ID);
                return Err(e);
            }
        }

        log::info!(
            "[ddrpc-settings] service {:#x} v{} registered",
            SETTINGS_SERVICE_ID,
            SETTINGS_SERVICE_VERSION
        );
        Ok(())
    }

    /// Remove the service (and its functions) from `server`.
    pub fn unregister(server: &RpcServer) {
        server.unregister_service(SETTINGS_SERVICE_ID);
    }

    fn function(
        self: &Arc<Self>,
        id: FunctionId,
        name: &str,
        method: fn(&Self, &mut CallContext<'_>) -> RpcResult<()>,
    ) -> FunctionInfo {
        let service = Arc::clone(self);
        FunctionInfo::new(SETTINGS_SERVICE_ID, id, name, move |ctx| method(&service, ctx))
    }

    fn find(
        components: &ComponentTable,
        name: &str,
    ) -> RpcResult<Arc<dyn SettingsComponent>> {
        components
            .get(&component_hash(name))
            .cloned()
            .ok_or(RpcError::Status(ResultCode::SettingsInvalidComponent))
    }

    fn get_components(&self, ctx: &mut CallContext<'_>) -> RpcResult<()> {
        let list = ComponentList {
            components: self.component_names(),
        };
        let json = serde_json::to_vec(&list).map_err(|e| {
            log::error!("[ddrpc-settings] component list serialization failed: {}", e);
            RpcError::Status(ResultCode::Unknown)
        })?;
        ctx.begin(json.len())?;
        ctx.write(&json)
    }

    fn query_component_settings(&self, ctx: &mut CallContext<'_>) -> RpcResult<()> {
        let name = wire::decode_component_name(ctx.params)?;
        let components = self.components.lock();
        let component = Self::find(&components, name)?;

        let (header, blob) = component
            .settings_data()
            .ok_or(RpcError::Status(ResultCode::SettingsInvalidSettingData))?;

        ctx.begin(SETTINGS_DATA_HEADER_SIZE + blob.len())?;
        ctx.write(&header.to_bytes())?;
        ctx.write(&blob)
    }

    fn query_current_values(&self, ctx: &mut CallContext<'_>) -> RpcResult<()> {
        let name = wire::decode_component_name(ctx.params)?;
        let components = self.components.lock();
        let component = Self::find(&components, name)?;

        let (_, buf) = encode_values(component.as_ref())?;
        ctx.write(&buf)
    }

    fn query_settings_data_hash(&self, ctx: &mut CallContext<'_>) -> RpcResult<()> {
        let name = wire::decode_component_name(ctx.params)?;
        let components = self.components.lock();
        let component = Self::find(&components, name)?;

        ctx.write(&component.settings_data_hash().to_le_bytes())
    }

    fn set_data(&self, ctx: &mut CallContext<'_>) -> RpcResult<()> {
        let request = SetDataRequest::decode(ctx.params)?;
        if request.component.is_empty() {
            return Err(RpcError::invalid_parameter());
        }

        let components = self.components.lock();
        let component = Self::find(&components, &request.component)?;

        if !component.settings_hashes().contains(&request.hash) {
            log::debug!(
                "[ddrpc-settings] {}: unknown setting {:#010x}",
                request.component,
                request.hash
            );
            return Err(ResultCode::SettingsInvalidName.into());
        }

        component.set_value(request.hash, request.value)
    }

    fn get_current_values(&self, ctx: &mut CallContext<'_>) -> RpcResult<()> {
        let components = self.components.lock();
        let mut ordered: Vec<(&u32, &Arc<dyn SettingsComponent>)> = components.iter().collect();
        ordered.sort_by(|a, b| a.1.name().cmp(b.1.name()));

        let mut buf = Vec::new();
        for (hash, component) in ordered {
            let (count, values) = encode_values(component.as_ref())?;
            if count == 0 {
                continue;
            }
            wire::put_string(&mut buf, component.name())?;
            buf.extend_from_slice(&hash.to_le_bytes());
            buf.extend_from_slice(&count.to_le_bytes());
            buf.extend_from_slice(&values);
        }

        ctx.begin(buf.len())?;
        ctx.write(&buf)
    }
}

/// Encode every available value of `component`, returning the count.
///
/// `GetCurrentValues` leaves out components for which this is zero.
///
/// Declared settings the component cannot report are skipped.
fn encode_values(component: &dyn SettingsComponent) -> RpcResult<(u32, Vec<u8>)> {
    let mut buf = Vec::new();
    let mut count = 0u32;
    for hash in component.settings_hashes() {
        match component.get_value(hash) {
            Some(value) => {
                wire::put_value(&mut buf, hash, &value)?;
                count += 1;
            }
            None => log::debug!(
                "[ddrpc-settings] {}: no value for setting {:#010x}",
                component.name(),
                hash
            ),
        }
    }
    Ok((count, buf))
}
