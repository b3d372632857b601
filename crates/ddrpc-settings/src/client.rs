// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed client for the settings service.

use crate::component::{SettingNameHash, SettingValue};
use crate::service::{
    ComponentList, GET_COMPONENTS, GET_CURRENT_VALUES, QUERY_COMPONENT_SETTINGS,
    QUERY_CURRENT_VALUES, QUERY_SETTINGS_DATA_HASH, SETTINGS_SERVICE_ID, SETTINGS_SERVICE_VERSION,
    SET_DATA,
};
use crate::wire::{self, ComponentValues, SetDataRequest, SettingEntry, SettingsDataHeader};
use ddrpc::{CallInfo, FunctionId, ResultCode, RpcClient, RpcError, RpcResult};

/// Wraps an [`RpcClient`] connected to a server hosting the settings service.
pub struct SettingsClient {
    client: RpcClient,
}

impl SettingsClient {
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }

    pub fn into_inner(self) -> RpcClient {
        self.client
    }

    pub fn rpc(&mut self) -> &mut RpcClient {
        &mut self.client
    }

    /// Names of the registered components
    pub fn get_components(&mut self) -> RpcResult<Vec<String>> {
        let json = self.query(GET_COMPONENTS, &[])?;
        let list: ComponentList = serde_json::from_slice(&json).map_err(|e| {
            log::debug!("[ddrpc-settings] malformed component list: {}", e);
            RpcError::Status(ResultCode::ParsingInvalidBytes)
        })?;
        Ok(list.components)
    }

    /// Settings data header and blob of `component`
    pub fn query_component_settings(
        &mut self,
        component: &str,
    ) -> RpcResult<(SettingsDataHeader, Vec<u8>)> {
        let params = wire::encode_component_name(component)?;
        let mut reply = self.query(QUERY_COMPONENT_SETTINGS, &params)?;
        let (header, used) = SettingsDataHeader::decode_le(&reply)?;
        Ok((header, reply.split_off(used)))
    }

    /// Current values of every setting of `component`
    pub fn query_current_values(&mut self, component: &str) -> RpcResult<Vec<SettingEntry>> {
        let params = wire::encode_component_name(component)?;
        let reply = self.query(QUERY_CURRENT_VALUES, &params)?;
        wire::decode_values(&reply)
    }

    pub fn query_settings_data_hash(&mut self, component: &str) -> RpcResult<u64> {
        let params = wire::encode_component_name(component)?;
        let reply = self.query(QUERY_SETTINGS_DATA_HASH, &params)?;
        let bytes: [u8; 8] = reply
            .as_slice()
            .try_into()
            .map_err(|_| RpcError::Status(ResultCode::ParsingInvalidBytes))?;
        Ok(u64::from_le_bytes(bytes))
    }

    /// Set the setting identified by `hash` in `component`.
    pub fn set_data(
        &mut self,
        component: &str,
        hash: SettingNameHash,
        value: SettingValue,
    ) -> RpcResult<()> {
        let params = SetDataRequest {
            component: component.to_string(),
            hash,
            value,
        }
        .encode()?;
        self.client.call(
            CallInfo::new(SETTINGS_SERVICE_ID, SETTINGS_SERVICE_VERSION, SET_DATA).params(&params),
        )
    }

    /// Current values of all components, sorted by component name
    pub fn get_current_values(&mut self) -> RpcResult<Vec<ComponentValues>> {
        let reply = self.query(GET_CURRENT_VALUES, &[])?;
        wire::decode_component_values(&reply)
    }

    fn query(&mut self, function: FunctionId, params: &[u8]) -> RpcResult<Vec<u8>> {
        self.client
            .call_to_vec(SETTINGS_SERVICE_ID, SETTINGS_SERVICE_VERSION, function, params)
    }
}
