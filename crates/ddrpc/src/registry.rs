// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Service registry.
//!
//! Maps service ids to their metadata and (service, function) pairs to
//! handlers. One lock guards the whole table; it is held for table access
//! only, never while a handler runs, so registration can proceed while
//! sessions are dispatching calls.

use crate::config::MAX_NAME_LENGTH;
use crate::error::{ResultCode, RpcError, RpcResult};
use crate::types::{ApiVersion, FunctionId, ServiceId};
use crate::writer::ByteWriter;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Per-invocation state handed to a [`FunctionHandler`].
pub struct CallContext<'a> {
    /// Version the caller requested
    pub version: ApiVersion,
    /// Parameter bytes, empty when the caller sent none
    pub params: &'a [u8],
    /// Response sink
    pub writer: &'a mut dyn ByteWriter,
}

impl CallContext<'_> {
    /// Stream response bytes to the caller.
    pub fn write(&mut self, bytes: &[u8]) -> RpcResult<()> {
        self.writer.write_bytes(bytes)
    }

    /// Announce the total response size before writing.
    pub fn begin(&mut self, total_size: usize) -> RpcResult<()> {
        self.writer.begin(Some(total_size))
    }

    /// End the response with `result`.
    pub fn end(&mut self, result: ResultCode) -> RpcResult<()> {
        self.writer.end(result)
    }
}

/// Server-side callable servicing one function.
///
/// Returning `Err` ends the response with the error's code.
pub trait FunctionHandler: Send + Sync {
    fn call(&self, ctx: &mut CallContext<'_>) -> RpcResult<()>;
}

impl<F> FunctionHandler for F
where
    F: Fn(&mut CallContext<'_>) -> RpcResult<()> + Send + Sync,
{
    fn call(&self, ctx: &mut CallContext<'_>) -> RpcResult<()> {
        self(ctx)
    }
}

/// Metadata describing a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub id: ServiceId,
    pub version: ApiVersion,
    pub name: String,
    pub description: String,
}

impl ServiceInfo {
    pub fn new(id: ServiceId, name: impl Into<String>, version: ApiVersion) -> Self {
        Self {
            id,
            version,
            name: name.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Describes one function to register.
#[derive(Clone)]
pub struct FunctionInfo {
    pub service_id: ServiceId,
    pub id: FunctionId,
    pub name: String,
    pub description: String,
    pub handler: Option<Arc<dyn FunctionHandler>>,
}

impl FunctionInfo {
    /// Describe a function served by a closure or plain fn.
    pub fn new<F>(service_id: ServiceId, id: FunctionId, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut CallContext<'_>) -> RpcResult<()> + Send + Sync + 'static,
    {
        Self::with_handler(service_id, id, name, Arc::new(handler))
    }

    /// Describe a function served by a shared handler object.
    pub fn with_handler(
        service_id: ServiceId,
        id: FunctionId,
        name: impl Into<String>,
        handler: Arc<dyn FunctionHandler>,
    ) -> Self {
        Self {
            service_id,
            id,
            name: name.into(),
            description: String::new(),
            handler: Some(handler),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl fmt::Debug for FunctionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionInfo")
            .field("service_id", &self.service_id)
            .field("id", &self.id)
            .field("name", &self.name)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

/// A function resolved for dispatch.
#[derive(Clone)]
pub struct ResolvedFunction {
    pub handler: Arc<dyn FunctionHandler>,
    /// Version the service was registered with
    pub version: ApiVersion,
}

struct FunctionEntry {
    name: String,
    handler: Arc<dyn FunctionHandler>,
}

struct ServiceEntry {
    info: ServiceInfo,
    functions: HashMap<FunctionId, FunctionEntry>,
}

/// Table of registered services and function handlers.
#[derive(Default)]
pub struct ServiceRegistry {
    services: Mutex<HashMap<ServiceId, ServiceEntry>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service.
    ///
    /// # Errors
    /// `InvalidParameter` for a zero id or a bad name, `AlreadyExists` when
    /// the id is taken.
    pub fn register_service(&self, info: ServiceInfo) -> RpcResult<()> {
        if info.id == 0 || !valid_name(&info.name) || !info.version.is_valid() {
            return Err(RpcError::invalid_parameter());
        }

        let mut services = self.services.lock();
        if services.contains_key(&info.id) {
            return Err(ResultCode::AlreadyExists.into());
        }

        log::debug!(
            "[registry] service {} '{}' v{} registered",
            info.id,
            info.name,
            info.version
        );
        services.insert(
            info.id,
            ServiceEntry {
                info,
                functions: HashMap::new(),
            },
        );
        Ok(())
    }

    /// Remove a service and all of its functions. Unknown ids are ignored.
    pub fn unregister_service(&self, id: ServiceId) {
        if let Some(entry) = self.services.lock().remove(&id) {
            log::debug!(
                "[registry] service {} '{}' unregistered ({} functions)",
                id,
                entry.info.name,
                entry.functions.len()
            );
        }
    }

    /// Register a function on an already registered service.
    ///
    /// # Errors
    /// `InvalidParameter` for zero ids, an invalid name or a missing handler,
    /// `DoesNotExist` when the service is unknown, `EntryExists` when the
    /// function is already registered.
    pub fn register_function(&self, info: FunctionInfo) -> RpcResult<()> {
        let handler = match info.handler {
            Some(h)
                if info.service_id != 0
                    && info.id != 0
                    && valid_name(&info.name)
                    && !info.description.is_empty() =>
            {
                h
            }
            _ => return Err(RpcError::invalid_parameter()),
        };

        let mut services = self.services.lock();
        let service = services
            .get_mut(&info.service_id)
            .ok_or(ResultCode::DoesNotExist)?;
        if service.functions.contains_key(&info.id) {
            return Err(ResultCode::EntryExists.into());
        }

        log::debug!(
            "[registry] function {}:{} '{}' registered",
            info.service_id,
            info.id,
            info.name
        );
        service.functions.insert(
            info.id,
            FunctionEntry {
                name: info.name,
                handler,
            },
        );
        Ok(())
    }

    /// Remove a function. Unknown ids are ignored.
    pub fn unregister_function(&self, service_id: ServiceId, function_id: FunctionId) {
        let mut services = self.services.lock();
        if let Some(service) = services.get_mut(&service_id) {
            if let Some(entry) = service.functions.remove(&function_id) {
                log::debug!(
                    "[registry] function {}:{} '{}' unregistered",
                    service_id,
                    function_id,
                    entry.name
                );
            }
        }
    }

    /// Resolve a call.
    ///
    /// # Errors
    /// `ServiceNotRegistered`, `FunctionNotRegistered` or `VersionMismatch`.
    pub fn lookup(
        &self,
        service_id: ServiceId,
        function_id: FunctionId,
        requested: ApiVersion,
    ) -> RpcResult<ResolvedFunction> {
        let services = self.services.lock();
        let service = services
            .get(&service_id)
            .ok_or(ResultCode::ServiceNotRegistered)?;
        let function = service
            .functions
            .get(&function_id)
            .ok_or(ResultCode::FunctionNotRegistered)?;

        if !requested.is_major_compatible(&service.info.version) {
            return Err(ResultCode::VersionMismatch.into());
        }

        Ok(ResolvedFunction {
            handler: Arc::clone(&function.handler),
            version: service.info.version,
        })
    }

    /// Snapshot of registered services, ordered by id.
    pub fn services(&self) -> Vec<ServiceInfo> {
        let mut list: Vec<_> = self
            .services
            .lock()
            .values()
            .map(|entry| entry.info.clone())
            .collect();
        list.sort_by_key(|info| info.id);
        list
    }

    /// Function ids registered on `service_id`, ordered.
    pub fn functions(&self, service_id: ServiceId) -> RpcResult<Vec<FunctionId>> {
        let services = self.services.lock();
        let service = services
            .get(&service_id)
            .ok_or(ResultCode::DoesNotExist)?;
        let mut ids: Vec<_> = service.functions.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= MAX_NAME_LENGTH
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::BufferWriter;

    const SERVICE: ServiceId = 1337;
    const VERSION: ApiVersion = ApiVersion::new(1, 1, 1);

    fn noop(_ctx: &mut CallContext<'_>) -> RpcResult<()> {
        Ok(())
    }

    fn function(service: ServiceId, id: FunctionId, name: &str) -> FunctionInfo {
        FunctionInfo::new(service, id, name, noop).with_description("does nothing")
    }

    fn registry_with_service() -> ServiceRegistry {
        let registry = ServiceRegistry::new();
        registry
            .register_service(ServiceInfo::new(SERVICE, "Test", VERSION))
            .unwrap();
        registry
    }

    #[test]
    fn service_validation() {
        let registry = ServiceRegistry::new();

        let zero = ServiceInfo::new(0, "Zero", VERSION);
        assert_eq!(
            registry.register_service(zero).unwrap_err(),
            ResultCode::InvalidParameter
        );

        let unnamed = ServiceInfo::new(1, "", VERSION);
        assert_eq!(
            registry.register_service(unnamed).unwrap_err(),
            ResultCode::InvalidParameter
        );

        let long = ServiceInfo::new(1, "x".repeat(MAX_NAME_LENGTH + 1), VERSION);
        assert_eq!(
            registry.register_service(long).unwrap_err(),
            ResultCode::InvalidParameter
        );

        let unversioned = ServiceInfo::new(1, "Unversioned", ApiVersion::default());
        assert_eq!(
            registry.register_service(unversioned).unwrap_err(),
            ResultCode::InvalidParameter
        );

        let edge = ServiceInfo::new(1, "x".repeat(MAX_NAME_LENGTH), VERSION);
        assert!(registry.register_service(edge).is_ok());
    }

    #[test]
    fn duplicate_service() {
        let registry = registry_with_service();
        let again = ServiceInfo::new(SERVICE, "Other", VERSION);
        assert_eq!(
            registry.register_service(again.clone()).unwrap_err(),
            ResultCode::AlreadyExists
        );

        registry.unregister_service(SERVICE);
        registry.unregister_service(SERVICE);
        assert!(registry.register_service(again).is_ok());
    }

    #[test]
    fn function_validation() {
        let registry = registry_with_service();

        let missing_handler = FunctionInfo {
            handler: None,
            ..function(SERVICE, 64, "F")
        };
        assert_eq!(
            registry.register_function(missing_handler).unwrap_err(),
            ResultCode::InvalidParameter
        );
        assert_eq!(
            registry
                .register_function(function(SERVICE, 0, "F"))
                .unwrap_err(),
            ResultCode::InvalidParameter
        );
        assert_eq!(
            registry
                .register_function(function(SERVICE, 64, ""))
                .unwrap_err(),
            ResultCode::InvalidParameter
        );
        assert_eq!(
            registry
                .register_function(FunctionInfo::new(SERVICE, 64, "F", noop))
                .unwrap_err(),
            ResultCode::InvalidParameter
        );
        assert_eq!(
            registry
                .register_function(function(SERVICE + 1, 64, "F"))
                .unwrap_err(),
            ResultCode::DoesNotExist
        );
        assert!(registry.functions(SERVICE).unwrap().is_empty());
    }

    #[test]
    fn duplicate_function() {
        let registry = registry_with_service();
        let info = function(SERVICE, 64, "F");

        registry.register_function(info.clone()).unwrap();
        assert_eq!(
            registry.register_function(info.clone()).unwrap_err(),
            ResultCode::EntryExists
        );

        registry.unregister_function(SERVICE, 64);
        registry.unregister_function(SERVICE, 64);
        assert!(registry.register_function(info).is_ok());
        assert_eq!(registry.functions(SERVICE).unwrap(), vec![64]);
    }

    #[test]
    fn unregister_service_drops_functions() {
        let registry = registry_with_service();
        registry
            .register_function(function(SERVICE, 64, "F"))
            .unwrap();

        registry.unregister_service(SERVICE);
        registry
            .register_service(ServiceInfo::new(SERVICE, "Test", VERSION))
            .unwrap();
        assert!(registry.functions(SERVICE).unwrap().is_empty());
    }

    #[test]
    fn lookup_outcomes() {
        let registry = registry_with_service();
        registry
            .register_function(function(SERVICE, 64, "F"))
            .unwrap();

        assert_eq!(
            registry.lookup(SERVICE + 1, 64, VERSION).err().unwrap(),
            ResultCode::ServiceNotRegistered
        );
        assert_eq!(
            registry.lookup(SERVICE, 65, VERSION).err().unwrap(),
            ResultCode::FunctionNotRegistered
        );
        assert_eq!(
            registry
                .lookup(SERVICE, 64, ApiVersion::new(2, 1, 1))
                .err()
                .unwrap(),
            ResultCode::VersionMismatch
        );

        let resolved = registry.lookup(SERVICE, 64, ApiVersion::new(1, 0, 9)).unwrap();
        assert_eq!(resolved.version, VERSION);
    }

    #[test]
    fn resolved_handler_outlives_unregister() {
        let registry = registry_with_service();
        registry
            .register_function(FunctionInfo::new(SERVICE, 64, "F", |ctx| ctx.write(&[7])).with_description("writes one byte"))
            .unwrap();

        let resolved = registry.lookup(SERVICE, 64, VERSION).unwrap();
        registry.unregister_service(SERVICE);

        let mut writer = BufferWriter::new();
        let mut ctx = CallContext {
            version: VERSION,
            params: &[],
            writer: &mut writer,
        };
        resolved.handler.call(&mut ctx).unwrap();
        assert_eq!(writer.bytes(), &[7]);
    }

    #[test]
    fn services_are_listed_in_order() {
        let registry = ServiceRegistry::new();
        for id in [30, 10, 20] {
            registry
                .register_service(ServiceInfo::new(id, format!("svc{id}"), VERSION))
                .unwrap();
        }
        let ids: Vec<_> = registry.services().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }
}
