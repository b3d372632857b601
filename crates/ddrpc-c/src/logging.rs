// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Logging for the ddRpc C ABI.
//!
//! The `log` facade accepts one logger per process, so ddRpc installs a
//! forwarding logger once and swaps the `env_logger` behind it. The first
//! `dd_rpc_bus_create` installs a `RUST_LOG` driven default only when nothing
//! is configured yet; any `dd_rpc_logging_init*` call, before or after it,
//! replaces the active configuration.

use std::ffi::CStr;
use std::os::raw::c_char;
use std::sync::OnceLock;

use ddrpc::ResultCode;
use env_logger::{Builder, Env, Logger};
use log::{LevelFilter, Log, Metadata, Record};
use parking_lot::RwLock;

use crate::DDResult;

/// Module prefix shared by ddrpc, ddrpc_settings and ddrpc_c
const DDRPC_TARGET: &str = "ddrpc";

/// Log level applied to the ddRpc crates
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DDLogLevel {
    DDLogOff = 0,
    DDLogError = 1,
    DDLogWarn = 2,
    DDLogInfo = 3,
    DDLogDebug = 4,
    DDLogTrace = 5,
}

impl From<DDLogLevel> for LevelFilter {
    fn from(level: DDLogLevel) -> Self {
        match level {
            DDLogLevel::DDLogOff => LevelFilter::Off,
            DDLogLevel::DDLogError => LevelFilter::Error,
            DDLogLevel::DDLogWarn => LevelFilter::Warn,
            DDLogLevel::DDLogInfo => LevelFilter::Info,
            DDLogLevel::DDLogDebug => LevelFilter::Debug,
            DDLogLevel::DDLogTrace => LevelFilter::Trace,
        }
    }
}

/// Process-wide logger forwarding to the current `env_logger`
struct Forwarder {
    active: RwLock<Option<Logger>>,
}

impl Log for Forwarder {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.active
            .read()
            .as_ref()
            .is_some_and(|logger| logger.enabled(metadata))
    }

    fn log(&self, record: &Record<'_>) {
        if let Some(logger) = self.active.read().as_ref() {
            logger.log(record);
        }
    }

    fn flush(&self) {
        if let Some(logger) = self.active.read().as_ref() {
            logger.flush();
        }
    }
}

static FORWARDER: Forwarder = Forwarder {
    active: parking_lot::const_rwlock(None),
};

/// Whether `FORWARDER` owns the `log` facade
static FACADE: OnceLock<bool> = OnceLock::new();

enum Install {
    /// Replace whatever is configured
    Replace,
    /// Only fill an empty slot
    IfUnset,
}

fn install(logger: Logger, mode: Install) -> DDResult {
    if !*FACADE.get_or_init(|| log::set_logger(&FORWARDER).is_ok()) {
        // The host installed its own logger through the facade
        return ResultCode::AlreadyExists.as_i32();
    }

    let mut active = FORWARDER.active.write();
    if active.is_none() || matches!(mode, Install::Replace) {
        log::set_max_level(logger.filter());
        *active = Some(logger);
    }
    ResultCode::Success.as_i32()
}

fn builder() -> Builder {
    let mut builder = Builder::new();
    builder.format_timestamp_millis();
    builder
}

/// Default configuration from `RUST_LOG`, used when the host configured nothing.
pub(crate) fn init_default() {
    let logger = Builder::from_env(Env::default())
        .format_timestamp_millis()
        .build();
    install(logger, Install::IfUnset);
}

/// Log ddRpc records at `level` or above; other targets are silenced.
///
/// May be called again to change the level.
///
/// # Returns
/// `DD_RESULT_SUCCESS`, or `DD_RESULT_COMMON_ALREADY_EXISTS` if the host
/// process already installed a different `log` backend.
///
/// # Example (C)
/// ```c
/// dd_rpc_logging_init(DDLogDebug);
/// ```
#[no_mangle]
pub extern "C" fn dd_rpc_logging_init(level: DDLogLevel) -> DDResult {
    let logger = builder()
        .filter_module(DDRPC_TARGET, level.into())
        .build();
    install(logger, Install::Replace)
}

/// Configure from `RUST_LOG`; when unset, ddRpc records are logged at
/// `default_level`.
#[no_mangle]
pub extern "C" fn dd_rpc_logging_init_env(default_level: DDLogLevel) -> DDResult {
    let filter = LevelFilter::from(default_level);
    let fallback = format!("{}={}", DDRPC_TARGET, filter);
    let logger = Builder::from_env(Env::default().default_filter_or(fallback))
        .format_timestamp_millis()
        .build();
    install(logger, Install::Replace)
}

/// Configure with an `env_logger` filter string such as
/// `"ddrpc::server=trace,ddrpc_settings=info"`.
///
/// # Safety
/// `filter` must be a valid null-terminated C string or NULL.
#[no_mangle]
pub unsafe extern "C" fn dd_rpc_logging_init_with_filter(filter: *const c_char) -> DDResult {
    if filter.is_null() {
        return ResultCode::InvalidParameter.as_i32();
    }
    let Ok(filter) = CStr::from_ptr(filter).to_str() else {
        return ResultCode::InvalidParameter.as_i32();
    };

    let logger = builder().parse_filters(filter).build();
    install(logger, Install::Replace)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ddrpc_enabled(target: &str, level: log::Level) -> bool {
        log::logger().enabled(&Metadata::builder().target(target).level(level).build())
    }

    // Single test: the facade is process-global
    #[test]
    fn test_explicit_init_overrides_default() {
        init_default();

        assert_eq!(dd_rpc_logging_init(DDLogLevel::DDLogDebug), 0);
        assert_eq!(log::max_level(), LevelFilter::Debug);
        assert!(ddrpc_enabled("ddrpc::server", log::Level::Debug));
        assert!(ddrpc_enabled("ddrpc_settings::service", log::Level::Debug));
        assert!(!ddrpc_enabled("ddrpc::server", log::Level::Trace));
        assert!(!ddrpc_enabled("other_crate", log::Level::Error));

        // A later bus creation keeps the explicit configuration
        init_default();
        assert_eq!(log::max_level(), LevelFilter::Debug);

        // Reconfiguring is allowed
        assert_eq!(dd_rpc_logging_init(DDLogLevel::DDLogWarn), 0);
        assert!(!ddrpc_enabled("ddrpc::client", log::Level::Info));
        assert!(ddrpc_enabled("ddrpc::client", log::Level::Warn));

        let filter = std::ffi::CString::new("ddrpc::client=trace").expect("filter");
        assert_eq!(unsafe { dd_rpc_logging_init_with_filter(filter.as_ptr()) }, 0);
        assert!(ddrpc_enabled("ddrpc::client", log::Level::Trace));
        assert!(!ddrpc_enabled("ddrpc::server", log::Level::Error));

        assert_eq!(
            unsafe { dd_rpc_logging_init_with_filter(std::ptr::null()) },
            ResultCode::InvalidParameter.as_i32()
        );
        assert!(ddrpc_enabled("ddrpc::client", log::Level::Trace));
    }
}
