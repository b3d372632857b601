// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ddRpc configuration - single source of truth for protocol constants.
//!
//! - **Static**: compile-time constants (sentinels, payload limits, defaults)
//! - **Dynamic**: [`RpcConfig`], built programmatically or loaded from TOML
//!
//! ```ignore
//! use ddrpc::config::RpcConfig;
//!
//! let config = RpcConfig::from_file("ddrpc.toml")?;
//! assert!(config.protocol_ids.contains(64));
//! ```
//!
//! All durations in the file format are expressed in milliseconds.

use crate::types::{ClientId, ProtocolId};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Client id that never names a live endpoint
pub const INVALID_CLIENT_ID: ClientId = 0;

/// Protocol id that callers pass to request the default RPC protocol
pub const INVALID_PROTOCOL_ID: ProtocolId = 0;

/// Protocol id used when the caller does not pick one
pub const DEFAULT_RPC_PROTOCOL_ID: ProtocolId = 32;

/// Connect timeout used when the caller passes zero
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_millis(1000);

/// Total time a client waits for a complete response
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(5000);

/// Time a single send may block
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(1000);

/// Receive poll interval; a timeout at this granularity is not an error
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Time `destroy` waits for in-flight handlers before closing sessions
pub const DEFAULT_DESTROY_GRACE_PERIOD: Duration = Duration::from_millis(2000);

/// Largest message accepted by the fabric (1408-byte message minus a 24-byte header)
pub const MAX_PAYLOAD_SIZE: usize = 1408 - 24;

/// Maximum length of a service or function name, in bytes
pub const MAX_NAME_LENGTH: usize = 128;

/// Parameter buffers above this size are refused by the server
pub const DEFAULT_MAX_PARAM_SIZE: u64 = 16 * 1024 * 1024;

/// Default maximum number of not yet accepted connections per listener
pub const DEFAULT_MAX_PENDING_CONNECTIONS: usize = 8;

/// Default maximum number of concurrently served sessions per server
pub const DEFAULT_MAX_SESSIONS: usize = 64;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Inclusive range of protocol ids a client or server may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolIdRange {
    pub min: ProtocolId,
    pub max: ProtocolId,
}

impl ProtocolIdRange {
    /// Check whether `id` falls inside the range.
    pub fn contains(&self, id: ProtocolId) -> bool {
        id != INVALID_PROTOCOL_ID && (self.min..=self.max).contains(&id)
    }
}

impl Default for ProtocolIdRange {
    fn default() -> Self {
        Self { min: 1, max: 255 }
    }
}

/// Runtime configuration shared by [`crate::RpcServer`] and [`crate::RpcClient`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Protocol ids accepted by `create`
    pub protocol_ids: ProtocolIdRange,

    /// Receive poll interval (ms)
    pub poll_interval_ms: u64,

    /// Time a client waits for a complete response (ms)
    pub call_timeout_ms: u64,

    /// Time a single send may block (ms)
    pub send_timeout_ms: u64,

    /// Largest packet handed to the transport
    pub max_payload_size: usize,

    /// Largest parameter buffer a server accepts
    pub max_param_size: u64,

    /// Sessions served concurrently by one server
    pub max_sessions: usize,

    /// Connections queued before being accepted
    pub max_pending_connections: usize,

    /// Time `destroy` waits for in-flight handlers (ms)
    pub destroy_grace_period_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            protocol_ids: ProtocolIdRange::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            call_timeout_ms: DEFAULT_CALL_TIMEOUT.as_millis() as u64,
            send_timeout_ms: DEFAULT_SEND_TIMEOUT.as_millis() as u64,
            max_payload_size: MAX_PAYLOAD_SIZE,
            max_param_size: DEFAULT_MAX_PARAM_SIZE,
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_pending_connections: DEFAULT_MAX_PENDING_CONNECTIONS,
            destroy_grace_period_ms: DEFAULT_DESTROY_GRACE_PERIOD.as_millis() as u64,
        }
    }
}

impl RpcConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol_ids.min == INVALID_PROTOCOL_ID {
            return Err(ConfigError::Invalid(
                "protocol id range must not include 0".into(),
            ));
        }
        if self.protocol_ids.min > self.protocol_ids.max {
            return Err(ConfigError::Invalid(format!(
                "empty protocol id range {}..={}",
                self.protocol_ids.min, self.protocol_ids.max
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be > 0".into()));
        }
        if self.call_timeout_ms < self.poll_interval_ms {
            return Err(ConfigError::Invalid(
                "call_timeout_ms must be >= poll_interval_ms".into(),
            ));
        }
        // A data packet must carry at least one byte after its header
        if self.max_payload_size <= crate::protocol::DATA_HEADER_SIZE
            || self.max_payload_size < crate::protocol::REQUEST_HEADER_SIZE
        {
            return Err(ConfigError::Invalid(format!(
                "max_payload_size {} cannot hold a packet header",
                self.max_payload_size
            )));
        }
        if self.max_sessions == 0 {
            return Err(ConfigError::Invalid("max_sessions must be > 0".into()));
        }
        if self.max_pending_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_pending_connections must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn destroy_grace_period(&self) -> Duration {
        Duration::from_millis(self.destroy_grace_period_ms)
    }

    /// Resolve an optional protocol id against the configured range.
    ///
    /// `None` (or the invalid sentinel) selects [`DEFAULT_RPC_PROTOCOL_ID`].
    pub fn resolve_protocol_id(&self, requested: Option<ProtocolId>) -> Option<ProtocolId> {
        match requested {
            None | Some(INVALID_PROTOCOL_ID) => Some(DEFAULT_RPC_PROTOCOL_ID),
            Some(id) if self.protocol_ids.contains(id) => Some(id),
            Some(_) => None,
        }
    }
}
