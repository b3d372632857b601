// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Core identifier and version types shared by client, server and registry.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an endpoint on the message fabric
pub type ClientId = u16;

/// Identifier of a protocol multiplexed over one endpoint
pub type ProtocolId = u8;

/// Opaque identifier for an RPC service
pub type ServiceId = u32;

/// Opaque identifier for an RPC function exposed by a service
pub type FunctionId = u32;

/// Semantic version attached to every service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ApiVersion {
    /// Bumped on incompatible changes
    pub major: u32,
    /// Bumped on backwards compatible changes
    pub minor: u32,
    /// Bumped on internal changes
    pub patch: u32,
}

impl ApiVersion {
    /// Create a new version
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// A zero-initialized version is considered invalid.
    pub fn is_valid(&self) -> bool {
        self.major != 0 || self.minor != 0 || self.patch != 0
    }

    /// Check whether a caller requesting `self` can be served by `actual`.
    ///
    /// Only the major component must match. While both majors are 0 the API is
    /// in initial development and the minor component acts as the major one.
    pub fn is_major_compatible(&self, actual: &ApiVersion) -> bool {
        if !self.is_valid() || !actual.is_valid() {
            return false;
        }

        if self.major == 0 && actual.major == 0 {
            self.minor == actual.minor
        } else {
            self.major == actual.major
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
