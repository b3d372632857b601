// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Result codes and error types for ddRpc operations.
//!
//! [`ResultCode`] is the status taxonomy that travels on the wire inside a
//! response terminator. [`RpcError`] is what the Rust API returns; every
//! error maps back to a `ResultCode` through [`RpcError::code`], so a failure
//! produced locally (validation, transport) and a failure reported by the
//! remote server can be compared the same way.

use crate::protocol::WireError;
use crate::transport::TransportError;
use thiserror::Error;

/// Result type for ddRpc operations
pub type RpcResult<T> = Result<T, RpcError>;

/// Status codes exchanged between client and server.
///
/// Codes are grouped in sections (common, parsing, net, generic, rpc,
/// settings service, settings). Unknown numeric values decode to
/// [`ResultCode::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum ResultCode {
    /// Operation completed successfully
    #[default]
    Success = 0,

    // Common
    /// Unclassified failure
    Unknown = 1,
    /// Operation is not implemented
    Unimplemented = 2,
    /// Malformed request detected before any lookup or transport attempt
    InvalidParameter = 3,
    /// Caller buffer cannot hold the result
    BufferTooSmall = 4,
    /// Requested major version differs from the registered one
    VersionMismatch = 5,
    /// Service id already registered
    AlreadyExists = 6,
    /// Referenced object is not registered
    DoesNotExist = 7,
    /// Operation is not supported by the receiver
    Unsupported = 8,
    /// Value outside the accepted range
    OutOfRange = 9,

    // Parsing
    /// Byte payload failed validation
    ParsingInvalidBytes = 100,
    /// Byte payload ended early
    ParsingUnexpectedEof = 101,

    // Net
    /// Peer did not answer in time
    NetTimedOut = 200,
    /// No usable session to the peer
    NetNotConnected = 201,
    /// Peer refused the connection
    NetConnectionRefused = 202,
    /// Session was torn down by the peer
    NetConnectionReset = 203,

    // Generic
    /// (service, function) pair already registered
    EntryExists = 300,

    // Rpc
    /// Requested service id is not registered on the server
    ServiceNotRegistered = 401,
    /// Requested function id is not registered on a known service
    FunctionNotRegistered = 402,
    /// Server refused the call parameters
    ParamRejected = 403,
    /// Parameter buffer exceeds the server limit
    ParamTooLarge = 404,
    /// Response is too large to be accepted by the client
    ResponseRejected = 405,
    /// A packet of an unexpected kind arrived mid-response
    UnexpectedResponseType = 407,
    /// Announced response size is invalid
    InvalidResponseSize = 408,
    /// A response data packet carried an invalid size
    InvalidResponseDataSize = 409,
    /// Received data does not match the announced size
    ResponseSizeMismatch = 410,
    /// Packet could not be decoded
    CorruptedPacket = 411,
    /// Handler produced response bytes but the caller supplied no writer
    UnexpectedReturnData = 412,

    // Settings service
    /// Setting name hash is not known to the component
    SettingsInvalidName = 501,
    /// Component name is not registered
    SettingsInvalidComponent = 502,
    /// Component exposes no settings data
    SettingsInvalidSettingData = 503,

    // Settings
    /// Setting value is not available
    SettingsNotFound = 601,
    /// Setting value type differs from the stored type
    SettingsTypeMismatch = 602,
}

impl ResultCode {
    /// Convert from i32
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::Success,
            1 => Self::Unknown,
            2 => Self::Unimplemented,
            3 => Self::InvalidParameter,
            4 => Self::BufferTooSmall,
            5 => Self::VersionMismatch,
            6 => Self::AlreadyExists,
            7 => Self::DoesNotExist,
            8 => Self::Unsupported,
            9 => Self::OutOfRange,
            100 => Self::ParsingInvalidBytes,
            101 => Self::ParsingUnexpectedEof,
            200 => Self::NetTimedOut,
            201 => Self::NetNotConnected,
            202 => Self::NetConnectionRefused,
            203 => Self::NetConnectionReset,
            300 => Self::EntryExists,
            401 => Self::ServiceNotRegistered,
            402 => Self::FunctionNotRegistered,
            403 => Self::ParamRejected,
            404 => Self::ParamTooLarge,
            405 => Self::ResponseRejected,
            407 => Self::UnexpectedResponseType,
            408 => Self::InvalidResponseSize,
            409 => Self::InvalidResponseDataSize,
            410 => Self::ResponseSizeMismatch,
            411 => Self::CorruptedPacket,
            412 => Self::UnexpectedReturnData,
            501 => Self::SettingsInvalidName,
            502 => Self::SettingsInvalidComponent,
            503 => Self::SettingsInvalidSettingData,
            601 => Self::SettingsNotFound,
            602 => Self::SettingsTypeMismatch,
            _ => Self::Unknown,
        }
    }

    /// Convert to i32 (`#[repr(i32)]` guarantees exact representation)
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this code indicates success
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// Turn the code into a result, `Ok(())` for [`ResultCode::Success`].
    pub fn into_result(self) -> RpcResult<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(RpcError::Status(self))
        }
    }

    /// Short human readable description
    pub fn description(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Unknown => "unknown error",
            Self::Unimplemented => "not implemented",
            Self::InvalidParameter => "invalid parameter",
            Self::BufferTooSmall => "buffer too small",
            Self::VersionMismatch => "version mismatch",
            Self::AlreadyExists => "already exists",
            Self::DoesNotExist => "does not exist",
            Self::Unsupported => "unsupported",
            Self::OutOfRange => "out of range",
            Self::ParsingInvalidBytes => "invalid bytes",
            Self::ParsingUnexpectedEof => "unexpected end of data",
            Self::NetTimedOut => "timed out",
            Self::NetNotConnected => "not connected",
            Self::NetConnectionRefused => "connection refused",
            Self::NetConnectionReset => "connection reset",
            Self::EntryExists => "entry exists",
            Self::ServiceNotRegistered => "service not registered",
            Self::FunctionNotRegistered => "function not registered",
            Self::ParamRejected => "parameters rejected",
            Self::ParamTooLarge => "parameters too large",
            Self::ResponseRejected => "response rejected",
            Self::UnexpectedResponseType => "unexpected response type",
            Self::InvalidResponseSize => "invalid response size",
            Self::InvalidResponseDataSize => "invalid response data size",
            Self::ResponseSizeMismatch => "response size mismatch",
            Self::CorruptedPacket => "corrupted packet",
            Self::UnexpectedReturnData => "unexpected return data",
            Self::SettingsInvalidName => "invalid setting name",
            Self::SettingsInvalidComponent => "invalid settings component",
            Self::SettingsInvalidSettingData => "invalid settings data",
            Self::SettingsNotFound => "setting not found",
            Self::SettingsTypeMismatch => "setting type mismatch",
        }
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_i32())
    }
}

/// Errors that can occur during ddRpc operations
#[derive(Debug, Error)]
pub enum RpcError {
    /// A protocol or application status, produced locally or reported by the peer
    #[error("rpc status: {0}")]
    Status(ResultCode),

    /// The underlying session failed
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A packet could not be encoded or decoded
    #[error("wire format error: {0}")]
    Wire(#[from] WireError),
}

impl RpcError {
    /// Shorthand for `RpcError::Status(ResultCode::InvalidParameter)`
    pub fn invalid_parameter() -> Self {
        Self::Status(ResultCode::InvalidParameter)
    }

    /// Map the error onto the wire-level status taxonomy.
    pub fn code(&self) -> ResultCode {
        match self {
            Self::Status(code) => *code,
            Self::Transport(e) => e.code(),
            Self::Wire(e) => e.code(),
        }
    }
}

impl From<ResultCode> for RpcError {
    fn from(code: ResultCode) -> Self {
        Self::Status(code)
    }
}

impl PartialEq<ResultCode> for RpcError {
    fn eq(&self, other: &ResultCode) -> bool {
        self.code() == *other
    }
}

/// Collapse a result into the code the peer would see.
pub fn result_code<T>(result: &RpcResult<T>) -> ResultCode {
    match result {
        Ok(_) => ResultCode::Success,
        Err(e) => e.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_conversion() {
        assert_eq!(ResultCode::from_i32(0), ResultCode::Success);
        assert_eq!(
            ResultCode::from_i32(412),
            ResultCode::UnexpectedReturnData
        );
        assert_eq!(ResultCode::from_i32(-7), ResultCode::Unknown);
        assert_eq!(ResultCode::from_i32(999), ResultCode::Unknown);
        assert_eq!(ResultCode::SettingsTypeMismatch.as_i32(), 602);
    }

    #[test]
    fn every_named_code_survives_i32() {
        let codes = [
            ResultCode::InvalidParameter,
            ResultCode::AlreadyExists,
            ResultCode::EntryExists,
            ResultCode::DoesNotExist,
            ResultCode::ServiceNotRegistered,
            ResultCode::FunctionNotRegistered,
            ResultCode::VersionMismatch,
            ResultCode::UnexpectedReturnData,
            ResultCode::NetTimedOut,
            ResultCode::SettingsInvalidComponent,
        ];
        for code in codes {
            assert_eq!(ResultCode::from_i32(code.as_i32()), code);
        }
    }

    #[test]
    fn into_result() {
        assert!(ResultCode::Success.into_result().is_ok());
        let err = ResultCode::VersionMismatch.into_result().unwrap_err();
        assert_eq!(err, ResultCode::VersionMismatch);
    }

    #[test]
    fn error_display() {
        let err = RpcError::Status(ResultCode::ServiceNotRegistered);
        assert!(err.to_string().contains("service not registered"));

        let err = RpcError::from(TransportError::Timeout);
        assert!(err.to_string().contains("timed out"));
        assert_eq!(err.code(), ResultCode::NetTimedOut);
    }

    #[test]
    fn result_code_of_result() {
        let ok: RpcResult<u32> = Ok(3);
        assert_eq!(result_code(&ok), ResultCode::Success);
        let err: RpcResult<u32> = Err(RpcError::invalid_parameter());
        assert_eq!(result_code(&err), ResultCode::InvalidParameter);
    }
}
