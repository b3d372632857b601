// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Parameter and response layouts of the settings functions.
//!
//! All integers are little-endian.
//!
//! ```text
//! component name param   : name bytes, NUL
//! settings data header   : is_encoded u8, pad[3], magic_buffer_id u32, magic_buffer_offset u32
//! setting value          : name_hash u32, type u32, size u32, value[size]
//! set data param         : name_len u32, name[name_len], setting value
//! component values       : name_len u32, name[name_len], component_hash u32, count u32, setting value*
//! ```

use crate::component::{SettingNameHash, SettingType, SettingValue};
use ddrpc::{ResultCode, RpcError, RpcResult};

/// Size of an encoded [`SettingsDataHeader`]
pub const SETTINGS_DATA_HEADER_SIZE: usize = 12;

/// Fixed part of an encoded setting value (hash, type, size)
pub const SETTING_VALUE_HEADER_SIZE: usize = 12;

fn invalid_bytes() -> RpcError {
    RpcError::Status(ResultCode::ParsingInvalidBytes)
}

/// Describes how a component's settings blob is stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsDataHeader {
    /// Blob is obfuscated with the magic buffer
    pub is_encoded: bool,
    pub magic_buffer_id: u32,
    pub magic_buffer_offset: u32,
}

impl SettingsDataHeader {
    pub fn encode_le(&self, buf: &mut [u8]) -> RpcResult<usize> {
        if buf.len() < SETTINGS_DATA_HEADER_SIZE {
            return Err(ResultCode::BufferTooSmall.into());
        }

        buf[0] = u8::from(self.is_encoded);
        buf[1..4].fill(0);
        buf[4..8].copy_from_slice(&self.magic_buffer_id.to_le_bytes());
        buf[8..12].copy_from_slice(&self.magic_buffer_offset.to_le_bytes());

        Ok(SETTINGS_DATA_HEADER_SIZE)
    }

    pub fn decode_le(src: &[u8]) -> RpcResult<(Self, usize)> {
        let mut reader = Reader::new(src);
        let is_encoded = match reader.bytes(4)?[0] {
            0 => false,
            1 => true,
            _ => return Err(invalid_bytes()),
        };
        let header = Self {
            is_encoded,
            magic_buffer_id: reader.u32()?,
            magic_buffer_offset: reader.u32()?,
        };
        Ok((header, SETTINGS_DATA_HEADER_SIZE))
    }

    pub fn to_bytes(&self) -> [u8; SETTINGS_DATA_HEADER_SIZE] {
        let mut buf = [0u8; SETTINGS_DATA_HEADER_SIZE];
        // buffer is exactly the encoded size
        let _ = self.encode_le(&mut buf);
        buf
    }
}

/// One setting as carried on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingEntry {
    pub hash: SettingNameHash,
    pub value: SettingValue,
}

/// All current values of one component.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentValues {
    pub name: String,
    pub hash: u32,
    pub values: Vec<SettingEntry>,
}

/// Parameters of `SetData`.
#[derive(Debug, Clone, PartialEq)]
pub struct SetDataRequest {
    pub component: String,
    pub hash: SettingNameHash,
    pub value: SettingValue,
}

impl SetDataRequest {
    pub fn encode(&self) -> RpcResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(4 + self.component.len() + SETTING_VALUE_HEADER_SIZE);
        put_string(&mut buf, &self.component)?;
        put_value(&mut buf, self.hash, &self.value)?;
        Ok(buf)
    }

    /// Decode a `SetData` parameter block. Trailing bytes are ignored.
    pub fn decode(src: &[u8]) -> RpcResult<Self> {
        let mut reader = Reader::new(src);
        let component = reader.string()?;
        let (hash, value) = reader.value()?;
        Ok(Self {
            component,
            hash,
            value,
        })
    }
}

/// Encode a component name parameter (NUL-terminated).
pub fn encode_component_name(name: &str) -> RpcResult<Vec<u8>> {
    if name.as_bytes().contains(&0) {
        return Err(RpcError::invalid_parameter());
    }
    let mut buf = Vec::with_capacity(name.len() + 1);
    buf.extend_from_slice(name.as_bytes());
    buf.push(0);
    Ok(buf)
}

/// Extract the component name from a NUL-terminated parameter.
///
/// Missing or empty names are invalid parameters; bytes after the first NUL
/// are ignored.
pub fn decode_component_name(params: &[u8]) -> RpcResult<&str> {
    let end = params
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(RpcError::invalid_parameter)?;
    if end == 0 {
        return Err(RpcError::invalid_parameter());
    }
    std::str::from_utf8(&params[..end]).map_err(|_| invalid_bytes())
}

/// Append one encoded setting value.
pub fn put_value(buf: &mut Vec<u8>, hash: SettingNameHash, value: &SettingValue) -> RpcResult<()> {
    let bytes = value.to_le_bytes();
    let size = u32::try_from(bytes.len()).map_err(|_| RpcError::invalid_parameter())?;
    buf.extend_from_slice(&hash.to_le_bytes());
    buf.extend_from_slice(&value.setting_type().as_u32().to_le_bytes());
    buf.extend_from_slice(&size.to_le_bytes());
    buf.extend_from_slice(&bytes);
    Ok(())
}

/// Append a length-prefixed string.
pub fn put_string(buf: &mut Vec<u8>, s: &str) -> RpcResult<()> {
    let len = u32::try_from(s.len()).map_err(|_| RpcError::invalid_parameter())?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

/// Decode a `QueryCurrentValues` response.
pub fn decode_values(src: &[u8]) -> RpcResult<Vec<SettingEntry>> {
    let mut reader = Reader::new(src);
    let mut values = Vec::new();
    while !reader.is_empty() {
        let (hash, value) = reader.value()?;
        values.push(SettingEntry { hash, value });
    }
    Ok(values)
}

/// Decode a `GetCurrentValues` response.
pub fn decode_component_values(src: &[u8]) -> RpcResult<Vec<ComponentValues>> {
    let mut reader = Reader::new(src);
    let mut components = Vec::new();
    while !reader.is_empty() {
        let name = reader.string()?;
        let hash = reader.u32()?;
        let count = reader.u32()?;
        // each value needs at least its fixed header
        if count as usize > reader.remaining() / SETTING_VALUE_HEADER_SIZE {
            return Err(invalid_bytes());
        }
        let mut values = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (hash, value) = reader.value()?;
            values.push(SettingEntry { hash, value });
        }
        components.push(ComponentValues { name, hash, values });
    }
    Ok(components)
}

/// Bounds-checked little-endian cursor.
struct Reader<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(src: &'a [u8]) -> Self {
        Self { src, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.src.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn bytes(&mut self, len: usize) -> RpcResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(invalid_bytes());
        }
        let out = &self.src[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn u32(&mut self) -> RpcResult<u32> {
        let bytes = self.bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn string(&mut self) -> RpcResult<String> {
        let len = self.u32()? as usize;
        let bytes = self.bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| invalid_bytes())
    }

    fn value(&mut self) -> RpcResult<(SettingNameHash, SettingValue)> {
        let hash = self.u32()?;
        let ty = SettingType::from_u32(self.u32()?).ok_or_else(invalid_bytes)?;
        let size = self.u32()? as usize;
        let value = SettingValue::from_le_bytes(ty, self.bytes(size)?)?;
        Ok((hash, value))
    }
}
