// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Settings components and typed setting values.
//!
//! A component is a named group of settings owned by the application (a
//! driver layer, a tool, ...). Settings are addressed by the hash of their
//! name; values are typed and carried as little-endian bytes.

use crate::wire::SettingsDataHeader;
use ddrpc::{ResultCode, RpcError, RpcResult};
use parking_lot::RwLock;
use std::fmt;

/// Hash identifying a setting inside its component
pub type SettingNameHash = u32;

/// Hash of a component name, key of the component table.
pub fn component_hash(name: &str) -> u32 {
    crc32fast::hash(name.as_bytes())
}

/// Hash of a setting name.
pub fn setting_name_hash(name: &str) -> SettingNameHash {
    crc32fast::hash(name.as_bytes())
}

/// Type tag of a setting value (wire representation u32)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SettingType {
    Bool = 0,
    Int8 = 1,
    Uint8 = 2,
    Int16 = 3,
    Uint16 = 4,
    Int32 = 5,
    Uint32 = 6,
    Int64 = 7,
    Uint64 = 8,
    Float = 9,
    String = 10,
}

impl SettingType {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Bool),
            1 => Some(Self::Int8),
            2 => Some(Self::Uint8),
            3 => Some(Self::Int16),
            4 => Some(Self::Uint16),
            5 => Some(Self::Int32),
            6 => Some(Self::Uint32),
            7 => Some(Self::Int64),
            8 => Some(Self::Uint64),
            9 => Some(Self::Float),
            10 => Some(Self::String),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Encoded size for fixed-width types, `None` for strings
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            Self::Bool | Self::Int8 | Self::Uint8 => Some(1),
            Self::Int16 | Self::Uint16 => Some(2),
            Self::Int32 | Self::Uint32 | Self::Float => Some(4),
            Self::Int64 | Self::Uint64 => Some(8),
            Self::String => None,
        }
    }
}

/// A typed setting value.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Bool(bool),
    Int8(i8),
    Uint8(u8),
    Int16(i16),
    Uint16(u16),
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    Float(f32),
    String(String),
}

impl SettingValue {
    pub fn setting_type(&self) -> SettingType {
        match self {
            Self::Bool(_) => SettingType::Bool,
            Self::Int8(_) => SettingType::Int8,
            Self::Uint8(_) => SettingType::Uint8,
            Self::Int16(_) => SettingType::Int16,
            Self::Uint16(_) => SettingType::Uint16,
            Self::Int32(_) => SettingType::Int32,
            Self::Uint32(_) => SettingType::Uint32,
            Self::Int64(_) => SettingType::Int64,
            Self::Uint64(_) => SettingType::Uint64,
            Self::Float(_) => SettingType::Float,
            Self::String(_) => SettingType::String,
        }
    }

    /// Value bytes; strings are UTF-8 without terminator.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            Self::Bool(v) => vec![u8::from(*v)],
            Self::Int8(v) => v.to_le_bytes().to_vec(),
            Self::Uint8(v) => vec![*v],
            Self::Int16(v) => v.to_le_bytes().to_vec(),
            Self::Uint16(v) => v.to_le_bytes().to_vec(),
            Self::Int32(v) => v.to_le_bytes().to_vec(),
            Self::Uint32(v) => v.to_le_bytes().to_vec(),
            Self::Int64(v) => v.to_le_bytes().to_vec(),
            Self::Uint64(v) => v.to_le_bytes().to_vec(),
            Self::Float(v) => v.to_le_bytes().to_vec(),
            Self::String(v) => v.as_bytes().to_vec(),
        }
    }

    /// Decode value bytes of type `ty`.
    ///
    /// The size must match the type exactly; booleans must be 0 or 1.
    pub fn from_le_bytes(ty: SettingType, bytes: &[u8]) -> RpcResult<Self> {
        if let Some(size) = ty.fixed_size() {
            if bytes.len() != size {
                return Err(RpcError::Status(ResultCode::ParsingInvalidBytes));
            }
        }

        let mut raw = [0u8; 8];
        raw[..bytes.len().min(8)].copy_from_slice(&bytes[..bytes.len().min(8)]);
        let b2 = [raw[0], raw[1]];
        let b4 = [raw[0], raw[1], raw[2], raw[3]];

        let value = match ty {
            SettingType::Bool => match raw[0] {
                0 => Self::Bool(false),
                1 => Self::Bool(true),
                _ => return Err(ResultCode::ParsingInvalidBytes.into()),
            },
            SettingType::Int8 => Self::Int8(i8::from_le_bytes([raw[0]])),
            SettingType::Uint8 => Self::Uint8(raw[0]),
            SettingType::Int16 => Self::Int16(i16::from_le_bytes(b2)),
            SettingType::Uint16 => Self::Uint16(u16::from_le_bytes(b2)),
            SettingType::Int32 => Self::Int32(i32::from_le_bytes(b4)),
            SettingType::Uint32 => Self::Uint32(u32::from_le_bytes(b4)),
            SettingType::Int64 => Self::Int64(i64::from_le_bytes(raw)),
            SettingType::Uint64 => Self::Uint64(u64::from_le_bytes(raw)),
            SettingType::Float => Self::Float(f32::from_le_bytes(b4)),
            SettingType::String => Self::String(
                String::from_utf8(bytes.to_vec())
                    .map_err(|_| RpcError::Status(ResultCode::ParsingInvalidBytes))?,
            ),
        };
        Ok(value)
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int8(v) => write!(f, "{}", v),
            Self::Uint8(v) => write!(f, "{}", v),
            Self::Int16(v) => write!(f, "{}", v),
            Self::Uint16(v) => write!(f, "{}", v),
            Self::Int32(v) => write!(f, "{}", v),
            Self::Uint32(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            Self::Uint64(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{:?}", v),
        }
    }
}

/// Application-side owner of a group of settings.
///
/// Called from session workers with the component table locked; keep the
/// methods short and never call back into the settings service.
pub trait SettingsComponent: Send + Sync {
    /// Component name, unique per service
    fn name(&self) -> &str;

    /// Hashes of every setting the component declares, in a stable order
    fn settings_hashes(&self) -> Vec<SettingNameHash>;

    /// Settings description blob and its header, if the component ships one
    fn settings_data(&self) -> Option<(SettingsDataHeader, Vec<u8>)>;

    /// Hash identifying the settings blob revision
    fn settings_data_hash(&self) -> u64;

    /// Current value, `None` when the setting is declared but unavailable
    fn get_value(&self, hash: SettingNameHash) -> Option<SettingValue>;

    /// Replace a value; the type must match the current one.
    fn set_value(&self, hash: SettingNameHash, value: SettingValue) -> RpcResult<()>;
}

#[derive(Debug, Clone)]
struct MemorySetting {
    hash: SettingNameHash,
    name: String,
    value: SettingValue,
}

/// In-memory [`SettingsComponent`].
///
/// ```rust
/// use ddrpc_settings::{MemoryComponent, SettingValue};
///
/// let component = MemoryComponent::new("Pal")
///     .with_setting("TextureOpt", SettingValue::Uint32(1))
///     .with_setting("DebugName", SettingValue::String("frame".into()));
/// assert_eq!(component.value("TextureOpt"), Some(SettingValue::Uint32(1)));
/// ```
#[derive(Debug)]
pub struct MemoryComponent {
    name: String,
    settings: RwLock<Vec<MemorySetting>>,
    data: Option<(SettingsDataHeader, Vec<u8>)>,
    data_hash: u64,
}

impl MemoryComponent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: RwLock::new(Vec::new()),
            data: None,
            data_hash: 0,
        }
    }

    /// Declare a setting with its initial value. Redeclaring replaces it.
    pub fn with_setting(self, name: impl Into<String>, value: SettingValue) -> Self {
        let name = name.into();
        let hash = setting_name_hash(&name);
        {
            let mut settings = self.settings.write();
            settings.retain(|s| s.hash != hash);
            settings.push(MemorySetting { hash, name, value });
        }
        self
    }

    /// Attach the settings description blob.
    pub fn with_settings_data(mut self, header: SettingsDataHeader, blob: Vec<u8>) -> Self {
        self.data = Some((header, blob));
        self
    }

    pub fn with_data_hash(mut self, hash: u64) -> Self {
        self.data_hash = hash;
        self
    }

    /// Current value of the setting called `name`
    pub fn value(&self, name: &str) -> Option<SettingValue> {
        self.get_value(setting_name_hash(name))
    }

    /// Names of the declared settings, in declaration order
    pub fn setting_names(&self) -> Vec<String> {
        self.settings.read().iter().map(|s| s.name.clone()).collect()
    }
}

impl SettingsComponent for MemoryComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn settings_hashes(&self) -> Vec<SettingNameHash> {
        self.settings.read().iter().map(|s| s.hash).collect()
    }

    fn settings_data(&self) -> Option<(SettingsDataHeader, Vec<u8>)> {
        self.data.clone()
    }

    fn settings_data_hash(&self) -> u64 {
        self.data_hash
    }

    fn get_value(&self, hash: SettingNameHash) -> Option<SettingValue> {
        self.settings
            .read()
            .iter()
            .find(|s| s.hash == hash)
            .map(|s| s.value.clone())
    }

    fn set_value(&self, hash: SettingNameHash, value: SettingValue) -> RpcResult<()> {
        let mut settings = self.settings.write();
        let setting = settings
            .iter_mut()
            .find(|s| s.hash == hash)
            .ok_or(RpcError::Status(ResultCode::SettingsInvalidName))?;

        if setting.value.setting_type() != value.setting_type() {
            log::debug!(
                "[ddrpc-settings] {}.{}: expected {:?}, got {:?}",
                self.name,
                setting.name,
                setting.value.setting_type(),
                value.setting_type()
            );
            return Err(ResultCode::SettingsTypeMismatch.into());
        }

        log::debug!(
            "[ddrpc-settings] {}.{} = {}",
            self.name,
            setting.name,
            value
        );
        setting.value = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tags() {
        for raw in 0..=10 {
            let ty = SettingType::from_u32(raw).expect("known tag");
            assert_eq!(ty.as_u32(), raw);
        }
        assert_eq!(SettingType::from_u32(11), None);
        assert_eq!(SettingType::String.fixed_size(), None);
        assert_eq!(SettingType::Float.fixed_size(), Some(4));
    }

    #[test]
    fn value_bytes() {
        let values = [
            SettingValue::Bool(true),
            SettingValue::Int8(-3),
            SettingValue::Uint8(200),
            SettingValue::Int16(-300),
            SettingValue::Uint16(60000),
            SettingValue::Int32(-70000),
            SettingValue::Uint32(0xDEAD_BEEF),
            SettingValue::Int64(-1),
            SettingValue::Uint64(u64::MAX - 1),
            SettingValue::Float(1.25),
            SettingValue::String("héllo".into()),
        ];
        for value in values {
            let bytes = value.to_le_bytes();
            if let Some(size) = value.setting_type().fixed_size() {
                assert_eq!(bytes.len(), size);
            }
            let decoded =
                SettingValue::from_le_bytes(value.setting_type(), &bytes).expect("decode");
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn value_bytes_rejected() {
        assert_eq!(
            SettingValue::from_le_bytes(SettingType::Bool, &[2]).unwrap_err(),
            ResultCode::ParsingInvalidBytes
        );
        assert_eq!(
            SettingValue::from_le_bytes(SettingType::Uint64, &[0; 4]).unwrap_err(),
            ResultCode::ParsingInvalidBytes
        );
        assert_eq!(
            SettingValue::from_le_bytes(SettingType::String, &[0xC3]).unwrap_err(),
            ResultCode::ParsingInvalidBytes
        );
    }

    #[test]
    fn memory_component_values() {
        let component = MemoryComponent::new("Pal")
            .with_setting("Enabled", SettingValue::Bool(false))
            .with_setting("Level", SettingValue::Int32(3));

        assert_eq!(component.name(), "Pal");
        assert_eq!(component.setting_names(), ["Enabled", "Level"]);
        assert_eq!(
            component.settings_hashes(),
            [setting_name_hash("Enabled"), setting_name_hash("Level")]
        );

        component
            .set_value(setting_name_hash("Level"), SettingValue::Int32(9))
            .expect("set");
        assert_eq!(component.value("Level"), Some(SettingValue::Int32(9)));

        let err = component
            .set_value(setting_name_hash("Level"), SettingValue::Uint32(9))
            .unwrap_err();
        assert_eq!(err, ResultCode::SettingsTypeMismatch);

        let err = component
            .set_value(setting_name_hash("Missing"), SettingValue::Bool(true))
            .unwrap_err();
        assert_eq!(err, ResultCode::SettingsInvalidName);
        assert_eq!(component.value("Missing"), None);
    }

    #[test]
    fn redeclared_setting_replaces() {
        let component = MemoryComponent::new("Pal")
            .with_setting("Level", SettingValue::Int32(3))
            .with_setting("Level", SettingValue::Uint8(1));
        assert_eq!(component.settings_hashes().len(), 1);
        assert_eq!(component.value("Level"), Some(SettingValue::Uint8(1)));
    }

    #[test]
    fn hashes_are_stable() {
        assert_eq!(component_hash("Pal"), crc32fast::hash(b"Pal"));
        assert_ne!(component_hash("Pal"), component_hash("Gfx9_Pal"));
    }
}
