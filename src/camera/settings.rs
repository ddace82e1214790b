use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigFailure;
use crate::sdk::{NodeKind, NodeMap};

/// Value written to a node of the camera's configuration tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingValue {
    Enum(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Enum(value) => f.write_str(value),
            SettingValue::Int(value) => write!(f, "{}", value),
            SettingValue::Float(value) => write!(f, "{}", value),
            SettingValue::Bool(value) => f.write_str(bool_string(*value)),
        }
    }
}

/// A named setting, e.g. `{ name = "AcquisitionMode", enum = "Continuous" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSetting {
    pub name: String,
    #[serde(flatten)]
    pub value: SettingValue,
}

impl CameraSetting {
    pub fn enumeration(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: SettingValue::Enum(value.to_string()),
        }
    }

    pub fn int(name: &str, value: i64) -> Self {
        Self {
            name: name.to_string(),
            value: SettingValue::Int(value),
        }
    }

    pub fn float(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value: SettingValue::Float(value),
        }
    }

    pub fn bool(name: &str, value: bool) -> Self {
        Self {
            name: name.to_string(),
            value: SettingValue::Bool(value),
        }
    }
}

impl fmt::Display for CameraSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Parses `kind:Name=value`, e.g. `float:ExposureTime=5000`.
impl FromStr for CameraSetting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, rest) = s
            .split_once(':')
            .ok_or_else(|| format!("expected kind:Name=value, got {:?}", s))?;
        let (name, value) = rest
            .split_once('=')
            .ok_or_else(|| format!("expected kind:Name=value, got {:?}", s))?;
        if name.is_empty() {
            return Err(format!("missing setting name in {:?}", s));
        }

        let value = match kind {
            "enum" => SettingValue::Enum(value.to_string()),
            "int" => SettingValue::Int(
                value
                    .parse()
                    .map_err(|e| format!("invalid integer {:?}: {}", value, e))?,
            ),
            "float" => SettingValue::Float(
                value
                    .parse()
                    .map_err(|e| format!("invalid float {:?}: {}", value, e))?,
            ),
            "bool" => SettingValue::Bool(match value.to_ascii_lowercase().as_str() {
                "true" | "1" | "on" => true,
                "false" | "0" | "off" => false,
                _ => return Err(format!("invalid boolean {:?}", value)),
            }),
            other => return Err(format!("unknown setting kind {:?}", other)),
        };

        Ok(Self {
            name: name.to_string(),
            value,
        })
    }
}

/// The node tree takes booleans as these exact strings, not as native values.
pub(crate) fn bool_string(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

fn writable_node<M: NodeMap>(map: &M, name: &str, kind: NodeKind) -> Result<(), ConfigFailure> {
    let info = map
        .node(name)
        .filter(|info| info.access.is_available())
        .ok_or(ConfigFailure::NodeUnavailable)?;
    if info.kind != kind {
        return Err(ConfigFailure::WrongKind {
            expected: kind,
            found: info.kind,
        });
    }
    if !info.access.is_writable() {
        return Err(ConfigFailure::NotWritable);
    }
    Ok(())
}

pub(crate) fn write_enum<M: NodeMap>(map: &mut M, name: &str, value: &str) -> Result<(), ConfigFailure> {
    writable_node(map, name, NodeKind::Enumeration)?;

    let entry = map
        .enum_entry(name, value)
        .filter(|entry| entry.access.is_available())
        .ok_or(ConfigFailure::EntryUnavailable)?;
    if !entry.access.is_readable() {
        return Err(ConfigFailure::EntryNotReadable);
    }

    map.set_enum_int_value(name, entry.value)?;
    Ok(())
}

pub(crate) fn write_int<M: NodeMap>(map: &mut M, name: &str, value: i64) -> Result<(), ConfigFailure> {
    writable_node(map, name, NodeKind::Integer)?;
    map.set_int_value(name, value)?;
    Ok(())
}

pub(crate) fn write_float<M: NodeMap>(map: &mut M, name: &str, value: f64) -> Result<(), ConfigFailure> {
    writable_node(map, name, NodeKind::Float)?;
    map.set_float_value(name, value)?;
    Ok(())
}

pub(crate) fn write_bool<M: NodeMap>(map: &mut M, name: &str, value: bool) -> Result<(), ConfigFailure> {
    writable_node(map, name, NodeKind::Boolean)?;
    map.from_string(name, bool_string(value))?;
    Ok(())
}
