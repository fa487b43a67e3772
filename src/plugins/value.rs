//! Host values and the codec between Lua, host and JSON representations
//!
//! Every host function sees its arguments as [`HostValue`]s and answers with
//! [`HostValue`]s. This module owns the three conversions involved:
//!
//! - Lua -> host ([`from_lua`]), used for all host-function arguments
//! - host -> Lua ([`to_lua`]), used for all host-function results
//! - host <-> JSON text ([`encode_json`], [`decode_json`])
//!
//! JSON decoding is deliberately flat: only top-level scalar values are
//! accepted. An array or object anywhere at the top level fails the whole
//! decode with `unsupported type`, and nothing is produced.

use std::collections::BTreeMap;

use mlua::{Lua, Table, Value};
use serde_json::{Map, Number, Value as JsonValue};

use crate::plugins::error::HostError;

/// Maximum table nesting accepted from Lua. Guards against cyclic tables.
pub const MAX_DEPTH: usize = 64;

// f64 bounds of the i64 range: [-2^63, 2^63)
const I64_MIN_F: f64 = -9_223_372_036_854_775_808.0;
const I64_MAX_F: f64 = 9_223_372_036_854_775_808.0;

/// Host-native, JSON-like value
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Map(BTreeMap<String, HostValue>),
    List(Vec<HostValue>),
    /// Error text handed back to a script as the second return value
    Error(String),
}

impl HostValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Null => "null",
            HostValue::Bool(_) => "bool",
            HostValue::Int(_) => "int",
            HostValue::Float(_) => "float",
            HostValue::String(_) => "string",
            HostValue::Map(_) => "map",
            HostValue::List(_) => "list",
            HostValue::Error(_) => "error",
        }
    }

    /// Integer coercion used for numeric arguments.
    ///
    /// Floats truncate toward zero, numeric strings are parsed, everything
    /// else is 0.
    pub fn to_int(&self) -> i64 {
        match self {
            HostValue::Int(i) => *i,
            HostValue::Float(f) => *f as i64,
            HostValue::String(s) => match parse_number(s) {
                Some(HostValue::Int(i)) => i,
                Some(HostValue::Float(f)) => f as i64,
                _ => 0,
            },
            _ => 0,
        }
    }

    /// String coercion used for text arguments. Numbers are formatted,
    /// everything else that is not a string is empty.
    pub fn to_text(&self) -> String {
        match self {
            HostValue::String(s) | HostValue::Error(s) => s.clone(),
            HostValue::Int(i) => i.to_string(),
            HostValue::Float(f) => f.to_string(),
            _ => String::new(),
        }
    }

    fn is_scalar(&self) -> bool {
        !matches!(self, HostValue::Map(_) | HostValue::List(_))
    }

    /// Convert to a `serde_json` value.
    ///
    /// Fails only for NaN and infinities, which JSON cannot represent.
    pub fn to_json(&self) -> Result<JsonValue, HostError> {
        Ok(match self {
            HostValue::Null => JsonValue::Null,
            HostValue::Bool(b) => JsonValue::Bool(*b),
            HostValue::Int(i) => JsonValue::Number((*i).into()),
            HostValue::Float(f) => {
                JsonValue::Number(Number::from_f64(*f).ok_or(HostError::NonFinite(*f))?)
            }
            HostValue::String(s) | HostValue::Error(s) => JsonValue::String(s.clone()),
            HostValue::Map(map) => {
                let mut object = Map::new();
                for (key, value) in map {
                    object.insert(key.clone(), value.to_json()?);
                }
                JsonValue::Object(object)
            }
            HostValue::List(items) => {
                JsonValue::Array(items.iter().map(HostValue::to_json).collect::<Result<_, _>>()?)
            }
        })
    }
}

impl From<JsonValue> for HostValue {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => HostValue::Null,
            JsonValue::Bool(b) => HostValue::Bool(b),
            JsonValue::Number(n) => number_from_json(&n),
            JsonValue::String(s) => HostValue::String(s),
            JsonValue::Array(items) => HostValue::List(items.into_iter().map(Into::into).collect()),
            JsonValue::Object(object) => {
                HostValue::Map(object.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

/// Integral numbers inside the i64 range become integers, `1.0` included.
fn number_from_json(n: &Number) -> HostValue {
    if let Some(i) = n.as_i64() {
        return HostValue::Int(i);
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && (I64_MIN_F..I64_MAX_F).contains(&f) => {
            HostValue::Int(f as i64)
        }
        Some(f) => HostValue::Float(f),
        None => HostValue::Null,
    }
}

fn parse_number(text: &str) -> Option<HostValue> {
    let text = text.trim();
    if let Ok(i) = text.parse::<i64>() {
        return Some(HostValue::Int(i));
    }
    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(HostValue::Float)
}

/// Serialize a host value to JSON text
pub fn encode_json(value: &HostValue) -> Result<String, HostError> {
    let json = value.to_json()?;
    Ok(serde_json::to_string(&json)?)
}

/// Parse JSON text into a flat string-keyed map.
///
/// The text must hold a JSON object. Every top-level value must be a string,
/// number, boolean or null; the first array or object found fails the decode
/// with [`HostError::UnsupportedType`].
pub fn decode_json(text: &str) -> Result<BTreeMap<String, HostValue>, HostError> {
    let object: Map<String, JsonValue> = serde_json::from_str(text)?;

    let mut decoded = BTreeMap::new();
    for (key, value) in object {
        let value = HostValue::from(value);
        if !value.is_scalar() {
            return Err(HostError::UnsupportedType(format!("{} at key {:?}", value.type_name(), key)));
        }
        decoded.insert(key, value);
    }
    Ok(decoded)
}

/// Convert a Lua value into a host value
pub fn from_lua(value: &Value) -> Result<HostValue, HostError> {
    from_lua_at(value, 0)
}

fn from_lua_at(value: &Value, depth: usize) -> Result<HostValue, HostError> {
    match value {
        Value::Nil => Ok(HostValue::Null),
        Value::Boolean(b) => Ok(HostValue::Bool(*b)),
        Value::Integer(i) => Ok(HostValue::Int(*i)),
        Value::Number(n) => Ok(HostValue::Float(*n)),
        Value::String(s) => Ok(HostValue::String(s.to_string_lossy().into())),
        Value::Table(table) => {
            if depth >= MAX_DEPTH {
                return Err(HostError::TooDeep(MAX_DEPTH));
            }
            table_from_lua(table, depth + 1)
        }
        other => Err(HostError::UnsupportedType(other.type_name().to_string())),
    }
}

/// Tables holding exactly the keys `1..n` become lists, anything else a map
fn table_from_lua(table: &Table, depth: usize) -> Result<HostValue, HostError> {
    let mut entries = Vec::new();
    for pair in table.pairs::<Value, Value>() {
        let (key, value) = pair.map_err(|e| HostError::UnsupportedType(e.to_string()))?;
        entries.push((key, value));
    }

    let len = table.raw_len();
    if len > 0 && entries.len() == len {
        let mut items = vec![HostValue::Null; len];
        for (key, value) in &entries {
            match key {
                Value::Integer(i) if *i >= 1 && (*i as usize) <= len => {
                    items[*i as usize - 1] = from_lua_at(value, depth)?;
                }
                _ => return map_from_entries(&entries, depth),
            }
        }
        return Ok(HostValue::List(items));
    }

    map_from_entries(&entries, depth)
}

fn map_from_entries(entries: &[(Value, Value)], depth: usize) -> Result<HostValue, HostError> {
    let mut map = BTreeMap::new();
    for (key, value) in entries {
        let key = match key {
            Value::String(s) => s.to_string_lossy().into(),
            Value::Integer(i) => i.to_string(),
            Value::Number(n) => n.to_string(),
            other => {
                return Err(HostError::UnsupportedType(format!("{} key", other.type_name())));
            }
        };
        map.insert(key, from_lua_at(value, depth)?);
    }
    Ok(HostValue::Map(map))
}

/// Convert a host value into a Lua value owned by `lua`
pub fn to_lua(lua: &Lua, value: &HostValue) -> mlua::Result<Value> {
    Ok(match value {
        HostValue::Null => Value::Nil,
        HostValue::Bool(b) => Value::Boolean(*b),
        HostValue::Int(i) => Value::Integer(*i),
        HostValue::Float(f) => Value::Number(*f),
        HostValue::String(s) | HostValue::Error(s) => Value::String(lua.create_string(s)?),
        HostValue::Map(map) => {
            let table = lua.create_table()?;
            for (key, value) in map {
                table.raw_set(key.as_str(), to_lua(lua, value)?)?;
            }
            Value::Table(table)
        }
        HostValue::List(items) => {
            let table = lua.create_table()?;
            for (index, item) in items.iter().enumerate() {
                table.raw_set(index + 1, to_lua(lua, item)?)?;
            }
            Value::Table(table)
        }
    })
}
