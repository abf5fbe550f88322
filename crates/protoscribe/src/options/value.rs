//! Language-neutral option value tree.
//!
//! Option values arrive either as plain descriptor fields or as decoded
//! dynamic messages (custom extensions). Both are normalized into a small
//! value tree of scalars, message field lists, and arrays, with scalars
//! pre-rendered to their text-format spelling so the printer only decides
//! layout.

use prost_reflect::{DynamicMessage, FieldDescriptor, Kind, MapKey, ReflectMessage, Value};

use crate::error::Result;

/// One option value, normalized for printing.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    /// A scalar in its final text spelling, quoting included
    Scalar(String),
    /// A message as ordered `(field name, value)` pairs, populated fields only
    Message(Vec<(String, OptionValue)>),
    /// A repeated field's elements
    Array(Vec<OptionValue>),
}

impl OptionValue {
    /// Normalize one populated field of a dynamic message.
    pub fn from_field(field: &FieldDescriptor, value: &Value) -> Result<OptionValue> {
        if field.is_map() {
            let map = value.as_map().map(|entries| {
                let mut items: Vec<_> = entries
                    .iter()
                    .map(|(key, val)| (render_map_key(key), val))
                    .collect();
                items.sort_by(|a, b| a.0.cmp(&b.0));
                items
            });
            let Some(items) = map else {
                return Ok(OptionValue::Array(Vec::new()));
            };
            let value_kind = map_value_kind(field);
            let mut out = Vec::with_capacity(items.len());
            for (key, val) in items {
                out.push(OptionValue::Message(vec![
                    ("key".to_string(), OptionValue::Scalar(key)),
                    ("value".to_string(), from_singular(&value_kind, val)?),
                ]));
            }
            return Ok(OptionValue::Array(out));
        }
        if field.is_list() {
            let items = value.as_list().unwrap_or(&[]);
            let kind = field.kind();
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(from_singular(&kind, item)?);
            }
            return Ok(OptionValue::Array(out));
        }
        from_singular(&field.kind(), value)
    }

    /// Normalize a whole message into its populated fields, in declared
    /// field order.
    pub fn message_fields(message: &DynamicMessage) -> Result<Vec<(String, OptionValue)>> {
        let mut out = Vec::new();
        for field in message.descriptor().fields() {
            if !message.has_field(&field) {
                continue;
            }
            let value = message.get_field(&field);
            out.push((
                field.name().to_string(),
                OptionValue::from_field(&field, &value)?,
            ));
        }
        Ok(out)
    }

    /// The compact one-line spelling, when one exists. Multi-field
    /// messages and non-empty arrays always render over multiple lines.
    pub fn inline(&self) -> Option<String> {
        match self {
            OptionValue::Scalar(text) => Some(text.clone()),
            OptionValue::Message(fields) => match fields.as_slice() {
                [] => Some("{}".to_string()),
                [(name, OptionValue::Scalar(text))] => Some(format!("{{{}: {}}}", name, text)),
                _ => None,
            },
            OptionValue::Array(items) => {
                if items.is_empty() {
                    Some("[]".to_string())
                } else {
                    None
                }
            }
        }
    }
}

fn from_singular(kind: &Kind, value: &Value) -> Result<OptionValue> {
    if let Value::Message(message) = value {
        return Ok(OptionValue::Message(OptionValue::message_fields(message)?));
    }
    Ok(OptionValue::Scalar(render_scalar(kind, value)))
}

fn map_value_kind(field: &FieldDescriptor) -> Kind {
    match field.kind() {
        Kind::Message(entry) => entry
            .get_field(2)
            .map(|value_field| value_field.kind())
            .unwrap_or(Kind::String),
        other => other,
    }
}

fn render_map_key(key: &MapKey) -> String {
    match key {
        MapKey::Bool(v) => v.to_string(),
        MapKey::I32(v) => v.to_string(),
        MapKey::I64(v) => v.to_string(),
        MapKey::U32(v) => v.to_string(),
        MapKey::U64(v) => v.to_string(),
        MapKey::String(v) => quote_string(v),
    }
}

fn render_scalar(kind: &Kind, value: &Value) -> String {
    match value {
        Value::Bool(v) => v.to_string(),
        Value::I32(v) => v.to_string(),
        Value::I64(v) => v.to_string(),
        Value::U32(v) => v.to_string(),
        Value::U64(v) => v.to_string(),
        Value::F32(v) => render_float(*v as f64),
        Value::F64(v) => render_float(*v),
        Value::String(v) => quote_string(v),
        Value::Bytes(v) => quote_bytes(v),
        Value::EnumNumber(number) => match kind {
            Kind::Enum(desc) => desc
                .get_value(*number)
                .map(|v| v.name().to_string())
                .unwrap_or_else(|| number.to_string()),
            _ => number.to_string(),
        },
        Value::Message(_) | Value::List(_) | Value::Map(_) => String::new(),
    }
}

fn render_float(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        value.to_string()
    }
}

/// Quote a string value with text-format escaping.
pub fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

/// Quote a bytes value, escaping anything outside printable ASCII.
pub fn quote_bytes(value: &[u8]) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for &byte in value {
        match byte {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            0x20..=0x7E => out.push(byte as char),
            _ => out.push_str(&format!("\\x{:02x}", byte)),
        }
    }
    out.push('"');
    out
}
