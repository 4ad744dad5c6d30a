// Shared parsing logic for typed configuration parameter values
//
// Every declared parameter carries a type from the closed list below. Raw
// values arrive as YAML scalars or collections and are normalized into a
// comparable representation before any bound or modify-limit check runs:
// - Capacity: "2G", "2048M", bare digits (megabytes) -> bytes
// - Time: "90m", "1h", bare digits (seconds) -> seconds
// - Moment: "02:30", "DISABLE" -> minutes since midnight

use std::cmp::Ordering;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use dbd_core::error::{DbdError, Result};

static MOMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,2}):(\d{1,2})$").unwrap());
static TIME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)([a-z]+)$").unwrap());
static CAPACITY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)([BKMGTP])B?$").unwrap());

/// Declared parameter type from `parameter.yaml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Integer,
    Double,
    Boolean,
    Moment,
    Time,
    Capacity,
    StringList,
    Dict,
    List,
    StringOrKvList,
}

impl ValueType {
    /// Maps a declared type name to a type. Unknown names fall back to
    /// String, matching how unrecognized declarations have always been
    /// treated by plugin authors.
    pub fn from_decl(decl: &str) -> ValueType {
        match decl.to_uppercase().as_str() {
            "DOUBLE" => ValueType::Double,
            "BOOL" => ValueType::Boolean,
            "INT" => ValueType::Integer,
            "MOMENT" => ValueType::Moment,
            "TIME" => ValueType::Time,
            "CAPACITY" => ValueType::Capacity,
            "STRING_LIST" => ValueType::StringList,
            "DICT" => ValueType::Dict,
            "LIST" => ValueType::List,
            "PARAM_LIST" => ValueType::StringOrKvList,
            _ => ValueType::String,
        }
    }

    /// Normalizes a raw value into the typed domain.
    pub fn parse(&self, raw: &Value) -> Result<TypedValue> {
        match self {
            ValueType::String => Ok(TypedValue::String(scalar_to_string(raw))),
            ValueType::Integer => parse_integer(raw),
            ValueType::Double => parse_double(raw),
            ValueType::Boolean => parse_boolean(raw),
            ValueType::Moment => parse_moment(raw),
            ValueType::Time => parse_time(raw),
            ValueType::Capacity => parse_capacity(raw),
            ValueType::StringList => parse_string_list(raw),
            ValueType::Dict => parse_dict(raw),
            ValueType::List => parse_list(raw),
            ValueType::StringOrKvList => parse_kv_list(raw),
        }
    }
}

/// A normalized parameter value. Ordering is defined within one variant
/// over the normalized representation, so `"2h" > "3600s"` holds once both
/// sides are parsed as Time.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    String(String),
    Integer(i64),
    Double(f64),
    Boolean(bool),
    /// Minutes since midnight.
    Moment(u32),
    /// Seconds.
    Time(f64),
    /// Bytes.
    Capacity(u64),
    StringList(Vec<String>),
    Dict(serde_json::Map<String, Value>),
    List(Vec<Value>),
    KvList(Vec<Value>),
}

impl PartialOrd for TypedValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (TypedValue::String(a), TypedValue::String(b)) => a.partial_cmp(b),
            (TypedValue::Integer(a), TypedValue::Integer(b)) => a.partial_cmp(b),
            (TypedValue::Double(a), TypedValue::Double(b)) => a.partial_cmp(b),
            (TypedValue::Boolean(a), TypedValue::Boolean(b)) => a.partial_cmp(b),
            (TypedValue::Moment(a), TypedValue::Moment(b)) => a.partial_cmp(b),
            (TypedValue::Time(a), TypedValue::Time(b)) => a.partial_cmp(b),
            (TypedValue::Capacity(a), TypedValue::Capacity(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

fn not_a(raw: &Value, type_str: &str) -> DbdError {
    DbdError::Config(format!("'{}' is not {}", display_raw(raw), type_str))
}

fn display_raw(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn scalar_to_string(raw: &Value) -> String {
    match raw {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_integer(raw: &Value) -> Result<TypedValue> {
    match raw {
        Value::Null => Ok(TypedValue::Integer(0)),
        Value::Number(n) if n.is_i64() => Ok(TypedValue::Integer(n.as_i64().unwrap_or(0))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(TypedValue::Integer)
            .map_err(|_| not_a(raw, "Integer")),
        _ => Err(not_a(raw, "Integer")),
    }
}

fn parse_double(raw: &Value) -> Result<TypedValue> {
    match raw {
        Value::Null => Ok(TypedValue::Double(0.0)),
        Value::Number(n) => Ok(TypedValue::Double(n.as_f64().unwrap_or(0.0))),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(TypedValue::Double)
            .map_err(|_| not_a(raw, "Double")),
        _ => Err(not_a(raw, "Double")),
    }
}

fn parse_boolean(raw: &Value) -> Result<TypedValue> {
    match raw {
        Value::Bool(b) => Ok(TypedValue::Boolean(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(TypedValue::Boolean(false)),
            Some(1) => Ok(TypedValue::Boolean(true)),
            _ => Err(not_a(raw, "Boolean")),
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" => Ok(TypedValue::Boolean(true)),
            "false" | "0" => Ok(TypedValue::Boolean(false)),
            _ => Err(not_a(raw, "Boolean")),
        },
        _ => Err(not_a(raw, "Boolean")),
    }
}

fn parse_moment(raw: &Value) -> Result<TypedValue> {
    let s = scalar_to_string(raw);
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("disable") {
        return Ok(TypedValue::Moment(0));
    }
    let caps = MOMENT_RE.captures(s).ok_or_else(|| not_a(raw, "Moment"))?;
    let h: u32 = caps[1].parse().map_err(|_| not_a(raw, "Moment"))?;
    let m: u32 = caps[2].parse().map_err(|_| not_a(raw, "Moment"))?;
    if h <= 23 && m <= 59 {
        Ok(TypedValue::Moment(h * 60 + m))
    } else {
        Err(not_a(raw, "Moment"))
    }
}

fn time_unit(unit: &str) -> Option<f64> {
    match unit {
        "ns" => Some(0.000_000_001),
        "us" => Some(0.000_001),
        "ms" => Some(0.001),
        "s" => Some(1.0),
        "m" => Some(60.0),
        "h" => Some(3600.0),
        "d" => Some(86400.0),
        _ => None,
    }
}

fn parse_time(raw: &Value) -> Result<TypedValue> {
    if raw.is_null() {
        return Ok(TypedValue::Time(0.0));
    }
    if let Value::Number(n) = raw {
        if let Some(v) = n.as_i64() {
            return Ok(TypedValue::Time(v as f64));
        }
    }
    let s = scalar_to_string(raw);
    let s = s.trim().to_lowercase();
    if s.is_empty() {
        return Ok(TypedValue::Time(0.0));
    }
    // Bare digits mean seconds.
    if s.chars().all(|c| c.is_ascii_digit()) {
        let n: u64 = s.parse().map_err(|_| not_a(raw, "Time"))?;
        return Ok(TypedValue::Time(n as f64));
    }
    let caps = TIME_RE.captures(&s).ok_or_else(|| not_a(raw, "Time"))?;
    let n: u64 = caps[1].parse().map_err(|_| not_a(raw, "Time"))?;
    let unit = time_unit(&caps[2]).ok_or_else(|| not_a(raw, "Time"))?;
    Ok(TypedValue::Time(n as f64 * unit))
}

fn capacity_unit(unit: &str) -> Option<u64> {
    match unit {
        "B" => Some(1),
        "K" => Some(1 << 10),
        "M" => Some(1 << 20),
        "G" => Some(1 << 30),
        "T" => Some(1 << 40),
        "P" => Some(1 << 50),
        _ => None,
    }
}

fn parse_capacity(raw: &Value) -> Result<TypedValue> {
    if raw.is_null() {
        return Ok(TypedValue::Capacity(0));
    }
    let s = scalar_to_string(raw);
    let s = s.trim().to_uppercase();
    if s.is_empty() {
        return Ok(TypedValue::Capacity(0));
    }
    // Bare digits mean megabytes.
    if s.chars().all(|c| c.is_ascii_digit()) {
        let n: u64 = s.parse().map_err(|_| not_a(raw, "Capacity"))?;
        return Ok(TypedValue::Capacity(n << 20));
    }
    let caps = CAPACITY_RE.captures(&s).ok_or_else(|| not_a(raw, "Capacity"))?;
    let n: u64 = caps[1].parse().map_err(|_| not_a(raw, "Capacity"))?;
    let unit = capacity_unit(&caps[2]).ok_or_else(|| not_a(raw, "Capacity"))?;
    Ok(TypedValue::Capacity(n * unit))
}

fn parse_string_list(raw: &Value) -> Result<TypedValue> {
    match raw {
        Value::Null => Ok(TypedValue::StringList(Vec::new())),
        Value::String(s) if s.trim().is_empty() => Ok(TypedValue::StringList(Vec::new())),
        Value::String(s) => Ok(TypedValue::StringList(
            s.trim().split(';').map(str::to_string).collect(),
        )),
        _ => Err(not_a(raw, "StringList")),
    }
}

fn parse_dict(raw: &Value) -> Result<TypedValue> {
    match raw {
        Value::Null => Ok(TypedValue::Dict(serde_json::Map::new())),
        Value::Object(map) => Ok(TypedValue::Dict(map.clone())),
        _ => Err(not_a(raw, "Dict")),
    }
}

fn parse_list(raw: &Value) -> Result<TypedValue> {
    match raw {
        Value::Null => Ok(TypedValue::List(Vec::new())),
        Value::Array(items) => Ok(TypedValue::List(items.clone())),
        _ => Err(not_a(raw, "List")),
    }
}

fn parse_kv_list(raw: &Value) -> Result<TypedValue> {
    let items = match raw {
        Value::Null => return Ok(TypedValue::KvList(Vec::new())),
        Value::Array(items) => items,
        _ => Err(not_a(raw, "StringOrKvList"))?,
    };
    for item in items {
        match item {
            Value::Null | Value::String(_) => {}
            Value::Object(map) if map.len() == 1 => {}
            Value::Object(_) => {
                return Err(DbdError::Config(format!(
                    "'{}' should be single key-value format",
                    display_raw(item)
                )))
            }
            _ => {
                return Err(DbdError::Config(format!(
                    "'{}' should be string or key-value format",
                    display_raw(item)
                )))
            }
        }
    }
    Ok(TypedValue::KvList(items.clone()))
}
