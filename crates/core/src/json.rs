//! JSON encoding of records
//!
//! A record serializes to a flat JSON object whose keys are labels:
//!
//! ```text
//! {
//!   "$OID": 42,
//!   "$TYPELABEL": 7,
//!   "name": "Ada",
//!   "age": 36,                              Int (fits in i32)
//!   "born": {"$LONG": 1815},                Long that would read back as Int
//!   "stars": 9007199254740993,              Long outside i32 range
//!   "height": 1.65,                         Double (always has a fraction)
//!   "tags": ["a", "b"],
//!   "friend": {"$REF": "people/all/17"}
//! }
//! ```
//!
//! Decoding reconstructs the original label/value mapping exactly, kinds
//! included.

use crate::error::{Error, Result};
use crate::record::{Record, OID_LABEL, RESERVED_PREFIX, TYPE_LABEL};
use crate::types::{ObjectRef, Oid};
use crate::value::Value;
use serde_json::{Map, Number, Value as Json};

const LONG_WRAPPER: &str = "$LONG";
const REF_WRAPPER: &str = "$REF";

/// Encode a record as a JSON object
///
/// # Errors
/// `Serialization` for a non-finite Double, which JSON cannot represent.
pub fn encode_record(record: &Record) -> Result<Json> {
    let mut map = Map::new();
    if let Some(oid) = record.oid() {
        map.insert(OID_LABEL.to_string(), Json::from(oid.as_u64()));
    }
    if let Some(type_id) = record.type_label() {
        map.insert(TYPE_LABEL.to_string(), Json::from(type_id.as_u64()));
    }
    for label in record.labels() {
        let value = record.get(label)?;
        map.insert(label.to_string(), encode_value(value)?);
    }
    Ok(Json::Object(map))
}

/// Encode a record as pretty-printed JSON bytes
pub fn encode_record_bytes(record: &Record) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(&encode_record(record)?)?)
}

fn encode_value(value: &Value) -> Result<Json> {
    Ok(match value {
        Value::String(s) => Json::String(s.clone()),
        Value::Int(i) => Json::from(*i),
        Value::Long(l) => {
            if i32::try_from(*l).is_ok() {
                let mut wrapper = Map::new();
                wrapper.insert(LONG_WRAPPER.to_string(), Json::from(*l));
                Json::Object(wrapper)
            } else {
                Json::from(*l)
            }
        }
        Value::Double(d) => Number::from_f64(*d).map(Json::Number).ok_or_else(|| {
            Error::Serialization(format!("double {} cannot be represented in JSON", d))
        })?,
        Value::Boolean(b) => Json::Bool(*b),
        Value::List(items) => Json::Array(items.iter().map(encode_value).collect::<Result<_>>()?),
        Value::Reference(r) => {
            let mut wrapper = Map::new();
            wrapper.insert(REF_WRAPPER.to_string(), Json::String(r.to_string()));
            Json::Object(wrapper)
        }
    })
}

/// Decode a record from a JSON object
///
/// # Errors
/// - `IllegalKey` for an unknown reserved (`$`-prefixed) key
/// - `Serialization` for JSON with no record equivalent (null, bare objects)
pub fn decode_record(json: &Json) -> Result<Record> {
    let Json::Object(map) = json else {
        return Err(Error::Serialization(
            "record JSON must be an object".to_string(),
        ));
    };

    let mut record = Record::new();
    for (key, value) in map {
        match key.as_str() {
            OID_LABEL => record.set_oid(decode_id(key, value)?),
            TYPE_LABEL => record.set_type_label_unchecked(decode_id(key, value)?)?,
            reserved if reserved.starts_with(RESERVED_PREFIX) => {
                return Err(Error::IllegalKey(format!(
                    "unknown reserved key '{}'",
                    reserved
                )));
            }
            label => record.put(label, decode_value(value)?)?,
        }
    }
    Ok(record)
}

/// Decode a record from JSON bytes
pub fn decode_record_slice(bytes: &[u8]) -> Result<Record> {
    let json: Json = serde_json::from_slice(bytes)?;
    decode_record(&json)
}

/// Decode a record from a JSON string
pub fn decode_record_str(s: &str) -> Result<Record> {
    let json: Json = serde_json::from_str(s)?;
    decode_record(&json)
}

fn decode_id(key: &str, value: &Json) -> Result<Oid> {
    value
        .as_u64()
        .map(Oid::new)
        .ok_or_else(|| Error::Serialization(format!("'{}' must be a non-negative integer", key)))
}

fn decode_value(json: &Json) -> Result<Value> {
    match json {
        Json::String(s) => Ok(Value::String(s.clone())),
        Json::Bool(b) => Ok(Value::Boolean(*b)),
        Json::Number(n) => decode_number(n),
        Json::Array(items) => Ok(Value::List(
            items.iter().map(decode_value).collect::<Result<_>>()?,
        )),
        Json::Object(map) if map.len() == 1 => {
            if let Some(inner) = map.get(LONG_WRAPPER) {
                return inner.as_i64().map(Value::Long).ok_or_else(|| {
                    Error::Serialization(format!("'{}' must wrap an integer", LONG_WRAPPER))
                });
            }
            if let Some(inner) = map.get(REF_WRAPPER) {
                let handle = inner.as_str().ok_or_else(|| {
                    Error::Serialization(format!("'{}' must wrap a handle string", REF_WRAPPER))
                })?;
                return Ok(Value::Reference(ObjectRef::parse_handle(handle)?));
            }
            Err(Error::Serialization(
                "nested objects are not record values".to_string(),
            ))
        }
        Json::Object(_) => Err(Error::Serialization(
            "nested objects are not record values".to_string(),
        )),
        Json::Null => Err(Error::Serialization(
            "null is not a record value".to_string(),
        )),
    }
}

fn decode_number(n: &Number) -> Result<Value> {
    if n.is_f64() {
        return n
            .as_f64()
            .map(Value::Double)
            .ok_or_else(|| Error::Serialization(format!("bad number {}", n)));
    }
    let l = n
        .as_i64()
        .ok_or_else(|| Error::Serialization(format!("integer {} out of range", n)))?;
    Ok(match i32::try_from(l) {
        Ok(i) => Value::Int(i),
        Err(_) => Value::Long(l),
    })
}
