//! Translation between records and engine documents.
//!
//! A stored document carries four fields the codec owns (`structure`,
//! `fingerprint`, `fingerprint_len`, `indexed_at`) with the record's
//! metadata flattened alongside them. Decoding an encoded record gives
//! back an equal record, apart from the engine-assigned id.

use chrono::Utc;
use serde_json::{Map, Value, json};

use bingo_model::{Fingerprint, IndigoRecord, MetaValue, Metadata};

use crate::error::{RepositoryError, RepositoryResult};

/// Document fields the codec writes itself. Metadata must not collide
/// with these.
pub(crate) const RESERVED_FIELDS: [&str; 4] =
    ["structure", "fingerprint", "fingerprint_len", "indexed_at"];

/// Encodes a record into its document form, validating the structure
/// first so malformed records never reach the engine.
pub(crate) fn encode<R: IndigoRecord>(record: &R) -> RepositoryResult<Value> {
    record
        .validate_structure()
        .map_err(|e| encoding_error::<R>(record.id(), e.to_string()))?;

    for (key, value) in record.metadata() {
        if RESERVED_FIELDS.contains(&key.as_str()) {
            return Err(encoding_error::<R>(
                record.id(),
                format!("metadata key '{key}' collides with a reserved document field"),
            ));
        }
        // JSON has no representation for these; they would land as null
        // and vanish on decode.
        if let MetaValue::Float(f) = value {
            if !f.is_finite() {
                return Err(encoding_error::<R>(
                    record.id(),
                    format!("metadata field '{key}' is not a finite number: {f}"),
                ));
            }
        }
    }

    let fingerprint = record.fingerprint();
    let bits: Vec<String> = fingerprint.bits().iter().map(u32::to_string).collect();

    let mut document = Map::new();
    document.insert("structure".to_string(), json!(record.structure()));
    document.insert("fingerprint".to_string(), json!(bits));
    document.insert("fingerprint_len".to_string(), json!(fingerprint.len()));
    document.insert(
        "indexed_at".to_string(),
        json!(Utc::now().to_rfc3339()),
    );
    for (key, value) in record.metadata() {
        document.insert(key.clone(), meta_to_json(value));
    }
    Ok(Value::Object(document))
}

/// Decodes a `_source` document back into a record.
pub(crate) fn decode<R: IndigoRecord>(
    id: Option<String>,
    source: &Value,
) -> RepositoryResult<R> {
    let structure = source
        .get("structure")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            encoding_error::<R>(id.as_deref(), "document has no 'structure' field".to_string())
        })?
        .to_string();

    let fingerprint = match source.get("fingerprint") {
        Some(Value::Array(raw)) => Some(parse_fingerprint::<R>(id.as_deref(), raw)?),
        _ => None,
    };

    let mut metadata = Metadata::new();
    if let Some(fields) = source.as_object() {
        for (key, value) in fields {
            if RESERVED_FIELDS.contains(&key.as_str()) {
                continue;
            }
            if let Some(meta) = json_to_meta(value) {
                metadata.insert(key.clone(), meta);
            }
        }
    }

    Ok(R::from_document(id, structure, metadata, fingerprint))
}

/// Fingerprint bits come back as the keyword strings they were stored
/// as, but plain numbers are accepted too.
fn parse_fingerprint<R: IndigoRecord>(
    id: Option<&str>,
    raw: &[Value],
) -> RepositoryResult<Fingerprint> {
    let mut bits = Vec::with_capacity(raw.len());
    for value in raw {
        let bit = match value {
            Value::String(s) => s.parse::<u32>().ok(),
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            _ => None,
        };
        match bit {
            Some(bit) => bits.push(bit),
            None => {
                return Err(encoding_error::<R>(
                    id,
                    format!("fingerprint bit {value} is not an integer"),
                ));
            }
        }
    }
    Ok(Fingerprint::from_bits(bits))
}

pub(crate) fn meta_to_json(value: &MetaValue) -> Value {
    match value {
        MetaValue::Bool(b) => json!(b),
        MetaValue::Int(i) => json!(i),
        MetaValue::Float(f) => json!(f),
        MetaValue::Str(s) => json!(s),
    }
}

/// Scalar document fields map onto metadata values; nested structure
/// has no metadata counterpart and is dropped.
fn json_to_meta(value: &Value) -> Option<MetaValue> {
    match value {
        Value::Bool(b) => Some(MetaValue::Bool(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(MetaValue::Int(i)),
            None => n.as_f64().map(MetaValue::Float),
        },
        Value::String(s) => Some(MetaValue::Str(s.clone())),
        _ => None,
    }
}

fn encoding_error<R: IndigoRecord>(id: Option<&str>, message: String) -> RepositoryError {
    RepositoryError::Encoding {
        kind: R::kind_name().to_string(),
        id: id.map(str::to_string),
        message,
    }
}
