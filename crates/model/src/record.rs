//! Record kinds, metadata, and the record capability contract.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MalformedStructure, UnsupportedKind};
use crate::fingerprint::Fingerprint;

/// The closed set of record kinds the repository knows how to index.
///
/// Each kind has its own index, document schema, and notation rules.
/// Adding a kind means adding a variant here plus its index mapping,
/// not subclassing an open record hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// Single-structure records.
    Molecule,
    /// Reactant/agent/product multi-structure records.
    Reaction,
}

impl RecordKind {
    /// The stable kind tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Molecule => "molecule",
            RecordKind::Reaction => "reaction",
        }
    }

    /// Resolves a kind tag against the supported set.
    pub fn from_name(name: &str) -> Result<Self, UnsupportedKind> {
        match name {
            "molecule" => Ok(RecordKind::Molecule),
            "reaction" => Ok(RecordKind::Reaction),
            other => Err(UnsupportedKind {
                name: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single scalar metadata value.
///
/// Serializes untagged, so metadata fields land in documents as plain
/// JSON scalars. Variant order matters for deserialization: integers
/// must be tried before floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating-point number.
    Float(f64),
    /// Free-form string.
    Str(String),
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        MetaValue::Bool(value)
    }
}

impl From<i32> for MetaValue {
    fn from(value: i32) -> Self {
        MetaValue::Int(value.into())
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Int(value)
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        MetaValue::Float(value)
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Str(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Str(value)
    }
}

/// Named scalar metadata fields attached to a record.
pub type Metadata = BTreeMap<String, MetaValue>;

/// Capability contract for records the repository can store.
///
/// Records are value-like: the structure payload is immutable after
/// construction and the identifier, once assigned by the caller or the
/// engine, never changes. Construction does not validate the payload;
/// validation happens when a record is encoded for the engine, so a
/// malformed record can still travel inside a bulk batch and fail only
/// its own slot.
pub trait IndigoRecord: Clone + Send + Sync + 'static {
    /// Stable kind tag, resolved against the supported set when a
    /// repository is built for this record type.
    fn kind_name() -> &'static str;

    /// The index records of this kind belong to by default.
    fn default_index_name() -> &'static str;

    /// Identifier assigned by the caller or the engine, if any.
    fn id(&self) -> Option<&str>;

    /// The raw structure payload.
    fn structure(&self) -> &str;

    /// Named metadata fields.
    fn metadata(&self) -> &Metadata;

    /// The derived fingerprint. Computed at most once per record
    /// instance and cached; deterministic for a given payload.
    fn fingerprint(&self) -> &Fingerprint;

    /// Checks the structure payload against the toolkit's notation
    /// rules for this kind.
    fn validate_structure(&self) -> Result<(), MalformedStructure>;

    /// Rebuilds a record from decoded document parts. Passing no
    /// fingerprint leaves it to be recomputed on demand.
    fn from_document(
        id: Option<String>,
        structure: String,
        metadata: Metadata,
        fingerprint: Option<Fingerprint>,
    ) -> Self;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_its_name() {
        assert_eq!(RecordKind::from_name("molecule"), Ok(RecordKind::Molecule));
        assert_eq!(RecordKind::from_name("reaction"), Ok(RecordKind::Reaction));
        assert_eq!(RecordKind::Molecule.to_string(), "molecule");
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = RecordKind::from_name("peptide").unwrap_err();
        assert_eq!(err.name, "peptide");
    }

    #[test]
    fn meta_value_serializes_untagged() {
        assert_eq!(serde_json::to_value(MetaValue::Int(46)).unwrap(), serde_json::json!(46));
        assert_eq!(
            serde_json::to_value(MetaValue::Str("chembl".into())).unwrap(),
            serde_json::json!("chembl")
        );
    }

    #[test]
    fn meta_value_deserializes_integers_before_floats() {
        let int: MetaValue = serde_json::from_str("46").unwrap();
        assert_eq!(int, MetaValue::Int(46));
        let float: MetaValue = serde_json::from_str("46.07").unwrap();
        assert_eq!(float, MetaValue::Float(46.07));
    }
}
