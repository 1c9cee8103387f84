//! Molecule records.

use std::fmt;

use once_cell::sync::OnceCell;

use crate::error::MalformedStructure;
use crate::fingerprint::Fingerprint;
use crate::naming;
use crate::record::{IndigoRecord, MetaValue, Metadata, RecordKind};
use crate::toolkit::default_toolkit;

/// A single-structure chemical record.
///
/// The structure payload is immutable after construction and is not
/// validated here; validation happens when the record is encoded for
/// the engine. Equality covers identifier, payload, and metadata; the
/// cached fingerprint is derived state and excluded.
#[derive(Debug, Clone)]
pub struct IndigoRecordMolecule {
    id: Option<String>,
    structure: String,
    metadata: Metadata,
    fingerprint: OnceCell<Fingerprint>,
}

impl IndigoRecordMolecule {
    /// Creates a record from a structure payload.
    pub fn new(structure: impl Into<String>) -> Self {
        IndigoRecordMolecule {
            id: None,
            structure: structure.into(),
            metadata: Metadata::new(),
            fingerprint: OnceCell::new(),
        }
    }

    /// Assigns a caller-chosen identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attaches one metadata field.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl PartialEq for IndigoRecordMolecule {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.structure == other.structure && self.metadata == other.metadata
    }
}

impl fmt::Display for IndigoRecordMolecule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.structure)
    }
}

impl IndigoRecord for IndigoRecordMolecule {
    fn kind_name() -> &'static str {
        RecordKind::Molecule.as_str()
    }

    fn default_index_name() -> &'static str {
        naming::BINGO_MOLECULES
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn structure(&self) -> &str {
        &self.structure
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn fingerprint(&self) -> &Fingerprint {
        self.fingerprint.get_or_init(|| {
            default_toolkit().compute_fingerprint(&self.structure, RecordKind::Molecule)
        })
    }

    fn validate_structure(&self) -> Result<(), MalformedStructure> {
        default_toolkit().validate(&self.structure, RecordKind::Molecule)
    }

    fn from_document(
        id: Option<String>,
        structure: String,
        metadata: Metadata,
        fingerprint: Option<Fingerprint>,
    ) -> Self {
        let cell = match fingerprint {
            Some(fingerprint) => OnceCell::with_value(fingerprint),
            None => OnceCell::new(),
        };
        IndigoRecordMolecule {
            id,
            structure,
            metadata,
            fingerprint: cell,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_style_construction() {
        let record = IndigoRecordMolecule::new("CCO")
            .with_id("mol-1")
            .with_meta("source", "chembl")
            .with_meta("mass", 46.07);
        assert_eq!(record.id(), Some("mol-1"));
        assert_eq!(record.structure(), "CCO");
        assert_eq!(record.metadata().get("source"), Some(&MetaValue::Str("chembl".into())));
        assert_eq!(record.metadata().get("mass"), Some(&MetaValue::Float(46.07)));
    }

    #[test]
    fn fingerprint_is_memoized() {
        let record = IndigoRecordMolecule::new("CCO");
        let first = record.fingerprint().clone();
        let second = record.fingerprint();
        assert_eq!(&first, second);
        assert!(std::ptr::eq(record.fingerprint(), second));
    }

    #[test]
    fn equality_ignores_the_cached_fingerprint() {
        let plain = IndigoRecordMolecule::new("CCO").with_id("mol-1");
        let warmed = IndigoRecordMolecule::new("CCO").with_id("mol-1");
        let _ = warmed.fingerprint();
        assert_eq!(plain, warmed);
    }

    #[test]
    fn from_document_preserves_the_decoded_fingerprint() {
        let fingerprint = Fingerprint::from_bits([1, 2, 3]);
        let record = IndigoRecordMolecule::from_document(
            Some("mol-1".to_string()),
            "CCO".to_string(),
            Metadata::new(),
            Some(fingerprint.clone()),
        );
        assert_eq!(record.fingerprint(), &fingerprint);
    }

    #[test]
    fn from_document_without_fingerprint_recomputes() {
        let record = IndigoRecordMolecule::from_document(
            None,
            "CCO".to_string(),
            Metadata::new(),
            None,
        );
        let fresh = IndigoRecordMolecule::new("CCO");
        assert_eq!(record.fingerprint(), fresh.fingerprint());
    }

    #[test]
    fn display_shows_the_payload() {
        assert_eq!(IndigoRecordMolecule::new("CCO").to_string(), "CCO");
    }
}
