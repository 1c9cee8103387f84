//! Reaction records.

use std::fmt;

use once_cell::sync::OnceCell;

use crate::error::MalformedStructure;
use crate::fingerprint::Fingerprint;
use crate::naming;
use crate::record::{IndigoRecord, MetaValue, Metadata, RecordKind};
use crate::toolkit::default_toolkit;

/// A multi-structure record in `reactants>agents>products` notation.
///
/// Components within a side are separated by `.`. As with molecules,
/// the payload is validated at encode time, not at construction, and
/// equality excludes the cached fingerprint.
#[derive(Debug, Clone)]
pub struct IndigoRecordReaction {
    id: Option<String>,
    structure: String,
    metadata: Metadata,
    fingerprint: OnceCell<Fingerprint>,
}

impl IndigoRecordReaction {
    /// Creates a record from a reaction payload.
    pub fn new(structure: impl Into<String>) -> Self {
        IndigoRecordReaction {
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

    fn side(&self, n: usize) -> impl Iterator<Item = &str> {
        self.structure
            .split('>')
            .nth(n)
            .unwrap_or("")
            .split('.')
            .filter(|component| !component.is_empty())
    }

    /// Component structures on the reactant side.
    pub fn reactants(&self) -> impl Iterator<Item = &str> {
        self.side(0)
    }

    /// Component structures on the agent side.
    pub fn agents(&self) -> impl Iterator<Item = &str> {
        self.side(1)
    }

    /// Component structures on the product side.
    pub fn products(&self) -> impl Iterator<Item = &str> {
        self.side(2)
    }
}

impl PartialEq for IndigoRecordReaction {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.structure == other.structure && self.metadata == other.metadata
    }
}

impl fmt::Display for IndigoRecordReaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.structure)
    }
}

impl IndigoRecord for IndigoRecordReaction {
    fn kind_name() -> &'static str {
        RecordKind::Reaction.as_str()
    }

    fn default_index_name() -> &'static str {
        naming::BINGO_REACTIONS
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
            default_toolkit().compute_fingerprint(&self.structure, RecordKind::Reaction)
        })
    }

    fn validate_structure(&self) -> Result<(), MalformedStructure> {
        default_toolkit().validate(&self.structure, RecordKind::Reaction)
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
        IndigoRecordReaction {
            id,
            structure,
            metadata,
            fingerprint: cell,
        }
    }
}
