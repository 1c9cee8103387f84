//! Bingo Domain Model
//!
//! This crate carries the chemical-structure records stored by the Bingo
//! search repository: molecules, reactions, their fingerprints, and the
//! seam to the structure toolkit that validates payloads and derives
//! fingerprints.
//!
//! # Records
//!
//! Records are value-like. A payload is taken as-is at construction and
//! only validated when a record is handed to the engine, so a malformed
//! record can participate in a bulk batch and fail alone:
//!
//! ```
//! use bingo_model::{IndigoRecord, IndigoRecordMolecule};
//!
//! let ethanol = IndigoRecordMolecule::new("CCO")
//!     .with_id("mol-1")
//!     .with_meta("source", "chembl");
//!
//! assert_eq!(ethanol.structure(), "CCO");
//! assert!(ethanol.validate_structure().is_ok());
//! assert!(!ethanol.fingerprint().is_empty());
//! ```
//!
//! # Fingerprints
//!
//! A [`Fingerprint`] is the sorted set of bit positions derived from a
//! payload. [`Fingerprint::contains_all`] is the substructure screen;
//! the similarity metrics ([`Fingerprint::tanimoto`],
//! [`Fingerprint::tversky`], [`Fingerprint::euclid`]) score how close
//! two structures are.
//!
//! # The toolkit seam
//!
//! [`StructureToolkit`] is the only contract the repository has with
//! chemistry proper. The bundled [`HashToolkit`] fingerprints hashed
//! payload fragments deterministically, which keeps the crate fully
//! usable and testable without a native toolkit binding.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod fingerprint;
pub mod naming;
pub mod record;
pub mod toolkit;

mod molecule;
mod reaction;

// Re-export commonly used types at crate root
pub use error::{MalformedStructure, UnsupportedKind};
pub use fingerprint::{FINGERPRINT_BITS, Fingerprint};
pub use molecule::IndigoRecordMolecule;
pub use reaction::IndigoRecordReaction;
pub use record::{IndigoRecord, MetaValue, Metadata, RecordKind};
pub use toolkit::{HashToolkit, StructureToolkit, default_toolkit};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
