//! The structure-toolkit seam.
//!
//! The repository needs exactly two capabilities from a chemistry
//! toolkit: payload validation and fingerprint extraction. The trait
//! here is that seam; [`HashToolkit`] is the bundled deterministic
//! implementation, so the crate works standalone without binding to a
//! native cheminformatics library.

use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};

use crate::error::MalformedStructure;
use crate::fingerprint::{FINGERPRINT_BITS, Fingerprint};
use crate::record::RecordKind;

/// The two toolkit capabilities the repository consumes.
pub trait StructureToolkit: Send + Sync {
    /// Checks a structure payload against the notation rules for the
    /// given kind.
    fn validate(&self, payload: &str, kind: RecordKind) -> Result<(), MalformedStructure>;

    /// Derives the fingerprint of a payload. Must be deterministic:
    /// the same payload always yields the same bits.
    fn compute_fingerprint(&self, payload: &str, kind: RecordKind) -> Fingerprint;
}

/// Deterministic fingerprinting over hashed payload fragments.
///
/// Every fragment of up to [`Self::MAX_FRAGMENT`] bytes sets one bit,
/// so a payload contained in another payload never sets a bit the
/// container lacks. That is the property the substructure screen
/// relies on. Reaction sides are hashed separately, keeping reactant
/// fragments from matching product fragments.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashToolkit;

impl HashToolkit {
    /// Longest fragment, in bytes, that contributes a bit.
    pub const MAX_FRAGMENT: usize = 3;

    fn bit(salt: u8, fragment: &[u8]) -> u32 {
        let mut hasher = Sha256::new();
        hasher.update([salt]);
        hasher.update(fragment);
        let digest = hasher.finalize();
        u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) % FINGERPRINT_BITS
    }

    fn fragment_bits(salt: u8, payload: &str, bits: &mut Vec<u32>) {
        let bytes = payload.as_bytes();
        for width in 1..=Self::MAX_FRAGMENT {
            for fragment in bytes.windows(width) {
                bits.push(Self::bit(salt, fragment));
            }
        }
    }

    fn validate_molecule(payload: &str) -> Result<(), String> {
        if payload.is_empty() {
            return Err("empty payload".to_string());
        }
        let mut round = 0i32;
        let mut square = 0i32;
        for c in payload.chars() {
            if c.is_whitespace() {
                return Err("whitespace is not valid in a structure payload".to_string());
            }
            if c == '>' {
                return Err("reaction arrow in a molecule payload".to_string());
            }
            if !c.is_ascii_graphic() {
                return Err(format!("non-printable or non-ascii character {c:?}"));
            }
            match c {
                '(' => round += 1,
                ')' => round -= 1,
                '[' => square += 1,
                ']' => square -= 1,
                _ => {}
            }
            if round < 0 || square < 0 {
                return Err("unbalanced brackets".to_string());
            }
        }
        if round != 0 || square != 0 {
            return Err("unbalanced brackets".to_string());
        }
        Ok(())
    }

    fn validate_reaction(payload: &str) -> Result<(), String> {
        let sides: Vec<&str> = payload.split('>').collect();
        if sides.len() != 3 {
            return Err("a reaction needs the reactants>agents>products form".to_string());
        }
        if sides[0].is_empty() {
            return Err("a reaction needs at least one reactant".to_string());
        }
        if sides[2].is_empty() {
            return Err("a reaction needs at least one product".to_string());
        }
        for side in sides {
            for component in side.split('.').filter(|c| !c.is_empty()) {
                Self::validate_molecule(component)?;
            }
        }
        Ok(())
    }
}

impl StructureToolkit for HashToolkit {
    fn validate(&self, payload: &str, kind: RecordKind) -> Result<(), MalformedStructure> {
        let result = match kind {
            RecordKind::Molecule => Self::validate_molecule(payload),
            RecordKind::Reaction => Self::validate_reaction(payload),
        };
        result.map_err(|message| MalformedStructure::new(kind, message))
    }

    fn compute_fingerprint(&self, payload: &str, kind: RecordKind) -> Fingerprint {
        let mut bits = Vec::new();
        match kind {
            RecordKind::Molecule => Self::fragment_bits(0, payload, &mut bits),
            RecordKind::Reaction => {
                for (side, part) in payload.split('>').enumerate().take(3) {
                    Self::fragment_bits(side as u8, part, &mut bits);
                }
            }
        }
        Fingerprint::from_bits(bits)
    }
}

static DEFAULT_TOOLKIT: Lazy<HashToolkit> = Lazy::new(HashToolkit::default);

/// The process-wide toolkit records bind to for validation and
/// fingerprinting.
pub fn default_toolkit() -> &'static dyn StructureToolkit {
    &*DEFAULT_TOOLKIT
}
