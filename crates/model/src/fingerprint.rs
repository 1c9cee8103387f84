//! Structure fingerprints.
//!
//! A fingerprint is the set of bit positions set in a fixed-width bit
//! space, derived deterministically from a structure payload. The
//! repository stores the positions as filterable terms and uses them to
//! screen substructure candidates and to score similarity searches.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Width of the fingerprint bit space.
pub const FINGERPRINT_BITS: u32 = 512;

/// Set-bit positions of a structure fingerprint, sorted and deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    bits: Vec<u32>,
}

/// Serializes as the bare position list the engine stores.
impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.bits.serialize(serializer)
    }
}

/// Deserializing re-normalizes, so foreign position lists satisfy the
/// sorted-and-deduplicated invariant.
impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = Vec::<u32>::deserialize(deserializer)?;
        Ok(Fingerprint::from_bits(bits))
    }
}

impl Fingerprint {
    /// Builds a fingerprint from bit positions. Positions are reduced
    /// modulo [`FINGERPRINT_BITS`], sorted, and deduplicated.
    pub fn from_bits<I>(bits: I) -> Self
    where
        I: IntoIterator<Item = u32>,
    {
        let mut bits: Vec<u32> = bits.into_iter().map(|b| b % FINGERPRINT_BITS).collect();
        bits.sort_unstable();
        bits.dedup();
        Fingerprint { bits }
    }

    /// The sorted set-bit positions.
    pub fn bits(&self) -> &[u32] {
        &self.bits
    }

    /// Number of bits set.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Whether no bits are set.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Whether every bit of `other` is also set in `self`. This is the
    /// substructure screen: a candidate can only contain the query
    /// structure if it carries all of the query's bits.
    pub fn contains_all(&self, other: &Fingerprint) -> bool {
        other.bits.iter().all(|b| self.bits.binary_search(b).is_ok())
    }

    fn common_bits(&self, other: &Fingerprint) -> usize {
        let mut count = 0;
        let mut left = self.bits.iter().peekable();
        let mut right = other.bits.iter().peekable();
        while let (Some(&&l), Some(&&r)) = (left.peek(), right.peek()) {
            match l.cmp(&r) {
                std::cmp::Ordering::Less => {
                    left.next();
                }
                std::cmp::Ordering::Greater => {
                    right.next();
                }
                std::cmp::Ordering::Equal => {
                    count += 1;
                    left.next();
                    right.next();
                }
            }
        }
        count
    }

    /// Tanimoto similarity `c / (a + b - c)` where `a` and `b` are the
    /// two set sizes and `c` the overlap. Two empty fingerprints are
    /// fully similar.
    pub fn tanimoto(&self, other: &Fingerprint) -> f64 {
        let a = self.len() as f64;
        let b = other.len() as f64;
        let c = self.common_bits(other) as f64;
        let denominator = a + b - c;
        if denominator == 0.0 {
            return 1.0;
        }
        c / denominator
    }

    /// Tversky similarity `c / (alpha*(a-c) + beta*(b-c) + c)`, the
    /// weighted asymmetric generalization of Tanimoto.
    pub fn tversky(&self, other: &Fingerprint, alpha: f64, beta: f64) -> f64 {
        let a = self.len() as f64;
        let b = other.len() as f64;
        let c = self.common_bits(other) as f64;
        let denominator = alpha * (a - c) + beta * (b - c) + c;
        if denominator == 0.0 {
            return 1.0;
        }
        c / denominator
    }

    /// Euclid substructure similarity `c / a`: the overlap normalized by
    /// this fingerprint alone.
    pub fn euclid(&self, other: &Fingerprint) -> f64 {
        let a = self.len() as f64;
        if a == 0.0 {
            return 1.0;
        }
        self.common_bits(other) as f64 / a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bits_sorts_and_dedupes() {
        let fp = Fingerprint::from_bits([9, 3, 3, 510, 9]);
        assert_eq!(fp.bits(), &[3, 9, 510]);
        assert_eq!(fp.len(), 3);
    }

    #[test]
    fn from_bits_wraps_positions_into_the_bit_space() {
        let fp = Fingerprint::from_bits([FINGERPRINT_BITS + 1, 1]);
        assert_eq!(fp.bits(), &[1]);
    }

    #[test]
    fn contains_all_is_subset_on_other() {
        let target = Fingerprint::from_bits([1, 2, 3, 4]);
        let query = Fingerprint::from_bits([2, 4]);
        assert!(target.contains_all(&query));
        assert!(!query.contains_all(&target));
        assert!(target.contains_all(&Fingerprint::default()));
    }

    #[test]
    fn tanimoto_identity_and_disjoint() {
        let a = Fingerprint::from_bits([1, 2, 3]);
        let b = Fingerprint::from_bits([4, 5]);
        assert_eq!(a.tanimoto(&a), 1.0);
        assert_eq!(a.tanimoto(&b), 0.0);
        assert_eq!(Fingerprint::default().tanimoto(&Fingerprint::default()), 1.0);
    }

    #[test]
    fn tanimoto_partial_overlap() {
        let a = Fingerprint::from_bits([1, 2, 3, 4]);
        let b = Fingerprint::from_bits([3, 4, 5, 6]);
        // c = 2, a + b - c = 6
        assert!((a.tanimoto(&b) - 2.0 / 6.0).abs() < 1e-12);
        assert_eq!(a.tanimoto(&b), b.tanimoto(&a));
    }

    #[test]
    fn tversky_with_unit_weights_matches_tanimoto() {
        let a = Fingerprint::from_bits([1, 2, 3, 4]);
        let b = Fingerprint::from_bits([3, 4, 5]);
        assert!((a.tversky(&b, 1.0, 1.0) - a.tanimoto(&b)).abs() < 1e-12);
    }

    #[test]
    fn euclid_normalizes_by_query() {
        let query = Fingerprint::from_bits([1, 2]);
        let target = Fingerprint::from_bits([1, 2, 3, 4]);
        assert_eq!(query.euclid(&target), 1.0);
        assert_eq!(target.euclid(&query), 0.5);
    }

    #[test]
    fn serializes_as_a_bare_position_list() {
        let fingerprint = Fingerprint::from_bits([9, 3, 600]);
        let json = serde_json::to_value(&fingerprint).unwrap();
        assert_eq!(json, serde_json::json!([3, 9, 88]));
    }

    #[test]
    fn deserializing_normalizes_foreign_lists() {
        let fingerprint: Fingerprint = serde_json::from_str("[9, 3, 3, 600]").unwrap();
        assert_eq!(fingerprint.bits(), &[3, 9, 88]);
    }
}
