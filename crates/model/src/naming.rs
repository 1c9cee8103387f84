//! Process-wide index-name constants.
//!
//! Every deployment shares one default index per record kind, so
//! repositories built by independent services land in the same place.

use crate::record::RecordKind;

/// Default index for molecule records.
pub const BINGO_MOLECULES: &str = "bingo-molecules";

/// Default index for reaction records.
pub const BINGO_REACTIONS: &str = "bingo-reactions";

/// The default index name for a record kind.
pub fn default_index_name(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Molecule => BINGO_MOLECULES,
        RecordKind::Reaction => BINGO_REACTIONS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_their_constants() {
        assert_eq!(default_index_name(RecordKind::Molecule), BINGO_MOLECULES);
        assert_eq!(default_index_name(RecordKind::Reaction), BINGO_REACTIONS);
    }
}
