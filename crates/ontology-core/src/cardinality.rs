//! Relationship cardinality and its reversal.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    OneToOne,
    ManyToOne,
    OneToMany,
    ManyToMany,
    Unknown,
}

impl Cardinality {
    /// Classifies a source→target edge from value-overlap join statistics. Ratios
    /// within 10% tolerance of 1.0 count as "all matched".
    pub fn classify(join_count: u64, source_matched: u64, target_matched: u64) -> Self {
        if join_count == 0 {
            return Self::Unknown;
        }
        const TOLERANCE: f64 = 0.10;
        let source_ratio = source_matched as f64 / join_count as f64;
        let target_ratio = target_matched as f64 / join_count as f64;
        let source_unique = (1.0 - source_ratio).abs() <= TOLERANCE;
        let target_unique = (1.0 - target_ratio).abs() <= TOLERANCE;

        match (source_unique, target_unique) {
            (true, true) => Self::OneToOne,
            (true, false) => Self::ManyToOne,
            (false, true) => Self::OneToMany,
            (false, false) => Self::ManyToMany,
        }
    }

    /// Flips the direction of a cardinality: swapping source and target columns.
    /// `ReverseCardinality(ReverseCardinality(c)) == c` for every variant.
    pub fn reverse(self) -> Self {
        match self {
            Self::OneToOne => Self::OneToOne,
            Self::ManyToOne => Self::OneToMany,
            Self::OneToMany => Self::ManyToOne,
            Self::ManyToMany => Self::ManyToMany,
            Self::Unknown => Self::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_is_an_involution() {
        for c in [
            Cardinality::OneToOne,
            Cardinality::ManyToOne,
            Cardinality::OneToMany,
            Cardinality::ManyToMany,
            Cardinality::Unknown,
        ] {
            assert_eq!(c.reverse().reverse(), c);
        }
    }

    #[test]
    fn many_to_one_reverses_to_one_to_many() {
        assert_eq!(Cardinality::ManyToOne.reverse(), Cardinality::OneToMany);
    }

    #[test]
    fn classify_detects_many_to_one() {
        // 100 orders joined against 100 distinct users matched on the order side (every
        // order has a user), but only 40 distinct users matched on the user side.
        let c = Cardinality::classify(100, 100, 40);
        assert_eq!(c, Cardinality::ManyToOne);
    }

    #[test]
    fn classify_with_no_joins_is_unknown() {
        assert_eq!(Cardinality::classify(0, 0, 0), Cardinality::Unknown);
    }
}
