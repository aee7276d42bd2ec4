//! Rollup hierarchy dimensions
//!
//! One canonical enumeration is used everywhere inside the workspace.
//! Callers that speak the layer-alias vocabulary (`L3` for desk, `L2` for
//! portfolio, `L1` for line of business) are translated by [`Dimension::from_tag`],
//! which is also what serde uses.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A level of the rollup hierarchy, ordered from finest to coarsest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Dimension {
    Facility,
    Counterparty,
    Desk,
    Portfolio,
    Lob,
}

/// Boundary translation table: (tag, dimension)
const TAGS: &[(&str, Dimension)] = &[
    ("facility", Dimension::Facility),
    ("counterparty", Dimension::Counterparty),
    ("desk", Dimension::Desk),
    ("portfolio", Dimension::Portfolio),
    ("lob", Dimension::Lob),
    ("line_of_business", Dimension::Lob),
    ("l3", Dimension::Desk),
    ("l2", Dimension::Portfolio),
    ("l1", Dimension::Lob),
];

impl Dimension {
    /// All dimensions from facility up to line of business
    pub const ALL: [Dimension; 5] = [
        Dimension::Facility,
        Dimension::Counterparty,
        Dimension::Desk,
        Dimension::Portfolio,
        Dimension::Lob,
    ];

    /// Canonical tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Facility => "facility",
            Self::Counterparty => "counterparty",
            Self::Desk => "desk",
            Self::Portfolio => "portfolio",
            Self::Lob => "lob",
        }
    }

    /// Translate an external tag (hierarchy name or layer alias)
    pub fn from_tag(tag: &str) -> Result<Self, ValidationError> {
        let normalized = tag.trim().to_ascii_lowercase();
        TAGS.iter()
            .find(|(t, _)| *t == normalized)
            .map(|(_, d)| *d)
            .ok_or_else(|| ValidationError::UnknownDimension(tag.to_string()))
    }

    /// Position in the hierarchy, 0 = facility
    pub fn level(&self) -> u8 {
        match self {
            Self::Facility => 0,
            Self::Counterparty => 1,
            Self::Desk => 2,
            Self::Portfolio => 3,
            Self::Lob => 4,
        }
    }

    /// Human label for tier headings
    pub fn label(&self) -> &'static str {
        match self {
            Self::Facility => "Facility",
            Self::Counterparty => "Counterparty",
            Self::Desk => "Desk (L3)",
            Self::Portfolio => "Portfolio (L2)",
            Self::Lob => "Line of Business (L1)",
        }
    }

    /// Whether this dimension sits above facility in the hierarchy
    pub fn is_above_facility(&self) -> bool {
        *self > Self::Facility
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Dimension {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s)
    }
}

impl TryFrom<String> for Dimension {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_tag(&value)
    }
}

impl From<Dimension> for String {
    fn from(d: Dimension) -> Self {
        d.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_aliases_translate_to_upper_tiers() {
        assert_eq!(Dimension::from_tag("L3").unwrap(), Dimension::Desk);
        assert_eq!(Dimension::from_tag("l2").unwrap(), Dimension::Portfolio);
        assert_eq!(Dimension::from_tag("L1").unwrap(), Dimension::Lob);
        assert_eq!(Dimension::from_tag(" Counterparty ").unwrap(), Dimension::Counterparty);
        assert!(Dimension::from_tag("region").is_err());
    }

    #[test]
    fn hierarchy_ordering() {
        assert!(Dimension::Facility < Dimension::Counterparty);
        assert!(Dimension::Portfolio < Dimension::Lob);
        assert!(!Dimension::Facility.is_above_facility());
        assert!(Dimension::Desk.is_above_facility());
        assert_eq!(Dimension::Lob.level(), 4);
    }

    #[test]
    fn serde_uses_translation_table() {
        let dims: Vec<Dimension> = serde_json::from_str(r#"["facility", "L3", "lob"]"#).unwrap();
        assert_eq!(dims, vec![Dimension::Facility, Dimension::Desk, Dimension::Lob]);

        let out = serde_json::to_string(&Dimension::Desk).unwrap();
        assert_eq!(out, "\"desk\"");
    }
}
