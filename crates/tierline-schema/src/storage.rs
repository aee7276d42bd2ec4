//! Column storage types and type inference
//!
//! Inference is deterministic and applied per field in priority order:
//! a recognized declared type wins, then field-name suffix heuristics,
//! then a bounded identifier string.

use serde::{Deserialize, Serialize};
use tierline_core::Field;

/// Length of identifier columns and the fallback type
pub const IDENTIFIER_LENGTH: u16 = 64;

/// Storage type emitted into DDL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageType {
    /// Bounded string
    Varchar { length: u16 },

    /// Unbounded string
    Text,

    /// Fixed-precision decimal
    Decimal { precision: u8, scale: u8 },

    SmallInt,
    Integer,
    BigInt,
    Boolean,

    /// Date (no time component)
    Date,

    /// Timestamp, optionally defaulting to the insert time
    Timestamp { default_now: bool },
}

impl StorageType {
    /// Monetary amounts
    pub const AMOUNT: StorageType = StorageType::Decimal { precision: 20, scale: 4 };

    /// Percentages and ratios
    pub const PERCENTAGE: StorageType = StorageType::Decimal { precision: 10, scale: 6 };

    /// Generic measured values
    pub const VALUE: StorageType = StorageType::Decimal { precision: 12, scale: 6 };

    /// Basis points
    pub const BASIS_POINTS: StorageType = StorageType::Decimal { precision: 10, scale: 4 };

    /// Identifier columns and the fallback
    pub const IDENTIFIER: StorageType = StorageType::Varchar { length: IDENTIFIER_LENGTH };

    /// Short code columns
    pub const CODE: StorageType = StorageType::Varchar { length: 30 };

    /// Names and descriptions
    pub const LONG_TEXT: StorageType = StorageType::Varchar { length: 500 };
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Varchar { length } => write!(f, "VARCHAR({})", length),
            Self::Text => write!(f, "TEXT"),
            Self::Decimal { precision, scale } => write!(f, "NUMERIC({},{})", precision, scale),
            Self::SmallInt => write!(f, "SMALLINT"),
            Self::Integer => write!(f, "INTEGER"),
            Self::BigInt => write!(f, "BIGINT"),
            Self::Boolean => write!(f, "BOOLEAN"),
            Self::Date => write!(f, "DATE"),
            Self::Timestamp { default_now: false } => write!(f, "TIMESTAMP"),
            Self::Timestamp { default_now: true } => write!(f, "TIMESTAMP DEFAULT CURRENT_TIMESTAMP"),
        }
    }
}

/// Which rule produced an inferred type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceRule {
    /// The declared data type was recognized
    Declared,

    /// A field-name suffix or prefix matched
    NameHeuristic,

    /// Nothing matched
    Fallback,
}

/// Parse a declared data type string
///
/// Returns `None` for names that are not recognized storage types, in which
/// case inference continues with the name heuristics.
pub fn parse_data_type(data_type: &str) -> Option<StorageType> {
    let lower = data_type.trim().to_lowercase();
    let (base, params) = split_params(&lower);

    match base {
        // Strings
        "varchar" | "character varying" | "nvarchar" | "char" | "character" => {
            let length = params
                .first()
                .and_then(|p| p.parse().ok())
                .unwrap_or(IDENTIFIER_LENGTH);
            Some(StorageType::Varchar { length })
        }
        "text" | "string" => Some(StorageType::Text),

        // Decimals
        "decimal" | "numeric" | "number" => {
            let precision = params.first().and_then(|p| p.parse().ok()).unwrap_or(18);
            let scale = params.get(1).and_then(|s| s.parse().ok()).unwrap_or(4);
            Some(StorageType::Decimal { precision, scale })
        }

        // Integers
        "smallint" | "int2" => Some(StorageType::SmallInt),
        "int" | "integer" | "int4" => Some(StorageType::Integer),
        "bigint" | "int8" | "int64" => Some(StorageType::BigInt),

        // Booleans
        "bool" | "boolean" => Some(StorageType::Boolean),

        // Dates
        "date" => Some(StorageType::Date),

        // Timestamps
        "timestamp" | "timestamptz" | "datetime" | "timestamp with time zone"
        | "timestamp without time zone" => Some(StorageType::Timestamp { default_now: false }),

        _ => None,
    }
}

/// Split `numeric(20, 4)` into `("numeric", ["20", "4"])`
fn split_params(s: &str) -> (&str, Vec<&str>) {
    match (s.find('('), s.rfind(')')) {
        (Some(open), Some(close)) if close > open => {
            let params = s[open + 1..close]
                .split(',')
                .map(|p| p.trim())
                .filter(|p| !p.is_empty())
                .collect();
            (s[..open].trim(), params)
        }
        _ => (s, Vec::new()),
    }
}

/// Infer a storage type from a field name alone
pub fn infer_from_name(name: &str) -> Option<StorageType> {
    let name = name.to_lowercase();
    let ends = |suffixes: &[&str]| suffixes.iter().any(|s| name.ends_with(s));

    if ends(&["_id"]) {
        Some(StorageType::IDENTIFIER)
    } else if ends(&["_code"]) {
        Some(StorageType::CODE)
    } else if ends(&["_name", "_desc", "_text"]) {
        Some(StorageType::LONG_TEXT)
    } else if ends(&["_amt", "_amount", "_usd"]) {
        Some(StorageType::AMOUNT)
    } else if ends(&["_pct"]) {
        Some(StorageType::PERCENTAGE)
    } else if ends(&["_value"]) {
        Some(StorageType::VALUE)
    } else if ends(&["_count"]) {
        Some(StorageType::Integer)
    } else if ends(&["_flag"]) {
        Some(StorageType::Boolean)
    } else if ends(&["_date"]) {
        Some(StorageType::Date)
    } else if ends(&["_ts"]) {
        Some(StorageType::Timestamp { default_now: true })
    } else if ends(&["_bps"]) {
        Some(StorageType::BASIS_POINTS)
    } else if ends(&["_seq"]) || name.starts_with("rank_") {
        Some(StorageType::Integer)
    } else {
        None
    }
}

/// Infer the storage type of a field, reporting which rule applied
pub fn infer_storage_type(field: &Field) -> (StorageType, InferenceRule) {
    if let Some(declared) = field.data_type.as_deref().and_then(parse_data_type) {
        return (declared, InferenceRule::Declared);
    }

    match infer_from_name(&field.name) {
        Some(inferred) => (inferred, InferenceRule::NameHeuristic),
        None => (StorageType::IDENTIFIER, InferenceRule::Fallback),
    }
}
