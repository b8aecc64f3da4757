//! Column value types and the text-decoding contract.
//!
//! Adapters hand back raw decoded text (`Option<String>` per cell); every
//! field type an entity can declare implements [`Column`] to turn one cell
//! into a typed value. Nullability is part of the type: only `Option<F>`
//! accepts a null cell.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PrimaryKey;

/// Type tag carried by every property descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    PrimaryKey,
    Text,
    Int32,
    Int64,
    Double,
    Timestamp,
}

impl TypeTag {
    pub fn name(&self) -> &'static str {
        match self {
            TypeTag::PrimaryKey => "PRIMARY_KEY",
            TypeTag::Text => "TEXT",
            TypeTag::Int32 => "INT32",
            TypeTag::Int64 => "INT64",
            TypeTag::Double => "DOUBLE",
            TypeTag::Timestamp => "TIMESTAMP",
        }
    }
}

/// Why a single cell failed to decode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Null (or missing) cell on a non-nullable column.
    #[error("null value in non-nullable column")]
    NullValue,

    /// The cell held text the declared type cannot parse.
    #[error("malformed {expected} value: {value:?}")]
    Malformed { expected: &'static str, value: String },
}

impl DecodeError {
    fn malformed(expected: &'static str, value: &str) -> Self {
        DecodeError::Malformed { expected, value: value.to_owned() }
    }
}

// ============================================================================
// Column trait
// ============================================================================

/// A field type decodable from one raw result cell.
///
/// `decode(None)` is the null-cell path; every non-nullable implementation
/// must reject it with [`DecodeError::NullValue`] rather than defaulting.
pub trait Column: Sized + 'static {
    const TAG: TypeTag;
    const NULLABLE: bool = false;

    fn decode(cell: Option<&str>) -> Result<Self, DecodeError>;
}

impl Column for PrimaryKey {
    const TAG: TypeTag = TypeTag::PrimaryKey;

    fn decode(cell: Option<&str>) -> Result<Self, DecodeError> {
        let text = cell.ok_or(DecodeError::NullValue)?;
        text.parse().map_err(|_| DecodeError::malformed("PRIMARY_KEY", text))
    }
}

impl Column for String {
    const TAG: TypeTag = TypeTag::Text;

    fn decode(cell: Option<&str>) -> Result<Self, DecodeError> {
        cell.map(str::to_owned).ok_or(DecodeError::NullValue)
    }
}

impl Column for i32 {
    const TAG: TypeTag = TypeTag::Int32;

    fn decode(cell: Option<&str>) -> Result<Self, DecodeError> {
        let text = cell.ok_or(DecodeError::NullValue)?;
        text.parse().map_err(|_| DecodeError::malformed("INT32", text))
    }
}

impl Column for i64 {
    const TAG: TypeTag = TypeTag::Int64;

    fn decode(cell: Option<&str>) -> Result<Self, DecodeError> {
        let text = cell.ok_or(DecodeError::NullValue)?;
        text.parse().map_err(|_| DecodeError::malformed("INT64", text))
    }
}

impl Column for f64 {
    const TAG: TypeTag = TypeTag::Double;

    fn decode(cell: Option<&str>) -> Result<Self, DecodeError> {
        let text = cell.ok_or(DecodeError::NullValue)?;
        text.parse().map_err(|_| DecodeError::malformed("DOUBLE", text))
    }
}

/// RFC 3339 text, normalized to UTC.
impl Column for DateTime<Utc> {
    const TAG: TypeTag = TypeTag::Timestamp;

    fn decode(cell: Option<&str>) -> Result<Self, DecodeError> {
        let text = cell.ok_or(DecodeError::NullValue)?;
        DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| DecodeError::malformed("TIMESTAMP", text))
    }
}

/// The nullable variant of any column type: a null cell becomes `None`.
impl<F: Column> Column for Option<F> {
    const TAG: TypeTag = F::TAG;
    const NULLABLE: bool = true;

    fn decode(cell: Option<&str>) -> Result<Self, DecodeError> {
        match cell {
            None => Ok(None),
            some => F::decode(some).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_policy() {
        assert_eq!(String::decode(None), Err(DecodeError::NullValue));
        assert_eq!(<Option<String>>::decode(None), Ok(None));
        assert_eq!(
            <Option<String>>::decode(Some("x")),
            Ok(Some("x".to_owned()))
        );
    }

    #[test]
    fn test_malformed_numeric_is_fatal() {
        assert!(matches!(
            i32::decode(Some("12abc")),
            Err(DecodeError::Malformed { expected: "INT32", .. })
        ));
        assert!(matches!(
            f64::decode(Some("")),
            Err(DecodeError::Malformed { expected: "DOUBLE", .. })
        ));
    }

    #[test]
    fn test_numeric_decode() {
        assert_eq!(i32::decode(Some("-42")), Ok(-42));
        assert_eq!(f64::decode(Some("617.0")), Ok(617.0));
        assert_eq!(i64::decode(Some("9000000000")), Ok(9_000_000_000));
    }

    #[test]
    fn test_timestamp_decode() {
        let dt = <DateTime<Utc>>::decode(Some("2024-05-01T12:30:00Z")).unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-05-01T12:30:00+00:00");
    }

    proptest::proptest! {
        #[test]
        fn prop_int_decode_inverts_display(v in proptest::num::i64::ANY) {
            proptest::prop_assert_eq!(i64::decode(Some(&v.to_string())), Ok(v));
        }

        #[test]
        fn prop_int32_decode_inverts_display(v in proptest::num::i32::ANY) {
            proptest::prop_assert_eq!(i32::decode(Some(&v.to_string())), Ok(v));
        }

        #[test]
        fn prop_double_decode_inverts_display(v in -1e12f64..1e12f64) {
            let decoded = f64::decode(Some(&format!("{v:?}"))).unwrap();
            proptest::prop_assert_eq!(decoded, v);
        }
    }
}
