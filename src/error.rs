//! Error type shared by every fallible operation in the crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnchorError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnchorError {
    /// An input array or tuple has the wrong rank or element count.
    #[error("invalid argument `{param}`: expected {expected}, got {actual}")]
    InvalidArgument {
        param: &'static str,
        expected: String,
        actual: String,
    },
    /// A box extent, cell size or image extent is zero, negative or not finite.
    ///
    /// `index` is the entry (box) within `param`; `field` is `"height"` for
    /// the first (y) component of the entry and `"width"` for the second (x).
    #[error("`{param}` entry {index} must have a positive finite {field}, got {value}")]
    NonPositiveSize {
        param: &'static str,
        index: usize,
        field: &'static str,
        value: f64,
    },
    #[error(
        "coverage thresholds must satisfy 0 <= lower <= upper <= 1, got lower={lower}, upper={upper}"
    )]
    InvalidThresholds { lower: f64, upper: f64 },
}

impl AnchorError {
    pub(crate) fn invalid_argument(
        param: &'static str,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::InvalidArgument {
            param,
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

const SIZE_FIELDS: [&str; 2] = ["height", "width"];

/// Reject any `(height, width)` entry that cannot serve as a box or cell extent.
pub(crate) fn ensure_positive(param: &'static str, entries: &[[f64; 2]]) -> Result<()> {
    for (index, entry) in entries.iter().enumerate() {
        for (&field, &value) in SIZE_FIELDS.iter().zip(entry) {
            if !(value.is_finite() && value > 0.0) {
                return Err(AnchorError::NonPositiveSize {
                    param,
                    index,
                    field,
                    value,
                });
            }
        }
    }
    Ok(())
}
