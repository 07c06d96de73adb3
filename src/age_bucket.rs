//! The closed age-range enumeration carried by a token.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Age range asserted by an attestor.
///
/// Tokens never carry a birthdate, only one of these four buckets.
///
/// # Example
///
/// ```
/// use agetoken::AgeBucket;
///
/// let bucket: AgeBucket = "13_15".parse().unwrap();
/// assert_eq!(bucket, AgeBucket::Age13To15);
/// assert!(bucket.is_minor());
/// assert_eq!(bucket.as_str(), "13_15");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgeBucket {
    /// Younger than 13.
    #[serde(rename = "UNDER_13")]
    Under13,
    /// 13 to 15 inclusive.
    #[serde(rename = "13_15")]
    Age13To15,
    /// 16 to 17 inclusive.
    #[serde(rename = "16_17")]
    Age16To17,
    /// 18 or older.
    #[serde(rename = "18_PLUS")]
    Adult,
}

impl AgeBucket {
    /// All buckets in ascending age order.
    pub const ALL: [Self; 4] = [Self::Under13, Self::Age13To15, Self::Age16To17, Self::Adult];

    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Under13 => "UNDER_13",
            Self::Age13To15 => "13_15",
            Self::Age16To17 => "16_17",
            Self::Adult => "18_PLUS",
        }
    }

    /// Returns true for every bucket below 18.
    #[must_use]
    pub const fn is_minor(self) -> bool {
        !matches!(self, Self::Adult)
    }
}

impl fmt::Display for AgeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgeBucket {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|bucket| bucket.as_str() == s)
            .ok_or_else(|| DecodeError::malformed("age must be one of UNDER_13, 13_15, 16_17, 18_PLUS"))
    }
}
