//! Human-readable byte sizes for configuration values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{MetainfoError, Result};

const KIB: u64 = 1 << 10;
const MIB: u64 = 1 << 20;
const GIB: u64 = 1 << 30;
const TIB: u64 = 1 << 40;

/// Byte count written as `256B`, `4KiB`, `64MiB`, `1.5GB` and so on.
///
/// Binary (`KiB`) and decimal (`KB`) suffixes are both accepted, case
/// insensitively; a bare number is bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ByteSize(u64);

impl ByteSize {
    /// Wrap a raw byte count.
    pub const fn new(bytes: u64) -> Self {
        Self(bytes)
    }

    /// `n` KiB.
    pub const fn kib(n: u64) -> Self {
        Self(n * KIB)
    }

    /// `n` MiB.
    pub const fn mib(n: u64) -> Self {
        Self(n * MIB)
    }

    /// Raw byte count.
    pub const fn bytes(self) -> u64 {
        self.0
    }

    /// Byte count as a signed size, saturating.
    pub fn as_i64(self) -> i64 {
        i64::try_from(self.0).unwrap_or(i64::MAX)
    }
}

impl FromStr for ByteSize {
    type Err = MetainfoError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(s.len());
        let (number, unit) = s.split_at(split);
        if number.is_empty() {
            return Err(MetainfoError::invalid_argument(format!(
                "invalid size {s:?}: missing number"
            )));
        }

        let multiplier = match unit.trim().to_ascii_uppercase().as_str() {
            "" | "B" => 1,
            "KB" => 1_000,
            "MB" => 1_000_000,
            "GB" => 1_000_000_000,
            "TB" => 1_000_000_000_000,
            "KIB" => KIB,
            "MIB" => MIB,
            "GIB" => GIB,
            "TIB" => TIB,
            other => {
                return Err(MetainfoError::invalid_argument(format!(
                    "invalid size {s:?}: unknown unit {other:?}"
                )))
            }
        };

        if let Ok(whole) = number.parse::<u64>() {
            return whole.checked_mul(multiplier).map(Self).ok_or_else(|| {
                MetainfoError::invalid_argument(format!("invalid size {s:?}: overflow"))
            });
        }

        let value: f64 = number
            .parse()
            .map_err(|e| MetainfoError::invalid_argument(format!("invalid size {s:?}: {e}")))?;
        let bytes = (value * multiplier as f64).round();
        if !bytes.is_finite() || bytes > u64::MAX as f64 {
            return Err(MetainfoError::invalid_argument(format!(
                "invalid size {s:?}: overflow"
            )));
        }
        Ok(Self(bytes as u64))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        match b {
            0 => f.write_str("0 B"),
            b if b % TIB == 0 => write!(f, "{} TiB", b / TIB),
            b if b % GIB == 0 => write!(f, "{} GiB", b / GIB),
            b if b % MIB == 0 => write!(f, "{} MiB", b / MIB),
            b if b % KIB == 0 => write!(f, "{} KiB", b / KIB),
            b => write!(f, "{b} B"),
        }
    }
}

impl TryFrom<String> for ByteSize {
    type Error = MetainfoError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ByteSize> for String {
    fn from(value: ByteSize) -> Self {
        value.to_string()
    }
}
