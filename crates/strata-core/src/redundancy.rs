//! Erasure scheme parameters.
//!
//! The metainfo service never encodes or decodes data itself; it only needs
//! the thresholds for validation and the padded piece size a segment of a
//! given size produces.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::ByteSize;
use crate::{MetainfoError, Result};

/// Erasure coding algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RedundancyAlgorithm {
    /// Reed-Solomon over GF(2^8)
    #[default]
    ReedSolomon,
}

/// Thresholds of an erasure scheme.
///
/// `required` (k) pieces reconstruct the segment, falling to `repair` (m)
/// triggers repair, `success` (o) pieces make an upload durable and
/// `total` (n) pieces are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RedundancyScheme {
    /// Erasure algorithm
    pub algorithm: RedundancyAlgorithm,
    /// Size in bytes of one erasure share
    pub share_size: u32,
    /// Minimum pieces to reconstruct (k)
    pub required: u16,
    /// Repair threshold (m)
    pub repair: u16,
    /// Success threshold (o)
    pub success: u16,
    /// Total pieces generated (n)
    pub total: u16,
}

impl RedundancyScheme {
    /// Reed-Solomon scheme with the given thresholds.
    pub const fn reed_solomon(
        required: u16,
        repair: u16,
        success: u16,
        total: u16,
        share_size: u32,
    ) -> Self {
        Self {
            algorithm: RedundancyAlgorithm::ReedSolomon,
            share_size,
            required,
            repair,
            success,
            total,
        }
    }

    /// Check `1 ≤ k ≤ m ≤ o ≤ n` and a positive share size.
    pub fn validate(&self) -> Result<()> {
        if self.required < 1
            || self.required > self.repair
            || self.repair > self.success
            || self.success > self.total
        {
            return Err(MetainfoError::invalid_argument(format!(
                "invalid redundancy thresholds {}/{}/{}/{}",
                self.required, self.repair, self.success, self.total
            )));
        }
        if self.share_size == 0 {
            return Err(MetainfoError::invalid_argument(
                "invalid redundancy share size 0",
            ));
        }
        Ok(())
    }

    /// Bytes in one stripe, `share_size · k`.
    pub fn stripe_size(&self) -> i64 {
        i64::from(self.share_size) * i64::from(self.required)
    }
}

impl fmt::Display for RedundancyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}-{}",
            self.required,
            self.repair,
            self.success,
            self.total,
            ByteSize::new(u64::from(self.share_size))
        )
    }
}

/// Size of each piece produced from a segment of `segment_size` bytes.
///
/// The encoder appends a 4-byte length trailer and pads to whole stripes;
/// each of the k shares of a stripe lands in a different piece.
pub fn calc_piece_size(segment_size: i64, scheme: &RedundancyScheme) -> i64 {
    const TRAILER: i64 = 4;

    let stripe_size = scheme.stripe_size();
    if stripe_size <= 0 {
        return 0;
    }
    let padded = segment_size
        .saturating_add(TRAILER)
        .saturating_add(stripe_size - 1);
    let stripes = padded / stripe_size;
    stripes.saturating_mul(stripe_size) / i64::from(scheme.required)
}

/// Satellite redundancy configuration, written as `k/m/o/n-size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RsConfig {
    /// Minimum pieces to reconstruct
    pub min: u16,
    /// Repair threshold
    pub repair: u16,
    /// Success threshold
    pub success: u16,
    /// Total pieces
    pub total: u16,
    /// Erasure share size
    pub erasure_share_size: ByteSize,
}

impl RsConfig {
    /// Release network defaults, `29/35/80/110-256B`.
    pub const fn release() -> Self {
        Self {
            min: 29,
            repair: 35,
            success: 80,
            total: 110,
            erasure_share_size: ByteSize::new(256),
        }
    }

    /// Development defaults, `4/6/8/10-256B`.
    pub const fn development() -> Self {
        Self {
            min: 4,
            repair: 6,
            success: 8,
            total: 10,
            erasure_share_size: ByteSize::new(256),
        }
    }

    /// The Reed-Solomon scheme this configuration describes.
    pub fn scheme(&self) -> RedundancyScheme {
        RedundancyScheme::reed_solomon(
            self.min,
            self.repair,
            self.success,
            self.total,
            u32::try_from(self.erasure_share_size.bytes()).unwrap_or(u32::MAX),
        )
    }
}

impl Default for RsConfig {
    fn default() -> Self {
        Self::development()
    }
}

impl FromStr for RsConfig {
    type Err = MetainfoError;

    fn from_str(s: &str) -> Result<Self> {
        let Some((numbers, share_size)) = s.split_once('-') else {
            return Err(MetainfoError::invalid_argument(format!(
                "Invalid default RS config (expect format k/m/o/n-ShareSize, got {s})"
            )));
        };
        if share_size.contains('-') {
            return Err(MetainfoError::invalid_argument(format!(
                "Invalid default RS config (expect format k/m/o/n-ShareSize, got {s})"
            )));
        }

        let erasure_share_size: ByteSize = share_size.parse().map_err(|e: MetainfoError| {
            MetainfoError::invalid_argument(format!(
                "Invalid share size in RS config: '{share_size}', {}",
                e.message()
            ))
        })?;

        let parts: Vec<&str> = numbers.split('/').collect();
        if parts.len() != 4 {
            return Err(MetainfoError::invalid_argument(format!(
                "Invalid default RS numbers (wrong size, expect 4): {numbers}"
            )));
        }

        let mut values = [0u16; 4];
        let mut min_value = 1u16;
        for (slot, part) in values.iter_mut().zip(parts) {
            let value: u16 = part.parse().map_err(|e| {
                MetainfoError::invalid_argument(format!(
                    "Invalid default RS numbers (should all be valid integers): {numbers}, {e}"
                ))
            })?;
            if value < min_value {
                return Err(MetainfoError::invalid_argument(format!(
                    "Invalid default RS numbers (should be non-decreasing): {numbers}"
                )));
            }
            *slot = value;
            min_value = value;
        }

        Ok(Self {
            min: values[0],
            repair: values[1],
            success: values[2],
            total: values[3],
            erasure_share_size,
        })
    }
}

impl fmt::Display for RsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}-{}",
            self.min, self.repair, self.success, self.total, self.erasure_share_size
        )
    }
}

impl TryFrom<String> for RsConfig {
    type Error = MetainfoError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RsConfig> for String {
    fn from(value: RsConfig) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calc_piece_size() {
        let scheme = RedundancyScheme::reed_solomon(4, 6, 8, 10, 256);
        assert_eq!(calc_piece_size(1000, &scheme), 256);
        // the 4 byte trailer pushes an exact stripe into a second one
        assert_eq!(calc_piece_size(1024, &scheme), 512);
        assert_eq!(calc_piece_size(1020, &scheme), 256);
        assert_eq!(calc_piece_size(0, &scheme), 256);
    }

    #[test]
    fn test_calc_piece_size_saturates_on_huge_segments() {
        let scheme = RedundancyScheme::reed_solomon(4, 6, 8, 10, 256);
        let huge = calc_piece_size(i64::MAX, &scheme);
        assert!(huge > 0);
        assert_eq!(calc_piece_size(i64::MAX - 10, &scheme), huge);
    }

    #[test]
    fn test_scheme_validation() {
        assert!(RedundancyScheme::reed_solomon(4, 6, 8, 10, 256)
            .validate()
            .is_ok());
        assert!(RedundancyScheme::reed_solomon(2, 2, 2, 2, 256)
            .validate()
            .is_ok());
        assert!(RedundancyScheme::reed_solomon(0, 6, 8, 10, 256)
            .validate()
            .is_err());
        assert!(RedundancyScheme::reed_solomon(4, 9, 8, 10, 256)
            .validate()
            .is_err());
        assert!(RedundancyScheme::reed_solomon(4, 6, 8, 10, 0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_rs_config_parse() {
        let rs: RsConfig = "29/35/80/110-256B".parse().unwrap();
        assert_eq!(rs, RsConfig::release());
        assert_eq!(rs.to_string(), "29/35/80/110-256 B");

        let rs: RsConfig = "4/6/8/10-1KiB".parse().unwrap();
        assert_eq!(rs.erasure_share_size.bytes(), 1024);
        assert_eq!(rs.scheme().share_size, 1024);
    }

    #[test]
    fn test_rs_config_rejects_malformed() {
        assert!("4/6/8/10".parse::<RsConfig>().is_err());
        assert!("4/6/8-256B".parse::<RsConfig>().is_err());
        assert!("4/6/x/10-256B".parse::<RsConfig>().is_err());
        assert!("4/3/8/10-256B".parse::<RsConfig>().is_err());
        assert!("0/6/8/10-256B".parse::<RsConfig>().is_err());
        assert!("4/6/8/10-lots".parse::<RsConfig>().is_err());
        assert!("4/6/8/10-256B-1".parse::<RsConfig>().is_err());
    }
}
