//! Rate parsing utilities.
//!
//! This module parses tc-style rate strings (e.g., "100mbit", "1gbit")
//! into bits per second and formats them back.

use serde::{Deserialize, Deserializer, Serializer};

/// Bits per second.
pub type Rate = u64;

const KBIT: u64 = 1_000;
const MBIT: u64 = 1_000_000;
const GBIT: u64 = 1_000_000_000;

/// Parse a rate string (e.g., "100mbit", "500kbit", "1gbit", "64000") to bits per second
///
/// Supported formats:
/// - Raw bits per second: "64000", "64000bit", "64000bps"
/// - Kilobits: "500k", "500kbit", "500kbps"
/// - Megabits: "100m", "100mbit", "100mbps"
/// - Gigabits: "1g", "1gbit", "1gbps"
///
/// # Examples
/// ```
/// use qosnet::utils::rate::parse_rate;
///
/// assert_eq!(parse_rate("100mbit"), Ok(100_000_000));
/// assert_eq!(parse_rate("1gbit"), Ok(1_000_000_000));
/// assert_eq!(parse_rate("64000"), Ok(64_000));
/// assert!(parse_rate("fast").is_err());
/// ```
pub fn parse_rate(rate: &str) -> Result<Rate, String> {
    let rate = rate.trim().to_ascii_lowercase();
    let split = rate
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rate.len());
    let (number, unit) = rate.split_at(split);

    if number.is_empty() {
        return Err(format!("Invalid rate format: {}", rate));
    }
    let value: u64 = number
        .parse()
        .map_err(|_| format!("Invalid rate format: {}", rate))?;

    let multiplier = match unit {
        "" | "bit" | "bps" => 1,
        "k" | "kbit" | "kbps" => KBIT,
        "m" | "mbit" | "mbps" => MBIT,
        "g" | "gbit" | "gbps" => GBIT,
        _ => return Err(format!("Invalid rate unit '{}' in: {}", unit, rate)),
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("Rate out of range: {}", rate))
}

/// Format a rate in the largest tc unit that divides it exactly
pub fn format_rate(rate: Rate) -> String {
    if rate != 0 && rate % GBIT == 0 {
        format!("{}gbit", rate / GBIT)
    } else if rate != 0 && rate % MBIT == 0 {
        format!("{}mbit", rate / MBIT)
    } else if rate != 0 && rate % KBIT == 0 {
        format!("{}kbit", rate / KBIT)
    } else {
        format!("{}bit", rate)
    }
}

/// Serde adapter accepting either an integer (bits per second) or a rate string.
///
/// Use with `#[serde(with = "crate::utils::rate::serde_rate")]`.
pub mod serde_rate {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RateRepr {
        Bits(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(rate: &Rate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_rate(*rate))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Rate, D::Error> {
        match RateRepr::deserialize(deserializer)? {
            RateRepr::Bits(bits) => Ok(bits),
            RateRepr::Text(text) => parse_rate(&text).map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate_units() {
        assert_eq!(parse_rate("0"), Ok(0));
        assert_eq!(parse_rate("1500"), Ok(1500));
        assert_eq!(parse_rate("1500bit"), Ok(1500));
        assert_eq!(parse_rate("500kbit"), Ok(500_000));
        assert_eq!(parse_rate("500kbps"), Ok(500_000));
        assert_eq!(parse_rate("80mbit"), Ok(80_000_000));
        assert_eq!(parse_rate("80Mbit"), Ok(80_000_000));
        assert_eq!(parse_rate("  10m "), Ok(10_000_000));
        assert_eq!(parse_rate("1gbit"), Ok(1_000_000_000));
    }

    #[test]
    fn test_parse_rate_invalid() {
        assert!(parse_rate("").is_err());
        assert!(parse_rate("mbit").is_err());
        assert!(parse_rate("10xbit").is_err());
        assert!(parse_rate("99999999999999999999gbit").is_err());
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(100_000_000), "100mbit");
        assert_eq!(format_rate(1_000_000_000), "1gbit");
        assert_eq!(format_rate(2_500_000), "2500kbit");
        assert_eq!(format_rate(1234), "1234bit");
        assert_eq!(format_rate(0), "0bit");
    }
}
