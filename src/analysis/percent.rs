//! Presentation-time percentages.

use std::fmt;

use serde::Serialize;

/// Share of a count in a total.
///
/// A zero total yields 0% with `no_base` set instead of NaN.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Percentage {
    pub value: f64,
    pub no_base: bool,
}

impl Percentage {
    pub fn of(count: u64, total: u64) -> Self {
        if total == 0 {
            return Self {
                value: 0.0,
                no_base: true,
            };
        }
        Self {
            value: count as f64 / total as f64 * 100.0,
            no_base: false,
        }
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.no_base {
            write!(f, "0.0% (no base)")
        } else {
            write!(f, "{:.1}%", self.value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_total_has_no_base() {
        let p = Percentage::of(0, 0);
        assert_eq!(p.value, 0.0);
        assert!(p.no_base);
        assert_eq!(p.to_string(), "0.0% (no base)");
        assert!(Percentage::of(5, 0).value.is_finite());
    }

    #[test]
    fn test_share_of_total() {
        assert_eq!(Percentage::of(15, 100).to_string(), "15.0%");
        assert_eq!(Percentage::of(1, 3).to_string(), "33.3%");
        assert!(!Percentage::of(0, 10).no_base);
    }
}
