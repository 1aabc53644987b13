//! Markets: the (instance type, availability zone) granularity at which
//! resource groups account for capacity.

use std::collections::HashMap;
use std::sync::OnceLock;

/// An immutable (instance type, availability zone) pair.
///
/// Two markets are equal iff both fields match; `Ord` is derived so a
/// list of markets sorts deterministically (lexicographic by
/// instance type, then zone), which the pool manager relies on when it
/// needs a stable tie-break between markets of equal weight.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Market {
    pub instance_type: String,
    pub availability_zone: String,
}

impl Market {
    pub fn new(instance_type: impl Into<String>, availability_zone: impl Into<String>) -> Self {
        Self {
            instance_type: instance_type.into(),
            availability_zone: availability_zone.into(),
        }
    }

    /// Known CPU count for this market's instance type, if recognized.
    ///
    /// Callers that need a weight and get `None` here should fall back
    /// to the resource group's own configured weight rather than treat
    /// this as an error — the table only covers common EC2 families.
    pub fn cpu_count(&self) -> Option<u32> {
        instance_type_table().get(self.instance_type.as_str()).copied()
    }
}

impl std::fmt::Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.instance_type, self.availability_zone)
    }
}

fn instance_type_table() -> &'static HashMap<&'static str, u32> {
    static TABLE: OnceLock<HashMap<&'static str, u32>> = OnceLock::new();
    TABLE.get_or_init(|| {
        [
            ("t3.micro", 2),
            ("t3.small", 2),
            ("t3.medium", 2),
            ("t3.large", 2),
            ("t3.xlarge", 4),
            ("t3.2xlarge", 8),
            ("m5.large", 2),
            ("m5.xlarge", 4),
            ("m5.2xlarge", 8),
            ("m5.4xlarge", 16),
            ("m5.8xlarge", 32),
            ("m5.12xlarge", 48),
            ("m5.16xlarge", 64),
            ("m5.24xlarge", 96),
            ("c5.large", 2),
            ("c5.xlarge", 4),
            ("c5.2xlarge", 8),
            ("c5.4xlarge", 16),
            ("c5.9xlarge", 36),
            ("c5.12xlarge", 48),
            ("c5.18xlarge", 72),
            ("c5.24xlarge", 96),
            ("r5.large", 2),
            ("r5.xlarge", 4),
            ("r5.2xlarge", 8),
            ("r5.4xlarge", 16),
            ("r5.8xlarge", 32),
            ("r5.12xlarge", 48),
            ("r5.16xlarge", 64),
            ("r5.24xlarge", 96),
        ]
        .into_iter()
        .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_markets_compare_equal() {
        let a = Market::new("m5.xlarge", "us-west-2a");
        let b = Market::new("m5.xlarge", "us-west-2a");
        assert_eq!(a, b);
    }

    #[test]
    fn differing_zone_is_a_different_market() {
        let a = Market::new("m5.xlarge", "us-west-2a");
        let b = Market::new("m5.xlarge", "us-west-2b");
        assert_ne!(a, b);
    }

    #[test]
    fn known_instance_type_has_cpu_count() {
        let m = Market::new("m5.2xlarge", "us-west-2a");
        assert_eq!(m.cpu_count(), Some(8));
    }

    #[test]
    fn unknown_instance_type_is_none_not_a_panic() {
        let m = Market::new("z9.bogus", "us-west-2a");
        assert_eq!(m.cpu_count(), None);
    }

    #[test]
    fn markets_sort_deterministically() {
        let mut markets = vec![
            Market::new("m5.xlarge", "us-west-2b"),
            Market::new("c5.large", "us-west-2a"),
            Market::new("m5.xlarge", "us-west-2a"),
        ];
        markets.sort();
        assert_eq!(
            markets,
            vec![
                Market::new("c5.large", "us-west-2a"),
                Market::new("m5.xlarge", "us-west-2a"),
                Market::new("m5.xlarge", "us-west-2b"),
            ]
        );
    }
}
