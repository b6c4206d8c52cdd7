//! Service classification policy.
//!
//! Maps each service tag to a QoS profile: guaranteed rate, ceiling rate and
//! priority rank (lower rank = higher priority).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::service::ServiceTag;
use crate::utils::rate::Rate;

/// QoS profile for one service class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceProfile {
    pub service: ServiceTag,
    #[serde(with = "crate::utils::rate::serde_rate")]
    pub guaranteed: Rate,
    #[serde(with = "crate::utils::rate::serde_rate")]
    pub ceiling: Rate,
    pub priority: u32,
}

impl ServiceProfile {
    pub fn new(service: impl Into<ServiceTag>, guaranteed: Rate, ceiling: Rate, priority: u32) -> Self {
        Self {
            service: service.into(),
            guaranteed,
            ceiling,
            priority,
        }
    }
}

/// Policy set validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("Service '{0}' is defined more than once")]
    DuplicateService(ServiceTag),
    #[error("Priority rank {rank} is shared by '{first}' and '{second}'")]
    DuplicatePriority {
        rank: u32,
        first: ServiceTag,
        second: ServiceTag,
    },
    #[error("Service '{service}' guarantees {guaranteed} bit/s, above its {ceiling} bit/s ceiling")]
    GuaranteeExceedsCeiling {
        service: ServiceTag,
        guaranteed: Rate,
        ceiling: Rate,
    },
}

/// Validated set of service profiles.
///
/// Service tags are unique, priority ranks form a total order with no ties
/// and every guaranteed rate is at most its ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ServiceProfile>", into = "Vec<ServiceProfile>")]
pub struct PolicySet {
    profiles: Vec<ServiceProfile>,
}

impl TryFrom<Vec<ServiceProfile>> for PolicySet {
    type Error = PolicyError;

    fn try_from(profiles: Vec<ServiceProfile>) -> Result<Self, Self::Error> {
        PolicySet::new(profiles)
    }
}

impl From<PolicySet> for Vec<ServiceProfile> {
    fn from(policies: PolicySet) -> Self {
        policies.profiles
    }
}

impl PolicySet {
    pub fn new(mut profiles: Vec<ServiceProfile>) -> Result<Self, PolicyError> {
        let mut services: HashSet<&ServiceTag> = HashSet::new();
        let mut ranks: HashMap<u32, &ServiceTag> = HashMap::new();

        for profile in &profiles {
            if !services.insert(&profile.service) {
                return Err(PolicyError::DuplicateService(profile.service.clone()));
            }
            if let Some(first) = ranks.insert(profile.priority, &profile.service) {
                return Err(PolicyError::DuplicatePriority {
                    rank: profile.priority,
                    first: first.clone(),
                    second: profile.service.clone(),
                });
            }
            if profile.guaranteed > profile.ceiling {
                return Err(PolicyError::GuaranteeExceedsCeiling {
                    service: profile.service.clone(),
                    guaranteed: profile.guaranteed,
                    ceiling: profile.ceiling,
                });
            }
        }

        profiles.sort_by_key(|p| p.priority);
        Ok(Self { profiles })
    }

    /// Profiles in priority order
    pub fn profiles(&self) -> &[ServiceProfile] {
        &self.profiles
    }

    pub fn get(&self, service: &ServiceTag) -> Option<&ServiceProfile> {
        self.profiles.iter().find(|p| &p.service == service)
    }

    pub fn contains(&self, service: &ServiceTag) -> bool {
        self.get(service).is_some()
    }

    /// Skips validation so tests can feed the builder a broken policy set
    #[cfg(test)]
    pub(crate) fn unchecked(profiles: Vec<ServiceProfile>) -> Self {
        Self { profiles }
    }
}

/// Reference policy: web traffic first, video second, IoT last
pub fn reference_policies() -> PolicySet {
    const MBIT: u64 = 1_000_000;
    PolicySet {
        profiles: vec![
            ServiceProfile::new(ServiceTag::bulk(), 80 * MBIT, 100 * MBIT, 1),
            ServiceProfile::new(ServiceTag::realtime(), 800 * MBIT, 1000 * MBIT, 2),
            ServiceProfile::new(ServiceTag::periodic(), 50 * MBIT, 100 * MBIT, 3),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_policies_are_valid() {
        let policies = reference_policies();
        assert_eq!(PolicySet::new(policies.profiles().to_vec()), Ok(policies.clone()));
        assert_eq!(policies.get(&ServiceTag::realtime()).unwrap().priority, 2);
        assert!(!policies.contains(&ServiceTag::new("voice")));
    }

    #[test]
    fn test_rejects_duplicate_priority() {
        let err = PolicySet::new(vec![
            ServiceProfile::new("bulk", 1, 10, 1),
            ServiceProfile::new("realtime", 1, 10, 1),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            PolicyError::DuplicatePriority {
                rank: 1,
                first: ServiceTag::bulk(),
                second: ServiceTag::realtime(),
            }
        );
    }

    #[test]
    fn test_rejects_guarantee_above_ceiling() {
        let err = PolicySet::new(vec![ServiceProfile::new("bulk", 20, 10, 1)]).unwrap_err();
        assert!(matches!(err, PolicyError::GuaranteeExceedsCeiling { .. }));
    }

    #[test]
    fn test_sorted_by_priority_and_parsed_from_yaml() {
        let yaml = r#"
- { service: periodic, guaranteed: 50mbit, ceiling: 100mbit, priority: 3 }
- { service: bulk, guaranteed: 80mbit, ceiling: 100mbit, priority: 1 }
"#;
        let policies: PolicySet = serde_yaml::from_str(yaml).unwrap();
        let order: Vec<&str> = policies.profiles().iter().map(|p| p.service.as_str()).collect();
        assert_eq!(order, vec!["bulk", "periodic"]);
    }
}
