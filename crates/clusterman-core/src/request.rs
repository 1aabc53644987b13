//! The resource request a signal hands back to the autoscaling loop.

use serde::de::{Deserializer, Error as DeError};
use serde::{Deserialize, Serialize};

/// The three resources the autoscaler understands. GPU and other
/// vocabulary is explicitly out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Cpus,
    Mem,
    Disk,
}

impl Resource {
    pub const ALL: [Resource; 3] = [Resource::Cpus, Resource::Mem, Resource::Disk];
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Resource::Cpus => "cpus",
            Resource::Mem => "mem",
            Resource::Disk => "disk",
        };
        write!(f, "{s}")
    }
}

/// A signal's answer: how much of each resource the pool's workloads
/// are expected to need. `None` means "absent" for that resource; all
/// fields absent means "no decision."
///
/// Deserializes from the signal wire protocol's `Resources` object,
/// which maps resource names to numbers or null. Unknown keys are
/// rejected rather than silently ignored (the fixed-struct redesign
/// flag in the expanded spec).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResourceRequest {
    pub cpus: Option<f64>,
    pub mem: Option<f64>,
    pub disk: Option<f64>,
}

impl ResourceRequest {
    pub fn is_no_decision(&self) -> bool {
        self.cpus.is_none() && self.mem.is_none() && self.disk.is_none()
    }

    pub fn get(&self, resource: Resource) -> Option<f64> {
        match resource {
            Resource::Cpus => self.cpus,
            Resource::Mem => self.mem,
            Resource::Disk => self.disk,
        }
    }
}

impl<'de> Deserialize<'de> for ResourceRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct Raw {
            #[serde(default)]
            cpus: Option<f64>,
            #[serde(default)]
            mem: Option<f64>,
            #[serde(default)]
            disk: Option<f64>,
        }

        let raw = Raw::deserialize(deserializer)?;
        for (name, value) in [("cpus", raw.cpus), ("mem", raw.mem), ("disk", raw.disk)] {
            if let Some(v) = value {
                if v < 0.0 {
                    return Err(DeError::custom(format!("resource {name} must be non-negative, got {v}")));
                }
            }
        }
        Ok(ResourceRequest {
            cpus: raw.cpus,
            mem: raw.mem,
            disk: raw.disk,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_absent_is_no_decision() {
        let req = ResourceRequest::default();
        assert!(req.is_no_decision());
    }

    #[test]
    fn any_present_is_a_decision() {
        let req = ResourceRequest {
            cpus: Some(10.0),
            ..Default::default()
        };
        assert!(!req.is_no_decision());
    }

    #[test]
    fn decodes_partial_resources_object() {
        let req: ResourceRequest = serde_json::from_str(r#"{"cpus": 12.5, "mem": null}"#).unwrap();
        assert_eq!(req.cpus, Some(12.5));
        assert_eq!(req.mem, None);
        assert_eq!(req.disk, None);
    }

    #[test]
    fn rejects_unknown_keys() {
        let result: Result<ResourceRequest, _> = serde_json::from_str(r#"{"cpus": 1.0, "gpu": 2.0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_negative_values() {
        let result: Result<ResourceRequest, _> = serde_json::from_str(r#"{"cpus": -1.0}"#);
        assert!(result.is_err());
    }
}
